//! Register access surface
//!
//! Every other module talks to the hardware through [`RegisterAccess`]. The
//! MMIO implementation maps BAR0; tests substitute a scripted register file.
//!
//! Offsets below are byte offsets into BAR0. Core channel *methods* are a
//! separate address space submitted through [`crate::channel`] and live in
//! [`mthd`].

use core::ptr;

use crate::crtc::Head;
use crate::mode::ModeFlags;
use crate::output::DpmsMode;
use crate::pll::PllParams;

/// 32-bit register file with a microsecond delay source.
///
/// Reads may reflect in-flight hardware state and writes may trigger
/// hardware actions, so implementations must not cache.
pub trait RegisterAccess {
    fn read32(&mut self, offset: u32) -> u32;
    fn write32(&mut self, offset: u32, value: u32);
    /// Busy-wait for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Read-modify-write.
    fn modify32(&mut self, offset: u32, clear: u32, set: u32) {
        let value = self.read32(offset);
        self.write32(offset, (value & !clear) | set);
    }
}

impl<R: RegisterAccess + ?Sized> RegisterAccess for &mut R {
    fn read32(&mut self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: u32, value: u32) {
        (**self).write32(offset, value)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Memory-mapped BAR0.
pub struct Mmio {
    base: *mut u32,
    delay: fn(u32),
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must point at a mapping of the whole 16 MiB register BAR that
    /// stays valid (and uncached) for the lifetime of the returned value.
    pub unsafe fn new(base: *mut u32, delay: fn(u32)) -> Self {
        Self { base, delay }
    }
}

impl RegisterAccess for Mmio {
    fn read32(&mut self, offset: u32) -> u32 {
        // SAFETY: `new` guarantees the BAR mapping covers every register offset
        let value = unsafe { ptr::read_volatile(self.base.add((offset / 4) as usize)) };
        #[cfg(feature = "mmio-trace")]
        log::trace!("mmio: rd {:#08x} -> {:#010x}", offset, value);
        value
    }

    fn write32(&mut self, offset: u32, value: u32) {
        #[cfg(feature = "mmio-trace")]
        log::trace!("mmio: wr {:#08x} <- {:#010x}", offset, value);
        // SAFETY: see `read32`
        unsafe { ptr::write_volatile(self.base.add((offset / 4) as usize), value) }
    }

    fn delay_us(&mut self, us: u32) {
        (self.delay)(us)
    }
}

// =============================================================================
// Register Offsets
// =============================================================================

/// Per-port bit-bang I2C line register
pub const I2C_PORT: u32 = 0x00E138;
pub const I2C_PORT_STRIDE: u32 = 0x18;

/// Supervisor / interrupt status. Bits 4-6 carry the supervisor class.
pub const DISP_SUPERVISOR: u32 = 0x610024;
/// Supervisor detail. Bits 9-10 flag heads needing a clock update.
pub const DISP_SUPERVISOR_HEADS: u32 = 0x610030;
/// Strap / scratch word selecting which head drives the internal panel
pub const DISP_PANEL_STRAP: u32 = 0x610050;
/// Display engine control and state field
pub const DISP_ENGINE_CTRL: u32 = 0x610200;
pub const ENGINE_STATE_MASK: u32 = 0x1e0000;
pub const ENGINE_READY: u32 = 0x40000000;
pub const ENGINE_RESET: u32 = 0x2b00;
pub const ENGINE_ENABLE: u32 = 0x1000b03;
/// Core channel method request (write triggers submission)
pub const DISP_CMD_CTRL: u32 = 0x610300;
pub const CMD_CTRL_ENABLE: u32 = 0x1;
/// Core channel method data
pub const DISP_CMD_DATA: u32 = 0x610304;

/// Core channel video memory window (armed on unblank)
pub const DISP_VRAM_BASE: u32 = 0x610380;
pub const DISP_VRAM_LIMIT: u32 = 0x610384;
pub const DISP_VRAM_FLAGS: u32 = 0x610388;
pub const DISP_VRAM_OFFSET: u32 = 0x61038C;

/// Per-head PLL registers, stride 0x800
pub const HEAD_PLL_CTRL: u32 = 0x614100;
pub const HEAD_PLL_LO: u32 = 0x614104;
pub const HEAD_PLL_HI: u32 = 0x614108;
pub const HEAD_PLL_UPDATE: u32 = 0x614200;
pub const HEAD_PLL_STRIDE: u32 = 0x800;
pub const HEAD_PLL_CTRL_PROGRAM: u32 = 0x10000610;

/// Per-transmitter clock-limit registers, stride 0x800
pub const DAC_CLK_LIMIT: u32 = 0x614280;
pub const SOR_CLK_LIMIT: u32 = 0x614300;
pub const OR_CLK_STRIDE: u32 = 0x800;
pub const SOR_CLK_DUAL_LINK: u32 = 0x101;

/// Analog DAC control block, stride 0x800
pub const DAC_CTRL: u32 = 0x61A004;
pub const DAC_LOAD: u32 = 0x61A00C;
pub const DAC_TEST: u32 = 0x61A010;
pub const DAC_STRIDE: u32 = 0x800;
pub const DAC_CTRL_PENDING: u32 = 0x80000000;
pub const DAC_CTRL_LOAD_ARM: u32 = 0x80150000;
pub const DAC_CTRL_NORMAL: u32 = 0x80550000;

/// Serializer power control, stride 0x800
pub const SOR_PWR: u32 = 0x61C004;
pub const SOR_STRIDE: u32 = 0x800;
pub const SOR_PWR_PENDING: u32 = 0x80000000;
pub const SOR_PWR_ON: u32 = 0x1;

/// Legacy VGA ownership
pub const VGA_CTRL: u32 = 0x6194E8;
pub const VGA_CTRL_ENABLE: u32 = 0x1;
pub const VGA_CTRL_BUSY: u32 = 0x2;

/// Per-head cursor position, stride 0x1000
pub const CURSOR_POS: u32 = 0x647084;
pub const CURSOR_UPDATE: u32 = 0x647080;
pub const CURSOR_STRIDE: u32 = 0x1000;

/// Armed timing state of a head. Used to recover the panel's native mode;
/// the second head's block sits 0x540 higher.
pub mod armed {
    pub const CLOCK: u32 = 0x610AD4;
    pub const BLANK_END: u32 = 0x610AE8;
    pub const TOTAL: u32 = 0x610AF4;
    pub const BLANK_START: u32 = 0x610AFC;
    pub const SYNC_END: u32 = 0x610B04;
    pub const SIZE: u32 = 0x610B4C;
    pub const HEAD1_OFFSET: u32 = 0x540;
}

/// Core channel method addresses
pub mod mthd {
    pub const UPDATE: u32 = 0x080;
    pub const INIT_084: u32 = 0x084;
    pub const INIT_088: u32 = 0x088;

    /// DAC methods, stride 0x80
    pub const DAC_MODE_CTRL: u32 = 0x400;
    pub const DAC_MODE_CTRL2: u32 = 0x404;
    pub const DAC_STRIDE: u32 = 0x80;

    /// SOR methods, stride 0x40
    pub const SOR_MODE_CTRL: u32 = 0x600;
    pub const SOR_STRIDE: u32 = 0x40;

    /// Head methods, stride 0x400
    pub const HEAD_STRIDE: u32 = 0x400;
    pub const HEAD_800: u32 = 0x800;
    pub const HEAD_CLOCK: u32 = 0x804;
    pub const HEAD_INTERLACE: u32 = 0x808;
    pub const HEAD_810: u32 = 0x810;
    pub const HEAD_TOTAL: u32 = 0x814;
    pub const HEAD_SYNC_END: u32 = 0x818;
    pub const HEAD_BLANK_END: u32 = 0x81C;
    pub const HEAD_BLANK_START: u32 = 0x820;
    pub const HEAD_INTERLACE_BLANK: u32 = 0x824;
    pub const HEAD_82C: u32 = 0x82C;
    pub const HEAD_CLUT_MODE: u32 = 0x840;
    pub const HEAD_CLUT_OFFSET: u32 = 0x844;
    pub const HEAD_CLUT_DMA: u32 = 0x85C;
    pub const HEAD_FB_OFFSET: u32 = 0x860;
    pub const HEAD_864: u32 = 0x864;
    pub const HEAD_FB_SIZE: u32 = 0x868;
    pub const HEAD_FB_PITCH: u32 = 0x86C;
    pub const HEAD_FB_FORMAT: u32 = 0x870;
    pub const HEAD_FB_ENABLE: u32 = 0x874;
    pub const HEAD_CURSOR_CTRL: u32 = 0x880;
    pub const HEAD_CURSOR_OFFSET: u32 = 0x884;
    pub const HEAD_CURSOR_DMA: u32 = 0x89C;
    pub const HEAD_DITHER: u32 = 0x8A0;
    pub const HEAD_SCALE_CTRL: u32 = 0x8A4;
    pub const HEAD_8A8: u32 = 0x8A8;
    pub const HEAD_FB_POS: u32 = 0x8C0;
    pub const HEAD_SCALE_IN: u32 = 0x8C8;
    pub const HEAD_8D4: u32 = 0x8D4;
    pub const HEAD_SCALE_OUT: u32 = 0x8D8;
    pub const HEAD_SCALE_OUT2: u32 = 0x8DC;
}

// =============================================================================
// Register Fields
// =============================================================================

/// Core channel request word.
pub struct CommandRequest;

impl CommandRequest {
    pub const BUSY: u32 = 0x80000000;
    const TRIGGER: u32 = 0x80010001;

    pub fn pack(method: u32) -> u32 {
        method | Self::TRIGGER
    }

    pub fn is_busy(ctrl: u32) -> bool {
        ctrl & Self::BUSY != 0
    }
}

/// Supervisor status word (0x610024).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStatus(pub u32);

impl SupervisorStatus {
    /// Set while the VGA core still owns the display engine
    pub const VGA_OWNED: u32 = 0x100;

    /// Supervisor class: 1-based index of the lowest set bit of bits 4-6,
    /// zero when no supervisor event is pending.
    pub fn class(&self) -> u8 {
        let field = (self.0 >> 4) & 7;
        if field == 0 {
            0
        } else {
            field.trailing_zeros() as u8 + 1
        }
    }

    /// Acknowledge pattern for a supervisor class.
    pub fn ack(class: u8) -> u32 {
        8 << class
    }

    /// Per-head disable acknowledge bit used at shutdown.
    pub fn head_disable(head: Head) -> u32 {
        4 << head.index()
    }
}

/// Supervisor detail word (0x610030).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorHeads(pub u32);

impl SupervisorHeads {
    pub const ACK: u32 = 0x80000000;

    pub fn needs_clock(&self, head: Head) -> bool {
        self.0 & (0x200 << head.index()) != 0
    }
}

/// The two PLL coefficient words of a head.
///
/// Reserved bits of the current register contents are preserved across a
/// reprogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllCoeffs {
    pub lo: u32,
    pub hi: u32,
}

impl PllCoeffs {
    const LO_KEEP: u32 = 0xff00ff00;
    const HI_KEEP: u32 = 0x8000ff00;

    pub fn merge(current: PllCoeffs, params: &PllParams) -> PllCoeffs {
        let lo = (current.lo & Self::LO_KEEP) | (params.ma << 16) | params.na;
        let hi = (current.hi & Self::HI_KEEP)
            | (params.p << 28)
            | (params.mb << 16)
            | params.nb;
        PllCoeffs { lo, hi }
    }

    pub fn unpack(&self) -> PllParams {
        PllParams {
            na: self.lo & 0xff,
            ma: (self.lo >> 16) & 0xff,
            nb: self.hi & 0xff,
            mb: (self.hi >> 16) & 0xff,
            p: (self.hi >> 28) & 0x7,
        }
    }
}

/// DAC load-sense word (0x61A00C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacLoadSense(pub u32);

impl DacLoadSense {
    pub const CHANNELS: u32 = 0x38000000;
    const DRIVE: u32 = 0x100000;

    pub fn drive(level: u32) -> u32 {
        level | Self::DRIVE
    }

    /// All three colour channels see a termination load.
    pub fn all_channels_loaded(&self) -> bool {
        self.0 & Self::CHANNELS == Self::CHANNELS
    }
}

/// DAC power control word (0x61A004).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacControl(pub u32);

impl DacControl {
    const STATE_MASK: u32 = 0x7f;
    const HSYNC_OFF: u32 = 0x01;
    const VSYNC_OFF: u32 = 0x04;
    const BLANKED: u32 = 0x10;
    const POWER_OFF: u32 = 0x40;

    /// Request a power state, keeping the unrelated bits.
    pub fn with_dpms(&self, mode: DpmsMode) -> u32 {
        let mut v = (self.0 & !Self::STATE_MASK) | DAC_CTRL_PENDING;
        if matches!(mode, DpmsMode::Standby | DpmsMode::Off) {
            v |= Self::HSYNC_OFF;
        }
        if matches!(mode, DpmsMode::Suspend | DpmsMode::Off) {
            v |= Self::VSYNC_OFF;
        }
        if mode != DpmsMode::On {
            v |= Self::BLANKED;
        }
        if mode == DpmsMode::Off {
            v |= Self::POWER_OFF;
        }
        v
    }
}

/// SOR power control word (0x61C004).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SorControl(pub u32);

impl SorControl {
    pub fn with_power(&self, on: bool) -> u32 {
        let v = self.0 | SOR_PWR_PENDING;
        if on {
            v | SOR_PWR_ON
        } else {
            v & !SOR_PWR_ON
        }
    }
}

/// Sync polarity encodings of the output mode-control methods.
pub struct SyncPolarity;

impl SyncPolarity {
    const SOR_NHSYNC: u32 = 0x1000;
    const SOR_NVSYNC: u32 = 0x2000;

    /// DAC 0x404 word: bit 0 negative hsync, bit 1 negative vsync.
    ///
    /// `legacy` reproduces the first releases, where negative hsync alone
    /// selected the encoding and negative vsync was only seen without it.
    pub fn dac(flags: ModeFlags, legacy: bool) -> u32 {
        let nh = flags.contains(ModeFlags::NHSYNC);
        let nv = flags.contains(ModeFlags::NVSYNC);
        if legacy {
            return if nh {
                1
            } else if nv {
                2
            } else {
                0
            };
        }
        (nh as u32) | ((nv as u32) << 1)
    }

    pub fn sor(flags: ModeFlags) -> u32 {
        let mut v = 0;
        if flags.contains(ModeFlags::NHSYNC) {
            v |= Self::SOR_NHSYNC;
        }
        if flags.contains(ModeFlags::NVSYNC) {
            v |= Self::SOR_NVSYNC;
        }
        v
    }
}

/// Head selector used by the DAC and SOR mode-control methods.
pub fn owner_bits(head: Head) -> u32 {
    match head {
        Head::Head0 => 1,
        Head::Head1 => 2,
    }
}
