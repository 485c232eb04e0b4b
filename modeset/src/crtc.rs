//! Per-head timing generators
//!
//! A [`Crtc`] turns a [`DisplayMode`] into the ordered head methods and
//! tracks where the head is in its mode-set life cycle. It never writes
//! the pixel clock itself during a mode set: it only records the target,
//! and the PLL is programmed later from the supervisor handler once the
//! hardware says the update is safe.

use crate::channel::MethodList;
use crate::config::DisplayConfig;
use crate::error::{DispError, DispResult};
use crate::mode::DisplayMode;
use crate::pll::PllParams;
use crate::regs::{self, mthd, PllCoeffs, RegisterAccess};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Head {
    Head0,
    Head1,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeadMask: u32 {
        const HEAD0 = 1 << 0;
        const HEAD1 = 1 << 1;
    }
}

impl Head {
    pub const ALL: [Head; 2] = [Head::Head0, Head::Head1];

    pub fn index(self) -> u32 {
        match self {
            Head::Head0 => 0,
            Head::Head1 => 1,
        }
    }

    pub fn mask(self) -> HeadMask {
        HeadMask::from_bits_truncate(1 << self.index())
    }

    /// Offset of this head's method block
    pub fn method_offset(self) -> u32 {
        mthd::HEAD_STRIDE * self.index()
    }

    /// Offset of this head's PLL register block
    pub fn pll_offset(self) -> u32 {
        regs::HEAD_PLL_STRIDE * self.index()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrtcState {
    Disabled,
    /// Timing methods are being sent
    Configuring,
    /// Configured, scanout off
    Blanked,
    Active,
}

/// Pack a vertical/horizontal pair into one method word.
fn vh(v: i32, h: i32) -> u32 {
    ((v as u32 & 0xffff) << 16) | (h as u32 & 0xffff)
}

pub struct Crtc {
    head: Head,
    /// Target pixel clock in kHz
    pclk: u32,
    state: CrtcState,
}

impl Crtc {
    pub fn new(head: Head) -> Self {
        Self {
            head,
            pclk: 0,
            state: CrtcState::Disabled,
        }
    }

    pub fn head(&self) -> Head {
        self.head
    }

    pub fn pclk(&self) -> u32 {
        self.pclk
    }

    pub fn state(&self) -> CrtcState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != CrtcState::Disabled
    }

    /// Fill in the head timings of a mode no output fixed up.
    pub fn mode_fixup(&self, mode: &mut DisplayMode) {
        mode.set_crtc_values();
    }

    /// Start configuring the head for a new pixel clock. The clock is what
    /// the next class 2 supervisor event programs.
    pub(crate) fn configure(&mut self, pclk: u32) {
        self.state = CrtcState::Configuring;
        self.pclk = pclk;
    }

    /// Timing methods went out, or scanout was switched off.
    pub(crate) fn mark_blanked(&mut self) {
        if matches!(self.state, CrtcState::Configuring | CrtcState::Active) {
            self.state = CrtcState::Blanked;
        }
    }

    /// Scanout was switched on. Only a configured head becomes active.
    pub(crate) fn mark_active(&mut self) {
        if self.state == CrtcState::Blanked {
            self.state = CrtcState::Active;
        } else {
            log::debug!("crtc{}: unblank in state {:?}", self.head.index(), self.state);
        }
    }

    /// Timing methods for `mode`.
    ///
    /// Clock and format methods go out before the active-area methods; the
    /// latter are only latched once the clock is.
    pub fn mode_set(&self, mode: &DisplayMode, x: u32, y: u32, cfg: &DisplayConfig) -> MethodList {
        let off = self.head.method_offset();
        let c = &mode.crtc;
        let interlace = mode.is_interlaced();
        let doublescan = mode.is_doublescan();

        let fudge = if interlace && doublescan { 2 } else { 1 };
        let div = if interlace { 2 } else { 1 };

        let (hss, hse, hbs, hbe, ht) = (
            c.hsync_start as i32,
            c.hsync_end as i32,
            c.hblank_start as i32,
            c.hblank_end as i32,
            c.htotal as i32,
        );
        let (vss, vse, vbs, vbe, vt) = (
            c.vsync_start as i32,
            c.vsync_end as i32,
            c.vblank_start as i32,
            c.vblank_end as i32,
            c.vtotal as i32,
        );

        let mut m = MethodList::new();
        m.push(mthd::HEAD_CLOCK + off, mode.clock | 0x800000);
        m.push(mthd::HEAD_INTERLACE + off, if interlace { 2 } else { 0 });
        m.push(mthd::HEAD_810 + off, 0);
        m.push(mthd::HEAD_82C + off, 0);
        m.push(mthd::HEAD_TOTAL + off, vh(vt, ht));
        m.push(mthd::HEAD_SYNC_END + off, vh((vse - vss) / div - 1, hse - hss - 1));
        m.push(
            mthd::HEAD_BLANK_END + off,
            vh((vbe - vss) / div - fudge, hbe - hss - 1),
        );
        m.push(
            mthd::HEAD_BLANK_START + off,
            vh((vt - vss + vbs) / div - fudge, ht - hss + hbs - 1),
        );
        if interlace {
            m.push(
                mthd::HEAD_INTERLACE_BLANK + off,
                vh((vt + vbe - vss) / 2 - 2, (2 * vt - vss + vbs) / 2 - 2),
            );
        }
        m.push(mthd::HEAD_FB_SIZE + off, (cfg.virtual_y << 16) | cfg.virtual_x);
        m.push(
            mthd::HEAD_FB_PITCH + off,
            (cfg.display_width * (cfg.bits_per_pixel / 8)) | 0x100000,
        );
        match cfg.surface_format() {
            Some(format) => m.push(mthd::HEAD_FB_FORMAT + off, format),
            None => log::warn!("crtc{}: no surface format for depth {}", self.head.index(), cfg.depth),
        }
        m.push(mthd::HEAD_DITHER + off, if cfg.dither { 0x11 } else { 0 });

        let scaled = c.hdisplay != mode.hdisplay || c.vdisplay != mode.vdisplay;
        m.push(
            mthd::HEAD_SCALE_CTRL + off,
            if doublescan || interlace || scaled { 9 } else { 0 },
        );
        m.push(mthd::HEAD_8A8 + off, 0x40000);
        m.push(mthd::HEAD_FB_POS + off, (y << 16) | (x & 0xffff));
        m.push(
            mthd::HEAD_SCALE_IN + off,
            ((mode.vdisplay as u32) << 16) | mode.hdisplay as u32,
        );
        m.push(mthd::HEAD_8D4 + off, 0);
        let out = ((c.vdisplay as u32) << 16) | c.hdisplay as u32;
        m.push(mthd::HEAD_SCALE_OUT + off, out);
        m.push(mthd::HEAD_SCALE_OUT2 + off, out);
        m
    }

    /// Blank or unblank scanout.
    ///
    /// Unblanking also places the cursor buffer, re-arms the video memory
    /// window and selects the depth-dependent CLUT mode.
    pub fn blank(&self, blank: bool, cfg: &DisplayConfig) -> MethodList {
        let off = self.head.method_offset();
        let mut m = MethodList::new();

        if blank {
            m.push(mthd::HEAD_CLUT_MODE + off, 0);
            m.push(mthd::HEAD_CLUT_OFFSET + off, 0);
            if !cfg.is_g80() {
                m.push(mthd::HEAD_CLUT_DMA + off, 0);
            }
            m.push(mthd::HEAD_FB_ENABLE + off, 0);
            if !cfg.is_g80() {
                m.push(mthd::HEAD_CURSOR_DMA + off, 0);
            }
        } else {
            let vram_bytes = cfg.video_ram_kbytes as u64 * 1024;
            let ram_bytes = cfg.ram_amount_kbytes as u64 * 1024;

            m.push(mthd::HEAD_FB_OFFSET + off, 0);
            m.push(mthd::HEAD_864 + off, 0);
            m.push_mmio(regs::DISP_VRAM_BASE, 0);
            m.push_mmio(regs::DISP_VRAM_LIMIT, ram_bytes.saturating_sub(1) as u32);
            m.push_mmio(regs::DISP_VRAM_FLAGS, 0x150000);
            m.push_mmio(regs::DISP_VRAM_OFFSET, 0);
            m.push(
                mthd::HEAD_CURSOR_OFFSET + off,
                ((cfg.video_ram_kbytes as u64) << 2).saturating_sub(0x40) as u32,
            );
            if !cfg.is_g80() {
                m.push(mthd::HEAD_CURSOR_DMA + off, 1);
            }
            m.push(
                mthd::HEAD_CLUT_MODE + off,
                if cfg.depth == 8 { 0x80000000 } else { 0xc0000000 },
            );
            m.push(
                mthd::HEAD_CLUT_OFFSET + off,
                (vram_bytes.saturating_sub(0x5000) >> 8) as u32,
            );
            if !cfg.is_g80() {
                m.push(mthd::HEAD_CLUT_DMA + off, 1);
            }
            m.push(mthd::HEAD_FB_ENABLE + off, 1);
        }
        m
    }

    /// Head teardown: nothing bound to it any more.
    pub fn disable(&mut self) {
        self.state = CrtcState::Disabled;
        self.pclk = 0;
    }

    /// Head power management is not implemented by the hardware interface;
    /// power is controlled per output.
    pub fn dpms(&self, on: bool) {
        log::debug!("crtc{}: dpms {} ignored", self.head.index(), if on { "on" } else { "off" });
    }

    /// Compute and write the PLL coefficients for the recorded target clock.
    ///
    /// Called from the supervisor handler. An infeasible clock leaves the
    /// PLL untouched.
    pub fn program_pclk<R: RegisterAccess + ?Sized>(&self, regs: &mut R) -> DispResult<PllParams> {
        let params = PllParams::solve(self.pclk);
        if params.is_zero() {
            log::error!("crtc{}: refusing to program a zero PLL for {} kHz", self.head.index(), self.pclk);
            return Err(DispError::NoPllSolution { pclk: self.pclk });
        }

        let off = self.head.pll_offset();
        let current = PllCoeffs {
            lo: regs.read32(regs::HEAD_PLL_LO + off),
            hi: regs.read32(regs::HEAD_PLL_HI + off),
        };
        regs.write32(regs::HEAD_PLL_CTRL + off, regs::HEAD_PLL_CTRL_PROGRAM);
        let coeffs = PllCoeffs::merge(current, &params);
        regs.write32(regs::HEAD_PLL_LO + off, coeffs.lo);
        regs.write32(regs::HEAD_PLL_HI + off, coeffs.hi);
        regs.write32(regs::HEAD_PLL_UPDATE + off, 0);

        log::debug!(
            "crtc{}: pclk {} kHz -> {:?} ({} kHz)",
            self.head.index(),
            self.pclk,
            params,
            params.frequency_khz()
        );
        Ok(params)
    }

    /// Pan the scanout origin.
    pub fn set_origin(&self, x: u32, y: u32) -> MethodList {
        let mut m = MethodList::new();
        m.push(mthd::HEAD_FB_POS + self.head.method_offset(), (y << 16) | (x & 0xffff));
        m.push(mthd::UPDATE, 0);
        m
    }

    pub fn show_cursor(&self, update: bool) -> MethodList {
        self.cursor_ctrl(0x85000000, update)
    }

    pub fn hide_cursor(&self, update: bool) -> MethodList {
        self.cursor_ctrl(0x05000000, update)
    }

    fn cursor_ctrl(&self, value: u32, update: bool) -> MethodList {
        let mut m = MethodList::new();
        m.push(mthd::HEAD_CURSOR_CTRL + self.head.method_offset(), value);
        if update {
            m.push(mthd::UPDATE, 0);
        }
        m
    }

    /// Cursor position bypasses the core channel.
    pub fn set_cursor_position(&self, x: i32, y: i32) -> MethodList {
        let off = regs::CURSOR_STRIDE * self.head.index();
        let mut m = MethodList::new();
        m.push_mmio(regs::CURSOR_POS + off, vh(y, x));
        m.push_mmio(regs::CURSOR_UPDATE + off, 0);
        m
    }

    pub fn set_dither(&self, enable: bool, update: bool) -> MethodList {
        let mut m = MethodList::new();
        m.push(
            mthd::HEAD_DITHER + self.head.method_offset(),
            if enable { 0x11 } else { 0 },
        );
        if update {
            m.push(mthd::UPDATE, 0);
        }
        m
    }
}
