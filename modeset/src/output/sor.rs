//! Serial output resources: TMDS and LVDS transmitters

use crate::channel::MethodList;
use crate::config::DisplayConfig;
use crate::crtc::Head;
use crate::error::{DispResult, WaitSite};
use crate::mode::{DisplayMode, ModeFlags, ModeType};
use crate::output::{DpmsMode, PanelType};
use crate::poll::{self, PollBudget};
use crate::regs::{self, armed, mthd, RegisterAccess, SorControl, SyncPolarity};

/// Above this pixel clock a TMDS link needs both lanes.
pub const DUAL_LINK_THRESHOLD_KHZ: u32 = 165_000;
/// Above this pixel clock the panel link runs with the raised clock limit.
pub const LVDS_CLOCK_LIMIT_KHZ: u32 = 112_000;

const PROTOCOL_LVDS: u32 = 0x000;
const PROTOCOL_TMDS_SINGLE: u32 = 0x100;
const PROTOCOL_TMDS_DUAL: u32 = 0x500;

pub fn is_dual_link(panel: PanelType, pclk: u32) -> bool {
    panel == PanelType::Tmds && pclk > DUAL_LINK_THRESHOLD_KHZ
}

pub fn protocol(panel: PanelType, pclk: u32) -> u32 {
    match panel {
        PanelType::Lvds => PROTOCOL_LVDS,
        PanelType::Tmds if is_dual_link(panel, pclk) => PROTOCOL_TMDS_DUAL,
        PanelType::Tmds => PROTOCOL_TMDS_SINGLE,
    }
}

pub fn clock_limit_threshold(panel: PanelType) -> u32 {
    match panel {
        PanelType::Tmds => DUAL_LINK_THRESHOLD_KHZ,
        PanelType::Lvds => LVDS_CLOCK_LIMIT_KHZ,
    }
}

pub fn set_clock_limit<R: RegisterAccess + ?Sized>(regs: &mut R, or: u32, panel: PanelType, pclk: u32) {
    let limit = if pclk > clock_limit_threshold(panel) {
        regs::SOR_CLK_DUAL_LINK
    } else {
        0
    };
    regs.write32(regs::SOR_CLK_LIMIT + regs::OR_CLK_STRIDE * or, limit);
}

pub fn set_dpms<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    or: u32,
    mode: DpmsMode,
    cfg: &DisplayConfig,
) -> DispResult<()> {
    let pwr = regs::SOR_PWR + regs::SOR_STRIDE * or;
    let budget = PollBudget::new(cfg.timeouts.output_us, cfg.timeouts.poll_interval_us);
    let current = poll::wait_clear(regs, pwr, regs::SOR_PWR_PENDING, budget, WaitSite::SorBusy)?;
    regs.write32(pwr, SorControl(current).with_power(mode == DpmsMode::On));
    Ok(())
}

/// Routing methods; `None` disconnects the SOR.
///
/// The SOR powers itself down on disconnect, so it is forced back on before
/// being routed to a head.
pub fn mode_set<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    or: u32,
    panel: PanelType,
    head: Head,
    mode: Option<&DisplayMode>,
    cfg: &DisplayConfig,
) -> DispResult<MethodList> {
    let addr = mthd::SOR_MODE_CTRL + mthd::SOR_STRIDE * or;
    let mut m = MethodList::new();

    let Some(mode) = mode else {
        m.push(addr, 0);
        return Ok(m);
    };

    set_dpms(regs, or, DpmsMode::On, cfg)?;
    log::info!(
        "sor{}: mode {} -> HEAD{} ({:?}{})",
        or,
        mode.name,
        head.index(),
        panel,
        if is_dual_link(panel, mode.clock) { ", dual link" } else { "" }
    );
    m.push(
        addr,
        regs::owner_bits(head) | protocol(panel, mode.clock) | SyncPolarity::sor(mode.flags),
    );
    Ok(m)
}

/// Recover the panel's native timing from the head the firmware lit it on.
///
/// The armed registers hold the values the head methods were last latched
/// with; blank start and blank end are the active size and total, and sync
/// positions are stored relative to sync start.
pub fn read_native_mode<R: RegisterAccess + ?Sized>(regs: &mut R) -> Option<DisplayMode> {
    let strap = regs.read32(regs::DISP_PANEL_STRAP);
    let off = if strap & 0x3 == 0x1 {
        0
    } else if strap & 0x300 == 0x100 {
        armed::HEAD1_OFFSET
    } else {
        log::warn!("sor: no head is driving the panel (strap {:#010x})", strap);
        return None;
    };

    let clock = regs.read32(armed::CLOCK + off) & 0x3fffff;
    let size = regs.read32(armed::SIZE + off);
    let total = regs.read32(armed::TOTAL + off);
    let sync_end = regs.read32(armed::SYNC_END + off);
    let blank_end = regs.read32(armed::BLANK_END + off);
    let blank_start = regs.read32(armed::BLANK_START + off);

    let lo = |v: u32| (v & 0xffff) as i32;
    let hi = |v: u32| (v >> 16) as i32;

    let hdisplay = (size & 0x3fff) as i32;
    let vdisplay = ((size >> 16) & 0x3fff) as i32;
    let (htotal, vtotal) = (lo(total), hi(total));
    if clock == 0 || hdisplay == 0 || vdisplay == 0 || htotal == 0 || vtotal == 0 {
        log::warn!("sor: panel timing registers are not armed");
        return None;
    }

    let hsync_start = htotal + hdisplay - (lo(blank_start) + 1);
    let hsync_end = hsync_start + lo(sync_end) + 1;
    let hblank_end = hsync_start + lo(blank_end) + 1;
    let vsync_start = vtotal + vdisplay - (hi(blank_start) + 1);
    let vsync_end = vsync_start + hi(sync_end) + 1;
    let vblank_end = vsync_start + hi(blank_end) + 1;

    let field = |v: i32| v.clamp(0, u16::MAX as i32) as u16;
    let mut mode = DisplayMode::from_timings(
        clock,
        (field(hdisplay), field(hsync_start), field(hsync_end), field(htotal)),
        (field(vdisplay), field(vsync_start), field(vsync_end), field(vtotal)),
        ModeFlags::empty(),
    );
    mode.crtc.hblank_end = field(hblank_end);
    mode.crtc.vblank_end = field(vblank_end);
    mode.mode_type = ModeType::DRIVER | ModeType::PREFERRED;

    log::info!(
        "sor: panel native mode {} @ {} kHz ({} Hz)",
        mode.name,
        clock,
        mode.vrefresh()
    );
    Some(mode)
}
