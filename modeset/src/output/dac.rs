//! Analog DAC outputs

use crate::channel::MethodList;
use crate::config::DisplayConfig;
use crate::crtc::Head;
use crate::error::{DispResult, WaitSite};
use crate::mode::DisplayMode;
use crate::output::DpmsMode;
use crate::poll::{self, PollBudget};
use crate::regs::{self, mthd, DacControl, DacLoadSense, RegisterAccess, SyncPolarity};

/// Analog settling time after the load pattern is applied
const LOAD_SETTLE_US: u32 = 4500;

const MODE_CTRL_ENABLE: u32 = 0x40;

fn reg_offset(or: u32) -> u32 {
    regs::DAC_STRIDE * or
}

fn method_offset(or: u32) -> u32 {
    mthd::DAC_STRIDE * or
}

fn budget(cfg: &DisplayConfig) -> PollBudget {
    PollBudget::new(cfg.timeouts.output_us, cfg.timeouts.poll_interval_us)
}

pub fn set_clock_limit<R: RegisterAccess + ?Sized>(regs: &mut R, or: u32) {
    regs.write32(regs::DAC_CLK_LIMIT + regs::OR_CLK_STRIDE * or, 0);
}

/// Drive a test pattern and check whether all three colour channels see a
/// termination load.
pub fn load_detect<R: RegisterAccess + ?Sized>(regs: &mut R, or: u32, cfg: &DisplayConfig) -> DispResult<bool> {
    let off = reg_offset(or);
    log::info!("dac{}: trying load detection on VGA{}", or, or);

    regs.write32(regs::DAC_TEST + off, 1);
    regs.write32(regs::DAC_CTRL + off, regs::DAC_CTRL_LOAD_ARM);
    if let Err(e) = poll::wait_clear(regs, regs::DAC_CTRL + off, regs::DAC_CTRL_PENDING, budget(cfg), WaitSite::DacBusy) {
        regs.write32(regs::DAC_CTRL + off, regs::DAC_CTRL_NORMAL);
        return Err(e);
    }
    regs.write32(regs::DAC_LOAD + off, DacLoadSense::drive(cfg.dac_load_value()));
    regs.delay_us(LOAD_SETTLE_US);
    let load = DacLoadSense(regs.read32(regs::DAC_LOAD + off));
    regs.write32(regs::DAC_LOAD + off, 0);
    regs.write32(regs::DAC_CTRL + off, regs::DAC_CTRL_NORMAL);

    let found = load.all_channels_loaded();
    log::info!("dac{}: {}", or, if found { "found one!" } else { "nothing" });
    Ok(found)
}

pub fn set_dpms<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    or: u32,
    mode: DpmsMode,
    cfg: &DisplayConfig,
) -> DispResult<()> {
    let ctrl = regs::DAC_CTRL + reg_offset(or);
    let current = poll::wait_clear(regs, ctrl, regs::DAC_CTRL_PENDING, budget(cfg), WaitSite::DacBusy)?;
    regs.write32(ctrl, DacControl(current).with_dpms(mode));
    Ok(())
}

/// Routing methods; `None` disconnects the DAC.
pub fn mode_set(or: u32, head: Head, mode: Option<&DisplayMode>, cfg: &DisplayConfig) -> MethodList {
    let off = method_offset(or);
    let mut m = MethodList::new();
    match mode {
        None => m.push(mthd::DAC_MODE_CTRL + off, 0),
        Some(mode) => {
            log::info!("dac{}: mode {} -> HEAD{}", or, mode.name, head.index());
            m.push(mthd::DAC_MODE_CTRL + off, regs::owner_bits(head) | MODE_CTRL_ENABLE);
            m.push(
                mthd::DAC_MODE_CTRL2 + off,
                SyncPolarity::dac(mode.flags, cfg.legacy_dac_sync_encoding),
            );
        }
    }
    m
}
