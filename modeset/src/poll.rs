//! Bounded register polling.
//!
//! Every hardware acknowledgment loop goes through here so that a device
//! which stops responding surfaces as [`DispError::Timeout`] instead of
//! hanging the driver.

use crate::error::{DispError, DispResult, WaitSite};
use crate::regs::RegisterAccess;

/// Remaining poll budget for one wait.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    remaining_us: u32,
    interval_us: u32,
}

impl PollBudget {
    pub fn new(timeout_us: u32, interval_us: u32) -> Self {
        Self {
            remaining_us: timeout_us,
            interval_us: interval_us.max(1),
        }
    }

    /// Sleep one interval. Returns `false` once the budget is spent.
    pub fn tick<R: RegisterAccess + ?Sized>(&mut self, regs: &mut R) -> bool {
        if self.remaining_us == 0 {
            return false;
        }
        let step = self.interval_us.min(self.remaining_us);
        regs.delay_us(step);
        self.remaining_us -= step;
        true
    }
}

/// Poll `offset` until `done(value)` holds; returns the satisfying value.
pub fn wait_until<R, F>(
    regs: &mut R,
    offset: u32,
    mut budget: PollBudget,
    site: WaitSite,
    mut done: F,
) -> DispResult<u32>
where
    R: RegisterAccess + ?Sized,
    F: FnMut(u32) -> bool,
{
    loop {
        let value = regs.read32(offset);
        if done(value) {
            return Ok(value);
        }
        if !budget.tick(regs) {
            log::error!(
                "g80: {} did not acknowledge (reg {:#08x} = {:#010x})",
                site.name(),
                offset,
                value
            );
            return Err(DispError::Timeout(site));
        }
    }
}

/// Poll until every bit of `mask` is clear.
pub fn wait_clear<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    offset: u32,
    mask: u32,
    budget: PollBudget,
    site: WaitSite,
) -> DispResult<u32> {
    wait_until(regs, offset, budget, site, |v| v & mask == 0)
}

/// Poll until any bit of `mask` is set.
pub fn wait_set<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    offset: u32,
    mask: u32,
    budget: PollBudget,
    site: WaitSite,
) -> DispResult<u32> {
    wait_until(regs, offset, budget, site, |v| v & mask != 0)
}
