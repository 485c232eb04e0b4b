//! Core channel command submission
//!
//! A method is a `(address, data)` pair written through the request/data
//! register pair. The engine keeps the busy bit set until the method
//! retires, and may raise a supervisor event in the meantime that must be
//! serviced and acknowledged before it makes progress.
//!
//! Submission is split in two phases so the caller can service supervisor
//! events with access to its own state:
//!
//! ```text
//! let handle = CoreChannel::submit(regs, method);
//! loop {
//!     match handle.poll(regs) {
//!         CommandPoll::Done => break,
//!         CommandPoll::Pending => { /* spend poll budget */ }
//!         CommandPoll::Supervisor(ev) => { /* service */ handle.acknowledge(regs, ev) }
//!     }
//! }
//! ```

use alloc::vec::Vec;

use crate::crtc::{Head, HeadMask};
use crate::regs::{self, CommandRequest, RegisterAccess, SupervisorHeads, SupervisorStatus};

/// One core channel method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub addr: u32,
    pub data: u32,
}

/// One step of a configuration sequence: either a method through the core
/// channel or a direct register write that must land between two methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Method(Method),
    Mmio { offset: u32, value: u32 },
}

/// Ordered configuration sequence produced by CRTC and output logic and
/// executed by the display context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodList {
    steps: Vec<Step>,
}

impl MethodList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, addr: u32, data: u32) {
        self.steps.push(Step::Method(Method { addr, data }));
    }

    pub fn push_mmio(&mut self, offset: u32, value: u32) {
        self.steps.push(Step::Mmio { offset, value });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    fn methods(&self) -> impl DoubleEndedIterator<Item = &Method> {
        self.steps.iter().filter_map(|s| match s {
            Step::Method(m) => Some(m),
            Step::Mmio { .. } => None,
        })
    }

    /// Data of the last method sent to `addr`, if any.
    pub fn find(&self, addr: u32) -> Option<u32> {
        self.methods().rev().find(|m| m.addr == addr).map(|m| m.data)
    }

    /// Methods only, as `(addr, data)` pairs.
    pub fn as_pairs(&self) -> Vec<(u32, u32)> {
        self.methods().map(|m| (m.addr, m.data)).collect()
    }
}

impl IntoIterator for MethodList {
    type Item = Step;
    type IntoIter = alloc::vec::IntoIter<Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

/// Supervisor event raised while a method is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorEvent {
    /// 1-based supervisor class
    pub class: u8,
    /// For class 2: heads whose pixel clock must be reprogrammed
    pub heads: HeadMask,
}

impl SupervisorEvent {
    pub const CLOCK_UPDATE: u8 = 2;

    pub fn needs_clock_update(&self) -> bool {
        self.class == Self::CLOCK_UPDATE && !self.heads.is_empty()
    }
}

/// Result of one poll of an in-flight method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPoll {
    Pending,
    Supervisor(SupervisorEvent),
    Done,
}

pub struct CoreChannel;

impl CoreChannel {
    /// Write the method and trigger it. Only one method may be in flight.
    pub fn submit<R: RegisterAccess + ?Sized>(regs: &mut R, method: Method) -> WaitHandle {
        regs.write32(regs::DISP_CMD_DATA, method.data);
        regs.write32(regs::DISP_CMD_CTRL, CommandRequest::pack(method.addr));
        WaitHandle { method }
    }
}

/// An in-flight method.
#[derive(Debug)]
#[must_use = "a submitted method must be polled until it retires"]
pub struct WaitHandle {
    method: Method,
}

impl WaitHandle {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn poll<R: RegisterAccess + ?Sized>(&self, regs: &mut R) -> CommandPoll {
        if !CommandRequest::is_busy(regs.read32(regs::DISP_CMD_CTRL)) {
            return CommandPoll::Done;
        }

        let class = SupervisorStatus(regs.read32(regs::DISP_SUPERVISOR)).class();
        if class == 0 {
            return CommandPoll::Pending;
        }

        let mut heads = HeadMask::empty();
        if class == SupervisorEvent::CLOCK_UPDATE {
            let detail = SupervisorHeads(regs.read32(regs::DISP_SUPERVISOR_HEADS));
            for head in Head::ALL {
                if detail.needs_clock(head) {
                    heads |= head.mask();
                }
            }
        }
        log::debug!(
            "g80: supervisor {} during method {:#05x} (heads {:?})",
            class,
            self.method.addr,
            heads
        );
        CommandPoll::Supervisor(SupervisorEvent { class, heads })
    }

    /// Acknowledge a serviced supervisor event so the method can retire.
    pub fn acknowledge<R: RegisterAccess + ?Sized>(&self, regs: &mut R, event: SupervisorEvent) {
        regs.write32(regs::DISP_SUPERVISOR, SupervisorStatus::ack(event.class));
        regs.write32(regs::DISP_SUPERVISOR_HEADS, SupervisorHeads::ACK);
    }
}
