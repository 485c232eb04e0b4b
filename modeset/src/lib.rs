//! G80 display mode-setting core
//!
//! Decides which display-engine register values to write, and when:
//! - PLL synthesis for the per-head pixel clocks
//! - Core channel command submission with supervisor servicing
//! - CRTC timing programming, blanking and teardown
//! - DAC / SOR output control, load detection and DDC probing
//! - Firmware port routing table decoding
//!
//! The host driver owns memory allocation, acceleration and console
//! save/restore. It hands this crate a [`RegisterAccess`] implementation and
//! calls into a [`Display`] context.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod channel;
pub mod config;
pub mod crtc;
pub mod display;
pub mod edid;
pub mod error;
pub mod i2c;
pub mod mode;
pub mod output;
pub mod pll;
pub mod poll;
pub mod regs;
pub mod routing;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{DisplayConfig, I2cTimings, Timeouts};
pub use crtc::{Crtc, CrtcState, Head, HeadMask};
pub use display::{Display, LockedDisplay};
pub use error::{DispError, DispResult};
pub use mode::{DisplayMode, ModeFlags};
pub use output::{ConnectionStatus, DpmsMode, ModeStatus, Output, OutputKind, PanelType};
pub use pll::PllParams;
pub use regs::{Mmio, RegisterAccess};
pub use routing::{PortMap, TableError};
