//! Error types shared across the mode-setting core.

use core::fmt;

use crate::edid::EdidError;
use crate::i2c::I2cError;
use crate::output::ModeStatus;
use crate::routing::TableError;

/// Hardware acknowledgment loops that are bounded by a poll budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSite {
    /// Core channel busy bit (0x610300 bit 31)
    CoreChannel,
    /// Display engine going idle (0x610200 state field)
    EngineIdle,
    /// Display engine reporting ready (0x610200 bit 30)
    EngineReady,
    /// VGA ownership release (0x6194E8 bit 1)
    VgaRelease,
    /// Per-head disable acknowledge during shutdown
    HeadDisable,
    /// DAC control update pending
    DacBusy,
    /// SOR power update pending
    SorBusy,
}

impl WaitSite {
    pub fn name(&self) -> &'static str {
        match self {
            WaitSite::CoreChannel => "core channel",
            WaitSite::EngineIdle => "engine idle",
            WaitSite::EngineReady => "engine ready",
            WaitSite::VgaRelease => "VGA release",
            WaitSite::HeadDisable => "head disable",
            WaitSite::DacBusy => "DAC busy",
            WaitSite::SorBusy => "SOR busy",
        }
    }
}

/// Crate-wide error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispError {
    /// A hardware acknowledgment never arrived; treated as a fatal fault.
    Timeout(WaitSite),
    /// The PLL search found no feasible coefficients for this clock (kHz).
    NoPllSolution { pclk: u32 },
    /// A transmitter refused the requested mode.
    ModeRejected(ModeStatus),
    /// Output index does not exist.
    NoSuchOutput,
    /// Output is not bound to a head.
    NotBound,
    Table(TableError),
    I2c(I2cError),
    Edid(EdidError),
}

pub type DispResult<T> = core::result::Result<T, DispError>;

impl fmt::Display for DispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispError::Timeout(site) => write!(f, "timed out waiting for {}", site.name()),
            DispError::NoPllSolution { pclk } => {
                write!(f, "no PLL coefficients for {} kHz", pclk)
            }
            DispError::ModeRejected(status) => write!(f, "mode rejected: {}", status),
            DispError::NoSuchOutput => write!(f, "no such output"),
            DispError::NotBound => write!(f, "output is not bound to a head"),
            DispError::Table(e) => write!(f, "routing table: {}", e),
            DispError::I2c(e) => write!(f, "i2c: {}", e),
            DispError::Edid(e) => write!(f, "edid: {}", e),
        }
    }
}

impl From<TableError> for DispError {
    fn from(e: TableError) -> Self {
        DispError::Table(e)
    }
}

impl From<I2cError> for DispError {
    fn from(e: I2cError) -> Self {
        DispError::I2c(e)
    }
}

impl From<EdidError> for DispError {
    fn from(e: EdidError) -> Self {
        DispError::Edid(e)
    }
}
