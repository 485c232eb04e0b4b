//! Output resources (transmitters)
//!
//! Two kinds of transmitter exist: analog DACs and serial output resources
//! (SORs). A SOR drives either an external TMDS link or the internal LVDS
//! panel. Every transmitter sits behind exactly one connector port.

pub mod dac;
pub mod sor;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::channel::MethodList;
use crate::config::DisplayConfig;
use crate::crtc::Head;
use crate::edid::Edid;
use crate::error::{DispError, DispResult};
use crate::mode::DisplayMode;
use crate::regs::RegisterAccess;

/// Lowest pixel clock any transmitter accepts, kHz
pub const MIN_CLOCK_KHZ: u32 = 25_000;
pub const DAC_MAX_CLOCK_KHZ: u32 = 400_000;
/// Dual link TMDS
pub const TMDS_MAX_CLOCK_KHZ: u32 = 330_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelType {
    /// External digital (DVI)
    Tmds,
    /// Internal panel
    Lvds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Dac,
    Sor(PanelType),
}

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// DPMS (Display Power Management Signaling) mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpmsMode {
    On,
    Standby,
    Suspend,
    Off,
}

/// Result of validating a mode against a transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    Ok,
    ClockLow,
    ClockHigh,
    /// Larger than the panel's native size
    PanelSize,
    /// No PLL setting produces the pixel clock
    NoClock,
}

impl fmt::Display for ModeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeStatus::Ok => write!(f, "ok"),
            ModeStatus::ClockLow => write!(f, "pixel clock too low"),
            ModeStatus::ClockHigh => write!(f, "pixel clock too high"),
            ModeStatus::PanelSize => write!(f, "larger than the panel"),
            ModeStatus::NoClock => write!(f, "pixel clock out of PLL range"),
        }
    }
}

pub struct Output {
    kind: OutputKind,
    or: u32,
    port: u32,
    name: String,
    head: Option<Head>,
    status: ConnectionStatus,
    edid: Option<Edid>,
    native_mode: Option<DisplayMode>,
}

impl Output {
    pub fn dac(or: u32, port: u32) -> Self {
        Self::new(OutputKind::Dac, or, port, alloc::format!("VGA{}", or))
    }

    pub fn tmds(or: u32, port: u32) -> Self {
        Self::new(OutputKind::Sor(PanelType::Tmds), or, port, alloc::format!("DVI{}", or))
    }

    /// Internal panel; without a native mode it accepts nothing.
    pub fn lvds(or: u32, port: u32, native_mode: Option<DisplayMode>) -> Self {
        let mut output = Self::new(OutputKind::Sor(PanelType::Lvds), or, port, alloc::format!("LVDS{}", or));
        output.native_mode = native_mode;
        output
    }

    fn new(kind: OutputKind, or: u32, port: u32, name: String) -> Self {
        Self {
            kind,
            or,
            port,
            name,
            head: None,
            status: ConnectionStatus::Unknown,
            edid: None,
            native_mode: None,
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn or(&self) -> u32 {
        self.or
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head(&self) -> Option<Head> {
        self.head
    }

    pub fn edid(&self) -> Option<&Edid> {
        self.edid.as_ref()
    }

    pub fn native_mode(&self) -> Option<&DisplayMode> {
        self.native_mode.as_ref()
    }

    pub fn is_panel(&self) -> bool {
        self.kind == OutputKind::Sor(PanelType::Lvds)
    }

    /// Detection result of the current pass, `Unknown` once invalidated.
    pub fn cached_status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn bind(&mut self, head: Option<Head>) {
        self.head = head;
    }

    pub(crate) fn set_detected(&mut self, status: ConnectionStatus, edid: Option<Edid>) {
        self.status = status;
        self.edid = edid;
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub(crate) fn set_edid(&mut self, edid: Option<Edid>) {
        self.edid = edid;
    }

    pub(crate) fn invalidate(&mut self) {
        self.status = ConnectionStatus::Unknown;
    }

    /// A panel is bounded by its own native clock, since fixup drives the
    /// native timing whatever was asked for.
    pub fn max_clock(&self) -> u32 {
        match self.kind {
            OutputKind::Dac => DAC_MAX_CLOCK_KHZ,
            OutputKind::Sor(PanelType::Tmds) => TMDS_MAX_CLOCK_KHZ,
            OutputKind::Sor(PanelType::Lvds) => self.native_mode.as_ref().map_or(0, |m| m.clock),
        }
    }

    pub fn mode_valid(&self, mode: &DisplayMode) -> ModeStatus {
        if mode.clock < MIN_CLOCK_KHZ {
            return ModeStatus::ClockLow;
        }
        if self.is_panel() {
            match &self.native_mode {
                Some(native) if mode.hdisplay <= native.hdisplay && mode.vdisplay <= native.vdisplay => {}
                _ => return ModeStatus::PanelSize,
            }
        }
        if mode.clock > self.max_clock() {
            return ModeStatus::ClockHigh;
        }
        ModeStatus::Ok
    }

    /// Replace `mode` with what this output will actually drive. Returns
    /// `true` when the head must not derive its own timings.
    pub fn mode_fixup(&self, mode: &mut DisplayMode) -> bool {
        match (&self.native_mode, self.is_panel()) {
            (Some(native), true) => {
                *mode = native.clone();
                true
            }
            _ => false,
        }
    }

    pub fn set_clock_limit<R: RegisterAccess + ?Sized>(&self, regs: &mut R, pclk: u32) {
        match self.kind {
            OutputKind::Dac => dac::set_clock_limit(regs, self.or),
            OutputKind::Sor(panel) => sor::set_clock_limit(regs, self.or, panel, pclk),
        }
    }

    pub fn set_dpms<R: RegisterAccess + ?Sized>(
        &self,
        regs: &mut R,
        mode: DpmsMode,
        cfg: &DisplayConfig,
    ) -> DispResult<()> {
        match self.kind {
            OutputKind::Dac => dac::set_dpms(regs, self.or, mode, cfg),
            OutputKind::Sor(_) => sor::set_dpms(regs, self.or, mode, cfg),
        }
    }

    /// Methods routing this output to its head, or its off state for `None`.
    pub fn mode_set<R: RegisterAccess + ?Sized>(
        &self,
        regs: &mut R,
        mode: Option<&DisplayMode>,
        cfg: &DisplayConfig,
    ) -> DispResult<MethodList> {
        let head = match (mode, self.head) {
            (Some(_), None) => return Err(DispError::NotBound),
            (_, head) => head.unwrap_or(Head::Head0),
        };
        match self.kind {
            OutputKind::Dac => Ok(dac::mode_set(self.or, head, mode, cfg)),
            OutputKind::Sor(panel) => sor::mode_set(regs, self.or, panel, head, mode, cfg),
        }
    }

    /// Modes this output can offer: the native timing for a panel, the EDID
    /// detailed timings otherwise.
    pub fn modes(&self) -> Vec<DisplayMode> {
        if self.is_panel() {
            return self.native_mode.iter().cloned().collect();
        }
        self.edid.as_ref().map(|e| e.modes.clone()).unwrap_or_default()
    }
}
