//! Display timings

use alloc::string::String;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u32 {
        const PHSYNC = 1 << 0;
        const NHSYNC = 1 << 1;
        const PVSYNC = 1 << 2;
        const NVSYNC = 1 << 3;
        const INTERLACE = 1 << 4;
        const DBLSCAN = 1 << 5;
        const CSYNC = 1 << 6;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeType: u32 {
        const PREFERRED = 1 << 3;
        const DRIVER = 1 << 6;
    }
}

/// Timings as the head generates them. Blank windows are explicit here;
/// the user-facing fields of [`DisplayMode`] only carry sync positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrtcTimings {
    pub hdisplay: u16,
    pub hblank_start: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub hblank_end: u16,
    pub htotal: u16,
    pub vdisplay: u16,
    pub vblank_start: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vblank_end: u16,
    pub vtotal: u16,
}

/// A video mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMode {
    pub name: String,
    pub clock: u32, // Pixel clock in kHz
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub flags: ModeFlags,
    pub mode_type: ModeType,
    pub crtc: CrtcTimings,
}

impl DisplayMode {
    /// Build a mode from horizontal and vertical
    /// `(display, sync_start, sync_end, total)` tuples.
    pub fn from_timings(
        clock: u32,
        h: (u16, u16, u16, u16),
        v: (u16, u16, u16, u16),
        flags: ModeFlags,
    ) -> Self {
        let mut mode = Self {
            name: alloc::format!("{}x{}", h.0, v.0),
            clock,
            hdisplay: h.0,
            hsync_start: h.1,
            hsync_end: h.2,
            htotal: h.3,
            vdisplay: v.0,
            vsync_start: v.1,
            vsync_end: v.2,
            vtotal: v.3,
            flags,
            mode_type: ModeType::empty(),
            crtc: CrtcTimings::default(),
        };
        mode.set_crtc_values();
        mode
    }

    /// Derive the head timings from the user timings.
    ///
    /// Doublescan doubles every vertical value; blanking covers everything
    /// outside the active area.
    pub fn set_crtc_values(&mut self) {
        let vscale = if self.flags.contains(ModeFlags::DBLSCAN) { 2 } else { 1 };
        let c = &mut self.crtc;

        c.hdisplay = self.hdisplay;
        c.hsync_start = self.hsync_start;
        c.hsync_end = self.hsync_end;
        c.htotal = self.htotal;
        c.vdisplay = self.vdisplay.saturating_mul(vscale);
        c.vsync_start = self.vsync_start.saturating_mul(vscale);
        c.vsync_end = self.vsync_end.saturating_mul(vscale);
        c.vtotal = self.vtotal.saturating_mul(vscale);

        c.hblank_start = c.hsync_start.min(c.hdisplay);
        c.hblank_end = c.hsync_end.max(c.htotal);
        c.vblank_start = c.vsync_start.min(c.vdisplay);
        c.vblank_end = c.vsync_end.max(c.vtotal);
    }

    /// Vertical refresh in Hz.
    pub fn vrefresh(&self) -> u32 {
        let pixels = self.htotal as u32 * self.vtotal as u32;
        if pixels == 0 {
            return 0;
        }
        let mut refresh = (self.clock as u64 * 1000 + pixels as u64 / 2) / pixels as u64;
        if self.flags.contains(ModeFlags::INTERLACE) {
            refresh *= 2;
        }
        if self.flags.contains(ModeFlags::DBLSCAN) {
            refresh /= 2;
        }
        refresh as u32
    }

    pub fn is_interlaced(&self) -> bool {
        self.flags.contains(ModeFlags::INTERLACE)
    }

    pub fn is_doublescan(&self) -> bool {
        self.flags.contains(ModeFlags::DBLSCAN)
    }
}
