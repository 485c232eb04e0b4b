//! Driver configuration supplied by the host at construction.

/// Poll budgets for hardware acknowledgment loops, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Core channel command retirement (supervisor servicing included)
    pub command_us: u32,
    /// Display engine bring-up / teardown transitions
    pub engine_us: u32,
    /// DAC / SOR control register updates
    pub output_us: u32,
    /// Delay between two polls of the same register
    pub poll_interval_us: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_us: 2_000_000,
            engine_us: 2_000_000,
            output_us: 100_000,
            poll_interval_us: 1,
        }
    }
}

/// Bit-bang DDC timings in microseconds.
///
/// Values follow the VESA DDC specification with a 10% margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cTimings {
    pub rise_fall_time: u32,
    pub hold_time: u32,
    pub start_timeout: u32,
    pub bit_timeout: u32,
    pub byte_timeout: u32,
    pub ack_timeout: u32,
}

impl Default for I2cTimings {
    fn default() -> Self {
        Self {
            rise_fall_time: 2,
            hold_time: 5,
            start_timeout: 550,
            bit_timeout: 40,
            byte_timeout: 2200,
            ack_timeout: 40,
        }
    }
}

/// Screen and chip parameters the mode-setting core needs from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Chip architecture from PMC_BOOT_0 (0x50 for the original G80)
    pub architecture: u32,
    /// Total video memory
    pub ram_amount_kbytes: u32,
    /// Mapped video memory
    pub video_ram_kbytes: u32,
    /// Screen depth (8, 15, 16 or 24)
    pub depth: u32,
    pub bits_per_pixel: u32,
    pub virtual_x: u32,
    pub virtual_y: u32,
    /// Scanout pitch in pixels
    pub display_width: u32,
    pub dither: bool,
    /// Encode DAC sync polarity the way the first driver releases did:
    /// NHSYNC alone wins and NVSYNC is only honoured without it.
    pub legacy_dac_sync_encoding: bool,
    pub timeouts: Timeouts,
    pub i2c: I2cTimings,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            architecture: 0x50,
            ram_amount_kbytes: 256 * 1024,
            video_ram_kbytes: 256 * 1024,
            depth: 24,
            bits_per_pixel: 32,
            virtual_x: 1920,
            virtual_y: 1200,
            display_width: 1920,
            dither: false,
            legacy_dac_sync_encoding: false,
            timeouts: Timeouts::default(),
            i2c: I2cTimings::default(),
        }
    }
}

impl DisplayConfig {
    /// G80 proper lacks the extra per-head methods (0x85C / 0x89C).
    pub fn is_g80(&self) -> bool {
        self.architecture == 0x50
    }

    /// Method data selecting the scanout surface format for the screen depth.
    pub fn surface_format(&self) -> Option<u32> {
        match self.depth {
            8 => Some(0x1E00),
            15 => Some(0xE900),
            16 => Some(0xE800),
            24 => Some(0xCF00),
            _ => None,
        }
    }

    /// DAC load-detection drive level.
    pub fn dac_load_value(&self) -> u32 {
        if self.is_g80() {
            420
        } else {
            340
        }
    }
}
