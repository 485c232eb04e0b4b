//! EDID base block decoding

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::mode::{DisplayMode, ModeFlags, ModeType};

pub const EDID_BLOCK_LEN: usize = 128;

const HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const DESCRIPTORS: [usize; 4] = [54, 72, 90, 108];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdidError {
    TooShort,
    BadHeader,
    BadChecksum,
}

impl fmt::Display for EdidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdidError::TooShort => write!(f, "block shorter than 128 bytes"),
            EdidError::BadHeader => write!(f, "bad header"),
            EdidError::BadChecksum => write!(f, "bad checksum"),
        }
    }
}

/// Decoded EDID base block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edid {
    pub raw: [u8; EDID_BLOCK_LEN],
    pub manufacturer: [char; 3],
    pub product_code: u16,
    /// Digital input (DFP) rather than analog (CRT)
    pub digital: bool,
    pub width_cm: u8,
    pub height_cm: u8,
    pub name: Option<String>,
    /// Detailed timings, the first one marked preferred
    pub modes: Vec<DisplayMode>,
}

impl Edid {
    pub fn parse(data: &[u8]) -> Result<Edid, EdidError> {
        if data.len() < EDID_BLOCK_LEN {
            return Err(EdidError::TooShort);
        }
        let mut raw = [0u8; EDID_BLOCK_LEN];
        raw.copy_from_slice(&data[..EDID_BLOCK_LEN]);

        if raw[0..8] != HEADER {
            return Err(EdidError::BadHeader);
        }
        let sum = raw.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(EdidError::BadChecksum);
        }

        let id = ((raw[8] as u16) << 8) | raw[9] as u16;
        let letter = |v: u16| ((v & 0x1F) as u8 + b'A' - 1) as char;
        let manufacturer = [letter(id >> 10), letter(id >> 5), letter(id)];

        let mut name = None;
        let mut modes = Vec::new();
        for &base in DESCRIPTORS.iter() {
            let d = &raw[base..base + 18];
            if d[0] == 0 && d[1] == 0 {
                if d[3] == 0xFC {
                    name = Some(parse_string(&d[5..18]));
                }
                continue;
            }
            if let Some(mut mode) = parse_detailed_timing(d) {
                if modes.is_empty() {
                    mode.mode_type |= ModeType::PREFERRED;
                }
                modes.push(mode);
            }
        }

        Ok(Edid {
            raw,
            manufacturer,
            product_code: u16::from_le_bytes([raw[10], raw[11]]),
            digital: raw[20] & 0x80 != 0,
            width_cm: raw[21],
            height_cm: raw[22],
            name,
            modes,
        })
    }

    pub fn preferred_mode(&self) -> Option<&DisplayMode> {
        self.modes.first()
    }
}

/// Decode one 18-byte detailed timing descriptor.
fn parse_detailed_timing(d: &[u8]) -> Option<DisplayMode> {
    let clock = u16::from_le_bytes([d[0], d[1]]) as u32 * 10;

    let h_active = (((d[4] & 0xF0) as u16) << 4) | d[2] as u16;
    let h_blank = (((d[4] & 0x0F) as u16) << 8) | d[3] as u16;
    let v_active = (((d[7] & 0xF0) as u16) << 4) | d[5] as u16;
    let v_blank = (((d[7] & 0x0F) as u16) << 8) | d[6] as u16;

    let h_front = ((((d[11] >> 6) & 3) as u16) << 8) | d[8] as u16;
    let h_sync = ((((d[11] >> 4) & 3) as u16) << 8) | d[9] as u16;
    let v_front = ((((d[11] >> 2) & 3) as u16) << 4) | (d[10] >> 4) as u16;
    let v_sync = (((d[11] & 3) as u16) << 4) | (d[10] & 0x0F) as u16;

    if h_active == 0 || v_active == 0 || h_sync == 0 || v_sync == 0 {
        return None;
    }

    let mut flags = ModeFlags::empty();
    if (d[17] >> 3) & 3 == 3 {
        // digital separate sync
        flags |= if d[17] & 0x04 != 0 { ModeFlags::PVSYNC } else { ModeFlags::NVSYNC };
        flags |= if d[17] & 0x02 != 0 { ModeFlags::PHSYNC } else { ModeFlags::NHSYNC };
    }

    let mut v = (
        v_active,
        v_active + v_front,
        v_active + v_front + v_sync,
        v_active + v_blank,
    );
    if d[17] & 0x80 != 0 {
        // field timings
        flags |= ModeFlags::INTERLACE;
        v = (v.0 * 2, v.1 * 2, v.2 * 2, v.3 * 2 + 1);
    }

    let h = (
        h_active,
        h_active + h_front,
        h_active + h_front + h_sync,
        h_active + h_blank,
    );
    let mut mode = DisplayMode::from_timings(clock, h, v, flags);
    mode.mode_type = ModeType::DRIVER;
    Some(mode)
}

/// Descriptor text: 13 bytes, newline terminated, space padded.
fn parse_string(data: &[u8]) -> String {
    let mut s = String::new();
    for &b in data {
        if b == 0x0A || b == 0x00 {
            break;
        }
        if (0x20..=0x7E).contains(&b) {
            s.push(b as char);
        }
    }
    String::from(s.trim_end())
}
