//! Firmware connector routing table
//!
//! The video BIOS carries a table mapping each DDC port to the DAC and SOR
//! wired to that connector:
//!
//! ```text
//! rom[0x00]   u16  0xAA55 signature
//! rom[0x36]   u16  offset of the routing sub-table
//! t[0]        u8   0x40
//! t[1]        u8   header size
//! t[2]        u8   entry count
//! t[6]        u32  0x4EDCBDCB marker
//! t[hdr+8*i]  u32  entry: type[3:0] port[7:4] or_mask[27:24]
//! ```

use core::fmt;

use crate::output::PanelType;

pub const MAX_PORTS: usize = 4;
/// Analog transmitters on the chip
pub const NUM_DACS: u32 = 3;
/// Serial output resources on the chip
pub const NUM_SORS: u32 = 2;

const ROM_SIGNATURE: u16 = 0xAA55;
const ROM_TABLE_PTR: usize = 0x36;
const TABLE_SIGNATURE: u8 = 0x40;
const TABLE_MAGIC: u32 = 0x4EDC_BDCB;
const ENTRY_SIZE: usize = 8;
const PORT_UNUSED: u32 = 0xF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// ROM image does not start with 0xAA55
    BadSignature,
    /// Sub-table does not start with 0x40
    BadSubtableSignature,
    /// Sub-table marker is not 0x4EDCBDCB
    BadMagic,
    /// Table extends past the end of the image
    Truncated,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::BadSignature => write!(f, "bad ROM signature"),
            TableError::BadSubtableSignature => write!(f, "bad sub-table signature"),
            TableError::BadMagic => write!(f, "bad sub-table marker"),
            TableError::Truncated => write!(f, "table truncated"),
        }
    }
}

/// Technology class of a table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Crt,
    Tv,
    Tmds,
    Lvds,
}

impl EntryType {
    fn from_raw(raw: u32) -> Option<EntryType> {
        match raw {
            0 => Some(EntryType::Crt),
            1 => Some(EntryType::Tv),
            2 => Some(EntryType::Tmds),
            3 => Some(EntryType::Lvds),
            _ => None,
        }
    }
}

/// One decoded table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub kind: EntryType,
    pub port: u32,
    pub or: u32,
}

impl RouteEntry {
    /// Decode a raw entry word. `None` for entries that route nothing.
    pub fn decode(raw: u32) -> Option<RouteEntry> {
        let kind = EntryType::from_raw(raw & 0xf)?;
        let port = (raw >> 4) & 0xf;
        if port == PORT_UNUSED {
            return None;
        }
        let mask = (raw >> 24) & 0xf;
        if mask == 0 {
            log::warn!("routing: entry {:#010x} names no output resource", raw);
            return None;
        }
        Some(RouteEntry {
            kind,
            port,
            or: mask.trailing_zeros(),
        })
    }
}

/// Transmitters wired to one port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortRoute {
    pub dac: Option<u32>,
    pub sor: Option<(u32, PanelType)>,
}

/// Port to transmitter mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMap {
    ports: [PortRoute; MAX_PORTS],
}

fn read_u16(rom: &[u8], at: usize) -> Result<u16, TableError> {
    rom.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(TableError::Truncated)
}

fn read_u32(rom: &[u8], at: usize) -> Result<u32, TableError> {
    rom.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(TableError::Truncated)
}

impl PortMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(rom: &[u8]) -> Result<PortMap, TableError> {
        if read_u16(rom, 0)? != ROM_SIGNATURE {
            return Err(TableError::BadSignature);
        }
        let table = read_u16(rom, ROM_TABLE_PTR)? as usize;
        let header = rom.get(table..table + 3).ok_or(TableError::Truncated)?;
        if header[0] != TABLE_SIGNATURE {
            return Err(TableError::BadSubtableSignature);
        }
        if read_u32(rom, table + 6)? != TABLE_MAGIC {
            return Err(TableError::BadMagic);
        }
        let header_size = header[1] as usize;
        let entries = header[2] as usize;

        let mut map = PortMap::empty();
        for i in 0..entries {
            let raw = read_u32(rom, table + header_size + ENTRY_SIZE * i)?;
            if let Some(entry) = RouteEntry::decode(raw) {
                map.insert(entry);
            }
        }
        Ok(map)
    }

    fn insert(&mut self, entry: RouteEntry) {
        let Some(route) = self.ports.get_mut(entry.port as usize) else {
            log::warn!("routing: port {} out of range, entry ignored", entry.port);
            return;
        };
        let (family, count) = match entry.kind {
            EntryType::Crt | EntryType::Tv => ("DAC", NUM_DACS),
            EntryType::Tmds | EntryType::Lvds => ("SOR", NUM_SORS),
        };
        if entry.or >= count {
            log::warn!("routing: no {}{} on this chip, entry ignored", family, entry.or);
            return;
        }
        match entry.kind {
            EntryType::Crt | EntryType::Tv => {
                if let Some(old) = route.dac {
                    log::warn!(
                        "routing: table corrupt! DAC {} -> {} for port {}",
                        entry.or,
                        old,
                        entry.port
                    );
                }
                route.dac = Some(entry.or);
            }
            EntryType::Tmds | EntryType::Lvds => {
                if let Some((old, _)) = route.sor {
                    log::warn!(
                        "routing: table corrupt! SOR {} -> {} for port {}",
                        entry.or,
                        old,
                        entry.port
                    );
                }
                let panel = if entry.kind == EntryType::Lvds {
                    PanelType::Lvds
                } else {
                    PanelType::Tmds
                };
                route.sor = Some((entry.or, panel));
            }
        }
    }

    pub fn port(&self, port: usize) -> Option<&PortRoute> {
        self.ports.get(port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &PortRoute)> {
        self.ports.iter().enumerate().map(|(i, r)| (i as u32, r))
    }

    pub fn is_empty(&self) -> bool {
        self.ports.iter().all(|r| r.dac.is_none() && r.sor.is_none())
    }

    pub fn log_summary(&self) {
        log::info!("routing: I2C map:");
        for (port, route) in self.iter() {
            if let Some(dac) = route.dac {
                log::info!("routing:   bus {} -> DAC{}", port, dac);
            }
            if let Some((sor, panel)) = route.sor {
                log::info!("routing:   bus {} -> SOR{} ({:?})", port, sor, panel);
            }
        }
    }
}
