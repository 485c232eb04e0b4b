//! Scripted register file and DDC slave model for unit tests.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::regs::{self, RegisterAccess};

/// Register file whose reads can be scripted per offset.
///
/// Read precedence: queued values (consumed in order), then a sticky value,
/// then the last value written (zero if never written).
#[derive(Default)]
pub struct FakeRegs {
    values: BTreeMap<u32, u32>,
    queued: BTreeMap<u32, VecDeque<u32>>,
    sticky: BTreeMap<u32, u32>,
    pub writes: Vec<(u32, u32)>,
    pub delays: Vec<u32>,
    pub ddc: Option<(u32, DdcSlave)>,
}

impl FakeRegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A register file whose core channel never reports busy and whose
    /// engine reports ready.
    pub fn idle() -> Self {
        let mut regs = Self::new();
        regs.set_sticky(regs::DISP_CMD_CTRL, 0);
        regs.set_sticky(regs::DISP_ENGINE_CTRL, 0x4000_0000);
        regs
    }

    pub fn set(&mut self, offset: u32, value: u32) {
        self.values.insert(offset, value);
    }

    pub fn set_sticky(&mut self, offset: u32, value: u32) {
        self.sticky.insert(offset, value);
    }

    pub fn queue_reads(&mut self, offset: u32, values: &[u32]) {
        self.queued
            .entry(offset)
            .or_default()
            .extend(values.iter().copied());
    }

    /// Attach an EDID EEPROM to the I2C lines of `port`.
    pub fn attach_ddc(&mut self, port: u32, edid: [u8; 128]) {
        self.ddc = Some((port, DdcSlave::new(edid)));
    }

    pub fn value(&self, offset: u32) -> u32 {
        self.values.get(&offset).copied().unwrap_or(0)
    }

    /// All values written to `offset`, in order.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Core channel methods submitted so far as `(method, data)` pairs.
    pub fn methods(&self) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        let mut data = 0;
        for &(offset, value) in &self.writes {
            if offset == regs::DISP_CMD_DATA {
                data = value;
            } else if offset == regs::DISP_CMD_CTRL && value & 0x8001_0001 == 0x8001_0001 {
                out.push((value & !0x8001_0001, data));
            }
        }
        out
    }

    fn ddc_offset(&self) -> Option<u32> {
        self.ddc
            .as_ref()
            .map(|(port, _)| regs::I2C_PORT + port * regs::I2C_PORT_STRIDE)
    }
}

impl RegisterAccess for FakeRegs {
    fn read32(&mut self, offset: u32) -> u32 {
        if Some(offset) == self.ddc_offset() {
            if let Some((_, slave)) = self.ddc.as_ref() {
                return slave.lines();
            }
        }
        if let Some(queue) = self.queued.get_mut(&offset) {
            if let Some(v) = queue.pop_front() {
                return v;
            }
        }
        if let Some(v) = self.sticky.get(&offset) {
            return *v;
        }
        self.value(offset)
    }

    fn write32(&mut self, offset: u32, value: u32) {
        self.writes.push((offset, value));
        self.values.insert(offset, value);
        if Some(offset) == self.ddc_offset() {
            if let Some((_, slave)) = self.ddc.as_mut() {
                slave.drive(value & 1 != 0, value & 2 != 0);
            }
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.delays.push(us);
    }
}

/// Logger keeping every formatted record, shared by all tests.
pub struct CaptureLogger {
    lines: spin::Mutex<Vec<String>>,
}

static CAPTURE: CaptureLogger = CaptureLogger {
    lines: spin::Mutex::new(Vec::new()),
};

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.lines.lock().push(record.args().to_string());
    }

    fn flush(&self) {}
}

/// Install the capturing logger (once per test binary) and return it.
pub fn capture_logs() -> &'static CaptureLogger {
    let _ = log::set_logger(&CAPTURE);
    log::set_max_level(log::LevelFilter::Debug);
    &CAPTURE
}

impl CaptureLogger {
    /// Whether any record so far contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlaveState {
    Idle,
    Receive { is_address: bool },
    Ack { transmit_next: bool },
    Transmit,
    MasterAck,
}

/// Bit-level model of a DDC EEPROM at address 0x50.
///
/// The master drives SCL/SDA through the port register; the slave pulls SDA
/// low (open drain) to acknowledge and to send data bits.
pub struct DdcSlave {
    edid: [u8; 128],
    scl: bool,
    sda: bool,
    slave_sda: bool,
    state: SlaveState,
    shift: u8,
    bits: u8,
    byte_done: bool,
    acked: bool,
    offset: u8,
    pub transfers: u32,
}

impl DdcSlave {
    const ADDRESS: u8 = 0x50;

    pub fn new(edid: [u8; 128]) -> Self {
        Self {
            edid,
            scl: true,
            sda: true,
            slave_sda: true,
            state: SlaveState::Idle,
            shift: 0,
            bits: 0,
            byte_done: false,
            acked: false,
            offset: 0,
            transfers: 0,
        }
    }

    /// Line state as the master reads it back.
    pub fn lines(&self) -> u32 {
        let sda = self.sda && self.slave_sda;
        (self.scl as u32) | ((sda as u32) << 1)
    }

    fn current_bit(&self) -> bool {
        let byte = self.edid[self.offset as usize & 0x7f];
        (byte >> (7 - self.bits)) & 1 != 0
    }

    pub fn drive(&mut self, scl: bool, sda: bool) {
        let (old_scl, old_sda) = (self.scl, self.sda);
        self.scl = scl;
        self.sda = sda;

        if old_scl && scl && old_sda != sda {
            if !sda {
                // start or repeated start
                self.state = SlaveState::Receive { is_address: true };
                self.shift = 0;
                self.bits = 0;
                self.byte_done = false;
                self.slave_sda = true;
                self.transfers += 1;
            } else {
                self.state = SlaveState::Idle;
                self.slave_sda = true;
            }
            return;
        }

        if !old_scl && scl {
            let bus = sda && self.slave_sda;
            match self.state {
                SlaveState::Receive { .. } => {
                    if self.bits < 8 {
                        self.shift = (self.shift << 1) | bus as u8;
                        self.bits += 1;
                        self.byte_done = self.bits == 8;
                    }
                }
                SlaveState::Transmit => self.bits += 1,
                SlaveState::MasterAck => self.acked = !bus,
                _ => {}
            }
        } else if old_scl && !scl {
            match self.state {
                SlaveState::Receive { is_address } if self.byte_done => {
                    self.byte_done = false;
                    self.bits = 0;
                    if is_address {
                        if self.shift >> 1 == Self::ADDRESS {
                            self.slave_sda = false;
                            self.state = SlaveState::Ack {
                                transmit_next: self.shift & 1 != 0,
                            };
                        } else {
                            self.state = SlaveState::Idle;
                        }
                    } else {
                        self.offset = self.shift;
                        self.slave_sda = false;
                        self.state = SlaveState::Ack { transmit_next: false };
                    }
                    self.shift = 0;
                }
                SlaveState::Ack { transmit_next } => {
                    if transmit_next {
                        self.state = SlaveState::Transmit;
                        self.bits = 0;
                        self.slave_sda = self.current_bit();
                    } else {
                        self.slave_sda = true;
                        self.state = SlaveState::Receive { is_address: false };
                    }
                }
                SlaveState::Transmit => {
                    if self.bits < 8 {
                        self.slave_sda = self.current_bit();
                    } else {
                        self.slave_sda = true;
                        self.state = SlaveState::MasterAck;
                    }
                }
                SlaveState::MasterAck => {
                    if self.acked {
                        self.offset = self.offset.wrapping_add(1);
                        self.bits = 0;
                        self.state = SlaveState::Transmit;
                        self.slave_sda = self.current_bit();
                    } else {
                        self.state = SlaveState::Idle;
                    }
                }
                _ => {}
            }
        }
    }
}

/// A valid 128-byte EDID base block describing a 1920x1080@60 digital
/// panel with one detailed timing descriptor.
pub fn sample_edid() -> [u8; 128] {
    let mut e = [0u8; 128];
    e[0..8].copy_from_slice(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
    // "NVD"
    e[8] = 0x3A;
    e[9] = 0xC4;
    e[18] = 1;
    e[19] = 3;
    // digital input
    e[20] = 0x80;
    e[21] = 52;
    e[22] = 29;

    // 1920x1080@60, 148.50 MHz, hblank 280, vblank 45,
    // hfront 88, hsync 44, vfront 4, vsync 5, +hsync +vsync
    let d = &mut e[54..72];
    d[0..2].copy_from_slice(&14850u16.to_le_bytes());
    d[2] = 0x80;
    d[3] = 0x18;
    d[4] = 0x71;
    d[5] = 0x38;
    d[6] = 0x2D;
    d[7] = 0x40;
    d[8] = 88;
    d[9] = 44;
    d[10] = 0x45;
    d[11] = 0x00;
    d[17] = 0x1E;

    // product name descriptor
    e[72..77].copy_from_slice(&[0x00, 0x00, 0x00, 0xFC, 0x00]);
    e[77..90].copy_from_slice(b"G80 TEST\n    ");

    let sum = e[..127].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    e[127] = 0u8.wrapping_sub(sum);
    e
}
