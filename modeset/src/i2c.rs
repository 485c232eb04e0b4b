//! Bit-banged DDC master
//!
//! Each connector port has one line register at `0xE138 + 0x18 * port`.
//! Writing drives SCL (bit 0) and SDA (bit 1) with bit 2 set; reading
//! returns the sensed line levels in the same bits. Both lines are open
//! drain, so a slave pulling SDA low reads back as 0 even while the master
//! releases it.

use core::fmt;

use crate::config::I2cTimings;
use crate::edid::EDID_BLOCK_LEN;
use crate::regs::{self, RegisterAccess};

/// 7-bit address of the DDC EEPROM
pub const DDC_ADDR: u8 = 0x50;

const DDC_ENABLE: u32 = 7;
const DDC_DISABLE: u32 = 3;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct I2cLines: u32 {
        const SCL = 1 << 0;
        const SDA = 1 << 1;
        /// Must be set on every write
        const DRIVE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cError {
    /// SCL never went high (held by a slave or no pull-up)
    ClockStretchTimeout,
    /// Addressed slave did not acknowledge
    NoAck,
}

impl fmt::Display for I2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            I2cError::ClockStretchTimeout => write!(f, "SCL stuck low"),
            I2cError::NoAck => write!(f, "no acknowledge"),
        }
    }
}

pub type I2cResult<T> = Result<T, I2cError>;

pub struct I2cBus {
    port: u32,
    t: I2cTimings,
}

impl I2cBus {
    pub fn new(port: u32, timings: I2cTimings) -> Self {
        Self { port, t: timings }
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    fn offset(&self) -> u32 {
        regs::I2C_PORT + regs::I2C_PORT_STRIDE * self.port
    }

    fn put<R: RegisterAccess + ?Sized>(&self, regs: &mut R, scl: bool, sda: bool) {
        let mut lines = I2cLines::DRIVE;
        lines.set(I2cLines::SCL, scl);
        lines.set(I2cLines::SDA, sda);
        regs.write32(self.offset(), lines.bits());
    }

    fn get<R: RegisterAccess + ?Sized>(&self, regs: &mut R) -> I2cLines {
        I2cLines::from_bits_truncate(regs.read32(self.offset())) & (I2cLines::SCL | I2cLines::SDA)
    }

    /// Release SCL and wait for it to actually rise.
    fn raise_scl<R: RegisterAccess + ?Sized>(&self, regs: &mut R, sda: bool, timeout: u32) -> I2cResult<()> {
        self.put(regs, true, sda);
        regs.delay_us(self.t.rise_fall_time);

        let step = self.t.rise_fall_time.max(1);
        let mut left = timeout as i64;
        while left > 0 {
            if self.get(regs).contains(I2cLines::SCL) {
                return Ok(());
            }
            regs.delay_us(self.t.rise_fall_time);
            left -= step as i64;
        }
        Err(I2cError::ClockStretchTimeout)
    }

    /// START (or repeated START): SDA falls while SCL is high.
    pub fn start<R: RegisterAccess + ?Sized>(&self, regs: &mut R) -> I2cResult<()> {
        self.raise_scl(regs, true, self.t.start_timeout)?;
        self.put(regs, true, false);
        regs.delay_us(self.t.hold_time);
        self.put(regs, false, false);
        regs.delay_us(self.t.hold_time);
        Ok(())
    }

    /// STOP: SDA rises while SCL is high.
    pub fn stop<R: RegisterAccess + ?Sized>(&self, regs: &mut R) {
        self.put(regs, false, false);
        regs.delay_us(self.t.rise_fall_time);
        self.put(regs, true, false);
        regs.delay_us(self.t.hold_time);
        self.put(regs, true, true);
        regs.delay_us(self.t.hold_time);
    }

    fn write_bit<R: RegisterAccess + ?Sized>(&self, regs: &mut R, sda: bool, timeout: u32) -> I2cResult<()> {
        self.put(regs, false, sda);
        regs.delay_us(self.t.rise_fall_time);
        let r = self.raise_scl(regs, sda, timeout);
        regs.delay_us(self.t.hold_time);
        self.put(regs, false, sda);
        regs.delay_us(self.t.hold_time);
        r
    }

    fn read_bit<R: RegisterAccess + ?Sized>(&self, regs: &mut R, timeout: u32) -> I2cResult<bool> {
        let r = self.raise_scl(regs, true, timeout);
        regs.delay_us(self.t.hold_time);
        let sda = self.get(regs).contains(I2cLines::SDA);
        self.put(regs, false, true);
        regs.delay_us(self.t.hold_time);
        r.map(|_| sda)
    }

    /// Shift out one byte MSB first and wait for the slave's acknowledge.
    pub fn put_byte<R: RegisterAccess + ?Sized>(&self, regs: &mut R, data: u8) -> I2cResult<()> {
        self.write_bit(regs, data & 0x80 != 0, self.t.byte_timeout)?;
        for i in (0..7).rev() {
            self.write_bit(regs, (data >> i) & 1 != 0, self.t.bit_timeout)?;
        }

        self.put(regs, false, true);
        regs.delay_us(self.t.rise_fall_time);
        self.raise_scl(regs, true, self.t.hold_time)?;

        let step = self.t.hold_time.max(1);
        let mut left = self.t.ack_timeout as i64;
        let mut acked = false;
        while left > 0 {
            regs.delay_us(self.t.hold_time);
            if !self.get(regs).contains(I2cLines::SDA) {
                acked = true;
                break;
            }
            left -= step as i64;
        }
        self.put(regs, false, true);
        regs.delay_us(self.t.hold_time);

        if acked {
            Ok(())
        } else {
            Err(I2cError::NoAck)
        }
    }

    /// Shift in one byte; the last byte of a read is answered with NACK.
    pub fn get_byte<R: RegisterAccess + ?Sized>(&self, regs: &mut R, last: bool) -> I2cResult<u8> {
        self.put(regs, false, true);
        regs.delay_us(self.t.rise_fall_time);

        let mut data = (self.read_bit(regs, self.t.byte_timeout)? as u8) << 7;
        for i in (0..7).rev() {
            data |= (self.read_bit(regs, self.t.bit_timeout)? as u8) << i;
        }
        self.write_bit(regs, last, self.t.bit_timeout)?;
        Ok(data)
    }

    /// START followed by an address byte; the bus is released on NACK.
    fn address<R: RegisterAccess + ?Sized>(&self, regs: &mut R, byte: u8) -> I2cResult<()> {
        self.start(regs)?;
        if let Err(e) = self.put_byte(regs, byte) {
            self.stop(regs);
            return Err(e);
        }
        Ok(())
    }

    /// Combined write-then-read transfer to the 7-bit address `addr`.
    pub fn write_read<R: RegisterAccess + ?Sized>(
        &self,
        regs: &mut R,
        addr: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> I2cResult<()> {
        if !write.is_empty() {
            self.address(regs, addr << 1)?;
            for &b in write {
                if let Err(e) = self.put_byte(regs, b) {
                    self.stop(regs);
                    return Err(e);
                }
            }
        }
        if !read.is_empty() {
            self.address(regs, (addr << 1) | 1)?;
            let n = read.len();
            for (i, b) in read.iter_mut().enumerate() {
                match self.get_byte(regs, i + 1 == n) {
                    Ok(v) => *b = v,
                    Err(e) => {
                        self.stop(regs);
                        return Err(e);
                    }
                }
            }
        }
        self.stop(regs);
        Ok(())
    }

    /// Read the 128-byte EDID base block with the port's DDC drivers on.
    pub fn read_edid<R: RegisterAccess + ?Sized>(&self, regs: &mut R) -> I2cResult<[u8; EDID_BLOCK_LEN]> {
        log::info!("i2c{}: probing for EDID", self.port);
        let mut block = [0u8; EDID_BLOCK_LEN];
        regs.write32(self.offset(), DDC_ENABLE);
        let r = self.write_read(regs, DDC_ADDR, &[0], &mut block);
        regs.write32(self.offset(), DDC_DISABLE);
        match r {
            Ok(()) => Ok(block),
            Err(e) => {
                log::info!("i2c{}: ... none found ({})", self.port, e);
                Err(e)
            }
        }
    }
}
