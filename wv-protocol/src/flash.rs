//! SPI flash geometry and datalogger record layout

use serde::{Deserialize, Serialize};
use wv_error::Result;

use crate::serial::{POWER_CHANNELS, TEMP_SENSORS};
use crate::wire::WireReader;

pub const FLASH_SIZE: u32 = 0x0100_0000;
pub const SECTOR_SIZE: usize = 0x1000;
pub const PAGE_SIZE: usize = 256;

/// Largest length a single page-read request may carry
pub const MAX_READ_LEN: u32 = PAGE_SIZE as u32;

/// The datalogger owns the upper half of the flash
pub const DATALOGGER_START: u32 = 8 * 1024 * 1024;
pub const DATALOGGER_END: u32 = FLASH_SIZE;

/// Value of an erased 32-bit word
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Highest valid PSU sense code; records above it are corrupt
pub const MAX_HPWR_SENSE: u8 = 3;

const TICK_MASK: u32 = 0x3FFF_FFFF;

/// Low two bits of the record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Tick,
    SystemTime,
    PowerOn,
    Empty,
}

impl EntryKind {
    pub fn from_data(data: u32) -> Self {
        match data & 0b11 {
            0 => Self::Tick,
            1 => Self::SystemTime,
            2 => Self::PowerOn,
            _ => Self::Empty,
        }
    }
}

/// Bits 2..31 of the record header
pub fn tick_of(data: u32) -> u32 {
    (data >> 2) & TICK_MASK
}

/// One datalogger record (21 bytes, byte-packed)
///
/// `data` at 0, `ts` at 4, `voltage` at 8, `current` at 14, `hpwr_sense` at 20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub data: u32,
    pub ts: [i8; TEMP_SENSORS],
    /// 0.1 V
    pub voltage: [u8; POWER_CHANNELS],
    /// 0.1 A
    pub current: [u8; POWER_CHANNELS],
    pub hpwr_sense: u8,
}

impl LogEntry {
    pub const SIZE: usize = 4 + TEMP_SENSORS + 2 * POWER_CHANNELS + 1;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::with_size(buf, Self::SIZE)?;
        let data = r.u32()?;
        let mut ts = [0i8; TEMP_SENSORS];
        for t in ts.iter_mut() {
            *t = r.i8()?;
        }
        Ok(Self {
            data,
            ts,
            voltage: r.array()?,
            current: r.array()?,
            hpwr_sense: r.u8()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = crate::wire::WireWriter::with_capacity(Self::SIZE);
        w.u32(self.data);
        for t in self.ts {
            w.i8(t);
        }
        w.bytes(&self.voltage).bytes(&self.current).u8(self.hpwr_sense);
        w.finish()
    }

    pub fn kind(&self) -> EntryKind {
        EntryKind::from_data(self.data)
    }

    pub fn tick(&self) -> u32 {
        tick_of(self.data)
    }

    /// Header word for a record of `kind` at `tick`
    pub fn header(kind: EntryKind, tick: u32) -> u32 {
        let k = match kind {
            EntryKind::Tick => 0,
            EntryKind::SystemTime => 1,
            EntryKind::PowerOn => 2,
            EntryKind::Empty => 3,
        };
        ((tick & TICK_MASK) << 2) | k
    }
}
