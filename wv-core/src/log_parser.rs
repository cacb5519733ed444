//! Datalogger decoding
//!
//! The firmware appends fixed-size records to the datalogger flash region
//! sector by sector. [`parse`] recovers the records from a raw dump and
//! [`to_samples`] rebuilds wall-clock timestamps from the rolling tick
//! counter. Both are pure; corrupt records are skipped, never reported.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;
use wv_protocol::flash::{ERASED_WORD, MAX_HPWR_SENSE, PAGE_SIZE, SECTOR_SIZE};
use wv_protocol::{EntryKind, HpwrCapability, LogEntry};

use crate::constants::log::{BASE_YEAR, END_OF_LOG_EMPTIES, TICK_MS};
use crate::data::DeviceData;

/// Why scanning finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseStop {
    /// A run of erased records after real data; `offset` is where the run ended
    EndOfLog { offset: usize },
    /// The buffer ran out first
    EndOfData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub entries: Vec<LogEntry>,
    pub stop: ParseStop,
}

/// Decode every valid record in `data`.
///
/// Records never straddle a 256-byte page once logging has started, so after
/// the first valid record an offset too close to a page end jumps to the next
/// record-aligned offset in the following page. A trailing partial sector is
/// scanned for records that fit entirely.
pub fn parse(data: &[u8]) -> ParseOutcome {
    let size = LogEntry::SIZE;
    let per_sector = SECTOR_SIZE / size;
    let sectors = data.len().div_ceil(SECTOR_SIZE);

    let mut entries = Vec::with_capacity(data.len() / size);
    let mut first_found = false;
    let mut empties = 0u32;

    for sector in 0..sectors {
        let sector_base = sector * SECTOR_SIZE;
        let mut index = 0;

        while index < per_sector {
            let mut offset = sector_base + index * size;
            if offset + size > data.len() {
                break;
            }

            let in_page = offset & (PAGE_SIZE - 1);
            if first_found && in_page > PAGE_SIZE - size {
                offset += PAGE_SIZE - in_page;
                let misalign = offset % size;
                if misalign != 0 {
                    offset += size - misalign;
                }
                index = ((offset - sector_base) / size).max(index + 1);
                continue;
            }

            let entry = match LogEntry::decode(&data[offset..offset + size]) {
                Ok(e) => e,
                Err(_) => break,
            };
            index += 1;

            if entry.data == ERASED_WORD {
                if first_found {
                    empties += 1;
                    if empties >= END_OF_LOG_EMPTIES {
                        debug!(offset, entries = entries.len(), "end of log");
                        return ParseOutcome {
                            entries,
                            stop: ParseStop::EndOfLog {
                                offset: offset + size,
                            },
                        };
                    }
                }
                continue;
            }
            empties = 0;

            match entry.kind() {
                EntryKind::Tick | EntryKind::PowerOn if entry.hpwr_sense <= MAX_HPWR_SENSE => {
                    entries.push(entry);
                    first_found = true;
                }
                _ => {}
            }
        }
    }

    debug!(bytes = data.len(), entries = entries.len(), "log buffer exhausted");
    ParseOutcome {
        entries,
        stop: ParseStop::EndOfData,
    }
}

/// Midnight, January 1st of the firmware's epoch year
pub fn default_base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(BASE_YEAR, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

fn next_midnight(t: NaiveDateTime) -> NaiveDateTime {
    t.date()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(t)
}

/// Rebuild timestamped samples starting the clock at `base`.
///
/// A power-on record moves the clock to the following midnight. A tick that
/// is lower than its predecessor means the counter was reset at a day
/// boundary, so the clock also moves to the following midnight.
pub fn to_samples(entries: &[LogEntry], base: NaiveDateTime) -> Vec<DeviceData> {
    let mut clock = base;
    let mut prev_tick = 0u32;
    let mut out = Vec::with_capacity(entries.len());

    for entry in entries {
        match entry.kind() {
            EntryKind::PowerOn => clock = next_midnight(clock),
            EntryKind::Tick => {
                let tick = entry.tick();
                let mut delta = tick.wrapping_sub(prev_tick) as i32;
                if delta < 0 {
                    clock = next_midnight(clock);
                    delta = 0;
                }
                clock += Duration::milliseconds(delta as i64 * TICK_MS);
                prev_tick = tick;
            }
            EntryKind::SystemTime | EntryKind::Empty => continue,
        }

        let mut d = DeviceData::empty(clock);
        for (i, t) in entry.ts.iter().enumerate() {
            d.temps_c[i] = *t as f64;
        }
        for i in 0..d.pin_voltage.len() {
            d.pin_voltage[i] = entry.voltage[i] as f64 / 10.0;
            d.pin_current[i] = entry.current[i] as f64 / 10.0;
        }
        d.psu_capability_w = HpwrCapability::from_code(entry.hpwr_sense).map(|c| c.watts());
        out.push(d);
    }
    out
}
