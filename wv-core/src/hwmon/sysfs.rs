//! hwmon sysfs attribute access
//!
//! The `wireview` kernel driver exposes millivolts, milliamps and
//! millidegrees under a standard hwmon directory, plus a few raw fault
//! registers the generic alarm attributes cannot carry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use wv_error::{Result, WireViewError};
use wv_protocol::serial::{POWER_CHANNELS, TEMP_SENSORS};
use wv_protocol::HpwrCapability;

use crate::constants::paths::HWMON_DRIVER_NAME;

/// Values read in one pass over the attribute files
#[derive(Debug, Clone, PartialEq)]
pub struct HwmonReadings {
    pub pin_voltage: [f64; POWER_CHANNELS],
    pub pin_current: [f64; POWER_CHANNELS],
    pub temps_c: [f64; TEMP_SENSORS],
    pub fault_status: u16,
    pub fault_log: u16,
    pub psu_capability_w: Option<u16>,
}

/// True when `dir` is a hwmon node owned by the wireview driver
pub fn is_wireview_dir(dir: &Path) -> bool {
    let name_ok = fs::read_to_string(dir.join("name"))
        .map(|n| n.trim().eq_ignore_ascii_case(HWMON_DRIVER_NAME))
        .unwrap_or(false);
    name_ok && fs::read_to_string(dir.join("in0_input")).is_ok()
}

/// First hwmon directory under `base` whose driver is wireview
pub fn find_hwmon_dir(base: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(base) {
        Ok(e) => e,
        Err(e) => {
            debug!(base = %base.display(), error = %e, "hwmon base not readable");
            return None;
        }
    };

    let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    dirs.sort();
    for dir in dirs {
        trace!(dir = %dir.display(), "checking hwmon node");
        if is_wireview_dir(&dir) {
            debug!(dir = %dir.display(), "found wireview hwmon node");
            return Some(dir);
        }
    }
    None
}

/// Integer attribute; `Ok(None)` when the file does not exist.
///
/// Unparsable content reads as zero, matching how the driver reports an
/// unpopulated channel.
fn read_int(path: &Path) -> Result<Option<i64>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().parse::<i64>().unwrap_or(0))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WireViewError::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Temperature attribute in °C; NaN when absent or not a number
fn read_temp(path: &Path) -> Result<f64> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s
            .trim()
            .parse::<i64>()
            .map(|m| m as f64 / 1000.0)
            .unwrap_or(f64::NAN)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(f64::NAN),
        Err(e) => Err(WireViewError::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Integer attribute that only counts when present and parsable
fn read_strict_int(path: &Path) -> Result<Option<i64>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s.trim().parse::<i64>().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WireViewError::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Raw register if the driver exposes a readable one, otherwise the generic
/// alarm bit.
///
/// The alarm carries no bit detail, so a raised alarm reads as `alarm_value`.
fn read_fault_word(dir: &Path, raw: &str, alarm: &str, alarm_value: u16) -> Result<u16> {
    if let Some(v) = read_strict_int(&dir.join(raw))? {
        return Ok(v as u16);
    }
    Ok(match read_int(&dir.join(alarm))? {
        Some(v) if v != 0 => alarm_value,
        _ => 0,
    })
}

/// Read every telemetry attribute under `dir`
pub fn read_readings(dir: &Path) -> Result<HwmonReadings> {
    let mut r = HwmonReadings {
        pin_voltage: [0.0; POWER_CHANNELS],
        pin_current: [0.0; POWER_CHANNELS],
        temps_c: [f64::NAN; TEMP_SENSORS],
        fault_status: 0,
        fault_log: 0,
        psu_capability_w: None,
    };

    for i in 0..POWER_CHANNELS {
        let mv = read_int(&dir.join(format!("in{}_input", i)))?.unwrap_or(0);
        r.pin_voltage[i] = mv as f64 / 1000.0;
        let ma = read_int(&dir.join(format!("curr{}_input", i + 1)))?.unwrap_or(0);
        r.pin_current[i] = ma as f64 / 1000.0;
    }
    for i in 0..TEMP_SENSORS {
        r.temps_c[i] = read_temp(&dir.join(format!("temp{}_input", i + 1)))?;
    }

    r.fault_status = read_fault_word(dir, "fault_status_raw", "intrusion0_alarm", 0xFFFF)?;
    r.fault_log = read_fault_word(dir, "fault_log_raw", "intrusion1_alarm", 0xFFFF)?;

    r.psu_capability_w = read_int(&dir.join("psu_cap"))?
        .and_then(|v| u8::try_from(v).ok())
        .and_then(HpwrCapability::from_code)
        .map(|c| c.watts());

    Ok(r)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Write a plausible wireview hwmon node into `dir`
    pub(crate) fn populate(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("name"), "wireview\n").unwrap();
        for i in 0..6 {
            fs::write(dir.join(format!("in{}_input", i)), format!("{}\n", 12_000 + i)).unwrap();
            fs::write(dir.join(format!("curr{}_input", i + 1)), "8250\n").unwrap();
        }
        fs::write(dir.join("temp1_input"), "41500\n").unwrap();
        fs::write(dir.join("temp2_input"), "38000\n").unwrap();
        fs::write(dir.join("temp3_input"), "garbage\n").unwrap();
    }

    #[test]
    fn test_find_hwmon_dir() {
        let base = TempDir::new().unwrap();
        let other = base.path().join("hwmon0");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("name"), "coretemp\n").unwrap();
        populate(&base.path().join("hwmon3"));

        let found = find_hwmon_dir(base.path()).unwrap();
        assert!(found.ends_with("hwmon3"));
    }

    #[test]
    fn test_name_without_inputs_is_ignored() {
        let base = TempDir::new().unwrap();
        let dir = base.path().join("hwmon1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("name"), "WireView\n").unwrap();
        assert!(find_hwmon_dir(base.path()).is_none());

        fs::write(dir.join("in0_input"), "0\n").unwrap();
        assert!(find_hwmon_dir(base.path()).is_some());
    }

    #[test]
    fn test_missing_base() {
        assert!(find_hwmon_dir(Path::new("/nonexistent/hwmon/base")).is_none());
    }

    #[test]
    fn test_read_readings_scaling() {
        let base = TempDir::new().unwrap();
        let dir = base.path().join("hwmon2");
        populate(&dir);

        let r = read_readings(&dir).unwrap();
        assert!((r.pin_voltage[0] - 12.0).abs() < 1e-9);
        assert!((r.pin_voltage[5] - 12.005).abs() < 1e-9);
        assert!((r.pin_current[3] - 8.25).abs() < 1e-9);
        assert!((r.temps_c[0] - 41.5).abs() < 1e-9);
        assert!((r.temps_c[1] - 38.0).abs() < 1e-9);
        assert!(r.temps_c[2].is_nan());
        assert!(r.temps_c[3].is_nan());
        assert_eq!(r.fault_status, 0);
        assert_eq!(r.fault_log, 0);
        assert_eq!(r.psu_capability_w, None);
    }

    #[test]
    fn test_fault_fallbacks() {
        let base = TempDir::new().unwrap();
        let dir = base.path().join("hwmon2");
        populate(&dir);

        fs::write(dir.join("intrusion0_alarm"), "1\n").unwrap();
        fs::write(dir.join("intrusion1_alarm"), "1\n").unwrap();
        let r = read_readings(&dir).unwrap();
        assert_eq!(r.fault_status, 0xFFFF);
        assert_eq!(r.fault_log, 0xFFFF);

        fs::write(dir.join("fault_status_raw"), "20\n").unwrap();
        fs::write(dir.join("fault_log_raw"), "513\n").unwrap();
        let r = read_readings(&dir).unwrap();
        assert_eq!(r.fault_status, 20);
        assert_eq!(r.fault_log, 513);
    }

    #[test]
    fn test_unparsable_fault_register_uses_alarm() {
        let base = TempDir::new().unwrap();
        let dir = base.path().join("hwmon2");
        populate(&dir);

        fs::write(dir.join("fault_status_raw"), "n/a\n").unwrap();
        fs::write(dir.join("intrusion0_alarm"), "1\n").unwrap();
        fs::write(dir.join("fault_log_raw"), "\n").unwrap();
        let r = read_readings(&dir).unwrap();
        assert_eq!(r.fault_status, 0xFFFF);
        assert_eq!(r.fault_log, 0);
    }

    #[test]
    fn test_psu_capability() {
        let base = TempDir::new().unwrap();
        let dir = base.path().join("hwmon2");
        populate(&dir);

        for (code, watts) in [("0", Some(600)), ("1", Some(450)), ("2", Some(300)), ("3", Some(150)), ("4", None)] {
            fs::write(dir.join("psu_cap"), code).unwrap();
            assert_eq!(read_readings(&dir).unwrap().psu_capability_w, watts, "code {}", code);
        }
    }
}
