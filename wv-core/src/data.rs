//! Telemetry snapshot and device identity types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use wv_protocol::serial::{POWER_CHANNELS, TEMP_SENSORS};
use wv_protocol::{ConfigVersion, Fault, HpwrCapability, SensorReadings};

/// Index into [`DeviceData::temps_c`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempChannel {
    OnboardIn = 0,
    OnboardOut = 1,
    External1 = 2,
    External2 = 3,
}

/// One telemetry snapshot, produced once per poll cycle or per log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub timestamp: NaiveDateTime,
    pub connected: bool,
    pub hardware_revision: String,
    pub firmware_version: String,
    /// Volts per 12V pin
    pub pin_voltage: [f64; POWER_CHANNELS],
    /// Amps per 12V pin
    pub pin_current: [f64; POWER_CHANNELS],
    /// °C, ordered as [`TempChannel`]; NaN when a sensor is absent
    pub temps_c: [f64; TEMP_SENSORS],
    pub fault_status: u16,
    pub fault_log: u16,
    /// PSU power rating signalled over the sense pins, when the transport reports it
    pub psu_capability_w: Option<u16>,
}

impl DeviceData {
    pub fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            connected: false,
            hardware_revision: String::new(),
            firmware_version: String::new(),
            pin_voltage: [0.0; POWER_CHANNELS],
            pin_current: [0.0; POWER_CHANNELS],
            temps_c: [0.0; TEMP_SENSORS],
            fault_status: 0,
            fault_log: 0,
            psu_capability_w: None,
        }
    }

    /// Map a serial sensor response
    pub fn from_readings(
        r: &SensorReadings,
        timestamp: NaiveDateTime,
        hardware_revision: &str,
        firmware_version: &str,
    ) -> Self {
        let mut d = Self::empty(timestamp);
        d.connected = true;
        d.hardware_revision = hardware_revision.to_string();
        d.firmware_version = firmware_version.to_string();
        for (i, p) in r.power.iter().enumerate() {
            d.pin_voltage[i] = p.voltage_mv as f64 / 1000.0;
            d.pin_current[i] = p.current_ma as f64 / 1000.0;
        }
        for (i, t) in r.temps_decic.iter().enumerate() {
            d.temps_c[i] = *t as f64 / 10.0;
        }
        d.fault_status = r.fault_status;
        d.fault_log = r.fault_log;
        d.psu_capability_w = HpwrCapability::from_code(r.hpwr_capability).map(|c| c.watts());
        d
    }

    pub fn temp(&self, ch: TempChannel) -> f64 {
        self.temps_c[ch as usize]
    }

    pub fn total_current(&self) -> f64 {
        self.pin_current.iter().sum()
    }

    pub fn total_power(&self) -> f64 {
        self.pin_voltage
            .iter()
            .zip(self.pin_current.iter())
            .map(|(v, i)| v * i)
            .sum()
    }

    pub fn active_faults(&self) -> Vec<Fault> {
        Fault::active(self.fault_status)
    }

    pub fn logged_faults(&self) -> Vec<Fault> {
        Fault::active(self.fault_log)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Identity of an attached device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub hardware_revision: String,
    pub firmware_version: String,
    pub unique_id: String,
    pub config_version: Option<ConfigVersion>,
    pub daemon_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wv_protocol::PowerSensor;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_totals() {
        let mut d = DeviceData::empty(ts());
        d.pin_voltage = [12.0; 6];
        d.pin_current = [1.0, 2.0, 0.0, 0.0, 0.5, 0.5];
        assert!((d.total_current() - 4.0).abs() < 1e-9);
        assert!((d.total_power() - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_readings_units() {
        let mut power = [PowerSensor::default(); 6];
        power[0] = PowerSensor {
            voltage_mv: 12_100,
            current_ma: 8_250,
            power_mw: 99_825,
        };
        let r = SensorReadings {
            temps_decic: [305, 310, -50, 0],
            vdd_mv: 3300,
            fan_duty: 0,
            power,
            total_power_mw: 99_825,
            total_current_ma: 8_250,
            avg_voltage_mv: 12_100,
            hpwr_capability: 2,
            fault_status: 0b100,
            fault_log: 0,
        };
        let d = DeviceData::from_readings(&r, ts(), "EF05", "3");
        assert!(d.connected);
        assert!((d.pin_voltage[0] - 12.1).abs() < 1e-9);
        assert!((d.pin_current[0] - 8.25).abs() < 1e-9);
        assert!((d.temp(TempChannel::OnboardIn) - 30.5).abs() < 1e-9);
        assert!((d.temp(TempChannel::External1) + 5.0).abs() < 1e-9);
        assert_eq!(d.psu_capability_w, Some(300));
        assert_eq!(d.active_faults(), vec![Fault::OverCurrent]);
    }

    #[test]
    fn test_unknown_psu_code_is_none() {
        let r = SensorReadings {
            temps_decic: [0; 4],
            vdd_mv: 0,
            fan_duty: 0,
            power: [PowerSensor::default(); 6],
            total_power_mw: 0,
            total_current_ma: 0,
            avg_voltage_mv: 0,
            hpwr_capability: 9,
            fault_status: 0,
            fault_log: 0,
        };
        assert_eq!(DeviceData::from_readings(&r, ts(), "", "").psu_capability_w, None);
    }
}
