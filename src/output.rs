/*
 * This file is part of WireView.
 *
 * Copyright (C) 2025 WireView contributors
 *
 * WireView is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * WireView is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with WireView. If not, see <https://www.gnu.org/licenses/>.
 */

//! Human-readable and CSV rendering of telemetry and configuration

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use wv_core::{DeviceData, DeviceInfo};
use wv_protocol::DeviceConfig;

/// `--` for an absent sensor
pub fn format_temp(c: f64) -> String {
    if c.is_nan() {
        "--".to_string()
    } else {
        format!("{:.1}", c)
    }
}

/// One monitor line
pub fn format_sample(d: &DeviceData) -> String {
    let mut line = format!(
        "{}  {:7.1} W  {:6.2} A  in {:>5}°C  out {:>5}°C  ext {:>5}/{:>5}°C",
        d.timestamp.format("%H:%M:%S%.3f"),
        d.total_power(),
        d.total_current(),
        format_temp(d.temps_c[0]),
        format_temp(d.temps_c[1]),
        format_temp(d.temps_c[2]),
        format_temp(d.temps_c[3]),
    );
    if let Some(w) = d.psu_capability_w {
        let _ = write!(line, "  psu {} W", w);
    }
    let active = d.active_faults();
    if !active.is_empty() {
        let labels: Vec<&str> = active.iter().map(|f| f.label()).collect();
        let _ = write!(line, "  FAULT: {}", labels.join(", "));
    }
    line
}

pub fn csv_header() -> String {
    let mut cols = vec!["timestamp".to_string()];
    cols.extend((0..6).map(|i| format!("v{}", i)));
    cols.extend((0..6).map(|i| format!("i{}", i)));
    cols.extend(["t_in", "t_out", "t_ext1", "t_ext2", "power_w", "psu_w"].map(String::from));
    cols.join(",")
}

pub fn csv_row(d: &DeviceData) -> String {
    let mut cols = vec![d.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()];
    cols.extend(d.pin_voltage.iter().map(|v| format!("{:.1}", v)));
    cols.extend(d.pin_current.iter().map(|i| format!("{:.1}", i)));
    cols.extend(d.temps_c.iter().map(|t| {
        if t.is_nan() {
            String::new()
        } else {
            format!("{:.1}", t)
        }
    }));
    cols.push(format!("{:.1}", d.total_power()));
    cols.push(d.psu_capability_w.map(|w| w.to_string()).unwrap_or_default());
    cols.join(",")
}

pub fn describe_info(info: &DeviceInfo) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Device:   {}", info.name);
    if !info.hardware_revision.is_empty() {
        let _ = writeln!(s, "Hardware: {}", info.hardware_revision);
    }
    if !info.firmware_version.is_empty() {
        let _ = writeln!(s, "Firmware: {}", info.firmware_version);
    }
    if !info.unique_id.is_empty() {
        let _ = writeln!(s, "UID:      {}", info.unique_id);
    }
    if let Some(v) = info.config_version {
        let _ = writeln!(s, "Config:   {:?}", v);
    }
    s
}

pub fn describe_config(c: &DeviceConfig) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Name:            {}", c.friendly_name.as_string());
    let _ = writeln!(
        s,
        "Fan:             {:?} on {:?}, duty {}-{}%, {:.1}-{:.1}°C",
        c.fan.mode,
        c.fan.temp_source,
        c.fan.duty_min,
        c.fan.duty_max,
        c.fan.temp_min as f64 / 10.0,
        c.fan.temp_max as f64 / 10.0
    );
    let _ = writeln!(s, "Backlight:       {}%", c.backlight_duty);
    let _ = writeln!(
        s,
        "Fault enable:    display {:#06x} buzzer {:#06x} soft-off {:#06x} hard-off {:#06x}",
        c.fault_enable.display,
        c.fault_enable.buzzer,
        c.fault_enable.soft_power,
        c.fault_enable.hard_power
    );
    let t = &c.thresholds;
    let _ = writeln!(
        s,
        "Thresholds:      {:.1}°C, {} A, wire {:.1} A, {} W, imbalance {}% above {} A",
        t.temperature as f64 / 10.0,
        t.over_current,
        t.wire_over_current as f64 / 10.0,
        t.over_power,
        t.current_imbalance,
        t.current_imbalance_min_load
    );
    let _ = writeln!(s, "Shutdown wait:   {} s", c.shutdown_wait_time);
    let _ = writeln!(s, "Log interval:    {} s", c.logging_interval);
    let _ = writeln!(s, "Averaging:       {:?}", c.average);
    let _ = writeln!(
        s,
        "Display:         {:?}, {:?}, scales {:?}/{:?}",
        c.ui.theme, c.ui.display_rotation, c.ui.current_scale, c.ui.power_scale
    );
    let _ = writeln!(
        s,
        "Screen timeout:  {:?} after {} s, cycle {:#04x} every {} s",
        c.ui.timeout_mode, c.ui.timeout, c.ui.cycle_screens, c.ui.cycle_time
    );
    s
}

/// `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS`
pub fn parse_base(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| anyhow::anyhow!("invalid clock base '{}': {}", s, e))
}
