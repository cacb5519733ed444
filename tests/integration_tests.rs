/*
 * Integration tests for WireView
 *
 * These tests drive the library crates the way the command-line tool does:
 * settings resolution, hwmon attachment through the connector, config files,
 * and offline log decoding.
 */

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use wireview::cli::{GlobalOpts, TransportArg};
use wireview::commands::{load_config_file, load_settings, save_config_file};
use wv_core::{log_parser, AutoConnector, DeviceEvent, ParseStop, Settings, TransportPreference};
use wv_protocol::flash::SECTOR_SIZE;
use wv_protocol::{
    Averaging, ConfigVersion, CurrentScale, DeviceConfig, DeviceConfigV1, DisplayRotation,
    EntryKind, FanConfig, FanMode, FaultEnableMasks, FaultThresholds, FriendlyName, LogEntry,
    PowerScale, TempSource, Theme, TimeoutMode, UiConfig,
};

fn test_config() -> DeviceConfig {
    DeviceConfig {
        crc: 0,
        version: 2,
        friendly_name: FriendlyName::new("Bench PSU").unwrap(),
        fan: FanConfig {
            mode: FanMode::Fixed,
            temp_source: TempSource::TMax,
            duty_min: 40,
            duty_max: 40,
            temp_min: 300,
            temp_max: 600,
        },
        backlight_duty: 80,
        fault_enable: FaultEnableMasks {
            display: 0x3F,
            buzzer: 0x0C,
            soft_power: 0,
            hard_power: 0x04,
        },
        thresholds: FaultThresholds {
            temperature: 900,
            over_current: 55,
            wire_over_current: 100,
            over_power: 600,
            current_imbalance: 30,
            current_imbalance_min_load: 10,
        },
        shutdown_wait_time: 5,
        logging_interval: 1,
        average: Averaging::Ms709,
        ui: UiConfig {
            current_scale: CurrentScale::Amps15,
            power_scale: PowerScale::Watts600,
            theme: Theme::Tg2,
            display_rotation: DisplayRotation::Deg180,
            timeout_mode: TimeoutMode::Cycle,
            cycle_screens: 0x07,
            cycle_time: 3,
            timeout: 30,
        },
    }
}

fn write_hwmon_node(dir: &std::path::Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("name"), "wireview\n").unwrap();
    for i in 0..6 {
        fs::write(dir.join(format!("in{}_input", i)), "12100\n").unwrap();
        fs::write(dir.join(format!("curr{}_input", i + 1)), "7500\n").unwrap();
    }
    fs::write(dir.join("temp1_input"), "45000\n").unwrap();
    fs::write(dir.join("psu_cap"), "0\n").unwrap();
}

fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("condition not reached");
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn test_settings_file_and_override() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    let settings = Settings {
        poll_interval_ms: 200,
        transport: TransportPreference::Serial,
        ..Settings::default()
    };
    settings.save_to(&path).unwrap();

    let opts = GlobalOpts {
        settings: Some(path.clone()),
        ..GlobalOpts::default()
    };
    let loaded = load_settings(&opts).unwrap();
    assert_eq!(loaded.poll_interval_ms, 200);
    assert_eq!(loaded.transport, TransportPreference::Serial);

    let opts = GlobalOpts {
        settings: Some(path),
        transport: Some(TransportArg::Hwmon),
        ..GlobalOpts::default()
    };
    assert_eq!(load_settings(&opts).unwrap().transport, TransportPreference::Hwmon);
}

#[test]
fn test_malformed_settings_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, "[1, 2").unwrap();
    let opts = GlobalOpts {
        settings: Some(path),
        ..GlobalOpts::default()
    };
    assert!(load_settings(&opts).is_err());
}

// ============================================================================
// hwmon attachment through the connector
// ============================================================================

#[test]
#[serial]
fn test_connector_attaches_hwmon_node() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("hwmon");
    write_hwmon_node(&base.join("hwmon5"));

    let settings = Settings {
        poll_interval_ms: 50,
        transport: TransportPreference::Hwmon,
        hwmon_base: base.clone(),
        daemon_socket: dir.path().join("absent.sock"),
        ..Settings::default()
    };
    let connector = AutoConnector::from_settings(&settings);

    let seen: Arc<Mutex<Vec<DeviceEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = connector
        .events()
        .subscribe(move |ev: &DeviceEvent| sink.lock().unwrap().push(ev.clone()));

    assert!(connector.ensure_device());
    let info = connector.device().unwrap().info();
    assert_eq!(info.name, "WireView Pro II (hwmon)");
    assert!(!info.daemon_available);

    wait_for(|| {
        seen.lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, DeviceEvent::Data(_)))
    });
    let data = seen
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            DeviceEvent::Data(d) => Some(d.clone()),
            _ => None,
        })
        .unwrap();
    assert!((data.total_current() - 45.0).abs() < 1e-9);
    assert!((data.total_power() - 544.5).abs() < 1e-6);
    assert_eq!(data.psu_capability_w, Some(600));

    // Unplug: the node disappears and the connector reports the loss
    fs::remove_dir_all(base.join("hwmon5")).unwrap();
    wait_for(|| connector.device().is_none());
    assert_eq!(
        seen.lock().unwrap().last(),
        Some(&DeviceEvent::ConnectionChanged(false))
    );
    connector.stop();
}

#[test]
fn test_connector_respects_serial_only_preference() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("hwmon");
    write_hwmon_node(&base.join("hwmon0"));

    let settings = Settings {
        transport: TransportPreference::Serial,
        hwmon_base: base,
        // No serial candidates can match in a test environment
        ..Settings::default()
    };
    let connector = AutoConnector::from_settings(&settings);
    if connector.ensure_device() {
        // A real WireView is plugged into this machine
        assert!(!connector.device().unwrap().info().name.contains("hwmon"));
    }
    connector.stop();
}

// ============================================================================
// Config files
// ============================================================================

#[test]
fn test_config_file_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("bench.json");
    let config = test_config();

    save_config_file(&path, &config).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"Bench PSU\""));
    assert_eq!(load_config_file(&path).unwrap(), config);

    fs::write(&path, "{}").unwrap();
    assert!(load_config_file(&path).is_err());
}

#[test]
fn test_config_versions_on_the_wire() {
    let config = test_config();
    let v2 = config.encode_versioned(ConfigVersion::V2);
    let v1 = config.encode_versioned(ConfigVersion::V1);
    assert_eq!(v2.len(), DeviceConfig::SIZE);
    assert_eq!(v1.len(), DeviceConfigV1::SIZE);

    let widened = DeviceConfig::decode_versioned(&v1, ConfigVersion::V1).unwrap();
    assert_eq!(widened.average, Averaging::V1_DEFAULT);
    assert_eq!(widened.friendly_name, config.friendly_name);
    assert_eq!(widened.thresholds, config.thresholds);
    assert_eq!(widened.ui, config.ui);
}

// ============================================================================
// Datalogger dumps
// ============================================================================

fn record(kind: EntryKind, tick: u32) -> Vec<u8> {
    LogEntry {
        data: LogEntry::header(kind, tick),
        ts: [30, 28, -128, -128],
        voltage: [120; 6],
        current: [50; 6],
        hpwr_sense: 0,
    }
    .encode()
}

#[test]
fn test_log_dump_to_samples() {
    let mut dump = vec![0xFFu8; 2 * SECTOR_SIZE];
    let mut offset = 0;
    let mut put = |bytes: Vec<u8>| {
        dump[offset..offset + bytes.len()].copy_from_slice(&bytes);
        offset += bytes.len();
    };
    put(record(EntryKind::PowerOn, 0));
    for i in 1..=5 {
        put(record(EntryKind::Tick, i * 250));
    }

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.bin");
    fs::write(&path, &dump).unwrap();

    let bytes = fs::read(&path).unwrap();
    let outcome = log_parser::parse(&bytes);
    assert_eq!(outcome.entries.len(), 6);
    assert!(matches!(outcome.stop, ParseStop::EndOfLog { .. }));

    let samples = log_parser::to_samples(&outcome.entries, log_parser::default_base());
    assert_eq!(samples.len(), 6);
    assert_eq!(
        samples[0].timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2026-01-02 00:00:00"
    );
    assert_eq!(
        samples[5].timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2026-01-02 00:00:05"
    );
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!((samples[3].total_power() - 360.0).abs() < 1e-6);
}
