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

//! Command execution

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use wv_core::serial::link::SerialPortOpener;
use wv_core::settings::write_atomic;
use wv_core::{
    find_candidate_ports, list_ports, log_parser, AutoConnector, CancelToken, CandidateSource,
    DeviceEvent, DeviceTransport, PortArbiter, SerialDevice, Settings,
};
use wv_protocol::{DeviceConfig, FriendlyName, NvmCommand, ScreenCommand};

use crate::cli::{Cli, Commands, ConfigCommands, GlobalOpts, LogCommands, MonitorArgs};
use crate::output;

/// Probes only the port given on the command line
struct PortOverride {
    port: String,
    baud: u32,
    arbiter: Arc<PortArbiter>,
}

impl CandidateSource for PortOverride {
    fn serial_candidates(&self) -> Vec<Arc<dyn DeviceTransport>> {
        vec![Arc::new(SerialDevice::new(
            self.port.clone(),
            self.baud,
            Arc::clone(&self.arbiter),
            Arc::new(SerialPortOpener),
        ))]
    }

    fn hwmon_candidate(&self) -> Option<Arc<dyn DeviceTransport>> {
        None
    }
}

pub fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(&cli.global)?;
    debug!(?settings, "effective settings");

    match &cli.command {
        Commands::Ports => cmd_ports(),
        Commands::Info => cmd_info(&cli.global, &settings),
        Commands::Monitor(args) => cmd_monitor(&cli.global, &settings, args),
        Commands::Config(sub) => cmd_config(&cli.global, &settings, sub),
        Commands::Screen { page } => {
            let (_c, device) = attach(&cli.global, &settings)?;
            device.screen_cmd((*page).into())?;
            Ok(())
        }
        Commands::ClearFaults { status, log } => {
            let (_c, device) = attach(&cli.global, &settings)?;
            device.clear_faults(*status, *log)?;
            println!("Cleared faults (status {:#06x}, log {:#06x})", status, log);
            Ok(())
        }
        Commands::Log(sub) => cmd_log(&cli.global, &settings, sub),
        Commands::Bootloader => {
            let (_c, device) = attach(&cli.global, &settings)?;
            device.enter_bootloader()?;
            println!("Device is rebooting into its bootloader");
            Ok(())
        }
    }
}

/// Settings file plus command-line overrides
pub fn load_settings(g: &GlobalOpts) -> Result<Settings> {
    let mut settings = match &g.settings {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load().unwrap_or_else(|e| {
            warn!(error = %e, "settings unavailable, using defaults");
            Settings::default()
        }),
    };
    if let Some(t) = g.transport {
        settings.transport = t.into();
    }
    Ok(settings)
}

fn connector_for(g: &GlobalOpts, settings: &Settings) -> AutoConnector {
    match &g.port {
        Some(port) => {
            let c = AutoConnector::new(Box::new(PortOverride {
                port: port.clone(),
                baud: settings.baud_rate,
                arbiter: Arc::new(PortArbiter::new(&settings.port_lock)),
            }));
            c.set_poll_interval(settings.poll_interval());
            c
        }
        None => AutoConnector::from_settings(settings),
    }
}

/// Connect once; the connector must outlive the returned transport's use
fn attach(g: &GlobalOpts, settings: &Settings) -> Result<(AutoConnector, Arc<dyn DeviceTransport>)> {
    let connector = connector_for(g, settings);
    if !connector.ensure_device() {
        bail!("no WireView device found");
    }
    let device = connector.device().context("device detached during connect")?;
    Ok((connector, device))
}

/// Flag raised by Ctrl-C
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || f.store(true, Ordering::SeqCst)) {
        warn!("Failed to set signal handler: {}", e);
    }
    flag
}

fn cmd_ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for p in ports {
        let ids = match (p.vid, p.pid) {
            (Some(v), Some(d)) => format!("{:04x}:{:04x}", v, d),
            _ => "----:----".to_string(),
        };
        println!(
            "{} {:<16} {}  {}",
            if p.is_wireview_candidate() { "*" } else { " " },
            p.port_name,
            ids,
            p.product.unwrap_or_default()
        );
    }
    Ok(())
}

fn cmd_info(g: &GlobalOpts, settings: &Settings) -> Result<()> {
    let (_c, device) = attach(g, settings)?;
    print!("{}", output::describe_info(&device.info()));
    match device.read_build_string() {
        Ok(build) => println!("Build:    {}", build),
        Err(e) => warn!(error = %e, "build string unavailable"),
    }
    Ok(())
}

fn cmd_monitor(g: &GlobalOpts, settings: &Settings, args: &MonitorArgs) -> Result<()> {
    let connector = connector_for(g, settings);
    if let Some(ms) = args.interval {
        connector.set_poll_interval(Duration::from_millis(ms));
    }

    let (tx, rx) = mpsc::channel::<DeviceEvent>();
    let _sub = connector.events().subscribe(move |ev: &DeviceEvent| {
        let _ = tx.send(ev.clone());
    });
    let interrupted = interrupt_flag();
    connector.start()?;
    info!(interval_ms = connector.poll_interval().as_millis() as u64, "monitoring");

    let mut samples = 0usize;
    while !interrupted.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(DeviceEvent::Data(d)) => {
                if args.json {
                    println!("{}", serde_json::to_string(&d)?);
                } else {
                    println!("{}", output::format_sample(&d));
                }
                samples += 1;
                if args.count.is_some_and(|n| samples >= n) {
                    break;
                }
            }
            Ok(DeviceEvent::ConnectionChanged(true)) => {
                if let Some(d) = connector.device() {
                    eprintln!("Connected: {}", d.info().name);
                }
            }
            Ok(DeviceEvent::ConnectionChanged(false)) => eprintln!("Disconnected"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    connector.stop();
    Ok(())
}

fn cmd_config(g: &GlobalOpts, settings: &Settings, cmd: &ConfigCommands) -> Result<()> {
    let (_c, device) = attach(g, settings)?;
    match cmd {
        ConfigCommands::Show { json } => {
            let config = device.read_config()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", output::describe_config(&config));
            }
        }
        ConfigCommands::SetName { name, store } => {
            let mut config = device.read_config()?;
            config.friendly_name = FriendlyName::new(name)?;
            apply_config(device.as_ref(), &config, *store)?;
            println!("Name set to '{}'", name);
        }
        ConfigCommands::Save { file } => {
            let config = device.read_config()?;
            save_config_file(file, &config)?;
            println!("Saved configuration to {}", file.display());
        }
        ConfigCommands::Load { file, store } => {
            let config = load_config_file(file)?;
            apply_config(device.as_ref(), &config, *store)?;
            println!("Loaded configuration from {}", file.display());
        }
        ConfigCommands::Store => {
            device.nvm_cmd(NvmCommand::Store)?;
            println!("Configuration stored");
        }
        ConfigCommands::Reset => {
            device.nvm_cmd(NvmCommand::Reset)?;
            println!("Configuration reset to defaults");
        }
    }
    Ok(())
}

/// Write, refresh the display, and optionally persist
fn apply_config(device: &dyn DeviceTransport, config: &DeviceConfig, store: bool) -> Result<()> {
    device.write_config(config)?;
    device.screen_cmd(ScreenCommand::GotoSame)?;
    if store {
        device.nvm_cmd(NvmCommand::Store)?;
    }
    Ok(())
}

pub fn save_config_file(path: &Path, config: &DeviceConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    write_atomic(path, json.as_bytes())?;
    Ok(())
}

pub fn load_config_file(path: &Path) -> Result<DeviceConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

fn cmd_log(g: &GlobalOpts, settings: &Settings, cmd: &LogCommands) -> Result<()> {
    match cmd {
        LogCommands::Read { output: out } => {
            let port = match &g.port {
                Some(p) => p.clone(),
                None => find_candidate_ports()?
                    .into_iter()
                    .next()
                    .context("no WireView serial port found")?,
            };
            let device = SerialDevice::new(
                port,
                settings.baud_rate,
                Arc::new(PortArbiter::new(&settings.port_lock)),
                Arc::new(SerialPortOpener),
            );
            device.connect()?;

            let cancel = CancelToken::new();
            let interrupted = interrupt_flag();
            let mut last = -1i64;
            let mut progress = |f: f64| {
                if interrupted.load(Ordering::SeqCst) {
                    cancel.cancel();
                }
                let pct = (f * 100.0) as i64;
                if pct != last && pct % 5 == 0 {
                    eprint!("\rReading log: {:3}%", pct);
                    last = pct;
                }
            };
            let bytes = device.read_device_log(&mut progress, &cancel);
            eprintln!();
            let bytes = bytes?;
            write_atomic(out, &bytes)?;

            let outcome = log_parser::parse(&bytes);
            println!(
                "Wrote {} bytes to {} ({} records)",
                bytes.len(),
                out.display(),
                outcome.entries.len()
            );
            Ok(())
        }
        LogCommands::Parse {
            input,
            base,
            csv,
            json,
        } => {
            let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
            let base = match base {
                Some(s) => output::parse_base(s)?,
                None => log_parser::default_base(),
            };
            let outcome = log_parser::parse(&bytes);
            let samples = log_parser::to_samples(&outcome.entries, base);

            if *csv {
                println!("{}", output::csv_header());
                for s in &samples {
                    println!("{}", output::csv_row(s));
                }
            } else if *json {
                println!("{}", serde_json::to_string_pretty(&samples)?);
            } else {
                for s in &samples {
                    println!("{}", output::format_sample(s));
                }
            }
            eprintln!(
                "{} records, {} samples, stopped: {:?}",
                outcome.entries.len(),
                samples.len(),
                outcome.stop
            );
            Ok(())
        }
    }
}
