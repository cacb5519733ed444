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

//! Command Line Interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wv_core::TransportPreference;
use wv_protocol::ScreenCommand;

#[derive(Parser, Debug)]
#[command(name = "wireview")]
#[command(version)]
#[command(about = "WireView - monitor and configure the WireView Pro II power sensor")]
#[command(long_about = "WireView - monitor and configure the WireView Pro II power sensor

EXAMPLES:
    wireview ports                        List serial ports and mark WireView candidates
    wireview info                         Show device identity and build
    wireview monitor --interval 250       Stream telemetry until Ctrl-C
    wireview config show --json           Dump the device configuration
    wireview config set-name \"GPU 0\" --store
    wireview log read dump.bin            Download the datalogger region
    wireview log parse dump.bin --csv     Decode a dump into timestamped samples

ENVIRONMENT VARIABLES:
    WIREVIEW_LOG=debug     Tracing filter (overrides -v)

FILES:
    ~/.config/wireview/settings.json      Application settings")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Use this serial port instead of auto-detection
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Restrict which transports are probed
    #[arg(long, global = true, value_enum)]
    pub transport: Option<TransportArg>,

    /// Settings file (defaults to ~/.config/wireview/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    Auto,
    Serial,
    Hwmon,
}

impl From<TransportArg> for TransportPreference {
    fn from(t: TransportArg) -> Self {
        match t {
            TransportArg::Auto => TransportPreference::Auto,
            TransportArg::Serial => TransportPreference::Serial,
            TransportArg::Hwmon => TransportPreference::Hwmon,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports
    Ports,

    /// Show device identity
    Info,

    /// Stream live telemetry
    Monitor(MonitorArgs),

    /// Device configuration
    #[command(subcommand, about = "Read, edit, and persist the device configuration")]
    Config(ConfigCommands),

    /// Switch the display page or pause/resume updates
    Screen {
        #[arg(value_enum)]
        page: ScreenArg,
    },

    /// Clear latched faults
    ClearFaults {
        /// Bits to clear in the active fault mask
        #[arg(long, default_value = "0xFFFF", value_parser = parse_mask)]
        status: u16,
        /// Bits to clear in the fault log
        #[arg(long, default_value = "0xFFFF", value_parser = parse_mask)]
        log: u16,
    },

    /// Flash datalogger access
    #[command(subcommand, about = "Download and decode the on-device log")]
    Log(LogCommands),

    /// Reboot the device into its bootloader
    Bootloader,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// Poll interval in milliseconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Stop after this many samples
    #[arg(long)]
    pub count: Option<usize>,

    /// One JSON object per sample
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current configuration
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Change the friendly name shown on the device
    SetName {
        name: String,
        /// Also store the configuration to non-volatile memory
        #[arg(long)]
        store: bool,
    },
    /// Save the device configuration to a JSON file
    Save { file: PathBuf },
    /// Write a configuration from a JSON file to the device
    Load {
        file: PathBuf,
        #[arg(long)]
        store: bool,
    },
    /// Persist the active configuration to non-volatile memory
    Store,
    /// Restore the factory configuration
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// Download the datalogger region to a file (serial only)
    Read { output: PathBuf },
    /// Decode a datalogger dump
    Parse {
        input: PathBuf,
        /// Clock base as YYYY-MM-DDTHH:MM:SS
        #[arg(long)]
        base: Option<String>,
        #[arg(long, conflicts_with = "json")]
        csv: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenArg {
    Main,
    Simple,
    Current,
    Temp,
    Status,
    Same,
    Pause,
    Resume,
}

impl From<ScreenArg> for ScreenCommand {
    fn from(s: ScreenArg) -> Self {
        match s {
            ScreenArg::Main => ScreenCommand::GotoMain,
            ScreenArg::Simple => ScreenCommand::GotoSimple,
            ScreenArg::Current => ScreenCommand::GotoCurrent,
            ScreenArg::Temp => ScreenCommand::GotoTemp,
            ScreenArg::Status => ScreenCommand::GotoStatus,
            ScreenArg::Same => ScreenCommand::GotoSame,
            ScreenArg::Pause => ScreenCommand::PauseUpdates,
            ScreenArg::Resume => ScreenCommand::ResumeUpdates,
        }
    }
}

/// Decimal or `0x`-prefixed hex
pub fn parse_mask(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid mask '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask("0xFFFF"), Ok(0xFFFF));
        assert_eq!(parse_mask("0x0003"), Ok(3));
        assert_eq!(parse_mask("12"), Ok(12));
        assert!(parse_mask("0xZZ").is_err());
        assert!(parse_mask("70000").is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["wireview", "info", "--port", "/dev/ttyACM1", "-vv"]).unwrap();
        assert_eq!(cli.global.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(cli.global.verbose, 2);
        assert!(matches!(cli.command, Commands::Info));
    }

    #[test]
    fn test_clear_faults_defaults() {
        let cli = Cli::try_parse_from(["wireview", "clear-faults", "--log", "0x1"]).unwrap();
        match cli.command {
            Commands::ClearFaults { status, log } => {
                assert_eq!(status, 0xFFFF);
                assert_eq!(log, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_log_parse_format_conflict() {
        assert!(Cli::try_parse_from(["wireview", "log", "parse", "d.bin", "--csv", "--json"]).is_err());
    }
}
