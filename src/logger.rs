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

//! Logging setup for the command-line tool

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter
pub const LOG_ENV: &str = "WIREVIEW_LOG";

/// Filter directive used when `WIREVIEW_LOG` is unset
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Build the filter from `WIREVIEW_LOG`, falling back to the verbosity flag
pub fn filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber; logs go to stderr so stdout stays machine-readable
pub fn init_logging(verbose: u8) {
    let result = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = result {
        eprintln!("Failed to initialise logging: {}", e);
    }
}
