//! Constants and configuration values for WireView
//!
//! Timing, paths, and discovery identifiers live here. Wire-format sizes and
//! opcodes live next to their codecs in `wv-protocol`.

use std::time::Duration;

/// Filesystem locations
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// Name reported by the kernel driver in `<hwmon>/name`
    pub const HWMON_DRIVER_NAME: &str = "wireview";

    /// Name of the cross-process port lock file (created under the temp dir)
    pub const PORT_LOCK_FILE: &str = "Access_USB_Sensors.lock";

    /// Settings file name under the user config dir
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Directory name under `$XDG_CONFIG_HOME`
    pub const APP_DIR: &str = "wireview";

    /// Default location of the port lock
    pub fn default_lock_path() -> std::path::PathBuf {
        std::env::temp_dir().join(PORT_LOCK_FILE)
    }

    /// `$XDG_CONFIG_HOME/wireview`
    pub fn user_config_dir() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR))
    }
}

/// Serial link parameters
pub mod serial {
    use super::*;

    pub const BAUD_RATE: u32 = 115_200;

    /// USB CDC identifiers of the STM32 virtual COM port
    pub const USB_VID: u16 = 0x0483;
    pub const USB_PID: u16 = 0x5740;

    /// Deadline for each exact-size read
    pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);

    /// Settle time around the RTS pulse that triggers the welcome banner
    pub const READY_PULSE: Duration = Duration::from_millis(10);
}

/// Port arbitration
pub mod arbiter {
    use super::*;

    /// Maximum wait for the cross-process port lock
    pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(2000);

    /// Retry cadence while waiting for the lock
    pub const ACQUIRE_RETRY: Duration = Duration::from_millis(10);
}

/// Polling cadence limits
pub mod poll {
    use super::*;

    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

    /// Serial transport bounds
    pub const SERIAL_MIN: Duration = Duration::from_millis(100);
    pub const SERIAL_MAX: Duration = Duration::from_millis(5000);

    /// hwmon transport and connector bounds
    pub const FAST_MIN: Duration = Duration::from_millis(50);
    pub const FAST_MAX: Duration = Duration::from_millis(5000);

    /// Consecutive hwmon read failures tolerated before disconnecting
    pub const MAX_HWMON_FAILURES: u32 = 5;

    /// How long `stop` waits for in-flight connector work
    pub const STOP_GRACE: Duration = Duration::from_millis(500);

    /// Clamp a requested interval to `[min, max]`
    #[inline]
    pub fn clamp(requested: Duration, min: Duration, max: Duration) -> Duration {
        requested.clamp(min, max)
    }
}

/// Daemon socket
pub mod daemon {
    use super::*;

    pub use wv_protocol::daemon::DEFAULT_SOCKET_PATH as SOCKET_PATH;

    /// Send and receive timeouts on the control socket
    pub const IO_TIMEOUT: Duration = Duration::from_millis(3000);
}

/// Datalogger timestamp reconstruction
pub mod log {
    /// Firmware tick period
    pub const TICK_MS: i64 = 4;

    /// Consecutive erased words that end the log
    pub const END_OF_LOG_EMPTIES: u32 = 32;

    /// Default clock base for reconstruction
    pub const BASE_YEAR: i32 = 2026;
}

/// Device naming
pub mod names {
    pub const SERIAL_DEVICE: &str = "WireView Pro II";
    pub const HWMON_DEVICE: &str = "WireView Pro II (hwmon)";
    pub const HWMON_DAEMON_DEVICE: &str = "WireView Pro II (hwmon + daemon)";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_clamp() {
        use poll::*;
        assert_eq!(clamp(Duration::from_millis(10_000), SERIAL_MIN, SERIAL_MAX), SERIAL_MAX);
        assert_eq!(clamp(Duration::from_millis(10), SERIAL_MIN, SERIAL_MAX), SERIAL_MIN);
        assert_eq!(clamp(Duration::from_millis(10), FAST_MIN, FAST_MAX), Duration::from_millis(50));
    }

    #[test]
    fn test_lock_path_in_temp_dir() {
        let p = paths::default_lock_path();
        assert!(p.ends_with(paths::PORT_LOCK_FILE));
    }
}
