//! Common surface of the serial and hwmon transports

use std::time::Duration;

use wv_error::Result;
use wv_protocol::{DeviceConfig, NvmCommand, ScreenCommand};

use crate::data::{ConnectionState, DeviceInfo};
use crate::events::{DeviceEvent, EventHub};

/// A channel to one device
///
/// Methods take `&self` so a transport can be shared between its poll worker,
/// the connector, and callers issuing commands.
pub trait DeviceTransport: Send + Sync {
    /// Attach to the device; `Ok` means the transport is connected and polling
    fn connect(&self) -> Result<()>;

    fn disconnect(&self);

    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn info(&self) -> DeviceInfo;

    /// Telemetry and connection-change events
    fn events(&self) -> &EventHub<DeviceEvent>;

    fn poll_interval(&self) -> Duration;

    /// Set the poll cadence; each transport clamps to its own bounds
    fn set_poll_interval(&self, interval: Duration);

    fn read_config(&self) -> Result<DeviceConfig>;

    fn write_config(&self, config: &DeviceConfig) -> Result<()>;

    fn screen_cmd(&self, cmd: ScreenCommand) -> Result<()>;

    fn nvm_cmd(&self, cmd: NvmCommand) -> Result<()>;

    fn clear_faults(&self, status_mask: u16, log_mask: u16) -> Result<()>;

    fn read_build_string(&self) -> Result<String>;

    /// Reboot into the bootloader; the transport disconnects afterwards
    fn enter_bootloader(&self) -> Result<()>;
}
