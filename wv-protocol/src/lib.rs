//! WireView wire formats
//!
//! Pure encode/decode for everything that crosses a boundary: the serial
//! command set, the two configuration record layouts, the daemon socket
//! framing, and the flash datalogger record. Nothing here performs I/O.

pub mod config;
pub mod daemon;
pub mod flash;
pub mod serial;
pub mod wire;

pub use config::{
    Averaging, ConfigVersion, CurrentScale, DeviceConfig, DeviceConfigV1, DisplayRotation,
    FanConfig, FanMode, FaultEnableMasks, FaultThresholds, FriendlyName, PowerScale, TempSource,
    Theme, TimeoutMode, UiConfig,
};
pub use daemon::{DaemonCommand, DaemonDeviceInfo};
pub use flash::{EntryKind, LogEntry};
pub use serial::{
    BuildInfo, Command, Fault, HpwrCapability, NvmCommand, PowerSensor, ScreenCommand,
    SensorReadings, VendorData,
};
