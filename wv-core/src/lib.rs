//! WireView Core Library
//!
//! Host-side access to the Thermal Grizzly WireView Pro II power sensor.
//!
//! # Features
//!
//! - **Serial transport**: USB CDC link with cross-process port arbitration
//! - **hwmon transport**: kernel driver readings, with commands proxied through `wireviewd`
//! - **Auto-connect**: probes serial ports then hwmon, re-attaching after unplug
//! - **Datalogger**: bulk flash dump and offline log decoding
//!
//! # Example
//!
//! ```no_run
//! use wv_core::{AutoConnector, DeviceEvent, Settings};
//!
//! let settings = Settings::load().unwrap_or_default();
//! let connector = AutoConnector::from_settings(&settings);
//! let _sub = connector.events().subscribe(|ev| {
//!     if let DeviceEvent::Data(d) = ev {
//!         println!("{:.1} W", d.total_power());
//!     }
//! });
//! connector.start().unwrap();
//! ```

// Transports
pub mod hwmon;
pub mod serial;
pub mod transport;

// Supervision and plumbing
pub mod arbiter;
pub mod connector;
pub mod events;
pub mod worker;

// Standalone modules
pub mod constants;
pub mod data;
pub mod log_parser;
pub mod settings;

pub use wv_error::{Result, WireViewError};

pub use arbiter::{PortArbiter, PortLock, PortSession};
pub use connector::{AutoConnector, CandidateSource, SystemCandidates};
pub use data::{ConnectionState, DeviceData, DeviceInfo, TempChannel};
pub use events::{DeviceEvent, EventHub, Subscription};
pub use hwmon::HwmonDevice;
pub use log_parser::{ParseOutcome, ParseStop};
pub use serial::discovery::{find_candidate_ports, list_ports, PortInfo};
pub use serial::SerialDevice;
pub use settings::{Settings, TransportPreference};
pub use transport::DeviceTransport;
pub use worker::CancelToken;
