//! Serial port enumeration

use serde::Serialize;
use serialport::SerialPortType;
use tracing::debug;
use wv_error::{Result, WireViewError};

use crate::constants::serial::{USB_PID, USB_VID};

/// A serial port as seen by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// USB CDC port with the WireView's STM32 identifiers
    pub fn is_wireview_candidate(&self) -> bool {
        self.vid == Some(USB_VID) && self.pid == Some(USB_PID)
    }
}

/// Every serial port the OS reports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| WireViewError::serial("*", format!("failed to enumerate ports: {}", e)))?;

    let mut out: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => PortInfo {
                port_name: p.port_name,
                vid: Some(info.vid),
                pid: Some(info.pid),
                manufacturer: info.manufacturer,
                product: info.product,
                serial_number: info.serial_number,
            },
            _ => PortInfo {
                port_name: p.port_name,
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            },
        })
        .collect();
    out.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    Ok(out)
}

/// Names of ports that may host a WireView, in probe order
pub fn find_candidate_ports() -> Result<Vec<String>> {
    let ports: Vec<String> = list_ports()?
        .into_iter()
        .filter(PortInfo::is_wireview_candidate)
        .map(|p| p.port_name)
        .collect();
    debug!(count = ports.len(), "candidate serial ports");
    Ok(ports)
}
