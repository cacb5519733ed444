//! Byte-level link to the device
//!
//! [`DeviceLink`] is the seam between the protocol logic and the physical
//! port, so the transport can be driven by a scripted fake in tests.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::trace;
use wv_error::{Result, WireViewError};

/// An open port
pub trait DeviceLink: Send {
    /// Discard anything already buffered for reading
    fn clear_input(&mut self) -> Result<()>;

    /// Drive the ready line (RTS) that makes the firmware announce itself
    fn set_ready_line(&mut self, asserted: bool) -> Result<()>;

    fn write_all(&mut self, frame: &[u8]) -> Result<()>;

    /// Fill `buf` completely or fail with `Timeout` once `timeout` elapses
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// Opens links by port name
pub trait LinkOpener: Send + Sync {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn DeviceLink>>;
}

/// [`LinkOpener`] backed by the `serialport` crate (8N1, no flow control)
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl LinkOpener for SerialPortOpener {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn DeviceLink>> {
        let sp = serialport::new(port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| WireViewError::serial(port, e))?;
        trace!(port, baud, "serial port opened");
        Ok(Box::new(SerialPortLink {
            name: port.to_string(),
            port: sp,
        }))
    }
}

struct SerialPortLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl DeviceLink for SerialPortLink {
    fn clear_input(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| WireViewError::serial(&self.name, e))
    }

    fn set_ready_line(&mut self, asserted: bool) -> Result<()> {
        self.port
            .write_request_to_send(asserted)
            .map_err(|e| WireViewError::serial(&self.name, e))
    }

    fn write_all(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if filled < buf.len() && Instant::now() >= deadline {
                return Err(WireViewError::Timeout(format!(
                    "{}: read {} of {} bytes",
                    self.name,
                    filled,
                    buf.len()
                )));
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}
