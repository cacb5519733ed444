//! Bulk SPI flash reads over the serial transport

use tracing::{debug, info, warn};
use wv_error::{Result, WireViewError};
use wv_protocol::flash::{DATALOGGER_END, DATALOGGER_START, MAX_READ_LEN};
use wv_protocol::serial::{flash_read_frame, screen_frame};
use wv_protocol::ScreenCommand;

use super::SerialDevice;
use crate::arbiter::PortSession;
use crate::constants::serial::READ_TIMEOUT;
use crate::worker::CancelToken;

impl SerialDevice {
    /// Read `len` bytes starting at `addr` in page-sized requests.
    ///
    /// The port stays locked for the whole transfer and the device display is
    /// paused for its duration. `progress` receives the completed fraction after
    /// every page; `cancel` is checked before each page.
    pub fn read_flash(
        &self,
        addr: u32,
        len: u32,
        progress: &mut dyn FnMut(f64),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        self.inner.ensure_connected()?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut s = self.inner.session()?;
        s.write(&screen_frame(ScreenCommand::PauseUpdates))?;
        let result = read_pages(&mut s, addr, len, progress, cancel);

        // The display must come back even when the transfer failed part-way.
        if let Err(e) = s.write(&screen_frame(ScreenCommand::ResumeUpdates)) {
            warn!(port = %self.inner.port, error = %e, "failed to resume display updates");
        }
        result
    }

    /// Dump the whole datalogger region
    pub fn read_device_log(
        &self,
        progress: &mut dyn FnMut(f64),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        info!(
            port = %self.inner.port,
            bytes = DATALOGGER_END - DATALOGGER_START,
            "reading datalogger"
        );
        let bytes = self.read_flash(
            DATALOGGER_START,
            DATALOGGER_END - DATALOGGER_START,
            progress,
            cancel,
        )?;
        progress(1.0);
        Ok(bytes)
    }
}

fn read_pages(
    s: &mut PortSession,
    addr: u32,
    len: u32,
    progress: &mut dyn FnMut(f64),
    cancel: &CancelToken,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len as usize);
    let mut read = 0u32;
    while read < len {
        if cancel.is_cancelled() {
            debug!(offset = read, "flash read cancelled");
            return Err(WireViewError::Cancelled);
        }
        let chunk = MAX_READ_LEN.min(len - read);
        s.write(&flash_read_frame(addr + read, chunk))?;
        out.extend_from_slice(&s.read_exact(chunk as usize, READ_TIMEOUT)?);
        read += chunk;
        progress(read as f64 / len as f64);
    }
    Ok(out)
}
