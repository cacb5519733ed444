//! Daemon Client
//!
//! Talks to the privileged `wireviewd` helper over its Unix socket using the
//! length-prefixed framing from `wv_protocol::daemon`.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use wv_error::{Result, WireViewError};
use wv_protocol::daemon::{
    self as proto, encode_request, DaemonCommand, DaemonDeviceInfo, ResponseHeader, HEADER_LEN,
};
use wv_protocol::{ConfigVersion, DeviceConfig, NvmCommand, ScreenCommand};

use crate::constants::daemon::IO_TIMEOUT;

/// One open control connection
pub struct DaemonClient {
    stream: UnixStream,
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to the socket at `path`; `DaemonUnavailable` if it is absent
    pub fn connect(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WireViewError::DaemonUnavailable);
        }
        let stream = UnixStream::connect(path).map_err(|e| {
            debug!(socket = %path.display(), error = %e, "daemon connect failed");
            WireViewError::DaemonUnavailable
        })?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(Self {
            stream,
            socket_path: path.to_path_buf(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and return the response payload.
    ///
    /// A non-zero status yields `DaemonStatus`.
    pub fn request(&mut self, cmd: DaemonCommand, payload: &[u8]) -> Result<Vec<u8>> {
        let frame = encode_request(cmd, payload)?;
        self.stream.write_all(&frame)?;

        let mut hdr = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut hdr).map_err(map_read_err)?;
        let header = ResponseHeader::decode(hdr)?;

        let mut body = vec![0u8; header.len];
        self.stream.read_exact(&mut body).map_err(map_read_err)?;
        trace!(cmd = ?cmd, status = header.status, bytes = header.len, "daemon response");

        if !header.is_ok() {
            return Err(WireViewError::DaemonStatus {
                status: header.status,
            });
        }
        Ok(body)
    }

    pub fn device_info(&mut self) -> Result<DaemonDeviceInfo> {
        let payload = self.request(DaemonCommand::GetDeviceInfo, &[])?;
        DaemonDeviceInfo::decode(&payload)
    }

    pub fn clear_faults(&mut self, status_mask: u16, log_mask: u16) -> Result<()> {
        self.request(
            DaemonCommand::ClearFaults,
            &proto::clear_faults_payload(status_mask, log_mask),
        )
        .map(|_| ())
    }

    pub fn read_config(&mut self, version: ConfigVersion) -> Result<DeviceConfig> {
        let payload = self.request(
            DaemonCommand::ReadConfig,
            &proto::read_config_payload(version),
        )?;
        proto::decode_config_response(&payload)
    }

    pub fn write_config(&mut self, config: &DeviceConfig, version: ConfigVersion) -> Result<()> {
        self.request(
            DaemonCommand::WriteConfig,
            &proto::write_config_payload(config, version),
        )
        .map(|_| ())
    }

    pub fn screen_cmd(&mut self, cmd: ScreenCommand) -> Result<()> {
        self.request(DaemonCommand::ScreenCmd, &[cmd.code()]).map(|_| ())
    }

    pub fn nvm_cmd(&mut self, cmd: NvmCommand) -> Result<()> {
        self.request(DaemonCommand::NvmCmd, &[cmd.code()]).map(|_| ())
    }

    pub fn read_build(&mut self) -> Result<String> {
        let payload = self.request(DaemonCommand::ReadBuild, &[])?;
        proto::decode_build_string(&payload)
            .ok_or_else(|| WireViewError::malformed("empty build string"))
    }

    pub fn enter_bootloader(&mut self) -> Result<()> {
        self.request(DaemonCommand::EnterBootloader, &[]).map(|_| ())
    }
}

fn map_read_err(e: std::io::Error) -> WireViewError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
            WireViewError::Timeout("daemon response".into())
        }
        _ => WireViewError::Io(e),
    }
}
