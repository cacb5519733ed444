//! Daemon socket framing
//!
//! Requests are `[cmd:u8][len:u16 LE][payload]`, responses
//! `[status:u8][len:u16 LE][payload]`. Status 0 means success.

use wv_error::{Result, WireViewError};

use crate::config::{ConfigVersion, DeviceConfig};
use crate::serial::UID_LEN;
use crate::wire::{hex_upper, nul_terminated_ascii};

/// Default socket path of the privileged helper
pub const DEFAULT_SOCKET_PATH: &str = "/run/wireviewd.sock";

/// Response payloads longer than this are rejected
pub const MAX_RESPONSE_LEN: usize = 1024;

/// Header size for both directions
pub const HEADER_LEN: usize = 3;

pub const RESP_OK: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DaemonCommand {
    GetDeviceInfo = 0x01,
    ClearFaults = 0x02,
    ReadConfig = 0x03,
    WriteConfig = 0x04,
    ScreenCmd = 0x05,
    NvmCmd = 0x06,
    ReadBuild = 0x07,
    EnterBootloader = 0x08,
}

/// Frame a request
pub fn encode_request(cmd: DaemonCommand, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > u16::MAX as usize {
        return Err(WireViewError::MessageTooLarge {
            size: payload.len(),
            max_size: u16::MAX as usize,
        });
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(cmd as u8);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Parsed response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: u8,
    pub len: usize,
}

impl ResponseHeader {
    pub fn decode(hdr: [u8; HEADER_LEN]) -> Result<Self> {
        let len = u16::from_le_bytes([hdr[1], hdr[2]]) as usize;
        if len > MAX_RESPONSE_LEN {
            return Err(WireViewError::MessageTooLarge {
                size: len,
                max_size: MAX_RESPONSE_LEN,
            });
        }
        Ok(Self {
            status: hdr[0],
            len,
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == RESP_OK
    }
}

/// Payload of a `GetDeviceInfo` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonDeviceInfo {
    pub fw_version: u8,
    pub config_version: ConfigVersion,
    pub uid: String,
    pub build: Option<String>,
}

impl DaemonDeviceInfo {
    /// fw at 0, config version at 1, uid at 2..14, optional NUL-terminated build string after
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let min = 2 + UID_LEN;
        if payload.len() < min {
            return Err(WireViewError::ShortRead {
                expected: min,
                actual: payload.len(),
            });
        }
        let build = if payload.len() > min {
            Some(nul_terminated_ascii(&payload[min..]))
        } else {
            None
        };
        Ok(Self {
            fw_version: payload[0],
            config_version: ConfigVersion::from_wire_id(payload[1])?,
            uid: hex_upper(&payload[2..min]),
            build,
        })
    }
}

pub fn clear_faults_payload(status_mask: u16, log_mask: u16) -> [u8; 4] {
    let s = status_mask.to_le_bytes();
    let l = log_mask.to_le_bytes();
    [s[0], s[1], l[0], l[1]]
}

/// Size hint sent with `ReadConfig`
pub fn read_config_payload(version: ConfigVersion) -> [u8; 2] {
    (version.encoded_len() as u16).to_le_bytes()
}

/// Decode `[version][config bytes]`
pub fn decode_config_response(payload: &[u8]) -> Result<DeviceConfig> {
    if payload.len() < 2 {
        return Err(WireViewError::ShortRead {
            expected: 2,
            actual: payload.len(),
        });
    }
    let version = ConfigVersion::from_wire_id(payload[0])?;
    DeviceConfig::decode_versioned(&payload[1..], version)
}

/// Encode `[version][config bytes]` in the layout the device stores
pub fn write_config_payload(config: &DeviceConfig, version: ConfigVersion) -> Vec<u8> {
    let body = config.encode_versioned(version);
    let mut payload = Vec::with_capacity(1 + body.len());
    payload.push(version.wire_id());
    payload.extend_from_slice(&body);
    payload
}

/// Build string from a `ReadBuild` response
pub fn decode_build_string(payload: &[u8]) -> Option<String> {
    if payload.is_empty() {
        None
    } else {
        Some(nul_terminated_ascii(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    #[test]
    fn test_request_header() {
        let frame = encode_request(DaemonCommand::ReadConfig, &[74, 0]).unwrap();
        assert_eq!(frame, vec![0x03, 0x02, 0x00, 74, 0]);
        let empty = encode_request(DaemonCommand::ReadBuild, &[]).unwrap();
        assert_eq!(empty, vec![0x07, 0x00, 0x00]);
    }

    #[test]
    fn test_response_header_limit() {
        let ok = ResponseHeader::decode([0, 0x00, 0x04]).unwrap();
        assert_eq!(ok.len, 1024);
        assert!(ok.is_ok());
        assert!(matches!(
            ResponseHeader::decode([0, 0x01, 0x04]),
            Err(WireViewError::MessageTooLarge { size: 1025, .. })
        ));
    }

    #[test]
    fn test_device_info_decode() {
        let mut p = vec![4u8, 1];
        p.extend(0xA0..0xACu8);
        let info = DaemonDeviceInfo::decode(&p).unwrap();
        assert_eq!(info.fw_version, 4);
        assert_eq!(info.config_version, ConfigVersion::V2);
        assert_eq!(info.uid, "A0A1A2A3A4A5A6A7A8A9AAAB");
        assert_eq!(info.build, None);

        p.extend_from_slice(b"b1234\0junk");
        let info = DaemonDeviceInfo::decode(&p).unwrap();
        assert_eq!(info.build.as_deref(), Some("b1234"));

        assert!(DaemonDeviceInfo::decode(&p[..13]).is_err());
    }

    #[test]
    fn test_config_payloads() {
        assert_eq!(read_config_payload(ConfigVersion::V1), [72, 0]);
        let cfg = sample_config();
        let payload = write_config_payload(&cfg, ConfigVersion::V1);
        assert_eq!(payload[0], 0);
        assert_eq!(payload.len(), 73);

        let back = decode_config_response(&payload).unwrap();
        assert_eq!(back.friendly_name, cfg.friendly_name);
        assert!(decode_config_response(&[1]).is_err());
    }

    #[test]
    fn test_build_string() {
        assert_eq!(decode_build_string(b"v2.1\0"), Some("v2.1".to_string()));
        assert_eq!(decode_build_string(&[]), None);
    }
}
