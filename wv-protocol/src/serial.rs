//! Serial command set and response structures
//!
//! Every request is a single opcode byte optionally followed by a payload.
//! Responses are fixed-size little-endian structures laid out the way the
//! firmware's C compiler packs them (4-byte packing); offsets are listed on
//! each decoder.

use serde::{Deserialize, Serialize};
use wv_error::{Result, WireViewError};

use crate::wire::{nul_terminated_ascii, WireReader};

/// Banner the firmware emits after the ready-line pulse
pub const WELCOME_MESSAGE: &str = "Thermal Grizzly WireView Pro II";

/// Banner length on the wire, including its NUL terminator
pub const WELCOME_LEN: usize = WELCOME_MESSAGE.len() + 1;

/// Firmware `DEVICE_STR_LEN`
pub const DEVICE_STR_LEN: usize = 32;

/// Expected vendor / product bytes in the vendor-data response
pub const VENDOR_ID: u8 = 0xEF;
pub const PRODUCT_ID: u8 = 0x05;

/// Length of the unique-id response
pub const UID_LEN: usize = 12;

/// Number of 12V pins measured
pub const POWER_CHANNELS: usize = 6;

/// Number of temperature sensors
pub const TEMP_SENSORS: usize = 4;

/// Magic prefix required by the NVM command
pub const NVM_MAGIC: [u8; 4] = [0x55, 0xAA, 0x55, 0xAA];

/// Device receive buffer minus opcode and offset bytes
pub const WRITE_CONFIG_CHUNK: usize = 62;

/// Largest offset the one-byte offset field can carry
pub const WRITE_CONFIG_MAX_OFFSET: usize = 255;

/// Command opcodes understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Welcome = 0x00,
    ReadVendorData = 0x01,
    ReadUid = 0x02,
    ReadDeviceData = 0x03,
    ReadSensorValues = 0x04,
    ReadConfig = 0x05,
    WriteConfig = 0x06,
    ReadCalibration = 0x07,
    WriteCalibration = 0x08,
    FlashWritePage = 0x09,
    FlashReadPage = 0x0A,
    FlashEraseSector = 0x0B,
    ScreenChange = 0x0C,
    ReadBuildInfo = 0x0D,
    ClearFaults = 0x0E,
    Reset = 0xF0,
    Bootloader = 0xF1,
    NvmConfig = 0xF2,
    Nop = 0xFF,
}

impl Command {
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// Sub-commands of [`Command::ScreenChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ScreenCommand {
    GotoMain = 0xE0,
    GotoSimple = 0xE1,
    GotoCurrent = 0xE2,
    GotoTemp = 0xE3,
    GotoStatus = 0xE4,
    GotoSame = 0xEF,
    PauseUpdates = 0xF0,
    ResumeUpdates = 0xF1,
}

impl ScreenCommand {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Sub-commands of [`Command::NvmConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum NvmCommand {
    None = 0,
    Load = 1,
    Store = 2,
    Reset = 3,
    LoadCalibration = 4,
    StoreCalibration = 5,
    LoadFactoryCalibration = 6,
    StoreFactoryCalibration = 7,
}

impl NvmCommand {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Bit positions in the 16-bit fault masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Fault {
    OverTempChip = 0,
    OverTempSensor = 1,
    OverCurrent = 2,
    WireOverCurrent = 3,
    OverPower = 4,
    CurrentImbalance = 5,
}

impl Fault {
    pub const ALL: [Fault; 6] = [
        Fault::OverTempChip,
        Fault::OverTempSensor,
        Fault::OverCurrent,
        Fault::WireOverCurrent,
        Fault::OverPower,
        Fault::CurrentImbalance,
    ];

    pub fn bit(self) -> u16 {
        1 << (self as u8)
    }

    /// Faults whose bit is set in `mask`
    pub fn active(mask: u16) -> Vec<Fault> {
        Self::ALL.iter().copied().filter(|f| mask & f.bit() != 0).collect()
    }

    pub fn label(self) -> &'static str {
        match self {
            Fault::OverTempChip => "over-temperature (chip)",
            Fault::OverTempSensor => "over-temperature (sensor)",
            Fault::OverCurrent => "over-current",
            Fault::WireOverCurrent => "wire over-current",
            Fault::OverPower => "over-power",
            Fault::CurrentImbalance => "current imbalance",
        }
    }
}

/// PSU power capability reported through the sense pins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HpwrCapability {
    Psu600W,
    Psu450W,
    Psu300W,
    Psu150W,
}

impl HpwrCapability {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Psu600W),
            1 => Some(Self::Psu450W),
            2 => Some(Self::Psu300W),
            3 => Some(Self::Psu150W),
            _ => None,
        }
    }

    pub fn watts(self) -> u16 {
        match self {
            Self::Psu600W => 600,
            Self::Psu450W => 450,
            Self::Psu300W => 300,
            Self::Psu150W => 150,
        }
    }
}

/// True when `buf` carries the NUL-terminated welcome banner
pub fn is_welcome(buf: &[u8]) -> bool {
    buf.len() >= WELCOME_LEN && nul_terminated_ascii(&buf[..WELCOME_LEN]) == WELCOME_MESSAGE
}

// ============================================================================
// Request frames
// ============================================================================

pub fn command_frame(cmd: Command) -> [u8; 1] {
    [cmd.opcode()]
}

pub fn screen_frame(cmd: ScreenCommand) -> [u8; 2] {
    [Command::ScreenChange.opcode(), cmd.code()]
}

pub fn nvm_frame(cmd: NvmCommand) -> [u8; 6] {
    [
        Command::NvmConfig.opcode(),
        NVM_MAGIC[0],
        NVM_MAGIC[1],
        NVM_MAGIC[2],
        NVM_MAGIC[3],
        cmd.code(),
    ]
}

pub fn clear_faults_frame(status_mask: u16, log_mask: u16) -> [u8; 5] {
    let s = status_mask.to_le_bytes();
    let l = log_mask.to_le_bytes();
    [Command::ClearFaults.opcode(), s[0], s[1], l[0], l[1]]
}

/// `[cmd][addr:u32][len:u32]`; callers cap `len` at the firmware page buffer
pub fn flash_read_frame(addr: u32, len: u32) -> [u8; 9] {
    let mut frame = [0u8; 9];
    frame[0] = Command::FlashReadPage.opcode();
    frame[1..5].copy_from_slice(&addr.to_le_bytes());
    frame[5..9].copy_from_slice(&len.to_le_bytes());
    frame
}

/// Split an encoded config into write frames of `[cmd][offset][<=62 bytes]`.
///
/// The offset is a single byte, so chunks starting past 255 are not emitted.
pub fn write_config_frames(payload: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut offset = 0usize;
    while offset < payload.len() && offset <= WRITE_CONFIG_MAX_OFFSET {
        let n = WRITE_CONFIG_CHUNK.min(payload.len() - offset);
        let mut frame = Vec::with_capacity(n + 2);
        frame.push(Command::WriteConfig.opcode());
        frame.push(offset as u8);
        frame.extend_from_slice(&payload[offset..offset + n]);
        frames.push(frame);
        offset += WRITE_CONFIG_CHUNK;
    }
    if offset < payload.len() {
        tracing::warn!(
            payload = payload.len(),
            sent = offset,
            "config payload exceeds one-byte offset range; tail not written"
        );
    }
    frames
}

// ============================================================================
// Response structures
// ============================================================================

/// Response to [`Command::ReadVendorData`]: offsets 0 vendor, 1 product, 2 fw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorData {
    pub vendor_id: u8,
    pub product_id: u8,
    pub fw_version: u8,
}

impl VendorData {
    pub const SIZE: usize = 3;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::with_size(buf, Self::SIZE)?;
        Ok(Self {
            vendor_id: r.u8()?,
            product_id: r.u8()?,
            fw_version: r.u8()?,
        })
    }

    pub fn is_wireview(&self) -> bool {
        self.vendor_id == VENDOR_ID && self.product_id == PRODUCT_ID
    }

    /// Hardware revision string, e.g. `EF05`
    pub fn hardware_revision(&self) -> String {
        format!("{:02X}{:02X}", self.vendor_id, self.product_id)
    }
}

/// Response to [`Command::ReadBuildInfo`]
///
/// | off | width | field |
/// |-----|-------|-------|
/// | 0   | 3     | vendor data |
/// | 3   | 32    | product name |
/// | 35  | 32    | build string |
/// | 67  | 1     | product name length |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub vendor: VendorData,
    pub product_name: String,
    pub build: String,
    pub product_name_len: u8,
}

impl BuildInfo {
    pub const SIZE: usize = 68;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::with_size(buf, Self::SIZE)?;
        let vendor = VendorData {
            vendor_id: r.u8()?,
            product_id: r.u8()?,
            fw_version: r.u8()?,
        };
        let product_name = nul_terminated_ascii(&r.array::<DEVICE_STR_LEN>()?);
        let build = nul_terminated_ascii(&r.array::<DEVICE_STR_LEN>()?);
        let product_name_len = r.u8()?;
        Ok(Self {
            vendor,
            product_name,
            build,
            product_name_len,
        })
    }
}

/// One pin measurement: voltage mV (i16) at 0, pad 2, current mA at 4, power mW at 8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerSensor {
    pub voltage_mv: i16,
    pub current_ma: u32,
    pub power_mw: u32,
}

/// Response to [`Command::ReadSensorValues`]
///
/// | off | width | field |
/// |-----|-------|-------|
/// | 0   | 4×2   | temperatures, i16 0.1 °C |
/// | 8   | 2     | Vdd mV |
/// | 10  | 1     | fan duty % |
/// | 12  | 6×12  | [`PowerSensor`] |
/// | 84  | 4     | total power mW |
/// | 88  | 4     | total current mA |
/// | 92  | 2     | average voltage mV |
/// | 94  | 1     | PSU capability code |
/// | 96  | 2     | fault status mask |
/// | 98  | 2     | fault log mask |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub temps_decic: [i16; TEMP_SENSORS],
    pub vdd_mv: u16,
    pub fan_duty: u8,
    pub power: [PowerSensor; POWER_CHANNELS],
    pub total_power_mw: u32,
    pub total_current_ma: u32,
    pub avg_voltage_mv: u16,
    pub hpwr_capability: u8,
    pub fault_status: u16,
    pub fault_log: u16,
}

impl SensorReadings {
    pub const SIZE: usize = 100;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::with_size(buf, Self::SIZE)?;
        let mut temps_decic = [0i16; TEMP_SENSORS];
        for t in temps_decic.iter_mut() {
            *t = r.i16()?;
        }
        let vdd_mv = r.u16()?;
        let fan_duty = r.u8()?;
        r.skip(1)?;
        let mut power = [PowerSensor::default(); POWER_CHANNELS];
        for p in power.iter_mut() {
            p.voltage_mv = r.i16()?;
            r.skip(2)?;
            p.current_ma = r.u32()?;
            p.power_mw = r.u32()?;
        }
        let total_power_mw = r.u32()?;
        let total_current_ma = r.u32()?;
        let avg_voltage_mv = r.u16()?;
        let hpwr_capability = r.u8()?;
        r.skip(1)?;
        let fault_status = r.u16()?;
        let fault_log = r.u16()?;
        Ok(Self {
            temps_decic,
            vdd_mv,
            fan_duty,
            power,
            total_power_mw,
            total_current_ma,
            avg_voltage_mv,
            hpwr_capability,
            fault_status,
            fault_log,
        })
    }

    /// Encoder used by device emulators in tests and tooling
    pub fn encode(&self) -> Vec<u8> {
        let mut w = crate::wire::WireWriter::with_capacity(Self::SIZE);
        for t in self.temps_decic {
            w.i16(t);
        }
        w.u16(self.vdd_mv).u8(self.fan_duty).pad(1);
        for p in &self.power {
            w.i16(p.voltage_mv).pad(2).u32(p.current_ma).u32(p.power_mw);
        }
        w.u32(self.total_power_mw)
            .u32(self.total_current_ma)
            .u16(self.avg_voltage_mv)
            .u8(self.hpwr_capability)
            .pad(1)
            .u16(self.fault_status)
            .u16(self.fault_log);
        w.finish()
    }
}

/// Decode the 12-byte UID response into uppercase hex
pub fn decode_uid(buf: &[u8]) -> Result<String> {
    if buf.len() < UID_LEN {
        return Err(WireViewError::ShortRead {
            expected: UID_LEN,
            actual: buf.len(),
        });
    }
    Ok(crate::wire::hex_upper(&buf[..UID_LEN]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn welcome_bytes() -> Vec<u8> {
        let mut v = WELCOME_MESSAGE.as_bytes().to_vec();
        v.push(0);
        v
    }

    #[test]
    fn test_welcome_is_33_bytes() {
        assert_eq!(WELCOME_LEN, 33);
        assert!(is_welcome(&welcome_bytes()));
    }

    #[test]
    fn test_welcome_mismatch() {
        let mut v = welcome_bytes();
        v[0] = b'X';
        assert!(!is_welcome(&v));
        assert!(!is_welcome(&v[..10]));
    }

    #[test]
    fn test_vendor_data_identity() {
        let vd = VendorData::decode(&[0xEF, 0x05, 0x03]).unwrap();
        assert!(vd.is_wireview());
        assert_eq!(vd.fw_version, 3);
        assert_eq!(vd.hardware_revision(), "EF05");

        let other = VendorData::decode(&[0xEF, 0x06, 0x03]).unwrap();
        assert!(!other.is_wireview());
    }

    #[test]
    fn test_vendor_data_short_read() {
        assert!(matches!(
            VendorData::decode(&[0xEF, 0x05]),
            Err(WireViewError::ShortRead { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_sensor_layout_offsets() {
        let mut buf = vec![0u8; SensorReadings::SIZE];
        buf[0..2].copy_from_slice(&253i16.to_le_bytes());
        buf[10] = 42;
        // pin 2 voltage at 12 + 12*2, current at +4
        buf[36..38].copy_from_slice(&12_050i16.to_le_bytes());
        buf[40..44].copy_from_slice(&8_500u32.to_le_bytes());
        buf[94] = 1;
        buf[96..98].copy_from_slice(&0x0005u16.to_le_bytes());
        buf[98..100].copy_from_slice(&0x0010u16.to_le_bytes());

        let s = SensorReadings::decode(&buf).unwrap();
        assert_eq!(s.temps_decic[0], 253);
        assert_eq!(s.fan_duty, 42);
        assert_eq!(s.power[2].voltage_mv, 12_050);
        assert_eq!(s.power[2].current_ma, 8_500);
        assert_eq!(s.hpwr_capability, 1);
        assert_eq!(s.fault_status, 0x0005);
        assert_eq!(s.fault_log, 0x0010);
        assert_eq!(s.encode(), buf);
    }

    #[test]
    fn test_sensor_short_read() {
        let buf = vec![0u8; SensorReadings::SIZE - 1];
        assert!(matches!(
            SensorReadings::decode(&buf),
            Err(WireViewError::ShortRead { .. })
        ));
    }

    #[test]
    fn test_build_info_strings() {
        let mut buf = vec![0u8; BuildInfo::SIZE];
        buf[0] = 0xEF;
        buf[1] = 0x05;
        buf[2] = 4;
        buf[3..3 + 15].copy_from_slice(b"WireView Pro II");
        buf[35..35 + 10].copy_from_slice(b"2025-06-01");
        buf[67] = 15;
        let info = BuildInfo::decode(&buf).unwrap();
        assert_eq!(info.product_name, "WireView Pro II");
        assert_eq!(info.build, "2025-06-01");
        assert_eq!(info.product_name_len, 15);
        assert_eq!(info.vendor.fw_version, 4);
    }

    #[test]
    fn test_request_frames() {
        assert_eq!(screen_frame(ScreenCommand::PauseUpdates), [0x0C, 0xF0]);
        assert_eq!(nvm_frame(NvmCommand::Store), [0xF2, 0x55, 0xAA, 0x55, 0xAA, 0x02]);
        assert_eq!(clear_faults_frame(0x1234, 0xFFFF), [0x0E, 0x34, 0x12, 0xFF, 0xFF]);
        assert_eq!(
            flash_read_frame(0x0080_0000, 256),
            [0x0A, 0x00, 0x00, 0x80, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_write_config_frames_130_bytes() {
        let payload: Vec<u8> = (0..130u8).collect();
        let frames = write_config_frames(&payload);
        assert_eq!(frames.len(), 3);
        let offsets: Vec<u8> = frames.iter().map(|f| f[1]).collect();
        assert_eq!(offsets, vec![0, 62, 124]);
        let lens: Vec<usize> = frames.iter().map(|f| f.len() - 2).collect();
        assert_eq!(lens, vec![62, 62, 6]);
        assert!(frames.iter().all(|f| f[0] == Command::WriteConfig.opcode()));
        assert_eq!(&frames[2][2..], &payload[124..]);
    }

    #[test]
    fn test_write_config_frames_offset_bound() {
        let payload = vec![0xAB; 400];
        let frames = write_config_frames(&payload);
        // offsets 0, 62, 124, 186, 248; 310 would not fit in a byte
        assert_eq!(frames.len(), 5);
        assert_eq!(frames.last().unwrap()[1], 248);
    }

    #[test]
    fn test_fault_mask() {
        let faults = Fault::active(0b10_0101);
        assert_eq!(
            faults,
            vec![Fault::OverTempChip, Fault::OverCurrent, Fault::CurrentImbalance]
        );
        assert!(Fault::active(0).is_empty());
    }

    #[test]
    fn test_hpwr_capability() {
        assert_eq!(HpwrCapability::from_code(0).map(|c| c.watts()), Some(600));
        assert_eq!(HpwrCapability::from_code(3).map(|c| c.watts()), Some(150));
        assert_eq!(HpwrCapability::from_code(7), None);
    }

    #[test]
    fn test_decode_uid() {
        let uid: Vec<u8> = (0..12).collect();
        assert_eq!(decode_uid(&uid).unwrap(), "000102030405060708090A0B");
    }
}
