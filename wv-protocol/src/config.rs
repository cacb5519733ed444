//! Device configuration records
//!
//! Two layouts exist on the wire. V1 is what firmware 1 and 2 store; V2 adds an
//! averaging-window byte after the logging interval. [`DeviceConfig`] is the V2
//! shape and is what callers edit; [`DeviceConfigV1`] exists only at the codec
//! boundary.
//!
//! The `crc` field is carried through unchanged. It is never validated on read
//! nor recomputed on write.

use serde::{Deserialize, Serialize};
use wv_error::{Result, WireViewError};

use crate::serial::DEVICE_STR_LEN;
use crate::wire::{nul_terminated_ascii, WireReader, WireWriter};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $val:literal),+ $(,)? }) => {
        $(#[$meta])*
        ///
        /// Values this build does not know are kept in `Unknown` so a record
        /// written by newer firmware still decodes and re-encodes unchanged.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
            Unknown(u8),
        }

        impl $name {
            /// Byte stored on the wire
            pub fn raw(self) -> u8 {
                match self {
                    $(Self::$variant => $val,)+
                    Self::Unknown(v) => v,
                }
            }
        }

        impl From<u8> for $name {
            fn from(v: u8) -> Self {
                match v {
                    $($val => Self::$variant,)+
                    other => Self::Unknown(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(v: $name) -> u8 {
                v.raw()
            }
        }
    };
}

wire_enum!(FanMode { Curve = 0, Fixed = 1 });

wire_enum!(TempSource {
    TsIn = 0,
    TsOut = 1,
    Ts1 = 2,
    Ts2 = 3,
    TMax = 4,
});

wire_enum!(CurrentScale {
    Amps5 = 0,
    Amps10 = 1,
    Amps15 = 2,
    Amps20 = 3,
});

wire_enum!(PowerScale {
    Auto = 0,
    Watts300 = 1,
    Watts600 = 2,
});

wire_enum!(Theme { Tg1 = 0, Tg2 = 1, Tg3 = 2 });

wire_enum!(DisplayRotation { Deg0 = 0, Deg180 = 1 });

wire_enum!(TimeoutMode {
    Static = 0,
    Cycle = 1,
    Sleep = 2,
});

wire_enum!(
    /// Measurement averaging window (V2 only)
    Averaging {
        Ms22 = 0,
        Ms44 = 1,
        Ms89 = 2,
        Ms177 = 3,
        Ms354 = 4,
        Ms709 = 5,
        Ms1417 = 6,
    }
);

impl Averaging {
    /// Value synthesized when a V1 record is widened
    pub const V1_DEFAULT: Averaging = Averaging::Ms1417;
}

/// Layout selector negotiated at handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigVersion {
    V1,
    V2,
}

impl ConfigVersion {
    /// Firmware newer than 2 stores the V2 record
    pub fn for_firmware(fw_version: u8) -> Self {
        if fw_version > 2 {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// Version byte used by the daemon protocol (0 = V1, 1 = V2)
    pub fn from_wire_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::V1),
            1 => Ok(Self::V2),
            other => Err(WireViewError::UnsupportedConfigVersion(other)),
        }
    }

    pub fn wire_id(self) -> u8 {
        match self {
            Self::V1 => 0,
            Self::V2 => 1,
        }
    }

    pub fn encoded_len(self) -> usize {
        match self {
            Self::V1 => DeviceConfigV1::SIZE,
            Self::V2 => DeviceConfig::SIZE,
        }
    }
}

/// NUL-terminated ASCII name in a fixed 32-byte field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendlyName([u8; DEVICE_STR_LEN]);

impl FriendlyName {
    pub fn from_raw(raw: [u8; DEVICE_STR_LEN]) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &[u8; DEVICE_STR_LEN] {
        &self.0
    }

    /// Build from ASCII text; at most 31 characters so a terminator always fits
    pub fn new(name: &str) -> Result<Self> {
        if !name.is_ascii() {
            return Err(WireViewError::InvalidArgument(
                "friendly name must be ASCII".into(),
            ));
        }
        if name.len() >= DEVICE_STR_LEN {
            return Err(WireViewError::InvalidArgument(format!(
                "friendly name longer than {} characters",
                DEVICE_STR_LEN - 1
            )));
        }
        if name.bytes().any(|b| b == 0) {
            return Err(WireViewError::InvalidArgument(
                "friendly name contains NUL".into(),
            ));
        }
        let mut raw = [0u8; DEVICE_STR_LEN];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self(raw))
    }

    pub fn as_string(&self) -> String {
        nul_terminated_ascii(&self.0)
    }
}

impl Default for FriendlyName {
    fn default() -> Self {
        Self([0u8; DEVICE_STR_LEN])
    }
}

impl Serialize for FriendlyName {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for FriendlyName {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        FriendlyName::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Fan control sub-record (8 bytes, 2-byte aligned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanConfig {
    pub mode: FanMode,
    pub temp_source: TempSource,
    pub duty_min: u8,
    pub duty_max: u8,
    /// 0.1 °C
    pub temp_min: i16,
    /// 0.1 °C
    pub temp_max: i16,
}

impl FanConfig {
    fn read(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            mode: FanMode::from(r.u8()?),
            temp_source: TempSource::from(r.u8()?),
            duty_min: r.u8()?,
            duty_max: r.u8()?,
            temp_min: r.i16()?,
            temp_max: r.i16()?,
        })
    }

    fn write(&self, w: &mut WireWriter) {
        w.u8(self.mode.raw())
            .u8(self.temp_source.raw())
            .u8(self.duty_min)
            .u8(self.duty_max)
            .i16(self.temp_min)
            .i16(self.temp_max);
    }
}

/// On-device display sub-record (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig {
    pub current_scale: CurrentScale,
    pub power_scale: PowerScale,
    pub theme: Theme,
    pub display_rotation: DisplayRotation,
    pub timeout_mode: TimeoutMode,
    /// Bitmask of screens included in cycle mode
    pub cycle_screens: u8,
    /// Seconds per screen in cycle mode
    pub cycle_time: u8,
    /// Seconds before the timeout mode applies
    pub timeout: u8,
}

impl UiConfig {
    fn read(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            current_scale: CurrentScale::from(r.u8()?),
            power_scale: PowerScale::from(r.u8()?),
            theme: Theme::from(r.u8()?),
            display_rotation: DisplayRotation::from(r.u8()?),
            timeout_mode: TimeoutMode::from(r.u8()?),
            cycle_screens: r.u8()?,
            cycle_time: r.u8()?,
            timeout: r.u8()?,
        })
    }

    fn write(&self, w: &mut WireWriter) {
        w.u8(self.current_scale.raw())
            .u8(self.power_scale.raw())
            .u8(self.theme.raw())
            .u8(self.display_rotation.raw())
            .u8(self.timeout_mode.raw())
            .u8(self.cycle_screens)
            .u8(self.cycle_time)
            .u8(self.timeout);
    }
}

/// Which faults drive the display, buzzer, and power outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEnableMasks {
    pub display: u16,
    pub buzzer: u16,
    pub soft_power: u16,
    pub hard_power: u16,
}

/// Fault trip points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultThresholds {
    /// 0.1 °C
    pub temperature: i16,
    /// A
    pub over_current: u8,
    /// 0.1 A
    pub wire_over_current: u8,
    /// W
    pub over_power: u16,
    /// %
    pub current_imbalance: u8,
    /// A
    pub current_imbalance_min_load: u8,
}

/// Fields shared by both layouts, read/written in wire order up to the logging interval
struct CommonFields {
    crc: u16,
    version: u8,
    friendly_name: FriendlyName,
    fan: FanConfig,
    backlight_duty: u8,
    fault_enable: FaultEnableMasks,
    thresholds: FaultThresholds,
    shutdown_wait_time: u8,
    logging_interval: u8,
}

impl CommonFields {
    // 0 crc, 2 version, 3 name[32], 35 pad, 36 fan[8], 44 backlight, 45 pad,
    // 46 four u16 masks, 54 ts threshold, 56 ocp, 57 wire ocp, 58 opp u16,
    // 60 imbalance, 61 imbalance min load, 62 shutdown wait, 63 logging interval
    fn read(r: &mut WireReader<'_>) -> Result<Self> {
        let crc = r.u16()?;
        let version = r.u8()?;
        let friendly_name = FriendlyName::from_raw(r.array::<DEVICE_STR_LEN>()?);
        r.skip(1)?;
        let fan = FanConfig::read(r)?;
        let backlight_duty = r.u8()?;
        r.skip(1)?;
        let fault_enable = FaultEnableMasks {
            display: r.u16()?,
            buzzer: r.u16()?,
            soft_power: r.u16()?,
            hard_power: r.u16()?,
        };
        let thresholds = FaultThresholds {
            temperature: r.i16()?,
            over_current: r.u8()?,
            wire_over_current: r.u8()?,
            over_power: r.u16()?,
            current_imbalance: r.u8()?,
            current_imbalance_min_load: r.u8()?,
        };
        Ok(Self {
            crc,
            version,
            friendly_name,
            fan,
            backlight_duty,
            fault_enable,
            thresholds,
            shutdown_wait_time: r.u8()?,
            logging_interval: r.u8()?,
        })
    }

    fn write(&self, w: &mut WireWriter) {
        w.u16(self.crc).u8(self.version).bytes(self.friendly_name.raw()).pad(1);
        self.fan.write(w);
        w.u8(self.backlight_duty)
            .pad(1)
            .u16(self.fault_enable.display)
            .u16(self.fault_enable.buzzer)
            .u16(self.fault_enable.soft_power)
            .u16(self.fault_enable.hard_power)
            .i16(self.thresholds.temperature)
            .u8(self.thresholds.over_current)
            .u8(self.thresholds.wire_over_current)
            .u16(self.thresholds.over_power)
            .u8(self.thresholds.current_imbalance)
            .u8(self.thresholds.current_imbalance_min_load)
            .u8(self.shutdown_wait_time)
            .u8(self.logging_interval);
    }
}

/// Configuration record as stored by firmware 1-2 (72 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfigV1 {
    pub crc: u16,
    pub version: u8,
    pub friendly_name: FriendlyName,
    pub fan: FanConfig,
    pub backlight_duty: u8,
    pub fault_enable: FaultEnableMasks,
    pub thresholds: FaultThresholds,
    pub shutdown_wait_time: u8,
    pub logging_interval: u8,
    pub ui: UiConfig,
}

impl DeviceConfigV1 {
    pub const SIZE: usize = 72;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::with_size(buf, Self::SIZE)?;
        let c = CommonFields::read(&mut r)?;
        let ui = UiConfig::read(&mut r)?;
        Ok(Self {
            crc: c.crc,
            version: c.version,
            friendly_name: c.friendly_name,
            fan: c.fan,
            backlight_duty: c.backlight_duty,
            fault_enable: c.fault_enable,
            thresholds: c.thresholds,
            shutdown_wait_time: c.shutdown_wait_time,
            logging_interval: c.logging_interval,
            ui,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::SIZE);
        self.common().write(&mut w);
        self.ui.write(&mut w);
        w.finish()
    }

    fn common(&self) -> CommonFields {
        CommonFields {
            crc: self.crc,
            version: self.version,
            friendly_name: self.friendly_name,
            fan: self.fan,
            backlight_duty: self.backlight_duty,
            fault_enable: self.fault_enable,
            thresholds: self.thresholds,
            shutdown_wait_time: self.shutdown_wait_time,
            logging_interval: self.logging_interval,
        }
    }
}

/// Configuration record in V2 shape (74 bytes on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub crc: u16,
    pub version: u8,
    pub friendly_name: FriendlyName,
    pub fan: FanConfig,
    pub backlight_duty: u8,
    pub fault_enable: FaultEnableMasks,
    pub thresholds: FaultThresholds,
    pub shutdown_wait_time: u8,
    pub logging_interval: u8,
    pub average: Averaging,
    pub ui: UiConfig,
}

impl DeviceConfig {
    pub const SIZE: usize = 74;

    /// Decode the V2 layout (64 averaging, 65 ui[8], 73 pad)
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = WireReader::with_size(buf, Self::SIZE)?;
        let c = CommonFields::read(&mut r)?;
        let average = Averaging::from(r.u8()?);
        let ui = UiConfig::read(&mut r)?;
        Ok(Self {
            crc: c.crc,
            version: c.version,
            friendly_name: c.friendly_name,
            fan: c.fan,
            backlight_duty: c.backlight_duty,
            fault_enable: c.fault_enable,
            thresholds: c.thresholds,
            shutdown_wait_time: c.shutdown_wait_time,
            logging_interval: c.logging_interval,
            average,
            ui,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(Self::SIZE);
        CommonFields {
            crc: self.crc,
            version: self.version,
            friendly_name: self.friendly_name,
            fan: self.fan,
            backlight_duty: self.backlight_duty,
            fault_enable: self.fault_enable,
            thresholds: self.thresholds,
            shutdown_wait_time: self.shutdown_wait_time,
            logging_interval: self.logging_interval,
        }
        .write(&mut w);
        w.u8(self.average.raw());
        self.ui.write(&mut w);
        w.pad(1);
        w.finish()
    }

    /// Decode whichever layout `version` names, widening V1 records
    pub fn decode_versioned(buf: &[u8], version: ConfigVersion) -> Result<Self> {
        match version {
            ConfigVersion::V1 => DeviceConfigV1::decode(buf).map(Self::from),
            ConfigVersion::V2 => Self::decode(buf),
        }
    }

    /// Encode in the layout `version` names, narrowing to V1 when needed
    pub fn encode_versioned(&self, version: ConfigVersion) -> Vec<u8> {
        match version {
            ConfigVersion::V1 => DeviceConfigV1::from(self).encode(),
            ConfigVersion::V2 => self.encode(),
        }
    }
}

impl From<DeviceConfigV1> for DeviceConfig {
    fn from(v1: DeviceConfigV1) -> Self {
        Self {
            crc: v1.crc,
            version: v1.version,
            friendly_name: v1.friendly_name,
            fan: v1.fan,
            backlight_duty: v1.backlight_duty,
            fault_enable: v1.fault_enable,
            thresholds: v1.thresholds,
            shutdown_wait_time: v1.shutdown_wait_time,
            logging_interval: v1.logging_interval,
            average: Averaging::V1_DEFAULT,
            ui: v1.ui,
        }
    }
}

impl From<&DeviceConfig> for DeviceConfigV1 {
    fn from(v2: &DeviceConfig) -> Self {
        Self {
            crc: v2.crc,
            version: v2.version,
            friendly_name: v2.friendly_name,
            fan: v2.fan,
            backlight_duty: v2.backlight_duty,
            fault_enable: v2.fault_enable,
            thresholds: v2.thresholds,
            shutdown_wait_time: v2.shutdown_wait_time,
            logging_interval: v2.logging_interval,
            ui: v2.ui,
        }
    }
}
