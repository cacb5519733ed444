//! Serial transport
//!
//! The port is opened only for the duration of each exchange, always through
//! the [`PortArbiter`], so other processes sharing the device interleave
//! cleanly with this one.

pub mod discovery;
pub mod flash;
pub mod link;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wv_error::{Result, WireViewError};
use wv_protocol::serial::{
    self as wire, clear_faults_frame, command_frame, is_welcome, nvm_frame, screen_frame,
    write_config_frames, WELCOME_LEN,
};
use wv_protocol::{
    BuildInfo, Command, ConfigVersion, DeviceConfig, NvmCommand, ScreenCommand, SensorReadings,
    VendorData,
};

use crate::arbiter::{PortArbiter, PortSession};
use crate::constants::{names, poll, serial as serial_consts};
use crate::data::{ConnectionState, DeviceData, DeviceInfo};
use crate::events::{DeviceEvent, EventHub};
use crate::transport::DeviceTransport;
use crate::worker::{StopSignal, Worker};

use self::link::LinkOpener;

#[derive(Debug, Clone, Default)]
struct Identity {
    hardware_revision: String,
    firmware_version: String,
    unique_id: String,
    config_version: Option<ConfigVersion>,
}

struct Inner {
    port: String,
    baud: u32,
    arbiter: Arc<PortArbiter>,
    opener: Arc<dyn LinkOpener>,
    state: Mutex<ConnectionState>,
    identity: Mutex<Identity>,
    poll_interval_ms: AtomicU64,
    events: EventHub<DeviceEvent>,
}

impl Inner {
    /// Locked, opened port with stale input discarded
    fn session(&self) -> Result<PortSession> {
        let mut s = self
            .arbiter
            .open_session(self.opener.as_ref(), &self.port, self.baud)?;
        s.clear_input()?;
        Ok(s)
    }

    /// Write `frame` and read back exactly `response_len` bytes
    fn exchange(&self, frame: &[u8], response_len: usize) -> Result<Vec<u8>> {
        let mut s = self.session()?;
        if !frame.is_empty() {
            s.write(frame)?;
        }
        if response_len == 0 {
            return Ok(Vec::new());
        }
        s.read_exact(response_len, serial_consts::READ_TIMEOUT)
    }

    /// Pulse the ready line and collect the unsolicited banner
    fn read_welcome(&self) -> Result<bool> {
        let mut s = self.session()?;
        s.set_ready_line(true)?;
        thread::sleep(serial_consts::READY_PULSE);
        let banner = s.read_exact(WELCOME_LEN, serial_consts::READ_TIMEOUT);
        thread::sleep(serial_consts::READY_PULSE);
        s.set_ready_line(false)?;
        Ok(is_welcome(&banner?))
    }

    fn read_sensors(&self) -> Result<SensorReadings> {
        let buf = self.exchange(
            &command_frame(Command::ReadSensorValues),
            SensorReadings::SIZE,
        )?;
        SensorReadings::decode(&buf)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::SeqCst))
    }

    fn config_version(&self) -> Result<ConfigVersion> {
        if *self.state.lock() != ConnectionState::Connected {
            return Err(WireViewError::DeviceNotConnected);
        }
        self.identity
            .lock()
            .config_version
            .ok_or(WireViewError::DeviceNotConnected)
    }

    fn ensure_connected(&self) -> Result<()> {
        self.config_version().map(|_| ())
    }

    /// Transition to Disconnected; emits only if the state actually changed
    fn mark_disconnected(&self) {
        let was_connected = {
            let mut state = self.state.lock();
            let was = *state == ConnectionState::Connected;
            *state = ConnectionState::Disconnected;
            was
        };
        if was_connected {
            *self.identity.lock() = Identity::default();
            info!(port = %self.port, "serial device disconnected");
            self.events.emit(&DeviceEvent::ConnectionChanged(false));
        }
    }
}

/// WireView Pro II attached over its USB CDC serial port
pub struct SerialDevice {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl SerialDevice {
    pub fn new(
        port: impl Into<String>,
        baud: u32,
        arbiter: Arc<PortArbiter>,
        opener: Arc<dyn LinkOpener>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                port: port.into(),
                baud,
                arbiter,
                opener,
                state: Mutex::new(ConnectionState::Disconnected),
                identity: Mutex::new(Identity::default()),
                poll_interval_ms: AtomicU64::new(poll::DEFAULT_INTERVAL.as_millis() as u64),
                events: EventHub::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Real serial port at the default baud rate
    pub fn open_port(port: impl Into<String>, arbiter: Arc<PortArbiter>) -> Self {
        Self::new(
            port,
            serial_consts::BAUD_RATE,
            arbiter,
            Arc::new(link::SerialPortOpener),
        )
    }

    pub fn port(&self) -> &str {
        &self.inner.port
    }

    fn handshake(&self) -> Result<Identity> {
        let inner = &self.inner;
        if !inner.read_welcome()? {
            return Err(WireViewError::HandshakeFailed(format!(
                "{}: unexpected welcome banner",
                inner.port
            )));
        }

        let vd = VendorData::decode(
            &inner.exchange(&command_frame(Command::ReadVendorData), VendorData::SIZE)?,
        )?;
        if !vd.is_wireview() {
            return Err(WireViewError::HandshakeFailed(format!(
                "{}: unexpected vendor/product {}",
                inner.port,
                vd.hardware_revision()
            )));
        }

        let unique_id = match inner
            .exchange(&command_frame(Command::ReadUid), wire::UID_LEN)
            .and_then(|b| wire::decode_uid(&b))
        {
            Ok(uid) => uid,
            Err(e) => {
                warn!(port = %inner.port, error = %e, "UID read failed");
                String::new()
            }
        };

        inner.exchange(&screen_frame(ScreenCommand::ResumeUpdates), 0)?;

        Ok(Identity {
            hardware_revision: vd.hardware_revision(),
            firmware_version: vd.fw_version.to_string(),
            unique_id,
            config_version: Some(ConfigVersion::for_firmware(vd.fw_version)),
        })
    }

    fn start_polling(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let worker = Worker::spawn("wireview-serial-poll", move |stop| poll_loop(inner, stop))?;
        *self.worker.lock() = Some(worker);
        Ok(())
    }

    /// Full build-info record
    pub fn read_build_info(&self) -> Result<BuildInfo> {
        self.inner.ensure_connected()?;
        let buf = self
            .inner
            .exchange(&command_frame(Command::ReadBuildInfo), BuildInfo::SIZE)?;
        BuildInfo::decode(&buf)
    }

    /// One sensor read outside the poll loop
    pub fn read_sensors(&self) -> Result<DeviceData> {
        self.inner.ensure_connected()?;
        let r = self.inner.read_sensors()?;
        let id = self.inner.identity.lock().clone();
        Ok(DeviceData::from_readings(
            &r,
            chrono::Utc::now().naive_utc(),
            &id.hardware_revision,
            &id.firmware_version,
        ))
    }
}

fn poll_loop(inner: Arc<Inner>, stop: Arc<StopSignal>) {
    debug!(port = %inner.port, "serial poll loop started");
    while !stop.is_stopped() {
        match inner.read_sensors() {
            Ok(r) => {
                let id = inner.identity.lock().clone();
                let data = DeviceData::from_readings(
                    &r,
                    chrono::Utc::now().naive_utc(),
                    &id.hardware_revision,
                    &id.firmware_version,
                );
                inner.events.emit(&DeviceEvent::Data(data));
            }
            Err(WireViewError::PortBusy) => {
                debug!(port = %inner.port, "port busy, skipping poll cycle");
            }
            Err(e) => {
                if !stop.is_stopped() {
                    warn!(port = %inner.port, error = %e, "sensor poll failed");
                    inner.mark_disconnected();
                }
                break;
            }
        }
        if stop.sleep(inner.poll_interval()) {
            break;
        }
    }
    debug!(port = %inner.port, "serial poll loop exited");
}

impl DeviceTransport for SerialDevice {
    fn connect(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    return Err(WireViewError::InvalidArgument(
                        "connect already in progress".into(),
                    ))
                }
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }

        let identity = match self.handshake() {
            Ok(id) => id,
            Err(e) => {
                *self.inner.state.lock() = ConnectionState::Disconnected;
                debug!(port = %self.inner.port, error = %e, "handshake failed");
                return Err(e);
            }
        };

        info!(
            port = %self.inner.port,
            fw = %identity.firmware_version,
            uid = %identity.unique_id,
            "serial device connected"
        );
        *self.inner.identity.lock() = identity;
        *self.inner.state.lock() = ConnectionState::Connected;
        self.inner.events.emit(&DeviceEvent::ConnectionChanged(true));

        if let Err(e) = self.start_polling() {
            self.inner.mark_disconnected();
            return Err(e);
        }
        Ok(())
    }

    fn disconnect(&self) {
        let worker = self.worker.lock().take();
        if let Some(w) = worker {
            w.stop_and_join();
        }
        self.inner.mark_disconnected();
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    fn info(&self) -> DeviceInfo {
        let id = self.inner.identity.lock().clone();
        DeviceInfo {
            name: names::SERIAL_DEVICE.to_string(),
            hardware_revision: id.hardware_revision,
            firmware_version: id.firmware_version,
            unique_id: id.unique_id,
            config_version: id.config_version,
            daemon_available: false,
        }
    }

    fn events(&self) -> &EventHub<DeviceEvent> {
        &self.inner.events
    }

    fn poll_interval(&self) -> Duration {
        self.inner.poll_interval()
    }

    fn set_poll_interval(&self, interval: Duration) {
        let clamped = poll::clamp(interval, poll::SERIAL_MIN, poll::SERIAL_MAX);
        self.inner
            .poll_interval_ms
            .store(clamped.as_millis() as u64, Ordering::SeqCst);
    }

    fn read_config(&self) -> Result<DeviceConfig> {
        let version = self.inner.config_version()?;
        let buf = self
            .inner
            .exchange(&command_frame(Command::ReadConfig), version.encoded_len())?;
        DeviceConfig::decode_versioned(&buf, version)
    }

    fn write_config(&self, config: &DeviceConfig) -> Result<()> {
        let version = self.inner.config_version()?;
        let payload = config.encode_versioned(version);
        let frames = write_config_frames(&payload);

        let mut s = self.inner.session()?;
        for frame in &frames {
            s.write(frame)?;
        }
        debug!(
            port = %self.inner.port,
            bytes = payload.len(),
            frames = frames.len(),
            "config written"
        );
        Ok(())
    }

    fn screen_cmd(&self, cmd: ScreenCommand) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner.exchange(&screen_frame(cmd), 0).map(|_| ())
    }

    fn nvm_cmd(&self, cmd: NvmCommand) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner.exchange(&nvm_frame(cmd), 0).map(|_| ())
    }

    fn clear_faults(&self, status_mask: u16, log_mask: u16) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner
            .exchange(&clear_faults_frame(status_mask, log_mask), 0)
            .map(|_| ())
    }

    fn read_build_string(&self) -> Result<String> {
        self.read_build_info().map(|b| b.build)
    }

    fn enter_bootloader(&self) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner.exchange(&command_frame(Command::Bootloader), 0)?;
        info!(port = %self.inner.port, "bootloader requested");
        self.disconnect();
        Ok(())
    }
}

impl Drop for SerialDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}
