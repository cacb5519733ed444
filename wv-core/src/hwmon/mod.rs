//! hwmon transport
//!
//! Telemetry comes from the kernel driver's sysfs attributes. Commands that
//! need the device itself (config, screen, NVM, bootloader) go through the
//! `wireviewd` socket when the daemon is running; without it the transport
//! is read-only.

pub mod daemon_client;
pub mod sysfs;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wv_error::{Result, WireViewError};
use wv_protocol::{DaemonDeviceInfo, DeviceConfig, NvmCommand, ScreenCommand};

use crate::constants::{names, poll};
use crate::data::{ConnectionState, DeviceData, DeviceInfo};
use crate::events::{DeviceEvent, EventHub};
use crate::transport::DeviceTransport;
use crate::worker::{StopSignal, Worker};

use self::daemon_client::DaemonClient;

struct DaemonChannel {
    client: DaemonClient,
    info: DaemonDeviceInfo,
}

struct Inner {
    dir: PathBuf,
    socket_path: PathBuf,
    state: Mutex<ConnectionState>,
    daemon: Mutex<Option<DaemonChannel>>,
    /// Copy of the daemon's identity; readable while a request holds `daemon`
    identity: Mutex<Option<DaemonDeviceInfo>>,
    poll_interval_ms: AtomicU64,
    events: EventHub<DeviceEvent>,
}

impl Inner {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::SeqCst))
    }

    fn ensure_connected(&self) -> Result<()> {
        if *self.state.lock() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(WireViewError::DeviceNotConnected)
        }
    }

    /// Open the control socket and learn the device identity through it
    fn open_daemon(&self) {
        let mut client = match DaemonClient::connect(&self.socket_path) {
            Ok(c) => c,
            Err(e) => {
                debug!(socket = %self.socket_path.display(), error = %e, "daemon not available");
                return;
            }
        };
        match client.device_info() {
            Ok(info) => {
                info!(
                    socket = %self.socket_path.display(),
                    fw = info.fw_version,
                    uid = %info.uid,
                    "daemon attached"
                );
                let mut daemon = self.daemon.lock();
                *self.identity.lock() = Some(info.clone());
                *daemon = Some(DaemonChannel { client, info });
            }
            Err(e) => {
                warn!(socket = %self.socket_path.display(), error = %e, "daemon device info failed");
            }
        }
    }

    /// Run `f` against the daemon; any failure drops the channel and the
    /// transport continues on sysfs alone
    fn with_daemon<T>(
        &self,
        f: impl FnOnce(&mut DaemonChannel) -> Result<T>,
    ) -> Result<T> {
        self.ensure_connected()?;
        let mut guard = self.daemon.lock();
        let channel = guard.as_mut().ok_or(WireViewError::DaemonUnavailable)?;
        match f(channel) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(error = %e, "daemon request failed, falling back to sysfs only");
                *guard = None;
                *self.identity.lock() = None;
                Err(e)
            }
        }
    }

    fn daemon_available(&self) -> bool {
        self.identity.lock().is_some()
    }

    fn snapshot(&self) -> Result<DeviceData> {
        let r = sysfs::read_readings(&self.dir)?;
        let mut d = DeviceData::empty(chrono::Utc::now().naive_utc());
        d.connected = true;
        if let Some(info) = self.identity.lock().as_ref() {
            d.firmware_version = info.fw_version.to_string();
        }
        d.pin_voltage = r.pin_voltage;
        d.pin_current = r.pin_current;
        d.temps_c = r.temps_c;
        d.fault_status = r.fault_status;
        d.fault_log = r.fault_log;
        d.psu_capability_w = r.psu_capability_w;
        Ok(d)
    }

    fn mark_disconnected(&self) {
        let was_connected = {
            let mut state = self.state.lock();
            let was = *state == ConnectionState::Connected;
            *state = ConnectionState::Disconnected;
            was
        };
        *self.daemon.lock() = None;
        *self.identity.lock() = None;
        if was_connected {
            info!(dir = %self.dir.display(), "hwmon device disconnected");
            self.events.emit(&DeviceEvent::ConnectionChanged(false));
        }
    }
}

/// WireView Pro II exposed by the `wireview` hwmon kernel driver
pub struct HwmonDevice {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl HwmonDevice {
    pub fn new(dir: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir: dir.into(),
                socket_path: socket_path.into(),
                state: Mutex::new(ConnectionState::Disconnected),
                daemon: Mutex::new(None),
                identity: Mutex::new(None),
                poll_interval_ms: AtomicU64::new(poll::DEFAULT_INTERVAL.as_millis() as u64),
                events: EventHub::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Locate the driver's node under `hwmon_base`
    pub fn discover(hwmon_base: &Path, socket_path: impl Into<PathBuf>) -> Option<Self> {
        sysfs::find_hwmon_dir(hwmon_base).map(|dir| Self::new(dir, socket_path))
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn daemon_available(&self) -> bool {
        self.inner.daemon_available()
    }

    /// One sysfs read outside the poll loop
    pub fn read_sensors(&self) -> Result<DeviceData> {
        self.inner.ensure_connected()?;
        self.inner.snapshot()
    }
}

/// Consecutive read failures tolerated before the node is given up
#[derive(Debug)]
struct FailureBudget {
    failures: u32,
    limit: u32,
}

impl FailureBudget {
    fn new(limit: u32) -> Self {
        Self { failures: 0, limit }
    }

    fn success(&mut self) {
        self.failures = 0;
    }

    /// Count one failure; true once the limit is reached
    fn failure(&mut self) -> bool {
        self.failures += 1;
        self.failures >= self.limit
    }
}

fn poll_loop(inner: Arc<Inner>, stop: Arc<StopSignal>) {
    debug!(dir = %inner.dir.display(), "hwmon poll loop started");
    let mut budget = FailureBudget::new(poll::MAX_HWMON_FAILURES);
    while !stop.is_stopped() {
        if !inner.dir.exists() {
            info!(dir = %inner.dir.display(), "hwmon node removed");
            inner.mark_disconnected();
            break;
        }
        match inner.snapshot() {
            Ok(data) => {
                budget.success();
                inner.events.emit(&DeviceEvent::Data(data));
            }
            Err(e) => {
                let exhausted = budget.failure();
                warn!(
                    dir = %inner.dir.display(),
                    error = %e,
                    failures = budget.failures,
                    "hwmon read failed"
                );
                if exhausted {
                    inner.mark_disconnected();
                    break;
                }
            }
        }
        if stop.sleep(inner.poll_interval()) {
            break;
        }
    }
    debug!(dir = %inner.dir.display(), "hwmon poll loop exited");
}

impl DeviceTransport for HwmonDevice {
    fn connect(&self) -> Result<()> {
        if self.inner.ensure_connected().is_ok() {
            return Ok(());
        }
        if !sysfs::is_wireview_dir(&self.inner.dir) {
            return Err(WireViewError::HandshakeFailed(format!(
                "{} is not a wireview hwmon node",
                self.inner.dir.display()
            )));
        }

        self.inner.open_daemon();
        *self.inner.state.lock() = ConnectionState::Connected;
        info!(
            dir = %self.inner.dir.display(),
            daemon = self.inner.daemon_available(),
            "hwmon device connected"
        );
        self.inner.events.emit(&DeviceEvent::ConnectionChanged(true));

        let inner = Arc::clone(&self.inner);
        match Worker::spawn("wireview-hwmon-poll", move |stop| poll_loop(inner, stop)) {
            Ok(w) => {
                *self.worker.lock() = Some(w);
                Ok(())
            }
            Err(e) => {
                self.inner.mark_disconnected();
                Err(e.into())
            }
        }
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
        match self.inner.identity.lock().as_ref() {
            Some(id) => DeviceInfo {
                name: names::HWMON_DAEMON_DEVICE.to_string(),
                hardware_revision: String::new(),
                firmware_version: id.fw_version.to_string(),
                unique_id: id.uid.clone(),
                config_version: Some(id.config_version),
                daemon_available: true,
            },
            None => DeviceInfo {
                name: names::HWMON_DEVICE.to_string(),
                ..DeviceInfo::default()
            },
        }
    }

    fn events(&self) -> &EventHub<DeviceEvent> {
        &self.inner.events
    }

    fn poll_interval(&self) -> Duration {
        self.inner.poll_interval()
    }

    fn set_poll_interval(&self, interval: Duration) {
        let clamped = poll::clamp(interval, poll::FAST_MIN, poll::FAST_MAX);
        self.inner
            .poll_interval_ms
            .store(clamped.as_millis() as u64, Ordering::SeqCst);
    }

    fn read_config(&self) -> Result<DeviceConfig> {
        self.inner
            .with_daemon(|ch| ch.client.read_config(ch.info.config_version))
    }

    fn write_config(&self, config: &DeviceConfig) -> Result<()> {
        self.inner
            .with_daemon(|ch| ch.client.write_config(config, ch.info.config_version))
    }

    fn screen_cmd(&self, cmd: ScreenCommand) -> Result<()> {
        self.inner.with_daemon(|ch| ch.client.screen_cmd(cmd))
    }

    fn nvm_cmd(&self, cmd: NvmCommand) -> Result<()> {
        self.inner.with_daemon(|ch| ch.client.nvm_cmd(cmd))
    }

    fn clear_faults(&self, status_mask: u16, log_mask: u16) -> Result<()> {
        self.inner
            .with_daemon(|ch| ch.client.clear_faults(status_mask, log_mask))
    }

    fn read_build_string(&self) -> Result<String> {
        self.inner.with_daemon(|ch| ch.client.read_build())
    }

    fn enter_bootloader(&self) -> Result<()> {
        self.inner.with_daemon(|ch| ch.client.enter_bootloader())?;
        info!(dir = %self.inner.dir.display(), "bootloader requested via daemon");
        self.disconnect();
        Ok(())
    }
}

impl Drop for HwmonDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}
