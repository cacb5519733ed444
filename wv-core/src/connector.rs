//! Auto-connect supervisor
//!
//! Keeps one transport attached: probes the candidates in order, forwards the
//! attached transport's events to its own subscribers, and re-probes once the
//! transport reports a disconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use wv_error::Result;

use crate::arbiter::PortArbiter;
use crate::constants::poll;
use crate::events::{DeviceEvent, EventHub, Subscription};
use crate::hwmon::HwmonDevice;
use crate::serial::discovery::find_candidate_ports;
use crate::serial::link::SerialPortOpener;
use crate::serial::SerialDevice;
use crate::settings::Settings;
use crate::transport::DeviceTransport;
use crate::worker::{StopSignal, Worker};

/// Where the connector finds transports to probe
#[cfg_attr(test, mockall::automock)]
pub trait CandidateSource: Send + Sync {
    /// Serial transports, in probe order
    fn serial_candidates(&self) -> Vec<Arc<dyn DeviceTransport>>;

    /// hwmon transport tried when no serial candidate connects
    fn hwmon_candidate(&self) -> Option<Arc<dyn DeviceTransport>>;
}

/// Candidates from the running system, filtered by the transport preference
pub struct SystemCandidates {
    settings: Settings,
    arbiter: Arc<PortArbiter>,
}

impl SystemCandidates {
    pub fn new(settings: Settings) -> Self {
        let arbiter = Arc::new(PortArbiter::new(&settings.port_lock));
        Self { settings, arbiter }
    }
}

impl CandidateSource for SystemCandidates {
    fn serial_candidates(&self) -> Vec<Arc<dyn DeviceTransport>> {
        if !self.settings.transport.allows_serial() {
            return Vec::new();
        }
        let ports = match find_candidate_ports() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "serial enumeration failed");
                return Vec::new();
            }
        };
        ports
            .into_iter()
            .map(|port| {
                Arc::new(SerialDevice::new(
                    port,
                    self.settings.baud_rate,
                    Arc::clone(&self.arbiter),
                    Arc::new(SerialPortOpener),
                )) as Arc<dyn DeviceTransport>
            })
            .collect()
    }

    fn hwmon_candidate(&self) -> Option<Arc<dyn DeviceTransport>> {
        if !self.settings.transport.allows_hwmon() {
            return None;
        }
        HwmonDevice::discover(&self.settings.hwmon_base, &self.settings.daemon_socket)
            .map(|d| Arc::new(d) as Arc<dyn DeviceTransport>)
    }
}

struct Attached {
    id: u64,
    device: Arc<dyn DeviceTransport>,
    _subs: Vec<Subscription>,
}

struct Shared {
    source: Box<dyn CandidateSource>,
    current: Mutex<Option<Attached>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
    poll_interval_ms: AtomicU64,
    events: EventHub<DeviceEvent>,
}

impl Shared {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::SeqCst))
    }

    fn ensure_device(self: &Arc<Self>) -> bool {
        let stale = {
            let mut cur = self.current.lock();
            match cur.as_ref() {
                Some(a) if a.device.is_connected() => return true,
                Some(_) => cur.take(),
                None => None,
            }
        };
        if let Some(a) = stale {
            debug!(id = a.id, "dropping stale transport");
            let Attached { device, _subs, .. } = a;
            drop(_subs);
            device.disconnect();
            self.events.emit(&DeviceEvent::ConnectionChanged(false));
        }

        let interval = self.poll_interval();
        let serial = self.source.serial_candidates();
        let candidates = serial
            .into_iter()
            .map(Some)
            .chain(std::iter::once(None));

        for candidate in candidates {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            let device = match candidate {
                Some(d) => d,
                None => match self.source.hwmon_candidate() {
                    Some(d) => d,
                    None => break,
                },
            };
            device.set_poll_interval(interval);
            match device.connect() {
                Ok(()) => {
                    if self.attach(device) {
                        return true;
                    }
                }
                Err(e) => debug!(error = %e, "candidate did not connect"),
            }
        }
        false
    }

    fn attach(self: &Arc<Self>, device: Arc<dyn DeviceTransport>) -> bool {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let weak: Weak<Shared> = Arc::downgrade(self);
        let sub = device.events().subscribe(move |ev: &DeviceEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.on_device_event(id, ev);
            }
        });

        let info = device.info();
        {
            // Checked under the lock so a disconnect racing with attach is never lost
            let mut cur = self.current.lock();
            if self.stopped.load(Ordering::SeqCst) || !device.is_connected() {
                drop(cur);
                drop(sub);
                device.disconnect();
                return false;
            }
            *cur = Some(Attached {
                id,
                device,
                _subs: vec![sub],
            });
        }
        info!(id, name = %info.name, uid = %info.unique_id, "device attached");
        self.events.emit(&DeviceEvent::ConnectionChanged(true));
        true
    }

    fn on_device_event(&self, id: u64, ev: &DeviceEvent) {
        match ev {
            DeviceEvent::Data(_) => self.events.emit(ev),
            DeviceEvent::ConnectionChanged(true) => {}
            DeviceEvent::ConnectionChanged(false) => {
                let detached = {
                    let mut cur = self.current.lock();
                    match cur.as_ref() {
                        Some(a) if a.id == id => cur.take(),
                        _ => None,
                    }
                };
                if let Some(a) = detached {
                    info!(id, "device detached");
                    self.events.emit(&DeviceEvent::ConnectionChanged(false));
                    // Dropped here, outside the lock; may be the last reference
                    drop(a);
                }
            }
        }
    }
}

fn run(shared: Arc<Shared>, stop: Arc<StopSignal>) {
    debug!("connector loop started");
    while !stop.is_stopped() {
        shared.ensure_device();
        if stop.sleep(shared.poll_interval()) {
            break;
        }
    }
    debug!("connector loop exited");
}

/// Keeps a WireView attached across unplug/replug
pub struct AutoConnector {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl AutoConnector {
    pub fn new(source: Box<dyn CandidateSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                current: Mutex::new(None),
                next_id: AtomicU64::new(1),
                stopped: AtomicBool::new(false),
                poll_interval_ms: AtomicU64::new(poll::DEFAULT_INTERVAL.as_millis() as u64),
                events: EventHub::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Connector over the system's ports and hwmon nodes
    pub fn from_settings(settings: &Settings) -> Self {
        let c = Self::new(Box::new(SystemCandidates::new(settings.clone())));
        c.set_poll_interval(settings.poll_interval());
        c
    }

    /// Start the background loop; no-op when already running
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        self.shared.stopped.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        *worker = Some(Worker::spawn("wireview-connector", move |stop| {
            run(shared, stop)
        })?);
        Ok(())
    }

    /// Stop the loop and disconnect the attached transport
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        let worker = self.worker.lock().take();
        if let Some(w) = worker {
            w.stop_within(poll::STOP_GRACE);
        }

        let attached = self.shared.current.lock().take();
        if let Some(Attached { device, _subs, .. }) = attached {
            drop(_subs);
            device.disconnect();
            self.shared
                .events
                .emit(&DeviceEvent::ConnectionChanged(false));
        }
    }

    /// Probe once if nothing is attached; true when a transport is connected
    pub fn ensure_device(&self) -> bool {
        self.shared.stopped.store(false, Ordering::SeqCst);
        self.shared.ensure_device()
    }

    pub fn device(&self) -> Option<Arc<dyn DeviceTransport>> {
        self.shared
            .current
            .lock()
            .as_ref()
            .map(|a| Arc::clone(&a.device))
    }

    pub fn is_connected(&self) -> bool {
        self.device().is_some_and(|d| d.is_connected())
    }

    /// Forwarded telemetry plus attach/detach notifications
    pub fn events(&self) -> &EventHub<DeviceEvent> {
        &self.shared.events
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval()
    }

    /// Applies to the reconnect cadence and to the attached transport
    pub fn set_poll_interval(&self, interval: Duration) {
        let clamped = poll::clamp(interval, poll::FAST_MIN, poll::FAST_MAX);
        self.shared
            .poll_interval_ms
            .store(clamped.as_millis() as u64, Ordering::SeqCst);
        if let Some(d) = self.device() {
            d.set_poll_interval(clamped);
        }
    }
}

impl Drop for AutoConnector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use wv_error::WireViewError;
    use wv_protocol::{DeviceConfig, NvmCommand, ScreenCommand};

    use crate::data::{ConnectionState, DeviceData, DeviceInfo};
    use crate::serial::tests::wait_for;

    struct FakeTransport {
        name: &'static str,
        connectable: bool,
        state: Mutex<ConnectionState>,
        interval_ms: AtomicU64,
        connects: AtomicUsize,
        events: EventHub<DeviceEvent>,
    }

    impl FakeTransport {
        fn new(name: &'static str, connectable: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                connectable,
                state: Mutex::new(ConnectionState::Disconnected),
                interval_ms: AtomicU64::new(0),
                connects: AtomicUsize::new(0),
                events: EventHub::new(),
            })
        }

        /// Simulate the link dropping out from under the transport
        fn unplug(&self) {
            *self.state.lock() = ConnectionState::Disconnected;
            self.events.emit(&DeviceEvent::ConnectionChanged(false));
        }

        fn publish(&self) {
            let mut d = DeviceData::empty(chrono::Utc::now().naive_utc());
            d.connected = true;
            d.pin_current = [1.0; 6];
            self.events.emit(&DeviceEvent::Data(d));
        }
    }

    impl DeviceTransport for FakeTransport {
        fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.connectable {
                return Err(WireViewError::HandshakeFailed(self.name.into()));
            }
            *self.state.lock() = ConnectionState::Connected;
            self.events.emit(&DeviceEvent::ConnectionChanged(true));
            Ok(())
        }

        fn disconnect(&self) {
            let was = std::mem::replace(&mut *self.state.lock(), ConnectionState::Disconnected);
            if was == ConnectionState::Connected {
                self.events.emit(&DeviceEvent::ConnectionChanged(false));
            }
        }

        fn state(&self) -> ConnectionState {
            *self.state.lock()
        }

        fn info(&self) -> DeviceInfo {
            DeviceInfo {
                name: self.name.into(),
                ..DeviceInfo::default()
            }
        }

        fn events(&self) -> &EventHub<DeviceEvent> {
            &self.events
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
        }

        fn set_poll_interval(&self, interval: Duration) {
            self.interval_ms
                .store(interval.as_millis() as u64, Ordering::SeqCst);
        }

        fn read_config(&self) -> Result<DeviceConfig> {
            Err(WireViewError::DeviceNotConnected)
        }

        fn write_config(&self, _config: &DeviceConfig) -> Result<()> {
            Ok(())
        }

        fn screen_cmd(&self, _cmd: ScreenCommand) -> Result<()> {
            Ok(())
        }

        fn nvm_cmd(&self, _cmd: NvmCommand) -> Result<()> {
            Ok(())
        }

        fn clear_faults(&self, _status_mask: u16, _log_mask: u16) -> Result<()> {
            Ok(())
        }

        fn read_build_string(&self) -> Result<String> {
            Ok(String::new())
        }

        fn enter_bootloader(&self) -> Result<()> {
            self.disconnect();
            Ok(())
        }
    }

    fn as_dyn(t: &Arc<FakeTransport>) -> Arc<dyn DeviceTransport> {
        Arc::clone(t) as Arc<dyn DeviceTransport>
    }

    fn record_events(c: &AutoConnector) -> (Arc<Mutex<Vec<DeviceEvent>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = c
            .events()
            .subscribe(move |ev: &DeviceEvent| sink.lock().push(ev.clone()));
        (seen, sub)
    }

    #[test]
    fn test_first_connectable_serial_wins() {
        let bad = FakeTransport::new("bad", false);
        let good = FakeTransport::new("good", true);
        let spare = FakeTransport::new("spare", true);

        let mut source = MockCandidateSource::new();
        let (b, g, s) = (Arc::clone(&bad), Arc::clone(&good), Arc::clone(&spare));
        source
            .expect_serial_candidates()
            .returning(move || vec![as_dyn(&b), as_dyn(&g), as_dyn(&s)]);
        source.expect_hwmon_candidate().never();

        let c = AutoConnector::new(Box::new(source));
        let (seen, _sub) = record_events(&c);
        assert!(c.ensure_device());

        assert_eq!(c.device().unwrap().info().name, "good");
        assert_eq!(bad.connects.load(Ordering::SeqCst), 1);
        assert_eq!(spare.connects.load(Ordering::SeqCst), 0);
        assert_eq!(*seen.lock(), vec![DeviceEvent::ConnectionChanged(true)]);

        // Already attached: no further probing
        assert!(c.ensure_device());
        assert_eq!(good.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hwmon_fallback() {
        let bad = FakeTransport::new("serial", false);
        let hw = FakeTransport::new("hwmon", true);

        let mut source = MockCandidateSource::new();
        let b = Arc::clone(&bad);
        source
            .expect_serial_candidates()
            .returning(move || vec![as_dyn(&b)]);
        let h = Arc::clone(&hw);
        source
            .expect_hwmon_candidate()
            .times(1)
            .returning(move || Some(as_dyn(&h)));

        let c = AutoConnector::new(Box::new(source));
        assert!(c.ensure_device());
        assert_eq!(c.device().unwrap().info().name, "hwmon");
    }

    #[test]
    fn test_nothing_to_attach() {
        let mut source = MockCandidateSource::new();
        source.expect_serial_candidates().returning(Vec::new);
        source.expect_hwmon_candidate().returning(|| None);

        let c = AutoConnector::new(Box::new(source));
        assert!(!c.ensure_device());
        assert!(c.device().is_none());
        assert!(!c.is_connected());
    }

    #[test]
    fn test_forwarding_and_reattach() {
        let dev = FakeTransport::new("dev", true);
        let mut source = MockCandidateSource::new();
        let d = Arc::clone(&dev);
        source
            .expect_serial_candidates()
            .returning(move || vec![as_dyn(&d)]);
        source.expect_hwmon_candidate().returning(|| None);

        let c = AutoConnector::new(Box::new(source));
        let (seen, _sub) = record_events(&c);
        assert!(c.ensure_device());

        dev.publish();
        dev.unplug();
        assert!(c.device().is_none());
        {
            let events = seen.lock();
            assert_eq!(events.len(), 3);
            assert!(matches!(events[1], DeviceEvent::Data(ref d) if d.total_current() == 6.0));
            assert_eq!(events[2], DeviceEvent::ConnectionChanged(false));
        }

        // Events from a detached transport are no longer forwarded
        dev.publish();
        assert_eq!(seen.lock().len(), 3);

        assert!(c.ensure_device());
        assert_eq!(dev.connects.load(Ordering::SeqCst), 2);
        assert_eq!(
            seen.lock().last(),
            Some(&DeviceEvent::ConnectionChanged(true))
        );
    }

    #[test]
    fn test_poll_interval_propagates() {
        let dev = FakeTransport::new("dev", true);
        let mut source = MockCandidateSource::new();
        let d = Arc::clone(&dev);
        source
            .expect_serial_candidates()
            .returning(move || vec![as_dyn(&d)]);
        source.expect_hwmon_candidate().returning(|| None);

        let c = AutoConnector::new(Box::new(source));
        c.set_poll_interval(Duration::from_millis(250));
        assert!(c.ensure_device());
        assert_eq!(dev.poll_interval(), Duration::from_millis(250));

        c.set_poll_interval(Duration::from_millis(10));
        assert_eq!(c.poll_interval(), Duration::from_millis(50));
        assert_eq!(dev.poll_interval(), Duration::from_millis(50));

        c.set_poll_interval(Duration::from_secs(30));
        assert_eq!(dev.poll_interval(), Duration::from_millis(5000));
    }

    #[test]
    fn test_background_loop_and_stop() {
        let dev = FakeTransport::new("dev", true);
        let mut source = MockCandidateSource::new();
        let d = Arc::clone(&dev);
        source
            .expect_serial_candidates()
            .returning(move || vec![as_dyn(&d)]);
        source.expect_hwmon_candidate().returning(|| None);

        let c = AutoConnector::new(Box::new(source));
        c.set_poll_interval(Duration::from_millis(50));
        let (seen, _sub) = record_events(&c);
        c.start().unwrap();

        wait_for(|| c.is_connected());
        dev.unplug();
        wait_for(|| dev.connects.load(Ordering::SeqCst) >= 2 && c.is_connected());

        c.stop();
        assert!(c.device().is_none());
        assert_eq!(dev.state(), ConnectionState::Disconnected);
        assert_eq!(
            seen.lock().last(),
            Some(&DeviceEvent::ConnectionChanged(false))
        );
    }
}
