//! WiFi core façade
//!
//! One aggregate owns the radio mode, the station link and the scan queue.
//! All of it lives behind a single recursive lock: a driver that raises an
//! event synchronously from inside a call we made (mode change, connect) can
//! re-enter `on_driver_event` on the same thread without deadlocking.
//!
//! State inside the lock sits in `Cell`/`RefCell`s that are only borrowed for
//! the duration of a single update, never across a driver call, so re-entry
//! always sees consistent state.
//!
//! Caller code (scan callbacks, status notifications) never runs under the
//! lock or on the driver's thread; it is posted to the `EventMarshal` and runs
//! when the owner of the `ControlLoop` drains it.

use crate::access_point::AccessPointController;
use crate::config::{ApConfig, ConfigValidator, DefaultValidator, DeviceIdentity, StaConfig, WifiConfig};
use crate::connection::{ConnectionController, StaConnState, StaLink, WifiStatus};
use crate::driver::{
    ensure_init_and_start, until_nul, DriverEvent, DriverResult, Interface, IpInfo, NetStack,
    RadioDriver, ScanParams,
};
use crate::error::WifiResult;
use crate::logging::fmt_mac;
use crate::marshal::{ControlLoop, EventMarshal};
use crate::mode::{ModeArbiter, RadioMode, Role};
use crate::scan::{self, ScanCoordinator, ScanRequest, ScanResult};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// How long one attempt to take the core lock waits before retrying.
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// Sink for connection status changes; runs on the control context.
pub type StatusCallback = Arc<dyn Fn(WifiStatus) + Send + Sync>;

#[derive(Default)]
struct CoreState {
    mode: Cell<RadioMode>,
    sta: Cell<StaLink>,
    scan: RefCell<ScanCoordinator>,
}

struct Inner {
    state: ReentrantMutex<CoreState>,
    radio: Arc<dyn RadioDriver>,
    net: Arc<dyn NetStack>,
    validator: Box<dyn ConfigValidator>,
    device: DeviceIdentity,
    marshal: EventMarshal,
    on_change: Arc<Mutex<Option<StatusCallback>>>,
}

/// Handle to the WiFi core. Clones share the same state.
#[derive(Clone)]
pub struct WifiCore {
    inner: Arc<Inner>,
}

/// Lets a driver deliver events from its own thread. The event is marshaled
/// onto the control context and handled there.
#[derive(Clone)]
pub struct DriverEventSink {
    core: Weak<Inner>,
    marshal: EventMarshal,
}

impl DriverEventSink {
    pub fn emit(&self, event: DriverEvent) {
        let core = self.core.clone();
        self.marshal.invoke(move || {
            if let Some(inner) = core.upgrade() {
                WifiCore { inner }.on_driver_event(event);
            }
        });
    }
}

impl WifiCore {
    /// Build a core over the given driver and network stack with the
    /// default config validator. The returned `ControlLoop` must be drained
    /// for callbacks to run.
    pub fn new(
        radio: Arc<dyn RadioDriver>,
        net: Arc<dyn NetStack>,
        device: DeviceIdentity,
    ) -> (WifiCore, ControlLoop) {
        Self::with_validator(radio, net, device, Box::new(DefaultValidator))
    }

    pub fn with_validator(
        radio: Arc<dyn RadioDriver>,
        net: Arc<dyn NetStack>,
        device: DeviceIdentity,
        validator: Box<dyn ConfigValidator>,
    ) -> (WifiCore, ControlLoop) {
        let (marshal, control) = EventMarshal::channel();
        let inner = Inner {
            state: ReentrantMutex::new(CoreState::default()),
            radio,
            net,
            validator,
            device,
            marshal,
            on_change: Arc::new(Mutex::new(None)),
        };
        (
            WifiCore {
                inner: Arc::new(inner),
            },
            control,
        )
    }

    /// Register the status change sink, replacing any previous one.
    pub fn on_status_change<F>(&self, f: F)
    where
        F: Fn(WifiStatus) + Send + Sync + 'static,
    {
        *self.inner.on_change.lock() = Some(Arc::new(f));
    }

    pub fn event_sink(&self) -> DriverEventSink {
        DriverEventSink {
            core: Arc::downgrade(&self.inner),
            marshal: self.inner.marshal.clone(),
        }
    }

    fn lock(&self) -> ReentrantMutexGuard<'_, CoreState> {
        loop {
            if let Some(guard) = self.inner.state.try_lock_for(LOCK_RETRY) {
                return guard;
            }
            debug!("wifi::core: Waiting for WiFi lock");
        }
    }

    fn arbiter<'a>(&'a self, st: &'a CoreState) -> ModeArbiter<'a> {
        ModeArbiter::new(&st.mode, &*self.inner.radio)
    }

    fn sta<'a>(&'a self, st: &'a CoreState) -> ConnectionController<'a> {
        ConnectionController {
            link: &st.sta,
            arbiter: self.arbiter(st),
            radio: &*self.inner.radio,
            net: &*self.inner.net,
            validator: &*self.inner.validator,
            device: &self.inner.device,
        }
    }

    fn ap<'a>(&'a self, st: &'a CoreState) -> AccessPointController<'a> {
        AccessPointController {
            arbiter: self.arbiter(st),
            radio: &*self.inner.radio,
            net: &*self.inner.net,
            validator: &*self.inner.validator,
            device: &self.inner.device,
        }
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    pub fn setup_sta(&self, cfg: &StaConfig) -> WifiResult<()> {
        let st = self.lock();
        self.sta(&st).setup(cfg)
    }

    pub fn setup_ap(&self, cfg: &ApConfig) -> WifiResult<()> {
        let st = self.lock();
        self.ap(&st).setup(cfg)
    }

    /// Apply both configs at once.
    ///
    /// AP and STA together only when the AP is marked `keep_enabled`;
    /// otherwise an enabled STA wins and the AP settings are not applied.
    pub fn set_config(&self, cfg: &WifiConfig) -> WifiResult<()> {
        let st = self.lock();
        let (ap, sta) = (&cfg.ap, &cfg.sta);
        if ap.enable && !sta.enable {
            self.ap(&st).setup(ap)
        } else if ap.enable && sta.enable && ap.keep_enabled {
            self.arbiter(&st).set(RadioMode::ApAndSta)?;
            self.ap(&st).setup(ap)?;
            self.sta(&st).setup(sta)
        } else if sta.enable {
            self.sta(&st).setup(sta)
        } else {
            Ok(self.arbiter(&st).set(RadioMode::Off)?)
        }
    }

    /// Stop trying to stay connected and drop the current association.
    /// Always succeeds.
    pub fn disconnect(&self) -> WifiResult<()> {
        let st = self.lock();
        self.sta(&st).disconnect();
        Ok(())
    }

    /// Request a scan. `callback` runs exactly once on the control context,
    /// with the records or with `ScanResult::Failed`. Concurrent requests
    /// share one radio scan.
    pub fn scan<F>(&self, callback: F)
    where
        F: FnOnce(&ScanResult) + Send + 'static,
    {
        let st = self.lock();
        let must_start = st.scan.borrow_mut().enqueue(ScanRequest::new(callback));
        if !must_start {
            debug!("wifi::core: Scan already in flight, queued");
            return;
        }
        if let Err(e) = self.start_radio_scan(&st) {
            error!("wifi::core: Failed to start WiFi scan: {}", e.code());
            let waiters = st.scan.borrow_mut().start_failed();
            scan::fan_out(&self.inner.marshal, waiters, None);
        }
    }

    fn start_radio_scan(&self, st: &CoreState) -> DriverResult<()> {
        let arbiter = self.arbiter(st);
        // Scanning needs the station interface up, whether or not anyone
        // asked to connect.
        if !arbiter.current().has(Role::Sta) {
            arbiter.require(Role::Sta)?;
            self.inner.radio.start()?;
        }
        let params = ScanParams::active_broadcast();
        ensure_init_and_start(&*self.inner.radio, |r| r.scan_start(&params))
    }

    /// Entry point for driver events. Safe to call from the driver's own
    /// thread; state is updated synchronously, callbacks are marshaled.
    ///
    /// Status changes are posted while the lock is held and before any
    /// driver call the event triggers, so they reach the sink in event order.
    pub fn on_driver_event(&self, event: DriverEvent) {
        let st = self.lock();
        match &event {
            DriverEvent::StaStart
            | DriverEvent::StaStop
            | DriverEvent::StaConnected
            | DriverEvent::StaDisconnected { .. }
            | DriverEvent::StaGotIp => {
                let reaction = self.sta(&st).handle_event(&event, |status| self.notify(status));
                if reaction.abort_scan {
                    let aborted = st.scan.borrow_mut().abort();
                    if let Some(waiters) = aborted {
                        warn!("wifi::core: STA stopped mid-scan, failing {} waiter(s)", waiters.len());
                        scan::fan_out(&self.inner.marshal, waiters, None);
                    }
                }
            }
            DriverEvent::ApStaConnected { mac, aid } => {
                info!("wifi::core: WiFi AP: station {} (aid {}) connected", fmt_mac(mac), aid);
            }
            DriverEvent::ApStaDisconnected { mac, aid } => {
                info!("wifi::core: WiFi AP: station {} (aid {}) disconnected", fmt_mac(mac), aid);
            }
            DriverEvent::ScanDone { status, number } => {
                info!("wifi::core: WiFi scan done: status {}, {} APs", status, number);
                let waiters = st.scan.borrow_mut().complete();
                let records = if *status == 0 {
                    match self.inner.radio.scan_ap_records(*number) {
                        Ok(records) => Some(records),
                        Err(e) => {
                            error!("wifi::core: Failed to fetch scan results: {}", e.code());
                            None
                        }
                    }
                } else {
                    None
                };
                scan::fan_out(&self.inner.marshal, waiters, records);
            }
            DriverEvent::Other(id) => info!("wifi::core: WiFi event: {}", id),
        }
    }

    fn notify(&self, status: WifiStatus) {
        let slot = self.inner.on_change.clone();
        self.inner.marshal.invoke(move || {
            let callback = slot.lock().clone();
            if let Some(callback) = callback {
                callback(status);
            }
        });
    }

    // =========================================================================
    // Status getters
    // =========================================================================

    pub fn mode(&self) -> RadioMode {
        self.lock().mode.get()
    }

    pub fn sta_state(&self) -> StaConnState {
        self.lock().sta.get().state
    }

    pub fn sta_intent(&self) -> bool {
        self.lock().sta.get().intent
    }

    pub fn scan_in_flight(&self) -> bool {
        self.lock().scan.borrow().in_flight()
    }

    /// `idle`, `connecting`, `associated` or `got ip`.
    pub fn get_status_string(&self) -> String {
        self.sta_state().as_str().to_string()
    }

    /// SSID of the AP the station is associated with.
    pub fn get_connected_ssid(&self) -> Option<String> {
        let ap = self.inner.radio.sta_ap_info().ok()?;
        Some(String::from_utf8_lossy(until_nul(&ap.ssid)).into_owned())
    }

    fn iface_addr(&self, iface: Interface, pick: fn(&IpInfo) -> Ipv4Addr) -> Option<Ipv4Addr> {
        let info = self.inner.net.get_ip_info(iface).ok()?;
        Some(pick(&info)).filter(|ip| !ip.is_unspecified())
    }

    pub fn get_ap_ip(&self) -> Option<Ipv4Addr> {
        self.iface_addr(Interface::Ap, |info| info.ip)
    }

    pub fn get_sta_ip(&self) -> Option<Ipv4Addr> {
        self.iface_addr(Interface::Sta, |info| info.ip)
    }

    pub fn get_sta_gateway(&self) -> Option<Ipv4Addr> {
        self.iface_addr(Interface::Sta, |info| info.gw)
    }

    pub fn get_sta_dns(&self) -> Option<Ipv4Addr> {
        self.inner.net.dns_server().filter(|ip| !ip.is_unspecified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ApRecord;
    use crate::error::DriverError;
    use crate::sim::{RadioCall, SimNetStack, SimRadio};

    struct Harness {
        core: WifiCore,
        control: ControlLoop,
        radio: Arc<SimRadio>,
        net: Arc<SimNetStack>,
    }

    fn harness() -> Harness {
        let radio = Arc::new(SimRadio::new());
        let net = Arc::new(SimNetStack::new());
        let (core, control) = WifiCore::new(radio.clone(), net.clone(), DeviceIdentity::default());
        Harness {
            core,
            control,
            radio,
            net,
        }
    }

    fn sta(ssid: &str) -> StaConfig {
        StaConfig {
            enable: true,
            ssid: ssid.into(),
            pass: Some("secret".into()),
            ..Default::default()
        }
    }

    fn collect_counts(core: &WifiCore, n: usize) -> Arc<Mutex<Vec<(usize, i32)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..n {
            let seen = seen.clone();
            core.scan(move |res: &ScanResult| seen.lock().push((i, res.count())));
        }
        seen
    }

    #[test]
    fn test_scan_from_off_brings_up_station() {
        let mut h = harness();
        let seen = collect_counts(&h.core, 1);
        assert_eq!(h.core.mode(), RadioMode::StaOnly);
        assert!(h.core.scan_in_flight());
        assert!(!h.core.sta_intent());
        assert_eq!(
            h.radio.calls(),
            vec![
                RadioCall::SetMode(RadioMode::StaOnly),
                RadioCall::Start,
                RadioCall::ScanStart(ScanParams::active_broadcast()),
            ]
        );

        h.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 0 });
        assert!(seen.lock().is_empty());
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, 0)]);
    }

    #[test]
    fn test_concurrent_scans_coalesce() {
        let mut h = harness();
        h.radio.set_scan_records(vec![ApRecord {
            ssid: b"home".to_vec(),
            bssid: [9; 6],
            authmode: 0,
            primary: 1,
            rssi: -60,
        }]);
        let seen = collect_counts(&h.core, 4);
        assert_eq!(h.radio.scan_starts(), 1);

        h.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 1 });
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, 1), (1, 1), (2, 1), (3, 1)]);
        assert!(!h.core.scan_in_flight());

        // A request after completion starts a new radio scan.
        collect_counts(&h.core, 1);
        assert_eq!(h.radio.scan_starts(), 2);
    }

    #[test]
    fn test_scan_start_failure_fails_request() {
        let mut h = harness();
        h.radio.fail_next(RadioCall::ScanStart(ScanParams::active_broadcast()), DriverError::Code(0x3007));
        let seen = collect_counts(&h.core, 1);
        assert!(!h.core.scan_in_flight());
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, -1)]);
    }

    #[test]
    fn test_mode_failure_fails_scan() {
        let mut h = harness();
        h.radio.fail_next(RadioCall::SetMode(RadioMode::StaOnly), DriverError::Code(1));
        let seen = collect_counts(&h.core, 1);
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, -1)]);
        assert_eq!(h.core.mode(), RadioMode::Off);
        assert_eq!(h.radio.scan_starts(), 0);
    }

    #[test]
    fn test_driver_scan_failure_reports_sentinel() {
        let mut h = harness();
        let seen = collect_counts(&h.core, 2);
        h.core.on_driver_event(DriverEvent::ScanDone { status: 1, number: 0 });
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, -1), (1, -1)]);
        assert!(!h.radio.calls().iter().any(|c| matches!(c, RadioCall::ScanApRecords(_))));
    }

    #[test]
    fn test_sta_stop_aborts_in_flight_scan() {
        let mut h = harness();
        let seen = collect_counts(&h.core, 3);
        h.core.on_driver_event(DriverEvent::StaStop);
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, -1), (1, -1), (2, -1)]);

        // A late completion finds nobody waiting.
        h.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 0 });
        assert_eq!(h.control.run_pending(), 0);
    }

    #[test]
    fn test_status_changes_are_marshaled_in_order() {
        let mut h = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        h.core.on_status_change(move |status| sink.lock().push(status));

        h.core.setup_sta(&sta("net")).unwrap();
        h.core.on_driver_event(DriverEvent::StaConnected);
        h.core.on_driver_event(DriverEvent::StaGotIp);
        h.core.on_driver_event(DriverEvent::StaDisconnected { reason: 8 });
        assert!(seen.lock().is_empty());

        h.control.run_pending();
        assert_eq!(
            *seen.lock(),
            vec![WifiStatus::Connected, WifiStatus::IpAcquired, WifiStatus::Disconnected]
        );
        assert_eq!(h.core.sta_state(), StaConnState::Connecting);
    }

    #[test]
    fn test_event_raised_inside_mode_change_does_not_deadlock() {
        let h = harness();
        let core = h.core.clone();
        h.radio.set_hook(Arc::new(move |call: &RadioCall| {
            if let RadioCall::SetMode(_) = call {
                core.on_driver_event(DriverEvent::StaStart);
            }
        }));
        h.core.setup_sta(&sta("net")).unwrap();
        assert_eq!(h.core.sta_state(), StaConnState::Connecting);
        assert_eq!(h.core.mode(), RadioMode::StaOnly);
    }

    #[test]
    fn test_events_from_driver_thread_via_sink() {
        let mut h = harness();
        let sink = h.core.event_sink();
        std::thread::spawn(move || {
            sink.emit(DriverEvent::StaStart);
            sink.emit(DriverEvent::StaConnected);
        })
        .join()
        .unwrap();
        assert_eq!(h.core.sta_state(), StaConnState::Idle);
        h.control.run_pending();
        assert_eq!(h.core.sta_state(), StaConnState::Associated);
    }

    #[test]
    fn test_set_config_without_keep_enabled_prefers_sta() {
        let h = harness();
        let cfg = WifiConfig {
            sta: sta("net"),
            ap: ApConfig {
                enable: true,
                keep_enabled: false,
                ..Default::default()
            },
        };
        h.core.set_config(&cfg).unwrap();
        assert_eq!(h.core.mode(), RadioMode::StaOnly);
        assert!(h.radio.ap_config().is_none());
    }

    #[test]
    fn test_set_config_all_disabled_turns_radio_off() {
        let h = harness();
        h.core.setup_sta(&sta("net")).unwrap();
        h.core.set_config(&WifiConfig::default()).unwrap();
        assert_eq!(h.core.mode(), RadioMode::Off);
        assert!(!h.radio.is_started());
    }

    #[test]
    fn test_address_getters() {
        let h = harness();
        assert_eq!(h.core.get_sta_ip(), None);
        assert_eq!(h.core.get_sta_dns(), None);

        h.net.assign(
            Interface::Sta,
            IpInfo {
                ip: Ipv4Addr::new(192, 168, 1, 20),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
                gw: Ipv4Addr::new(192, 168, 1, 1),
            },
            Some(Ipv4Addr::new(1, 1, 1, 1)),
        );
        assert_eq!(h.core.get_sta_ip().map(|ip| ip.to_string()).as_deref(), Some("192.168.1.20"));
        assert_eq!(h.core.get_sta_gateway(), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(h.core.get_sta_dns(), Some(Ipv4Addr::new(1, 1, 1, 1)));
        assert_eq!(h.core.get_ap_ip(), None);
    }

    #[test]
    fn test_connected_ssid() {
        let h = harness();
        assert_eq!(h.core.get_connected_ssid(), None);
        h.core.setup_sta(&sta("net")).unwrap();
        h.radio.set_associated(Some(ApRecord {
            ssid: b"net\0\0\0".to_vec(),
            bssid: [1; 6],
            authmode: 3,
            primary: 6,
            rssi: -50,
        }));
        assert_eq!(h.core.get_connected_ssid().as_deref(), Some("net"));
    }

    #[test]
    fn test_status_order_survives_event_raised_inside_reconnect() {
        let mut h = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        h.core.on_status_change(move |status| sink.lock().push(status));
        h.core.setup_sta(&sta("net")).unwrap();
        h.core.on_driver_event(DriverEvent::StaConnected);

        // The driver associates again synchronously, from inside the reconnect.
        let core = h.core.clone();
        h.radio.set_hook(Arc::new(move |call: &RadioCall| {
            if let RadioCall::Connect = call {
                core.on_driver_event(DriverEvent::StaConnected);
            }
        }));
        h.core.on_driver_event(DriverEvent::StaDisconnected { reason: 8 });
        h.control.run_pending();

        assert_eq!(
            *seen.lock(),
            vec![WifiStatus::Connected, WifiStatus::Disconnected, WifiStatus::Connected]
        );
        assert_eq!(h.core.sta_state(), StaConnState::Associated);
    }

    #[test]
    fn test_failed_record_fetch_fails_every_waiter() {
        let mut h = harness();
        let seen = collect_counts(&h.core, 3);
        h.radio.fail_next(RadioCall::ScanApRecords(0), DriverError::Code(0x3006));

        h.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 4 });
        assert!(!h.core.scan_in_flight());
        h.control.run_pending();
        assert_eq!(*seen.lock(), vec![(0, -1), (1, -1), (2, -1)]);
        assert!(h.radio.calls().contains(&RadioCall::ScanApRecords(4)));
    }
}
