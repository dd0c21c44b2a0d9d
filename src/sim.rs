//! In-memory radio and network stack
//!
//! Behaves like a freshly booted driver: calls fail with `NotInit` until
//! `init()` and station operations fail with `NotStarted` until `start()`.
//! Every call is recorded so tests can assert on exactly what the core asked
//! for, and one-shot failures can be injected per call kind.

use crate::driver::{
    ApRadioConfig, ApRecord, DhcpLeaseRange, DriverResult, Interface, IpInfo, NetStack,
    RadioDriver, ScanParams, StaRadioConfig,
};
use crate::error::DriverError;
use crate::mode::RadioMode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem::{self, Discriminant};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Network stack code for "DHCP client already running".
pub const ERR_DHCP_ALREADY_STARTED: i32 = 0x5004;

/// A recorded radio call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Init,
    SetMode(RadioMode),
    Start,
    Stop,
    Connect,
    Disconnect,
    SetStaConfig(StaRadioConfig),
    SetApConfig(ApRadioConfig),
    ScanStart(ScanParams),
    ScanApRecords(u16),
}

/// Runs after a radio call was recorded, outside the simulator's lock.
/// Lets a test play the part of a driver that raises events synchronously.
pub type RadioHook = Arc<dyn Fn(&RadioCall) + Send + Sync>;

#[derive(Default)]
struct RadioState {
    initialized: bool,
    started: bool,
    mode: RadioMode,
    calls: Vec<RadioCall>,
    failures: Vec<(Discriminant<RadioCall>, DriverError)>,
    scan_records: Vec<ApRecord>,
    associated: Option<ApRecord>,
    sta_config: Option<StaRadioConfig>,
    ap_config: Option<ApRadioConfig>,
}

#[derive(Default)]
pub struct SimRadio {
    state: Mutex<RadioState>,
    hook: Mutex<Option<RadioHook>>,
}

impl SimRadio {
    /// Initialised but not started.
    pub fn new() -> Self {
        let radio = Self::default();
        radio.state.lock().initialized = true;
        radio
    }

    /// Nothing brought up yet.
    pub fn uninitialized() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of `scan_start` calls seen so far.
    pub fn scan_starts(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RadioCall::ScanStart(_)))
            .count()
    }

    /// Make the next call of the same kind as `call` fail with `err`.
    pub fn fail_next(&self, call: RadioCall, err: DriverError) {
        self.state.lock().failures.push((mem::discriminant(&call), err));
    }

    pub fn set_scan_records(&self, records: Vec<ApRecord>) {
        self.state.lock().scan_records = records;
    }

    pub fn set_associated(&self, ap: Option<ApRecord>) {
        self.state.lock().associated = ap;
    }

    pub fn set_hook(&self, hook: RadioHook) {
        *self.hook.lock() = Some(hook);
    }

    pub fn mode(&self) -> RadioMode {
        self.state.lock().mode
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn sta_config(&self) -> Option<StaRadioConfig> {
        self.state.lock().sta_config.clone()
    }

    pub fn ap_config(&self) -> Option<ApRadioConfig> {
        self.state.lock().ap_config.clone()
    }

    fn call<T>(
        &self,
        call: RadioCall,
        apply: impl FnOnce(&mut RadioState) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let result = {
            let mut st = self.state.lock();
            st.calls.push(call.clone());
            let kind = mem::discriminant(&call);
            match st.failures.iter().position(|(k, _)| *k == kind) {
                Some(pos) => Err(st.failures.remove(pos).1),
                None => apply(&mut st),
            }
        };
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&call);
        }
        result
    }
}

fn need_init(st: &RadioState) -> DriverResult<()> {
    if st.initialized {
        Ok(())
    } else {
        Err(DriverError::NotInit)
    }
}

fn need_started(st: &RadioState) -> DriverResult<()> {
    need_init(st)?;
    if st.started {
        Ok(())
    } else {
        Err(DriverError::NotStarted)
    }
}

impl RadioDriver for SimRadio {
    fn init(&self) -> DriverResult<()> {
        self.call(RadioCall::Init, |st| {
            st.initialized = true;
            Ok(())
        })
    }

    fn set_mode(&self, mode: RadioMode) -> DriverResult<()> {
        self.call(RadioCall::SetMode(mode), |st| {
            need_init(st)?;
            st.mode = mode;
            Ok(())
        })
    }

    fn start(&self) -> DriverResult<()> {
        self.call(RadioCall::Start, |st| {
            need_init(st)?;
            st.started = true;
            Ok(())
        })
    }

    fn stop(&self) -> DriverResult<()> {
        self.call(RadioCall::Stop, |st| {
            need_init(st)?;
            st.started = false;
            Ok(())
        })
    }

    fn connect(&self) -> DriverResult<()> {
        self.call(RadioCall::Connect, |st| need_started(st))
    }

    fn disconnect(&self) -> DriverResult<()> {
        self.call(RadioCall::Disconnect, |st| {
            need_started(st)?;
            st.associated = None;
            Ok(())
        })
    }

    fn set_sta_config(&self, cfg: &StaRadioConfig) -> DriverResult<()> {
        self.call(RadioCall::SetStaConfig(cfg.clone()), |st| {
            need_init(st)?;
            st.sta_config = Some(cfg.clone());
            Ok(())
        })
    }

    fn set_ap_config(&self, cfg: &ApRadioConfig) -> DriverResult<()> {
        self.call(RadioCall::SetApConfig(cfg.clone()), |st| {
            need_init(st)?;
            st.ap_config = Some(cfg.clone());
            Ok(())
        })
    }

    fn scan_start(&self, params: &ScanParams) -> DriverResult<()> {
        self.call(RadioCall::ScanStart(params.clone()), |st| need_started(st))
    }

    fn scan_ap_records(&self, max: u16) -> DriverResult<Vec<ApRecord>> {
        self.call(RadioCall::ScanApRecords(max), |st| {
            need_init(st)?;
            Ok(st.scan_records.iter().take(max as usize).cloned().collect())
        })
    }

    fn sta_ap_info(&self) -> DriverResult<ApRecord> {
        let st = self.state.lock();
        need_started(&st)?;
        st.associated.clone().ok_or(DriverError::Code(0x300A))
    }
}

// =============================================================================
// Network stack
// =============================================================================

/// A recorded network stack call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCall {
    SetIpInfo(Interface, IpInfo),
    DhcpcStart(Interface),
    DhcpcStop(Interface),
    DhcpsStart(Interface),
    DhcpsStop(Interface),
    DhcpsSetLease(Interface, DhcpLeaseRange),
    SetHostname(Interface, String),
}

#[derive(Default)]
struct NetState {
    calls: Vec<NetCall>,
    failures: Vec<(Discriminant<NetCall>, DriverError)>,
    ip: HashMap<Interface, IpInfo>,
    dhcpc: HashMap<Interface, bool>,
    dhcps: HashMap<Interface, bool>,
    lease: Option<DhcpLeaseRange>,
    hostname: Option<String>,
    dns: Option<Ipv4Addr>,
}

#[derive(Default)]
pub struct SimNetStack {
    state: Mutex<NetState>,
}

impl SimNetStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NetCall> {
        self.state.lock().calls.clone()
    }

    pub fn fail_next(&self, call: NetCall, err: DriverError) {
        self.state.lock().failures.push((mem::discriminant(&call), err));
    }

    /// What a DHCP client would install once a lease arrives.
    pub fn assign(&self, iface: Interface, info: IpInfo, dns: Option<Ipv4Addr>) {
        let mut st = self.state.lock();
        st.ip.insert(iface, info);
        st.dns = dns;
    }

    pub fn ip_info(&self, iface: Interface) -> IpInfo {
        self.state.lock().ip.get(&iface).copied().unwrap_or_default()
    }

    pub fn lease(&self) -> Option<DhcpLeaseRange> {
        self.state.lock().lease
    }

    pub fn hostname(&self) -> Option<String> {
        self.state.lock().hostname.clone()
    }

    pub fn dhcps_running(&self, iface: Interface) -> bool {
        self.state.lock().dhcps.get(&iface).copied().unwrap_or(false)
    }

    fn call(
        &self,
        call: NetCall,
        apply: impl FnOnce(&mut NetState) -> DriverResult<()>,
    ) -> DriverResult<()> {
        let mut st = self.state.lock();
        st.calls.push(call.clone());
        let kind = mem::discriminant(&call);
        match st.failures.iter().position(|(k, _)| *k == kind) {
            Some(pos) => Err(st.failures.remove(pos).1),
            None => apply(&mut st),
        }
    }
}

impl NetStack for SimNetStack {
    fn get_ip_info(&self, iface: Interface) -> DriverResult<IpInfo> {
        Ok(self.ip_info(iface))
    }

    fn set_ip_info(&self, iface: Interface, info: &IpInfo) -> DriverResult<()> {
        self.call(NetCall::SetIpInfo(iface, *info), |st| {
            st.ip.insert(iface, *info);
            Ok(())
        })
    }

    fn dhcpc_start(&self, iface: Interface) -> DriverResult<()> {
        self.call(NetCall::DhcpcStart(iface), |st| {
            if st.dhcpc.insert(iface, true) == Some(true) {
                return Err(DriverError::Code(ERR_DHCP_ALREADY_STARTED));
            }
            Ok(())
        })
    }

    fn dhcpc_stop(&self, iface: Interface) -> DriverResult<()> {
        self.call(NetCall::DhcpcStop(iface), |st| {
            st.dhcpc.insert(iface, false);
            Ok(())
        })
    }

    fn dhcps_start(&self, iface: Interface) -> DriverResult<()> {
        self.call(NetCall::DhcpsStart(iface), |st| {
            st.dhcps.insert(iface, true);
            Ok(())
        })
    }

    fn dhcps_stop(&self, iface: Interface) -> DriverResult<()> {
        self.call(NetCall::DhcpsStop(iface), |st| {
            st.dhcps.insert(iface, false);
            Ok(())
        })
    }

    fn dhcps_set_lease(&self, iface: Interface, range: &DhcpLeaseRange) -> DriverResult<()> {
        self.call(NetCall::DhcpsSetLease(iface, *range), |st| {
            st.lease = Some(*range);
            Ok(())
        })
    }

    fn set_hostname(&self, iface: Interface, name: &str) -> DriverResult<()> {
        self.call(NetCall::SetHostname(iface, name.to_string()), |st| {
            st.hostname = Some(name.to_string());
            Ok(())
        })
    }

    fn dns_server(&self) -> Option<Ipv4Addr> {
        self.state.lock().dns
    }
}
