//! Capability interfaces for the radio driver and the network stack
//!
//! The core never talks to hardware directly. Everything it needs from the
//! radio (mode, start/stop, connect, scan) and from the IP stack (addresses,
//! DHCP client/server, host name) goes through the two traits below, which
//! lets the same state machine run against real bindings or the in-memory
//! simulation in `sim`.

use crate::error::DriverError;
use crate::mode::RadioMode;
use std::net::Ipv4Addr;

pub type DriverResult<T> = Result<T, DriverError>;

// =============================================================================
// Driver data types
// =============================================================================

/// Size of the SSID field in driver configs.
pub const RADIO_SSID_LEN: usize = 32;
/// Size of the password field in driver configs.
pub const RADIO_PASS_LEN: usize = 64;
/// Beacon interval programmed for the AP, in milliseconds.
pub const AP_BEACON_INTERVAL_MS: u16 = 100;

/// Copy `src` into a zero-padded fixed buffer, truncating if needed.
pub fn copy_padded<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = src.len().min(N);
    buf[..len].copy_from_slice(&src[..len]);
    buf
}

/// Bytes of a NUL-padded buffer up to the first NUL.
pub fn until_nul(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

/// Network interface selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Sta,
    Ap,
}

/// Raw access point record as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApRecord {
    pub ssid: Vec<u8>,
    pub bssid: [u8; 6],
    /// Driver auth mode code.
    pub authmode: u8,
    pub primary: u8,
    pub rssi: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Active,
    Passive,
}

/// Parameters handed to `RadioDriver::scan_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanParams {
    /// `None` scans for every SSID.
    pub ssid: Option<Vec<u8>>,
    pub bssid: Option<[u8; 6]>,
    /// 0 means all channels.
    pub channel: u8,
    pub show_hidden: bool,
    pub scan_type: ScanType,
    /// Per-channel dwell time window in ms.
    pub active_min_ms: u32,
    pub active_max_ms: u32,
}

impl ScanParams {
    /// Broadcast active scan over every channel, hidden networks excluded.
    pub fn active_broadcast() -> Self {
        Self {
            ssid: None,
            bssid: None,
            channel: 0,
            show_hidden: false,
            scan_type: ScanType::Active,
            active_min_ms: 10,
            active_max_ms: 50,
        }
    }
}

/// Station settings as programmed into the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaRadioConfig {
    pub ssid: [u8; RADIO_SSID_LEN],
    pub password: [u8; RADIO_PASS_LEN],
}

/// Authentication the AP advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApAuth {
    Open,
    Wpa2Psk,
}

/// Access point settings as programmed into the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApRadioConfig {
    pub ssid: [u8; RADIO_SSID_LEN],
    pub password: [u8; RADIO_PASS_LEN],
    pub auth: ApAuth,
    pub channel: u8,
    pub hidden: bool,
    pub max_connections: u8,
    pub beacon_interval_ms: u16,
}

/// Address configuration of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gw: Ipv4Addr,
}

impl Default for IpInfo {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
            gw: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Address range the AP's DHCP server hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpLeaseRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

// =============================================================================
// Driver events
// =============================================================================

/// Events raised by the radio driver, possibly from its own task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    StaStart,
    StaStop,
    StaConnected,
    StaDisconnected { reason: u8 },
    StaGotIp,
    ApStaConnected { mac: [u8; 6], aid: u8 },
    ApStaDisconnected { mac: [u8; 6], aid: u8 },
    /// `status == 0` means the scan succeeded and `number` records are ready.
    ScanDone { status: u32, number: u16 },
    Other(u32),
}

// =============================================================================
// Capability traits
// =============================================================================

/// Radio primitives. Every call may fail with a small code space; the
/// `NotInit`/`NotStarted` pair is recoverable through `ensure_init_and_start`.
pub trait RadioDriver: Send + Sync {
    /// Bring the driver up with volatile (RAM-only) settings storage.
    fn init(&self) -> DriverResult<()>;
    fn set_mode(&self, mode: RadioMode) -> DriverResult<()>;
    fn start(&self) -> DriverResult<()>;
    fn stop(&self) -> DriverResult<()>;
    fn connect(&self) -> DriverResult<()>;
    fn disconnect(&self) -> DriverResult<()>;
    fn set_sta_config(&self, cfg: &StaRadioConfig) -> DriverResult<()>;
    fn set_ap_config(&self, cfg: &ApRadioConfig) -> DriverResult<()>;
    /// Non-blocking; completion arrives as `DriverEvent::ScanDone`.
    fn scan_start(&self, params: &ScanParams) -> DriverResult<()>;
    /// Fetch up to `max` records of the last completed scan.
    fn scan_ap_records(&self, max: u16) -> DriverResult<Vec<ApRecord>>;
    /// Record of the AP the station is associated with.
    fn sta_ap_info(&self) -> DriverResult<ApRecord>;
}

/// IP stack primitives per interface.
pub trait NetStack: Send + Sync {
    fn get_ip_info(&self, iface: Interface) -> DriverResult<IpInfo>;
    fn set_ip_info(&self, iface: Interface, info: &IpInfo) -> DriverResult<()>;
    fn dhcpc_start(&self, iface: Interface) -> DriverResult<()>;
    fn dhcpc_stop(&self, iface: Interface) -> DriverResult<()>;
    fn dhcps_start(&self, iface: Interface) -> DriverResult<()>;
    fn dhcps_stop(&self, iface: Interface) -> DriverResult<()>;
    fn dhcps_set_lease(&self, iface: Interface, range: &DhcpLeaseRange) -> DriverResult<()>;
    /// May fail with `IfNotReady` before the interface is up.
    fn set_hostname(&self, iface: Interface, name: &str) -> DriverResult<()>;
    /// Primary DNS server, if any.
    fn dns_server(&self) -> Option<Ipv4Addr>;
}

/// Run `op`, lazily initialising or starting the driver once if it reports
/// that it is not ready, then retrying.
pub fn ensure_init_and_start<T, F>(radio: &dyn RadioDriver, op: F) -> DriverResult<T>
where
    F: Fn(&dyn RadioDriver) -> DriverResult<T>,
{
    let mut result = op(radio);
    if let Err(DriverError::NotInit) = result {
        if let Err(e) = radio.init() {
            error!("wifi::driver: Failed to init WiFi: {}", e.code());
            return Err(e);
        }
        result = op(radio);
    }
    if let Err(DriverError::NotStarted) = result {
        if let Err(e) = radio.start() {
            error!("wifi::driver: Failed to start WiFi: {}", e.code());
            return Err(e);
        }
        result = op(radio);
    }
    result
}
