//! Scan coalescing and result fan-out
//!
//! Any number of callers may ask for a scan at the same time; the radio only
//! ever runs one. Requests that arrive while a scan is in flight join the
//! pending queue and all of them receive the single result, in the order they
//! asked. Every queued request is answered exactly once, with the records or
//! with `ScanResult::Failed`.

use crate::driver::{ApRecord, until_nul};
use crate::error::{WifiError, WifiResult};
use crate::marshal::EventMarshal;
use std::mem;

/// SSID buffer in a scan result, including the terminating NUL.
pub const SSID_BUF_LEN: usize = 33;

/// Security of a discovered network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Unknown(u8),
}

impl AuthMode {
    /// Re-tag the driver's auth mode code.
    pub fn from_driver(code: u8) -> Self {
        match code {
            0 => AuthMode::Open,
            1 => AuthMode::Wep,
            2 => AuthMode::WpaPsk,
            3 => AuthMode::Wpa2Psk,
            4 => AuthMode::WpaWpa2Psk,
            5 => AuthMode::Wpa2Enterprise,
            other => AuthMode::Unknown(other),
        }
    }
}

/// One access point as seen by scan callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApInfo {
    /// NUL-terminated, NUL-padded.
    pub ssid: [u8; SSID_BUF_LEN],
    pub bssid: [u8; 6],
    pub auth_mode: AuthMode,
    pub channel: u8,
    pub rssi: i8,
}

impl ApInfo {
    pub fn from_record(ap: &ApRecord) -> Self {
        let src = until_nul(&ap.ssid);
        let mut ssid = [0u8; SSID_BUF_LEN];
        let len = src.len().min(SSID_BUF_LEN);
        ssid[..len].copy_from_slice(&src[..len]);
        // Always terminated, even when the name filled the buffer.
        ssid[SSID_BUF_LEN - 1] = 0;
        Self {
            ssid,
            bssid: ap.bssid,
            auth_mode: AuthMode::from_driver(ap.authmode),
            channel: ap.primary,
            rssi: ap.rssi,
        }
    }

    /// SSID bytes without the NUL padding.
    pub fn ssid_bytes(&self) -> &[u8] {
        until_nul(&self.ssid)
    }

    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(self.ssid_bytes()).into_owned()
    }
}

/// Outcome of one radio scan, shared by every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// The scan ran; may be empty.
    Found(Vec<ApInfo>),
    /// The scan could not be performed or completed.
    Failed,
}

impl ScanResult {
    pub fn from_records(records: &[ApRecord]) -> Self {
        ScanResult::Found(records.iter().map(ApInfo::from_record).collect())
    }

    /// Number of records, or -1 for a failed scan.
    pub fn count(&self) -> i32 {
        match self {
            ScanResult::Found(aps) => aps.len() as i32,
            ScanResult::Failed => -1,
        }
    }

    pub fn records(&self) -> &[ApInfo] {
        match self {
            ScanResult::Found(aps) => aps,
            ScanResult::Failed => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScanResult::Failed)
    }

    pub fn into_result(self) -> WifiResult<Vec<ApInfo>> {
        match self {
            ScanResult::Found(aps) => Ok(aps),
            ScanResult::Failed => Err(WifiError::ScanFailed),
        }
    }
}

pub type ScanCallback = Box<dyn FnOnce(&ScanResult) + Send + 'static>;

/// A caller waiting for a scan result.
pub struct ScanRequest {
    callback: ScanCallback,
}

impl ScanRequest {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(&ScanResult) + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    fn complete(self, result: &ScanResult) {
        (self.callback)(result)
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// In-flight flag plus the FIFO of waiting requests.
#[derive(Default)]
pub struct ScanCoordinator {
    in_flight: bool,
    pending: Vec<ScanRequest>,
}

impl ScanCoordinator {
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue `req`. Returns `true` when no scan was running and the caller
    /// has to start one; the coordinator is marked in flight from here on.
    pub fn enqueue(&mut self, req: ScanRequest) -> bool {
        self.pending.push(req);
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// The radio scan could not be started: clear the flag and hand back
    /// everyone queued so they can be failed.
    pub fn start_failed(&mut self) -> Vec<ScanRequest> {
        self.in_flight = false;
        mem::take(&mut self.pending)
    }

    /// The radio reported completion. Detaches the whole queue; requests
    /// arriving after this start a fresh scan.
    pub fn complete(&mut self) -> Vec<ScanRequest> {
        self.in_flight = false;
        mem::take(&mut self.pending)
    }

    /// Radio torn down mid-scan. `None` when nothing was in flight.
    pub fn abort(&mut self) -> Option<Vec<ScanRequest>> {
        if !self.in_flight {
            return None;
        }
        self.in_flight = false;
        Some(mem::take(&mut self.pending))
    }
}

/// Deliver one result to every detached request on the control context.
///
/// `records == None` means the scan failed. Translation to `ScanResult`
/// happens on the control context too, once for all waiters.
pub fn fan_out(marshal: &EventMarshal, waiters: Vec<ScanRequest>, records: Option<Vec<ApRecord>>) {
    if waiters.is_empty() {
        return;
    }
    marshal.invoke(move || {
        let result = match records {
            Some(records) => ScanResult::from_records(&records),
            None => ScanResult::Failed,
        };
        debug!(
            "wifi::scan: Delivering {} APs to {} waiter(s)",
            result.count(),
            waiters.len()
        );
        for waiter in waiters {
            waiter.complete(&result);
        }
    });
}
