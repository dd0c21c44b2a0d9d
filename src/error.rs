//! Error types for the WiFi core
//!
//! `DriverError` is the small code space the radio driver and network stack
//! report; `WifiError` is what the public operations hand back to callers.

use thiserror::Error;

/// Driver code: WiFi subsystem was never initialised.
pub const ERR_WIFI_NOT_INIT: i32 = 0x3001;
/// Driver code: WiFi subsystem initialised but not started.
pub const ERR_WIFI_NOT_STARTED: i32 = 0x3002;
/// Network stack code: interface exists but is not up yet.
pub const ERR_IF_NOT_READY: i32 = 0x5002;

/// Failure reported by a radio driver or network stack call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("WiFi not initialized")]
    NotInit,
    #[error("WiFi not started")]
    NotStarted,
    #[error("interface not ready")]
    IfNotReady,
    #[error("driver error {0}")]
    Code(i32),
}

impl DriverError {
    /// Numeric driver code, as logged.
    pub fn code(&self) -> i32 {
        match self {
            DriverError::NotInit => ERR_WIFI_NOT_INIT,
            DriverError::NotStarted => ERR_WIFI_NOT_STARTED,
            DriverError::IfNotReady => ERR_IF_NOT_READY,
            DriverError::Code(code) => *code,
        }
    }

    /// Map a raw driver code back onto the known variants.
    pub fn from_code(code: i32) -> Self {
        match code {
            ERR_WIFI_NOT_INIT => DriverError::NotInit,
            ERR_WIFI_NOT_STARTED => DriverError::NotStarted,
            ERR_IF_NOT_READY => DriverError::IfNotReady,
            other => DriverError::Code(other),
        }
    }
}

/// Error returned by the public WiFi operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WifiError {
    /// Caller-supplied settings were rejected by the validator.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A radio or network stack call failed.
    #[error("driver call failed (code {code}): {source}")]
    Driver {
        code: i32,
        #[source]
        source: DriverError,
    },
    /// The interface or radio has not been brought up yet.
    #[error("interface not ready (code {code})")]
    NotReady { code: i32 },
    /// The radio could not complete a scan.
    #[error("scan failed")]
    ScanFailed,
}

impl From<DriverError> for WifiError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotInit | DriverError::IfNotReady => WifiError::NotReady { code: err.code() },
            _ => WifiError::Driver {
                code: err.code(),
                source: err,
            },
        }
    }
}

pub type WifiResult<T> = Result<T, WifiError>;
