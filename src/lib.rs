//! WiFi core: radio mode arbitration, the station connection lifecycle and
//! coalesced scanning over a pluggable radio driver.

#[macro_use]
mod logging;

pub mod access_point;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod marshal;
pub mod mode;
pub mod scan;
pub mod sim;
pub mod wifi;

pub use crate::wifi::{DriverEventSink, StatusCallback, WifiCore};

pub mod prelude {
    pub use crate::config::{ApConfig, DeviceIdentity, StaConfig, WifiConfig};
    pub use crate::connection::{StaConnState, WifiStatus};
    pub use crate::driver::{DriverEvent, NetStack, RadioDriver};
    pub use crate::error::{DriverError, WifiError, WifiResult};
    pub use crate::marshal::ControlLoop;
    pub use crate::mode::RadioMode;
    pub use crate::scan::{ApInfo, AuthMode, ScanResult};
    pub use crate::wifi::{DriverEventSink, WifiCore};
}
