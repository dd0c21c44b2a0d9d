//! Logging macros with automatic file:line injection
//!
//! Thin wrappers around the `log` crate so every line emitted by the WiFi core
//! can be traced back to its call site.
//!
//! Format: `[file:line] message`
//!
//! ```ignore
//! info!("wifi::mode: WiFi mode: {}", mode);
//! // Output: [src/mode.rs:136] wifi::mode: WiFi mode: STA
//! ```

/// Forward to `::log::$level!` with the call site prepended.
macro_rules! log_at {
    ($level:ident, $($arg:tt)*) => {
        ::log::$level!("[{}:{}] {}", file!(), line!(), format_args!($($arg)*))
    };
}

macro_rules! info {
    ($($arg:tt)*) => { log_at!(info, $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_at!(warn, $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { log_at!(error, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_at!(debug, $($arg)*) };
}

/// Station MAC as twelve upper-case hex digits, the way AP client lines
/// have always been logged.
pub(crate) fn fmt_mac(mac: &[u8; 6]) -> String {
    mac.iter().map(|b| format!("{:02X}", b)).collect()
}
