//! Radio mode arbitration
//!
//! STA and AP are independent roles that share one radio. `RadioMode` is the
//! combination currently programmed into the driver; `ModeArbiter` computes
//! the smallest change that adds or drops a role and commits it only once the
//! driver accepted it.

use crate::driver::{ensure_init_and_start, DriverResult, RadioDriver};
use crate::error::DriverError;
use std::cell::Cell;
use std::fmt;

/// Combined radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadioMode {
    #[default]
    Off,
    ApOnly,
    StaOnly,
    ApAndSta,
}

/// A role a caller can require from the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sta,
    Ap,
}

impl Role {
    fn other(self) -> Role {
        match self {
            Role::Sta => Role::Ap,
            Role::Ap => Role::Sta,
        }
    }

    fn solo_mode(self) -> RadioMode {
        match self {
            Role::Sta => RadioMode::StaOnly,
            Role::Ap => RadioMode::ApOnly,
        }
    }
}

impl RadioMode {
    /// Whether `role` is active in this mode.
    pub fn has(self, role: Role) -> bool {
        matches!(
            (self, role),
            (RadioMode::ApAndSta, _) | (RadioMode::StaOnly, Role::Sta) | (RadioMode::ApOnly, Role::Ap)
        )
    }

    /// Mode after adding `role`, or `None` when it is already active.
    pub fn plan_require(self, role: Role) -> Option<RadioMode> {
        if self.has(role) {
            return None;
        }
        if self.has(role.other()) {
            Some(RadioMode::ApAndSta)
        } else {
            Some(role.solo_mode())
        }
    }

    /// Mode after dropping `role`, or `None` when it was not active.
    ///
    /// Dropping one role of `ApAndSta` keeps the other one running; dropping
    /// the only active role turns the radio off.
    pub fn plan_release(self, role: Role) -> Option<RadioMode> {
        if !self.has(role) {
            return None;
        }
        if self.has(role.other()) {
            Some(role.other().solo_mode())
        } else {
            Some(RadioMode::Off)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RadioMode::Off => "disabled",
            RadioMode::ApOnly => "AP",
            RadioMode::StaOnly => "STA",
            RadioMode::ApAndSta => "AP+STA",
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues mode changes to the driver on behalf of the locked core state.
///
/// Borrows the mode cell rather than owning it, so a driver event delivered
/// synchronously from inside a mode change can still read the (unchanged)
/// mode without tripping over an outstanding borrow.
pub struct ModeArbiter<'a> {
    mode: &'a Cell<RadioMode>,
    radio: &'a dyn RadioDriver,
}

impl<'a> ModeArbiter<'a> {
    pub fn new(mode: &'a Cell<RadioMode>, radio: &'a dyn RadioDriver) -> Self {
        Self { mode, radio }
    }

    pub fn current(&self) -> RadioMode {
        self.mode.get()
    }

    /// Make sure `role` is part of the radio mode.
    pub fn require(&self, role: Role) -> DriverResult<()> {
        match self.current().plan_require(role) {
            Some(target) => self.set(target),
            None => Ok(()),
        }
    }

    /// Drop `role` from the radio mode; no-op when it is not active.
    pub fn release(&self, role: Role) -> DriverResult<()> {
        match self.current().plan_release(role) {
            Some(target) => self.set(target),
            None => Ok(()),
        }
    }

    /// Program `target` into the driver. The stored mode only changes when
    /// the driver call succeeds.
    pub fn set(&self, target: RadioMode) -> DriverResult<()> {
        info!("wifi::mode: WiFi mode: {}", target);

        if target == RadioMode::Off {
            match self.radio.stop() {
                // Nothing was ever started, nothing to stop.
                Ok(()) | Err(DriverError::NotInit) => {
                    self.mode.set(RadioMode::Off);
                    return Ok(());
                }
                Err(e) => {
                    error!("wifi::mode: Failed to stop WiFi: {}", e.code());
                    return Err(e);
                }
            }
        }

        if let Err(e) = ensure_init_and_start(self.radio, |r| r.set_mode(target)) {
            error!("wifi::mode: Failed to set WiFi mode {}: {}", target, e.code());
            return Err(e);
        }
        self.mode.set(target);
        Ok(())
    }
}
