//! Station connection lifecycle
//!
//! `StaLink` pairs the caller's intent ("stay connected") with the state the
//! driver events have driven the link to. The intent survives drops, which is
//! what turns a disconnect into a reconnect attempt.

use crate::config::{ConfigValidator, DeviceIdentity, StaConfig};
use crate::driver::{
    copy_padded, ensure_init_and_start, DriverEvent, Interface, IpInfo, NetStack, RadioDriver,
    StaRadioConfig,
};
use crate::error::{DriverError, WifiError, WifiResult};
use crate::mode::{ModeArbiter, Role};
use std::cell::Cell;
use std::fmt;
use std::net::Ipv4Addr;

/// Where the station link currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaConnState {
    #[default]
    Idle,
    Connecting,
    Associated,
    IpAcquired,
}

impl StaConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            StaConnState::Idle => "idle",
            StaConnState::Connecting => "connecting",
            StaConnState::Associated => "associated",
            StaConnState::IpAcquired => "got ip",
        }
    }
}

impl fmt::Display for StaConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivered to the registered status sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiStatus {
    Disconnected,
    Connected,
    IpAcquired,
}

/// Intent flag plus event-driven state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaLink {
    pub intent: bool,
    pub state: StaConnState,
}

/// What the core has to do after a link transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reaction {
    pub status: Option<WifiStatus>,
    pub reconnect: bool,
    pub abort_scan: bool,
}

impl StaLink {
    /// Apply a driver event to the link.
    pub fn on_event(&mut self, event: &DriverEvent) -> Reaction {
        let mut reaction = Reaction::default();
        match event {
            // The station only starts when a connect was asked for.
            DriverEvent::StaStart => self.state = StaConnState::Connecting,
            DriverEvent::StaStop => {
                self.state = StaConnState::Idle;
                reaction.abort_scan = true;
            }
            DriverEvent::StaDisconnected { .. } => {
                reaction.status = Some(WifiStatus::Disconnected);
                if self.intent {
                    self.state = StaConnState::Connecting;
                    reaction.reconnect = true;
                } else {
                    self.state = StaConnState::Idle;
                }
            }
            DriverEvent::StaConnected => {
                self.state = StaConnState::Associated;
                reaction.status = Some(WifiStatus::Connected);
            }
            DriverEvent::StaGotIp => {
                self.state = StaConnState::IpAcquired;
                reaction.status = Some(WifiStatus::IpAcquired);
            }
            _ => {}
        }
        reaction
    }
}

// =============================================================================
// Controller
// =============================================================================

/// STA setup/teardown against the driver, over the locked core state.
pub struct ConnectionController<'a> {
    pub(crate) link: &'a Cell<StaLink>,
    pub(crate) arbiter: ModeArbiter<'a>,
    pub(crate) radio: &'a dyn RadioDriver,
    pub(crate) net: &'a dyn NetStack,
    pub(crate) validator: &'a dyn ConfigValidator,
    pub(crate) device: &'a DeviceIdentity,
}

impl<'a> ConnectionController<'a> {
    fn update<R>(&self, f: impl FnOnce(&mut StaLink) -> R) -> R {
        let mut link = self.link.get();
        let out = f(&mut link);
        self.link.set(link);
        out
    }

    /// Apply `cfg`. A failure part-way leaves whatever mode change already
    /// happened in place; the arbiter makes a retry idempotent.
    pub fn setup(&self, cfg: &StaConfig) -> WifiResult<()> {
        if let Err(msg) = self.validator.validate_sta(cfg) {
            error!("wifi::sta: WiFi STA: {}", msg);
            return Err(WifiError::InvalidConfig(msg));
        }

        if !cfg.enable {
            self.update(|link| link.intent = false);
            return Ok(self.arbiter.release(Role::Sta)?);
        }

        self.arbiter.require(Role::Sta)?;

        let radio_cfg = StaRadioConfig {
            ssid: copy_padded(cfg.ssid.as_bytes()),
            password: copy_padded(cfg.pass.as_deref().unwrap_or("").as_bytes()),
        };

        if let Some((ip, netmask)) = cfg.static_ip() {
            if let Err(e) = self.net.dhcpc_stop(Interface::Sta) {
                debug!("wifi::sta: DHCP client stop: {}", e.code());
            }
            let info = IpInfo {
                ip,
                netmask,
                gw: cfg.gw.unwrap_or(Ipv4Addr::UNSPECIFIED),
            };
            if let Err(e) = self.net.set_ip_info(Interface::Sta, &info) {
                error!("wifi::sta: Failed to set WiFi STA IP config: {}", e.code());
                return Err(e.into());
            }
            info!(
                "wifi::sta: WiFi STA IP: {}/{} gw {}",
                ip,
                netmask,
                cfg.gw.map(|gw| gw.to_string()).unwrap_or_default()
            );
        } else if let Err(e) = self.net.dhcpc_start(Interface::Sta) {
            // Already running after an earlier setup.
            warn!("wifi::sta: DHCP client start: {}", e.code());
        }

        if let Err(e) = self.radio.set_sta_config(&radio_cfg) {
            error!("wifi::sta: Failed to set STA config: {}", e.code());
            return Err(e.into());
        }

        self.update(|link| link.intent = true);

        let host_name = cfg.dhcp_hostname.as_deref().unwrap_or(&self.device.id);
        match self.net.set_hostname(Interface::Sta, host_name) {
            Ok(()) | Err(DriverError::IfNotReady) => {}
            Err(e) => {
                error!("wifi::sta: WiFi STA: Failed to set host name: {}", e.code());
                return Err(e.into());
            }
        }

        if let Err(e) = ensure_init_and_start(self.radio, |r| r.connect()) {
            error!("wifi::sta: WiFi STA: Connect failed: {}", e.code());
            return Err(e.into());
        }

        self.update(|link| {
            if link.state == StaConnState::Idle {
                link.state = StaConnState::Connecting;
            }
        });
        info!("wifi::sta: WiFi STA: Connecting to {}", cfg.ssid);
        Ok(())
    }

    /// Drop the intent and ask the driver to disconnect. Best effort.
    pub fn disconnect(&self) {
        self.update(|link| link.intent = false);
        if let Err(e) = self.radio.disconnect() {
            debug!("wifi::sta: Disconnect: {}", e.code());
        }
    }

    /// Apply a driver event and re-issue the connect when the link dropped
    /// while it should be up.
    ///
    /// `on_status` receives the status change before any driver call is
    /// made, so an event the driver raises from inside the reconnect is
    /// reported after this one.
    pub fn handle_event<F>(&self, event: &DriverEvent, on_status: F) -> Reaction
    where
        F: FnOnce(WifiStatus),
    {
        let (reaction, intent) = self.update(|link| (link.on_event(event), link.intent));
        if let Some(status) = reaction.status {
            on_status(status);
        }

        if let DriverEvent::StaDisconnected { reason } = event {
            info!(
                "wifi::sta: WiFi STA: disconnected, reason {}{}",
                reason,
                if intent { "; reconnecting" } else { "" }
            );
        }
        if reaction.reconnect {
            if let Err(e) = self.radio.connect() {
                error!("wifi::sta: WiFi STA: Reconnect failed: {}", e.code());
            }
        }
        reaction
    }
}
