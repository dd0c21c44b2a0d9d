//! Access point setup
//!
//! Mode-only sibling of the station path: there is no event-driven state for
//! the AP beyond client join/leave logging.

use crate::config::{ApConfig, ConfigValidator, DeviceIdentity};
use crate::driver::{
    copy_padded, ApAuth, ApRadioConfig, DhcpLeaseRange, Interface, IpInfo, NetStack, RadioDriver,
    AP_BEACON_INTERVAL_MS, RADIO_PASS_LEN,
};
use crate::error::{WifiError, WifiResult};
use crate::mode::{ModeArbiter, Role};
use std::net::Ipv4Addr;

/// Replace `?` placeholders in `ssid` with hex digits of `mac`.
///
/// Only applies to an even count of at most 12 placeholders. Filled
/// right-to-left starting from the last nibble of the MAC, so
/// `"Dev_????"` on `..:AB:CD` becomes `"Dev_ABCD"`.
pub fn expand_mac_placeholders(ssid: &str, mac: &[u8; 6]) -> String {
    let count = ssid.chars().filter(|&c| c == '?').count();
    if count == 0 || count > 12 || count % 2 != 0 {
        return ssid.to_string();
    }
    let hex: String = mac.iter().map(|b| format!("{:02X}", b)).collect();
    let mut digits = hex.chars().rev();
    let mut out: Vec<char> = ssid.chars().collect();
    for c in out.iter_mut().rev() {
        if *c == '?' {
            if let Some(d) = digits.next() {
                *c = d;
            }
        }
    }
    out.into_iter().collect()
}

pub struct AccessPointController<'a> {
    pub(crate) arbiter: ModeArbiter<'a>,
    pub(crate) radio: &'a dyn RadioDriver,
    pub(crate) net: &'a dyn NetStack,
    pub(crate) validator: &'a dyn ConfigValidator,
    pub(crate) device: &'a DeviceIdentity,
}

impl<'a> AccessPointController<'a> {
    pub fn setup(&self, cfg: &ApConfig) -> WifiResult<()> {
        if let Err(msg) = self.validator.validate_ap(cfg) {
            error!("wifi::ap: WiFi AP: {}", msg);
            return Err(WifiError::InvalidConfig(msg));
        }

        if !cfg.enable {
            return Ok(self.arbiter.release(Role::Ap)?);
        }

        self.arbiter.require(Role::Ap)?;

        let ssid = expand_mac_placeholders(&cfg.ssid, &self.device.mac);
        let (password, auth) = match cfg.pass.as_deref() {
            Some(pass) => (copy_padded(pass.as_bytes()), ApAuth::Wpa2Psk),
            None => ([0u8; RADIO_PASS_LEN], ApAuth::Open),
        };
        let radio_cfg = ApRadioConfig {
            ssid: copy_padded(ssid.as_bytes()),
            password,
            auth,
            channel: cfg.channel,
            hidden: cfg.hidden,
            max_connections: cfg.max_connections,
            beacon_interval_ms: AP_BEACON_INTERVAL_MS,
        };

        if let Err(e) = self.radio.set_ap_config(&radio_cfg) {
            error!("wifi::ap: WiFi AP: Failed to set config: {}", e.code());
            return Err(e.into());
        }

        if let Err(e) = self.net.dhcps_stop(Interface::Ap) {
            debug!("wifi::ap: DHCP server stop: {}", e.code());
        }
        let info = IpInfo {
            ip: cfg.ip,
            netmask: cfg.netmask,
            gw: cfg.gw.unwrap_or(Ipv4Addr::UNSPECIFIED),
        };
        if let Err(e) = self.net.set_ip_info(Interface::Ap, &info) {
            error!("wifi::ap: WiFi AP: Failed to set IP config: {}", e.code());
            return Err(e.into());
        }
        let lease = DhcpLeaseRange {
            start: cfg.dhcp_start,
            end: cfg.dhcp_end,
        };
        if let Err(e) = self.net.dhcps_set_lease(Interface::Ap, &lease) {
            error!("wifi::ap: WiFi AP: Failed to set DHCP config: {}", e.code());
            return Err(e.into());
        }
        if let Err(e) = self.net.dhcps_start(Interface::Ap) {
            error!("wifi::ap: WiFi AP: Failed to start DHCP server: {}", e.code());
            return Err(e.into());
        }
        info!(
            "wifi::ap: WiFi AP IP: {}/{} gw {}, DHCP range {} - {}",
            cfg.ip,
            cfg.netmask,
            cfg.gw.map(|gw| gw.to_string()).unwrap_or_else(|| "(none)".to_string()),
            cfg.dhcp_start,
            cfg.dhcp_end
        );

        // The driver cannot tell whether the AP is already up, so always start.
        if let Err(e) = self.radio.start() {
            debug!("wifi::ap: WiFi start: {}", e.code());
        }

        info!("wifi::ap: WiFi AP: SSID {}, channel {}", ssid, cfg.channel);
        Ok(())
    }
}
