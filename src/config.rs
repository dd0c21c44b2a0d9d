//! STA/AP settings and their validation

use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

/// Station (client) settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StaConfig {
    pub enable: bool,
    pub ssid: String,
    #[serde(default)]
    pub pass: Option<String>,
    /// Static address; used only together with `netmask`.
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub netmask: Option<Ipv4Addr>,
    #[serde(default)]
    pub gw: Option<Ipv4Addr>,
    /// Falls back to the device id when unset.
    #[serde(default)]
    pub dhcp_hostname: Option<String>,
}

impl StaConfig {
    /// Static addressing applies only when both address and netmask are set.
    pub fn static_ip(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        match (self.ip, self.netmask) {
            (Some(ip), Some(netmask)) => Some((ip, netmask)),
            _ => None,
        }
    }
}

/// Access point settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApConfig {
    pub enable: bool,
    /// Keep the AP up while the station is enabled too.
    pub keep_enabled: bool,
    /// May contain `?` placeholders that are filled from the device MAC.
    pub ssid: String,
    pub pass: Option<String>,
    pub hidden: bool,
    pub channel: u8,
    pub max_connections: u8,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gw: Option<Ipv4Addr>,
    pub dhcp_start: Ipv4Addr,
    pub dhcp_end: Ipv4Addr,
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            enable: false,
            keep_enabled: true,
            ssid: "WiFi_??????".to_string(),
            pass: None,
            hidden: false,
            channel: 6,
            max_connections: 10,
            ip: Ipv4Addr::new(192, 168, 4, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gw: None,
            dhcp_start: Ipv4Addr::new(192, 168, 4, 2),
            dhcp_end: Ipv4Addr::new(192, 168, 4, 100),
        }
    }
}

/// Combined settings consumed by `WifiCore::set_config`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WifiConfig {
    pub sta: StaConfig,
    pub ap: ApConfig,
}

impl WifiConfig {
    /// Read settings from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<WifiConfig, Error> {
        let config = std::fs::read_to_string(path)?;
        let config: WifiConfig = ron::from_str(&config)?;
        Ok(config)
    }
}

/// Per-device values the core needs but does not own.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    /// Default DHCP host name.
    pub id: String,
    pub mac: [u8; 6],
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            id: "wifi-core".to_string(),
            mac: [0; 6],
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks caller-supplied settings before any driver call is made.
///
/// Rejections carry a human readable message that ends up in
/// `WifiError::InvalidConfig`.
pub trait ConfigValidator: Send + Sync {
    fn validate_sta(&self, cfg: &StaConfig) -> Result<(), String>;
    fn validate_ap(&self, cfg: &ApConfig) -> Result<(), String>;
}

pub const MAX_SSID_LEN: usize = 32;
/// STA password buffer size.
pub const MAX_STA_PASS_LEN: usize = 64;
/// WPA2-PSK passphrase bounds for the AP.
pub const MIN_AP_PASS_LEN: usize = 8;
pub const MAX_AP_PASS_LEN: usize = 63;

/// Length checks only; disabled configs always pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

fn check_ssid(ssid: &str) -> Result<(), String> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(format!("SSID must be between 1 and {} bytes", MAX_SSID_LEN));
    }
    Ok(())
}

fn check_pass(pass: Option<&str>, min: usize, max: usize) -> Result<(), String> {
    match pass {
        Some(p) if p.len() < min || p.len() > max => Err(format!(
            "password must be between {} and {} bytes",
            min, max
        )),
        _ => Ok(()),
    }
}

impl ConfigValidator for DefaultValidator {
    fn validate_sta(&self, cfg: &StaConfig) -> Result<(), String> {
        if !cfg.enable {
            return Ok(());
        }
        check_ssid(&cfg.ssid)?;
        check_pass(cfg.pass.as_deref(), 0, MAX_STA_PASS_LEN)?;
        if cfg.ip.is_some() && cfg.netmask.is_none() {
            return Err("static IP requires a netmask".to_string());
        }
        Ok(())
    }

    fn validate_ap(&self, cfg: &ApConfig) -> Result<(), String> {
        if !cfg.enable {
            return Ok(());
        }
        check_ssid(&cfg.ssid)?;
        check_pass(cfg.pass.as_deref(), MIN_AP_PASS_LEN, MAX_AP_PASS_LEN)?;
        if !(1..=14).contains(&cfg.channel) {
            return Err(format!("invalid channel {}", cfg.channel));
        }
        if u32::from(cfg.dhcp_start) > u32::from(cfg.dhcp_end) {
            return Err(format!(
                "DHCP range {} - {} is empty",
                cfg.dhcp_start, cfg.dhcp_end
            ));
        }
        Ok(())
    }
}
