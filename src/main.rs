use anyhow::{bail, Error};
use log::{info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use wifi_core::driver::{ApRecord, Interface, IpInfo};
use wifi_core::prelude::*;
use wifi_core::sim::{SimNetStack, SimRadio};

/// Drives the core against the in-memory radio: optional config file, a
/// station connect, a few concurrent scans and a disconnect.
#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading config from {}", path);
            WifiConfig::load(&path)?
        }
        None => WifiConfig {
            sta: StaConfig {
                enable: true,
                ssid: "HomeNet".into(),
                pass: Some("secret".into()),
                ..Default::default()
            },
            ap: ApConfig {
                enable: true,
                ssid: "Lamp_????".into(),
                ..Default::default()
            },
        },
    };

    let radio = Arc::new(SimRadio::new());
    let net = Arc::new(SimNetStack::new());
    radio.set_scan_records(vec![
        ApRecord {
            ssid: b"HomeNet".to_vec(),
            bssid: [0x24, 0x0A, 0xC4, 0x01, 0x02, 0x03],
            authmode: 3,
            primary: 6,
            rssi: -48,
        },
        ApRecord {
            ssid: b"Cafe".to_vec(),
            bssid: [0x24, 0x0A, 0xC4, 0x04, 0x05, 0x06],
            authmode: 0,
            primary: 11,
            rssi: -71,
        },
    ]);

    let device = DeviceIdentity {
        id: "lamp".into(),
        mac: [0x24, 0x0A, 0xC4, 0x12, 0xAB, 0xCD],
    };
    let (core, control) = WifiCore::new(radio.clone(), net.clone(), device);
    let control = tokio::spawn(control.run());

    core.on_status_change(|status| info!("Status changed: {:?}", status));
    core.set_config(&config)?;
    info!("Mode: {}, status: {}", core.mode(), core.get_status_string());

    // Play the driver's part from its own thread.
    let sink = core.event_sink();
    let driver = {
        let radio = radio.clone();
        let net = net.clone();
        std::thread::spawn(move || {
            sink.emit(DriverEvent::StaStart);
            radio.set_associated(Some(ApRecord {
                ssid: b"HomeNet".to_vec(),
                bssid: [0x24, 0x0A, 0xC4, 0x01, 0x02, 0x03],
                authmode: 3,
                primary: 6,
                rssi: -48,
            }));
            sink.emit(DriverEvent::StaConnected);
            net.assign(
                Interface::Sta,
                IpInfo {
                    ip: Ipv4Addr::new(192, 168, 1, 42),
                    netmask: Ipv4Addr::new(255, 255, 255, 0),
                    gw: Ipv4Addr::new(192, 168, 1, 1),
                },
                Some(Ipv4Addr::new(192, 168, 1, 1)),
            );
            sink.emit(DriverEvent::StaGotIp);
        })
    };
    if driver.join().is_err() {
        bail!("driver thread panicked");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    info!(
        "Connected to {:?}, ip {:?}, gw {:?}, dns {:?}, ap ip {:?}",
        core.get_connected_ssid(),
        core.get_sta_ip(),
        core.get_sta_gateway(),
        core.get_sta_dns(),
        core.get_ap_ip()
    );

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    for i in 0..3 {
        let tx = tx.clone();
        core.scan(move |result: &ScanResult| {
            let names: Vec<String> = result.records().iter().map(|ap| ap.ssid_lossy()).collect();
            tx.send((i, result.count(), names)).ok();
        });
    }
    drop(tx);
    core.event_sink().emit(DriverEvent::ScanDone { status: 0, number: 16 });

    while let Some((i, count, names)) = rx.recv().await {
        if count < 0 {
            warn!("Scan {} failed", i);
        } else {
            info!("Scan {}: {} APs {:?}", i, count, names);
        }
    }

    core.disconnect()?;
    core.event_sink().emit(DriverEvent::StaDisconnected { reason: 8 });
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("Final status: {}", core.get_status_string());

    drop(core);
    control.await?;
    Ok(())
}
