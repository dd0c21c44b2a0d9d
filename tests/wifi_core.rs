use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

use wifi_core::driver::{ApRecord, ScanParams};
use wifi_core::prelude::*;
use wifi_core::sim::{RadioCall, SimNetStack, SimRadio};

struct Rig {
    core: WifiCore,
    control: ControlLoop,
    radio: Arc<SimRadio>,
    net: Arc<SimNetStack>,
}

fn rig() -> Rig {
    let radio = Arc::new(SimRadio::new());
    let net = Arc::new(SimNetStack::new());
    let device = DeviceIdentity {
        id: "lamp".into(),
        mac: [0x24, 0x0A, 0xC4, 0x12, 0xAB, 0xCD],
    };
    let (core, control) = WifiCore::new(radio.clone(), net.clone(), device);
    Rig {
        core,
        control,
        radio,
        net,
    }
}

fn net_sta() -> StaConfig {
    StaConfig {
        enable: true,
        ssid: "net".into(),
        pass: Some("secret".into()),
        ..Default::default()
    }
}

fn record(ssid: &str, rssi: i8) -> ApRecord {
    ApRecord {
        ssid: ssid.as_bytes().to_vec(),
        bssid: [0xAA, 0, 0, 0, 0, rssi as u8],
        authmode: 3,
        primary: 1,
        rssi,
    }
}

#[test]
fn test_sta_connects_through_event_sequence() {
    let mut rig = rig();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    rig.core.on_status_change(move |s| sink.lock().push(s));

    assert_eq!(rig.core.mode(), RadioMode::Off);
    rig.core.setup_sta(&net_sta()).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::StaOnly);
    assert!(rig.core.sta_intent());
    assert_eq!(rig.core.sta_state(), StaConnState::Connecting);
    assert_eq!(rig.core.get_status_string(), "connecting");
    assert_eq!(rig.net.hostname().as_deref(), Some("lamp"));

    rig.core.on_driver_event(DriverEvent::StaConnected);
    assert_eq!(rig.core.sta_state(), StaConnState::Associated);
    rig.core.on_driver_event(DriverEvent::StaGotIp);
    assert_eq!(rig.core.sta_state(), StaConnState::IpAcquired);
    assert_eq!(rig.core.get_status_string(), "got ip");

    rig.control.run_pending();
    assert_eq!(*statuses.lock(), vec![WifiStatus::Connected, WifiStatus::IpAcquired]);
}

#[test]
fn test_disconnect_with_intent_reconnects_once() {
    let rig = rig();
    rig.core.setup_sta(&net_sta()).unwrap();
    rig.core.on_driver_event(DriverEvent::StaConnected);
    rig.radio.clear_calls();

    rig.core.on_driver_event(DriverEvent::StaDisconnected { reason: 201 });
    assert_eq!(rig.core.sta_state(), StaConnState::Connecting);
    assert_eq!(rig.radio.calls(), vec![RadioCall::Connect]);
}

#[test]
fn test_disconnect_without_intent_goes_idle() {
    let mut rig = rig();
    rig.core.setup_sta(&net_sta()).unwrap();
    rig.core.on_driver_event(DriverEvent::StaConnected);

    rig.core.disconnect().unwrap();
    assert!(!rig.core.sta_intent());
    rig.radio.clear_calls();

    rig.core.on_driver_event(DriverEvent::StaDisconnected { reason: 8 });
    assert_eq!(rig.core.sta_state(), StaConnState::Idle);
    assert!(rig.radio.calls().is_empty());
    rig.control.run_pending();
}

#[test]
fn test_setup_sta_twice_keeps_connecting() {
    let rig = rig();
    rig.core.setup_sta(&net_sta()).unwrap();
    rig.core.on_driver_event(DriverEvent::StaConnected);
    rig.core.setup_sta(&net_sta()).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::StaOnly);
    assert!(rig.core.sta_intent());
    assert_eq!(rig.core.sta_state(), StaConnState::Associated);
}

#[test]
fn test_invalid_sta_config_touches_nothing() {
    let rig = rig();
    let cfg = StaConfig {
        ssid: String::new(),
        ..net_sta()
    };
    let err = rig.core.setup_sta(&cfg).unwrap_err();
    assert!(matches!(err, WifiError::InvalidConfig(_)));
    assert!(rig.radio.calls().is_empty());
    assert_eq!(rig.core.mode(), RadioMode::Off);
}

#[test]
fn test_ap_then_sta_runs_both() {
    let rig = rig();
    let ap = ApConfig {
        enable: true,
        ssid: "Lamp_????".into(),
        ..Default::default()
    };
    rig.core.setup_ap(&ap).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::ApOnly);
    rig.core.setup_sta(&net_sta()).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::ApAndSta);
    assert_eq!(rig.radio.mode(), RadioMode::ApAndSta);
    assert!(rig.radio.ap_config().is_some());
    assert!(rig.radio.sta_config().is_some());
    assert_eq!(rig.core.get_ap_ip().map(|ip| ip.to_string()).as_deref(), Some("192.168.4.1"));
}

#[test]
fn test_set_config_keep_enabled_runs_both() {
    let rig = rig();
    let cfg = WifiConfig {
        sta: net_sta(),
        ap: ApConfig {
            enable: true,
            ..Default::default()
        },
    };
    rig.core.set_config(&cfg).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::ApAndSta);
    assert!(rig.core.sta_intent());
}

#[test]
fn test_disabling_sta_leaves_ap() {
    let rig = rig();
    let ap = ApConfig {
        enable: true,
        ..Default::default()
    };
    rig.core.setup_ap(&ap).unwrap();
    rig.core.setup_sta(&net_sta()).unwrap();
    rig.core.setup_sta(&StaConfig::default()).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::ApOnly);
    assert!(!rig.core.sta_intent());

    // Nothing left to release.
    rig.core.setup_sta(&StaConfig::default()).unwrap();
    assert_eq!(rig.core.mode(), RadioMode::ApOnly);
}

#[test]
fn test_coalesced_scan_delivers_same_result_in_order() {
    let mut rig = rig();
    rig.radio.set_scan_records(vec![record("alpha", -40), record("beta", -70)]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
        let seen = seen.clone();
        rig.core.scan(move |res: &ScanResult| {
            let names: Vec<String> = res.records().iter().map(|ap| ap.ssid_lossy()).collect();
            seen.lock().push((i, names));
        });
    }
    assert_eq!(rig.radio.scan_starts(), 1);
    assert!(rig.radio.calls().contains(&RadioCall::ScanStart(ScanParams::active_broadcast())));

    rig.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 2 });
    rig.control.run_pending();

    let seen = seen.lock();
    assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    for (_, names) in seen.iter() {
        assert_eq!(names, &vec!["alpha".to_string(), "beta".to_string()]);
    }
}

#[test]
fn test_scans_from_many_threads_share_one_radio_scan() {
    let mut rig = rig();
    rig.radio.set_scan_records(vec![record("alpha", -40), record("beta", -70)]);

    const THREADS: usize = 8;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let core = rig.core.clone();
            let seen = seen.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                core.scan(move |res: &ScanResult| seen.lock().push((i, res.clone())));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(rig.radio.scan_starts(), 1);
    assert!(rig.core.scan_in_flight());

    rig.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 2 });
    rig.control.run_pending();

    let seen = seen.lock();
    assert_eq!(seen.len(), THREADS);
    let mut callers: Vec<usize> = seen.iter().map(|(i, _)| *i).collect();
    callers.sort_unstable();
    assert_eq!(callers, (0..THREADS).collect::<Vec<_>>());
    assert!(seen.iter().all(|(_, res)| res.count() == 2 && *res == seen[0].1));
}

#[test]
fn test_sta_stop_mid_scan_answers_everyone() {
    let mut rig = rig();
    let counts = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let counts = counts.clone();
        rig.core.scan(move |res: &ScanResult| counts.lock().push(res.count()));
    }
    rig.core.on_driver_event(DriverEvent::StaStop);
    assert!(!rig.core.scan_in_flight());
    rig.control.run_pending();
    assert_eq!(*counts.lock(), vec![-1, -1, -1]);
}

#[test]
fn test_scan_does_not_set_intent() {
    let mut rig = rig();
    rig.core.scan(|_| {});
    assert_eq!(rig.core.mode(), RadioMode::StaOnly);
    assert!(!rig.core.sta_intent());
    rig.core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 0 });
    rig.control.run_pending();
}

#[test]
fn test_scan_with_uninitialized_driver() {
    let radio = Arc::new(SimRadio::uninitialized());
    let net = Arc::new(SimNetStack::new());
    let (core, mut control) = WifiCore::new(radio.clone(), net, DeviceIdentity::default());

    let counts = Arc::new(Mutex::new(Vec::new()));
    let sink = counts.clone();
    core.scan(move |res: &ScanResult| sink.lock().push(res.count()));
    assert_eq!(radio.scan_starts(), 1);
    assert_eq!(radio.calls().first(), Some(&RadioCall::SetMode(RadioMode::StaOnly)));
    assert!(radio.calls().contains(&RadioCall::Init));

    core.on_driver_event(DriverEvent::ScanDone { status: 0, number: 0 });
    control.run_pending();
    assert_eq!(*counts.lock(), vec![0]);
}

#[tokio::test]
async fn test_control_loop_task_delivers_callbacks() {
    let rig = rig();
    rig.radio.set_scan_records(vec![record("alpha", -40)]);
    let control = tokio::spawn(rig.control.run());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let status_tx = tx.clone();
    rig.core.on_status_change(move |s| {
        status_tx.send(format!("{:?}", s)).ok();
    });

    rig.core.setup_sta(&net_sta()).unwrap();
    let scan_tx = tx.clone();
    rig.core.scan(move |res: &ScanResult| {
        scan_tx.send(format!("scan {}", res.count())).ok();
    });

    let sink = rig.core.event_sink();
    std::thread::spawn(move || {
        sink.emit(DriverEvent::StaConnected);
        sink.emit(DriverEvent::ScanDone { status: 0, number: 1 });
        sink.emit(DriverEvent::StaGotIp);
    })
    .join()
    .unwrap();

    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(rx.recv().await.unwrap());
    }
    assert_eq!(got, vec!["Connected", "scan 1", "IpAcquired"]);

    drop(tx);
    drop(rig.core);
    control.await.unwrap();
}
