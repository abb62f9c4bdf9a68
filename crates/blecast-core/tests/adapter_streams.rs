//! End-to-end stream behavior of the adapter, driven by `MockCentral`.
//!
//! Run with:
//! ```
//! cargo test --package blecast-core --test adapter_streams
//! ```

use std::sync::Arc;
use std::time::Duration;

use blecast_core::{
    Adapter, AdapterConfig, Central, EventKind, MockCentral, PlatformScan, ScanRequest,
};
use blecast_types::uuid::{BATTERY_SERVICE, HEART_RATE_SERVICE};
use blecast_types::{AdapterStatus, AdvertisementData, PlatformState};
use futures::StreamExt;
use tokio::time::timeout;

const STREAM_TIMEOUT: Duration = Duration::from_secs(1);

fn setup() -> (Arc<MockCentral>, Adapter<MockCentral>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let central = Arc::new(MockCentral::new());
    let adapter = Adapter::new(Arc::clone(&central));
    (central, adapter)
}

// =============================================================================
// Scan lifecycle
// =============================================================================

#[test]
fn test_many_subscribers_share_one_platform_scan() {
    let (central, adapter) = setup();

    let subscribers: Vec<_> = (0..5).map(|_| adapter.scan()).collect();
    assert_eq!(central.start_scan_count(), 1);
    assert!(adapter.is_scanning());

    let mut subscribers = subscribers.into_iter();
    for subscriber in subscribers.by_ref().take(4) {
        drop(subscriber);
        assert_eq!(central.stop_scan_count(), 0);
    }

    drop(subscribers);
    assert_eq!(central.start_scan_count(), 1);
    assert_eq!(central.stop_scan_count(), 1);
    assert!(!adapter.is_scanning());
}

#[test]
fn test_resubscribe_starts_new_session() {
    let (central, adapter) = setup();

    drop(adapter.scan());
    let _again = adapter.scan();

    assert_eq!(central.start_scan_count(), 2);
    assert_eq!(central.stop_scan_count(), 1);
}

#[test]
fn test_scanning_status_once_per_transition() {
    let (_central, adapter) = setup();
    let mut status = adapter.scanning_status_changes();

    let a = adapter.scan();
    let b = adapter.scan();
    let c = adapter.scan();
    drop(a);
    drop(b);
    drop(c);

    assert_eq!(status.drain(), vec![true, false]);
}

#[test]
fn test_scanning_status_has_no_replay() {
    let (_central, adapter) = setup();
    let _scan = adapter.scan();

    let mut late = adapter.scanning_status_changes();
    assert!(late.try_recv().is_none());
}

#[test]
fn test_scan_results_reach_every_subscriber_in_order() {
    let (central, adapter) = setup();
    let mut a = adapter.scan();
    let mut b = adapter.scan();

    central.discover("H1", Some(-60), AdvertisementData::new());
    central.discover("H1", Some(-55), AdvertisementData::new());

    for subscriber in [&mut a, &mut b] {
        let results = subscriber.drain();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rssi(), -60);
        assert_eq!(results[1].rssi(), -55);
        assert!(Arc::ptr_eq(results[0].device(), results[1].device()));
    }
}

#[test]
fn test_missing_rssi_reported_as_zero() {
    let (central, adapter) = setup();
    let mut scan = adapter.scan();

    central.discover("H1", None, AdvertisementData::new());
    assert_eq!(scan.try_recv().unwrap().rssi(), 0);
}

#[test]
fn test_new_session_yields_new_device_instance() {
    let (central, adapter) = setup();

    let mut first = adapter.scan();
    central.discover("H1", Some(-60), AdvertisementData::new());
    let before = first.try_recv().unwrap();
    drop(first);

    let mut second = adapter.scan();
    central.discover("H1", Some(-60), AdvertisementData::new());
    let after = second.try_recv().unwrap();

    assert!(!Arc::ptr_eq(before.device(), after.device()));
    assert_ne!(before.device().id(), after.device().id());
}

#[test]
fn test_no_events_after_last_subscriber_leaves() {
    let (central, adapter) = setup();

    drop(adapter.scan());
    assert_eq!(central.notifications().handler_count_for(EventKind::Discovered), 0);
    assert_eq!(central.discover("H1", Some(-40), AdvertisementData::new()), 0);
    assert!(adapter.registry().is_empty());
}

#[test]
fn test_device_name_reads_through() {
    let (central, adapter) = setup();
    let mut scan = adapter.scan();

    central.discover("H1", Some(-70), AdvertisementData::new());
    let result = scan.try_recv().unwrap();
    assert_eq!(result.device().name(), None);

    central.set_name("H1", "Kitchen");
    assert_eq!(result.device().name().as_deref(), Some("Kitchen"));
}

// =============================================================================
// Background scans
// =============================================================================

#[test]
fn test_background_scan_filters_by_service() {
    let (central, adapter) = setup();
    let mut heart = adapter.background_scan(HEART_RATE_SERVICE);
    let mut battery = adapter.background_scan(BATTERY_SERVICE);

    central.discover("HR", Some(-50), AdvertisementData::new().with_service(HEART_RATE_SERVICE));
    central.discover(
        "BAT",
        Some(-51),
        AdvertisementData::new().with_service_data(BATTERY_SERVICE, vec![90]),
    );
    central.discover("OTHER", Some(-52), AdvertisementData::new());

    let heart = heart.drain();
    let battery = battery.drain();
    assert_eq!(heart.len(), 1);
    assert_eq!(heart[0].device().peripheral(), "HR");
    assert_eq!(battery.len(), 1);
    assert_eq!(battery[0].device().peripheral(), "BAT");
}

#[test]
fn test_background_and_foreground_arbitration() {
    let (central, adapter) = setup();

    let heart = adapter.background_scan(HEART_RATE_SERVICE);
    assert_eq!(
        central.last_scan_request(),
        Some(ScanRequest {
            filter: Some(HEART_RATE_SERVICE),
            allow_duplicates: false,
        })
    );

    let scan = adapter.scan();
    assert_eq!(
        central.last_scan_request(),
        Some(ScanRequest {
            filter: None,
            allow_duplicates: true,
        })
    );

    // A second background filter does not disturb the foreground scan
    let battery = adapter.background_scan(BATTERY_SERVICE);
    assert_eq!(central.start_scan_count(), 2);

    // Two filters left: the platform scans unfiltered
    drop(scan);
    assert_eq!(
        central.last_scan_request(),
        Some(ScanRequest {
            filter: None,
            allow_duplicates: false,
        })
    );
    assert_eq!(central.start_scan_count(), 3);

    drop(heart);
    assert_eq!(
        central.last_scan_request(),
        Some(ScanRequest {
            filter: Some(BATTERY_SERVICE),
            allow_duplicates: false,
        })
    );
    assert_eq!(central.start_scan_count(), 4);

    drop(battery);
    assert_eq!(adapter.platform_scan(), PlatformScan::Idle);
    assert_eq!(central.stop_scan_count(), 1);
}

#[test]
fn test_second_background_filter_still_receives_results() {
    let (central, adapter) = setup();
    let mut heart = adapter.background_scan(HEART_RATE_SERVICE);
    let mut battery = adapter.background_scan(BATTERY_SERVICE);

    central.discover("BAT", Some(-60), AdvertisementData::new().with_service(BATTERY_SERVICE));

    let results = battery.drain();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].device().peripheral(), "BAT");
    assert!(heart.drain().is_empty());

    // Once alone, the battery stream gets its own platform filter
    drop(heart);
    assert_eq!(
        adapter.platform_scan(),
        PlatformScan::Filtered {
            service: BATTERY_SERVICE,
            allow_duplicates: false,
        }
    );
    central.discover("BAT", Some(-58), AdvertisementData::new().with_service(BATTERY_SERVICE));
    assert_eq!(battery.drain().len(), 1);
}

#[test]
fn test_background_sessions_report_scanning_status() {
    let (_central, adapter) = setup();
    let mut status = adapter.scanning_status_changes();

    let heart = adapter.background_scan(HEART_RATE_SERVICE);
    let scan = adapter.scan();
    drop(heart);
    drop(scan);

    assert_eq!(status.drain(), vec![true, true, false, false]);
}

#[test]
fn test_background_duplicates_configurable() {
    let central = Arc::new(MockCentral::new());
    let adapter = Adapter::with_config(
        Arc::clone(&central),
        AdapterConfig::default().background_allow_duplicates(true),
    );

    let _heart = adapter.background_scan(HEART_RATE_SERVICE);
    assert!(central.last_scan_request().unwrap().allow_duplicates);
}

// =============================================================================
// Adapter status
// =============================================================================

#[test]
fn test_status_replay_for_each_subscriber() {
    let central = Arc::new(MockCentral::new().with_state(PlatformState::PoweredOff));
    let adapter = Adapter::new(Arc::clone(&central));

    let mut first = adapter.status_changes();
    central.set_state(PlatformState::PoweredOn);
    let mut second = adapter.status_changes();

    assert_eq!(
        first.drain(),
        vec![AdapterStatus::PoweredOff, AdapterStatus::PoweredOn]
    );
    assert_eq!(second.drain(), vec![AdapterStatus::PoweredOn]);
}

#[test]
fn test_subscribers_before_transition_each_get_replay_then_change() {
    let central = Arc::new(MockCentral::new().with_state(PlatformState::PoweredOff));
    let adapter = Adapter::new(Arc::clone(&central));

    let mut first = adapter.status_changes();
    let mut second = adapter.status_changes();
    central.set_state(PlatformState::PoweredOn);

    let expected = vec![AdapterStatus::PoweredOff, AdapterStatus::PoweredOn];
    assert_eq!(first.drain(), expected);
    assert_eq!(second.drain(), expected);
}

#[test]
fn test_status_every_notification_is_emitted() {
    let (central, adapter) = setup();
    let mut changes = adapter.status_changes();

    central.notify_state_changed();
    assert_eq!(
        changes.drain(),
        vec![AdapterStatus::PoweredOn, AdapterStatus::PoweredOn]
    );
}

#[test]
fn test_unmapped_platform_state_is_unknown() {
    let central = Arc::new(MockCentral::new().with_state(PlatformState::from_raw(-1)));
    let adapter = Adapter::new(central);
    assert_eq!(adapter.status(), AdapterStatus::Unknown);
}

// =============================================================================
// Connection events
// =============================================================================

#[test]
fn test_connection_events_resolve_scanned_device() {
    let (central, adapter) = setup();
    let mut scan = adapter.scan();
    let mut devices = adapter.device_status_changes();

    central.discover("H1", Some(-60), AdvertisementData::new());
    let scanned = scan.try_recv().unwrap();

    central.connect("H1");
    central.disconnect("H1", Some("connection reset by peer"));

    let events = devices.drain();
    assert_eq!(events.len(), 2);
    for device in &events {
        assert!(Arc::ptr_eq(scanned.device(), device));
    }
    assert!(!events[1].is_connected());
}

#[test]
fn test_dropping_streams_releases_all_handlers() {
    let (central, adapter) = setup();

    let scan = adapter.scan();
    let background = adapter.background_scan(HEART_RATE_SERVICE);
    let status = adapter.status_changes();
    let devices = adapter.device_status_changes();
    assert_eq!(central.notifications().handler_count(), 5);

    drop(scan);
    drop(background);
    drop(status);
    drop(devices);
    assert_eq!(central.notifications().handler_count(), 0);
}

// =============================================================================
// Async consumption
// =============================================================================

#[tokio::test]
async fn test_scan_stream_from_another_task() {
    let (central, adapter) = setup();
    let mut scan = adapter.scan();

    let producer = {
        let central = Arc::clone(&central);
        tokio::spawn(async move {
            for rssi in [-70, -65, -60] {
                central.discover("H1", Some(rssi), AdvertisementData::new());
                tokio::task::yield_now().await;
            }
        })
    };

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let result = timeout(STREAM_TIMEOUT, scan.next())
            .await
            .expect("scan result should arrive")
            .expect("stream should stay open");
        seen.push(result.rssi());
    }
    producer.await.unwrap();

    assert_eq!(seen, vec![-70, -65, -60]);
}

#[tokio::test]
async fn test_status_changes_async_recv() {
    let central = Arc::new(MockCentral::new().with_state(PlatformState::Resetting));
    let adapter = Adapter::new(Arc::clone(&central));
    let mut changes = adapter.status_changes();

    assert_eq!(changes.recv().await, Some(AdapterStatus::Resetting));

    central.set_state(PlatformState::PoweredOn);
    let next = timeout(STREAM_TIMEOUT, changes.recv()).await.unwrap();
    assert_eq!(next, Some(AdapterStatus::PoweredOn));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_and_drop() {
    let (central, adapter) = setup();
    let adapter = Arc::new(adapter);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move {
                for _ in 0..10 {
                    let scan = adapter.scan();
                    tokio::task::yield_now().await;
                    drop(scan);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(central.start_scan_count(), central.stop_scan_count());
    assert!(!adapter.is_scanning());
    assert_eq!(central.notifications().handler_count(), 0);
}
