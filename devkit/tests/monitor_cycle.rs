use ontwatch_devkit::record_builder::RxPath;
use ontwatch_devkit::{RawRecordBuilder, StubDataSource, TestHarness};
use ontwatch_kernel::models::RawRecord;
use ontwatch_kernel::monitor::{CycleOutcome, CycleReport, MonitorSettings};
use serde_json::Value;
use std::time::Duration as StdDuration;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const T0: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

fn at(minutes: i64) -> OffsetDateTime {
    T0 + Duration::minutes(minutes)
}

fn ont(serial: &str, now: OffsetDateTime, inform_ago_min: i64, rx: Option<f64>) -> RawRecord {
    let builder = RawRecordBuilder::new(serial)
        .tags(&["ODP-07"])
        .inform_ago(now, Duration::minutes(inform_ago_min))
        .uptime(3600)
        .external_ip("10.20.0.9");
    match rx {
        Some(rx) => builder.rx_power(rx).build(),
        None => builder.build(),
    }
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn first_sighting_alerts_only_unhealthy_devices() {
    let harness = TestHarness::new(&["628111"]).await.unwrap();
    harness.next_batch(vec![
        ont("OUI-F609-SN1", at(0), 1, Some(-20.0)),
        ont("OUI-HG8245-SN2", at(0), 30, None),
        ont("OUI-ZXHN-SN3", at(0), 1, Some(-30.0)),
    ]);

    let report = completed(harness.cycle_at(at(0)).await);
    assert_eq!(report.devices, 3);
    assert_eq!(report.alerts, 2);
    assert!(report.persisted);

    assert_eq!(harness.titles_for("628111"), vec!["ONT OFFLINE (New)", "LOW RX POWER (New)"]);
    let states = harness.monitor.device_states();
    assert_eq!(states.len(), 3);
    assert!(states["F609"].is_online);
    assert!(!states["HG8245"].is_online);
    assert_eq!(states["ZXHN"].rx_power, Some(-30.0));
}

#[tokio::test]
async fn transitions_across_cycles() {
    let harness = TestHarness::new(&["628111"]).await.unwrap();

    harness.next_batch(vec![
        ont("OUI-F609-SN1", at(0), 1, Some(-20.0)),
        ont("OUI-HG8245-SN2", at(0), 30, None),
        ont("OUI-ZXHN-SN3", at(0), 1, Some(-26.0)),
    ]);
    completed(harness.cycle_at(at(0)).await);
    harness.notifier.clear();

    // rien ne change : aucune alerte
    harness.next_batch(vec![
        ont("OUI-F609-SN1", at(5), 1, Some(-20.0)),
        ont("OUI-HG8245-SN2", at(5), 35, None),
        ont("OUI-ZXHN-SN3", at(5), 1, Some(-26.0)),
    ]);
    assert_eq!(completed(harness.cycle_at(at(5)).await).alerts, 0);
    harness.assert_no_alerts().unwrap();

    harness.next_batch(vec![
        ont("OUI-F609-SN1", at(10), 20, Some(-20.0)),
        ont("OUI-HG8245-SN2", at(10), 0, Some(-22.0)),
        ont("OUI-ZXHN-SN3", at(10), 1, Some(-28.0)),
    ]);
    assert_eq!(completed(harness.cycle_at(at(10)).await).alerts, 3);
    assert_eq!(
        harness.titles_for("628111"),
        vec!["ONT WENT OFFLINE", "ONT BACK ONLINE", "CRITICAL RX POWER"]
    );
    harness.notifier.clear();

    // Rx toujours sous le seuil : pas de nouvelle alerte
    harness.next_batch(vec![ont("OUI-ZXHN-SN3", at(15), 1, Some(-29.0))]);
    assert_eq!(completed(harness.cycle_at(at(15)).await).alerts, 0);
}

#[tokio::test]
async fn back_online_message_mentions_previous_status() {
    let harness = TestHarness::new(&["628111"]).await.unwrap();
    harness.next_batch(vec![ont("OUI-F609-SN1", at(0), 60, None)]);
    harness.next_batch(vec![ont("OUI-F609-SN1", at(5), 0, Some(-19.5))]);
    completed(harness.cycle_at(at(0)).await);
    completed(harness.cycle_at(at(5)).await);

    let texts = harness.notifier.delivered_to("628111");
    assert_eq!(texts.len(), 2);
    let back = &texts[1];
    assert!(back.starts_with("*--- ONT BACK ONLINE ---*"));
    assert!(back.contains("🆔 *Device ID:* F609"));
    assert!(back.contains("📍 *Location/Tag:* ODP-07"));
    assert!(back.contains("_(was OFFLINE)_"));
    assert!(back.contains("-19.5 dBm"));
}

#[tokio::test]
async fn failing_recipient_does_not_block_others() {
    let harness = TestHarness::new(&["628111", "628222", "628333"]).await.unwrap();
    harness.notifier.fail_for("628222");
    harness.next_batch(vec![
        ont("OUI-HG8245-SN2", at(0), 30, None),
        ont("OUI-ZXHN-SN3", at(0), 1, Some(-31.0)),
    ]);

    let report = completed(harness.cycle_at(at(0)).await);
    assert_eq!(report.alerts, 2);
    assert_eq!(report.deliveries_ok, 4);
    assert_eq!(report.deliveries_failed, 2);
    assert_eq!(harness.notifier.attempts(), 6);

    harness.assert_alert_sent("628111", "LOW RX POWER (New)").unwrap();
    harness.assert_alert_sent("628333", "ONT OFFLINE (New)").unwrap();
    assert!(harness.titles_for("628222").is_empty());
    // l'état est mis à jour malgré les échecs
    assert_eq!(harness.monitor.device_states().len(), 2);
}

#[tokio::test]
async fn empty_fetch_leaves_everything_untouched() {
    let harness = TestHarness::new(&["628111"]).await.unwrap();
    harness.next_batch(vec![ont("OUI-F609-SN1", at(0), 1, Some(-20.0))]);
    completed(harness.cycle_at(at(0)).await);

    let bytes_before = harness.state_file_bytes().unwrap().expect("state file written");
    let states_before = harness.monitor.device_states();
    let latest_before = harness.monitor.latest_devices();

    // la file du stub est vide : lot vide
    assert_eq!(harness.cycle_at(at(5)).await, CycleOutcome::Empty);

    assert_eq!(harness.state_file_bytes().unwrap(), Some(bytes_before));
    assert_eq!(harness.monitor.device_states(), states_before);
    assert_eq!(*harness.monitor.latest_devices(), *latest_before);
    assert_eq!(harness.monitor.health_report().cycles_empty, 1);
}

#[tokio::test]
async fn snapshot_is_replaced_whole() {
    let harness = TestHarness::new(&[]).await.unwrap();
    assert!(harness.monitor.latest_devices().is_empty());

    harness.next_batch(vec![
        ont("OUI-F609-SN1", at(0), 1, Some(-20.0)),
        ont("OUI-HG8245-SN2", at(0), 1, Some(-21.0)),
    ]);
    completed(harness.cycle_at(at(0)).await);
    let first = harness.monitor.latest_devices();

    harness.next_batch(vec![ont("OUI-ZXHN-SN3", at(5), 1, Some(-22.0))]);
    completed(harness.cycle_at(at(5)).await);

    // un lecteur qui tenait l'ancien lot le garde intact
    assert_eq!(first.len(), 2);
    let second = harness.monitor.latest_devices();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, "ZXHN");
    assert_eq!(harness.monitor.health_report().devices_tracked, 1);
}

#[tokio::test]
async fn overlapping_trigger_is_skipped() {
    let source = StubDataSource::new().with_delay(StdDuration::from_millis(200));
    let settings = MonitorSettings { recipients: vec!["628111".into()], ..MonitorSettings::default() };
    let harness = TestHarness::with_settings(settings, source).await.unwrap();
    harness.next_batch(vec![ont("OUI-HG8245-SN2", at(0), 30, None)]);
    harness.next_batch(vec![ont("OUI-HG8245-SN2", at(0), 30, None)]);

    let monitor = harness.monitor.clone();
    let running = tokio::spawn(async move { monitor.run_cycle_at(at(0)).await });
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    assert_eq!(harness.cycle_at(at(0)).await, CycleOutcome::Skipped);
    let report = completed(running.await.unwrap());
    assert_eq!(report.alerts, 1);

    // le déclenchement ignoré n'a pas consommé de lot
    assert_eq!(harness.source.fetch_count(), 1);
    assert_eq!(harness.monitor.health_report().cycles_skipped, 1);
}

#[tokio::test]
async fn state_survives_restart() {
    let mut harness = TestHarness::new(&["628111"]).await.unwrap();
    harness.next_batch(vec![ont("OUI-HG8245-SN2", at(0), 30, None)]);
    completed(harness.cycle_at(at(0)).await);
    harness.assert_alert_sent("628111", "ONT OFFLINE (New)").unwrap();
    harness.notifier.clear();

    harness.restart().await;
    assert!(harness.monitor.latest_devices().is_empty());
    assert_eq!(harness.monitor.device_states().len(), 1);

    // toujours hors ligne après redémarrage : pas de "(New)" en double
    harness.next_batch(vec![ont("OUI-HG8245-SN2", at(5), 35, None)]);
    assert_eq!(completed(harness.cycle_at(at(5)).await).alerts, 0);

    harness.next_batch(vec![ont("OUI-HG8245-SN2", at(10), 0, Some(-21.0))]);
    completed(harness.cycle_at(at(10)).await);
    harness.assert_alert_sent("628111", "ONT BACK ONLINE").unwrap();
}

#[tokio::test]
async fn state_file_layout() {
    let harness = TestHarness::new(&[]).await.unwrap();
    harness.next_batch(vec![
        ont("OUI-ZXHN-SN3", at(0), 1, Some(-24.5)),
        ont("OUI-F609-SN1", at(0), 30, None),
    ]);
    completed(harness.cycle_at(at(0)).await);

    let bytes = harness.state_file_bytes().unwrap().expect("state file written");
    let text = String::from_utf8(bytes).unwrap();
    let doc: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(doc["ZXHN"]["isOnline"], true);
    assert_eq!(doc["ZXHN"]["rxPower"], -24.5);
    assert_eq!(doc["F609"]["isOnline"], false);
    assert!(doc["F609"]["rxPower"].is_null());
    assert_eq!(doc["F609"]["lastChecked"], "2024-05-01T12:00:00Z");
    // clés triées, JSON indenté
    assert!(text.find("\"F609\"").unwrap() < text.find("\"ZXHN\"").unwrap());
    assert!(text.contains("\n  \"F609\""));
    assert!(!harness.state_path().with_extension("json.tmp").exists());
}

#[tokio::test]
async fn rx_probe_precedence_end_to_end() {
    let harness = TestHarness::new(&["628111"]).await.unwrap();
    let raw = RawRecordBuilder::new("OUI-F609-SN1")
        .product_class("F609-PRO")
        .inform_ago(at(0), Duration::minutes(1))
        .rx_power_at(RxPath::DslDiagnostics, -10.0)
        .rx_power_at(RxPath::GponInterface, "-29.40 dBm")
        .build();
    harness.next_batch(vec![raw]);
    completed(harness.cycle_at(at(0)).await);

    let latest = harness.monitor.latest_devices();
    assert_eq!(latest[0].id, "F609-PRO");
    assert_eq!(latest[0].rx_power, Some(-29.4));
    harness.assert_alert_sent("628111", "LOW RX POWER (New)").unwrap();
}
