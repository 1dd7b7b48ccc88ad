mod common;

use chrono::{TimeZone, Utc};
use common::{FakeAdc, RecordingPublisher};
use pwrmeter::channels::{Channel, CHANNELS, CHANNEL_COUNT};
use pwrmeter::config::ReadFailurePolicy;
use pwrmeter::meter::{CycleOutcome, CyclePhase, Meter, MeterSettings};
use pwrmeter::publisher::{AlertFormat, ALERT_TOPIC};

const TOPIC: &str = "solar/node1";

fn meter(adc: FakeAdc) -> Meter<FakeAdc, RecordingPublisher> {
    Meter::new(adc, RecordingPublisher::new(), MeterSettings::new("node-1", TOPIC))
}

fn published(outcome: CycleOutcome) -> pwrmeter::meter::CycleReport {
    match outcome {
        CycleOutcome::Published(report) => report,
        CycleOutcome::Abandoned(e) => panic!("cycle abandoned: {e}"),
    }
}

#[test]
fn test_channels_read_in_table_order() {
    let mut meter = meter(FakeAdc::nominal());
    meter.run_cycle().unwrap();

    let expected: Vec<u8> = CHANNELS.iter().map(|s| s.selector).collect();
    assert_eq!(meter.bus_mut().selectors_read(), expected);
    assert!(meter.bus_mut().requests.iter().all(|r| r[0] == 0x01 && r[2] == 0x00));
}

#[test]
fn test_first_cycle_alerts_every_banded_channel() {
    let mut meter = meter(FakeAdc::nominal());
    let report = published(meter.run_cycle().unwrap());

    assert_eq!(report.snapshot.len(), CHANNEL_COUNT);
    assert_eq!(report.alerts.len(), 6);
    assert_eq!(report.alerts_delivered, 6);
    assert!(report.snapshot_delivered);

    let publisher = meter.publisher();
    assert_eq!(publisher.on_topic(ALERT_TOPIC).len(), 6);
    assert_eq!(publisher.on_topic(TOPIC).len(), 1);
    assert!(publisher
        .on_topic(ALERT_TOPIC)
        .iter()
        .all(|m| m.json()["Value"] == "on"));
}

#[test]
fn test_steady_state_publishes_snapshot_only() {
    let mut meter = meter(FakeAdc::nominal());
    meter.run_cycle().unwrap();
    meter.publisher_mut().clear();

    let report = published(meter.run_cycle().unwrap());
    assert!(report.alerts.is_empty());
    assert_eq!(meter.publisher().messages.len(), 1);
    assert_eq!(meter.publisher().messages[0].topic, TOPIC);
}

#[test]
fn test_5v_leaving_band_emits_single_alert() {
    let mut meter = meter(FakeAdc::nominal());
    meter.run_cycle().unwrap();
    meter.publisher_mut().clear();

    // 1000 counts on the 5V channel is 5.58 V
    meter.bus_mut().set(Channel::Rail5V, 1000);
    let report = published(meter.run_cycle().unwrap());

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].channel, Channel::Rail5V);

    let alerts = meter.publisher().on_topic(ALERT_TOPIC);
    assert_eq!(alerts.len(), 1);
    let alert = alerts[0].json();
    assert_eq!(alert["Name"], "5V");
    assert_eq!(alert["Value"], "off");
    assert_eq!(alert["DeviceName"], "node-1");
}

#[test]
fn test_snapshot_payload_has_every_channel() {
    let mut meter = meter(FakeAdc::nominal());
    meter
        .run_cycle_at(Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap())
        .unwrap();

    let snapshot = meter.publisher().on_topic(TOPIC)[0].json();
    let object = snapshot.as_object().unwrap();
    for spec in &CHANNELS {
        assert!(object[spec.name()].is_number(), "missing {}", spec.name());
    }
    assert_eq!(object["Time"], "2024-06-01T08:30:00.000Z");
    assert_eq!(object["DeviceName"], "node-1");
    assert_eq!(object.len(), CHANNEL_COUNT + 2);

    let v1v8 = object["1V8"].as_f64().unwrap();
    assert!((v1v8 - 400.0 / 1024.0 * 4.574).abs() < 1e-9);
}

#[test]
fn test_bus_error_is_fatal_and_keeps_state() {
    let mut meter = meter(FakeAdc::nominal());
    meter.run_cycle().unwrap();
    let before = meter.notifier().previous().clone();
    meter.publisher_mut().clear();

    meter.bus_mut().fail(Channel::Rail48V);
    let err = meter.run_cycle().unwrap_err();

    assert_eq!(err.selector, 0xC0);
    assert_eq!(meter.phase(), CyclePhase::Idle);
    assert_eq!(meter.notifier().previous(), &before);
    assert!(meter.publisher().messages.is_empty());
    // Reading stopped at the failed channel
    assert_eq!(meter.bus_mut().selectors_read().last(), Some(&0xC0));
}

#[test]
fn test_skip_policy_omits_failed_channel() {
    let mut settings = MeterSettings::new("node-1", TOPIC);
    settings.read_failure = ReadFailurePolicy::Skip;
    let mut adc = FakeAdc::nominal();
    adc.fail(Channel::Rail3V3);
    let mut meter = Meter::new(adc, RecordingPublisher::new(), settings);

    let report = published(meter.run_cycle().unwrap());
    assert!(!report.snapshot.contains(Channel::Rail3V3));
    assert_eq!(report.snapshot.len(), CHANNEL_COUNT - 1);
    assert_eq!(meter.stats().skipped_reads, 1);
    assert_eq!(meter.bus_mut().selectors_read().len(), CHANNEL_COUNT);
}

#[test]
fn test_failed_solar_voltage_omits_solar_current() {
    let mut settings = MeterSettings::new("node-1", TOPIC);
    settings.read_failure = ReadFailurePolicy::Skip;
    let mut adc = FakeAdc::nominal();
    adc.fail(Channel::SolarVoltage);
    let mut meter = Meter::new(adc, RecordingPublisher::new(), settings);

    let report = published(meter.run_cycle().unwrap());
    assert!(report.snapshot.contains(Channel::Rail5V));
    assert!(!report.snapshot.contains(Channel::SolarVoltage));
    assert!(!report.snapshot.contains(Channel::SolarCurrent));
    assert!(report.snapshot_delivered);
    // The five remaining rails still alert on the first cycle
    assert_eq!(report.alerts.len(), 5);
    assert_eq!(meter.stats().cycles_abandoned, 0);

    let json = meter.publisher().on_topic(TOPIC)[0].json();
    assert!(json.get("5V").is_some());
    assert!(json.get("SolarV").is_none());
    assert!(json.get("SolarI").is_none());

    // Once the read recovers only the solar rail is new
    meter.bus_mut().heal(Channel::SolarVoltage);
    let report = published(meter.run_cycle().unwrap());
    assert!(report.snapshot.contains(Channel::SolarCurrent));
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].channel, Channel::SolarVoltage);
}

#[test]
fn test_alert_failure_does_not_block_snapshot() {
    let mut meter = meter(FakeAdc::nominal());
    meter.publisher_mut().reject_topics.insert(ALERT_TOPIC.to_string());

    let report = published(meter.run_cycle().unwrap());
    assert_eq!(report.alerts_delivered, 0);
    assert!(report.snapshot_delivered);
    assert_eq!(meter.stats().publish_failures, 6);

    // State still advanced; next cycle has nothing to report
    meter.publisher_mut().reject_topics.clear();
    let report = published(meter.run_cycle().unwrap());
    assert!(report.alerts.is_empty());
}

#[test]
fn test_snapshot_failure_is_counted() {
    let mut meter = meter(FakeAdc::nominal());
    meter.publisher_mut().reject_topics.insert(TOPIC.to_string());

    let report = published(meter.run_cycle().unwrap());
    assert!(!report.snapshot_delivered);
    assert_eq!(report.alerts_delivered, 6);
    assert_eq!(meter.stats().publish_failures, 1);
    assert_eq!(meter.stats().cycles_completed, 1);
}

#[test]
fn test_text_alert_format() {
    let mut settings = MeterSettings::new("node-1", TOPIC);
    settings.alert_format = AlertFormat::Text;
    let mut adc = FakeAdc::nominal();
    adc.set(Channel::Rail48V, 100);
    let mut meter = Meter::new(adc, RecordingPublisher::new(), settings);

    meter.run_cycle().unwrap();
    let payloads: Vec<&[u8]> = meter
        .publisher()
        .on_topic(ALERT_TOPIC)
        .iter()
        .map(|m| m.payload.as_slice())
        .collect();

    assert!(payloads.contains(&b"48V:off".as_slice()));
    assert!(payloads.contains(&b"5V:on".as_slice()));
}

#[test]
fn test_currents_never_alert() {
    let mut meter = meter(FakeAdc::nominal());
    meter.run_cycle().unwrap();
    meter.publisher_mut().clear();

    meter.bus_mut().set(Channel::BatteryCurrent, 1023);
    meter.bus_mut().set(Channel::SolarCurrent, 0);
    let report = published(meter.run_cycle().unwrap());

    assert!(report.alerts.is_empty());
    assert!(report.snapshot.contains(Channel::BatteryCurrent));
    assert!(report.snapshot.contains(Channel::SolarCurrent));
}
