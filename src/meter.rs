use crate::calibration::{calibrate, CalibrationError, RawFrame, ValueSnapshot};
use crate::channels::CHANNELS;
use crate::classifier::classify;
use crate::codec::{read_channel, BusError};
use crate::config::ReadFailurePolicy;
use crate::notifier::{AlertList, EdgeNotifier};
use crate::publisher::{encode_alert, encode_snapshot, AlertFormat, Publisher, ALERT_TOPIC};
use chrono::{DateTime, Utc};
use embedded_hal::spi::SpiDevice;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Reading,
    Calibrating,
    Classifying,
    Notifying,
    Publishing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MeterStats {
    pub cycles_completed: u64,
    pub cycles_abandoned: u64,
    pub alerts_emitted: u64,
    pub publish_failures: u64,
    pub skipped_reads: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterSettings {
    pub device_name: String,
    pub telemetry_topic: String,
    pub alert_format: AlertFormat,
    pub read_failure: ReadFailurePolicy,
    /// Log every snapshot at info level.
    pub log_snapshots: bool,
}

impl MeterSettings {
    pub fn new(device_name: impl Into<String>, telemetry_topic: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            telemetry_topic: telemetry_topic.into(),
            alert_format: AlertFormat::Json,
            read_failure: ReadFailurePolicy::Abort,
            log_snapshots: false,
        }
    }
}

/// Result of a cycle that did not hit a fatal bus error.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published(CycleReport),
    Abandoned(CalibrationError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub snapshot: ValueSnapshot,
    pub alerts: AlertList,
    pub snapshot_delivered: bool,
    pub alerts_delivered: usize,
}

/// Cycle orchestrator. Owns the bus, the publisher, and the classification
/// state carried from one cycle to the next.
pub struct Meter<B, P> {
    bus: B,
    publisher: P,
    settings: MeterSettings,
    notifier: EdgeNotifier,
    phase: CyclePhase,
    stats: MeterStats,
}

impl<B: SpiDevice, P: Publisher> Meter<B, P> {
    pub fn new(bus: B, publisher: P, settings: MeterSettings) -> Self {
        Self {
            bus,
            publisher,
            settings,
            notifier: EdgeNotifier::new(),
            phase: CyclePhase::Idle,
            stats: MeterStats::default(),
        }
    }

    pub fn run_cycle(&mut self) -> Result<CycleOutcome, BusError> {
        self.run_cycle_at(Utc::now())
    }

    /// One read → calibrate → classify → notify → publish pass.
    ///
    /// A `BusError` under [`ReadFailurePolicy::Abort`] is returned without
    /// touching the classification state; the caller is expected to stop.
    pub fn run_cycle_at(&mut self, taken_at: DateTime<Utc>) -> Result<CycleOutcome, BusError> {
        self.phase = CyclePhase::Reading;
        let raw = match self.read_all() {
            Ok(raw) => raw,
            Err(e) => {
                self.phase = CyclePhase::Idle;
                return Err(e);
            }
        };

        self.phase = CyclePhase::Calibrating;
        let snapshot = match calibrate(&raw, taken_at, &self.settings.device_name) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "calibration failed, cycle abandoned");
                self.stats.cycles_abandoned += 1;
                self.phase = CyclePhase::Idle;
                return Ok(CycleOutcome::Abandoned(e));
            }
        };

        if self.settings.log_snapshots {
            match serde_json::to_string(&snapshot) {
                Ok(json) => tracing::info!(snapshot = %json, "cycle values"),
                Err(e) => tracing::warn!(error = %e, "snapshot not loggable"),
            }
        }

        self.phase = CyclePhase::Classifying;
        let classification = classify(&snapshot);

        self.phase = CyclePhase::Notifying;
        let alerts = self
            .notifier
            .observe(classification, taken_at, &self.settings.device_name);
        self.stats.alerts_emitted += alerts.len() as u64;

        self.phase = CyclePhase::Publishing;
        let alerts_delivered = self.publish_alerts(&alerts);
        let snapshot_delivered = self.publish_snapshot(&snapshot);

        self.stats.cycles_completed += 1;
        self.phase = CyclePhase::Idle;

        Ok(CycleOutcome::Published(CycleReport {
            snapshot,
            alerts,
            snapshot_delivered,
            alerts_delivered,
        }))
    }

    fn read_all(&mut self) -> Result<RawFrame, BusError> {
        let mut raw = RawFrame::new();

        for spec in &CHANNELS {
            match read_channel(&mut self.bus, spec.selector) {
                Ok(sample) => {
                    tracing::trace!(channel = %spec.channel, count = sample.count(), "channel read");
                    raw.insert(spec.channel, sample);
                }
                Err(e) => match self.settings.read_failure {
                    ReadFailurePolicy::Abort => {
                        tracing::error!(channel = %spec.channel, error = %e, "channel read failed");
                        return Err(e);
                    }
                    ReadFailurePolicy::Skip => {
                        tracing::warn!(channel = %spec.channel, error = %e, "channel read failed, skipping");
                        self.stats.skipped_reads += 1;
                    }
                },
            }
        }

        Ok(raw)
    }

    fn publish_alerts(&mut self, alerts: &AlertList) -> usize {
        let mut delivered = 0;

        for event in alerts {
            tracing::info!(
                channel = %event.channel,
                value = event.transition.as_str(),
                "band transition"
            );

            let result = encode_alert(event, self.settings.alert_format)
                .and_then(|payload| self.publisher.publish(ALERT_TOPIC, &payload));
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(channel = %event.channel, error = %e, "alert publish failed");
                    self.stats.publish_failures += 1;
                }
            }
        }

        delivered
    }

    fn publish_snapshot(&mut self, snapshot: &ValueSnapshot) -> bool {
        let topic = self.settings.telemetry_topic.as_str();
        let result = encode_snapshot(snapshot).and_then(|payload| self.publisher.publish(topic, &payload));

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%topic, error = %e, "snapshot publish failed");
                self.stats.publish_failures += 1;
                false
            }
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn stats(&self) -> MeterStats {
        self.stats
    }

    pub fn settings(&self) -> &MeterSettings {
        &self.settings
    }

    pub fn notifier(&self) -> &EdgeNotifier {
        &self.notifier
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub fn into_parts(self) -> (B, P) {
        (self.bus, self.publisher)
    }
}
