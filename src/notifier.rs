//! Edge detection between consecutive classification maps.

use crate::channels::{Channel, CHANNEL_COUNT};
use crate::classifier::ClassificationMap;
use chrono::{DateTime, SecondsFormat, Utc};
use heapless::Vec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    EnteredBand,
    LeftBand,
}

impl Transition {
    pub fn from_state(in_band: bool) -> Self {
        if in_band {
            Transition::EnteredBand
        } else {
            Transition::LeftBand
        }
    }

    /// Wire value of the alert.
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::EnteredBand => "on",
            Transition::LeftBand => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub channel: Channel,
    pub transition: Transition,
    pub taken_at: DateTime<Utc>,
    pub device: String,
}

impl AlertEvent {
    pub fn timestamp(&self) -> String {
        self.taken_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

pub type AlertList = Vec<AlertEvent, CHANNEL_COUNT>;

/// A channel with no previous entry is "unknown" and always reports, so the
/// first cycle emits one event per classified channel.
pub fn diff(
    current: &ClassificationMap,
    previous: &ClassificationMap,
    taken_at: DateTime<Utc>,
    device: &str,
) -> AlertList {
    let mut events = AlertList::new();

    for (channel, in_band) in current.iter() {
        if previous.get(channel) == Some(in_band) {
            continue;
        }
        let event = AlertEvent {
            channel,
            transition: Transition::from_state(in_band),
            taken_at,
            device: device.to_owned(),
        };
        if events.push(event).is_err() {
            tracing::warn!(%channel, "alert list full, event dropped");
        }
    }

    events
}

/// Classification carried from the last completed cycle.
#[derive(Debug, Clone, Default)]
pub struct EdgeNotifier {
    previous: ClassificationMap,
}

impl EdgeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff against the stored state, then replace it with `current`.
    pub fn observe(
        &mut self,
        current: ClassificationMap,
        taken_at: DateTime<Utc>,
        device: &str,
    ) -> AlertList {
        let events = diff(&current, &self.previous, taken_at, device);
        self.previous = current;
        events
    }

    pub fn previous(&self) -> &ClassificationMap {
        &self.previous
    }
}
