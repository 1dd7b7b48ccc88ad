//! Raw counts to physical units.
//!
//! Calibration walks [`CHANNELS`] in declared order and reads its dependency
//! out of the snapshot being built, so solar current can only ever see the
//! solar voltage from the same pass.

use crate::channels::{
    Calibration, Channel, ChannelSpec, ADC_FULL_SCALE, CHANNELS, CHANNEL_COUNT,
    CURRENT_BIAS_VOLTAGE, REFERENCE_VOLTAGE, SOLAR_CALIBRATION,
};
use crate::codec::RawSample;
use chrono::{DateTime, SecondsFormat, Utc};
use heapless::Vec;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("channel {channel} depends on {dependency}, which the table does not calibrate before it")]
    MissingDependency { channel: Channel, dependency: Channel },
}

/// Raw counts gathered during one read pass, indexed by channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    samples: [Option<RawSample>; CHANNEL_COUNT],
}

impl RawFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel: Channel, sample: RawSample) {
        self.samples[channel as usize] = Some(sample);
    }

    pub fn get(&self, channel: Channel) -> Option<RawSample> {
        self.samples[channel as usize]
    }

}

/// Calibrated values of one cycle, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSnapshot {
    values: Vec<(Channel, f64), CHANNEL_COUNT>,
    taken_at: DateTime<Utc>,
    device: String,
}

impl ValueSnapshot {
    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.values
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.get(channel).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// RFC 3339 with millisecond precision, the `Time` field on the wire.
    pub fn timestamp(&self) -> String {
        self.taken_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Serialize for ValueSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        for (channel, value) in &self.values {
            map.serialize_entry(channel.name(), value)?;
        }
        map.serialize_entry("Time", &self.timestamp())?;
        map.serialize_entry("DeviceName", &self.device)?;
        map.end()
    }
}

/// Normalize a count against the reference voltage.
pub fn ratio(sample: RawSample) -> f64 {
    f64::from(sample.count()) / ADC_FULL_SCALE * REFERENCE_VOLTAGE
}

fn linear(spec: &ChannelSpec, ratio: f64) -> f64 {
    ratio * spec.scale + spec.offset.unwrap_or(0.0)
}

fn bias_current(spec: &ChannelSpec, ratio: f64) -> f64 {
    (ratio - CURRENT_BIAS_VOLTAGE) * spec.scale
}

pub fn calibrate(
    raw: &RawFrame,
    taken_at: DateTime<Utc>,
    device: &str,
) -> Result<ValueSnapshot, CalibrationError> {
    calibrate_table(&CHANNELS, raw, taken_at, device)
}

/// Calibrate against an explicit table. Dependencies must precede the
/// channels that use them; a dependency that was declared but not read this
/// cycle omits the dependent channel instead.
pub fn calibrate_table(
    table: &[ChannelSpec],
    raw: &RawFrame,
    taken_at: DateTime<Utc>,
    device: &str,
) -> Result<ValueSnapshot, CalibrationError> {
    let mut snapshot = ValueSnapshot {
        values: Vec::new(),
        taken_at,
        device: device.to_owned(),
    };

    for (index, spec) in table.iter().enumerate() {
        let Some(sample) = raw.get(spec.channel) else {
            continue;
        };
        let ratio = ratio(sample);

        let value = match spec.calibration {
            Calibration::Linear => linear(spec, ratio),
            Calibration::Current => bias_current(spec, ratio),
            Calibration::SolarCurrent { depends_on } => {
                if !table[..index].iter().any(|s| s.channel == depends_on) {
                    return Err(CalibrationError::MissingDependency {
                        channel: spec.channel,
                        dependency: depends_on,
                    });
                }
                match snapshot.get(depends_on) {
                    Some(solar_voltage) if solar_voltage != 0.0 => {
                        bias_current(spec, ratio) * SOLAR_CALIBRATION / solar_voltage
                    }
                    Some(_) => {
                        tracing::debug!(channel = %spec.channel, "solar voltage is zero, omitting");
                        continue;
                    }
                    None => {
                        tracing::debug!(channel = %spec.channel, dependency = %depends_on, "dependency not read, omitting");
                        continue;
                    }
                }
            }
        };

        if snapshot.values.push((spec.channel, value)).is_err() {
            tracing::warn!(channel = %spec.channel, "channel table larger than snapshot capacity");
        }
    }

    Ok(snapshot)
}
