//! Static channel table for the supply node's ADC.
//!
//! The table order is the read order and the calibration order. Solar current
//! sits after solar voltage so it always divides by the value computed in the
//! same pass.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// ADC reference voltage after the board's input divider.
pub const REFERENCE_VOLTAGE: f64 = 4.574;
/// Full-scale count of the 10-bit converter.
pub const ADC_FULL_SCALE: f64 = 1024.0;
/// Output voltage of the current-sense amplifiers at zero current.
pub const CURRENT_BIAS_VOLTAGE: f64 = 1.8;
/// Converts sensed solar current into the panel-side value.
pub const SOLAR_CALIBRATION: f64 = 4.13;

pub const CHANNEL_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Rail1V8,
    Rail3V3,
    BatteryVoltage,
    Rail5V,
    Rail48V,
    SolarVoltage,
    BatteryCurrent,
    SolarCurrent,
}

impl Channel {
    /// Name used as the JSON key and in alerts.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Rail1V8 => "1V8",
            Channel::Rail3V3 => "3V3",
            Channel::BatteryVoltage => "BatteryV",
            Channel::Rail5V => "5V",
            Channel::Rail48V => "48V",
            Channel::SolarVoltage => "SolarV",
            Channel::BatteryCurrent => "BatteryI",
            Channel::SolarCurrent => "SolarI",
        }
    }

    pub fn spec(self) -> &'static ChannelSpec {
        // CHANNELS is declared in enum order
        &CHANNELS[self as usize]
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive nominal operating range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lo: f64,
    pub hi: f64,
}

impl Band {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lo <= value && value <= self.hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calibration {
    /// `ratio * scale + offset`
    Linear,
    /// `(ratio - bias) * scale`
    Current,
    /// `(ratio - bias) * scale * SOLAR_CALIBRATION / solar_voltage`
    SolarCurrent { depends_on: Channel },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSpec {
    pub channel: Channel,
    pub selector: u8,
    pub scale: f64,
    pub offset: Option<f64>,
    pub band: Option<Band>,
    pub calibration: Calibration,
}

impl ChannelSpec {
    pub fn name(&self) -> &'static str {
        self.channel.name()
    }
}

pub static CHANNELS: [ChannelSpec; CHANNEL_COUNT] = [
    ChannelSpec {
        channel: Channel::Rail1V8,
        selector: 0x80,
        scale: 1.0,
        offset: None,
        band: Some(Band::new(1.7, 1.9)),
        calibration: Calibration::Linear,
    },
    ChannelSpec {
        channel: Channel::Rail3V3,
        selector: 0x90,
        scale: 1.0,
        offset: None,
        band: Some(Band::new(3.1, 3.5)),
        calibration: Calibration::Linear,
    },
    ChannelSpec {
        channel: Channel::BatteryVoltage,
        selector: 0xA0,
        scale: 1.0,
        offset: None,
        band: Some(Band::new(3.5, 4.3)),
        calibration: Calibration::Linear,
    },
    ChannelSpec {
        channel: Channel::Rail5V,
        selector: 0xB0,
        scale: 1.25,
        offset: None,
        band: Some(Band::new(4.7, 5.3)),
        calibration: Calibration::Linear,
    },
    ChannelSpec {
        channel: Channel::Rail48V,
        selector: 0xC0,
        scale: 13.0,
        offset: Some(0.7),
        band: Some(Band::new(45.0, 50.0)),
        calibration: Calibration::Linear,
    },
    ChannelSpec {
        channel: Channel::SolarVoltage,
        selector: 0xD0,
        scale: 6.0,
        offset: Some(0.8),
        band: Some(Band::new(10.0, 28.0)),
        calibration: Calibration::Linear,
    },
    ChannelSpec {
        channel: Channel::BatteryCurrent,
        selector: 0xE0,
        scale: 1.6667,
        offset: None,
        band: None,
        calibration: Calibration::Current,
    },
    ChannelSpec {
        channel: Channel::SolarCurrent,
        selector: 0xF0,
        scale: 1.6667,
        offset: None,
        band: None,
        calibration: Calibration::SolarCurrent {
            depends_on: Channel::SolarVoltage,
        },
    },
];

const_assert_eq!(Channel::SolarCurrent as usize, CHANNEL_COUNT - 1);
