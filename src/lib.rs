//! # Power-node meter
//!
//! Polls the eight-channel ADC of a solar/battery supply node over SPI,
//! calibrates each reading into volts or amps, checks the supply rails against
//! their nominal bands, and publishes a telemetry snapshot plus edge-triggered
//! alerts over MQTT.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pwrmeter::{Meter, MeterSettings};
//!
//! let mut meter = Meter::new(spi_device, publisher, MeterSettings::new("node-1", "solar/node-1"));
//!
//! // One read → calibrate → classify → notify → publish pass
//! match meter.run_cycle() {
//!     Ok(outcome) => println!("{:?}", outcome),
//!     Err(e) => eprintln!("bus failure: {}", e),
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`codec`] - SPI request/response framing for one channel read
//! - [`channels`] - Static channel table (selector, scale, offset, band)
//! - [`calibration`] - Raw counts to physical values
//! - [`classifier`] - In-band / out-of-band per rail
//! - [`notifier`] - Edge detection across cycles
//! - [`meter`] - Cycle orchestrator
//! - [`scheduler`] - Immediate and scheduled cadence
//! - [`publisher`] - Payload encoding and the MQTT sink
//! - [`config`] - `conf.json` loading and CLI overrides

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod calibration;
pub mod channels;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod meter;
pub mod notifier;
pub mod publisher;
pub mod scheduler;

#[cfg(feature = "linux-spi")]
pub mod spidev;

// Re-export main public types for convenience
pub use calibration::{calibrate, CalibrationError, RawFrame, ValueSnapshot};
pub use channels::{Channel, ChannelSpec, CHANNELS};
pub use classifier::{classify, ClassificationMap};
pub use codec::{read_channel, BusError, RawSample};
pub use config::Configuration;
pub use meter::{CycleOutcome, Meter, MeterSettings, MeterStats};
pub use notifier::{diff, AlertEvent, EdgeNotifier, Transition};
pub use publisher::{MqttPublisher, PublishError, Publisher};
