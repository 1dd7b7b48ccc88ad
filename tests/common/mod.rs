#![allow(dead_code)]

use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};
use pwrmeter::channels::Channel;
use pwrmeter::publisher::{PublishError, Publisher};
use std::collections::{HashMap, HashSet};

/// In-memory ADC answering MCP3008 request frames from a count table.
#[derive(Debug, Default)]
pub struct FakeAdc {
    counts: HashMap<u8, u16>,
    failing: HashSet<u8>,
    pub requests: Vec<[u8; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeAdcError;

impl embedded_hal::spi::Error for FakeAdcError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl FakeAdc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every rail nominal, currents near zero.
    pub fn nominal() -> Self {
        let mut adc = Self::new();
        adc.set(Channel::Rail1V8, 400); // 1.787 V
        adc.set(Channel::Rail3V3, 730); // 3.261 V
        adc.set(Channel::BatteryVoltage, 880); // 3.931 V
        adc.set(Channel::Rail5V, 900); // 5.025 V
        adc.set(Channel::Rail48V, 820); // 48.31 V
        adc.set(Channel::SolarVoltage, 600); // 16.88 V
        adc.set(Channel::BatteryCurrent, 450);
        adc.set(Channel::SolarCurrent, 500);
        adc
    }

    pub fn set(&mut self, channel: Channel, count: u16) {
        self.counts.insert(channel.spec().selector, count);
    }

    pub fn fail(&mut self, channel: Channel) {
        self.failing.insert(channel.spec().selector);
    }

    pub fn heal(&mut self, channel: Channel) {
        self.failing.remove(&channel.spec().selector);
    }

    pub fn selectors_read(&self) -> Vec<u8> {
        self.requests.iter().map(|r| r[1]).collect()
    }
}

impl ErrorType for FakeAdc {
    type Error = FakeAdcError;
}

impl SpiDevice for FakeAdc {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        for op in operations {
            if let Operation::Transfer(read, write) = op {
                let request = [write[0], write[1], write[2]];
                self.requests.push(request);

                let selector = request[1];
                if self.failing.contains(&selector) {
                    return Err(FakeAdcError);
                }
                let count = self.counts.get(&selector).copied().unwrap_or(0);
                // Garbage in the bits above the 10-bit result
                read[0] = 0xAA;
                read[1] = 0xFC | ((count >> 8) as u8 & 0x03);
                read[2] = (count & 0xFF) as u8;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

/// Publisher that keeps everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub messages: Vec<Message>,
    pub reject_topics: HashSet<String>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.topic == topic).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.reject_topics.contains(topic) {
            return Err(PublishError::Rejected(topic.to_string()));
        }
        self.messages.push(Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
