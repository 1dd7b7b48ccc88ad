//! MCP3008-style request/response framing over a full-duplex SPI transfer.

use embedded_hal::spi::{Error as _, ErrorKind, SpiDevice};
use thiserror::Error;

pub const FRAME_LEN: usize = 3;

const START_BIT: u8 = 0x01;
const PADDING: u8 = 0x00;
const HIGH_BITS_MASK: u8 = 0x03;

/// 10-bit converter count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample(u16);

impl RawSample {
    pub const MAX: u16 = 0x03FF;

    /// Counts above 10 bits are masked off.
    pub fn new(count: u16) -> Self {
        Self(count & Self::MAX)
    }

    pub fn count(self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("SPI transaction for selector {selector:#04x} failed: {kind:?}")]
pub struct BusError {
    pub selector: u8,
    pub kind: ErrorKind,
}

pub fn encode_request(selector: u8) -> [u8; FRAME_LEN] {
    [START_BIT, selector, PADDING]
}

pub fn decode_response(frame: &[u8; FRAME_LEN]) -> RawSample {
    let high = u16::from(frame[1] & HIGH_BITS_MASK);
    let low = u16::from(frame[2]);
    RawSample::new((high << 8) | low)
}

/// One synchronous transfer. Faults are handed back untouched, no retry.
pub fn read_channel<B: SpiDevice>(bus: &mut B, selector: u8) -> Result<RawSample, BusError> {
    let request = encode_request(selector);
    let mut response = [0u8; FRAME_LEN];

    bus.transfer(&mut response, &request).map_err(|e| BusError {
        selector,
        kind: e.kind(),
    })?;

    Ok(decode_response(&response))
}
