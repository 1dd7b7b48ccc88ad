//! Linux spidev transport for the board.

use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use linux_embedded_hal::SpidevDevice;
use std::path::Path;

pub const CLOCK_HZ: u32 = 1_000_000;
pub const WORD_BITS: u8 = 8;

/// Open and configure the ADC's spidev node: 1 MHz, mode 0, 8-bit words.
pub fn open(path: impl AsRef<Path>) -> std::io::Result<SpidevDevice> {
    let path = path.as_ref();
    let mut spi = Spidev::open(path)?;

    let options = SpidevOptions::new()
        .bits_per_word(WORD_BITS)
        .max_speed_hz(CLOCK_HZ)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)?;

    tracing::debug!(device = %path.display(), clock_hz = CLOCK_HZ, "SPI configured");
    Ok(SpidevDevice(spi))
}
