//! Hardware CRC unit configured for SCHA63x frames.
//!
//! The STM32H753 CRC peripheral supports 8-bit polynomials, so it can check
//! frame CRCs in hardware: polynomial 0x1D, initial value 0xFF, no reflection,
//! fed with the three header/payload bytes MSB first and complemented.

use embassy_stm32::{
    crc::{Config, ConfigError, Crc, InputReverseConfig, PolySize},
    peripherals::CRC,
    Peri,
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};

/// SCHA63x CRC-8 polynomial
const FRAME_CRC_POLY: u32 = 0x1D;
/// SCHA63x CRC-8 seed
const FRAME_CRC_SEED: u32 = 0xFF;

/// Peripheral collection for the CRC unit
pub struct CrcPeripherals<'d> {
    pub crc: Peri<'d, CRC>,
}

/// Macro to claim peripherals for FrameCrcUnit
#[macro_export]
macro_rules! claim_crc {
    ($peripherals:expr) => {{
        $crate::peripherals::crc::CrcPeripherals {
            crc: $peripherals.CRC,
        }
    }};
}

/// Hardware SCHA63x frame CRC.
///
/// Wrapped in a mutex so several tasks can share the unit.
pub struct FrameCrcUnit<'d> {
    inner: Mutex<CriticalSectionRawMutex, Crc<'d>>,
}

impl<'d> FrameCrcUnit<'d> {
    pub fn new(peripherals: CrcPeripherals<'d>) -> Result<Self, ConfigError> {
        let config = Config::new(
            InputReverseConfig::None, // MSB first
            false,                    // No output reflection
            PolySize::Width8,
            FRAME_CRC_SEED,
            FRAME_CRC_POLY,
        )?;

        Ok(Self {
            inner: Mutex::new(Crc::new(peripherals.crc, config)),
        })
    }

    /// CRC of a frame, computed over bits 31..8
    pub async fn frame_crc(&self, word: u32) -> u8 {
        let mut crc = self.inner.lock().await;
        crc.reset();
        let bytes = word.to_be_bytes();
        !(crc.feed_bytes(&bytes[..3]) as u8)
    }
}
