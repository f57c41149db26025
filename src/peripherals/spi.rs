//! SPI bus for the SCHA63x.
//!
//! Both chips share SPI4 and its DMA channels; each has its own software
//! chip-select line.

use embassy_stm32::{
    gpio::{Level, Output, Speed},
    mode::Async,
    peripherals::{DMA1_CH0, DMA1_CH1, PE11, PE12, PE13, PE14, PE15, SPI4},
    spi::{self, Config as SpiConfig, Mode, Phase, Polarity, Spi},
    time::Hertz,
    Peri,
};
use scha63x::{Chip, Transport};

/// SCHA63x SPI clock; the sensor accepts up to 10 MHz
const SPI_FREQUENCY_HZ: u32 = 10_000_000;

/// Peripheral collection for the SCHA63x SPI interface
pub struct SpiPeripherals<'d> {
    pub spi4: Peri<'d, SPI4>,
    pub cs_uno: Peri<'d, PE11>,     // CS UNO
    pub sck: Peri<'d, PE12>,        // SCK
    pub miso: Peri<'d, PE13>,       // MISO
    pub mosi: Peri<'d, PE14>,       // MOSI
    pub cs_due: Peri<'d, PE15>,     // CS DUE
    pub dma_tx: Peri<'d, DMA1_CH0>, // TX DMA
    pub dma_rx: Peri<'d, DMA1_CH1>, // RX DMA
}

/// Macro to claim peripherals for Scha63xSpi
#[macro_export]
macro_rules! claim_imu_spi {
    ($peripherals:expr) => {{
        $crate::peripherals::spi::SpiPeripherals {
            spi4: $peripherals.SPI4,
            cs_uno: $peripherals.PE11,     // CS UNO
            sck: $peripherals.PE12,        // SCK
            miso: $peripherals.PE13,       // MISO
            mosi: $peripherals.PE14,       // MOSI
            cs_due: $peripherals.PE15,     // CS DUE
            dma_tx: $peripherals.DMA1_CH0, // TX DMA
            dma_rx: $peripherals.DMA1_CH1, // RX DMA
        }
    }};
}

/// SPI4 in mode 0 with one chip-select per SCHA63x chip
pub struct Scha63xSpi<'d> {
    spi: Spi<'d, Async>,
    cs_uno: Output<'d>,
    cs_due: Output<'d>,
}

impl<'d> Scha63xSpi<'d> {
    pub fn new(peripherals: SpiPeripherals<'d>) -> Self {
        let mut config = SpiConfig::default();
        config.mode = Mode {
            polarity: Polarity::IdleLow,
            phase: Phase::CaptureOnFirstTransition,
        };
        config.frequency = Hertz(SPI_FREQUENCY_HZ);

        // Chip selects are active low
        let cs_uno = Output::new(peripherals.cs_uno, Level::High, Speed::VeryHigh);
        let cs_due = Output::new(peripherals.cs_due, Level::High, Speed::VeryHigh);

        let spi = Spi::new(
            peripherals.spi4,
            peripherals.sck,
            peripherals.mosi,
            peripherals.miso,
            peripherals.dma_tx,
            peripherals.dma_rx,
            config,
        );

        Self { spi, cs_uno, cs_due }
    }
}

impl Transport for Scha63xSpi<'_> {
    type Error = spi::Error;

    /// Clock one 32-bit frame out MSB first and return the word clocked in
    async fn exchange(&mut self, chip: Chip, frame: u32) -> Result<u32, spi::Error> {
        let tx_buf = frame.to_be_bytes();
        let mut rx_buf = [0u8; 4];

        let cs = match chip {
            Chip::Uno => &mut self.cs_uno,
            Chip::Due => &mut self.cs_due,
        };

        cs.set_low();
        let result = self.spi.transfer(&mut rx_buf, &tx_buf).await;
        cs.set_high();

        result?;
        Ok(u32::from_be_bytes(rx_buf))
    }
}
