//! Cross-check of the frame CRC.
//!
//! Runs the hardware CRC unit and the software codec over known SCHA63x
//! command frames, whose low byte is the CRC from the datasheet, then keeps
//! comparing the two on changing data.

use crate::peripherals::FrameCrcUnit;
use defmt::{error, info, warn};
use embassy_time::{Duration, Instant, Timer};
use scha63x::frame::frame_crc;

/// Command frames with their published CRC in the low byte
const GOLDEN_FRAMES: [(&str, u32); 8] = [
    ("Read gyro X", 0x040000F7),
    ("Read gyro Y", 0x0C0000FB),
    ("Read acc X", 0x100000E9),
    ("Read temperature", 0x1C0000E3),
    ("Read summary status", 0x380000D5),
    ("Write reset", 0xE000017C),
    ("Select bank 0", 0xFC000073),
    ("Read TRC 2", 0x700000B9),
];

/// Timed comparisons per frame
const ITERATIONS: u32 = 10_000;

pub struct CrcCheckApp<'d> {
    unit: FrameCrcUnit<'d>,
}

impl<'d> CrcCheckApp<'d> {
    pub fn new(unit: FrameCrcUnit<'d>) -> Self {
        Self { unit }
    }

    /// Compare both implementations on one frame and report relative speed
    async fn check_frame(&self, name: &str, word: u32) -> bool {
        let hw_start = Instant::now();
        let mut hw_crc = 0;
        for _ in 0..ITERATIONS {
            hw_crc = self.unit.frame_crc(word).await;
        }
        let hw_ticks = (Instant::now() - hw_start).as_ticks() as f32;

        let sw_start = Instant::now();
        let mut sw_crc = 0;
        for _ in 0..ITERATIONS {
            sw_crc = frame_crc(core::hint::black_box(word));
        }
        let sw_ticks = (Instant::now() - sw_start).as_ticks() as f32;

        let expected = word as u8;
        let passed = hw_crc == expected && sw_crc == expected;
        if passed {
            info!(
                "{}: {:#x} ok (software {}x hardware time)",
                name,
                expected,
                sw_ticks / hw_ticks.max(1.0)
            );
        } else {
            warn!(
                "{}: hardware {:#x}, software {:#x}, expected {:#x}",
                name, hw_crc, sw_crc, expected
            );
        }
        passed
    }

    pub async fn run(&mut self) -> ! {
        let mut failures = 0;
        for (name, word) in GOLDEN_FRAMES {
            if !self.check_frame(name, word).await {
                failures += 1;
            }
        }
        if failures == 0 {
            info!("Frame CRC check passed on {} frames", GOLDEN_FRAMES.len());
        } else {
            error!("Frame CRC check failed on {} frames", failures);
        }

        // Keep comparing on data the table above does not cover
        let mut word: u32 = 0x1234_5600;
        loop {
            Timer::after(Duration::from_secs(10)).await;
            word = word.wrapping_mul(1_664_525).wrapping_add(1_013_904_223) & 0xFFFF_FF00;
            let hw_crc = self.unit.frame_crc(word).await;
            let sw_crc = frame_crc(word);
            if hw_crc != sw_crc {
                warn!(
                    "CRC mismatch on {:#x}: hardware {:#x}, software {:#x}",
                    word, hw_crc, sw_crc
                );
            }
        }
    }
}

#[embassy_executor::task]
pub async fn task(claims: crate::peripherals::crc::CrcPeripherals<'static>) {
    match FrameCrcUnit::new(claims) {
        Ok(unit) => CrcCheckApp::new(unit).run().await,
        Err(_) => error!("CRC unit rejected the frame CRC configuration"),
    }
}
