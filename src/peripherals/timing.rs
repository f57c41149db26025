//! Embassy time source for the driver and the host protocol

use embassy_time::{Instant, Timer};
use scha63x::Timing;

/// Settle waits on the embassy timer queue, timestamps from the uptime clock
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyTiming;

impl Timing for EmbassyTiming {
    async fn wait_ms(&mut self, ms: u32) {
        Timer::after_millis(ms as u64).await;
    }

    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
}
