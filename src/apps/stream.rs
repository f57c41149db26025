//! Host session over USB CDC ACM.
//!
//! Each time the host opens the port: answer the ping, hand the filter choice
//! to the sampler, report the startup outcome, send the cross-axis
//! compensation and the time base, then forward sample batches until the
//! port closes.

use super::{DROPPED_SAMPLES, FILTER_CONFIG, SAMPLES, SENSOR_REPORT, STREAM_SETTINGS};
use crate::peripherals::{AcmConnection, AcmError, EmbassyTiming};
use core::sync::atomic::Ordering;
use defmt::{info, warn};
use embassy_time::{Instant, Timer};
use heapless::Vec;
use scha63x::protocol::MAX_BATCH;
use scha63x::{Handshake, ProtocolError, RawSample, SensorInfo};

/// Delay between reconnection attempts when the connection is lost
const RECONNECT_DELAY_MS: u64 = 100;

pub struct StreamApp<'d> {
    acm: AcmConnection<'d>,
}

impl<'d> StreamApp<'d> {
    pub const fn new(acm: AcmConnection<'d>) -> Self {
        Self { acm }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            self.acm.wait_connection().await;
            info!("Host connected, starting session");

            let e = self.session().await;
            warn!("Session ended: {}", e);
            Timer::after_millis(RECONNECT_DELAY_MS).await;
        }
    }

    /// Handshake, then stream until the link fails.
    async fn session(&mut self) -> ProtocolError<AcmError> {
        match self.handshake_and_stream().await {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    async fn handshake_and_stream(&mut self) -> Result<core::convert::Infallible, ProtocolError<AcmError>> {
        let mut handshake = Handshake::new(&mut self.acm, EmbassyTiming);

        let attempts = handshake.ping().await?;
        info!("Host answered ping after {} attempt(s)", attempts);

        let config = handshake.receive_filter_config().await?;
        SENSOR_REPORT.reset();
        FILTER_CONFIG.signal(config);
        let report = SENSOR_REPORT.wait().await;

        let info = match &report {
            Ok(report) => SensorInfo::ready(report.serial.clone()),
            Err(e) => SensorInfo::failed(e),
        };
        let settings = handshake.exchange_info(&info).await?;
        info!("Stream settings: {}", settings);

        let cac = report.map(|report| report.cac).unwrap_or_default();
        handshake.send_cac(&cac).await?;

        // Samples from before the time base would land at negative times
        SAMPLES.clear();
        let dropped = DROPPED_SAMPLES.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!("{} samples dropped since the last session", dropped);
        }
        handshake.sync_timestamp(Instant::now().as_micros()).await?;
        STREAM_SETTINGS.signal(settings);

        let batch_len = settings.batch_len();
        let mut batch: Vec<RawSample, MAX_BATCH> = Vec::new();
        loop {
            let sample = SAMPLES.receive().await;
            // batch_len never exceeds MAX_BATCH
            let _ = batch.push(sample);
            if batch.len() >= batch_len {
                handshake.send_batch(&batch).await?;
                batch.clear();
            }
        }
    }
}

#[embassy_executor::task]
pub async fn task(acm: AcmConnection<'static>) -> ! {
    let mut app = StreamApp::new(acm);
    app.run().await
}
