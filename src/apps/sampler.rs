//! SCHA63x acquisition.
//!
//! Waits for the host's filter choice, runs the sensor startup, then samples
//! on a fixed tick until the host asks for a new startup. Camera triggers are
//! derived from the sample count; GNSS timepulses arrive on an EXTI line.

use super::{CAM_TRIGGER, DROPPED_SAMPLES, FILTER_CONFIG, SAMPLES, SENSOR_REPORT, STREAM_SETTINGS, UBX_TRIGGER};
use crate::peripherals::{EmbassyTiming, Scha63xSpi};
use core::sync::atomic::Ordering;
use defmt::{error, info, warn};
use embassy_futures::select::{select, Either};
use embassy_stm32::{
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    peripherals::{EXTI10, PD12, PE10},
    spi, Peri,
};
use embassy_time::{Duration, Ticker};
use scha63x::{Error, FilterConfig, RawSample, Scha63x, SensorVariant, StreamSettings};

/// Part fitted to the board
const SENSOR_VARIANT: SensorVariant = SensorVariant::X01;

/// Trigger lines around the sensor
pub struct SamplerClaims<'d> {
    pub cam_trigger: Peri<'d, PD12>,
    pub timepulse_pin: Peri<'d, PE10>,
    pub timepulse_line: Peri<'d, EXTI10>,
}

/// Macro to claim peripherals for SamplerApp and the timepulse task
#[macro_export]
macro_rules! claim_sampler {
    ($peripherals:expr) => {{
        $crate::apps::sampler::SamplerClaims {
            cam_trigger: $peripherals.PD12,
            timepulse_pin: $peripherals.PE10,
            timepulse_line: $peripherals.EXTI10,
        }
    }};
}

/// Tag a sample with pending trigger events and queue it for the stream.
///
/// Runs inside the sampling loop, so a full queue drops the sample instead of
/// waiting.
fn queue_sample(sample: &RawSample) {
    let mut sample = *sample;
    sample.cam_trigger = CAM_TRIGGER.swap(false, Ordering::Relaxed);
    sample.ubx_trigger = UBX_TRIGGER.swap(false, Ordering::Relaxed);
    if SAMPLES.try_send(sample).is_err() {
        DROPPED_SAMPLES.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SamplerApp<'d> {
    imu: Scha63x<Scha63xSpi<'d>, EmbassyTiming>,
    cam_trigger: Output<'d>,
}

impl<'d> SamplerApp<'d> {
    pub fn new(spi: Scha63xSpi<'d>, cam_trigger: Peri<'d, PD12>) -> Self {
        let mut imu = Scha63x::new(spi, EmbassyTiming, SENSOR_VARIANT);
        imu.set_sample_callback(queue_sample);
        Self {
            imu,
            cam_trigger: Output::new(cam_trigger, Level::Low, Speed::VeryHigh),
        }
    }

    pub async fn run(&mut self) -> ! {
        info!("Sampler waiting for filter configuration");
        let mut config = FILTER_CONFIG.wait().await;

        loop {
            self.start(&config).await;

            let settings = match select(STREAM_SETTINGS.wait(), FILTER_CONFIG.wait()).await {
                Either::First(settings) => settings,
                Either::Second(next) => {
                    // Host reconnected before streaming began
                    config = next;
                    continue;
                }
            };

            match select(self.stream(settings), FILTER_CONFIG.wait()).await {
                Either::First(e) => {
                    error!("Sampling stopped: {}", e);
                    config = FILTER_CONFIG.wait().await;
                }
                Either::Second(next) => config = next,
            }
        }
    }

    /// Run the startup sequence and publish its outcome.
    async fn start(&mut self, config: &FilterConfig) {
        info!("Starting SCHA63x with {}", config);
        let report = match self.imu.initialize(config).await.cloned() {
            Ok(report) => {
                info!(
                    "SCHA63x ready: serial {}, {} attempt(s)",
                    report.serial, report.attempts
                );
                Ok(report)
            }
            Err(e) => {
                error!("SCHA63x startup failed in {}: {}", self.imu.state(), e);
                Err(e)
            }
        };
        SENSOR_REPORT.signal(report);
    }

    /// Sample on every tick until the bus fails.
    async fn stream(&mut self, settings: StreamSettings) -> Error<spi::Error> {
        let period_us = 1_000_000 / settings.imu_trigger.max(1) as u64;
        let cam_every = settings.samples_per_cam_trigger();
        info!(
            "Sampling at {} Hz, camera every {} samples",
            settings.imu_trigger,
            cam_every.unwrap_or(0)
        );

        let mut ticker = Ticker::every(Duration::from_micros(period_us));
        let mut count: u32 = 0;
        loop {
            ticker.next().await;
            count = count.wrapping_add(1);

            let fire = cam_every.is_some_and(|every| count % every == 0);
            if fire {
                self.cam_trigger.set_high();
                CAM_TRIGGER.store(true, Ordering::Relaxed);
            }
            let result = self.imu.sample().await;
            self.cam_trigger.set_low();

            if let Err(e) = result {
                return e;
            }
        }
    }
}

/// Flag every rising edge of the GNSS timepulse for the next sample
#[embassy_executor::task]
pub async fn timepulse_task(pin: Peri<'static, PE10>, line: Peri<'static, EXTI10>) -> ! {
    let mut timepulse = ExtiInput::new(pin, line, Pull::Down);
    loop {
        timepulse.wait_for_rising_edge().await;
        if UBX_TRIGGER.swap(true, Ordering::Relaxed) {
            warn!("Timepulse arrived before the previous one was sampled");
        }
    }
}

#[embassy_executor::task]
pub async fn task(spi: Scha63xSpi<'static>, cam_trigger: Peri<'static, PD12>) -> ! {
    let mut app = SamplerApp::new(spi, cam_trigger);
    app.run().await
}
