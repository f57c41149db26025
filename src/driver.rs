//! SCHA63x driver context
//!
//! Owns the transport and timing provider together with everything learned
//! during startup (serial number and cross-axis compensation) and the
//! optional sampling callback.

use crate::cac::CrossAxisCompensation;
use crate::config::FilterConfig;
use crate::conversion::{self, RealSample, SensorVariant};
use crate::error::Error;
use crate::interface::{Chip, Timing, Transport};
use crate::sequencer::{InitReport, InitState, Sequencer, SerialNumber};
use crate::telemetry::{self, RawSample, SensorStatus};
use crate::log_warn;

/// Receives every sample read through [`Scha63x::sample`].
///
/// Runs inline with the sampling loop, so it must be short and must not block.
pub type SampleCallback = fn(&RawSample);

/// SCHA63x driver
///
/// # Example
///
/// ```rust,ignore
/// let mut imu = Scha63x::new(spi, timing, SensorVariant::X01);
/// let report = imu.initialize(&FilterConfig::default()).await?;
/// imu.set_sample_callback(push_sample);
/// loop {
///     ticker.next().await;
///     imu.sample().await?;
/// }
/// ```
pub struct Scha63x<T, D> {
    transport: T,
    timing: D,
    variant: SensorVariant,
    report: Option<InitReport>,
    state: InitState,
    callback: Option<SampleCallback>,
}

impl<T: Transport, D: Timing> Scha63x<T, D> {
    pub fn new(transport: T, timing: D, variant: SensorVariant) -> Self {
        Self {
            transport,
            timing,
            variant,
            report: None,
            state: InitState::Reset,
            callback: None,
        }
    }

    /// Run the startup sequence and keep its results.
    ///
    /// A previous report is discarded before starting, so a failed
    /// re-initialization leaves the driver uninitialized.
    pub async fn initialize(&mut self, config: &FilterConfig) -> Result<&InitReport, Error<T::Error>> {
        self.report = None;
        let mut sequencer = Sequencer::new(&mut self.transport, &mut self.timing);
        let result = sequencer.run(config).await;
        self.state = sequencer.state();
        let report = result?;
        Ok(self.report.insert(report))
    }

    /// State reached by the last startup run
    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.report.is_some()
    }

    pub fn report(&self) -> Option<&InitReport> {
        self.report.as_ref()
    }

    pub fn serial_number(&self) -> Option<&SerialNumber> {
        self.report.as_ref().map(|report| &report.serial)
    }

    pub fn cac(&self) -> Option<&CrossAxisCompensation> {
        self.report.as_ref().map(|report| &report.cac)
    }

    pub fn variant(&self) -> SensorVariant {
        self.variant
    }

    /// Read one sample stamped with the current time
    pub async fn read_sample(&mut self) -> Result<RawSample, Error<T::Error>> {
        let timestamp_us = self.timing.now_us() as i64;
        telemetry::read_sample(&mut self.transport, timestamp_us)
            .await
            .map_err(Error::Bus)
    }

    pub async fn read_status(&mut self, chip: Chip) -> Result<SensorStatus, Error<T::Error>> {
        telemetry::read_status(&mut self.transport, chip)
            .await
            .map_err(Error::Bus)
    }

    /// Read one sample and convert it, compensated when calibration is known
    pub async fn read_real(&mut self) -> Result<RealSample, Error<T::Error>> {
        let raw = self.read_sample().await?;
        Ok(match self.cac() {
            Some(cac) => conversion::convert_compensated(&raw, self.variant, cac),
            None => conversion::convert(&raw, self.variant),
        })
    }

    /// Replace the sampling callback
    pub fn set_sample_callback(&mut self, callback: SampleCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_sample_callback(&mut self) {
        self.callback = None;
    }

    pub fn has_sample_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Read one sample and hand it to the registered callback.
    ///
    /// Fails with [`Error::NoSampleCallback`] without touching the bus when
    /// no callback is registered.
    pub async fn sample(&mut self) -> Result<RawSample, Error<T::Error>> {
        let Some(callback) = self.callback else {
            log_warn!("SCHA63x sample requested without a callback");
            return Err(Error::NoSampleCallback);
        };
        let sample = self.read_sample().await?;
        callback(&sample);
        Ok(sample)
    }

    /// Borrow the timing provider, e.g. to pace the sampling loop
    pub fn timing(&mut self) -> &mut D {
        &mut self.timing
    }

    /// Give back the transport and timing provider
    pub fn release(self) -> (T, D) {
        (self.transport, self.timing)
    }
}
