//! Driver error types

/// Errors raised by the SCHA63x driver.
///
/// Frame integrity problems are not errors: a bad CRC or a non-OK return
/// status is reported through the flags on [`RawSample`](crate::RawSample)
/// and [`SensorStatus`](crate::SensorStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The transport failed to complete an exchange
    Bus(E),
    /// DUE did not confirm test mode, so calibration could not be read
    TestModeActivation,
    /// At least one chip still reported a non-OK status after every startup attempt
    StatusNotOk { uno: bool, due: bool },
    /// Sampling was requested before a sample callback was registered
    NoSampleCallback,
}

impl<E> Error<E> {
    /// Whether the error came from initialization rather than the bus
    pub const fn is_init_failure(&self) -> bool {
        matches!(self, Self::TestModeActivation | Self::StatusNotOk { .. })
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus error: {:?}", e),
            Self::TestModeActivation => write!(f, "test mode activation failed"),
            Self::StatusNotOk { uno, due } => write!(f, "status not OK after startup (UNO failed: {}, DUE failed: {})", uno, due),
            Self::NoSampleCallback => write!(f, "no sample callback registered"),
        }
    }
}
