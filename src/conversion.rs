//! Raw counts to physical units

use crate::cac::CrossAxisCompensation;
use crate::telemetry::RawSample;

/// Accelerometer sensitivity shared by every variant, LSB/g.
pub const ACCEL_LSB_PER_G: f32 = 4905.0;

/// Temperature sensitivity, LSB/°C around the 25 °C offset.
pub const TEMP_LSB_PER_C: f32 = 30.0;

/// SCHA63x part variant; the variants differ only in gyro sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorVariant {
    /// SCHA634-D01 or SCHA63T-K01
    #[default]
    X01,
    /// SCHA634-D02
    D02,
    /// SCHA634-D03 or SCHA63T-K03
    X03,
}

impl SensorVariant {
    /// Gyro sensitivity per axis in LSB/(°/s)
    pub const fn gyro_lsb_per_dps(self) -> [f32; 3] {
        match self {
            Self::X01 => [160.0, 160.0, 160.0],
            Self::D02 => [160.0, 160.0, 80.0],
            Self::X03 => [80.0, 80.0, 80.0],
        }
    }
}

/// A sample in physical units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RealSample {
    /// Acceleration in g (X, Y, Z)
    pub accel: [f32; 3],
    /// Angular rate in °/s (X, Y, Z)
    pub gyro: [f32; 3],
    /// DUE temperature in °C
    pub temp_due: f32,
    /// UNO temperature in °C
    pub temp_uno: f32,
}

pub fn temperature(lsb: i16) -> f32 {
    25.0 + f32::from(lsb) / TEMP_LSB_PER_C
}

/// Scale a raw sample using the variant's sensitivities
pub fn convert(raw: &RawSample, variant: SensorVariant) -> RealSample {
    let gyro_sens = variant.gyro_lsb_per_dps();
    RealSample {
        accel: [
            f32::from(raw.accel[0]) / ACCEL_LSB_PER_G,
            f32::from(raw.accel[1]) / ACCEL_LSB_PER_G,
            f32::from(raw.accel[2]) / ACCEL_LSB_PER_G,
        ],
        gyro: [
            f32::from(raw.gyro[0]) / gyro_sens[0],
            f32::from(raw.gyro[1]) / gyro_sens[1],
            f32::from(raw.gyro[2]) / gyro_sens[2],
        ],
        temp_due: temperature(raw.temp_due),
        temp_uno: temperature(raw.temp_uno),
    }
}

/// Scale, then apply cross-axis compensation
pub fn convert_compensated(raw: &RawSample, variant: SensorVariant, cac: &CrossAxisCompensation) -> RealSample {
    let mut real = convert(raw, variant);
    cac.apply(&mut real);
    real
}
