//! Filter configuration for the SCHA63x

/// Low-pass filter selector for one axis.
///
/// `Other` carries any other 3-bit code through untouched; the sensor decides
/// what it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterRate {
    Hz13,
    Hz20,
    #[default]
    Hz46,
    Hz200,
    Hz300,
    Other(u8),
}

impl FilterRate {
    /// Register code for this rate
    pub const fn code(self) -> u8 {
        match self {
            Self::Hz13 => 0b000,
            Self::Hz20 => 0b001,
            Self::Hz46 => 0b010,
            Self::Hz200 => 0b011,
            Self::Hz300 => 0b100,
            Self::Other(code) => code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            0b000 => Self::Hz13,
            0b001 => Self::Hz20,
            0b010 => Self::Hz46,
            0b011 => Self::Hz200,
            0b100 => Self::Hz300,
            other => Self::Other(other),
        }
    }

    /// Whether this rate belongs to the short-settle group (13 Hz and 20 Hz)
    pub const fn is_low(self) -> bool {
        matches!(self, Self::Hz13 | Self::Hz20)
    }
}

/// Accelerometer filter selectors, all written to UNO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccelFilter {
    pub x: FilterRate,
    pub y: FilterRate,
    pub z: FilterRate,
}

/// Gyro filter selectors.
///
/// The first two fields are shared between the chips: UNO reads them as the
/// X axis pair, DUE as the Z axis pair. `ry2` and `ry` only exist on DUE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GyroFilter {
    pub rz2_rx2: FilterRate,
    pub rz_rx: FilterRate,
    pub ry2: FilterRate,
    pub ry: FilterRate,
}

/// Complete filter configuration applied during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FilterConfig {
    pub accel: AccelFilter,
    pub gyro: GyroFilter,
}

/// Settle time after applying low filter rates, in milliseconds.
pub const SETTLE_LOW_MS: u32 = 405;
/// Settle time after applying any other filter rate, in milliseconds.
pub const SETTLE_HIGH_MS: u32 = 525;

impl FilterConfig {
    /// Same rate on every axis of both sensors
    pub const fn uniform(rate: FilterRate) -> Self {
        Self {
            accel: AccelFilter { x: rate, y: rate, z: rate },
            gyro: GyroFilter {
                rz2_rx2: rate,
                rz_rx: rate,
                ry2: rate,
                ry: rate,
            },
        }
    }

    /// Codes in wire order: Ax, Ay, Az, Rz2_Rx2, Rz_Rx, Ry2, Ry
    pub const fn codes(&self) -> [u8; 7] {
        [
            self.accel.x.code(),
            self.accel.y.code(),
            self.accel.z.code(),
            self.gyro.rz2_rx2.code(),
            self.gyro.rz_rx.code(),
            self.gyro.ry2.code(),
            self.gyro.ry.code(),
        ]
    }

    pub const fn from_codes(codes: [u8; 7]) -> Self {
        Self {
            accel: AccelFilter {
                x: FilterRate::from_code(codes[0]),
                y: FilterRate::from_code(codes[1]),
                z: FilterRate::from_code(codes[2]),
            },
            gyro: GyroFilter {
                rz2_rx2: FilterRate::from_code(codes[3]),
                rz_rx: FilterRate::from_code(codes[4]),
                ry2: FilterRate::from_code(codes[5]),
                ry: FilterRate::from_code(codes[6]),
            },
        }
    }

    /// Wait between filter writes and the first end-of-initialization attempt.
    ///
    /// Only when every axis runs at 13 Hz or 20 Hz is the short settle time enough.
    pub fn settle_time_ms(&self) -> u32 {
        if self.codes().iter().all(|&code| FilterRate::from_code(code).is_low()) {
            SETTLE_LOW_MS
        } else {
            SETTLE_HIGH_MS
        }
    }
}
