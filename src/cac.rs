//! Cross-axis compensation (CAC)
//!
//! Each SCHA63x carries a factory-measured linear correction for mechanical
//! coupling between its sensing axes. The coefficients live in DUE's bank 5
//! NVM, readable only in test mode, packed as nine pairs of signed bytes.

use crate::conversion::RealSample;
use crate::frame::FieldKind;

/// Scale of one coefficient LSB.
const CAC_LSB: f32 = 4096.0;

/// Number of 16-bit NVM words holding the coefficients.
pub const CAC_WORDS: usize = 9;

/// Gyro (`c`) and accelerometer (`b`) compensation matrices, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrossAxisCompensation {
    pub c: [[f32; 3]; 3],
    pub b: [[f32; 3]; 3],
}

impl Default for CrossAxisCompensation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CrossAxisCompensation {
    pub const IDENTITY: Self = Self {
        c: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        b: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Decode the nine NVM response words.
    ///
    /// Word `n` carries coefficient `2n` in its low payload byte and `2n + 1`
    /// in its high payload byte, in the order `cxx, cxy, ..., czz, bxx, ..., bzz`.
    /// Diagonal terms are stored as an offset from unity gain.
    pub fn from_words(words: &[u32; CAC_WORDS]) -> Self {
        let mut flat = [0.0f32; 18];
        for (pair, &word) in flat.chunks_exact_mut(2).zip(words.iter()) {
            pair[0] = coefficient(word, FieldKind::I8Lower);
            pair[1] = coefficient(word, FieldKind::I8Upper);
        }
        let mut cac = Self::from_array(&flat);
        for axis in 0..3 {
            cac.c[axis][axis] += 1.0;
            cac.b[axis][axis] += 1.0;
        }
        cac
    }

    /// Coefficients in wire order: `c` row-major, then `b` row-major
    pub fn to_array(&self) -> [f32; 18] {
        let mut out = [0.0f32; 18];
        for (slot, value) in out
            .iter_mut()
            .zip(self.c.iter().flatten().chain(self.b.iter().flatten()))
        {
            *slot = *value;
        }
        out
    }

    pub fn from_array(values: &[f32; 18]) -> Self {
        let mut cac = Self {
            c: [[0.0; 3]; 3],
            b: [[0.0; 3]; 3],
        };
        for (i, &value) in values.iter().enumerate() {
            let (matrix, index) = if i < 9 { (&mut cac.c, i) } else { (&mut cac.b, i - 9) };
            matrix[index / 3][index % 3] = value;
        }
        cac
    }

    pub fn compensate_accel(&self, accel: [f32; 3]) -> [f32; 3] {
        mul(&self.b, accel)
    }

    pub fn compensate_gyro(&self, gyro: [f32; 3]) -> [f32; 3] {
        mul(&self.c, gyro)
    }

    /// Apply both matrices to a sample already scaled to physical units
    pub fn apply(&self, sample: &mut RealSample) {
        sample.accel = self.compensate_accel(sample.accel);
        sample.gyro = self.compensate_gyro(sample.gyro);
    }
}

fn coefficient(word: u32, kind: FieldKind) -> f32 {
    crate::frame::decode_field(word, kind) as f32 / CAC_LSB
}

fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}
