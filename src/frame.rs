//! SCHA63x 32-bit SPI frame codec.
//!
//! Every SPI exchange with the sensor is one 32-bit word, sent MSB first:
//!
//! | Bits   | Field                                   |
//! |--------|-----------------------------------------|
//! | 31     | read (0) / write (1)                    |
//! | 30..26 | register address                        |
//! | 25..24 | return status (always zero on requests) |
//! | 23..8  | 16-bit payload                          |
//! | 7..0   | CRC-8 over bits 31..8                   |
//!
//! Everything here is pure and most of it is `const fn`, so the [`commands`]
//! table is computed at compile time.

use crate::config::{FilterConfig, FilterRate};

/// Feedback constant of the SCHA63x CRC-8.
const CRC_POLY: u8 = 0x1D;

/// Initial accumulator value of the SCHA63x CRC-8.
const CRC_SEED: u8 = 0xFF;

/// Fold one input bit into the CRC accumulator, MSB first.
pub const fn crc8(bit: bool, state: u8) -> u8 {
    let mut top = state & 0x80;
    if bit {
        top ^= 0x80;
    }
    let shifted = state << 1;
    if top != 0 {
        shifted ^ CRC_POLY
    } else {
        shifted
    }
}

/// CRC of a frame, computed over bits 31..8 and complemented.
///
/// The low byte of `word` is ignored, so this works for both a bare header
/// and a complete frame.
pub const fn frame_crc(word: u32) -> u8 {
    let mut crc = CRC_SEED;
    let mut bit = 31;
    while bit >= 8 {
        crc = crc8((word >> bit) & 1 == 1, crc);
        bit -= 1;
    }
    !crc
}

/// Build a request frame with a zero return-status field.
///
/// # Arguments
/// * `is_write` - Set the read/write bit
/// * `address` - Register address, masked to 5 bits
/// * `payload` - 16-bit data word
pub const fn build_frame(is_write: bool, address: u8, payload: u16) -> Frame {
    Frame::with_status(is_write, address, 0, payload)
}

/// Check the embedded CRC of a raw received word.
pub const fn verify_frame(word: u32) -> bool {
    Frame(word).crc_ok()
}

/// The 2-bit return status carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReturnStatus {
    /// Startup in progress (`IN`)
    Init,
    /// Normal operation (`OK`)
    Ok,
    /// Self-diagnostic flagged a problem in the previous cycle (`ST`)
    Stale,
    /// Self-diagnostic or SPI error (`ER`)
    Error,
}

impl ReturnStatus {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Init,
            1 => Self::Ok,
            2 => Self::Stale,
            _ => Self::Error,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Ok => 1,
            Self::Stale => 2,
            Self::Error => 3,
        }
    }

    /// Only `Ok` counts as healthy; `Stale` is treated like an error.
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Sub-field selectors for [`decode_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldKind {
    /// Signed 16-bit payload (bits 23..8)
    I16,
    /// Unsigned 16-bit payload (bits 23..8)
    U16,
    /// Signed low payload byte (bits 15..8)
    I8Lower,
    /// Signed high payload byte (bits 23..16)
    I8Upper,
}

/// Extract a payload sub-field. Never fails; the CRC is not checked here.
pub const fn decode_field(word: u32, kind: FieldKind) -> i32 {
    match kind {
        FieldKind::I16 => (word >> 8) as u16 as i16 as i32,
        FieldKind::U16 => ((word >> 8) & 0xFFFF) as i32,
        FieldKind::I8Lower => (word >> 8) as u8 as i8 as i32,
        FieldKind::I8Upper => (word >> 16) as u8 as i8 as i32,
    }
}

/// One 32-bit SPI frame, request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame(pub u32);

impl Frame {
    /// Build a frame with an explicit return-status field.
    ///
    /// Requests always carry `rs = 0`; a non-zero value is only meaningful
    /// when simulating the sensor's responses.
    pub const fn with_status(is_write: bool, address: u8, rs: u8, payload: u16) -> Self {
        let header = ((is_write as u32) << 31)
            | (((address & 0x1F) as u32) << 26)
            | (((rs & 0b11) as u32) << 24)
            | ((payload as u32) << 8);
        Self(header | frame_crc(header) as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_write(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    pub const fn address(self) -> u8 {
        ((self.0 >> 26) & 0x1F) as u8
    }

    pub const fn return_status(self) -> ReturnStatus {
        ReturnStatus::from_bits((self.0 >> 24) as u8)
    }

    pub const fn payload(self) -> u16 {
        (self.0 >> 8) as u16
    }

    pub const fn crc(self) -> u8 {
        self.0 as u8
    }

    pub const fn crc_ok(self) -> bool {
        frame_crc(self.0) == self.crc()
    }

    pub const fn field(self, kind: FieldKind) -> i32 {
        decode_field(self.0, kind)
    }

    /// A response is trusted when its CRC matches and its status is `Ok`.
    pub const fn is_trusted(self) -> bool {
        self.crc_ok() && self.return_status().is_ok()
    }
}

impl From<u32> for Frame {
    fn from(word: u32) -> Self {
        Self(word)
    }
}

impl From<Frame> for u32 {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

/// Register layout used by [`build_filter_frame`].
///
/// The two chips pack their gyro filter selectors differently, and the
/// accelerometer filter lives in its own register on UNO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterLayout {
    /// UNO `G_FILT_DYN`: D13..11 Rx2, D10..8 Rx
    UnoGyro,
    /// DUE `G_FILT_DYN`: D13..11 Rz2, D10..8 Rz, D5..3 Ry2, D2..0 Ry
    DueGyro,
    /// UNO `A_FILT_DYN`: D10..8 Ax, D6..4 Ay, D2..0 Az
    Accel,
}

impl FilterLayout {
    pub const fn register(self) -> u8 {
        match self {
            Self::UnoGyro | Self::DueGyro => registers::G_FILT_DYN,
            Self::Accel => registers::A_FILT_DYN,
        }
    }
}

const fn code(rate: FilterRate) -> u16 {
    (rate.code() & 0b111) as u16
}

/// Payload of a filter register write. Nominal-range bits stay zero.
pub const fn filter_payload(layout: FilterLayout, config: &FilterConfig) -> u16 {
    let gyro = &config.gyro;
    let accel = &config.accel;
    match layout {
        FilterLayout::UnoGyro => (code(gyro.rz2_rx2) << 11) | (code(gyro.rz_rx) << 8),
        FilterLayout::DueGyro => {
            (code(gyro.rz2_rx2) << 11) | (code(gyro.rz_rx) << 8) | (code(gyro.ry2) << 3) | code(gyro.ry)
        }
        FilterLayout::Accel => (code(accel.x) << 8) | (code(accel.y) << 4) | code(accel.z),
    }
}

/// Build the register write that applies `config` in the given layout.
pub const fn build_filter_frame(layout: FilterLayout, config: &FilterConfig) -> Frame {
    build_frame(true, layout.register(), filter_payload(layout, config))
}

/// SCHA63x register addresses (bank 0 unless noted).
pub mod registers {
    pub const RATE_X: u8 = 0x01;
    pub const RATE_Y: u8 = 0x03;
    /// Gyro Z shares the RATE_X slot on DUE.
    pub const RATE_Z: u8 = 0x01;
    pub const ACC_X: u8 = 0x04;
    pub const ACC_Y: u8 = 0x05;
    pub const ACC_Z: u8 = 0x06;
    pub const TEMP: u8 = 0x07;
    pub const SUMMARY_STATUS: u8 = 0x0E;
    pub const RATE_STATUS_1: u8 = 0x10;
    pub const RATE_STATUS_2: u8 = 0x11;
    pub const ACC_STATUS_1: u8 = 0x12;
    pub const COMMON_STATUS_1: u8 = 0x14;
    pub const COMMON_STATUS_2: u8 = 0x15;
    pub const G_FILT_DYN: u8 = 0x16;
    pub const RESCTRL: u8 = 0x18;
    pub const MODE: u8 = 0x19;
    pub const A_FILT_DYN: u8 = 0x1A;
    pub const TRC_2: u8 = 0x1C;
    pub const TRC_0: u8 = 0x1D;
    pub const TRC_1: u8 = 0x1E;
    pub const SELBANK: u8 = 0x1F;
}

/// Precomputed request frames.
pub mod commands {
    use super::{build_frame, registers::*, Frame};

    pub const READ_GYRO_X: Frame = build_frame(false, RATE_X, 0);
    pub const READ_GYRO_Y: Frame = build_frame(false, RATE_Y, 0);
    pub const READ_GYRO_Z: Frame = build_frame(false, RATE_Z, 0);
    pub const READ_ACC_X: Frame = build_frame(false, ACC_X, 0);
    pub const READ_ACC_Y: Frame = build_frame(false, ACC_Y, 0);
    pub const READ_ACC_Z: Frame = build_frame(false, ACC_Z, 0);
    pub const READ_TEMP: Frame = build_frame(false, TEMP, 0);

    pub const READ_SUMMARY_STATUS: Frame = build_frame(false, SUMMARY_STATUS, 0);
    pub const READ_RATE_STATUS_1: Frame = build_frame(false, RATE_STATUS_1, 0);
    pub const READ_RATE_STATUS_2: Frame = build_frame(false, RATE_STATUS_2, 0);
    pub const READ_ACC_STATUS_1: Frame = build_frame(false, ACC_STATUS_1, 0);
    pub const READ_COMMON_STATUS_1: Frame = build_frame(false, COMMON_STATUS_1, 0);
    pub const READ_COMMON_STATUS_2: Frame = build_frame(false, COMMON_STATUS_2, 0);

    pub const READ_TRC_0: Frame = build_frame(false, TRC_0, 0);
    pub const READ_TRC_1: Frame = build_frame(false, TRC_1, 0);
    pub const READ_TRC_2: Frame = build_frame(false, TRC_2, 0);

    pub const SOFT_RESET: Frame = build_frame(true, RESCTRL, 0x0001);
    pub const SET_EOI: Frame = build_frame(true, RESCTRL, 0x0002);
    pub const SELECT_BANK_0: Frame = build_frame(true, SELBANK, 0x0000);
    pub const SELECT_BANK_5: Frame = build_frame(true, SELBANK, 0x0005);
    pub const NORMAL_MODE: Frame = build_frame(true, MODE, 0x0000);

    pub const READ_MODE: Frame = build_frame(false, MODE, 0);
    pub const UNLOCK_010: Frame = build_frame(true, MODE, 0x0010);
    pub const UNLOCK_001: Frame = build_frame(true, MODE, 0x0008);
    pub const UNLOCK_100: Frame = build_frame(true, MODE, 0x0020);

    /// Bank 5 NVM registers holding the cross-axis compensation pairs.
    ///
    /// The last register is read twice so its value comes back on the
    /// final exchange.
    pub const CAC_READS: [Frame; 10] = [
        build_frame(false, 0x0B, 0),
        build_frame(false, 0x13, 0),
        build_frame(false, 0x14, 0),
        build_frame(false, 0x15, 0),
        build_frame(false, 0x16, 0),
        build_frame(false, 0x17, 0),
        build_frame(false, 0x18, 0),
        build_frame(false, 0x1B, 0),
        build_frame(false, 0x1C, 0),
        build_frame(false, 0x1C, 0),
    ];
}
