#![cfg_attr(not(test), no_std)]

//! Driver and acquisition pipeline for the Murata SCHA63x dual-ASIC IMU.
//!
//! The SCHA63x packs two sensing chips behind one SPI bus:
//! - **UNO**: gyro X and the three accelerometer axes
//! - **DUE**: gyro Y and gyro Z, plus the cross-axis calibration NVM
//!
//! Every exchange is a 32-bit full-duplex frame with an 8-bit CRC, and every
//! response belongs to the *previous* request. This crate provides:
//! - [`frame`]: frame construction, CRC and field decoding
//! - [`sequencer`]: the multi-step startup handshake for both chips
//! - [`telemetry`]: pipelined sample and status read sequences
//! - [`conversion`] and [`cac`]: raw counts to physical units
//! - [`protocol`]: the host streaming protocol and sample ingestion
//!
//! Hardware access is injected through the [`Transport`] and [`Timing`] traits,
//! so the same driver runs on the board and against simulated chips in tests.

pub mod logging;

pub mod cac;
pub mod config;
pub mod conversion;
pub mod driver;
pub mod error;
pub mod frame;
pub mod interface;
pub mod protocol;
pub mod sequencer;
pub mod telemetry;

pub use cac::CrossAxisCompensation;
pub use config::{AccelFilter, FilterConfig, FilterRate, GyroFilter};
pub use conversion::{RealSample, SensorVariant};
pub use driver::{SampleCallback, Scha63x};
pub use error::Error;
pub use frame::{Frame, ReturnStatus};
pub use interface::{Chip, Link, Timing, Transport};
pub use protocol::{Handshake, Ingest, ProtocolError, Recorder, SensorInfo, Session, StreamSettings};
pub use sequencer::{InitReport, InitState, Sequencer, SerialNumber};
pub use telemetry::{RawSample, SensorStatus};
