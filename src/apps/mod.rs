//! Firmware applications for the SCHA63x acquisition board.
//!
//! The sampler owns the sensor and the stream owns the USB link; they meet
//! through the signals and the sample queue below.

use core::sync::atomic::{AtomicBool, AtomicU32};
use embassy_stm32::spi;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel, signal::Signal};
use scha63x::{Error, FilterConfig, InitReport, RawSample, StreamSettings};

/// Hardware CRC self-check against the frame codec
pub mod crc_check;
/// Sensor startup and timed sampling
pub mod sampler;
/// Host handshake and sample batch streaming
pub mod stream;

/// Samples buffered between the sampler and the USB stream
pub const SAMPLE_QUEUE_LEN: usize = 64;

/// Filter choice received from the host; starts a sensor startup
pub static FILTER_CONFIG: Signal<CriticalSectionRawMutex, FilterConfig> = Signal::new();

/// Outcome of the last startup
pub static SENSOR_REPORT: Signal<CriticalSectionRawMutex, Result<InitReport, Error<spi::Error>>> = Signal::new();

/// Streaming parameters from the host; starts sampling
pub static STREAM_SETTINGS: Signal<CriticalSectionRawMutex, StreamSettings> = Signal::new();

pub static SAMPLES: Channel<CriticalSectionRawMutex, RawSample, SAMPLE_QUEUE_LEN> = Channel::new();

/// Samples lost to a full queue since the last stream session started
pub static DROPPED_SAMPLES: AtomicU32 = AtomicU32::new(0);

/// Set when the camera trigger fires, consumed by the next sample
pub static CAM_TRIGGER: AtomicBool = AtomicBool::new(false);

/// Set on a GNSS timepulse edge, consumed by the next sample
pub static UBX_TRIGGER: AtomicBool = AtomicBool::new(false);
