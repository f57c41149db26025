//! Host streaming protocol.
//!
//! A fixed seven-step exchange between the device and the recording host:
//!
//! | Step | Direction     | Content                                      |
//! |------|---------------|----------------------------------------------|
//! | 1    | device → host | `"hello"`, echoed back by the host           |
//! | 2    | host → device | [`FilterConfig`]                             |
//! | 3    | device → host | [`SensorInfo`] with status and serial number |
//! | 4    | host → device | [`SensorInfo`] with [`StreamSettings`] set   |
//! | 5    | device → host | [`CrossAxisCompensation`]                    |
//! | 6    | device → host | first timestamp as ASCII decimal, echoed     |
//! | 7    | device → host | batches of [`RawSample`], forever            |
//!
//! Startup messages travel in zero-padded [`STARTUP_PACKET_LEN`] byte
//! packets. All multi-byte fields are little-endian with the padding of the
//! C structures used by existing hosts, so both ends agree on any platform.

use core::fmt::Write;

use embassy_futures::select::{select, Either};
use heapless::String;

use crate::cac::CrossAxisCompensation;
use crate::config::FilterConfig;
use crate::conversion::{self, SensorVariant};
use crate::error::Error;
use crate::interface::{Link, Timing};
use crate::sequencer::SerialNumber;
use crate::telemetry::RawSample;
use crate::{log_debug, log_info, log_warn};

/// Ping payload
pub const PING: &[u8] = b"hello";
/// Size of every startup packet
pub const STARTUP_PACKET_LEN: usize = 100;
/// Interval between ping attempts
pub const PING_RETRY_MS: u32 = 200;
/// Length of the serial number field, including its NUL terminator
pub const SERIAL_FIELD_LEN: usize = 14;
/// Largest batch a single message may carry
pub const MAX_BATCH: usize = 16;
/// Cameras fired by one camera trigger
pub const CAMERAS_PER_TRIGGER: usize = 2;

/// Startup completed, both chips report OK
pub const STATUS_OK: i32 = 0;
/// DUE refused test mode, calibration unavailable
pub const STATUS_TEST_MODE_ACTIVATION: i32 = -1;
/// A chip still reported a non-OK status after every startup attempt
pub const STATUS_NOT_OK: i32 = -2;
/// The bus failed before startup could finish
pub const STATUS_BUS_FAULT: i32 = -3;

/// Wire status code for a startup failure
pub const fn status_code<E>(error: &Error<E>) -> i32 {
    match error {
        Error::TestModeActivation => STATUS_TEST_MODE_ACTIVATION,
        Error::StatusNotOk { .. } => STATUS_NOT_OK,
        Error::Bus(_) | Error::NoSampleCallback => STATUS_BUS_FAULT,
    }
}

/// Malformed message contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    /// Fewer bytes than the structure needs
    ShortPacket { expected: usize, actual: usize },
    /// Timestamp message was not an ASCII decimal number
    InvalidTimestamp,
}

/// Handshake and streaming failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError<E> {
    /// The link failed
    Link(E),
    Wire(WireError),
    /// The peer echoed something other than what was sent
    EchoMismatch,
    /// More samples than fit in one batch message
    BatchTooLarge { max: usize, actual: usize },
}

impl<E> From<WireError> for ProtocolError<E> {
    fn from(error: WireError) -> Self {
        Self::Wire(error)
    }
}

/// Fixed-size little-endian encoding of a protocol structure
pub trait WireFormat: Sized {
    const LEN: usize;

    /// Write exactly `LEN` bytes into `out[..LEN]`
    fn encode(&self, out: &mut [u8]);

    /// Decode from `bytes[..LEN]`; the length is checked by [`decode`]
    fn decode_unchecked(bytes: &[u8]) -> Self;
}

/// Decode a structure from the front of `bytes`
pub fn decode<W: WireFormat>(bytes: &[u8]) -> Result<W, WireError> {
    if bytes.len() < W::LEN {
        return Err(WireError::ShortPacket {
            expected: W::LEN,
            actual: bytes.len(),
        });
    }
    Ok(W::decode_unchecked(&bytes[..W::LEN]))
}

fn read_i16(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_le_bytes(raw)
}

/// Seven `u16` codes in the order Ax, Ay, Az, Rz2_Rx2, Rz_Rx, Ry2, Ry
impl WireFormat for FilterConfig {
    const LEN: usize = 14;

    fn encode(&self, out: &mut [u8]) {
        for (chunk, code) in out[..Self::LEN].chunks_exact_mut(2).zip(self.codes()) {
            chunk.copy_from_slice(&u16::from(code).to_le_bytes());
        }
    }

    fn decode_unchecked(bytes: &[u8]) -> Self {
        let mut codes = [0u8; 7];
        for (i, code) in codes.iter_mut().enumerate() {
            *code = read_u16(bytes, i * 2) as u8;
        }
        FilterConfig::from_codes(codes)
    }
}

/// Eighteen `f32`: `cxx..czz` then `bxx..bzz`
impl WireFormat for CrossAxisCompensation {
    const LEN: usize = 72;

    fn encode(&self, out: &mut [u8]) {
        for (chunk, value) in out[..Self::LEN].chunks_exact_mut(4).zip(self.to_array()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn decode_unchecked(bytes: &[u8]) -> Self {
        let mut values = [0.0f32; 18];
        for (i, value) in values.iter_mut().enumerate() {
            *value = read_f32(bytes, i * 4);
        }
        CrossAxisCompensation::from_array(&values)
    }
}

/// `i64` timestamp, eight `i16`, four `bool`, four bytes of padding
impl WireFormat for RawSample {
    const LEN: usize = 32;

    fn encode(&self, out: &mut [u8]) {
        let out = &mut out[..Self::LEN];
        out[0..8].copy_from_slice(&self.timestamp_us.to_le_bytes());
        let values = [
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
            self.temp_due,
            self.temp_uno,
        ];
        for (chunk, value) in out[8..24].chunks_exact_mut(2).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out[24] = self.error_due as u8;
        out[25] = self.error_uno as u8;
        out[26] = self.cam_trigger as u8;
        out[27] = self.ubx_trigger as u8;
        out[28..32].fill(0);
    }

    fn decode_unchecked(bytes: &[u8]) -> Self {
        RawSample {
            timestamp_us: read_i64(bytes, 0),
            accel: [read_i16(bytes, 8), read_i16(bytes, 10), read_i16(bytes, 12)],
            gyro: [read_i16(bytes, 14), read_i16(bytes, 16), read_i16(bytes, 18)],
            temp_due: read_i16(bytes, 20),
            temp_uno: read_i16(bytes, 22),
            error_due: bytes[24] != 0,
            error_uno: bytes[25] != 0,
            cam_trigger: bytes[26] != 0,
            ubx_trigger: bytes[27] != 0,
        }
    }
}

/// Streaming parameters chosen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StreamSettings {
    /// Samples per batch message
    pub buffer: i32,
    /// IMU sampling rate in Hz
    pub imu_trigger: i32,
    /// Camera trigger rate in Hz
    pub cam_trigger: i32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer: 4,
            imu_trigger: 500,
            cam_trigger: 30,
        }
    }
}

impl StreamSettings {
    /// Batch length clamped to what one message can carry
    pub fn batch_len(&self) -> usize {
        (self.buffer.max(1) as usize).min(MAX_BATCH)
    }

    /// IMU samples between camera triggers, or `None` when cameras are off
    pub fn samples_per_cam_trigger(&self) -> Option<u32> {
        if self.cam_trigger <= 0 || self.imu_trigger <= 0 {
            return None;
        }
        Some(((self.imu_trigger / self.cam_trigger).max(1)) as u32)
    }
}

/// Device status block; the device sends it with zeroed settings and the host
/// returns it with the settings filled in.
///
/// Layout: `i32` status, 14-byte NUL-terminated serial, 2 padding bytes,
/// then `i32` buffer, imu trigger and cam trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorInfo {
    pub status: i32,
    pub serial: SerialNumber,
    pub settings: Option<StreamSettings>,
}

impl SensorInfo {
    pub fn ready(serial: SerialNumber) -> Self {
        Self {
            status: STATUS_OK,
            serial,
            settings: None,
        }
    }

    /// Failed startup; the status carries the cause and the serial stays empty
    pub fn failed<E>(error: &Error<E>) -> Self {
        Self {
            status: status_code(error),
            serial: SerialNumber::default(),
            settings: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

impl WireFormat for SensorInfo {
    const LEN: usize = 32;

    fn encode(&self, out: &mut [u8]) {
        let out = &mut out[..Self::LEN];
        out.fill(0);
        out[0..4].copy_from_slice(&self.status.to_le_bytes());
        let serial = self.serial.as_str().as_bytes();
        let len = serial.len().min(SERIAL_FIELD_LEN - 1);
        out[4..4 + len].copy_from_slice(&serial[..len]);
        let settings = self.settings.unwrap_or(StreamSettings {
            buffer: 0,
            imu_trigger: 0,
            cam_trigger: 0,
        });
        out[20..24].copy_from_slice(&settings.buffer.to_le_bytes());
        out[24..28].copy_from_slice(&settings.imu_trigger.to_le_bytes());
        out[28..32].copy_from_slice(&settings.cam_trigger.to_le_bytes());
    }

    fn decode_unchecked(bytes: &[u8]) -> Self {
        let field = &bytes[4..4 + SERIAL_FIELD_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let serial = core::str::from_utf8(&field[..end])
            .ok()
            .and_then(SerialNumber::parse)
            .unwrap_or_default();
        let settings = StreamSettings {
            buffer: read_i32(bytes, 20),
            imu_trigger: read_i32(bytes, 24),
            cam_trigger: read_i32(bytes, 28),
        };
        Self {
            status: read_i32(bytes, 0),
            serial,
            settings: (settings.buffer != 0).then_some(settings),
        }
    }
}

/// Longest decimal `u64` plus NUL
const TIMESTAMP_TEXT_LEN: usize = 21;

/// Parse a NUL-terminated ASCII decimal timestamp.
///
/// Sample timestamps are `i64`, so anything above `i64::MAX` is rejected.
pub fn parse_timestamp(bytes: &[u8]) -> Result<u64, WireError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..end])
        .ok()
        .and_then(|text| text.trim().parse::<u64>().ok())
        .filter(|&timestamp| timestamp <= i64::MAX as u64)
        .ok_or(WireError::InvalidTimestamp)
}

fn format_timestamp(timestamp_us: u64, out: &mut [u8]) -> usize {
    let mut text: String<TIMESTAMP_TEXT_LEN> = String::new();
    let written = write!(text, "{}", timestamp_us);
    debug_assert!(written.is_ok(), "a u64 never needs more than 20 digits");
    let bytes = text.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out[bytes.len()] = 0;
    bytes.len()
}

/// Null-terminated string comparison, as the C peers compare ping packets
fn is_ping(packet: &[u8]) -> bool {
    let end = packet.iter().position(|&b| b == 0).unwrap_or(packet.len());
    &packet[..end] == PING
}

async fn send_startup<L: Link, W: WireFormat>(link: &mut L, value: &W) -> Result<(), ProtocolError<L::Error>> {
    let mut packet = [0u8; STARTUP_PACKET_LEN];
    value.encode(&mut packet);
    link.send(&packet).await.map_err(ProtocolError::Link)
}

async fn receive_startup<L: Link, W: WireFormat>(link: &mut L) -> Result<W, ProtocolError<L::Error>> {
    let mut packet = [0u8; STARTUP_PACKET_LEN];
    let len = link.receive(&mut packet).await.map_err(ProtocolError::Link)?;
    Ok(decode(&packet[..len])?)
}

/// Device end of the protocol
pub struct Handshake<L, D> {
    link: L,
    timing: D,
}

impl<L: Link, D: Timing> Handshake<L, D> {
    pub fn new(link: L, timing: D) -> Self {
        Self { link, timing }
    }

    /// Step 1: send `"hello"` every [`PING_RETRY_MS`] until the host echoes it.
    ///
    /// Returns the number of pings sent.
    pub async fn ping(&mut self) -> Result<u32, ProtocolError<L::Error>> {
        let mut ping = [0u8; STARTUP_PACKET_LEN];
        ping[..PING.len()].copy_from_slice(PING);
        let mut reply = [0u8; STARTUP_PACKET_LEN];

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.link.send(&ping).await.map_err(ProtocolError::Link)?;

            match select(self.link.receive(&mut reply), self.timing.wait_ms(PING_RETRY_MS)).await {
                Either::First(Ok(len)) if is_ping(&reply[..len]) => {
                    log_info!("Host answered ping after {} attempt(s)", attempts);
                    return Ok(attempts);
                }
                Either::First(Ok(len)) => log_debug!("Ignoring {} byte non-ping reply", len),
                Either::First(Err(e)) => return Err(ProtocolError::Link(e)),
                Either::Second(()) => {}
            }
        }
    }

    /// Step 2
    pub async fn receive_filter_config(&mut self) -> Result<FilterConfig, ProtocolError<L::Error>> {
        receive_startup(&mut self.link).await
    }

    /// Steps 3 and 4: report status, receive the streaming settings
    pub async fn exchange_info(&mut self, info: &SensorInfo) -> Result<StreamSettings, ProtocolError<L::Error>> {
        send_startup(&mut self.link, info).await?;
        let reply: SensorInfo = receive_startup(&mut self.link).await?;
        let settings = reply.settings.unwrap_or_else(|| {
            log_warn!("Host sent no stream settings, using defaults");
            StreamSettings::default()
        });
        Ok(settings)
    }

    /// Step 5
    pub async fn send_cac(&mut self, cac: &CrossAxisCompensation) -> Result<(), ProtocolError<L::Error>> {
        send_startup(&mut self.link, cac).await
    }

    /// Step 6: send the first timestamp and wait for the echo
    pub async fn sync_timestamp(&mut self, timestamp_us: u64) -> Result<(), ProtocolError<L::Error>> {
        let mut packet = [0u8; STARTUP_PACKET_LEN];
        format_timestamp(timestamp_us, &mut packet);
        self.link.send(&packet).await.map_err(ProtocolError::Link)?;

        let mut reply = [0u8; STARTUP_PACKET_LEN];
        let len = self.link.receive(&mut reply).await.map_err(ProtocolError::Link)?;
        if parse_timestamp(&reply[..len])? != timestamp_us {
            return Err(ProtocolError::EchoMismatch);
        }
        Ok(())
    }

    /// Step 7: send one batch
    pub async fn send_batch(&mut self, samples: &[RawSample]) -> Result<(), ProtocolError<L::Error>> {
        if samples.len() > MAX_BATCH {
            return Err(ProtocolError::BatchTooLarge {
                max: MAX_BATCH,
                actual: samples.len(),
            });
        }
        let mut packet = [0u8; MAX_BATCH * RawSample::LEN];
        for (chunk, sample) in packet.chunks_exact_mut(RawSample::LEN).zip(samples) {
            sample.encode(chunk);
        }
        self.link
            .send(&packet[..samples.len() * RawSample::LEN])
            .await
            .map_err(ProtocolError::Link)
    }

    pub fn timing(&mut self) -> &mut D {
        &mut self.timing
    }

    pub fn release(self) -> (L, D) {
        (self.link, self.timing)
    }
}

/// Camera frame event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameData {
    pub t: f64,
    pub camera_index: usize,
}

/// Sink for converted samples
pub trait Recorder {
    fn add_accelerometer(&mut self, t: f64, x: f32, y: f32, z: f32);

    fn add_gyroscope(&mut self, t: f64, x: f32, y: f32, z: f32);

    fn add_frame_group(&mut self, t: f64, frames: &[FrameData]);
}

/// Batch decoder and converter for the host side of step 7
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ingest {
    pub first_timestamp_us: u64,
    pub batch_len: usize,
    pub variant: SensorVariant,
    pub cac: CrossAxisCompensation,
}

impl Ingest {
    /// Decode one batch message and forward it to `recorder`.
    ///
    /// A batch whose first timestamp is zero is an empty send and is dropped.
    /// Returns the number of samples recorded.
    pub fn process<R: Recorder>(&self, packet: &[u8], recorder: &mut R) -> Result<usize, WireError> {
        let expected = self.batch_len * RawSample::LEN;
        if packet.len() < expected {
            return Err(WireError::ShortPacket {
                expected,
                actual: packet.len(),
            });
        }

        let mut recorded = 0;
        for (i, chunk) in packet[..expected].chunks_exact(RawSample::LEN).enumerate() {
            let raw = RawSample::decode_unchecked(chunk);
            if i == 0 && raw.timestamp_us == 0 {
                return Ok(0);
            }
            // Widened so garbled timestamps cannot overflow
            let t = (i128::from(raw.timestamp_us) - i128::from(self.first_timestamp_us)) as f64 / 1e6;
            let real = conversion::convert_compensated(&raw, self.variant, &self.cac);

            recorder.add_gyroscope(t, real.gyro[0], real.gyro[1], real.gyro[2]);
            recorder.add_accelerometer(t, real.accel[0], real.accel[1], real.accel[2]);
            if raw.cam_trigger {
                let mut group = [FrameData { t, camera_index: 0 }; CAMERAS_PER_TRIGGER];
                for (index, frame) in group.iter_mut().enumerate() {
                    frame.camera_index = index;
                }
                recorder.add_frame_group(t, &group);
            }
            recorded += 1;
        }
        Ok(recorded)
    }
}

/// Host end of the protocol
pub struct Session<L> {
    link: L,
}

impl<L: Link> Session<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Step 1: wait for `"hello"` and echo it
    pub async fn accept_ping(&mut self) -> Result<(), ProtocolError<L::Error>> {
        let mut packet = [0u8; STARTUP_PACKET_LEN];
        loop {
            let len = self.link.receive(&mut packet).await.map_err(ProtocolError::Link)?;
            if is_ping(&packet[..len]) {
                return self.link.send(&packet).await.map_err(ProtocolError::Link);
            }
        }
    }

    /// Step 2
    pub async fn send_filter_config(&mut self, config: &FilterConfig) -> Result<(), ProtocolError<L::Error>> {
        send_startup(&mut self.link, config).await
    }

    /// Step 3
    pub async fn receive_info(&mut self) -> Result<SensorInfo, ProtocolError<L::Error>> {
        receive_startup(&mut self.link).await
    }

    /// Step 4: return the device's info block with the settings filled in
    pub async fn send_stream_settings(
        &mut self,
        info: &SensorInfo,
        settings: StreamSettings,
    ) -> Result<(), ProtocolError<L::Error>> {
        let reply = SensorInfo {
            settings: Some(settings),
            ..info.clone()
        };
        send_startup(&mut self.link, &reply).await
    }

    /// Step 5
    pub async fn receive_cac(&mut self) -> Result<CrossAxisCompensation, ProtocolError<L::Error>> {
        receive_startup(&mut self.link).await
    }

    /// Step 6: receive the first timestamp and echo it
    pub async fn receive_timestamp(&mut self) -> Result<u64, ProtocolError<L::Error>> {
        let mut packet = [0u8; STARTUP_PACKET_LEN];
        let len = self.link.receive(&mut packet).await.map_err(ProtocolError::Link)?;
        let timestamp = parse_timestamp(&packet[..len])?;
        self.link.send(&packet).await.map_err(ProtocolError::Link)?;
        Ok(timestamp)
    }

    /// Step 7: receive one batch and record it
    pub async fn receive_batch<R: Recorder>(
        &mut self,
        ingest: &Ingest,
        recorder: &mut R,
    ) -> Result<usize, ProtocolError<L::Error>> {
        let mut packet = [0u8; MAX_BATCH * RawSample::LEN];
        let len = self.link.receive(&mut packet).await.map_err(ProtocolError::Link)?;
        Ok(ingest.process(&packet[..len], recorder)?)
    }

    pub fn release(self) -> L {
        self.link
    }
}
