//! Pipelined sample and status reads.
//!
//! The SCHA63x answers every request one exchange late: the response clocked
//! out during request `n` belongs to request `n - 1`. Each sequence below
//! therefore issues one request more than the number of values it wants and
//! drops the first response.

use crate::frame::{commands, FieldKind, Frame};
use crate::interface::{Chip, Transport};

/// Raw counts from one acquisition tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// Microseconds since boot when the sample was read
    pub timestamp_us: i64,
    /// Accelerometer X, Y, Z (UNO)
    pub accel: [i16; 3],
    /// Gyro X (UNO), Y and Z (DUE)
    pub gyro: [i16; 3],
    pub temp_due: i16,
    pub temp_uno: i16,
    /// A DUE response had a bad CRC or a non-OK return status
    pub error_due: bool,
    /// A UNO response had a bad CRC or a non-OK return status
    pub error_uno: bool,
    pub cam_trigger: bool,
    pub ubx_trigger: bool,
}

/// Status registers of one chip.
///
/// `rate2` is only read from DUE and `accel1` only from UNO; the other one
/// stays zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorStatus {
    pub summary: u16,
    pub rate1: u16,
    pub rate2: u16,
    pub accel1: u16,
    pub common1: u16,
    pub common2: u16,
    /// A response had a bad CRC or a non-OK return status
    pub transfer_error: bool,
}

/// Send `requests` back to back on one chip and realign the responses.
///
/// Element `i` of the result answers `requests[i]`; the stale response to
/// whatever preceded the sequence is discarded. The last request is
/// therefore only a carrier and is normally a repeat of the one before it.
pub async fn pipelined<T: Transport, const N: usize>(
    transport: &mut T,
    chip: Chip,
    requests: &[Frame; N],
) -> Result<[Frame; N], T::Error> {
    let mut responses = [Frame(0); N];
    for (i, request) in requests.iter().enumerate() {
        let response = Frame(transport.exchange(chip, request.raw()).await?);
        if i > 0 {
            responses[i - 1] = response;
        }
    }
    Ok(responses)
}

/// Raw MISO words of a sequence, without realignment
pub async fn exchange_all<T: Transport, const N: usize>(
    transport: &mut T,
    chip: Chip,
    requests: &[Frame; N],
) -> Result<[Frame; N], T::Error> {
    let mut responses = [Frame(0); N];
    for (slot, request) in responses.iter_mut().zip(requests.iter()) {
        *slot = Frame(transport.exchange(chip, request.raw()).await?);
    }
    Ok(responses)
}

fn any_untrusted(responses: &[Frame]) -> bool {
    responses.iter().any(|response| !response.is_trusted())
}

fn i16_of(frame: Frame) -> i16 {
    frame.field(FieldKind::I16) as i16
}

fn u16_of(frame: Frame) -> u16 {
    frame.field(FieldKind::U16) as u16
}

const DUE_SAMPLE: [Frame; 4] = [
    commands::READ_GYRO_Y,
    commands::READ_GYRO_Z,
    commands::READ_TEMP,
    commands::READ_TEMP,
];

const UNO_SAMPLE: [Frame; 6] = [
    commands::READ_GYRO_X,
    commands::READ_ACC_X,
    commands::READ_ACC_Y,
    commands::READ_ACC_Z,
    commands::READ_TEMP,
    commands::READ_TEMP,
];

const UNO_STATUS: [Frame; 6] = [
    commands::READ_SUMMARY_STATUS,
    commands::READ_RATE_STATUS_1,
    commands::READ_ACC_STATUS_1,
    commands::READ_COMMON_STATUS_1,
    commands::READ_COMMON_STATUS_2,
    commands::READ_COMMON_STATUS_2,
];

const DUE_STATUS: [Frame; 6] = [
    commands::READ_SUMMARY_STATUS,
    commands::READ_RATE_STATUS_1,
    commands::READ_RATE_STATUS_2,
    commands::READ_COMMON_STATUS_1,
    commands::READ_COMMON_STATUS_2,
    commands::READ_COMMON_STATUS_2,
];

/// Read gyro, accelerometer and temperature from both chips.
///
/// DUE is read first, then UNO. Flagged responses are still decoded; the
/// consumer decides what to do with a sample carrying an error flag.
pub async fn read_sample<T: Transport>(transport: &mut T, timestamp_us: i64) -> Result<RawSample, T::Error> {
    let due = pipelined(transport, Chip::Due, &DUE_SAMPLE).await?;
    let uno = pipelined(transport, Chip::Uno, &UNO_SAMPLE).await?;

    let due = &due[..3];
    let uno = &uno[..5];

    Ok(RawSample {
        timestamp_us,
        accel: [i16_of(uno[1]), i16_of(uno[2]), i16_of(uno[3])],
        gyro: [i16_of(uno[0]), i16_of(due[0]), i16_of(due[1])],
        temp_due: i16_of(due[2]),
        temp_uno: i16_of(uno[4]),
        error_due: any_untrusted(due),
        error_uno: any_untrusted(uno),
        cam_trigger: false,
        ubx_trigger: false,
    })
}

/// Read the status registers of one chip
pub async fn read_status<T: Transport>(transport: &mut T, chip: Chip) -> Result<SensorStatus, T::Error> {
    let requests = match chip {
        Chip::Uno => &UNO_STATUS,
        Chip::Due => &DUE_STATUS,
    };
    let responses = pipelined(transport, chip, requests).await?;
    let values = &responses[..5];

    let mut status = SensorStatus {
        summary: u16_of(values[0]),
        rate1: u16_of(values[1]),
        common1: u16_of(values[3]),
        common2: u16_of(values[4]),
        transfer_error: any_untrusted(values),
        ..SensorStatus::default()
    };
    match chip {
        Chip::Uno => status.accel1 = u16_of(values[2]),
        Chip::Due => status.rate2 = u16_of(values[2]),
    }
    Ok(status)
}

/// Read common status 1 and 2 of one chip
pub async fn read_common_status<T: Transport>(transport: &mut T, chip: Chip) -> Result<(u16, u16), T::Error> {
    let responses = pipelined(
        transport,
        chip,
        &[commands::READ_COMMON_STATUS_1, commands::READ_COMMON_STATUS_2, commands::READ_COMMON_STATUS_2],
    )
    .await?;
    Ok((u16_of(responses[0]), u16_of(responses[1])))
}
