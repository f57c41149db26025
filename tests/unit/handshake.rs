//! Unit tests for the device and host ends of the streaming protocol

use crate::common::memory_link::{self, LinkError};
use crate::common::{create_simulated_driver, MockTiming};
use embassy_futures::block_on;
use embassy_futures::join::join;
use scha63x::protocol::{
    WireFormat, MAX_BATCH, PING_RETRY_MS, STARTUP_PACKET_LEN, STATUS_NOT_OK, STATUS_OK, STATUS_TEST_MODE_ACTIVATION,
};
use scha63x::{
    CrossAxisCompensation, Error, FilterConfig, FilterRate, Handshake, Link, ProtocolError, RawSample, SensorInfo,
    SerialNumber, Session, StreamSettings,
};

#[test]
fn test_ping_answered_immediately() {
    let (device, host) = memory_link::pair();
    let timing = MockTiming::new();
    let mut handshake = Handshake::new(device.clone(), timing.clone());
    let mut session = Session::new(host);

    let (attempts, accepted) = block_on(join(handshake.ping(), session.accept_ping()));
    assert_eq!(attempts, Ok(1));
    assert_eq!(accepted, Ok(()));

    let sent = device.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), STARTUP_PACKET_LEN);
    assert_eq!(&sent[0][..6], b"hello\0");
}

#[test]
fn test_ping_is_retried_until_the_host_answers() {
    let (device, host) = memory_link::pair();
    device.drop_next_sends(2);
    let timing = MockTiming::new();
    let mut handshake = Handshake::new(device.clone(), timing.clone());
    let mut session = Session::new(host);

    let (attempts, accepted) = block_on(join(handshake.ping(), session.accept_ping()));
    assert_eq!(attempts, Ok(3));
    assert!(accepted.is_ok());
    assert_eq!(device.sent().len(), 3);
    assert!(timing.waits().len() >= 2);
    assert!(timing.waits().iter().all(|&ms| ms == PING_RETRY_MS));
}

#[test]
fn test_ping_ignores_unrelated_replies() {
    let (device, _host) = memory_link::pair();
    device.inject(b"nope");
    device.inject(b"hello");
    let mut handshake = Handshake::new(device.clone(), MockTiming::new());
    // The stray reply costs one extra ping
    assert_eq!(block_on(handshake.ping()), Ok(2));
    assert_eq!(device.pending(), 0);
}

#[test]
fn test_filter_config_and_info_exchange() {
    let (device, host) = memory_link::pair();
    let mut handshake = Handshake::new(device, MockTiming::new());
    let mut session = Session::new(host);

    let mut config = FilterConfig::uniform(FilterRate::Hz20);
    config.gyro.ry = FilterRate::Hz300;
    block_on(session.send_filter_config(&config)).unwrap();
    assert_eq!(block_on(handshake.receive_filter_config()), Ok(config));

    let serial = SerialNumber::from_traceability(0x1234, 42, 0x0A00);
    let settings = StreamSettings {
        buffer: 8,
        imu_trigger: 1000,
        cam_trigger: 25,
    };
    let (device_side, host_side) = block_on(join(handshake.exchange_info(&SensorInfo::ready(serial.clone())), async {
        let info = session.receive_info().await?;
        session.send_stream_settings(&info, settings).await?;
        Ok::<_, ProtocolError<LinkError>>(info)
    }));
    let info = host_side.unwrap();
    assert_eq!(info.status, STATUS_OK);
    assert_eq!(info.serial, serial);
    assert_eq!(info.settings, None);
    assert_eq!(device_side, Ok(settings));
}

#[test]
fn test_missing_stream_settings_fall_back_to_defaults() {
    let (device, host) = memory_link::pair();
    let mut handshake = Handshake::new(device, MockTiming::new());
    let mut echo = host.clone();
    let mut session = Session::new(host);

    let (device_side, _) = block_on(join(handshake.exchange_info(&SensorInfo::failed::<()>(&Error::StatusNotOk { uno: true, due: true })), async {
        // Return the info block untouched, settings still zeroed
        let info = session.receive_info().await.unwrap();
        let mut packet = [0u8; STARTUP_PACKET_LEN];
        info.encode(&mut packet);
        echo.send(&packet).await
    }));
    assert_eq!(device_side, Ok(StreamSettings::default()));
}

#[test]
fn test_calibration_transfer() {
    let (device, host) = memory_link::pair();
    let mut handshake = Handshake::new(device, MockTiming::new());
    let mut session = Session::new(host);

    let mut cac = CrossAxisCompensation::IDENTITY;
    cac.c[0][1] = 0.25;
    cac.b[2][0] = -0.125;
    block_on(handshake.send_cac(&cac)).unwrap();
    assert_eq!(block_on(session.receive_cac()), Ok(cac));
}

#[test]
fn test_timestamp_sync_round_trip() {
    let (device, host) = memory_link::pair();
    let mut handshake = Handshake::new(device, MockTiming::new());
    let mut session = Session::new(host);

    let (device_side, host_side) = block_on(join(handshake.sync_timestamp(123_456_789), session.receive_timestamp()));
    assert_eq!(device_side, Ok(()));
    assert_eq!(host_side, Ok(123_456_789));
}

#[test]
fn test_timestamp_echo_mismatch() {
    let (device, _host) = memory_link::pair();
    device.inject(b"999\0");
    let mut handshake = Handshake::new(device, MockTiming::new());
    assert_eq!(block_on(handshake.sync_timestamp(1000)), Err(ProtocolError::EchoMismatch));
}

#[test]
fn test_oversized_batch_is_rejected_without_sending() {
    let (device, _host) = memory_link::pair();
    let mut handshake = Handshake::new(device.clone(), MockTiming::new());
    let samples = [RawSample::default(); MAX_BATCH + 1];
    assert_eq!(
        block_on(handshake.send_batch(&samples)),
        Err(ProtocolError::BatchTooLarge {
            max: MAX_BATCH,
            actual: MAX_BATCH + 1
        })
    );
    assert!(device.sent().is_empty());
}

#[test]
fn test_batch_message_size() {
    let (device, _host) = memory_link::pair();
    let mut handshake = Handshake::new(device.clone(), MockTiming::new());
    let samples = [RawSample {
        timestamp_us: 5,
        ..RawSample::default()
    }; 4];
    block_on(handshake.send_batch(&samples)).unwrap();
    assert_eq!(device.sent()[0].len(), 4 * 32);
}

#[test]
fn test_refused_test_mode_reaches_the_host_as_its_own_status() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    sensor.refuse_test_mode();
    let error = block_on(driver.initialize(&FilterConfig::default())).unwrap_err();

    let (device, host) = memory_link::pair();
    let mut handshake = Handshake::new(device, MockTiming::new());
    let mut session = Session::new(host);
    let (_, host_side) = block_on(join(handshake.exchange_info(&SensorInfo::failed(&error)), async {
        let info = session.receive_info().await?;
        session.send_stream_settings(&info, StreamSettings::default()).await?;
        Ok::<_, ProtocolError<LinkError>>(info)
    }));
    let info = host_side.unwrap();
    assert_eq!(info.status, STATUS_TEST_MODE_ACTIVATION);
    assert_eq!(info.status, -1);
    assert!(!info.is_ok());
    assert_eq!(info.serial.as_str(), "");
}

#[test]
fn test_unhealthy_startup_reaches_the_host_as_status_not_ok() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    sensor.never_healthy(scha63x::Chip::Due);
    let error = block_on(driver.initialize(&FilterConfig::default())).unwrap_err();
    assert_eq!(SensorInfo::failed(&error).status, STATUS_NOT_OK);
}
