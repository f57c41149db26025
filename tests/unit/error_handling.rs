//! Unit tests for error handling and recovery

use crate::common::simulated_sensor::BusFault;
use crate::common::{create_ready_driver, create_simulated_driver};
use embassy_futures::block_on;
use scha63x::{Chip, Error, FilterConfig, InitState};

#[test]
fn test_bus_failure_during_startup() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    sensor.fail_after(12);

    let error = block_on(driver.initialize(&FilterConfig::default())).unwrap_err();
    assert_eq!(error, Error::Bus(BusFault));
    assert!(!error.is_init_failure());
    assert!(!driver.is_ready());
    // Stopped inside the test mode unlock
    assert_eq!(driver.state(), InitState::TestModeEntry);
}

#[test]
fn test_bus_failure_during_sampling() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.fail_after(5);
    assert_eq!(block_on(driver.read_sample()), Err(Error::Bus(BusFault)));
    // Calibration survives a failed read
    assert!(driver.is_ready());
}

#[test]
fn test_failed_reinitialization_discards_previous_results() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    assert!(driver.serial_number().is_some());

    sensor.never_healthy(Chip::Due);
    assert!(block_on(driver.initialize(&FilterConfig::default())).is_err());
    assert!(!driver.is_ready());
    assert!(driver.serial_number().is_none());
    assert!(driver.report().is_none());
}

#[test]
fn test_status_read_after_startup() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.set_register(Chip::Due, 0, 0x11, 0x0300);
    sensor.set_register(Chip::Uno, 0, 0x12, 0x0042);

    let due = block_on(driver.read_status(Chip::Due)).unwrap();
    assert_eq!(due.rate2, 0x0300);
    assert!(!due.transfer_error);

    let uno = block_on(driver.read_status(Chip::Uno)).unwrap();
    assert_eq!(uno.accel1, 0x0042);
}

#[test]
fn test_error_display() {
    let error: Error<BusFault> = Error::StatusNotOk { uno: false, due: true };
    let text = format!("{}", error);
    assert!(text.contains("DUE failed: true"));
    assert!(format!("{}", Error::<BusFault>::NoSampleCallback).contains("callback"));
    assert!(format!("{}", Error::Bus(BusFault)).contains("BusFault"));
}
