//! Unit tests for sample reads through the driver

use crate::common::test_utils::assert_float_eq;
use crate::common::{create_ready_driver, create_simulated_driver, RS_STALE};
use embassy_futures::block_on;
use scha63x::{Chip, Error, RawSample, Timing};
use std::cell::Cell;

thread_local! {
    static DELIVERED: Cell<usize> = const { Cell::new(0) };
    static LAST_ACCEL_X: Cell<i16> = const { Cell::new(0) };
}

fn count_sample(sample: &RawSample) {
    DELIVERED.with(|count| count.set(count.get() + 1));
    LAST_ACCEL_X.with(|accel| accel.set(sample.accel[0]));
}

#[test]
fn test_sample_without_callback_is_rejected_without_bus_traffic() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    assert!(!driver.has_sample_callback());

    let result = block_on(driver.sample());
    assert_eq!(result, Err(Error::NoSampleCallback));
    assert!(sensor.log().is_empty());
}

#[test]
fn test_sample_delivers_to_the_callback() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.set_outputs([1234, 0, 0], [0, 0, 0], 0, 0);
    driver.set_sample_callback(count_sample);

    let before = DELIVERED.with(Cell::get);
    let sample = block_on(driver.sample()).unwrap();
    assert_eq!(DELIVERED.with(Cell::get), before + 1);
    assert_eq!(LAST_ACCEL_X.with(Cell::get), 1234);
    assert_eq!(sample.accel[0], 1234);

    driver.clear_sample_callback();
    assert_eq!(block_on(driver.sample()), Err(Error::NoSampleCallback));
    assert_eq!(DELIVERED.with(Cell::get), before + 1);
}

#[test]
fn test_read_sample_maps_every_register() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.set_outputs([100, -200, 4905], [160, -320, 480], 30, -60);

    let sample = block_on(driver.read_sample()).unwrap();
    assert_eq!(sample.accel, [100, -200, 4905]);
    assert_eq!(sample.gyro, [160, -320, 480]);
    assert_eq!(sample.temp_uno, 30);
    assert_eq!(sample.temp_due, -60);
    assert!(!sample.error_uno);
    assert!(!sample.error_due);

    // Ten exchanges, DUE first
    let log = sensor.log();
    assert_eq!(log.len(), 10);
    assert!(log[..4].iter().all(|(chip, _)| *chip == Chip::Due));
    assert!(log[4..].iter().all(|(chip, _)| *chip == Chip::Uno));
}

#[test]
fn test_samples_are_stamped_from_the_clock() {
    let (mut driver, _sensor, timing) = create_ready_driver();
    let first = block_on(driver.read_sample()).unwrap();
    timing.advance_us(2000);
    let second = block_on(driver.read_sample()).unwrap();
    assert_eq!(second.timestamp_us - first.timestamp_us, 2000);
    assert_eq!(first.timestamp_us as u64, timing.now_us() - 2000);
}

#[test]
fn test_corrupted_responses_flag_only_that_chip() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.corrupt_responses(Chip::Due);
    let sample = block_on(driver.read_sample()).unwrap();
    assert!(sample.error_due);
    assert!(!sample.error_uno);
}

#[test]
fn test_stale_status_flags_the_sample() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.force_status(Chip::Uno, RS_STALE);
    let sample = block_on(driver.read_sample()).unwrap();
    assert!(sample.error_uno);
    assert!(!sample.error_due);
}

#[test]
fn test_read_real_converts_units() {
    let (mut driver, sensor, _timing) = create_ready_driver();
    sensor.set_outputs([4905, -4905, 0], [160, 80, -160], 30, 0);

    let real = block_on(driver.read_real()).unwrap();
    assert_float_eq(real.accel[0], 1.0, 1e-6);
    assert_float_eq(real.accel[1], -1.0, 1e-6);
    assert_float_eq(real.gyro[0], 1.0, 1e-6);
    assert_float_eq(real.gyro[1], 0.5, 1e-6);
    assert_float_eq(real.gyro[2], -1.0, 1e-6);
    assert_float_eq(real.temp_uno, 26.0, 1e-5);
    assert_float_eq(real.temp_due, 25.0, 1e-6);
}

#[test]
fn test_sampling_works_before_startup() {
    // Reads do not depend on startup; only calibration does
    let (mut driver, sensor, _timing) = create_simulated_driver();
    sensor.set_outputs([10, 20, 30], [1, 2, 3], 0, 0);
    assert!(driver.cac().is_none());
    let sample = block_on(driver.read_sample()).unwrap();
    assert_eq!(sample.accel, [10, 20, 30]);
}
