//! Unit tests for DUE test mode and calibration readout

use crate::common::test_utils::assert_float_eq;
use crate::common::create_simulated_driver;
use embassy_futures::block_on;
use scha63x::frame::commands;
use scha63x::{Chip, Error, FilterConfig, InitState};

#[test]
fn test_refused_test_mode_aborts_startup() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    sensor.refuse_test_mode();

    let error = block_on(driver.initialize(&FilterConfig::default())).unwrap_err();
    assert_eq!(error, Error::TestModeActivation);
    assert!(error.is_init_failure());
    assert_eq!(driver.state(), InitState::Failed);
    assert!(driver.serial_number().is_none());
    assert!(driver.cac().is_none());

    // Nothing after the unlock attempt: no bank switch, no EOI
    assert_eq!(sensor.count(Chip::Due, commands::SELECT_BANK_5), 0);
    assert_eq!(sensor.count(Chip::Uno, commands::SET_EOI), 0);
    let last = *sensor.log().last().unwrap();
    assert_eq!(last, (Chip::Due, commands::READ_MODE.raw()));
}

#[test]
fn test_unlock_sequence_is_sent_in_order() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    block_on(driver.initialize(&FilterConfig::default())).unwrap();

    let due = sensor.requests_to(Chip::Due);
    let start = due.iter().position(|&f| f == commands::UNLOCK_010.raw()).unwrap();
    assert_eq!(
        &due[start..start + 7],
        &[
            commands::UNLOCK_010.raw(),
            commands::READ_MODE.raw(),
            commands::UNLOCK_001.raw(),
            commands::READ_MODE.raw(),
            commands::UNLOCK_100.raw(),
            commands::READ_MODE.raw(),
            commands::READ_MODE.raw(),
        ]
    );
    // Followed by the bank 5 reads
    assert_eq!(due[start + 7], commands::SELECT_BANK_5.raw());
    let reads: Vec<u32> = commands::CAC_READS.iter().map(|f| f.raw()).collect();
    assert_eq!(&due[start + 8..start + 18], reads.as_slice());
}

#[test]
fn test_test_mode_is_left_before_normal_operation() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    block_on(driver.initialize(&FilterConfig::default())).unwrap();
    assert!(!sensor.in_test_mode(Chip::Due));
}

#[test]
fn test_calibration_words_decode_into_both_matrices() {
    let (mut driver, sensor, _timing) = create_simulated_driver();
    // (low, high): cxx,cxy | cxz,cyx | cyy,cyz | czx,czy | czz,bxx | bxy,bxz | byx,byy | byz,bzx | bzy,bzz
    sensor.set_cac_pairs([
        (41, -8),
        (3, 4),
        (-41, 5),
        (6, 7),
        (82, -82),
        (9, 10),
        (11, 120),
        (13, 14),
        (15, -128),
    ]);

    block_on(driver.initialize(&FilterConfig::default())).unwrap();
    let cac = driver.cac().copied().unwrap();
    let lsb = 1.0 / 4096.0;

    assert_float_eq(cac.c[0][0], 1.0 + 41.0 * lsb, 1e-7);
    assert_float_eq(cac.c[0][1], -8.0 * lsb, 1e-7);
    assert_float_eq(cac.c[0][2], 3.0 * lsb, 1e-7);
    assert_float_eq(cac.c[1][0], 4.0 * lsb, 1e-7);
    assert_float_eq(cac.c[1][1], 1.0 - 41.0 * lsb, 1e-7);
    assert_float_eq(cac.c[2][2], 1.0 + 82.0 * lsb, 1e-7);
    assert_float_eq(cac.b[0][0], 1.0 - 82.0 * lsb, 1e-7);
    assert_float_eq(cac.b[1][1], 1.0 + 120.0 * lsb, 1e-7);
    assert_float_eq(cac.b[2][1], 15.0 * lsb, 1e-7);
    assert_float_eq(cac.b[2][2], 1.0 - 128.0 * lsb, 1e-7);
}

#[test]
fn test_blank_calibration_is_identity() {
    let (mut driver, _sensor, _timing) = create_simulated_driver();
    block_on(driver.initialize(&FilterConfig::default())).unwrap();
    assert_eq!(driver.cac().copied(), Some(scha63x::CrossAxisCompensation::IDENTITY));
}
