//! SCHA63x acquisition firmware for the STM32H753.
//!
//! Streams timestamped IMU samples with camera and GNSS trigger flags to a
//! host over USB CDC ACM.

#![no_std]
#![no_main]

mod apps;
mod peripherals;

use defmt::info;
use embassy_executor::Spawner;
use peripherals::{init_system, AcmConnection, Scha63xSpi, UsbSystem};

#[cfg(not(feature = "debug"))]
use panic_halt as _;
#[cfg(feature = "debug")]
use {defmt_rtt as _, panic_probe as _};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting SCHA63x firmware v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = init_system();

    // The ACM class registers against the builder before the device is built
    let mut usb = UsbSystem::new(claim_usb!(peripherals));
    let acm = AcmConnection::new(usb.builder(), claim_acm!(peripherals));
    let spi = Scha63xSpi::new(claim_imu_spi!(peripherals));
    let sampler = claim_sampler!(peripherals);

    spawner.spawn(peripherals::usb_system::task(usb)).unwrap();
    spawner.spawn(apps::stream::task(acm)).unwrap();
    spawner
        .spawn(apps::sampler::task(spi, sampler.cam_trigger))
        .unwrap();
    spawner
        .spawn(apps::sampler::timepulse_task(
            sampler.timepulse_pin,
            sampler.timepulse_line,
        ))
        .unwrap();
    spawner.spawn(apps::crc_check::task(claim_crc!(peripherals))).unwrap();

    loop {
        embassy_time::Timer::after(embassy_time::Duration::from_secs(60)).await;
        info!("System heartbeat - all tasks running");
    }
}
