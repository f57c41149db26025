//! USB HS device (ULPI PHY) that presents the acquisition board as CDC ACM.

use defmt::info;
use embassy_stm32::{
    bind_interrupts,
    peripherals::{PA3, PA5, PB0, PB1, PB10, PB11, PB12, PB13, PB5, PC0, PC2, PC3, USB_OTG_HS},
    usb::{self, Driver, InterruptHandler},
    Peri,
};
use embassy_usb::Builder;
use static_cell::ConstStaticCell;

/// High-speed bulk packet size; one full sample batch
pub const MAX_PACKET_SIZE: u16 = 512;

const PRODUCT: &str = "SCHA63x IMU";

/// OTG_HS and its ULPI lines: clock, direction, next, stop, then data 0..7
pub struct UsbClaims<'d> {
    pub otg: Peri<'d, USB_OTG_HS>,
    pub ck: Peri<'d, PA5>,
    pub dir: Peri<'d, PC2>,
    pub nxt: Peri<'d, PC3>,
    pub stp: Peri<'d, PC0>,
    pub data: (
        Peri<'d, PA3>,
        Peri<'d, PB0>,
        Peri<'d, PB1>,
        Peri<'d, PB10>,
        Peri<'d, PB11>,
        Peri<'d, PB12>,
        Peri<'d, PB13>,
        Peri<'d, PB5>,
    ),
    pub buffers: &'d mut UsbBuffers,
}

/// Macro to claim peripherals for UsbSystem
#[macro_export]
macro_rules! claim_usb {
    ($p:expr) => {{
        $crate::peripherals::usb_system::UsbClaims {
            otg: $p.USB_OTG_HS,
            ck: $p.PA5,
            dir: $p.PC2,
            nxt: $p.PC3,
            stp: $p.PC0,
            data: ($p.PA3, $p.PB0, $p.PB1, $p.PB10, $p.PB11, $p.PB12, $p.PB13, $p.PB5),
            buffers: $crate::peripherals::usb_system::USB_BUFFERS.take(),
        }
    }};
}

bind_interrupts!(
    pub struct UsbInterrupts {
        OTG_HS => InterruptHandler<USB_OTG_HS>;
    }
);

/// Endpoint and descriptor memory, aligned for the OTG DMA
#[repr(C, align(32))]
pub struct UsbBuffers {
    ep_out: [u8; MAX_PACKET_SIZE as usize * 2],
    config_descriptor: [u8; 256],
    bos_descriptor: [u8; 256],
    control: [u8; 64],
}

pub static USB_BUFFERS: ConstStaticCell<UsbBuffers> = ConstStaticCell::new(UsbBuffers {
    ep_out: [0; MAX_PACKET_SIZE as usize * 2],
    config_descriptor: [0; 256],
    bos_descriptor: [0; 256],
    control: [0; 64],
});

/// USB device in its configuration phase.
///
/// Classes register against [`UsbSystem::builder`] before [`UsbSystem::run`]
/// consumes it.
pub struct UsbSystem<'d> {
    builder: Builder<'d, Driver<'d, USB_OTG_HS>>,
}

impl<'d> UsbSystem<'d> {
    pub fn new(claims: UsbClaims<'d>) -> Self {
        let mut config = embassy_usb::Config::new(0xc0de, 0xcafe);
        config.manufacturer = Some("NUbots");
        config.product = Some(PRODUCT);
        config.serial_number = Some("12345678");

        let mut usb_config = usb::Config::default();
        usb_config.vbus_detection = true;

        let (d0, d1, d2, d3, d4, d5, d6, d7) = claims.data;
        let driver = Driver::new_hs_ulpi(
            claims.otg,
            UsbInterrupts,
            claims.ck,
            claims.dir,
            claims.nxt,
            claims.stp,
            d0,
            d1,
            d2,
            d3,
            d4,
            d5,
            d6,
            d7,
            &mut claims.buffers.ep_out,
            usb_config,
        );

        let builder = Builder::new(
            driver,
            config,
            &mut claims.buffers.config_descriptor,
            &mut claims.buffers.bos_descriptor,
            &mut [], // No Microsoft OS descriptors
            &mut claims.buffers.control,
        );
        info!("USB configured as {}", PRODUCT);

        Self { builder }
    }

    pub fn builder(&mut self) -> &mut Builder<'d, Driver<'d, USB_OTG_HS>> {
        &mut self.builder
    }

    /// Build the device and service it forever.
    pub async fn run(self) -> ! {
        let mut device = self.builder.build();
        device.run().await
    }
}

#[embassy_executor::task]
pub async fn task(usb_system: UsbSystem<'static>) -> ! {
    usb_system.run().await
}
