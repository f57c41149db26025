//! Clock tree for the STM32H753 acquisition board.

use embassy_stm32::{rcc::*, Config, Peripherals};

/// Bring up clocks and return the peripherals.
///
/// - 480 MHz system clock from PLL1, fed by HSI
/// - 240 MHz AHB, 120 MHz APB buses
/// - HSI48 for USB, trimmed from SOF packets
///
/// SPI4 is clocked from APB2, so the 10 MHz SCHA63x request divides down to
/// 7.5 MHz, inside the sensor's limit.
pub fn init_system() -> Peripherals {
    let mut config = Config::default();

    config.rcc.hsi = Some(HSIPrescaler::DIV1);
    config.rcc.csi = true;
    config.rcc.hsi48 = Some(Hsi48Config { sync_from_usb: true });

    // PLL1 = HSI(16MHz) / DIVM1(4) * DIVN1(60) / DIVP1(2) = 480MHz
    config.rcc.pll1 = Some(Pll {
        source: PllSource::HSI,
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL60,
        divp: Some(PllDiv::DIV2),
        divq: None,
        divr: None,
    });

    config.rcc.sys = Sysclk::PLL1_P; // 480 MHz
    config.rcc.ahb_pre = AHBPrescaler::DIV2; // 240 MHz
    config.rcc.apb1_pre = APBPrescaler::DIV2; // 120 MHz
    config.rcc.apb2_pre = APBPrescaler::DIV2; // 120 MHz, SPI4 kernel clock
    config.rcc.apb3_pre = APBPrescaler::DIV2; // 120 MHz
    config.rcc.apb4_pre = APBPrescaler::DIV2; // 120 MHz

    config.rcc.voltage_scale = VoltageScale::Scale0;

    config.rcc.mux.usbsel = mux::Usbsel::HSI48;
    config.rcc.mux.spi45sel = mux::Spi45sel::PCLK2;

    embassy_stm32::init(config)
}
