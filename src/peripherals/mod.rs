//! Board peripherals behind the driver's traits.

pub mod acm;
pub mod crc;
pub mod spi;
pub mod system;
pub mod timing;
pub mod usb_system;

pub use acm::{AcmConnection, AcmError};
pub use crc::FrameCrcUnit;
pub use spi::Scha63xSpi;
pub use system::init_system;
pub use timing::EmbassyTiming;
pub use usb_system::UsbSystem;
