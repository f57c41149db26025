//! Hardware seams for the driver.
//!
//! The driver never touches a peripheral directly. The board supplies:
//! - a [`Transport`] that performs one full-duplex 32-bit SPI exchange
//! - a [`Timing`] provider for settle waits and timestamps
//! - a [`Link`] for the host streaming protocol
//!
//! Tests supply simulated implementations of the same traits.

/// The two sensing chips in the SCHA63x package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Chip {
    /// Gyro X and accelerometer
    Uno,
    /// Gyro Y and Z
    Due,
}

impl Chip {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uno => "UNO",
            Self::Due => "DUE",
        }
    }
}

/// One SPI exchange with chip-select asserted for its whole duration.
///
/// The returned word is the chip's answer to the *previous* request on the
/// same chip-select line.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Error;

    async fn exchange(&mut self, chip: Chip, frame: u32) -> Result<u32, Self::Error>;
}

/// Monotonic time and settle waits.
///
/// `wait_ms` is a synchronisation point with the sensor's internal state
/// machine, so it must wait at least `ms` milliseconds.
#[allow(async_fn_in_trait)]
pub trait Timing {
    async fn wait_ms(&mut self, ms: u32);

    fn now_ms(&self) -> u64;

    fn now_us(&self) -> u64;
}

/// Packet link between the device and the host.
///
/// Each `send` is one message; `receive` returns the length of one message.
#[allow(async_fn_in_trait)]
pub trait Link {
    type Error;

    async fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;
}

impl<T: Transport> Transport for &mut T {
    type Error = T::Error;

    async fn exchange(&mut self, chip: Chip, frame: u32) -> Result<u32, Self::Error> {
        (**self).exchange(chip, frame).await
    }
}

impl<D: Timing> Timing for &mut D {
    async fn wait_ms(&mut self, ms: u32) {
        (**self).wait_ms(ms).await
    }

    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

impl<L: Link> Link for &mut L {
    type Error = L::Error;

    async fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        (**self).send(data).await
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        (**self).receive(buffer).await
    }
}
