//! CDC ACM (virtual serial port) link to the host.
//!
//! Carries the startup handshake and the sample batches. Messages larger than
//! one USB packet are split across packets; a short packet, or a zero-length
//! packet after a full one, marks the end of a message.

use defmt::{info, warn};
use embassy_stm32::{peripherals::USB_OTG_HS, usb::Driver};
pub use embassy_usb::class::cdc_acm::State;
use embassy_usb::{class::cdc_acm::CdcAcmClass, driver::EndpointError, Builder};
use scha63x::Link;
use static_cell::StaticCell;

use super::usb_system::MAX_PACKET_SIZE;

const PACKET_LEN: usize = MAX_PACKET_SIZE as usize;

pub static ACM_STATE: StaticCell<State<'static>> = StaticCell::new();

/// Peripheral collection for ACM interface
pub struct AcmClaims<'d> {
    pub acm_state: &'d mut State<'d>,
}

/// Macro to claim peripherals for AcmConnection
#[macro_export]
macro_rules! claim_acm {
    ($peripherals:expr) => {{
        $crate::peripherals::acm::AcmClaims {
            acm_state: $crate::peripherals::acm::ACM_STATE.init(embassy_usb::class::cdc_acm::State::new()),
        }
    }};
}

/// Reasons a host message could not be carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AcmError {
    /// The host closed the port or the cable was pulled
    Disconnected,
    /// The host sent a message longer than the receive buffer
    Overflow,
}

impl From<EndpointError> for AcmError {
    fn from(error: EndpointError) -> Self {
        match error {
            EndpointError::BufferOverflow => AcmError::Overflow,
            EndpointError::Disabled => AcmError::Disconnected,
        }
    }
}

/// CDC ACM connection carrying whole protocol messages.
///
/// # Example
///
/// ```rust,ignore
/// let mut acm = AcmConnection::new(usb.builder(), claim_acm!(p));
/// acm.wait_connection().await;
/// let mut handshake = Handshake::new(&mut acm, EmbassyTiming);
/// handshake.ping().await?;
/// ```
pub struct AcmConnection<'d> {
    class: CdcAcmClass<'d, Driver<'d, USB_OTG_HS>>,
}

impl<'d> AcmConnection<'d> {
    pub fn new(builder: &mut Builder<'d, Driver<'d, USB_OTG_HS>>, claims: AcmClaims<'d>) -> Self {
        info!("CDC ACM connection initialized");
        Self {
            class: CdcAcmClass::new(builder, claims.acm_state, MAX_PACKET_SIZE),
        }
    }

    /// Wait for the host to open the port.
    pub async fn wait_connection(&mut self) {
        self.class.wait_connection().await;
        info!("CDC ACM connection established");
    }

    /// Read packets until a short one arrives, discarding the rest of the message.
    async fn drain(&mut self) -> Result<(), AcmError> {
        let mut scratch = [0u8; PACKET_LEN];
        loop {
            let n = self.class.read_packet(&mut scratch).await?;
            if n < PACKET_LEN {
                return Ok(());
            }
        }
    }
}

impl Link for AcmConnection<'_> {
    type Error = AcmError;

    async fn send(&mut self, data: &[u8]) -> Result<(), AcmError> {
        for packet in data.chunks(PACKET_LEN) {
            self.class.write_packet(packet).await?;
        }
        // A full last packet leaves the host waiting for more
        if data.len() % PACKET_LEN == 0 {
            self.class.write_packet(&[]).await?;
        }
        Ok(())
    }

    async fn receive(&mut self, buffer: &mut [u8]) -> Result<usize, AcmError> {
        let mut filled = 0;
        loop {
            let remaining = &mut buffer[filled..];
            if remaining.len() < PACKET_LEN {
                // Read into a full-size packet so the endpoint never overflows
                let mut packet = [0u8; PACKET_LEN];
                let n = self.class.read_packet(&mut packet).await?;
                if n > remaining.len() {
                    warn!("Host message exceeds {} byte buffer", buffer.len());
                    if n == PACKET_LEN {
                        self.drain().await?;
                    }
                    return Err(AcmError::Overflow);
                }
                remaining[..n].copy_from_slice(&packet[..n]);
                filled += n;
                if n < PACKET_LEN {
                    return Ok(filled);
                }
            } else {
                let n = self.class.read_packet(&mut remaining[..PACKET_LEN]).await?;
                filled += n;
                if n < PACKET_LEN {
                    return Ok(filled);
                }
            }
        }
    }
}
