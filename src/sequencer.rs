//! SCHA63x startup sequence.
//!
//! Bringing the sensor up is a fixed handshake across both chips:
//! 1. Reset both chips and wait for the NVM read
//! 2. Wake them and read the serial number from UNO
//! 3. Unlock DUE test mode and read the cross-axis compensation NVM
//! 4. Reset again to leave test mode and enter normal mode
//! 5. Write the filter configuration, restarting DUE in between
//! 6. Set end-of-initialization and check the summary status, retrying
//!    the whole start up to five times
//!
//! Waits go through [`Timing`] and every exchange through [`Transport`], so
//! the exact request order is observable from a simulated bus.

use core::fmt::Write;

use heapless::String;

use crate::cac::{CrossAxisCompensation, CAC_WORDS};
use crate::config::FilterConfig;
use crate::error::Error;
use crate::frame::{build_filter_frame, commands, FieldKind, Frame, FilterLayout};
use crate::interface::{Chip, Timing, Transport};
use crate::telemetry::{self, exchange_all, pipelined};
use crate::{log_debug, log_error, log_info, log_warn};

/// Wait for the NVM read after a reset
pub const RESET_SETTLE_MS: u32 = 25;
/// Wait after entering normal mode (covers UNO's 50 ms SPI wait)
pub const NORMAL_MODE_SETTLE_MS: u32 = 70;
/// Wait for DUE's SPI to become accessible after its restart
pub const SPI_ACCESS_MS: u32 = 1;
/// Gap between the two summary status read pairs
pub const STATUS_READ_GAP_MS: u32 = 3;
/// Settle time used on every startup retry
pub const RETRY_SETTLE_MS: u32 = 500;
/// Wait before talking to UNO again during a retry
pub const RETRY_NORMAL_MODE_MS: u32 = 50;
/// Wait after writing filters during a retry
pub const RETRY_FILTER_MS: u32 = 45;
/// Startup attempts before giving up
pub const MAX_ATTEMPTS: u8 = 5;

/// Bits of the mode register that read back as set once test mode is unlocked
const TEST_MODE_MASK: u16 = 0b111;

/// Startup progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitState {
    Reset,
    SerialRead,
    TestModeEntry,
    CacExtraction,
    TestModeExit,
    NormalModeEntry,
    FilterApply,
    EoiConvergence,
    Ready,
    Failed,
}

impl InitState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "Reset",
            Self::SerialRead => "SerialRead",
            Self::TestModeEntry => "TestModeEntry",
            Self::CacExtraction => "CacExtraction",
            Self::TestModeExit => "TestModeExit",
            Self::NormalModeEntry => "NormalModeEntry",
            Self::FilterApply => "FilterApply",
            Self::EoiConvergence => "EoiConvergence",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        }
    }
}

/// Ten-character serial number: five decimal digits, one hex digit, four
/// upper-case hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerialNumber(String<10>);

impl SerialNumber {
    /// Assemble the serial number from the UNO traceability registers
    pub fn from_traceability(trc0: u16, trc1: u16, trc2: u16) -> Self {
        let id2 = trc1;
        let id1 = (trc2 >> 8) & 0x0F;
        let id0 = trc0;
        let mut text = String::new();
        // u16 at width 5, a nibble and u16 in hex at width 4: always ten bytes
        let written = write!(text, "{:05}{:01x}{:04X}", id2, id1, id0);
        debug_assert!(written.is_ok(), "serial number overflowed ten bytes");
        Self(text)
    }

    /// Wrap an already formatted serial number, e.g. one received from the device
    pub fn parse(text: &str) -> Option<Self> {
        String::try_from(text).ok().map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl core::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SerialNumber {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

/// Everything learned during a successful startup
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitReport {
    pub serial: SerialNumber,
    pub cac: CrossAxisCompensation,
    /// Startup attempts used, 1 to [`MAX_ATTEMPTS`]
    pub attempts: u8,
}

/// Drives the startup handshake over a borrowed transport and timer
pub struct Sequencer<'a, T, D> {
    transport: &'a mut T,
    timing: &'a mut D,
    state: InitState,
}

impl<'a, T: Transport, D: Timing> Sequencer<'a, T, D> {
    pub fn new(transport: &'a mut T, timing: &'a mut D) -> Self {
        Self {
            transport,
            timing,
            state: InitState::Reset,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    /// Run the full startup sequence with the given filters
    ///
    /// # Returns
    /// * `Ok(report)` once both chips report a healthy status
    /// * `Err(Error::TestModeActivation)` if DUE refused test mode
    /// * `Err(Error::StatusNotOk { .. })` if a chip was still unhealthy after
    ///   [`MAX_ATTEMPTS`] attempts
    /// * `Err(Error::Bus(_))` on any transport failure
    pub async fn run(&mut self, config: &FilterConfig) -> Result<InitReport, Error<T::Error>> {
        self.enter(InitState::Reset);
        self.reset(true, true).await?;
        self.timing.wait_ms(RESET_SETTLE_MS).await;

        self.enter(InitState::SerialRead);
        self.normal_mode().await?;
        let serial = self.read_serial().await?;
        log_info!("SCHA63x serial number {}", serial.as_str());

        self.enter(InitState::TestModeEntry);
        if !self.unlock_test_mode().await? {
            log_error!("SCHA63x DUE test mode activation failed");
            self.enter(InitState::Failed);
            return Err(Error::TestModeActivation);
        }
        log_debug!("SCHA63x DUE test mode active");

        self.enter(InitState::CacExtraction);
        let cac = self.read_cac().await?;

        self.enter(InitState::TestModeExit);
        self.reset(true, true).await?;
        self.timing.wait_ms(RESET_SETTLE_MS).await;

        self.enter(InitState::NormalModeEntry);
        self.normal_mode().await?;

        self.enter(InitState::FilterApply);
        self.apply_filters(config).await?;

        self.enter(InitState::EoiConvergence);
        match self.converge(config).await? {
            Ok(attempts) => {
                self.enter(InitState::Ready);
                log_info!("SCHA63x ready after {} attempt(s)", attempts);
                Ok(InitReport { serial, cac, attempts })
            }
            Err((uno, due)) => {
                self.enter(InitState::Failed);
                log_error!("SCHA63x status not OK after {} attempts (UNO failed: {}, DUE failed: {})", MAX_ATTEMPTS, uno, due);
                Err(Error::StatusNotOk { uno, due })
            }
        }
    }

    fn enter(&mut self, next: InitState) {
        log_debug!("SCHA63x init {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    async fn send(&mut self, chip: Chip, frame: Frame) -> Result<Frame, Error<T::Error>> {
        self.transport
            .exchange(chip, frame.raw())
            .await
            .map(Frame)
            .map_err(Error::Bus)
    }

    /// Software reset; DUE must be in bank 0 for the reset register to exist
    async fn reset(&mut self, uno: bool, due: bool) -> Result<(), Error<T::Error>> {
        if uno {
            self.send(Chip::Uno, commands::SOFT_RESET).await?;
        }
        if due {
            self.send(Chip::Due, commands::SELECT_BANK_0).await?;
            self.send(Chip::Due, commands::SOFT_RESET).await?;
        }
        Ok(())
    }

    /// DUE latches the mode change only on the second write
    async fn normal_mode(&mut self) -> Result<(), Error<T::Error>> {
        self.send(Chip::Due, commands::NORMAL_MODE).await?;
        self.send(Chip::Due, commands::NORMAL_MODE).await?;
        self.send(Chip::Uno, commands::NORMAL_MODE).await?;
        self.timing.wait_ms(NORMAL_MODE_SETTLE_MS).await;
        Ok(())
    }

    async fn read_serial(&mut self) -> Result<SerialNumber, Error<T::Error>> {
        let [trc2, trc0, trc1, _] = pipelined(
            &mut *self.transport,
            Chip::Uno,
            &[commands::READ_TRC_2, commands::READ_TRC_0, commands::READ_TRC_1, commands::READ_TRC_1],
        )
        .await
        .map_err(Error::Bus)?;

        let field = |frame: Frame| frame.field(FieldKind::U16) as u16;
        Ok(SerialNumber::from_traceability(field(trc0), field(trc1), field(trc2)))
    }

    /// Three unlock writes, each followed by a mode read; the final extra
    /// read returns the mode register after the last unlock.
    async fn unlock_test_mode(&mut self) -> Result<bool, Error<T::Error>> {
        let responses = exchange_all(
            &mut *self.transport,
            Chip::Due,
            &[
                commands::UNLOCK_010,
                commands::READ_MODE,
                commands::UNLOCK_001,
                commands::READ_MODE,
                commands::UNLOCK_100,
                commands::READ_MODE,
                commands::READ_MODE,
            ],
        )
        .await
        .map_err(Error::Bus)?;

        let mode = responses[6].field(FieldKind::U16) as u16;
        log_debug!("SCHA63x DUE mode register {:#x}", mode);
        Ok(mode & TEST_MODE_MASK == TEST_MODE_MASK)
    }

    async fn read_cac(&mut self) -> Result<CrossAxisCompensation, Error<T::Error>> {
        self.send(Chip::Due, commands::SELECT_BANK_5).await?;
        let responses = pipelined(&mut *self.transport, Chip::Due, &commands::CAC_READS)
            .await
            .map_err(Error::Bus)?;

        // The answer to the bank select is dropped by the realignment and the
        // trailing repeat only carries the last answer back
        let mut words = [0u32; CAC_WORDS];
        for (word, response) in words.iter_mut().zip(responses.iter()) {
            *word = response.raw();
        }
        let cac = CrossAxisCompensation::from_words(&words);
        log_debug!("SCHA63x CAC cxx {} byy {}", cac.c[0][0], cac.b[1][1]);
        Ok(cac)
    }

    async fn write_uno_filters(&mut self, config: &FilterConfig) -> Result<(), Error<T::Error>> {
        self.send(Chip::Uno, build_filter_frame(FilterLayout::UnoGyro, config)).await?;
        self.send(Chip::Uno, build_filter_frame(FilterLayout::Accel, config)).await?;
        Ok(())
    }

    async fn write_due_filter(&mut self, config: &FilterConfig) -> Result<(), Error<T::Error>> {
        self.send(Chip::Due, build_filter_frame(FilterLayout::DueGyro, config)).await?;
        Ok(())
    }

    /// UNO filters, then a DUE restart before the DUE filter write
    async fn apply_filters(&mut self, config: &FilterConfig) -> Result<(), Error<T::Error>> {
        self.write_uno_filters(config).await?;

        self.reset(false, true).await?;
        self.timing.wait_ms(RESET_SETTLE_MS).await;
        self.send(Chip::Due, commands::NORMAL_MODE).await?;
        self.send(Chip::Due, commands::NORMAL_MODE).await?;
        self.timing.wait_ms(SPI_ACCESS_MS).await;

        self.write_due_filter(config).await
    }

    /// Full restart used between failed convergence attempts
    async fn restart(&mut self, config: &FilterConfig) -> Result<(), Error<T::Error>> {
        self.reset(true, true).await?;
        self.timing.wait_ms(RESET_SETTLE_MS).await;
        self.send(Chip::Uno, commands::NORMAL_MODE).await?;
        self.send(Chip::Due, commands::NORMAL_MODE).await?;
        self.send(Chip::Due, commands::NORMAL_MODE).await?;
        self.timing.wait_ms(RETRY_NORMAL_MODE_MS).await;
        self.write_uno_filters(config).await?;
        self.write_due_filter(config).await?;
        self.timing.wait_ms(RETRY_FILTER_MS).await;
        Ok(())
    }

    /// Summary status is read twice per pair since the first read after a
    /// mode change may report a failure.
    async fn is_healthy(&mut self, chip: Chip) -> Result<bool, Error<T::Error>> {
        let mut last = Frame(0);
        for pair in 0..2 {
            if pair > 0 {
                self.timing.wait_ms(STATUS_READ_GAP_MS).await;
            }
            self.send(chip, commands::READ_SUMMARY_STATUS).await?;
            last = self.send(chip, commands::READ_SUMMARY_STATUS).await?;
        }
        Ok(last.is_trusted())
    }

    /// Returns `Ok(attempts)` on success or the per-chip failure flags
    async fn converge(&mut self, config: &FilterConfig) -> Result<Result<u8, (bool, bool)>, Error<T::Error>> {
        let mut settle_ms = config.settle_time_ms();
        let mut failed = (true, true);

        for attempt in 1..=MAX_ATTEMPTS {
            log_info!("SCHA63x startup attempt {} (waiting {} ms)", attempt, settle_ms);
            self.timing.wait_ms(settle_ms).await;

            self.send(Chip::Uno, commands::SET_EOI).await?;
            self.send(Chip::Due, commands::SET_EOI).await?;

            let uno_ok = self.is_healthy(Chip::Uno).await?;
            let due_ok = self.is_healthy(Chip::Due).await?;

            let (due_common1, due_common2) = telemetry::read_common_status(&mut *self.transport, Chip::Due)
                .await
                .map_err(Error::Bus)?;
            let (uno_common1, uno_common2) = telemetry::read_common_status(&mut *self.transport, Chip::Uno)
                .await
                .map_err(Error::Bus)?;
            log_debug!(
                "SCHA63x common status UNO {:#x}/{:#x} DUE {:#x}/{:#x}",
                uno_common1,
                uno_common2,
                due_common1,
                due_common2
            );

            if uno_ok && due_ok {
                return Ok(Ok(attempt));
            }
            failed = (!uno_ok, !due_ok);
            log_warn!("SCHA63x attempt {} failed (UNO ok: {}, DUE ok: {})", attempt, uno_ok, due_ok);

            if attempt < MAX_ATTEMPTS {
                self.restart(config).await?;
                settle_ms = RETRY_SETTLE_MS;
            }
        }
        Ok(Err(failed))
    }
}
