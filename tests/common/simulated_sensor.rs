//! Simulated SCHA63x for driving the real driver code in tests
//!
//! Models what the driver depends on:
//! - one-exchange response latency per chip-select line
//! - register banks, with bank 5 NVM readable only in test mode
//! - the three-write test-mode unlock
//! - soft reset (ignored on a chip outside bank 0)
//! - return-status fault injection around end-of-initialization
//! - CRC checking of requests and optional corruption of responses

use scha63x::frame::{registers, Frame};
use scha63x::{Chip, Transport};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Return-status codes on the wire
pub const RS_OK: u8 = 1;
pub const RS_STALE: u8 = 2;
pub const RS_ERROR: u8 = 3;

/// Bank holding the cross-axis compensation NVM
pub const CAC_BANK: u8 = 5;
/// NVM words of the cross-axis compensation, in read order
pub const CAC_REGISTERS: [u8; 9] = [0x0B, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x1B, 0x1C];

/// Transport failure raised on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

#[derive(Debug, Default)]
struct ChipState {
    registers: HashMap<(u8, u8), u16>,
    bank: u8,
    pending: u32,
    unlock_step: u8,
    test_mode: bool,
    eoi: bool,
    /// Number of upcoming EOI writes after which the chip reports errors
    unhealthy_eois: usize,
    /// Report errors after every EOI, forever
    never_healthy: bool,
    /// Answer with this status on every response regardless of health
    forced_status: Option<u8>,
    faulted: bool,
    refuse_test_mode: bool,
    corrupt_responses: bool,
    resets: usize,
    eoi_writes: usize,
}

impl ChipState {
    fn reset(&mut self) {
        self.bank = 0;
        self.unlock_step = 0;
        self.test_mode = false;
        self.eoi = false;
        self.faulted = false;
        self.resets += 1;
    }

    fn status(&self) -> u8 {
        if let Some(rs) = self.forced_status {
            return rs;
        }
        if self.faulted {
            RS_ERROR
        } else {
            RS_OK
        }
    }

    fn write(&mut self, address: u8, data: u16) {
        match address {
            registers::SELBANK => self.bank = data as u8,
            registers::RESCTRL if self.bank == 0 && data & 0x0001 != 0 => self.reset(),
            registers::RESCTRL if data & 0x0002 != 0 => {
                self.eoi = true;
                self.eoi_writes += 1;
                if self.never_healthy {
                    self.faulted = true;
                } else if self.unhealthy_eois > 0 {
                    self.unhealthy_eois -= 1;
                    self.faulted = true;
                }
            }
            registers::MODE => {
                self.unlock_step = match (self.unlock_step, data) {
                    (0, 0x0010) => 1,
                    (1, 0x0008) => 2,
                    (2, 0x0020) => 3,
                    _ => 0,
                };
                self.test_mode = self.unlock_step == 3 && !self.refuse_test_mode;
                self.registers.insert((self.bank, address), data);
            }
            _ => {
                self.registers.insert((self.bank, address), data);
            }
        }
    }

    fn read(&self, address: u8) -> u16 {
        if address == registers::MODE && self.bank == 0 {
            return if self.test_mode { 0x0007 } else { 0x0000 };
        }
        if self.bank == CAC_BANK && !self.test_mode {
            return 0;
        }
        self.registers.get(&(self.bank, address)).copied().unwrap_or(0)
    }

    /// Handle one request and return the answer to the previous one
    fn exchange(&mut self, request: u32) -> u32 {
        let frame = Frame(request);
        let answer = if !frame.crc_ok() {
            Frame::with_status(false, frame.address(), RS_ERROR, 0)
        } else if frame.is_write() {
            self.write(frame.address(), frame.payload());
            Frame::with_status(true, frame.address(), self.status(), frame.payload())
        } else {
            Frame::with_status(false, frame.address(), self.status(), self.read(frame.address()))
        };
        let mut answer = answer.raw();
        if self.corrupt_responses {
            answer ^= 1 << 12;
        }
        std::mem::replace(&mut self.pending, answer)
    }
}

#[derive(Debug, Default)]
struct SimState {
    uno: ChipState,
    due: ChipState,
    log: Vec<(Chip, u32)>,
    fail_after: Option<usize>,
}

impl SimState {
    fn chip(&mut self, chip: Chip) -> &mut ChipState {
        match chip {
            Chip::Uno => &mut self.uno,
            Chip::Due => &mut self.due,
        }
    }
}

/// Simulated sensor; clones share state so a test can keep a handle after
/// moving one into the driver.
#[derive(Debug, Clone, Default)]
pub struct SimulatedScha63x {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedScha63x {
    /// A healthy sensor with serial number `01234f00AB` and zeroed CAC NVM
    pub fn new() -> Self {
        let sim = Self::default();
        sim.set_traceability(0x00AB, 1234, 0x0F00);
        sim
    }

    pub fn set_register(&self, chip: Chip, bank: u8, address: u8, value: u16) {
        self.state.borrow_mut().chip(chip).registers.insert((bank, address), value);
    }

    /// UNO traceability registers TRC0, TRC1, TRC2
    pub fn set_traceability(&self, trc0: u16, trc1: u16, trc2: u16) {
        self.set_register(Chip::Uno, 0, registers::TRC_0, trc0);
        self.set_register(Chip::Uno, 0, registers::TRC_1, trc1);
        self.set_register(Chip::Uno, 0, registers::TRC_2, trc2);
    }

    /// Store nine `(low, high)` byte pairs in DUE's CAC NVM
    pub fn set_cac_pairs(&self, pairs: [(i8, i8); 9]) {
        for (address, (low, high)) in CAC_REGISTERS.iter().zip(pairs) {
            let value = ((high as u8 as u16) << 8) | low as u8 as u16;
            self.set_register(Chip::Due, CAC_BANK, *address, value);
        }
    }

    /// Sensor output registers in bank 0
    pub fn set_outputs(&self, accel: [i16; 3], gyro: [i16; 3], temp_uno: i16, temp_due: i16) {
        self.set_register(Chip::Uno, 0, registers::ACC_X, accel[0] as u16);
        self.set_register(Chip::Uno, 0, registers::ACC_Y, accel[1] as u16);
        self.set_register(Chip::Uno, 0, registers::ACC_Z, accel[2] as u16);
        self.set_register(Chip::Uno, 0, registers::RATE_X, gyro[0] as u16);
        self.set_register(Chip::Due, 0, registers::RATE_Y, gyro[1] as u16);
        self.set_register(Chip::Due, 0, registers::RATE_Z, gyro[2] as u16);
        self.set_register(Chip::Uno, 0, registers::TEMP, temp_uno as u16);
        self.set_register(Chip::Due, 0, registers::TEMP, temp_due as u16);
    }

    pub fn refuse_test_mode(&self) {
        self.state.borrow_mut().due.refuse_test_mode = true;
    }

    /// Report errors after the next `count` EOI writes on `chip`
    pub fn fail_next_eois(&self, chip: Chip, count: usize) {
        self.state.borrow_mut().chip(chip).unhealthy_eois = count;
    }

    pub fn never_healthy(&self, chip: Chip) {
        self.state.borrow_mut().chip(chip).never_healthy = true;
    }

    pub fn force_status(&self, chip: Chip, rs: u8) {
        self.state.borrow_mut().chip(chip).forced_status = Some(rs);
    }

    pub fn corrupt_responses(&self, chip: Chip) {
        self.state.borrow_mut().chip(chip).corrupt_responses = true;
    }

    /// Fail every exchange after `count` successful ones
    pub fn fail_after(&self, count: usize) {
        self.state.borrow_mut().fail_after = Some(count);
    }

    pub fn log(&self) -> Vec<(Chip, u32)> {
        self.state.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    pub fn requests_to(&self, chip: Chip) -> Vec<u32> {
        self.state
            .borrow()
            .log
            .iter()
            .filter(|(c, _)| *c == chip)
            .map(|(_, frame)| *frame)
            .collect()
    }

    pub fn count(&self, chip: Chip, frame: Frame) -> usize {
        self.requests_to(chip).iter().filter(|&&f| f == frame.raw()).count()
    }

    pub fn eoi_writes(&self, chip: Chip) -> usize {
        self.state.borrow_mut().chip(chip).eoi_writes
    }

    pub fn resets(&self, chip: Chip) -> usize {
        self.state.borrow_mut().chip(chip).resets
    }

    pub fn register(&self, chip: Chip, bank: u8, address: u8) -> Option<u16> {
        self.state.borrow_mut().chip(chip).registers.get(&(bank, address)).copied()
    }

    pub fn in_test_mode(&self, chip: Chip) -> bool {
        self.state.borrow_mut().chip(chip).test_mode
    }
}

impl Transport for SimulatedScha63x {
    type Error = BusFault;

    async fn exchange(&mut self, chip: Chip, frame: u32) -> Result<u32, BusFault> {
        let mut state = self.state.borrow_mut();
        if let Some(remaining) = state.fail_after.as_mut() {
            if *remaining == 0 {
                return Err(BusFault);
            }
            *remaining -= 1;
        }
        state.log.push((chip, frame));
        Ok(state.chip(chip).exchange(frame))
    }
}
