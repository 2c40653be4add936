//! A `Cable` that drives a simulated scan chain instead of hardware.  Every clock moves the
//! simulated TAP controllers through the real state machine, and each `SimTap` has an
//! instruction register, an IDCODE, BYPASS, and whatever data registers it was built with.
//!
//! ```
//! use jtag_dna::cable::sim::{SimCable, SimTap};
//! use jtag_dna::statemachine::JtagSM;
//! use jtag_dna::taps::Taps;
//! use jtag_dna::transport::Transport;
//!
//! let cable = SimCable::new(vec![SimTap::new(0x0222_8093, 6)]);
//! let mut taps = Taps::new(JtagSM::new(Box::new(cable)));
//! assert_eq!(taps.detect_chain().unwrap(), 1);
//! assert_eq!(taps.device_id(0), Some(0x0222_8093));
//! ```
use alloc::vec::Vec;

use crate::cable::{Cable, CableError};
use crate::statemachine::JtagState;

#[derive(Clone, Debug)]
pub struct SimTap {
    idcode: u32,
    irlen: usize,
    ir_capture: u64,
    // (captures, value): the Capture-IR value changes once this many captures have happened
    ir_capture_later: Option<(usize, u64)>,
    // (instruction, length, value)
    registers: Vec<(u32, usize, u64)>,

    // None while the TAP is holding IDCODE after a reset
    instruction: Option<u32>,
    shift: u64,
    shift_len: usize,
    captures: usize,
    history: Vec<u32>,
}

impl SimTap {
    /// A TAP with the given IDCODE and IR length.  An IDCODE of zero makes a TAP that has no
    /// IDCODE register and comes out of reset in BYPASS.
    pub fn new(idcode: u32, irlen: usize) -> Self {
        assert!(irlen > 0 && irlen <= 32);
        Self {
            idcode,
            irlen,
            ir_capture: 0b01,
            ir_capture_later: None,
            registers: Vec::new(),
            instruction: None,
            shift: 0,
            shift_len: 1,
            captures: 0,
            history: Vec::new(),
        }
    }

    /// Value loaded into the instruction register in Capture-IR
    pub fn with_ir_capture(mut self, value: u64) -> Self {
        self.ir_capture = value;
        self
    }

    /// After `captures` passes through Capture-IR, capture `value` instead
    pub fn with_ir_capture_after(mut self, captures: usize, value: u64) -> Self {
        self.ir_capture_later = Some((captures, value));
        self
    }

    /// A data register of `bits` length selected by `instruction`, capturing `value`
    pub fn with_register(mut self, instruction: u32, bits: usize, value: u64) -> Self {
        assert!(bits > 0 && bits <= 64);
        self.registers.push((instruction, bits, value));
        self
    }

    pub fn idcode(&self) -> u32 {
        self.idcode
    }

    /// Every instruction latched in Update-IR, oldest first
    pub fn instructions(&self) -> &[u32] {
        &self.history
    }

    pub fn count(&self, instruction: u32) -> usize {
        self.history.iter().filter(|i| **i == instruction).count()
    }

    fn ir_mask(&self) -> u64 {
        (1 << self.irlen) - 1
    }

    fn reset(&mut self) {
        self.instruction = None;
    }

    fn capture_ir(&mut self) {
        self.captures += 1;
        let value = match self.ir_capture_later {
            Some((after, value)) if self.captures > after => value,
            _ => self.ir_capture,
        };
        self.shift = value & self.ir_mask();
        self.shift_len = self.irlen;
    }

    fn capture_dr(&mut self) {
        let (len, value) = match self.instruction {
            None if self.idcode != 0 => (32, self.idcode as u64),
            None => (1, 0),
            Some(instruction) => self.registers.iter()
                .find(|r| r.0 == instruction)
                .map(|r| (r.1, r.2))
                .unwrap_or((1, 0)),
        };
        self.shift = value;
        self.shift_len = len;
    }

    fn update_ir(&mut self) {
        let instruction = (self.shift & self.ir_mask()) as u32;
        self.instruction = Some(instruction);
        self.history.push(instruction);
    }

    fn shift_bit(&mut self, tdi: bool) -> bool {
        let tdo = self.shift & 1 != 0;
        self.shift >>= 1;
        if tdi {
            self.shift |= 1 << (self.shift_len - 1);
        }
        tdo
    }
}

/// A scan chain of `SimTap`s.  Index 0 is the TAP nearest TDO.  The chain starts in Run-Test/Idle
/// with every TAP holding IDCODE.
pub struct SimCable {
    taps: Vec<SimTap>,
    state: JtagState,
    resets: usize,
    // number of cable calls allowed to succeed, if limited
    fail_after: Option<usize>,
    calls: usize,
}

impl SimCable {
    pub fn new(taps: Vec<SimTap>) -> Self {
        Self {
            taps,
            state: JtagState::Idle,
            resets: 0,
            fail_after: None,
            calls: 0,
        }
    }

    /// Let `calls` cable operations succeed, then report the cable as disconnected
    pub fn fail_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    pub fn tap(&self, position: usize) -> &SimTap {
        &self.taps[position]
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// How many times the chain has entered Test-Logic-Reset
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Number of cable operations performed so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn call(&mut self) -> Result<(), CableError> {
        if self.fail_after.is_some_and(|n| self.calls >= n) {
            return Err(CableError::Disconnected);
        }
        self.calls += 1;
        Ok(())
    }

    fn clock(&mut self, tms: bool, tdi: bool) -> bool {
        // TDO floats high outside of the shift states
        let mut tdo = true;
        if self.state.is_shift() {
            tdo = tdi;
            for tap in self.taps.iter_mut().rev() {
                tdo = tap.shift_bit(tdo);
            }
        }

        let next = self.state.next(tms);
        match next {
            JtagState::CaptureIR => self.taps.iter_mut().for_each(SimTap::capture_ir),
            JtagState::CaptureDR => self.taps.iter_mut().for_each(SimTap::capture_dr),
            JtagState::UpdateIR => self.taps.iter_mut().for_each(SimTap::update_ir),
            JtagState::Reset if self.state != JtagState::Reset => {
                self.resets += 1;
                self.taps.iter_mut().for_each(SimTap::reset);
            }
            _ => {}
        }
        self.state = next;
        tdo
    }

    fn shift(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Vec<u8> {
        assert!(bits <= 8);
        assert!(bits != 0);

        let total = (data.len() - 1) * 8 + bits as usize;
        let mut out = alloc::vec![0; data.len()];
        for i in 0..total {
            let tdi = data[i / 8] & (1 << (i % 8)) != 0;
            let last = i == total - 1;
            if self.clock(last && pause_after, tdi) {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        if pause_after {
            self.clock(false, true);
        }
        out
    }
}

impl Cable for SimCable {
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError> {
        self.call()?;
        for x in tms {
            self.clock(*x, tdi);
        }
        Ok(())
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        self.call()?;
        let mut buf = alloc::vec![0; (bits + 7) / 8];
        for i in 0..bits {
            if self.clock(false, true) {
                buf[i / 8] |= 1 << (i % 8);
            }
        }
        Ok(buf)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.call()?;
        self.shift(data, bits, pause_after);
        Ok(())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool)
        -> Result<Vec<u8>, CableError>
    {
        self.call()?;
        Ok(self.shift(data, bits, pause_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn idcodes_come_out_nearest_tdo_first() {
        let mut sim = SimCable::new(vec![
            SimTap::new(0x1111_1093, 6),
            SimTap::new(0x2222_2093, 8),
        ]);
        sim.change_mode(&[true; 5], true).unwrap();
        sim.change_mode(&[false, true, false, false], true).unwrap();
        assert_eq!(sim.state(), JtagState::ShiftDR);

        let bits = sim.read_data(96).unwrap();
        assert_eq!(bits[0..4], 0x1111_1093u32.to_le_bytes());
        assert_eq!(bits[4..8], 0x2222_2093u32.to_le_bytes());
        assert_eq!(bits[8..12], [0xffu8; 4]);
    }

    #[test]
    fn instructions_are_latched_in_update_ir() {
        let mut sim = SimCable::new(vec![SimTap::new(0x1111_1093, 6)]);
        sim.change_mode(&[true, true, false, false], true).unwrap();
        assert_eq!(sim.state(), JtagState::ShiftIR);

        let captured = sim.read_write_data(&[0x31], 6, true).unwrap();
        assert_eq!(captured, vec![0x01]);
        assert_eq!(sim.state(), JtagState::PauseIR);
        assert!(sim.tap(0).instructions().is_empty());

        sim.change_mode(&[true, true, false], true).unwrap();
        assert_eq!(sim.state(), JtagState::Idle);
        assert_eq!(sim.tap(0).instructions(), &[0x31]);
    }

    #[test]
    fn capture_value_changes_after_enough_captures() {
        let mut tap = SimTap::new(0x1111_1093, 6).with_ir_capture_after(1, 0x11);
        tap.capture_ir();
        assert_eq!(tap.shift, 0x01);
        tap.capture_ir();
        assert_eq!(tap.shift, 0x11);
    }

    #[test]
    fn resets_count_entries_only() {
        let mut sim = SimCable::new(vec![]);
        sim.change_mode(&[true; 8], true).unwrap();
        assert_eq!(sim.resets(), 1);
        sim.change_mode(&[false, true, true, true], true).unwrap();
        assert_eq!(sim.resets(), 2);
    }

    #[test]
    fn injected_failure() {
        let mut sim = SimCable::new(vec![]).fail_after(1);
        assert!(sim.change_mode(&[true; 5], true).is_ok());
        assert!(matches!(sim.read_data(8), Err(CableError::Disconnected)));
    }
}
