//! This provides a higher-level interface than the `Cable` trait.  Specifically, it keeps track of
//! the state of the JTAG state machine, and allows setting the state to any desired state.
//! `JtagSM` will get to that state by the most efficient path, based on the current state.
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use alloc::vec;

use crate::cable::{Cable, CableError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    Data,
    Instruction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

use JtagState::*;

#[cfg(test)]
const ALL_STATES: [JtagState; 16] = [
    Reset, Idle,
    SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
    SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
];

// (next state with TMS low, next state with TMS high), indexed by state
const EDGES: [(JtagState, JtagState); 16] = [
    (Idle, Reset),
    (Idle, SelectDR),
    (CaptureDR, SelectIR),
    (ShiftDR, Exit1DR),
    (ShiftDR, Exit1DR),
    (PauseDR, UpdateDR),
    (PauseDR, Exit2DR),
    (ShiftDR, UpdateDR),
    (Idle, SelectDR),
    (CaptureIR, Reset),
    (ShiftIR, Exit1IR),
    (ShiftIR, Exit1IR),
    (PauseIR, UpdateIR),
    (PauseIR, Exit2IR),
    (ShiftIR, UpdateIR),
    (Idle, SelectDR),
];

impl JtagState {
    /// The state the TAP controller moves to on the next clock, given the TMS level
    pub fn next(self, tms: bool) -> JtagState {
        let (low, high) = EDGES[self as usize];
        if tms { high } else { low }
    }

    /// Shortest TMS sequence that moves from `self` to `target`.  Empty if they're the same.
    pub fn path_to(self, target: JtagState) -> Vec<bool> {
        // Breadth-first search; the graph is tiny so there's no point in caching paths
        let mut from: [Option<(JtagState, bool)>; 16] = [None; 16];
        let mut seen = [false; 16];
        let mut queue = VecDeque::new();
        seen[self as usize] = true;
        queue.push_back(self);

        while let Some(state) = queue.pop_front() {
            if state == target {
                break;
            }
            for tms in [false, true] {
                let next = state.next(tms);
                if !seen[next as usize] {
                    seen[next as usize] = true;
                    from[next as usize] = Some((state, tms));
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![];
        let mut state = target;
        while let Some((prev, tms)) = from[state as usize] {
            path.push(tms);
            state = prev;
        }
        path.reverse();
        path
    }

    pub fn is_shift(self) -> bool {
        self == ShiftDR || self == ShiftIR
    }
}

/// Five clocks with TMS high reach Test-Logic-Reset from any state
const RESET_TMS: [bool; 5] = [true; 5];

pub struct JtagSM<T> {
    pub cable: T,
    // None until the first reset; nothing is known about the TAPs before that
    state: Option<JtagState>,
}

impl<T, U> JtagSM<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create a JTAG state machine using an existing `Cable`
    pub fn new(cable: T) -> Self {
        Self {
            cable,
            state: None,
        }
    }

    pub fn state(&self) -> Option<JtagState> {
        self.state
    }

    /// Reset the scan chain by driving TMS high for 5 clocks
    pub fn mode_reset(&mut self) -> Result<(), CableError> {
        // Forget the old state first: if the cable fails part way, we no longer know where we are
        self.state = None;
        self.cable.change_mode(&RESET_TMS, true)?;
        self.state = Some(Reset);
        Ok(())
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) -> Result<(), CableError> {
        let current = match self.state {
            Some(current) => current,
            None => {
                self.mode_reset()?;
                Reset
            }
        };
        if current == state {
            return Ok(());
        }

        let path = current.path_to(state);
        log::trace!("path from {:?} to {:?}: {:?}", current, state, path);
        self.state = None;
        self.cable.change_mode(&path, true)?;
        self.state = Some(state);
        Ok(())
    }

    fn enter_shift(&mut self, reg: Register) -> Result<(), CableError> {
        match reg {
            Register::Data => self.change_mode(ShiftDR),
            Register::Instruction => self.change_mode(ShiftIR),
        }
    }

    fn after_shift(&mut self, reg: Register, pause_after: bool) {
        if pause_after {
            self.state = Some(match reg {
                Register::Data => PauseDR,
                Register::Instruction => PauseIR,
            });
        }
    }

    /// Read `bits` from either the instruction or data register
    pub fn read_reg(&mut self, reg: Register, bits: usize) -> Result<Vec<u8>, CableError> {
        self.enter_shift(reg)?;
        self.cable.read_data(bits)
    }

    /// Write `data` into either the instruction or data register.  `bits` indicates how many bits
    /// of the last byte should be written (8 indicates that the entire byte should be written).
    /// The mode will either be ShiftIR / ShiftDR if `pause_after` is false, or PauseIR / PauseDR
    /// if `pause_after` is true.  This allows for setting the register with multiple calls to
    /// `write_reg`, which may be more convenient than manual bit-shifting.
    pub fn write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool)
        -> Result<(), CableError>
    {
        self.enter_shift(reg)?;
        self.cable.write_data(data, bits, pause_after)?;
        self.after_shift(reg, pause_after);
        Ok(())
    }

    /// Similar to `write_reg` except it returns the bits that were shifted out during writing.
    pub fn read_write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool)
        -> Result<Vec<u8>, CableError>
    {
        self.enter_shift(reg)?;
        let data = self.cable.read_write_data(data, bits, pause_after)?;
        self.after_shift(reg, pause_after);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    fn walk(from: JtagState, path: &[bool]) -> JtagState {
        path.iter().fold(from, |state, tms| state.next(*tms))
    }

    #[test]
    fn every_state_reaches_every_other_state() {
        for from in ALL_STATES {
            for to in ALL_STATES {
                let path = from.path_to(to);
                assert_eq!(walk(from, &path), to, "{:?} -> {:?} via {:?}", from, to, path);
            }
        }
    }

    #[test]
    fn known_shortest_paths() {
        assert_eq!(Idle.path_to(ShiftDR), vec![true, false, false]);
        assert_eq!(Idle.path_to(ShiftIR), vec![true, true, false, false]);
        assert_eq!(PauseIR.path_to(Idle), vec![true, true, false]);
        assert_eq!(Reset.path_to(Reset), Vec::<bool>::new());
    }

    #[test]
    fn five_high_clocks_reset_from_anywhere() {
        for from in ALL_STATES {
            assert_eq!(walk(from, &RESET_TMS), Reset);
        }
    }

    #[test]
    fn update_ir_leads_to_select_dr() {
        assert_eq!(UpdateIR.next(true), SelectDR);
        assert_eq!(UpdateDR.next(true), SelectDR);
    }

    #[test]
    fn unknown_state_resets_before_moving() {
        let sim = crate::cable::sim::SimCable::new(vec![]);
        let mut sm = JtagSM::new(Box::new(sim));
        assert_eq!(sm.state(), None);
        sm.change_mode(Idle).unwrap();
        assert_eq!(sm.state(), Some(Idle));
        assert_eq!(sm.cable.state(), Idle);
        assert_eq!(sm.cable.resets(), 1);
    }

    #[test]
    fn write_with_pause_lands_in_pause() {
        let sim = crate::cable::sim::SimCable::new(vec![]);
        let mut sm = JtagSM::new(Box::new(sim));
        sm.mode_reset().unwrap();
        sm.write_reg(Register::Instruction, &[0xff], 3, true).unwrap();
        assert_eq!(sm.state(), Some(PauseIR));
        assert_eq!(sm.cable.state(), PauseIR);
    }
}
