//! A convenience wrapper for JTAG scan chains with multiple TAPs present.  `Taps` allows the
//! client to interact with one selected TAP as if it were the only TAP in the chain, so that the
//! client doesn't have to deal with putting the other TAPs into bypass and shifting data through
//! the bypass registers.
//!
//! Chain positions count from the TAP nearest TDO, which is the order the IDCODEs come out in.
use alloc::vec::Vec;
use alloc::vec;

use log::{info, trace, warn};

use crate::cable::Cable;
use crate::statemachine::{JtagSM, JtagState, Register};
use crate::transport::Transport;
use crate::{Error, Result};

/// Chains longer than this are refused; a chain this long means the wiring is wrong
pub const MAX_TAPS: usize = 32;

// Copy `bits` bits of `src`, LSB first, into `dst` starting at bit `offset`
fn put_bits(dst: &mut [u8], offset: usize, src: &[u8], bits: usize) {
    for i in 0..bits {
        let bit = src[i / 8] & (1 << (i % 8)) != 0;
        let at = offset + i;
        if bit {
            dst[at / 8] |= 1 << (at % 8);
        } else {
            dst[at / 8] &= !(1 << (at % 8));
        }
    }
}

// Extract `bits` bits of `src` starting at bit `offset`, packed LSB first
fn take_bits(src: &[u8], offset: usize, bits: usize) -> Vec<u8> {
    let mut output = vec![0; (bits + 7) / 8];
    for i in 0..bits {
        let at = offset + i;
        if src[at / 8] & (1 << (at % 8)) != 0 {
            output[i / 8] |= 1 << (i % 8);
        }
    }
    output
}

// How many bits of the final byte are used when shifting `total` bits
fn last_byte_bits(total: usize) -> u8 {
    match total % 8 {
        0 => 8,
        n => n as u8,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Tap {
    idcode: u32,
    irlen: Option<usize>,
}

pub struct Taps<T> {
    pub sm: JtagSM<T>,
    taps: Vec<Tap>,
    active: usize,
    verbose: bool,
}

impl<T, U> Taps<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// Create an object using an existing `JtagSM` object
    pub fn new(sm: JtagSM<T>) -> Self {
        Self {
            sm,
            taps: Vec::new(),
            active: 0,
            verbose: false,
        }
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    fn log_shift(&self, what: &str, data: &[u8], bits: usize) {
        if self.verbose {
            info!("tap {}: {} {} bits {:02x?}", self.active, what, bits, data);
        } else {
            trace!("tap {}: {} {} bits {:02x?}", self.active, what, bits, data);
        }
    }

    // IR lengths of every TAP, or the first position that doesn't have one yet
    fn ir_lengths(&self) -> Result<Vec<usize>> {
        self.taps.iter()
            .enumerate()
            .map(|(i, t)| t.irlen.ok_or(Error::UnresolvedIrLength(i)))
            .collect()
    }

    fn check_active(&self) -> Result<()> {
        if self.active < self.taps.len() {
            Ok(())
        } else {
            Err(Error::InvalidPosition {
                position: self.active as i64,
                length: self.taps.len(),
            })
        }
    }
}

impl<T, U> Transport for Taps<T>
    where T: core::ops::DerefMut<Target=U>,
          U: Cable + ?Sized
{
    /// After a reset every TAP with an IDCODE register has it selected, so the DR chain is the
    /// IDCODEs of every TAP back to back.  Keep reading 32 bit words until TDI's ones come out
    /// the other end.
    fn detect_chain(&mut self) -> Result<usize> {
        self.taps = Vec::new();
        self.active = 0;
        self.sm.mode_reset()?;

        loop {
            let word = self.sm.read_reg(Register::Data, 32)?;
            let idcode = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            if idcode == 0 || idcode == 0xffff_ffff {
                break;
            }
            if self.taps.len() == MAX_TAPS {
                warn!("still finding IDCODEs after {} TAPs, check the cable", MAX_TAPS);
                self.taps = Vec::new();
                self.sm.mode_reset()?;
                return Err(Error::ChainTooLong { max: MAX_TAPS });
            }
            info!("found tap {} idcode {:08x}", self.taps.len(), idcode);
            self.taps.push(Tap {
                idcode,
                irlen: None,
            });
        }

        self.sm.mode_reset()?;
        Ok(self.taps.len())
    }

    fn device_id(&self, position: usize) -> Option<u32> {
        self.taps.get(position).map(|t| t.idcode)
    }

    fn set_ir_length(&mut self, position: usize, bits: usize) {
        assert!(bits > 0);
        self.taps[position].irlen = Some(bits);
    }

    fn select_device(&mut self, position: usize) {
        self.active = position;
    }

    /// Instruction registers are shifted chain-wide: every other TAP gets all ones (BYPASS), and
    /// the TAPs nearer TDO than the selected one come first in the shift.
    fn shift_ir(&mut self, ir: &[u8]) -> Result<Vec<u8>> {
        self.check_active()?;
        let lens = self.ir_lengths()?;
        let this_irlen = lens[self.active];
        assert_eq!(ir.len(), (this_irlen + 7) / 8);

        let total: usize = lens.iter().sum();
        let offset: usize = lens[..self.active].iter().sum();
        let mut buf = vec![0xff; (total + 7) / 8];
        put_bits(&mut buf, offset, ir, this_irlen);

        self.log_shift("IR <-", ir, this_irlen);
        let out = self.sm.read_write_reg(Register::Instruction, &buf, last_byte_bits(total), true)?;
        // Go through Update-IR so the instruction takes effect
        self.sm.change_mode(JtagState::Idle)?;

        let captured = take_bits(&out, offset, this_irlen);
        self.log_shift("IR ->", &captured, this_irlen);
        Ok(captured)
    }

    /// Every TAP but the selected one is in BYPASS and contributes a single bit.
    fn shift_dr(&mut self, dr: &[u8], bits: usize) -> Result<Vec<u8>> {
        self.check_active()?;
        assert!(bits > 0);
        assert!(dr.len() * 8 >= bits);

        let offset = self.active;
        let total = bits + self.taps.len() - 1;
        let mut buf = vec![0; (total + 7) / 8];
        put_bits(&mut buf, offset, dr, bits);

        self.log_shift("DR <-", dr, bits);
        let out = self.sm.read_write_reg(Register::Data, &buf, last_byte_bits(total), true)?;
        self.sm.change_mode(JtagState::Idle)?;

        let captured = take_bits(&out, offset, bits);
        self.log_shift("DR ->", &captured, bits);
        Ok(captured)
    }

    fn reset_logic(&mut self) -> Result<()> {
        self.sm.mode_reset()?;
        Ok(())
    }

    fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }
}
