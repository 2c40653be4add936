//! The operations chain enumeration and DNA extraction need from the layers below.  `Taps`
//! implements this on top of any `Cable`; tests substitute their own implementations.
use alloc::vec::Vec;

use crate::Result;

pub trait Transport {
    /// Scan the chain and return how many TAPs are on it.  Every TAP found starts out with an
    /// unknown IR length.
    fn detect_chain(&mut self) -> Result<usize>;
    /// IDCODE of the TAP at `position`, as found by the last `detect_chain`
    fn device_id(&self, position: usize) -> Option<u32>;
    /// Record the IR length of the TAP at `position`
    fn set_ir_length(&mut self, position: usize, bits: usize);
    /// Make `position` the target of `shift_ir` and `shift_dr`.  Touches no hardware.
    fn select_device(&mut self, position: usize);
    /// Shift `ir` into the selected TAP's instruction register while every other TAP gets
    /// BYPASS.  Returns the bits captured from the selected TAP's instruction register.
    fn shift_ir(&mut self, ir: &[u8]) -> Result<Vec<u8>>;
    /// Shift `bits` bits of `dr` through the selected TAP's data register, returning the bits
    /// shifted out of it.
    fn shift_dr(&mut self, dr: &[u8], bits: usize) -> Result<Vec<u8>>;
    /// Put every TAP into Test-Logic-Reset
    fn reset_logic(&mut self) -> Result<()>;
    fn set_verbose(&mut self, verbose: bool);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn detect_chain(&mut self) -> Result<usize> {
        (**self).detect_chain()
    }

    fn device_id(&self, position: usize) -> Option<u32> {
        (**self).device_id(position)
    }

    fn set_ir_length(&mut self, position: usize, bits: usize) {
        (**self).set_ir_length(position, bits)
    }

    fn select_device(&mut self, position: usize) {
        (**self).select_device(position)
    }

    fn shift_ir(&mut self, ir: &[u8]) -> Result<Vec<u8>> {
        (**self).shift_ir(ir)
    }

    fn shift_dr(&mut self, dr: &[u8], bits: usize) -> Result<Vec<u8>> {
        (**self).shift_dr(dr, bits)
    }

    fn reset_logic(&mut self) -> Result<()> {
        (**self).reset_logic()
    }

    fn set_verbose(&mut self, verbose: bool) {
        (**self).set_verbose(verbose)
    }
}
