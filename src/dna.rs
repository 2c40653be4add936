//! Reading the DNA of a Spartan-3A class FPGA.
//!
//! ISC_DNA only works while the device is unconfigured (Xilinx AR #29977), so the sequence is:
//!
//! 1. JPROGRAM, which clears the configuration
//! 2. CFG_IN until its IR capture shows the configuration memory has been cleared
//! 3. ISC_ENABLE, then ISC_DNA, then shift the 64 bit DNA register out
//! 4. ISC_DISABLE, Test-Logic-Reset, and JPROGRAM again so the device reloads from its usual
//!    configuration source (AR #16829)
//!
//! Step 4 always runs once step 1 has been attempted, whether or not the read worked.  A device
//! left in ISC mode stays unconfigured until it is power cycled.
use alloc::vec::Vec;
use alloc::vec;
use core::fmt;
use core::str::FromStr;

use log::{debug, info, warn};

use crate::chain::{self, ScanChain, SelectedDevice};
use crate::devicedb::Registry;
use crate::transport::Transport;
use crate::{Error, Result};

pub const CFG_IN: u8 = 0x05;
pub const ISC_ENABLE: u8 = 0x10;
pub const ISC_DISABLE: u8 = 0x16;
pub const JPROGRAM: u8 = 0x0b;
pub const ISC_DNA: u8 = 0x31;
pub const BYPASS: u8 = 0x3f;

/// Set in the CFG_IN IR capture once the configuration memory is clear
pub const CONFIG_CLEARED: u8 = 0x10;

pub const DNA_BITS: usize = 64;

/// The DNA register reads back as all ones when there is nothing to read: no DNA port, a device
/// that isn't there, or bus contention.
const SENTINEL: u64 = u64::MAX;

/// A device DNA.  Never the all-ones "no DNA" pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DnaValue(u64);

impl DnaValue {
    /// Interpret the 64 bits shifted out of the DNA register, first byte out as the most
    /// significant.  `None` for the all-ones pattern.
    pub fn from_capture(bytes: [u8; 8]) -> Option<DnaValue> {
        match u64::from_be_bytes(bytes) {
            SENTINEL => None,
            value => Some(DnaValue(value)),
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for DnaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::LowerHex for DnaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseDnaError {
    #[error("DNA must be 16 hex digits")]
    Length,
    #[error("DNA is not hex")]
    Digit,
    #[error("all-ones is not a DNA")]
    Sentinel,
}

impl FromStr for DnaValue {
    type Err = ParseDnaError;

    /// Parse the 16 hex digit form written by `Display`, with or without `0x`
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 16 {
            return Err(ParseDnaError::Length);
        }
        let value = u64::from_str_radix(digits, 16).map_err(|_| ParseDnaError::Digit)?;
        DnaValue::from_capture(value.to_be_bytes()).ok_or(ParseDnaError::Sentinel)
    }
}

/// What the DNA register gave back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnaReadout {
    Value(DnaValue),
    /// The register read as all ones
    NotAvailable,
}

impl DnaReadout {
    pub fn value(self) -> Option<DnaValue> {
        match self {
            DnaReadout::Value(v) => Some(v),
            DnaReadout::NotAvailable => None,
        }
    }
}

/// How long to wait for the configuration memory to clear
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// CFG_IN shifts to try before giving up
    pub max_attempts: u32,
}

pub const DEFAULT_MAX_POLLS: u32 = 1000;

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_POLLS,
        }
    }
}

// Instruction bytes for a TAP with an IR of `irlen` bits
fn instruction(code: u8, irlen: usize) -> Vec<u8> {
    let mut ir = vec![0; (irlen + 7) / 8];
    ir[0] = if irlen < 8 { code & ((1 << irlen) - 1) } else { code };
    ir
}

/// One DNA read of one device.  Borrows the transport for the length of the read.
///
/// Once JPROGRAM has been sent the session owes the device a restore (ISC_DISABLE, reset,
/// JPROGRAM).  `run` does that before returning; if the session is dropped part way through
/// (a panic in the transport, say) `Drop` does it instead.
pub struct DnaSession<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    device: SelectedDevice,
    policy: PollPolicy,
    // the device may be in ISC mode and needs restoring
    configuring: bool,
}

impl<'t, T: Transport + ?Sized> DnaSession<'t, T> {
    pub fn new(transport: &'t mut T, device: SelectedDevice, policy: PollPolicy) -> Self {
        Self {
            transport,
            device,
            policy,
            configuring: false,
        }
    }

    /// Read the DNA and restore the device.  An error from the read wins over an error from the
    /// restore.
    pub fn run(mut self) -> Result<DnaReadout> {
        self.transport.select_device(self.device.position);
        let readout = self.extract();
        let restored = self.restore();

        match (readout, restored) {
            (Ok(readout), Ok(())) => Ok(readout),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore)) => {
                warn!("restoring chain position {} failed too: {}", self.device.position, restore);
                Err(e)
            }
        }
    }

    fn shift(&mut self, code: u8) -> Result<Vec<u8>> {
        let ir = instruction(code, self.device.irlen);
        self.transport.shift_ir(&ir)
    }

    fn extract(&mut self) -> Result<DnaReadout> {
        // Set first: a JPROGRAM that fails part way may still have been latched
        self.configuring = true;
        self.shift(JPROGRAM)?;
        self.await_config_cleared()?;

        self.shift(ISC_ENABLE)?;
        self.shift(ISC_DNA)?;
        let capture = self.transport.shift_dr(&[0; DNA_BITS / 8], DNA_BITS)?;
        let bytes: [u8; 8] = capture.get(..DNA_BITS / 8)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::ShortCapture { expected: DNA_BITS / 8, got: capture.len() })?;

        match DnaValue::from_capture(bytes) {
            Some(dna) => {
                debug!("chain position {}: DNA {}", self.device.position, dna);
                Ok(DnaReadout::Value(dna))
            }
            None => {
                info!("chain position {}: DNA register reads all ones", self.device.position);
                Ok(DnaReadout::NotAvailable)
            }
        }
    }

    fn await_config_cleared(&mut self) -> Result<()> {
        let mut status = 0;
        for attempt in 1..=self.policy.max_attempts {
            let capture = self.shift(CFG_IN)?;
            status = *capture.first().ok_or(Error::ShortCapture { expected: 1, got: 0 })?;
            if status & CONFIG_CLEARED != 0 {
                debug!("configuration cleared after {} polls", attempt);
                return Ok(());
            }
        }
        Err(Error::ConfigNotCleared {
            attempts: self.policy.max_attempts,
            status,
        })
    }

    /// Lock the DNA port again and let the device configure itself.  Runs at most once per
    /// session; every step is attempted even if an earlier one failed.
    fn restore(&mut self) -> Result<()> {
        if !core::mem::take(&mut self.configuring) {
            return Ok(());
        }
        let disabled = self.shift(ISC_DISABLE);
        let reset = self.transport.reset_logic();
        let reprogrammed = self.shift(JPROGRAM);
        disabled?;
        reset?;
        reprogrammed?;
        Ok(())
    }
}

impl<T: Transport + ?Sized> Drop for DnaSession<'_, T> {
    fn drop(&mut self) {
        if self.configuring {
            if let Err(e) = self.restore() {
                warn!("restoring chain position {} failed: {}", self.device.position, e);
            }
        }
    }
}

/// Enumerate the chain, select `position`, and read its DNA
pub fn read_dna<T, R>(transport: &mut T, registry: &R, position: i64, policy: PollPolicy)
    -> Result<(ScanChain, DnaReadout)>
    where T: Transport + ?Sized,
          R: Registry + ?Sized
{
    let mut chain = chain::enumerate(transport, registry)?;
    let device = chain.select(position)?;
    let readout = DnaSession::new(transport, device, policy).run()?;
    Ok((chain, readout))
}
