//! Errors reported by chain enumeration and DNA extraction.
use crate::cable::CableError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The chain reported no taps at all.
    #[error("no JTAG chain found")]
    NoDevices,

    /// A tap's IDCODE is not in the device registry, so the chain's IR layout can't be known.
    #[error("cannot find device having IDCODE={idcode:08x} (chain position {position})")]
    UnknownDevice { position: usize, idcode: u32 },

    #[error("invalid chain position {position}, position must be less than {length} (but not less than 0)")]
    InvalidPosition { position: i64, length: usize },

    /// The configuration-cleared status bit never showed up in the CFG_IN capture.
    #[error("configuration memory not cleared after {attempts} polls (last IR capture {status:#04x})")]
    ConfigNotCleared { attempts: u32, status: u8 },

    /// More IDCODEs came out than a sane chain has.  Usually a wiring fault; a truncated chain
    /// would put every instruction on the wrong TAP.
    #[error("more than {max} devices on the JTAG chain")]
    ChainTooLong { max: usize },

    /// A transport handed back fewer captured bits than were shifted.
    #[error("short capture: expected {expected} bytes, got {got}")]
    ShortCapture { expected: usize, got: usize },

    /// An instruction shift was attempted before every tap's IR length was known.
    #[error("IR length of chain position {0} is not known")]
    UnresolvedIrLength(usize),

    #[error("device database line {line}: {reason}")]
    Database { line: usize, reason: &'static str },

    #[error("cable I/O failed: {0}")]
    Transport(#[from] CableError),
}

pub type Result<T> = core::result::Result<T, Error>;
