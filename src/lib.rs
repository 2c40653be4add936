//! This crate reads the factory-programmed DNA of a Xilinx FPGA over a JTAG scan chain.  It is
//! built in layers, from the wire upwards.
//!
//! At the lowest level is the `Cable` trait, implemented for FTDI MPSSE adapters, for a
//! parallel-port cable, for any set of `embedded-hal` GPIO pins, and for a simulated chain.  The
//! `Cable` trait allows for changing modes and shifting bits in and out of the JTAG chain.
//!
//! `JtagSM` keeps track of the mode of the TAPs.  You tell it which mode you want (e.g., Reset or
//! Idle) and it gets there with the fewest number of mode changes.
//!
//! `Taps` is the chain view on top of that.  It finds the TAPs by their IDCODEs, and once it
//! knows the IR length of every one of them it lets you shift instructions and data into a single
//! selected TAP while the others sit in BYPASS.  `Taps` implements `Transport`, which is all the
//! protocol code above it needs.
//!
//! The protocol itself lives in `chain` (enumerate the chain against a `Registry` of known
//! devices, then select one position) and `dna` (force the selected FPGA into configuration
//! mode, read its DNA register, and hand it back to its normal configuration source).
//!
//! # Example
//! ```no_run
//! use jtag_dna::cable::{self, CableConfig};
//! use jtag_dna::devicedb::DeviceDb;
//! use jtag_dna::dna::{self, DnaReadout, PollPolicy};
//! use jtag_dna::statemachine::JtagSM;
//! use jtag_dna::taps::Taps;
//!
//! let cable = cable::open(&CableConfig::default())?;
//! let mut taps = Taps::new(JtagSM::new(cable));
//! let db = DeviceDb::builtin();
//! let (_, readout) = dna::read_dna(&mut taps, &db, 0, PollPolicy::default())?;
//! if let DnaReadout::Value(dna) = readout {
//!     println!("DNA is 0x{}", dna);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod chain;
pub mod devicedb;
pub mod dna;
pub mod error;
pub mod report;
pub mod statemachine;
pub mod taps;
pub mod transport;

pub use error::{Error, Result};
