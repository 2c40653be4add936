//! The whole stack, from `read_dna` down to `JtagSM`, driving a simulated scan chain.

use jtag_dna::cable::sim::{SimCable, SimTap};
use jtag_dna::chain;
use jtag_dna::devicedb::DeviceDb;
use jtag_dna::dna::{self, DnaReadout, PollPolicy};
use jtag_dna::dna::{CFG_IN, ISC_DISABLE, ISC_DNA, ISC_ENABLE, JPROGRAM};
use jtag_dna::report::{self, ChainReport};
use jtag_dna::statemachine::JtagSM;
use jtag_dna::taps::Taps;
use jtag_dna::Error;

const XCF04S: u32 = 0x05046093;
const XC3S700A: u32 = 0x02228093;
const DNA: u64 = 0x0123_4567_89ab_cdef;

type SimTaps = Taps<Box<SimCable>>;

fn taps(chain: Vec<SimTap>) -> SimTaps {
    Taps::new(JtagSM::new(Box::new(SimCable::new(chain))))
}

// A Spartan-3A that needs two CFG_IN polls before its configuration memory reads as clear
fn spartan(dna: u64) -> SimTap {
    SimTap::new(XC3S700A, 6)
        .with_ir_capture_after(2, 0x11)
        .with_register(ISC_DNA as u32, 64, dna)
}

fn instructions(taps: &SimTaps, position: usize) -> Vec<u32> {
    taps.sm.cable.tap(position).instructions().to_vec()
}

#[test]
fn reads_dna_behind_a_prom() {
    let mut taps = taps(vec![SimTap::new(XCF04S, 8), spartan(DNA)]);
    let (chain, readout) = dna::read_dna(&mut taps, &DeviceDb::builtin(), 1, PollPolicy::default())
        .unwrap();

    assert_eq!(chain.len(), 2);
    assert_eq!(chain.selected(), Some(1));

    // first byte out of the register is printed first
    let dna = readout.value().unwrap();
    assert_eq!(dna.to_be_bytes(), DNA.to_le_bytes());
    assert_eq!(report::dna_line(&readout).unwrap(), "DNA is 0xefcdab8967452301");

    let expected: Vec<u32> = [JPROGRAM, CFG_IN, CFG_IN, ISC_ENABLE, ISC_DNA, ISC_DISABLE, JPROGRAM]
        .iter()
        .map(|i| *i as u32)
        .collect();
    assert_eq!(instructions(&taps, 1), expected);
    // the PROM only ever saw BYPASS
    assert!(instructions(&taps, 0).iter().all(|i| *i == 0xff));
    assert_eq!(taps.sm.cable.resets(), 3);
}

#[test]
fn verbose_chain_listing() {
    let mut taps = taps(vec![SimTap::new(XCF04S, 8), spartan(DNA)]);
    let chain = chain::enumerate(&mut taps, &DeviceDb::builtin()).unwrap();
    assert_eq!(ChainReport(&chain).to_string(), "\
JTAG chainpos: 0 Device IDCODE = 0x05046093\tDesc: XCF04S
JTAG chainpos: 1 Device IDCODE = 0x02228093\tDesc: XC3S700A
");
}

#[test]
fn all_ones_is_not_reported() {
    let mut taps = taps(vec![spartan(u64::MAX)]);
    let (_, readout) = dna::read_dna(&mut taps, &DeviceDb::builtin(), 0, PollPolicy::default())
        .unwrap();

    assert_eq!(readout, DnaReadout::NotAvailable);
    assert_eq!(report::dna_line(&readout), None);

    let sim = &taps.sm.cable;
    assert_eq!(sim.tap(0).count(ISC_DISABLE as u32), 1);
    assert_eq!(sim.tap(0).count(JPROGRAM as u32), 2);
    assert_eq!(sim.resets(), 3);
}

#[test]
fn poll_timeout_still_restores() {
    // never reports the configuration as cleared
    let mut taps = taps(vec![SimTap::new(XC3S700A, 6)]);
    let err = dna::read_dna(&mut taps, &DeviceDb::builtin(), 0, PollPolicy { max_attempts: 10 })
        .unwrap_err();
    assert!(matches!(err, Error::ConfigNotCleared { attempts: 10, status: 0x01 }));

    let sim = &taps.sm.cable;
    assert_eq!(sim.tap(0).count(CFG_IN as u32), 10);
    assert_eq!(sim.tap(0).count(ISC_ENABLE as u32), 0);
    assert_eq!(sim.tap(0).count(ISC_DISABLE as u32), 1);
    assert_eq!(sim.tap(0).instructions().last(), Some(&(JPROGRAM as u32)));
    assert_eq!(sim.resets(), 3);
}

#[test]
fn unknown_device_stops_before_any_instruction() {
    let mut taps = taps(vec![spartan(DNA), SimTap::new(0x0ba00477, 4)]);
    let err = dna::read_dna(&mut taps, &DeviceDb::builtin(), 0, PollPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownDevice { position: 1, idcode: 0x0ba00477 }));
    assert!(instructions(&taps, 0).is_empty());
    assert!(instructions(&taps, 1).is_empty());
}

#[test]
fn position_out_of_range() {
    let mut taps = taps(vec![spartan(DNA)]);
    for position in [-1, 1] {
        let err = dna::read_dna(&mut taps, &DeviceDb::builtin(), position, PollPolicy::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPosition { length: 1, .. }));
    }
    assert!(instructions(&taps, 0).is_empty());
}

#[test]
fn empty_chain() {
    let mut taps = taps(vec![]);
    let err = dna::read_dna(&mut taps, &DeviceDb::builtin(), 0, PollPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::NoDevices));
}

#[test]
fn enumeration_is_repeatable() {
    let mut taps = taps(vec![SimTap::new(XCF04S, 8), spartan(DNA), SimTap::new(XC3S700A, 6)]);
    let db = DeviceDb::builtin();
    let first = chain::enumerate(&mut taps, &db).unwrap();
    let second = chain::enumerate(&mut taps, &db).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.taps().iter().map(|t| t.irlen).collect::<Vec<_>>(), vec![8, 6, 6]);
}

#[test]
fn custom_device_list() {
    let db = DeviceDb::parse("0ba00477 4 Cortex-M debug port\n02228093 6 XC3S700A\n").unwrap();
    let mut taps = taps(vec![SimTap::new(0x4ba00477, 4), spartan(DNA)]);
    let (chain, readout) = dna::read_dna(&mut taps, &db, 1, PollPolicy::default()).unwrap();
    assert_eq!(chain.taps()[0].description, "Cortex-M debug port");
    assert_eq!(readout.value().map(|d| d.to_be_bytes()), Some(DNA.to_le_bytes()));
    // the 4 bit IR of the debug port was filled with BYPASS
    assert!(instructions(&taps, 0).iter().all(|i| *i == 0xf));
}

#[test]
fn cable_lost_after_enumeration() {
    // enumerating one TAP takes five cable calls
    let cable = SimCable::new(vec![spartan(DNA)]).fail_after(5);
    let mut taps = Taps::new(JtagSM::new(Box::new(cable)));
    let err = dna::read_dna(&mut taps, &DeviceDb::builtin(), 0, PollPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(taps.sm.cable.calls(), 5);
}

#[test]
fn overlong_chain_touches_nothing() {
    let chain = (0..=jtag_dna::taps::MAX_TAPS).map(|_| spartan(DNA)).collect();
    let mut taps = taps(chain);
    let err = dna::read_dna(&mut taps, &DeviceDb::builtin(), 0, PollPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::ChainTooLong { max: jtag_dna::taps::MAX_TAPS }));
    for position in 0..=jtag_dna::taps::MAX_TAPS {
        assert!(instructions(&taps, position).is_empty());
    }
}
