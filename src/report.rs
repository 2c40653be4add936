//! The text `readdna` prints
use alloc::format;
use alloc::string::String;
use core::fmt;

use crate::chain::ScanChain;
use crate::dna::DnaReadout;

/// One line per TAP, nearest TDO first
pub struct ChainReport<'a>(pub &'a ScanChain);

impl fmt::Display for ChainReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, tap) in self.0.taps().iter().enumerate() {
            writeln!(f, "JTAG chainpos: {} Device IDCODE = 0x{:08x}\tDesc: {}",
                position, tap.idcode, tap.description)?;
        }
        Ok(())
    }
}

/// `None` when there is no DNA to print
pub fn dna_line(readout: &DnaReadout) -> Option<String> {
    readout.value().map(|dna| format!("DNA is 0x{}", dna))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use crate::chain;
    use crate::devicedb::DeviceDb;
    use crate::dna::DnaValue;
    use crate::transport::mock::MockTransport;

    #[test]
    fn chain_lines() {
        let mut transport = MockTransport::new(&[0x05046093, 0x22228093]);
        let chain = chain::enumerate(&mut transport, &DeviceDb::builtin()).unwrap();
        assert_eq!(ChainReport(&chain).to_string(), "\
JTAG chainpos: 0 Device IDCODE = 0x05046093\tDesc: XCF04S
JTAG chainpos: 1 Device IDCODE = 0x22228093\tDesc: XC3S700A
");
    }

    #[test]
    fn dna_is_sixteen_digits() {
        let dna = DnaValue::from_capture([0, 0x12, 0, 0, 0, 0, 0xab, 0x01]).unwrap();
        assert_eq!(dna_line(&DnaReadout::Value(dna)).unwrap(), "DNA is 0x001200000000ab01");
        assert_eq!(dna_line(&DnaReadout::NotAvailable), None);
    }
}
