//! Known JTAG devices, keyed by IDCODE.  The registry is what turns a list of IDCODEs into the IR
//! layout of the chain.
//!
//! The text format has one device per line: the IDCODE in hex, the IR length in bits, and a
//! description.  `#` starts a comment.
//!
//! ```text
//! # idcode  irlen  description
//! 02228093  6      XC3S700A
//! 05046093  8      XCF04S
//! ```
use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::num::NonZeroU8;

use crate::{Error, Result};

/// The version field (top four bits) of an IDCODE changes with silicon revisions and is ignored
/// when matching.
pub const IDCODE_MASK: u32 = 0x0fff_ffff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// IDCODE with the version field cleared
    pub idcode: u32,
    pub irlen: NonZeroU8,
    pub name: Cow<'static, str>,
}

impl DeviceInfo {
    pub fn matches(&self, idcode: u32) -> bool {
        self.idcode == idcode & IDCODE_MASK
    }
}

pub trait Registry {
    /// Look up the device with this IDCODE.  `None` means the device is unknown.
    fn lookup(&self, idcode: u32) -> Option<&DeviceInfo>;
}

const BUILTIN: &[(u32, u8, &str)] = &[
    // Spartan-3
    (0x0140d093, 6, "XC3S50"),
    (0x01414093, 6, "XC3S200"),
    (0x0141c093, 6, "XC3S400"),
    (0x01428093, 6, "XC3S1000"),
    (0x01434093, 6, "XC3S1500"),
    (0x01440093, 6, "XC3S2000"),
    (0x01448093, 6, "XC3S4000"),
    (0x01450093, 6, "XC3S5000"),
    // Spartan-3E
    (0x01c10093, 6, "XC3S100E"),
    (0x01c1a093, 6, "XC3S250E"),
    (0x01c22093, 6, "XC3S500E"),
    (0x01c2e093, 6, "XC3S1200E"),
    (0x01c3a093, 6, "XC3S1600E"),
    // Spartan-3A
    (0x02210093, 6, "XC3S50A"),
    (0x02218093, 6, "XC3S200A"),
    (0x02220093, 6, "XC3S400A"),
    (0x02228093, 6, "XC3S700A"),
    (0x02230093, 6, "XC3S1400A"),
    // Spartan-3AN
    (0x02610093, 6, "XC3S50AN"),
    (0x02618093, 6, "XC3S200AN"),
    (0x02620093, 6, "XC3S400AN"),
    (0x02628093, 6, "XC3S700AN"),
    (0x02630093, 6, "XC3S1400AN"),
    // Spartan-3A DSP
    (0x03840093, 6, "XC3SD1800A"),
    (0x0384e093, 6, "XC3SD3400A"),
    // Spartan-6
    (0x04000093, 6, "XC6SLX4"),
    (0x04001093, 6, "XC6SLX9"),
    (0x04002093, 6, "XC6SLX16"),
    (0x04004093, 6, "XC6SLX25"),
    (0x04024093, 6, "XC6SLX25T"),
    (0x04008093, 6, "XC6SLX45"),
    (0x04028093, 6, "XC6SLX45T"),
    (0x0400e093, 6, "XC6SLX75"),
    (0x0402e093, 6, "XC6SLX75T"),
    (0x04011093, 6, "XC6SLX100"),
    (0x04031093, 6, "XC6SLX100T"),
    (0x0401d093, 6, "XC6SLX150"),
    (0x0403d093, 6, "XC6SLX150T"),
    // Platform Flash
    (0x05044093, 8, "XCF01S"),
    (0x05045093, 8, "XCF02S"),
    (0x05046093, 8, "XCF04S"),
    (0x05057093, 16, "XCF08P"),
    (0x05058093, 16, "XCF16P"),
    (0x05059093, 16, "XCF32P"),
];

#[derive(Clone, Debug, Default)]
pub struct DeviceDb {
    devices: Vec<DeviceInfo>,
}

impl DeviceDb {
    /// The devices this crate knows about without a database file
    pub fn builtin() -> Self {
        let devices = BUILTIN.iter()
            .filter_map(|(idcode, irlen, name)| Some(DeviceInfo {
                idcode: *idcode,
                irlen: NonZeroU8::new(*irlen)?,
                name: Cow::Borrowed(*name),
            }))
            .collect();
        Self { devices }
    }

    /// Parse a device list in the text format described above
    pub fn parse(text: &str) -> Result<Self> {
        let mut devices = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let err = |reason| Error::Database { line: n + 1, reason };

            let mut fields = line.split_whitespace();
            let idcode = fields.next().ok_or(err("missing IDCODE"))?;
            let idcode = idcode.strip_prefix("0x")
                .or_else(|| idcode.strip_prefix("0X"))
                .unwrap_or(idcode);
            let idcode = u32::from_str_radix(idcode, 16).map_err(|_| err("bad IDCODE"))?;

            let irlen = fields.next().ok_or(err("missing IR length"))?;
            let irlen = irlen.parse::<u8>().ok()
                .and_then(NonZeroU8::new)
                .ok_or(err("bad IR length"))?;

            let name: Vec<&str> = fields.collect();
            if name.is_empty() {
                return Err(err("missing description"));
            }

            devices.push(DeviceInfo {
                idcode: idcode & IDCODE_MASK,
                irlen,
                name: Cow::Owned(name.join(" ")),
            });
        }
        Ok(Self { devices })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Registry for DeviceDb {
    fn lookup(&self, idcode: u32) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.matches(idcode))
    }
}
