//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait.  `open` builds one from a `CableConfig`.
use alloc::vec::Vec;

pub mod gpio;
pub mod sim;

#[cfg(feature = "std")]
pub mod fx2;
#[cfg(feature = "std")]
pub mod mpsse;
#[cfg(feature = "std")]
pub mod usb;
#[cfg(feature = "std")]
pub mod xpc;
#[cfg(all(feature = "std", target_os = "linux"))]
pub mod parport;

#[cfg(feature = "std")]
use alloc::boxed::Box;
#[cfg(feature = "std")]
use std::string::String;

#[derive(Debug, thiserror::Error)]
pub enum CableError {
    #[cfg(feature = "std")]
    #[error("FTDI driver error: {0}")]
    Ftdi(#[from] libftd2xx::FtStatus),

    #[cfg(feature = "std")]
    #[error("MPSSE transfer failed: {0}")]
    Mpsse(#[from] libftd2xx::TimeoutError),

    #[cfg(feature = "std")]
    #[error("unsupported FTDI chip: {0}")]
    DeviceType(#[from] libftd2xx::DeviceTypeError),

    #[cfg(feature = "std")]
    #[error("USB transfer failed: {0}")]
    Usb(#[from] rusb::Error),

    #[cfg(feature = "std")]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("GPIO pin failed: {0:?}")]
    Gpio(embedded_hal::digital::ErrorKind),

    #[error("no matching cable found")]
    NotFound,

    #[error("{0} cables are not supported on this platform")]
    Unsupported(&'static str),

    /// The adapter went away in the middle of a transfer.
    #[error("cable disconnected")]
    Disconnected,
}

pub trait Cable {
    /// Clock out a series of TMS values to change the state of the JTAG chain.  Each element of
    /// `tms` is the value of the TMS line for one clock.  `tdi` controls the state of the TDI line
    /// during mode changes.
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError>;
    /// Shift in bits from the TDO line.  `bits` is the total number of bits to read.  Should be
    /// called with state = ShiftIR or ShiftDR, and will remain in that state.  Should clock out
    /// all ones.
    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError>;
    /// Shift out bits on the TDI line.  `bits` is the number of bits to send from the last byte.
    /// Should be called with state = ShiftIR or ShiftDR.  State won't change unless `pause_after`
    /// is true, in which case it will be PauseIR or PauseDR on exit.
    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError>;
    /// Same as `write_data`, but returns the bits shifted out of TDO, packed the same way as
    /// `data`.
    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool)
        -> Result<Vec<u8>, CableError>;
    /// Push out anything the adapter has buffered.
    fn flush(&mut self) -> Result<(), CableError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(clap::ValueEnum))]
pub enum CableKind {
    /// Xilinx parallel cable on a ppdev port
    #[default]
    Pp,
    /// FT2232H/FT232H/FT4232H MPSSE adapter
    Ftdi,
    /// Cypress FX2 running usb_jtag firmware
    Fx2,
    /// Xilinx Platform Cable USB
    Xpc,
}

pub const USRP_IDS: (u16, u16) = (0xfffe, 0x0018);
pub const XPC_IDS: (u16, u16) = (0x03fd, 0x0008);

impl CableKind {
    pub fn is_usb(self) -> bool {
        self != CableKind::Pp
    }
}

/// Board-level variations: which pins an FTDI adapter must drive to enable its JTAG buffers
/// and which USB ids it uses by default, or which chain a Platform Cable drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(clap::ValueEnum))]
pub enum CableSubtype {
    #[default]
    None,
    /// EN_N on ACBUS2
    Ikda,
    /// JTAG_EN_N on ADBUS4, LED on ACBUS3
    Olimex,
    /// JTAG_EN_N on ADBUS4
    Amontec,
    /// The Platform Cable's own CPLD chain instead of the target connector
    #[cfg_attr(feature = "std", value(name = "int"))]
    Internal,
}

impl CableSubtype {
    /// Default (vendor, product) of an FTDI adapter of this kind
    pub fn usb_ids(self) -> (u16, u16) {
        match self {
            CableSubtype::None | CableSubtype::Ikda | CableSubtype::Internal => (0x0403, 0x6010),
            CableSubtype::Olimex => (0x15ba, 0x0003),
            CableSubtype::Amontec => (0x0403, 0xcff8),
        }
    }
}

/// Everything needed to construct a cable.  Built once by the caller and passed to `open`.
#[cfg(feature = "std")]
#[derive(Clone, Debug)]
pub struct CableConfig {
    pub kind: CableKind,
    /// Parallel port device node
    pub device: Option<String>,
    pub vendor: Option<u16>,
    pub product: Option<u16>,
    /// USB product string
    pub description: Option<String>,
    pub serial: Option<String>,
    pub subtype: CableSubtype,
    /// TCK frequency in hertz
    pub clock: u32,
}

#[cfg(feature = "std")]
impl Default for CableConfig {
    fn default() -> Self {
        Self {
            kind: CableKind::Pp,
            device: None,
            vendor: None,
            product: None,
            description: None,
            serial: None,
            subtype: CableSubtype::None,
            clock: 1_000_000,
        }
    }
}

#[cfg(feature = "std")]
impl CableConfig {
    /// The USB ids that will be searched for, with explicit settings taking precedence over the
    /// subtype defaults.
    pub fn usb_ids(&self) -> (u16, u16) {
        let (vendor, product) = match self.kind {
            CableKind::Fx2 => USRP_IDS,
            CableKind::Xpc => XPC_IDS,
            CableKind::Pp | CableKind::Ftdi => self.subtype.usb_ids(),
        };
        (self.vendor.unwrap_or(vendor), self.product.unwrap_or(product))
    }
}

/// Open the cable described by `config`
#[cfg(feature = "std")]
pub fn open(config: &CableConfig) -> Result<Box<dyn Cable>, CableError> {
    log::debug!("opening {:?} cable", config.kind);
    match config.kind {
        CableKind::Pp => open_parport(config),
        CableKind::Ftdi => mpsse::open(config),
        CableKind::Fx2 => Ok(Box::new(fx2::open(config)?)),
        CableKind::Xpc => Ok(Box::new(xpc::open(config)?)),
    }
}

#[cfg(all(feature = "std", target_os = "linux"))]
fn open_parport(config: &CableConfig) -> Result<Box<dyn Cable>, CableError> {
    let device = config.device.as_deref().unwrap_or(parport::DEFAULT_DEVICE);
    Ok(Box::new(parport::open(device, config.clock)?))
}

#[cfg(all(feature = "std", not(target_os = "linux")))]
fn open_parport(_config: &CableConfig) -> Result<Box<dyn Cable>, CableError> {
    Err(CableError::Unsupported("parallel port"))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn subtype_ids_are_overridden_by_explicit_ids() {
        let mut config = CableConfig {
            kind: CableKind::Ftdi,
            subtype: CableSubtype::Olimex,
            ..CableConfig::default()
        };
        assert_eq!(config.usb_ids(), (0x15ba, 0x0003));

        config.product = Some(0x002b);
        assert_eq!(config.usb_ids(), (0x15ba, 0x002b));
    }

    #[test]
    fn usb_cables_have_their_own_ids() {
        let mut config = CableConfig {
            kind: CableKind::Xpc,
            subtype: CableSubtype::Internal,
            ..CableConfig::default()
        };
        assert_eq!(config.usb_ids(), XPC_IDS);

        config.kind = CableKind::Fx2;
        config.vendor = Some(0x04b4);
        assert_eq!(config.usb_ids(), (0x04b4, 0x0018));
        assert!(config.kind.is_usb());
        assert!(!CableKind::Pp.is_usb());
    }

    #[test]
    fn amontec_defaults() {
        assert_eq!(CableSubtype::Amontec.usb_ids(), (0x0403, 0xcff8));
        assert_eq!(CableSubtype::Ikda.usb_ids(), CableSubtype::None.usb_ids());
    }
}
