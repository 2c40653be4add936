//! FTDI MPSSE adapters: FT2232H, FT232H and FT4232H based cables, with the board specific pin
//! setup for the supported subtypes.
use alloc::boxed::Box;
use alloc::vec::Vec;
use alloc::vec;
use std::time::Duration;

use libftd2xx::{DeviceType, Ft2232h, Ft232h, Ft4232h, Ftdi, FtdiCommon, FtdiMpsse};
use libftd2xx::{MpsseCmdBuilder, MpsseCmdExecutor, TimeoutError};
use libftd2xx::{ClockBits, ClockBitsOut, ClockData, ClockDataOut};
use ftdi_mpsse::{ClockTMS, ClockTMSOut};
use log::{debug, info};

use crate::cable::{Cable, CableConfig, CableError, CableSubtype};

// Lower pins
const PIN_TCK: u8 = 1;
const PIN_TDI: u8 = 1 << 1;
//const PIN_TDO: u8 = 1 << 2;
const PIN_TMS: u8 = 1 << 3;
const PIN_ADBUS4: u8 = 1 << 4;
const LOWER_OUTPUT_PINS: u8 = PIN_TCK | PIN_TDI | PIN_TMS;

// Upper pins
const PIN_N_TRST: u8 = 1;
const PIN_N_SRST: u8 = 1 << 1;
const PIN_ACBUS2: u8 = 1 << 2;
const PIN_ACBUS3: u8 = 1 << 3;

/// (lower value, lower direction, upper value, upper direction)
fn subtype_pins(subtype: CableSubtype) -> (u8, u8, u8, u8) {
    match subtype {
        CableSubtype::None | CableSubtype::Internal => (PIN_TMS, LOWER_OUTPUT_PINS, 0, 0),
        // EN_N low
        CableSubtype::Ikda => (PIN_TMS, LOWER_OUTPUT_PINS, 0, PIN_ACBUS2),
        // JTAG_EN_N low, LED on
        CableSubtype::Olimex => (PIN_TMS, LOWER_OUTPUT_PINS | PIN_ADBUS4, PIN_ACBUS3, PIN_ACBUS3),
        // JTAG_EN_N low, nTRST and nSRST released
        CableSubtype::Amontec => (PIN_TMS, LOWER_OUTPUT_PINS | PIN_ADBUS4, PIN_N_TRST | PIN_N_SRST,
            PIN_N_TRST | PIN_N_SRST | PIN_ACBUS2 | PIN_ACBUS3),
    }
}

// MPSSE TMS commands clock at most 7 bits
fn tms_chunks(tms: &[bool]) -> impl Iterator<Item=(u8, u8)> + '_ {
    tms.chunks(7).map(|chunk| {
        let bits = chunk.iter()
            .enumerate()
            .fold(0, |acc, (i, t)| acc | ((*t as u8) << i));
        (bits, chunk.len() as u8)
    })
}

// Bits clocked in LSB first arrive at the top of the byte
fn align_partial(byte: u8, bits: u8) -> u8 {
    byte >> (8 - bits)
}

pub struct FtdiCable<T> {
    ft: T,
}

impl<T> FtdiCable<T>
    where T: FtdiMpsse + FtdiCommon + MpsseCmdExecutor<Error=TimeoutError>
{
    pub fn new(mut ft: T, clock: u32, subtype: CableSubtype) -> Result<Self, CableError> {
        ft.initialize_mpsse_default()?;
        ft.set_clock(clock)?;
        ft.set_latency_timer(Duration::from_millis(0))?;

        let (lower, lower_dir, upper, upper_dir) = subtype_pins(subtype);
        let mut builder = MpsseCmdBuilder::new()
            .disable_3phase_data_clocking()
            .disable_adaptive_data_clocking()
            .set_gpio_lower(lower, lower_dir);
        if upper_dir != 0 {
            builder = builder.set_gpio_upper(upper, upper_dir);
        }
        ft.send(builder.as_slice())?;

        Ok(Self { ft })
    }

    fn xfer(&mut self, builder: MpsseCmdBuilder, read: usize) -> Result<Vec<u8>, CableError> {
        let builder = builder.send_immediate();
        let mut buf = vec![0; read];
        self.ft.xfer(builder.as_slice(), &mut buf)?;
        Ok(buf)
    }
}

impl<T> Cable for FtdiCable<T>
    where T: FtdiMpsse + FtdiCommon + MpsseCmdExecutor<Error=TimeoutError>
{
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError> {
        let mut builder = MpsseCmdBuilder::new();
        for (bits, len) in tms_chunks(tms) {
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, bits, tdi, len);
        }
        self.ft.send(builder.as_slice())?;
        Ok(())
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        let bytes = bits / 8;
        let rem = (bits % 8) as u8;
        let mut builder = MpsseCmdBuilder::new();
        if bytes > 0 {
            builder = builder.clock_data(ClockData::LsbPosIn, &vec![0xff; bytes]);
        }
        if rem > 0 {
            builder = builder.clock_bits(ClockBits::LsbPosIn, 0xff, rem);
        }

        let mut buf = self.xfer(builder, bytes + (rem > 0) as usize)?;
        if rem > 0 {
            buf[bytes] = align_partial(buf[bytes], rem);
        }
        Ok(buf)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        assert!(bits <= 8);
        assert!(bits != 0);
        let (last_byte, body) = data.split_last().ok_or(CableError::Unsupported("empty shift"))?;

        let mut builder = MpsseCmdBuilder::new();
        if !body.is_empty() {
            builder = builder.clock_data_out(ClockDataOut::LsbNeg, body);
        }
        // The last bit goes out with the TMS command
        let bits = bits - 1;
        if bits >= 1 {
            builder = builder.clock_bits_out(ClockBitsOut::LsbNeg, *last_byte, bits);
        }
        let last_bit = last_byte & (1 << bits) != 0;
        builder = if pause_after {
            // Exit1 then Pause
            builder.clock_tms_out(ClockTMSOut::NegEdge, 0b01, last_bit, 2)
        } else {
            builder.clock_tms_out(ClockTMSOut::NegEdge, 0, last_bit, 1)
        };

        self.ft.send(builder.as_slice())?;
        Ok(())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool)
        -> Result<Vec<u8>, CableError>
    {
        assert!(bits <= 8);
        assert!(bits != 0);
        let (last_byte, body) = data.split_last().ok_or(CableError::Unsupported("empty shift"))?;

        let mut builder = MpsseCmdBuilder::new();
        let mut read = body.len();
        if !body.is_empty() {
            builder = builder.clock_data(ClockData::LsbPosIn, body);
        }
        let bits = bits - 1;
        if bits >= 1 {
            builder = builder.clock_bits(ClockBits::LsbPosIn, *last_byte, bits);
            read += 1;
        }
        let last_bit = last_byte & (1 << bits) != 0;
        builder = builder.clock_tms(ClockTMS::NegTMSPosTDO, pause_after as u8, last_bit, 1);
        read += 1;
        if pause_after {
            builder = builder.clock_tms_out(ClockTMSOut::NegEdge, 0, true, 1);
        }

        let buf = self.xfer(builder, read)?;
        Ok(unpack(&buf, body.len(), bits))
    }
}

// Reassemble a read-write capture: `bytes` whole bytes, then a clock_bits byte holding `bits`
// bits (if any), then the TMS byte holding the final bit in its top bit
fn unpack(buf: &[u8], bytes: usize, bits: u8) -> Vec<u8> {
    let mut out = buf[..bytes].to_vec();
    let mut last = 0;
    let mut tms_byte = bytes;
    if bits >= 1 {
        last = align_partial(buf[bytes], bits);
        tms_byte += 1;
    }
    last |= (buf[tms_byte] >> 7) << bits;
    out.push(last);
    out
}

/// Find the adapter `config` describes and bring up MPSSE on it
pub fn open(config: &CableConfig) -> Result<Box<dyn Cable>, CableError> {
    let (vendor, product) = config.usb_ids();
    #[cfg(unix)]
    libftd2xx::set_vid_pid(vendor, product)?;

    let devices = libftd2xx::list_devices()?;
    let info = devices.iter()
        .filter(|d| d.vendor_id == vendor && d.product_id == product)
        .filter(|d| config.description.as_ref().map_or(true, |s| *s == d.description))
        .find(|d| config.serial.as_ref().map_or(true, |s| *s == d.serial_number))
        .ok_or(CableError::NotFound)?;
    info!("using {} ({}) {:04x}:{:04x}", info.description, info.serial_number, vendor, product);

    let mut ft = Ftdi::with_serial_number(&info.serial_number)?;
    let device_type = ft.device_type()?;
    debug!("FTDI device type {:?}", device_type);

    let (clock, subtype) = (config.clock, config.subtype);
    let cable: Box<dyn Cable> = match device_type {
        DeviceType::FT2232H => Box::new(FtdiCable::new(Ft2232h::try_from(ft)?, clock, subtype)?),
        DeviceType::FT232H => Box::new(FtdiCable::new(Ft232h::try_from(ft)?, clock, subtype)?),
        DeviceType::FT4232H => Box::new(FtdiCable::new(Ft4232h::try_from(ft)?, clock, subtype)?),
        _ => return Err(CableError::Unsupported("non-MPSSE FTDI")),
    };
    Ok(cable)
}
