//! Cypress FX2 boards (USRP and friends) running the usb_jtag firmware.  The firmware speaks the
//! USB-Blaster byte protocol: every byte sets the pins, and a byte with the read flag answers
//! with TDO in bit 0.
use alloc::vec::Vec;

use log::debug;
use rusb::{DeviceHandle, GlobalContext};

use crate::cable::usb::{self, Clock};
use crate::cable::{Cable, CableConfig, CableError};

const TCK: u8 = 1;
const TMS: u8 = 1 << 1;
const N_CE: u8 = 1 << 2;
const N_CS: u8 = 1 << 3;
const TDI: u8 = 1 << 4;
const LED: u8 = 1 << 5;
const READ: u8 = 1 << 6;
const IDLE: u8 = N_CE | N_CS | LED;

// FT245 style modem status at the start of every IN packet
const STATUS_BYTES: usize = 2;
const PACKET: usize = 64;
// two bytes per clock, and the answers of one chunk fit in one IN packet
const CLOCKS_PER_CHUNK: usize = 31;
const _: () = assert!(CLOCKS_PER_CHUNK * 2 <= PACKET && CLOCKS_PER_CHUNK <= PACKET - STATUS_BYTES);
// IN packets carrying only status before the cable is given up on
const MAX_EMPTY_READS: usize = 64;

pub struct Fx2 {
    device: DeviceHandle<GlobalContext>,
    read_endpoint: u8,
    write_endpoint: u8,
}

/// Two bytes per clock, TCK low then high.  TDO is sampled on the low byte, before the rising
/// edge.
fn encode(clocks: &[Clock]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(clocks.len() * 2);
    for c in clocks {
        let mut pins = IDLE;
        if c.tms {
            pins |= TMS;
        }
        if c.tdi {
            pins |= TDI;
        }
        buf.push(if c.read { pins | READ } else { pins });
        buf.push(pins | TCK);
    }
    buf
}

fn payload(packet: &[u8]) -> &[u8] {
    packet.get(STATUS_BYTES..).unwrap_or(&[])
}

impl Fx2 {
    pub fn new(device: DeviceHandle<GlobalContext>) -> Result<Self, CableError> {
        let (read_endpoint, write_endpoint) = usb::bulk_endpoints(&device)?;
        let mut fx2 = Self { device, read_endpoint, write_endpoint };
        // park the pins with TCK low
        fx2.write(&[IDLE])?;
        Ok(fx2)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), CableError> {
        let written = self.device.write_bulk(self.write_endpoint, buf, usb::TIMEOUT)?;
        if written != buf.len() {
            return Err(CableError::Disconnected);
        }
        Ok(())
    }

    fn read(&mut self, count: usize) -> Result<Vec<u8>, CableError> {
        let mut data = Vec::with_capacity(count);
        let mut empty = 0;
        while data.len() < count {
            let mut packet = [0; PACKET];
            let len = self.device.read_bulk(self.read_endpoint, &mut packet, usb::TIMEOUT)?;
            let got = payload(&packet[..len]);
            if got.is_empty() {
                empty += 1;
                if empty == MAX_EMPTY_READS {
                    return Err(CableError::Usb(rusb::Error::Timeout));
                }
                continue;
            }
            data.extend_from_slice(got);
        }
        data.truncate(count);
        Ok(data)
    }

    fn run(&mut self, clocks: &[Clock]) -> Result<Vec<bool>, CableError> {
        let mut tdo = Vec::new();
        for chunk in clocks.chunks(CLOCKS_PER_CHUNK) {
            self.write(&encode(chunk))?;
            let reads = chunk.iter().filter(|c| c.read).count();
            if reads > 0 {
                tdo.extend(self.read(reads)?.iter().map(|b| b & 1 != 0));
            }
        }
        Ok(tdo)
    }
}

impl Cable for Fx2 {
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError> {
        self.run(&usb::mode_clocks(tms, tdi))?;
        Ok(())
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        let tdo = self.run(&usb::read_clocks(bits))?;
        Ok(usb::pack(&tdo, (bits + 7) / 8))
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.run(&usb::shift_clocks(data, bits, pause_after, false))?;
        Ok(())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool)
        -> Result<Vec<u8>, CableError>
    {
        let tdo = self.run(&usb::shift_clocks(data, bits, pause_after, true))?;
        Ok(usb::pack(&tdo, data.len()))
    }
}

/// Find the board `config` describes.  TCK runs at whatever rate the firmware manages.
pub fn open(config: &CableConfig) -> Result<Fx2, CableError> {
    let device = usb::open_device(config)?;
    debug!("usb_jtag ignores the requested {} Hz", config.clock);
    Fx2::new(device)
}
