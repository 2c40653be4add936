//! Xilinx Platform Cable USB (DLC9 and compatibles) with its firmware loaded.  Setup goes
//! through vendor control requests.  A shift is announced with a control request carrying the
//! clock count, then the packed TDI/TMS stream goes out on one bulk endpoint and the TDO samples
//! come back on another.
use alloc::vec::Vec;
use alloc::vec;

use log::{debug, info, warn};
use rusb::{DeviceHandle, GlobalContext};

use crate::cable::usb::{self, Clock};
use crate::cable::{Cable, CableConfig, CableError, CableSubtype};

const REQUEST: u8 = 0xb0;
const VENDOR_OUT: u8 = 0x40;
const VENDOR_IN: u8 = 0xc0;

const CMD_OUTPUT: u16 = 0x0028;
const CMD_WRITE_GPIO: u16 = 0x0030;
const CMD_READ_GPIO: u16 = 0x0038;
const CMD_VERSION: u16 = 0x0050;
const CMD_SELECT_GPIO: u16 = 0x0052;
const CMD_SHIFT: u16 = 0x00a6;

const OUTPUT_INIT: u16 = 0x11;
const OUTPUT_ON: u16 = 0x18;
const OUTPUT_OFF: u16 = 0x10;

const SHIFT_OUT: u8 = 0x02;
const SHIFT_IN: u8 = 0x86;

// a multiple of four, so chunks never split a packed byte pair
const CLOCKS_PER_CHUNK: usize = 4096;

pub struct Xpc {
    device: DeviceHandle<GlobalContext>,
}

/// Four clocks per byte pair.  The first byte holds TDI in its low nibble and TMS in its high
/// nibble.  The second marks each clock in its high nibble and asks for TDO in its low nibble.
fn encode(clocks: &[Clock]) -> Vec<u8> {
    let mut buf = vec![0; (clocks.len() + 3) / 4 * 2];
    for (i, c) in clocks.iter().enumerate() {
        let pair = i / 4 * 2;
        let b = i % 4;
        buf[pair] |= (c.tdi as u8) << b | (c.tms as u8) << (4 + b);
        buf[pair + 1] |= (0x10 | c.read as u8) << b;
    }
    buf
}

/// Bytes the cable answers with for `reads` samples: whole 16 bit words
fn reply_len(reads: usize) -> usize {
    (reads + 15) / 16 * 2
}

/// TDO samples from little endian words.  A partial last word is filled from the top.
fn decode(reply: &[u8], reads: usize) -> Vec<bool> {
    let mut tdo = Vec::with_capacity(reads);
    for word in reply.chunks(2) {
        let n = (reads - tdo.len()).min(16);
        if n == 0 {
            break;
        }
        let mut value = u16::from_le_bytes([word[0], word.get(1).copied().unwrap_or(0)]);
        if n < 16 {
            value >>= 16 - n;
        }
        tdo.extend((0..n).map(|b| value & (1 << b) != 0));
    }
    tdo
}

impl Xpc {
    pub fn new(device: DeviceHandle<GlobalContext>, subtype: CableSubtype) -> Result<Self, CableError> {
        let mut xpc = Self { device };
        xpc.command(CMD_OUTPUT, OUTPUT_INIT)?;
        xpc.command(CMD_WRITE_GPIO, 8)?;

        let firmware = xpc.query(CMD_VERSION, 0, 2)?;
        let cpld = xpc.query(CMD_VERSION, 1, 2)?;
        info!("Platform Cable firmware {:02x}{:02x}, CPLD {:02x}{:02x}",
            firmware[1], firmware[0], cpld[1], cpld[0]);
        let gpio = xpc.query(CMD_READ_GPIO, 0, 1)?;
        debug!("GPIO {:#04x}", gpio[0]);

        let internal = match subtype {
            CableSubtype::Internal => 1,
            CableSubtype::None => 0,
            other => {
                warn!("subtype {:?} means nothing to a Platform Cable", other);
                0
            }
        };
        xpc.command(CMD_SELECT_GPIO, internal)?;
        xpc.command(CMD_OUTPUT, OUTPUT_ON)?;
        Ok(xpc)
    }

    fn command(&mut self, cmd: u16, param: u16) -> Result<(), CableError> {
        self.device.write_control(VENDOR_OUT, REQUEST, cmd, param, &[], usb::TIMEOUT)?;
        Ok(())
    }

    // always `len` bytes long
    fn query(&mut self, cmd: u16, param: u16, len: usize) -> Result<Vec<u8>, CableError> {
        let mut buf = vec![0; len];
        let got = self.device.read_control(VENDOR_IN, REQUEST, cmd, param, &mut buf, usb::TIMEOUT)?;
        if got != len {
            return Err(CableError::Disconnected);
        }
        Ok(buf)
    }

    fn run(&mut self, clocks: &[Clock]) -> Result<Vec<bool>, CableError> {
        let mut tdo = Vec::new();
        for chunk in clocks.chunks(CLOCKS_PER_CHUNK) {
            // CLOCKS_PER_CHUNK fits in the 16 bit index
            self.command(CMD_SHIFT, chunk.len() as u16)?;
            let buf = encode(chunk);
            if self.device.write_bulk(SHIFT_OUT, &buf, usb::TIMEOUT)? != buf.len() {
                return Err(CableError::Disconnected);
            }

            let reads = chunk.iter().filter(|c| c.read).count();
            if reads > 0 {
                let mut reply = vec![0; reply_len(reads)];
                if self.device.read_bulk(SHIFT_IN, &mut reply, usb::TIMEOUT)? != reply.len() {
                    return Err(CableError::Disconnected);
                }
                tdo.extend(decode(&reply, reads));
            }
        }
        Ok(tdo)
    }
}

impl Drop for Xpc {
    fn drop(&mut self) {
        if let Err(e) = self.command(CMD_OUTPUT, OUTPUT_OFF) {
            warn!("could not disable the Platform Cable outputs: {}", e);
        }
    }
}

impl Cable for Xpc {
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

/// Find the cable `config` describes and drive the chain its subtype picks
pub fn open(config: &CableConfig) -> Result<Xpc, CableError> {
    let device = usb::open_device(config)?;
    debug!("Platform Cable clock is fixed by its firmware, ignoring {} Hz", config.clock);
    Xpc::new(device, config.subtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_clocks_per_byte_pair() {
        let clocks = [
            Clock { tms: false, tdi: true, read: true },
            Clock { tms: true, tdi: false, read: false },
            Clock { tms: false, tdi: false, read: true },
            Clock { tms: true, tdi: true, read: false },
            Clock { tms: true, tdi: true, read: true },
        ];
        assert_eq!(encode(&clocks), vec![0b1010_1001, 0b1111_0101, 0b0001_0001, 0b0001_0001]);
        assert!(encode(&[]).is_empty());
    }

    #[test]
    fn replies_are_whole_words() {
        assert_eq!(reply_len(0), 0);
        assert_eq!(reply_len(1), 2);
        assert_eq!(reply_len(16), 2);
        assert_eq!(reply_len(17), 4);
        assert_eq!(reply_len(64), 8);
    }

    #[test]
    fn partial_word_is_top_aligned() {
        // 16 samples, then 3 in the top bits of the second word
        let reply = [0x01, 0x80, 0x00, 0xa0];
        let tdo = decode(&reply, 19);
        assert_eq!(tdo.len(), 19);
        assert!(tdo[0] && tdo[15]);
        assert_eq!(tdo[1..15].iter().filter(|b| **b).count(), 0);
        assert_eq!(&tdo[16..], &[true, false, true]);
    }

    #[test]
    fn decode_stops_at_the_sample_count() {
        assert_eq!(decode(&[0xff, 0xff, 0xff, 0xff], 16), vec![true; 16]);
        assert!(decode(&[0xff, 0xff], 0).is_empty());
    }

    #[test]
    fn whole_stream_through_pack() {
        // a 64 bit capture arrives as four words
        let dna = 0x0123_4567_89ab_cdef_u64;
        let reply = dna.to_le_bytes();
        let tdo = decode(&reply, 64);
        assert_eq!(usb::pack(&tdo, 8), dna.to_le_bytes().to_vec());
    }
}
