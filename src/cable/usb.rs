//! Plumbing shared by the cables that talk to their firmware through libusb: finding and claiming
//! the device, and turning `Cable` calls into a flat list of TCK cycles for firmware that wants
//! its pins spelled out clock by clock.
use alloc::vec::Vec;
use std::time::Duration;

use log::{debug, info};
use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};

use crate::cable::{CableConfig, CableError};

pub const TIMEOUT: Duration = Duration::from_millis(1000);

/// Open the first device that matches the ids, product string and serial number in `config`,
/// and claim its first interface.
pub fn open_device(config: &CableConfig) -> Result<DeviceHandle<GlobalContext>, CableError> {
    let (vendor, product) = config.usb_ids();
    for device in rusb::devices()?.iter() {
        let descriptor = device.device_descriptor()?;
        if descriptor.vendor_id() != vendor || descriptor.product_id() != product {
            continue;
        }
        let mut handle = match device.open() {
            Ok(handle) => handle,
            Err(e) => {
                debug!("skipping {:04x}:{:04x} at {}.{}: {}", vendor, product,
                    device.bus_number(), device.address(), e);
                continue;
            }
        };
        if let Some(wanted) = &config.description {
            if handle.read_product_string_ascii(&descriptor).ok().as_ref() != Some(wanted) {
                continue;
            }
        }
        if let Some(wanted) = &config.serial {
            if handle.read_serial_number_string_ascii(&descriptor).ok().as_ref() != Some(wanted) {
                continue;
            }
        }

        info!("using USB device {:04x}:{:04x} at {}.{}", vendor, product, device.bus_number(),
            device.address());
        // not every platform can detach a kernel driver
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.claim_interface(0)?;
        return Ok(handle);
    }
    Err(CableError::NotFound)
}

/// (in, out) addresses of the first pair of bulk endpoints in the active configuration
pub fn bulk_endpoints(handle: &DeviceHandle<GlobalContext>) -> Result<(u8, u8), CableError> {
    let config = handle.device().active_config_descriptor()?;
    for interface in config.interfaces() {
        for d in interface.descriptors() {
            let mut read_endpoint = None;
            let mut write_endpoint = None;
            for e in d.endpoint_descriptors() {
                if e.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match e.direction() {
                    Direction::In => read_endpoint = read_endpoint.or(Some(e.address())),
                    Direction::Out => write_endpoint = write_endpoint.or(Some(e.address())),
                }
            }
            if let (Some(read), Some(write)) = (read_endpoint, write_endpoint) {
                debug!("bulk endpoints in {:#04x} out {:#04x}", read, write);
                return Ok((read, write));
            }
        }
    }
    Err(CableError::NotFound)
}

/// One TCK cycle: the TMS and TDI levels to present, and whether TDO is wanted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Clock {
    pub tms: bool,
    pub tdi: bool,
    pub read: bool,
}

pub fn mode_clocks(tms: &[bool], tdi: bool) -> Vec<Clock> {
    tms.iter().map(|&tms| Clock { tms, tdi, read: false }).collect()
}

/// Clock out ones while reading `bits` bits
pub fn read_clocks(bits: usize) -> Vec<Clock> {
    (0..bits).map(|_| Clock { tms: false, tdi: true, read: true }).collect()
}

/// The clocks of a data shift.  `bits` counts the bits used in the last byte of `data`.  With
/// `pause_after`, TMS rises on the last bit and one more clock lands in Pause.
pub fn shift_clocks(data: &[u8], bits: u8, pause_after: bool, read: bool) -> Vec<Clock> {
    if data.is_empty() {
        return Vec::new();
    }
    let total = (data.len() - 1) * 8 + bits.clamp(1, 8) as usize;
    let mut clocks: Vec<Clock> = (0..total)
        .map(|i| Clock {
            tms: pause_after && i == total - 1,
            tdi: data[i / 8] & (1 << (i % 8)) != 0,
            read,
        })
        .collect();
    if pause_after {
        clocks.push(Clock { tms: false, tdi: true, read: false });
    }
    clocks
}

/// Pack TDO samples LSB first into `bytes` bytes
pub fn pack(tdo: &[bool], bytes: usize) -> Vec<u8> {
    let mut out = alloc::vec![0; bytes];
    for (i, _) in tdo.iter().enumerate().filter(|(_, bit)| **bit) {
        if let Some(byte) = out.get_mut(i / 8) {
            *byte |= 1 << (i % 8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn shift_raises_tms_on_the_last_bit() {
        let clocks = shift_clocks(&[0b1111_0000, 0b01], 2, true, true);
        assert_eq!(clocks.len(), 11);
        assert_eq!(clocks.iter().filter(|c| c.tms).count(), 1);
        assert!(clocks[9].tms && !clocks[9].tdi);
        assert!(clocks[8].tdi && !clocks[3].tdi && clocks[4].tdi);
        // Exit1 to Pause is not sampled
        assert_eq!(clocks[10], Clock { tms: false, tdi: true, read: false });
        assert_eq!(clocks.iter().filter(|c| c.read).count(), 10);
    }

    #[test]
    fn shift_without_pause_stays_put() {
        let clocks = shift_clocks(&[0xff], 8, false, false);
        assert_eq!(clocks.len(), 8);
        assert!(clocks.iter().all(|c| c.tdi && !c.tms && !c.read));
        assert!(shift_clocks(&[], 8, true, true).is_empty());
    }

    #[test]
    fn mode_and_read_clocks() {
        let mode = mode_clocks(&[true, true, false], false);
        assert_eq!(mode.iter().map(|c| c.tms).collect::<Vec<_>>(), vec![true, true, false]);
        assert!(mode.iter().all(|c| !c.tdi && !c.read));

        let read = read_clocks(5);
        assert_eq!(read.len(), 5);
        assert!(read.iter().all(|c| c.tdi && c.read && !c.tms));
    }

    #[test]
    fn pack_is_lsb_first() {
        let tdo = [true, false, false, false, false, false, false, true, false, true];
        assert_eq!(pack(&tdo, 2), vec![0x81, 0x02]);
        // samples beyond the buffer are dropped
        assert_eq!(pack(&tdo, 1), vec![0x81]);
        assert_eq!(pack(&[], 1), vec![0]);
    }
}
