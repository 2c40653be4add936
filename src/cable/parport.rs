//! Xilinx DLC5-style parallel cables through the Linux ppdev driver.  The data and status
//! registers are wrapped up as `embedded-hal` pins and clocked by the `Gpio` cable.
//!
//! | Line          | Signal |
//! |---------------|--------|
//! | D0            | TDI    |
//! | D1            | TCK    |
//! | D2            | TMS    |
//! | D3            | CTRL   |
//! | D4            | PROG   |
//! | status bit 4  | TDO    |
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorType, InputPin, OutputPin};
use log::{debug, warn};

use crate::cable::gpio::Gpio;
use crate::cable::CableError;

pub const DEFAULT_DEVICE: &str = "/dev/parport0";

// <linux/ppdev.h>
const PPRSTATUS: u32 = 0x8001_7081;
const PPWDATA: u32 = 0x4001_7086;
const PPCLAIM: u32 = 0x0000_708b;
const PPRELEASE: u32 = 0x0000_708c;

const TDI: u8 = 1 << 0;
const TCK: u8 = 1 << 1;
const TMS: u8 = 1 << 2;
const CTRL: u8 = 1 << 3;
const PROG: u8 = 1 << 4;
const TDO: u8 = 1 << 4;

pub type ParportCable = Gpio<DataPin, DataPin, StatusPin, DataPin, SpinDelay>;

/// A claimed ppdev port.  The data register is write-only, so the last value written is kept.
struct Port {
    file: File,
    data: u8,
}

impl Port {
    fn claim(path: &str) -> io::Result<Port> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: PPCLAIM takes no argument
        if unsafe { libc::ioctl(file.as_raw_fd(), PPCLAIM as _) } < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!("claimed {}", path);
        Ok(Port { file, data: 0 })
    }

    fn write(&mut self, data: u8) -> io::Result<()> {
        // SAFETY: PPWDATA reads one byte through the pointer
        if unsafe { libc::ioctl(self.file.as_raw_fd(), PPWDATA as _, &data as *const u8) } < 0 {
            return Err(io::Error::last_os_error());
        }
        self.data = data;
        Ok(())
    }

    fn status(&mut self) -> io::Result<u8> {
        let mut status = 0u8;
        // SAFETY: PPRSTATUS writes one byte through the pointer
        if unsafe { libc::ioctl(self.file.as_raw_fd(), PPRSTATUS as _, &mut status as *mut u8) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(status)
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        // SAFETY: PPRELEASE takes no argument
        if unsafe { libc::ioctl(self.file.as_raw_fd(), PPRELEASE as _) } < 0 {
            warn!("releasing parallel port: {}", io::Error::last_os_error());
        }
    }
}

#[derive(Debug)]
pub struct PortError(io::Error);

impl digital::Error for PortError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// One bit of the data register
pub struct DataPin {
    port: Rc<RefCell<Port>>,
    mask: u8,
}

impl DataPin {
    fn set(&mut self, high: bool) -> Result<(), PortError> {
        let mut port = self.port.borrow_mut();
        let data = if high { port.data | self.mask } else { port.data & !self.mask };
        if data == port.data {
            return Ok(());
        }
        port.write(data).map_err(|e| {
            warn!("parallel port write failed: {}", e);
            PortError(e)
        })
    }
}

impl ErrorType for DataPin {
    type Error = PortError;
}

impl OutputPin for DataPin {
    fn set_low(&mut self) -> Result<(), PortError> {
        self.set(false)
    }

    fn set_high(&mut self) -> Result<(), PortError> {
        self.set(true)
    }
}

/// One bit of the status register
pub struct StatusPin {
    port: Rc<RefCell<Port>>,
    mask: u8,
}

impl ErrorType for StatusPin {
    type Error = PortError;
}

impl InputPin for StatusPin {
    fn is_high(&mut self) -> Result<bool, PortError> {
        let status = self.port.borrow_mut().status().map_err(|e| {
            warn!("parallel port status read failed: {}", e);
            PortError(e)
        })?;
        Ok(status & self.mask != 0)
    }

    fn is_low(&mut self) -> Result<bool, PortError> {
        self.is_high().map(|h| !h)
    }
}

/// Busy-waits; ppdev ioctls are slow enough that the delays are rarely longer than the calls
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let until = Instant::now() + Duration::from_nanos(ns as u64);
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}

/// Claim the port at `path` and drive it as a JTAG cable at up to `clock` hertz
pub fn open(path: &str, clock: u32) -> Result<ParportCable, CableError> {
    let mut port = Port::claim(path)?;
    // PROG is active low; CTRL enables the cable's buffers
    port.write(PROG | CTRL | TMS)?;
    let port = Rc::new(RefCell::new(port));

    let pin = |mask| DataPin { port: port.clone(), mask };
    Ok(Gpio::new(clock, pin(TCK), pin(TDI), StatusPin { port: port.clone(), mask: TDO }, pin(TMS),
        SpinDelay))
}
