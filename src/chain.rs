//! Chain enumeration and device selection.
//!
//! `enumerate` finds every TAP and resolves its IR length from a `Registry`.  Instruction shifts
//! go through every TAP on the chain at once, so a chain is only usable when every IR length is
//! known: one unknown IDCODE fails the whole enumeration and nothing is committed to the
//! transport.
use alloc::string::String;
use alloc::vec::Vec;
use alloc::borrow::ToOwned;

use log::debug;

use crate::devicedb::Registry;
use crate::transport::Transport;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapPosition {
    pub idcode: u32,
    pub irlen: usize,
    pub description: String,
    pub selected: bool,
}

/// The TAPs found by one enumeration, nearest TDO first
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanChain {
    taps: Vec<TapPosition>,
}

/// The one chain position instruction and data shifts are aimed at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectedDevice {
    pub position: usize,
    pub idcode: u32,
    pub irlen: usize,
}

/// Discover the TAPs on the chain and program the transport with each one's IR length
pub fn enumerate<T, R>(transport: &mut T, registry: &R) -> Result<ScanChain>
    where T: Transport + ?Sized,
          R: Registry + ?Sized
{
    let count = transport.detect_chain()?;
    if count == 0 {
        return Err(Error::NoDevices);
    }

    let mut taps = Vec::with_capacity(count);
    for position in 0..count {
        let idcode = transport.device_id(position)
            .ok_or(Error::InvalidPosition { position: position as i64, length: count })?;
        let device = registry.lookup(idcode)
            .ok_or(Error::UnknownDevice { position, idcode })?;
        debug!("chain position {}: {:08x} {} (IR {} bits)", position, idcode, device.name, device.irlen);

        taps.push(TapPosition {
            idcode,
            irlen: device.irlen.get() as usize,
            description: device.name.as_ref().to_owned(),
            selected: false,
        });
    }

    for (position, tap) in taps.iter().enumerate() {
        transport.set_ir_length(position, tap.irlen);
    }
    Ok(ScanChain { taps })
}

impl ScanChain {
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn taps(&self) -> &[TapPosition] {
        &self.taps
    }

    pub fn get(&self, position: usize) -> Option<&TapPosition> {
        self.taps.get(position)
    }

    pub fn selected(&self) -> Option<usize> {
        self.taps.iter().position(|t| t.selected)
    }

    /// Mark `position` as the target of later shifts.  A position outside the chain is an error
    /// and leaves the previous selection alone.
    pub fn select(&mut self, position: i64) -> Result<SelectedDevice> {
        let length = self.taps.len();
        let index = usize::try_from(position).ok()
            .filter(|p| *p < length)
            .ok_or(Error::InvalidPosition { position, length })?;

        for (i, tap) in self.taps.iter_mut().enumerate() {
            tap.selected = i == index;
        }
        let tap = &self.taps[index];
        Ok(SelectedDevice {
            position: index,
            idcode: tap.idcode,
            irlen: tap.irlen,
        })
    }
}
