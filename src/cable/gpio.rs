//! A bit-banged cable on four GPIO pins.  Anything that implements the `embedded-hal` digital
//! traits will do: microcontroller pins, a Linux GPIO chip, or the data and status lines of a
//! parallel port.
use alloc::vec::Vec;
use alloc::vec;
use embedded_hal::{delay::DelayNs, digital::{self, InputPin, OutputPin, PinState}};

use crate::cable::{Cable, CableError};

fn pin_error<E: digital::Error>(e: E) -> CableError {
    CableError::Gpio(e.kind())
}

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    half_period: u32,
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    /// `freq_hz` is the TCK frequency; zero means as fast as the pins will toggle
    pub fn new(freq_hz: u32, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms, delay: Delay) -> Gpio<Clk, Tdi, Tdo, Tms, Delay> {
        let half_period = match freq_hz {
            0 => 0,
            f => 500_000_000 / f,
        };
        Gpio { half_period, clock, tdi, tdo, tms, delay }
    }

    /// One TCK cycle.  TDO is sampled before the rising edge, since the TAP drives it on the
    /// falling edge.
    fn cycle(&mut self, tms: bool, tdi: bool) -> Result<bool, CableError> {
        self.tms.set_state(PinState::from(tms)).map_err(pin_error)?;
        self.tdi.set_state(PinState::from(tdi)).map_err(pin_error)?;
        let tdo = self.tdo.is_high().map_err(pin_error)?;

        self.delay.delay_ns(self.half_period);
        self.clock.set_high().map_err(pin_error)?;
        self.delay.delay_ns(self.half_period);
        self.clock.set_low().map_err(pin_error)?;
        Ok(tdo)
    }

    fn shift(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, CableError> {
        let bits = bits.clamp(1, 8) as usize;
        let total = data.len().saturating_sub(1) * 8 + bits;
        let mut out = vec![0; data.len()];

        for i in 0..total {
            let tdi = data[i / 8] & (1 << (i % 8)) != 0;
            // TMS goes high with the last bit to leave the shift state
            let last = i == total - 1;
            if self.cycle(last && pause_after, tdi)? {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        if pause_after {
            // Exit1 -> Pause
            self.cycle(false, true)?;
        }
        Ok(out)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), CableError> {
        for t in tms {
            self.cycle(*t, tdi)?;
        }
        Ok(())
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, CableError> {
        let mut buf = vec![0; (bits + 7) / 8];
        for i in 0..bits {
            if self.cycle(false, true)? {
                buf[i / 8] |= 1 << (i % 8);
            }
        }
        Ok(buf)
    }

    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), CableError> {
        self.shift(data, bits, pause_after)?;
        Ok(())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool)
        -> Result<Vec<u8>, CableError>
    {
        self.shift(data, bits, pause_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::{Cell, RefCell};
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    // TDI wired straight back to TDO through a one bit register clocked by TCK
    #[derive(Default)]
    struct Wire {
        tdi: Cell<bool>,
        tms: RefCell<Vec<bool>>,
        latched: Cell<bool>,
        clocks: Cell<usize>,
        fail: Cell<bool>,
    }

    #[derive(Debug)]
    struct Broken;

    impl digital::Error for Broken {
        fn kind(&self) -> digital::ErrorKind {
            digital::ErrorKind::Other
        }
    }

    struct Tck(Rc<Wire>);
    struct Tdi(Rc<Wire>);
    struct Tms(Rc<Wire>);
    struct Tdo(Rc<Wire>);
    struct NoDelay;

    impl ErrorType for Tck { type Error = Infallible; }
    impl ErrorType for Tdi { type Error = Infallible; }
    impl ErrorType for Tms { type Error = Infallible; }
    impl ErrorType for Tdo { type Error = Broken; }

    impl OutputPin for Tck {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.clocks.set(self.0.clocks.get() + 1);
            self.0.latched.set(self.0.tdi.get());
            Ok(())
        }
    }

    impl OutputPin for Tdi {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.tdi.set(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.tdi.set(true);
            Ok(())
        }
    }

    impl OutputPin for Tms {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.tms.borrow_mut().push(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.tms.borrow_mut().push(true);
            Ok(())
        }
    }

    impl InputPin for Tdo {
        fn is_high(&mut self) -> Result<bool, Broken> {
            if self.0.fail.get() {
                return Err(Broken);
            }
            Ok(self.0.latched.get())
        }
        fn is_low(&mut self) -> Result<bool, Broken> {
            self.is_high().map(|h| !h)
        }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn cable() -> (Rc<Wire>, Gpio<Tck, Tdi, Tdo, Tms, NoDelay>) {
        let wire = Rc::new(Wire::default());
        let gpio = Gpio::new(0, Tck(wire.clone()), Tdi(wire.clone()), Tdo(wire.clone()),
            Tms(wire.clone()), NoDelay);
        (wire, gpio)
    }

    #[test]
    fn shift_is_lsb_first_and_one_bit_late() {
        let (wire, mut gpio) = cable();
        let out = gpio.read_write_data(&[0b1010_0101, 0b011], 3, false).unwrap();
        // each bit comes back one clock later
        assert_eq!(out, vec![0b0100_1010, 0b111]);
        assert_eq!(wire.clocks.get(), 11);
        assert!(wire.tms.borrow().iter().all(|t| !t));
    }

    #[test]
    fn pause_after_raises_tms_on_last_bit() {
        let (wire, mut gpio) = cable();
        gpio.write_data(&[0xff], 4, true).unwrap();
        assert_eq!(*wire.tms.borrow(), vec![false, false, false, true, false]);
        assert_eq!(wire.clocks.get(), 5);
    }

    #[test]
    fn read_data_packs_partial_bytes() {
        let (wire, mut gpio) = cable();
        let out = gpio.read_data(12).unwrap();
        assert_eq!(out.len(), 2);
        // TDI is held high, so everything after the first bit is one
        assert_eq!(out, vec![0xfe, 0x0f]);
        assert_eq!(wire.clocks.get(), 12);
    }

    #[test]
    fn pin_errors_are_reported() {
        let (wire, mut gpio) = cable();
        wire.fail.set(true);
        assert!(matches!(gpio.change_mode(&[true], true),
            Err(CableError::Gpio(digital::ErrorKind::Other))));
    }
}
