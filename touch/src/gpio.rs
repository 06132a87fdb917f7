//! Register level sense pin driver for GPIOA on STM32F0 and STM32F3 parts.
//!
//! The measurement needs to flip the send pin between output and floating input on every sample,
//! which the type-state pins of the HAL crates can't do without giving up ownership each time. So
//! this driver writes MODER/BSRR/IDR directly. It takes the register block by pointer rather than
//! accepting a PAC object, to avoid tying the `touch` crate to the PAC version pulled in by the
//! application's HAL.
//!
//! Nothing else may reconfigure the two pins it owns while it exists.

#[cfg(feature="stm32f0x1")]
use stm32f0::stm32f0x1 as pac;
#[cfg(feature="stm32f303")]
use stm32f3::stm32f303 as pac;

use crate::sampler::SensePins;

const MODE_INPUT: u32 = 0b00;
const MODE_OUTPUT: u32 = 0b01;

pub struct PortAPins {
    regs: &'static pac::gpioa::RegisterBlock,
    send: u8,
    receive: u8,
}

impl PortAPins {
    /// Take over PAx `send` and PAx `receive`
    ///
    /// Enables the port clock and leaves both pins floating, without pull resistors.
    pub fn new(send: u8, receive: u8) -> Self {
        assert!(send < 16 && receive < 16 && send != receive);

        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.ahbenr.modify(|_, w| w.iopaen().set_bit());

        let regs = unsafe { &*pac::GPIOA::ptr() };
        let pull_mask = (0b11 << (send * 2)) | (0b11 << (receive * 2));
        regs.pupdr.modify(|r, w| unsafe { w.bits(r.bits() & !pull_mask) });
        regs.otyper.modify(|r, w| unsafe { w.bits(r.bits() & !(1 << send)) });

        let mut pins = Self { regs, send, receive };
        pins.set_send_low();
        pins.set_mode(send, MODE_INPUT);
        pins.set_mode(receive, MODE_INPUT);
        pins
    }

    fn set_mode(&mut self, pin: u8, mode: u32) {
        let shift = pin * 2;
        self.regs.moder.modify(|r, w| unsafe {
            w.bits((r.bits() & !(0b11 << shift)) | (mode << shift))
        });
    }
}

impl SensePins for PortAPins {
    fn set_send_output(&mut self) {
        self.set_mode(self.send, MODE_OUTPUT);
    }

    fn set_send_input(&mut self) {
        self.set_mode(self.send, MODE_INPUT);
    }

    fn set_receive_input(&mut self) {
        self.set_mode(self.receive, MODE_INPUT);
    }

    fn set_send_high(&mut self) {
        self.regs.bsrr.write(|w| unsafe { w.bits(1 << self.send) });
    }

    fn set_send_low(&mut self) {
        // Upper half of BSRR resets
        self.regs.bsrr.write(|w| unsafe { w.bits(1 << (self.send + 16)) });
    }

    fn receive_is_high(&mut self) -> bool {
        self.regs.idr.read().bits() & (1 << self.receive) != 0
    }
}
