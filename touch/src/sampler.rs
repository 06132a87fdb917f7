//! RC charge-time measurement of an antenna through a send/receive pin pair.
//!
//! The send pin charges the antenna through a large resistor and the receive pin watches the
//! antenna voltage. A finger adds capacitance, the voltage rises slower, and the number of loop
//! iterations spent waiting for the receive pin to read high grows.

/// Pin operations needed to run one measurement cycle
pub trait SensePins {
    fn set_send_output(&mut self);
    fn set_send_input(&mut self);
    fn set_receive_input(&mut self);
    fn set_send_high(&mut self);
    fn set_send_low(&mut self);
    fn receive_is_high(&mut self) -> bool;
}

/// Source of raw capacitance samples
pub trait Sampler {
    fn sample(&mut self) -> u32;
}

impl<F: FnMut() -> u32> Sampler for F {
    fn sample(&mut self) -> u32 {
        self()
    }
}

/// Source of averaged readings
pub trait Reader {
    fn read(&mut self, count: u16) -> u32;
}

impl<F: FnMut(u16) -> u32> Reader for F {
    fn read(&mut self, count: u16) -> u32 {
        self(count)
    }
}

/// Number of spin iterations the send pin is held low to discharge the antenna
const DISCHARGE_SPINS: u32 = 3;

pub struct Capacitance<P: SensePins> {
    pins: P,
}

impl<P: SensePins> Capacitance<P> {
    pub fn new(pins: P) -> Self {
        Self { pins }
    }

    pub fn release(self) -> P {
        self.pins
    }
}

impl<P: SensePins> Sampler for Capacitance<P> {
    /// Take one raw sample
    ///
    /// Runs with interrupts disabled, since the result is a loop count. There is no timeout: if
    /// the receive pin never changes level this never returns.
    fn sample(&mut self) -> u32 {
        critical_section::with(|_| {
            let pins = &mut self.pins;

            // The previous charge has to leak away first
            while pins.receive_is_high() {}

            pins.set_send_low();
            pins.set_send_output();
            for _ in 0..DISCHARGE_SPINS {
                core::hint::spin_loop();
            }

            pins.set_send_input();
            pins.set_receive_input();

            pins.set_send_output();
            pins.set_send_high();

            let mut count = 0u32;
            while !pins.receive_is_high() {
                count += 1;
            }

            pins.set_send_low();
            count
        })
    }
}

/// Averages a fixed number of raw samples into one reading
pub struct Averager<S: Sampler> {
    sampler: S,
}

impl<S: Sampler> Averager<S> {
    pub fn new(sampler: S) -> Self {
        Self { sampler }
    }
}

impl<S: Sampler> Reader for Averager<S> {
    /// Returns the truncated mean of `count` samples, or 0 when `count` is 0
    fn read(&mut self, count: u16) -> u32 {
        if count == 0 {
            return 0;
        }
        let mut sum: u64 = 0;
        for _ in 0..count {
            sum += self.sampler.sample() as u64;
        }
        (sum / count as u64) as u32
    }
}
