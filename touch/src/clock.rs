//! Millisecond clock driven by a periodic timer overflow interrupt.
//!
//! The timer is expected to overflow every `us_per_overflow` microseconds. Each overflow adds that
//! amount to a microsecond accumulator, and every whole 1000 us is moved into the millisecond
//! count, so no fraction is ever lost and the clock does not drift.

use core::cell::Cell;
use critical_section::Mutex;

#[derive(Clone, Copy, Debug)]
struct Ticks {
    millis: u64,
    micros: u32,
}

pub struct SoftClock {
    us_per_overflow: u32,
    ticks: Mutex<Cell<Ticks>>,
}

impl SoftClock {
    pub const fn new(us_per_overflow: u16) -> Self {
        Self {
            us_per_overflow: us_per_overflow as u32,
            ticks: Mutex::new(Cell::new(Ticks { millis: 0, micros: 0 })),
        }
    }

    /// Account for one timer overflow. Call from the timer interrupt.
    pub fn on_overflow(&self) {
        critical_section::with(|cs| {
            let cell = self.ticks.borrow(cs);
            let mut t = cell.get();
            t.micros += self.us_per_overflow;
            // A single overflow may be worth more than one millisecond
            while t.micros >= 1000 {
                t.millis += 1;
                t.micros -= 1000;
            }
            cell.set(t);
        });
    }

    /// Milliseconds since boot
    pub fn now(&self) -> u64 {
        critical_section::with(|cs| self.ticks.borrow(cs).get().millis)
    }
}
