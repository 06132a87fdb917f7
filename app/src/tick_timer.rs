use crate::pac;
use crate::hal::rcc::Rcc;

/// Free running TIM2 with an update interrupt every `us_per_overflow` microseconds
pub struct TickTimer {
    tim: pac::TIM2,
}

impl TickTimer {
    pub fn new(tim: pac::TIM2, rcc: &mut Rcc, us_per_overflow: u32) -> Self {
        let rccregs = unsafe { pac::Peripherals::steal().RCC };
        rccregs.apb1enr.modify(|_, w| w.tim2en().set_bit());

        // If pclk is prescaled from hclk, the frequency fed into the timers is doubled
        let clk_freq = if rcc.clocks.hclk().0 == rcc.clocks.pclk().0 {
            rcc.clocks.pclk().0
        } else {
            rcc.clocks.pclk().0 * 2
        };

        // Count at 1 MHz, so one count is one microsecond
        let psc = (clk_freq / 1_000_000 - 1) as u16;
        tim.psc.write(|w| w.psc().bits(psc));
        tim.arr.write(|w| w.arr().bits(us_per_overflow - 1));

        // Load the prescaler now, then start counting
        tim.egr.write(|w| w.ug().set_bit());
        tim.sr.write(|w| unsafe { w.bits(0) });
        tim.cr1.modify(|_, w| {
            w.cen().set_bit()
            .arpe().set_bit()
        });

        Self { tim }
    }

    pub fn enable_irq(&mut self) {
        self.tim.dier.write(|w| w.uie().set_bit());
    }
}
