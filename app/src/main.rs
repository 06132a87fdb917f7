#![no_main]
#![no_std]

use cortex_m;
use cortex_m_rt::entry;
use panic_halt as _;

use stm32f0xx_hal as hal;

use touch::SenseConfig;
use touch::clock::SoftClock;
use touch::controller::Controller;
use touch::gpio::PortAPins;
use touch::sampler::{Averager, Capacitance};

use crate::hal::delay::Delay;
use crate::hal::pac;
use crate::hal::pac::interrupt;
use crate::hal::prelude::*;

#[macro_use]
mod serial;
mod tick_timer;

use tick_timer::TickTimer;

/// Microseconds per TIM2 overflow
const TICK_US: u16 = 256;

/// PA3 charges the antenna through the sense resistor
const SEND_PIN: u8 = 3;
/// PA4 is wired to the antenna
const RECEIVE_PIN: u8 = 4;

static SENSE_CONFIG: SenseConfig = SenseConfig {
    refresh_interval_ms: 20,
    recalibration_interval_ms: 5 * 60 * 1000,
    sample_count: 20,
    calibration_trials: 100,
    sensitivity_margin: 0,
    recalibration_band_low_pct: 80,
    recalibration_band_high_pct: 120,
    ready_blink_ms: 200,
};

static CLOCK: SoftClock = SoftClock::new(TICK_US);

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let cp = cortex_m::Peripherals::take().unwrap();
    let mut nvic = cp.NVIC;

    let mut flash = dp.FLASH;
    let mut rcc = dp.RCC.configure().sysclk(8.mhz()).freeze(&mut flash);
    let gpiob = dp.GPIOB.split(&mut rcc);
    let gpioc = dp.GPIOC.split(&mut rcc);

    // PC9 is the indicator LED, PC8 switches the strip MOSFET
    let (led, strip, tx_pin, rx_pin) = cortex_m::interrupt::free(|cs| {
        (
            gpioc.pc9.into_push_pull_output(cs),
            gpioc.pc8.into_push_pull_output(cs),
            gpiob.pb6.into_alternate_af0(cs),
            gpiob.pb7.into_alternate_af0(cs),
        )
    });

    let uart = hal::serial::Serial::usart1(dp.USART1, (tx_pin, rx_pin), 115200.bps(), &mut rcc);
    serial::uart1::init(uart, 3);

    let mut tick_timer = TickTimer::new(dp.TIM2, &mut rcc, TICK_US as u32);
    unsafe {
        nvic.set_priority(pac::Interrupt::TIM2, 1);
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM2);
    }
    tick_timer.enable_irq();

    let mut delay = Delay::new(cp.SYST, &rcc);

    let sensor = Averager::new(Capacitance::new(PortAPins::new(SEND_PIN, RECEIVE_PIN)));
    let mut controller = Controller::new(&SENSE_CONFIG, sensor, led, strip);

    log!("calibrating\r\n");
    controller.start(CLOCK.now(), &mut delay);
    log!("ready, threshold {} reading {}\r\n", controller.threshold(), controller.last_reading());

    loop {
        let now = CLOCK.now();
        let result = controller.poll(now);

        if result.toggled {
            log!("[{}] touch, output {}\r\n", now, if controller.output_on() { "on" } else { "off" });
        }
        if let Some(threshold) = result.recalibrated {
            log!("[{}] recalibrated, threshold {}\r\n", now, threshold);
        }
    }
}

#[interrupt]
fn TIM2() {
    // Clear IRQ flags
    unsafe {
        let tim2 = pac::Peripherals::steal().TIM2;
        tim2.sr.write(|w| w.bits(0));
    }
    CLOCK.on_overflow();
}
