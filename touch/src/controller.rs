use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::OutputPin;

use crate::calibrate::calibrate;
use crate::sampler::Reader;
use crate::SenseConfig;

/// What happened during one call to [`Controller::poll`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Poll {
    /// The fresh reading, if the refresh interval had elapsed
    pub reading: Option<u32>,
    /// True if a rising edge flipped the outputs
    pub toggled: bool,
    /// The new threshold, if a recalibration ran
    pub recalibrated: Option<u32>,
}

/// Touch decision loop for a single antenna
///
/// Every refresh interval a reading is compared against the calibrated threshold. An untouched to
/// touched transition flips the output state, which drives both the indicator LED and the strip.
/// Every recalibration interval the threshold is refreshed, provided the sensor looks untouched
/// and the last reading is close enough to the current threshold.
pub struct Controller<'a, R, L, S> {
    config: &'a SenseConfig,
    reader: R,
    led: L,
    strip: S,
    threshold: u32,
    touched: bool,
    last_reading: u32,
    output_on: bool,
    last_poll: u64,
    last_calibration: u64,
}

impl<'a, R, L, S> Controller<'a, R, L, S>
where
    R: Reader,
    L: OutputPin,
    S: OutputPin,
{
    pub fn new(config: &'a SenseConfig, reader: R, led: L, strip: S) -> Self {
        Self {
            config,
            reader,
            led,
            strip,
            threshold: 0,
            touched: false,
            last_reading: 0,
            output_on: false,
            last_poll: 0,
            last_calibration: 0,
        }
    }

    /// Calibrate, seed the touch state and blink the LED to signal the sensor is ready
    ///
    /// The antenna must not be touched while this runs.
    pub fn start<D: DelayMs<u16>>(&mut self, now: u64, delay: &mut D) {
        self.set_outputs(false);

        self.threshold = self.calibrate();
        self.last_reading = self.reader.read(self.config.sample_count);
        self.touched = self.is_touch(self.last_reading);

        // Four toggles: the LED ends up where it started
        for i in 0..4 {
            if i > 0 {
                delay.delay_ms(self.config.ready_blink_ms);
            }
            set_pin(&mut self.led, i % 2 == 0);
        }

        self.last_poll = now;
        self.last_calibration = now;
    }

    /// Run one pass of the decision loop at time `now`, in milliseconds
    pub fn poll(&mut self, now: u64) -> Poll {
        let mut result = Poll::default();

        if now.saturating_sub(self.last_poll) >= self.config.refresh_interval_ms as u64 {
            self.last_poll = now;

            let reading = self.reader.read(self.config.sample_count);
            let touched = self.is_touch(reading);
            if touched && !self.touched {
                self.set_outputs(!self.output_on);
                result.toggled = true;
            }
            self.touched = touched;
            self.last_reading = reading;
            result.reading = Some(reading);
        }

        if now.saturating_sub(self.last_calibration) >= self.config.recalibration_interval_ms as u64 {
            self.last_calibration = now;
            if !self.touched && self.in_recalibration_band(self.last_reading) {
                self.threshold = self.calibrate();
                result.recalibrated = Some(self.threshold);
            }
        }

        result
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn output_on(&self) -> bool {
        self.output_on
    }

    pub fn last_reading(&self) -> u32 {
        self.last_reading
    }

    fn calibrate(&mut self) -> u32 {
        calibrate(
            &mut self.reader,
            self.config.calibration_trials,
            self.config.sample_count,
        )
    }

    fn is_touch(&self, reading: u32) -> bool {
        reading as u64 > self.threshold as u64 + self.config.sensitivity_margin as u64
    }

    /// True if `reading` lies within the configured percentage band around the threshold, bounds
    /// included. A reading far below the threshold, e.g. from a disconnected antenna, blocks
    /// recalibration.
    fn in_recalibration_band(&self, reading: u32) -> bool {
        let scaled = reading as u64 * 100;
        let threshold = self.threshold as u64;
        scaled >= threshold * self.config.recalibration_band_low_pct as u64
            && scaled <= threshold * self.config.recalibration_band_high_pct as u64
    }

    fn set_outputs(&mut self, on: bool) {
        self.output_on = on;
        set_pin(&mut self.led, on);
        set_pin(&mut self.strip, on);
    }
}

fn set_pin<P: OutputPin>(pin: &mut P, high: bool) {
    if high {
        pin.set_high().ok();
    } else {
        pin.set_low().ok();
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::DEFAULT_SENSE_CONFIG;
    use core::convert::Infallible;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Output pin which records every level written to it
    #[derive(Clone, Default)]
    struct MockPin(Rc<RefCell<Vec<bool>>>);

    impl MockPin {
        fn level(&self) -> Option<bool> {
            self.0.borrow().last().copied()
        }

        fn history(&self) -> Vec<bool> {
            self.0.borrow().clone()
        }
    }

    impl OutputPin for MockPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(true);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockDelay {
        calls: Vec<u16>,
    }

    impl DelayMs<u16> for MockDelay {
        fn delay_ms(&mut self, ms: u16) {
            self.calls.push(ms);
        }
    }

    /// A sensor whose averaged reading is whatever `level` is set to
    struct Sensor {
        level: Rc<Cell<u32>>,
        reads: Rc<Cell<usize>>,
    }

    impl Sensor {
        fn new(level: u32) -> Self {
            Self {
                level: Rc::new(Cell::new(level)),
                reads: Rc::new(Cell::new(0)),
            }
        }

        fn reader(&self) -> impl FnMut(u16) -> u32 {
            let level = self.level.clone();
            let reads = self.reads.clone();
            move |_count| {
                reads.set(reads.get() + 1);
                level.get()
            }
        }
    }

    const REF: u32 = 100;

    fn started<'a>(
        config: &'a SenseConfig,
        sensor: &Sensor,
    ) -> (
        Controller<'a, impl FnMut(u16) -> u32, MockPin, MockPin>,
        MockPin,
        MockPin,
    ) {
        let led = MockPin::default();
        let strip = MockPin::default();
        let mut c = Controller::new(config, sensor.reader(), led.clone(), strip.clone());
        c.start(0, &mut MockDelay::default());
        (c, led, strip)
    }

    #[test]
    fn test_start() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let led = MockPin::default();
        let strip = MockPin::default();
        let mut delay = MockDelay::default();
        let mut c = Controller::new(config, sensor.reader(), led.clone(), strip.clone());

        c.start(0, &mut delay);

        assert_eq!(c.threshold(), REF);
        assert!(!c.is_touched());
        assert!(!c.output_on());
        assert_eq!(sensor.reads.get(), config.calibration_trials as usize + 1);
        assert_eq!(delay.calls, [200, 200, 200]);
        assert_eq!(led.history(), [false, true, false, true, false]);
        assert_eq!(strip.history(), [false]);
    }

    #[test]
    fn test_rising_edge_toggle() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, led, strip) = started(config, &sensor);

        let script = [false, false, true, true, false, true];
        let mut toggles = Vec::new();
        let mut now = 0;
        for (i, touch) in script.iter().enumerate() {
            sensor.level.set(if *touch { REF + 50 } else { REF });
            now += config.refresh_interval_ms as u64;
            let result = c.poll(now);
            assert!(result.reading.is_some());
            assert_eq!(c.is_touched(), *touch);
            if result.toggled {
                toggles.push(i);
            }
        }

        assert_eq!(toggles, [2, 5]);
        // Two flips leave the outputs where they started
        assert!(!c.output_on());
        assert_eq!(led.level(), Some(false));
        assert_eq!(strip.history(), [false, true, false]);
    }

    #[test]
    fn test_output_follows_state() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, led, strip) = started(config, &sensor);

        sensor.level.set(REF + 1);
        assert!(c.poll(20).toggled);
        assert!(c.output_on());
        assert_eq!(led.level(), Some(true));
        assert_eq!(strip.level(), Some(true));
    }

    #[test]
    fn test_refresh_interval() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(config, &sensor);
        let reads = sensor.reads.get();

        assert_eq!(c.poll(19), Poll::default());
        assert_eq!(sensor.reads.get(), reads);
        assert_eq!(c.poll(20).reading, Some(REF));
        assert_eq!(c.poll(39).reading, None);
        assert_eq!(c.poll(40).reading, Some(REF));
        assert_eq!(sensor.reads.get(), reads + 2);
    }

    #[test]
    fn test_sensitivity_margin() {
        let config = SenseConfig {
            sensitivity_margin: 10,
            ..SenseConfig::default()
        };
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(&config, &sensor);

        sensor.level.set(REF + 10);
        assert!(!c.poll(20).toggled);
        sensor.level.set(REF + 11);
        assert!(c.poll(40).toggled);
    }

    #[test]
    fn test_no_recalibration_before_interval() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(config, &sensor);

        sensor.level.set(REF - 10);
        let mut now = 0;
        while now + (config.refresh_interval_ms as u64) < config.recalibration_interval_ms as u64 {
            now += config.refresh_interval_ms as u64;
            assert_eq!(c.poll(now).recalibrated, None);
        }
        assert_eq!(c.threshold(), REF);
    }

    #[test]
    fn test_no_recalibration_while_touched() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(config, &sensor);

        // Touched, yet within the band
        sensor.level.set(REF + 10);
        let result = c.poll(config.recalibration_interval_ms as u64);
        assert!(c.is_touched());
        assert_eq!(result.recalibrated, None);
        assert_eq!(c.threshold(), REF);
    }

    #[test]
    fn test_no_recalibration_out_of_band() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(config, &sensor);

        // Far below the threshold, e.g. a disconnected antenna
        sensor.level.set(REF * 8 / 10 - 1);
        let result = c.poll(config.recalibration_interval_ms as u64);
        assert!(!c.is_touched());
        assert_eq!(result.recalibrated, None);
        assert_eq!(c.threshold(), REF);
    }

    #[test]
    fn test_recalibration() {
        let config = &DEFAULT_SENSE_CONFIG;
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(config, &sensor);
        let interval = config.recalibration_interval_ms as u64;

        // The lower edge of the band is included
        sensor.level.set(REF * 8 / 10);
        let reads = sensor.reads.get();
        let result = c.poll(interval);
        assert_eq!(result.recalibrated, Some(REF * 8 / 10));
        assert_eq!(c.threshold(), REF * 8 / 10);
        assert_eq!(
            sensor.reads.get(),
            reads + 1 + config.calibration_trials as usize
        );

        // Exactly once per interval
        let mut recalibrations = 0;
        let mut now = interval;
        while now < 2 * interval {
            now += config.refresh_interval_ms as u64;
            if c.poll(now).recalibrated.is_some() {
                recalibrations += 1;
            }
        }
        assert_eq!(recalibrations, 1);
    }

    #[test]
    fn test_recalibration_upper_band() {
        let config = SenseConfig {
            sensitivity_margin: 50,
            ..SenseConfig::default()
        };
        let sensor = Sensor::new(REF);
        let (mut c, _led, _strip) = started(&config, &sensor);
        let interval = config.recalibration_interval_ms as u64;

        sensor.level.set(REF * 12 / 10 + 1);
        assert_eq!(c.poll(interval).recalibrated, None);

        sensor.level.set(REF * 12 / 10);
        assert_eq!(c.poll(2 * interval).recalibrated, Some(REF * 12 / 10));
    }
}
