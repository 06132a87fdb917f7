#![cfg_attr(not(test), no_std)]

pub mod calibrate;
pub mod clock;
pub mod controller;
#[cfg(any(feature = "stm32f0x1", feature = "stm32f303"))]
pub mod gpio;
pub mod sampler;

/// Configuration for the single-channel touch sensor
#[derive(Clone, Copy, Debug)]
pub struct SenseConfig {
    /// Minimum milliseconds between touch re-evaluations
    pub refresh_interval_ms: u32,
    /// Milliseconds between threshold refresh attempts
    pub recalibration_interval_ms: u32,
    /// Number of raw samples averaged into one reading. Larger windows reject more noise, but
    /// each reading takes longer.
    pub sample_count: u16,
    /// Number of averaged readings taken during calibration. The threshold is the largest of them.
    pub calibration_trials: u16,
    /// Counts above the threshold a reading must exceed to be considered a touch. Raising it
    /// trades false positives for false negatives.
    pub sensitivity_margin: u32,
    /// Recalibration only proceeds when the last reading is at least this percentage of the
    /// threshold
    pub recalibration_band_low_pct: u32,
    /// Recalibration only proceeds when the last reading is at most this percentage of the
    /// threshold
    pub recalibration_band_high_pct: u32,
    /// Delay between LED toggles of the ready signal
    pub ready_blink_ms: u16,
}

impl SenseConfig {
    pub const fn default() -> Self {
        Self {
            refresh_interval_ms: 20,
            recalibration_interval_ms: 5 * 60 * 1000,
            sample_count: 20,
            calibration_trials: 100,
            sensitivity_margin: 0,
            recalibration_band_low_pct: 80,
            recalibration_band_high_pct: 120,
            ready_blink_ms: 200,
        }
    }
}

pub const DEFAULT_SENSE_CONFIG: SenseConfig = SenseConfig::default();
