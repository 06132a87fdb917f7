use crate::sampler::Reader;

/// Find the untouched baseline of the sensor
///
/// Takes `trials` averaged readings of `sample_count` samples each and returns the largest.
/// Noise pulls baseline readings down far more often than up, so the maximum is a conservative
/// ceiling for an untouched antenna. Must only be run while nothing is touching the antenna.
pub fn calibrate<R: Reader>(reader: &mut R, trials: u16, sample_count: u16) -> u32 {
    let mut maximum: u32 = 0;
    for _ in 0..trials {
        maximum = maximum.max(reader.read(sample_count));
    }
    maximum
}
