//! Two-band quadrature mirror filter bank.
//!
//! Splits a full-band 16-bit signal into a low and a high half-rate band
//! with a polyphase structure of two cascades of three first-order all-pass
//! sections, and recombines the bands with the mirrored structure.
//!
//! The bank is power complementary: analysis followed by synthesis on
//! unmodified bands preserves the magnitude of every frequency component
//! (a constant input is reproduced exactly once the filters have settled)
//! and applies only the all-pass phase response.
//!
//! All state is owned by the caller so that one bank can serve any number
//! of channels. Analysis and synthesis must use independent state pairs.

use crate::audio_util::{saturate_i32_to_i16, sub_sat_i32};

/// Number of `i32` words of history per all-pass cascade.
pub const FILTER_STATE_SIZE: usize = 6;

/// Largest supported band length (half of a 480-sample full-band frame).
pub const MAX_BAND_FRAME_LENGTH: usize = 240;

/// Persistent history for one all-pass cascade.
pub type FilterState = [i32; FILTER_STATE_SIZE];

/// All-pass coefficients of the first polyphase branch, Q16.
const ALL_PASS_FILTER_1: [u16; 3] = [6418, 36982, 57261];
/// All-pass coefficients of the second polyphase branch, Q16.
const ALL_PASS_FILTER_2: [u16; 3] = [21333, 49062, 64019];

/// Splits `full_band` into `low_band` and `high_band`.
///
/// `full_band` must hold exactly twice as many samples as each band, and the
/// band length must not exceed [`MAX_BAND_FRAME_LENGTH`].
pub fn analysis(
    full_band: &[i16],
    low_band: &mut [i16],
    high_band: &mut [i16],
    state1: &mut FilterState,
    state2: &mut FilterState,
) {
    let band_length = full_band.len() / 2;
    assert_eq!(full_band.len(), band_length * 2, "odd full-band length");
    assert_eq!(low_band.len(), band_length);
    assert_eq!(high_band.len(), band_length);
    assert!(band_length <= MAX_BAND_FRAME_LENGTH);

    let mut half_in1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut half_in2 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter2 = [0i32; MAX_BAND_FRAME_LENGTH];

    // Even and odd samples in Q10.
    for (i, pair) in full_band.chunks_exact(2).enumerate() {
        half_in2[i] = i32::from(pair[0]) << 10;
        half_in1[i] = i32::from(pair[1]) << 10;
    }

    all_pass_qmf(
        &mut half_in1[..band_length],
        &mut filter1[..band_length],
        &ALL_PASS_FILTER_1,
        state1,
    );
    all_pass_qmf(
        &mut half_in2[..band_length],
        &mut filter2[..band_length],
        &ALL_PASS_FILTER_2,
        state2,
    );

    // Sum and difference of the branches, back to Q0 with rounding.
    for i in 0..band_length {
        let f1 = i64::from(filter1[i]);
        let f2 = i64::from(filter2[i]);
        low_band[i] = saturate_i64_to_i16((f1 + f2 + 1024) >> 11);
        high_band[i] = saturate_i64_to_i16((f1 - f2 + 1024) >> 11);
    }
}

/// Recombines `low_band` and `high_band` into `full_band`.
///
/// Inverse of [`analysis`]; `state1`/`state2` must not be shared with the
/// analysis side.
pub fn synthesis(
    low_band: &[i16],
    high_band: &[i16],
    full_band: &mut [i16],
    state1: &mut FilterState,
    state2: &mut FilterState,
) {
    let band_length = low_band.len();
    assert_eq!(high_band.len(), band_length);
    assert_eq!(full_band.len(), band_length * 2);
    assert!(band_length <= MAX_BAND_FRAME_LENGTH);

    let mut half_in1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut half_in2 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter1 = [0i32; MAX_BAND_FRAME_LENGTH];
    let mut filter2 = [0i32; MAX_BAND_FRAME_LENGTH];

    // Sum and difference channels in Q10.
    for i in 0..band_length {
        let low = i32::from(low_band[i]);
        let high = i32::from(high_band[i]);
        half_in1[i] = (low + high) << 10;
        half_in2[i] = (low - high) << 10;
    }

    all_pass_qmf(
        &mut half_in1[..band_length],
        &mut filter1[..band_length],
        &ALL_PASS_FILTER_2,
        state1,
    );
    all_pass_qmf(
        &mut half_in2[..band_length],
        &mut filter2[..band_length],
        &ALL_PASS_FILTER_1,
        state2,
    );

    // The filtered branches are the even and odd output samples.
    for (i, pair) in full_band.chunks_exact_mut(2).enumerate() {
        pair[0] = saturate_i32_to_i16(filter2[i].saturating_add(512) >> 10);
        pair[1] = saturate_i32_to_i16(filter1[i].saturating_add(512) >> 10);
    }
}

/// Three cascaded first-order all-pass sections:
///
/// ```text
///         a_3 + q^-1    a_2 + q^-1    a_1 + q^-1
/// y[n] =  -----------   -----------   ----------- x[n]
///         1 + a_3q^-1   1 + a_2q^-1   1 + a_1q^-1
/// ```
///
/// The state holds `x[-1], y[-1]` for each section. `in_data` is used as
/// scratch for the middle section and is overwritten.
fn all_pass_qmf(
    in_data: &mut [i32],
    out_data: &mut [i32],
    coefficients: &[u16; 3],
    state: &mut FilterState,
) {
    let n = in_data.len();
    debug_assert_eq!(out_data.len(), n);
    if n == 0 {
        return;
    }

    // in -> out
    all_pass_section(in_data, out_data, coefficients[0], &mut state[0..2]);
    // out -> in
    all_pass_section(out_data, in_data, coefficients[1], &mut state[2..4]);
    // in -> out
    all_pass_section(in_data, out_data, coefficients[2], &mut state[4..6]);
}

/// `y[n] = x[n-1] + a * (x[n] - y[n-1])`, with `state = [x[-1], y[-1]]`.
#[inline]
fn all_pass_section(input: &[i32], output: &mut [i32], coefficient: u16, state: &mut [i32]) {
    let n = input.len();
    let diff = sub_sat_i32(input[0], state[1]);
    output[0] = scale_diff(coefficient, diff, state[0]);
    for k in 1..n {
        let diff = sub_sat_i32(input[k], output[k - 1]);
        output[k] = scale_diff(coefficient, diff, input[k - 1]);
    }
    state[0] = input[n - 1];
    state[1] = output[n - 1];
}

/// `c + (a * b) >> 16` with an unsigned Q16 coefficient.
#[inline]
fn scale_diff(a: u16, b: i32, c: i32) -> i32 {
    c.wrapping_add(((i64::from(a) * i64::from(b)) >> 16) as i32)
}

#[inline]
fn saturate_i64_to_i16(value: i64) -> i16 {
    value.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prop_assert_eq;
    use std::f64::consts::TAU;
    use test_strategy::proptest;

    const FULL_BAND: usize = 320;
    const BAND: usize = FULL_BAND / 2;

    #[derive(Default)]
    struct Bank {
        analysis: (FilterState, FilterState),
        synthesis: (FilterState, FilterState),
    }

    impl Bank {
        fn split(&mut self, input: &[i16]) -> (Vec<i16>, Vec<i16>) {
            let mut low = vec![0i16; input.len() / 2];
            let mut high = vec![0i16; input.len() / 2];
            analysis(
                input,
                &mut low,
                &mut high,
                &mut self.analysis.0,
                &mut self.analysis.1,
            );
            (low, high)
        }

        fn merge(&mut self, low: &[i16], high: &[i16]) -> Vec<i16> {
            let mut out = vec![0i16; low.len() * 2];
            synthesis(
                low,
                high,
                &mut out,
                &mut self.synthesis.0,
                &mut self.synthesis.1,
            );
            out
        }
    }

    fn tone(frequency_hz: f64, amplitude: f64, frame: usize) -> Vec<i16> {
        (0..FULL_BAND)
            .map(|i| {
                let n = (frame * FULL_BAND + i) as f64;
                (amplitude * (TAU * frequency_hz * n / 32000.0).sin()).round() as i16
            })
            .collect()
    }

    fn rms(x: &[i16]) -> f64 {
        let sum: f64 = x.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        (sum / x.len() as f64).sqrt()
    }

    #[test]
    fn silence_stays_silent() {
        let mut bank = Bank::default();
        for _ in 0..5 {
            let (low, high) = bank.split(&[0; FULL_BAND]);
            assert!(low.iter().chain(high.iter()).all(|&s| s == 0));
            let out = bank.merge(&low, &high);
            assert!(out.iter().all(|&s| s == 0));
        }
    }

    #[test]
    fn constant_input_reconstructs_after_settling() {
        let mut bank = Bank::default();
        let input = [1000i16; FULL_BAND];
        let mut out = Vec::new();
        for _ in 0..20 {
            let (low, high) = bank.split(&input);
            out = bank.merge(&low, &high);
        }
        for (i, &s) in out.iter().enumerate() {
            assert!((s - 1000).abs() <= 1, "sample {i}: {s}");
        }
    }

    #[test]
    fn constant_input_lands_in_low_band() {
        let mut bank = Bank::default();
        let mut bands = (Vec::new(), Vec::new());
        for _ in 0..20 {
            bands = bank.split(&[-2000i16; FULL_BAND]);
        }
        assert!(bands.0.iter().all(|&s| (s + 2000).abs() <= 1));
        assert!(bands.1.iter().all(|&s| s.abs() <= 1));
    }

    #[test]
    fn low_tone_stays_in_low_band() {
        let mut bank = Bank::default();
        let mut bands = (Vec::new(), Vec::new());
        for frame in 0..10 {
            bands = bank.split(&tone(1000.0, 8000.0, frame));
        }
        let (low, high) = bands;
        assert!(rms(&high) < 0.1 * rms(&low), "low {} high {}", rms(&low), rms(&high));
    }

    #[test]
    fn high_tone_stays_in_high_band() {
        let mut bank = Bank::default();
        let mut bands = (Vec::new(), Vec::new());
        for frame in 0..10 {
            bands = bank.split(&tone(15000.0, 8000.0, frame));
        }
        let (low, high) = bands;
        assert!(rms(&low) < 0.1 * rms(&high), "low {} high {}", rms(&low), rms(&high));
    }

    #[test]
    fn reconstruction_preserves_tone_level() {
        let mut bank = Bank::default();
        for frame in 0..20 {
            let input = tone(1000.0, 8000.0, frame);
            let (low, high) = bank.split(&input);
            let out = bank.merge(&low, &high);
            if frame >= 10 {
                let ratio = rms(&out) / rms(&input);
                assert!((ratio - 1.0).abs() < 0.01, "frame {frame}: ratio {ratio}");
            }
        }
    }

    #[test]
    fn band_lengths_are_half_of_full_band() {
        let mut bank = Bank::default();
        let (low, high) = bank.split(&[7; FULL_BAND]);
        assert_eq!(low.len(), BAND);
        assert_eq!(high.len(), BAND);
    }

    #[proptest]
    fn threaded_state_matches_single_call(#[strategy(vec(-20000i16..20000, 320))] input: Vec<i16>) {
        let mut whole = Bank::default();
        let (low, high) = whole.split(&input);

        let mut halves = Bank::default();
        let (low_a, high_a) = halves.split(&input[..160]);
        let (low_b, high_b) = halves.split(&input[160..]);

        prop_assert_eq!(&low[..80], &low_a[..]);
        prop_assert_eq!(&low[80..], &low_b[..]);
        prop_assert_eq!(&high[..80], &high_a[..]);
        prop_assert_eq!(&high[80..], &high_b[..]);

        let merged = whole.merge(&low, &high);
        let mut merged_halves = halves.merge(&low_a, &high_a);
        merged_halves.extend(halves.merge(&low_b, &high_b));
        prop_assert_eq!(merged, merged_halves);
    }
}
