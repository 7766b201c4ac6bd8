//! Sample arithmetic and level helpers for 16-bit PCM.

/// Minimum value of a float-encoded S16 sample (`-32768.0`).
pub const MIN_FLOAT_S16_VALUE: f32 = -32768.0;
/// Maximum value of a float-encoded S16 sample (`32767.0`).
pub const MAX_FLOAT_S16_VALUE: f32 = 32767.0;

/// Level reported for digital silence, in dBFS.
pub const MIN_LEVEL_DBFS: f32 = -127.0;

/// Saturates a 32-bit value to the `i16` range.
#[inline]
pub fn saturate_i32_to_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Saturating 32-bit subtraction, `a - b`.
#[inline]
pub fn sub_sat_i32(a: i32, b: i32) -> i32 {
    a.saturating_sub(b)
}

/// Converts an S16 sample to float S16 scale (no normalization).
#[inline]
pub fn s16_to_float_s16(v: i16) -> f32 {
    f32::from(v)
}

/// Rounds and saturates a float S16 value to `i16`.
#[inline]
pub fn float_s16_to_s16(v: f32) -> i16 {
    let v = v.clamp(MIN_FLOAT_S16_VALUE, MAX_FLOAT_S16_VALUE);
    v.round() as i16
}

/// Mean of the squared samples, in float S16 scale.
pub fn mean_square(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let s = f64::from(s);
            s * s
        })
        .sum();
    (sum / samples.len() as f64) as f32
}

/// Converts a mean-square value (float S16 scale) to dBFS.
///
/// Full-scale square wave is 0 dBFS. Silence maps to [`MIN_LEVEL_DBFS`].
pub fn mean_square_to_dbfs(mean_square: f32) -> f32 {
    const FULL_SCALE_POWER: f32 = 32768.0 * 32768.0;
    if mean_square <= 0.0 {
        return MIN_LEVEL_DBFS;
    }
    (10.0 * (mean_square / FULL_SCALE_POWER).log10()).max(MIN_LEVEL_DBFS)
}

/// Converts a dB value to a linear amplitude ratio: `10^(v/20)`.
pub fn db_to_ratio(v: f32) -> f32 {
    10.0_f32.powf(v / 20.0)
}
