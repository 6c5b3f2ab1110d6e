//! Statistical helpers shared by synthesis, stacking and star detection.


/// MAD (Median Absolute Deviation) to standard deviation conversion factor.
///
/// For a normal distribution, σ ≈ 1.4826 × MAD (1 / Φ⁻¹(3/4)).
pub const MAD_TO_SIGMA: f32 = 1.4826022;

/// Convert MAD to standard deviation (assuming normal distribution).
#[inline]
pub fn mad_to_sigma(mad: f32) -> f32 {
    mad * MAD_TO_SIGMA
}

/// Median of `data`, reordering it in place.
///
/// Even-length input averages the two central order statistics.
#[inline]
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left_part, upper, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if len & 1 == 1 {
        return upper;
    }

    let lower = left_part
        .iter()
        .copied()
        .reduce(f32::max)
        .unwrap_or(upper);
    (lower + upper) * 0.5
}

/// Arithmetic mean with f64 accumulation. Empty input yields 0.
#[inline]
pub fn mean_f32(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    (sum / values.len() as f64) as f32
}

/// Population standard deviation around `mean`.
#[inline]
pub fn std_dev_f32(values: &[f32], mean: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean as f64;
    let sum_sq: f64 = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum();
    (sum_sq / values.len() as f64).sqrt() as f32
}

/// MAD around `median`, using `scratch` for the deviations.
#[inline]
pub fn mad_f32_with_scratch(values: &[f32], median: f32, scratch: &mut Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    scratch.clear();
    scratch.extend(values.iter().map(|&v| (v - median).abs()));
    median_f32_mut(scratch)
}

/// Median and MAD together. Reorders and then overwrites `data`.
pub fn median_and_mad_f32_mut(data: &mut [f32]) -> (f32, f32) {
    debug_assert!(!data.is_empty());

    let median = median_f32_mut(data);
    for v in data.iter_mut() {
        *v = (*v - median).abs();
    }
    let mad = median_f32_mut(data);

    (median, mad)
}
