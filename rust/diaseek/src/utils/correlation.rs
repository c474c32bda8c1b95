/// L2-normalised dot product over the common prefix of `a` and `b`,
/// clamped to `[0, 1]`. NaN when either vector has zero norm.
///
/// # Example
///
/// ```
/// use diaseek::utils::correlation::normalized_dot_product;
///
/// let library = [1.0, 0.5];
/// assert!((normalized_dot_product(&library, &[2.0, 1.0]) - 1.0).abs() < 1e-6);
/// assert!(normalized_dot_product(&library, &[0.0, 0.0]).is_nan());
/// ```
pub fn normalized_dot_product(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return f32::NAN;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Cosine between library and observed intensities using only the
/// fragments that were actually observed (`observed > 0`).
///
/// Library entries missing for an observed fragment count as zero.
/// Clamped to `[0, 1]`, NaN when nothing overlaps.
pub fn cosine_active_fragments(library: &[f32], observed: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_lib = 0.0f32;
    let mut norm_obs = 0.0f32;
    for (f, &obs) in observed.iter().enumerate() {
        if obs <= 0.0 {
            continue;
        }
        let lib = library.get(f).copied().unwrap_or(0.0);
        dot += lib * obs;
        norm_lib += lib * lib;
        norm_obs += obs * obs;
    }
    if norm_lib <= 0.0 || norm_obs <= 0.0 {
        return f32::NAN;
    }
    (dot / (norm_lib.sqrt() * norm_obs.sqrt())).clamp(0.0, 1.0)
}

/// Pearson correlation over the pairs where both values are positive.
///
/// Needs at least `min_points` such pairs, otherwise (or with zero
/// variance) returns NaN. Clamped to `[-1, 1]`.
pub fn pearson_on_positive_pairs(
    pairs: impl Iterator<Item = (f32, f32)>,
    min_points: usize,
) -> f32 {
    let mut sum_a = 0.0f64;
    let mut sum_b = 0.0f64;
    let mut sum_ab = 0.0f64;
    let mut sum_a2 = 0.0f64;
    let mut sum_b2 = 0.0f64;
    let mut n = 0usize;

    for (a, b) in pairs {
        if a <= 0.0 || b <= 0.0 {
            continue;
        }
        let (a, b) = (a as f64, b as f64);
        sum_a += a;
        sum_b += b;
        sum_ab += a * b;
        sum_a2 += a * a;
        sum_b2 += b * b;
        n += 1;
    }

    if n < min_points.max(2) {
        return f32::NAN;
    }
    let nf = n as f64;
    let denom = (nf * sum_a2 - sum_a * sum_a) * (nf * sum_b2 - sum_b * sum_b);
    if denom <= 0.0 {
        return f32::NAN;
    }
    let r = (nf * sum_ab - sum_a * sum_b) / denom.sqrt();
    r.clamp(-1.0, 1.0) as f32
}
