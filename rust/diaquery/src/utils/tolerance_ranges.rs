/// Absolute half-width in m/z units of a ppm tolerance at `mz`.
pub fn ppm_half_width(mz: f64, tol_ppm: f64) -> f64 {
    mz * (tol_ppm / 1e6)
}

/// `[mz - tol, mz + tol]` for a symmetric ppm tolerance.
///
/// Returned as a plain tuple since a negative tolerance would otherwise
/// need an error path on every extraction.
pub fn ppm_tol_range(mz: f64, tol_ppm: f64) -> (f64, f64) {
    let utol = ppm_half_width(mz, tol_ppm).abs();
    (mz - utol, mz + utol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_range() {
        let (lo, hi) = ppm_tol_range(500.0, 20.0);
        assert!((lo - 499.99).abs() < 1e-9);
        assert!((hi - 500.01).abs() < 1e-9);
    }
}
