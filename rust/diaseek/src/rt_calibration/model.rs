use crate::errors::CalibrationError;
use serde::Serialize;

pub const RELIABLE_MIN_R_SQUARED: f64 = 0.90;
pub const RELIABLE_MIN_ANCHORS: usize = 10;

/// Linear map from library iRT to observed retention time (minutes),
/// `minutes = slope * irt + intercept`, with the residual spread of the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RtCalibrationModel {
    slope: f64,
    intercept: f64,
    sigma_minutes: f64,
    r_squared: f64,
    anchor_count: usize,
}

impl RtCalibrationModel {
    pub fn try_new(
        slope: f64,
        intercept: f64,
        sigma_minutes: f64,
        r_squared: f64,
        anchor_count: usize,
    ) -> Result<Self, CalibrationError> {
        if !slope.is_finite() || slope == 0.0 {
            return Err(CalibrationError::ZeroSlope);
        }
        if !intercept.is_finite() || !sigma_minutes.is_finite() || sigma_minutes < 0.0 {
            return Err(CalibrationError::DegenerateData {
                context: format!(
                    "intercept={} sigma_minutes={} must be finite (sigma >= 0)",
                    intercept, sigma_minutes
                ),
            });
        }
        Ok(Self {
            slope,
            intercept,
            sigma_minutes,
            r_squared,
            anchor_count,
        })
    }

    /// Uncalibrated starting point for the first search pass.
    ///
    /// Maps the library iRT range linearly onto the run RT range, with a
    /// spread such that `irt_window_half_width(3.0) == initial_irt_window`.
    /// Degenerate ranges fall back to a unit slope centred on both ranges.
    pub fn provisional(
        run_rt_range: (f64, f64),
        library_irt_range: (f64, f64),
        initial_irt_window: f64,
    ) -> Self {
        let run_span = run_rt_range.1 - run_rt_range.0;
        let irt_span = library_irt_range.1 - library_irt_range.0;
        let (slope, intercept) = if run_span > 0.0 && irt_span > 0.0 && run_span.is_finite() {
            let slope = run_span / irt_span;
            (slope, run_rt_range.0 - slope * library_irt_range.0)
        } else {
            let run_mid = 0.5 * (run_rt_range.0 + run_rt_range.1);
            let irt_mid = 0.5 * (library_irt_range.0 + library_irt_range.1);
            let intercept = run_mid - irt_mid;
            (1.0, if intercept.is_finite() { intercept } else { 0.0 })
        };
        let sigma_irt = if initial_irt_window.is_finite() {
            initial_irt_window.abs() / 3.0
        } else {
            0.0
        };
        Self {
            slope,
            intercept,
            sigma_minutes: sigma_irt * slope.abs(),
            r_squared: 0.0,
            anchor_count: 0,
        }
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn sigma_minutes(&self) -> f64 {
        self.sigma_minutes
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    /// Predicted retention time in minutes.
    pub fn predict(&self, irt: f64) -> f64 {
        self.to_minutes(irt)
    }

    pub fn to_minutes(&self, irt: f64) -> f64 {
        self.slope * irt + self.intercept
    }

    pub fn to_irt(&self, minutes: f64) -> f64 {
        (minutes - self.intercept) / self.slope
    }

    pub fn sigma_irt(&self) -> f64 {
        self.sigma_minutes / self.slope.abs()
    }

    /// Half-width of a `k` sigma window, in minutes.
    pub fn window_half_width(&self, k: f64) -> f64 {
        k * self.sigma_minutes
    }

    /// Half-width of a `k` sigma window, in iRT units.
    pub fn irt_window_half_width(&self, k: f64) -> f64 {
        k * self.sigma_irt()
    }

    pub fn is_reliable(&self) -> bool {
        self.r_squared >= RELIABLE_MIN_R_SQUARED && self.anchor_count >= RELIABLE_MIN_ANCHORS
    }

    /// Gaussian log-likelihood of an iRT residual, up to a constant.
    ///
    /// Zero at no deviation, -0.5 at one sigma. Zero when the model has no
    /// spread.
    pub fn rt_score(&self, residual_irt: f64) -> f64 {
        let sigma = self.sigma_irt();
        if sigma <= 0.0 || !sigma.is_finite() {
            return 0.0;
        }
        -(residual_irt * residual_irt) / (2.0 * sigma * sigma)
    }

    pub fn rt_score_between(&self, library_irt: f64, observed_irt: f64) -> f64 {
        self.rt_score(observed_irt - library_irt)
    }
}

impl std::fmt::Display for RtCalibrationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RT = {:.4} * iRT + {:.4} (R²={:.4}, σ={:.3} min, σ_iRT={:.3}, anchors={})",
            self.slope,
            self.intercept,
            self.r_squared,
            self.sigma_minutes,
            self.sigma_irt(),
            self.anchor_count,
        )?;
        if !self.is_reliable() {
            write!(f, " [UNRELIABLE]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(slope: f64, intercept: f64, sigma: f64, r2: f64, n: usize) -> RtCalibrationModel {
        RtCalibrationModel::try_new(slope, intercept, sigma, r2, n).unwrap()
    }

    #[test]
    fn test_zero_slope_rejected() {
        assert_eq!(
            RtCalibrationModel::try_new(0.0, 1.0, 0.1, 0.99, 10),
            Err(CalibrationError::ZeroSlope)
        );
        assert!(RtCalibrationModel::try_new(f64::NAN, 1.0, 0.1, 0.99, 10).is_err());
    }

    #[test]
    fn test_sigma_irt() {
        assert!((model(0.5, 0.0, 1.0, 0.95, 20).sigma_irt() - 2.0).abs() < 1e-10);
        assert!((model(-0.25, 100.0, 0.5, 0.95, 20).sigma_irt() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_reliability() {
        assert!(model(0.5, 2.0, 0.3, 0.95, 50).is_reliable());
        assert!(!model(0.5, 2.0, 0.3, 0.80, 50).is_reliable());
        assert!(!model(0.5, 2.0, 0.3, 0.99, 5).is_reliable());
    }

    #[test]
    fn test_conversions() {
        let m = model(0.5, 2.0, 0.1, 0.99, 100);
        assert!((m.to_minutes(40.0) - 22.0).abs() < 1e-10);
        assert!((m.to_irt(22.0) - 40.0).abs() < 1e-10);
        assert!(m.to_irt(2.0).abs() < 1e-10);
        assert!((m.to_irt(52.0) - 100.0).abs() < 1e-10);
        assert_eq!(m.predict(10.0), m.to_minutes(10.0));
    }

    #[test]
    fn test_window_widths() {
        let m = model(0.5, 0.0, 1.0, 0.95, 20);
        assert!((m.irt_window_half_width(3.0) - 6.0).abs() < 1e-10);
        assert!((m.irt_window_half_width(2.0) - 4.0).abs() < 1e-10);
        assert!((m.window_half_width(3.0) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_rt_score() {
        let m = model(0.5, 0.0, 1.0, 0.95, 20);
        assert!(m.rt_score(0.0).abs() < 1e-10);
        assert!((m.rt_score(m.sigma_irt()) + 0.5).abs() < 1e-10);
        assert!(m.rt_score(2.0 * m.sigma_irt()) < m.rt_score(m.sigma_irt()));
        assert!((m.rt_score_between(50.0, 53.0) - m.rt_score(3.0)).abs() < 1e-10);
    }

    #[test]
    fn test_provisional() {
        let m = RtCalibrationModel::provisional((5.0, 65.0), (0.0, 100.0), 21.0);
        assert!((m.slope() - 0.6).abs() < 1e-10);
        assert!((m.intercept() - 5.0).abs() < 1e-10);
        assert!((m.to_minutes(100.0) - 65.0).abs() < 1e-10);
        assert!((m.irt_window_half_width(3.0) - 21.0).abs() < 1e-6);
        assert!(!m.is_reliable());
        assert_eq!(m.anchor_count(), 0);

        // Zero-width run range.
        let m = RtCalibrationModel::provisional((30.0, 30.0), (0.0, 100.0), 20.0);
        assert!(m.slope().is_finite() && m.slope() != 0.0);
        assert!(!m.is_reliable());
    }

    #[test]
    fn test_display() {
        let s = model(0.5, 2.0, 0.3, 0.98, 50).to_string();
        assert!(s.contains("0.5"));
        assert!(s.contains("R²"));
        assert!(s.contains("anchors=50"));
        assert!(!s.contains("UNRELIABLE"));
        assert!(model(0.5, 2.0, 0.3, 0.5, 3).to_string().contains("UNRELIABLE"));
    }
}
