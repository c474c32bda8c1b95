use super::model::RtCalibrationModel;
use crate::errors::CalibrationError;
use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

/// A confidently identified precursor: where the library says it elutes
/// and where it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationAnchor {
    pub library_irt: f64,
    pub observed_rt_minutes: f64,
}

pub trait CalibrationFitter: Sync {
    fn fit(&self, anchors: &[CalibrationAnchor]) -> Result<RtCalibrationModel, CalibrationError>;
}

/// Robust straight line fit: RANSAC to find the consensus set, then
/// ordinary least squares with a few rounds of sigma clipping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRtFitter {
    pub use_ransac: bool,
    pub ransac_iterations: usize,
    pub ransac_inlier_threshold_minutes: f64,
    pub ransac_min_inlier_fraction: f64,
    pub outlier_rejection_passes: usize,
    pub outlier_sigma_threshold: f64,
    pub min_anchors: usize,
    pub random_seed: u64,
}

impl Default for LinearRtFitter {
    fn default() -> Self {
        Self {
            use_ransac: true,
            ransac_iterations: 200,
            ransac_inlier_threshold_minutes: 2.0,
            ransac_min_inlier_fraction: 0.5,
            outlier_rejection_passes: 2,
            outlier_sigma_threshold: 3.0,
            min_anchors: 5,
            random_seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OlsFit {
    slope: f64,
    intercept: f64,
    sigma: f64,
}

impl OlsFit {
    fn residual(&self, anchor: &CalibrationAnchor) -> f64 {
        anchor.observed_rt_minutes - (self.slope * anchor.library_irt + self.intercept)
    }
}

impl CalibrationFitter for LinearRtFitter {
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    fn fit(&self, anchors: &[CalibrationAnchor]) -> Result<RtCalibrationModel, CalibrationError> {
        let insufficient = |found| CalibrationError::InsufficientAnchors {
            found,
            required: self.min_anchors,
        };
        if anchors
            .iter()
            .any(|a| !a.library_irt.is_finite() || !a.observed_rt_minutes.is_finite())
        {
            return Err(CalibrationError::DegenerateData {
                context: "non-finite calibration anchor".into(),
            });
        }
        if anchors.len() < self.min_anchors {
            return Err(insufficient(anchors.len()));
        }

        let mut active = vec![true; anchors.len()];
        if self.use_ransac && anchors.len() >= 2 {
            if let Some(inliers) = self.ransac_inliers(anchors) {
                active = inliers;
            }
        }
        let mut active_count = active.iter().filter(|&&x| x).count();
        if active_count < self.min_anchors {
            return Err(insufficient(active_count));
        }

        for _ in 0..self.outlier_rejection_passes {
            let fit = fit_ols(anchors, &active)?;
            let threshold = self.outlier_sigma_threshold * fit.sigma;
            if threshold < 1e-12 {
                break;
            }
            let mut changed = false;
            for (anchor, is_active) in anchors.iter().zip(active.iter_mut()) {
                if *is_active && fit.residual(anchor).abs() > threshold {
                    *is_active = false;
                    active_count -= 1;
                    changed = true;
                }
            }
            if !changed || active_count < self.min_anchors {
                break;
            }
        }
        if active_count < self.min_anchors {
            return Err(insufficient(active_count));
        }

        let fit = fit_ols(anchors, &active)?;
        let r_squared = r_squared(anchors, &active, &fit);
        debug!(
            "RT fit on {}/{} anchors: slope={:.4} intercept={:.4} sigma={:.4} R2={:.4}",
            active_count,
            anchors.len(),
            fit.slope,
            fit.intercept,
            fit.sigma,
            r_squared
        );
        RtCalibrationModel::try_new(fit.slope, fit.intercept, fit.sigma, r_squared, active_count)
    }
}

impl LinearRtFitter {
    /// Largest consensus set over random two-point lines, if it reaches the
    /// minimum inlier fraction.
    fn ransac_inliers(&self, anchors: &[CalibrationAnchor]) -> Option<Vec<bool>> {
        let n = anchors.len();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_seed);
        let min_required = ((n as f64 * self.ransac_min_inlier_fraction) as usize).max(2);
        let threshold = self.ransac_inlier_threshold_minutes;

        let mut best_count = 0;
        let mut best: Option<Vec<bool>> = None;
        let mut candidate = vec![false; n];

        for _ in 0..self.ransac_iterations {
            let i1 = rng.gen_range(0..n);
            let mut i2 = rng.gen_range(0..n);
            while i2 == i1 {
                i2 = rng.gen_range(0..n);
            }
            let (a, b) = (&anchors[i1], &anchors[i2]);
            let dx = b.library_irt - a.library_irt;
            if dx.abs() < 1e-15 {
                continue;
            }
            let slope = (b.observed_rt_minutes - a.observed_rt_minutes) / dx;
            let line = OlsFit {
                slope,
                intercept: a.observed_rt_minutes - slope * a.library_irt,
                sigma: 0.0,
            };

            let mut count = 0;
            for (anchor, flag) in anchors.iter().zip(candidate.iter_mut()) {
                *flag = line.residual(anchor).abs() <= threshold;
                count += *flag as usize;
            }
            if count > best_count {
                best_count = count;
                best = Some(candidate.clone());
            }
        }

        if best_count < min_required {
            debug!(
                "RANSAC consensus too small ({} < {}), using all anchors",
                best_count, min_required
            );
            return None;
        }
        best
    }
}

fn fit_ols(anchors: &[CalibrationAnchor], active: &[bool]) -> Result<OlsFit, CalibrationError> {
    let selected = || {
        anchors
            .iter()
            .zip(active.iter())
            .filter(|(_, a)| **a)
            .map(|(x, _)| x)
    };
    let n = selected().count();
    if n < 2 {
        return Err(CalibrationError::InsufficientAnchors {
            found: n,
            required: 2,
        });
    }
    let nf = n as f64;
    let mean_x = selected().map(|a| a.library_irt).sum::<f64>() / nf;
    let mean_y = selected().map(|a| a.observed_rt_minutes).sum::<f64>() / nf;

    let mut num = 0.0;
    let mut den = 0.0;
    for a in selected() {
        let dx = a.library_irt - mean_x;
        num += dx * (a.observed_rt_minutes - mean_y);
        den += dx * dx;
    }
    if den.abs() < 1e-15 {
        return Err(CalibrationError::DegenerateData {
            context: "all calibration anchors share the same library iRT".into(),
        });
    }
    let slope = num / den;
    let intercept = mean_y - slope * mean_x;
    let line = OlsFit {
        slope,
        intercept,
        sigma: 0.0,
    };
    let ss_res: f64 = selected().map(|a| line.residual(a).powi(2)).sum();
    let dof = if n > 2 { nf - 2.0 } else { nf };
    Ok(OlsFit {
        sigma: (ss_res / dof).sqrt(),
        ..line
    })
}

fn r_squared(anchors: &[CalibrationAnchor], active: &[bool], fit: &OlsFit) -> f64 {
    let selected: Vec<&CalibrationAnchor> = anchors
        .iter()
        .zip(active.iter())
        .filter(|(_, a)| **a)
        .map(|(x, _)| x)
        .collect();
    if selected.len() < 2 {
        return 0.0;
    }
    let mean_y =
        selected.iter().map(|a| a.observed_rt_minutes).sum::<f64>() / selected.len() as f64;
    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for a in selected {
        ss_tot += (a.observed_rt_minutes - mean_y).powi(2);
        ss_res += fit.residual(a).powi(2);
    }
    if ss_tot < 1e-15 {
        return 1.0;
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_anchors(n: usize, slope: f64, intercept: f64) -> Vec<CalibrationAnchor> {
        (0..n)
            .map(|i| {
                let irt = i as f64 * 100.0 / n as f64;
                // Small deterministic jitter.
                let jitter = if i % 2 == 0 { 0.05 } else { -0.05 };
                CalibrationAnchor {
                    library_irt: irt,
                    observed_rt_minutes: slope * irt + intercept + jitter,
                }
            })
            .collect()
    }

    #[test]
    fn test_recovers_line() {
        let anchors = line_anchors(50, 0.6, 5.0);
        let model = LinearRtFitter::default().fit(&anchors).unwrap();
        assert!((model.slope() - 0.6).abs() < 1e-3);
        assert!((model.intercept() - 5.0).abs() < 0.05);
        assert!(model.r_squared() > 0.99);
        assert_eq!(model.anchor_count(), 50);
        assert!(model.is_reliable());
    }

    #[test]
    fn test_rejects_outliers() {
        let mut anchors = line_anchors(60, 0.5, 10.0);
        for i in [3, 17, 29, 41, 55] {
            anchors[i].observed_rt_minutes += 15.0;
        }
        let model = LinearRtFitter::default().fit(&anchors).unwrap();
        assert!((model.slope() - 0.5).abs() < 1e-2);
        assert!((model.intercept() - 10.0).abs() < 0.2);
        assert_eq!(model.anchor_count(), 55);
    }

    #[test]
    fn test_deterministic() {
        let mut anchors = line_anchors(40, 0.5, 1.0);
        anchors[7].observed_rt_minutes += 8.0;
        let fitter = LinearRtFitter::default();
        assert_eq!(fitter.fit(&anchors).unwrap(), fitter.fit(&anchors).unwrap());
    }

    #[test]
    fn test_insufficient_anchors() {
        let anchors = line_anchors(4, 0.5, 1.0);
        assert_eq!(
            LinearRtFitter::default().fit(&anchors),
            Err(CalibrationError::InsufficientAnchors {
                found: 4,
                required: 5
            })
        );
    }

    #[test]
    fn test_degenerate_x() {
        let anchors: Vec<_> = (0..10)
            .map(|i| CalibrationAnchor {
                library_irt: 3.0,
                observed_rt_minutes: i as f64,
            })
            .collect();
        let fitter = LinearRtFitter {
            use_ransac: false,
            ..Default::default()
        };
        assert!(matches!(
            fitter.fit(&anchors),
            Err(CalibrationError::DegenerateData { .. })
        ));
    }
}
