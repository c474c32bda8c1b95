//! Synthetic single-window DIA run shared by the integration tests.
//!
//! Targets elute as Gaussians whose fragment ratios match the library.
//! Decoys point at flat noise traces whose ratios run against the library.
//! Observed RT follows `0.5 * iRT + 1.0` plus a small per-target offset.

#![allow(dead_code)]

use diaquery::{
    DiaScanIndex,
    DiaScanIndexBuilder,
    RawScan,
};
use diaseek::LibraryPrecursorInput;

pub const NUM_TARGETS: usize = 10;
pub const NUM_DECOYS: usize = 2;
pub const LIBRARY_RATIOS: [f32; 4] = [1.0, 0.8, 0.6, 0.4];
pub const DECOY_LEVELS: [f32; 4] = [10.0, 40.0, 80.0, 120.0];
pub const TRUE_SLOPE: f64 = 0.5;
pub const TRUE_INTERCEPT: f64 = 1.0;
pub const RT_OFFSETS: [f64; NUM_TARGETS] = [0.2, -0.2, 0.1, -0.1, 0.3, -0.3, 0.0, 0.2, -0.2, 0.1];

const SCAN_STEP_MINUTES: f32 = 0.05;
const NUM_SCANS: usize = 401;
const PEAK_SIGMA_MINUTES: f32 = 0.15;

pub fn target_irt(k: usize) -> f64 {
    2.0 + 3.0 * k as f64
}

/// RT predicted by the true line, before the per-target offset.
pub fn target_line_rt(k: usize) -> f64 {
    TRUE_SLOPE * target_irt(k) + TRUE_INTERCEPT
}

pub fn target_apex_rt(k: usize) -> f64 {
    target_line_rt(k) + RT_OFFSETS[k]
}

fn target_fragment_mz(k: usize, f: usize) -> f32 {
    300.0 + 100.0 * f as f32 + 5.0 * k as f32
}

fn decoy_fragment_mz(d: usize, f: usize) -> f32 {
    302.5 + 100.0 * f as f32 + 5.0 * d as f32
}

fn gaussian(t: f32, mu: f32, sigma: f32) -> f32 {
    (-(t - mu).powi(2) / (2.0 * sigma * sigma)).exp()
}

pub fn build_index() -> DiaScanIndex {
    let mut builder = DiaScanIndexBuilder::with_capacity(NUM_SCANS);
    for i in 0..NUM_SCANS {
        let rt = i as f32 * SCAN_STEP_MINUTES;
        let mut mz = Vec::new();
        let mut intensity = Vec::new();
        for k in 0..NUM_TARGETS {
            let g = gaussian(rt, target_apex_rt(k) as f32, PEAK_SIGMA_MINUTES);
            if g < 1e-3 {
                continue;
            }
            for (f, ratio) in LIBRARY_RATIOS.iter().enumerate() {
                mz.push(target_fragment_mz(k, f));
                intensity.push(10_000.0 * ratio * g);
            }
        }
        let wiggle = 1.0 + 0.05 * (i % 3) as f32;
        for d in 0..NUM_DECOYS {
            for (f, level) in DECOY_LEVELS.iter().enumerate() {
                mz.push(decoy_fragment_mz(d, f));
                intensity.push(level * wiggle);
            }
        }
        builder
            .add_scan(RawScan {
                retention_time_minutes: rt,
                isolation_lower_mz: 400.0,
                isolation_upper_mz: 800.0,
                mz,
                intensity,
            })
            .unwrap();
    }
    builder.build()
}

pub fn targets() -> Vec<LibraryPrecursorInput> {
    (0..NUM_TARGETS)
        .map(|k| {
            LibraryPrecursorInput::try_new(
                format!("TARGETPEPK{}", k),
                600.0,
                2,
                Some(target_line_rt(k)),
                false,
                (0..LIBRARY_RATIOS.len())
                    .map(|f| target_fragment_mz(k, f))
                    .collect(),
                LIBRARY_RATIOS.to_vec(),
            )
            .unwrap()
            .with_irt(Some(target_irt(k)))
        })
        .collect()
}

pub fn decoys() -> Vec<LibraryPrecursorInput> {
    (0..NUM_DECOYS)
        .map(|d| {
            LibraryPrecursorInput::try_new(
                format!("DECOYPEPK{}", d),
                600.0,
                2,
                Some(10.0),
                true,
                (0..LIBRARY_RATIOS.len())
                    .map(|f| decoy_fragment_mz(d, f))
                    .collect(),
                LIBRARY_RATIOS.to_vec(),
            )
            .unwrap()
            .with_irt(Some(18.0))
        })
        .collect()
}

/// Targets, decoys, one precursor outside every window and one without fragments.
pub fn library() -> Vec<LibraryPrecursorInput> {
    let mut out = targets();
    out.extend(decoys());
    out.push(
        LibraryPrecursorInput::try_new(
            "OUTSIDEK",
            1200.0,
            2,
            Some(5.0),
            false,
            vec![300.0],
            vec![1.0],
        )
        .unwrap(),
    );
    out.push(
        LibraryPrecursorInput::try_new("EMPTYK", 600.0, 2, Some(5.0), false, vec![], vec![])
            .unwrap(),
    );
    out
}
