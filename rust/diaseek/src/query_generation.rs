//! Library precursors to flat batches of fragment XIC queries.
//!
//! Generation is two-pass: a counting pass sizes the query buffer exactly,
//! a filling pass writes the queries and one [`PrecursorQueryGroup`] per
//! emitted precursor. Query ids equal their position in the buffer.

use crate::models::{
    DiaSearchParameters,
    GenerationResult,
    LibraryPrecursorInput,
    PrecursorQueryGroup,
};
use crate::rt_calibration::RtCalibrationModel;
use diaquery::{
    FragmentQuery,
    ScanWindowIndex,
};
use tracing::debug;

/// Where the RT window of each precursor comes from.
#[derive(Debug, Clone, Copy)]
pub enum RtWindowSource<'a> {
    /// Library RT ± `rt_tolerance_minutes`.
    Fixed,
    /// Model prediction from iRT (or library RT) ± `k` sigma.
    Calibrated(&'a RtCalibrationModel),
}

impl RtWindowSource<'_> {
    fn window(
        &self,
        precursor: &LibraryPrecursorInput,
        params: &DiaSearchParameters,
        global: (f32, f32),
    ) -> (f32, f32) {
        match self {
            Self::Fixed => match precursor.retention_time() {
                Some(rt) => {
                    let rt = rt as f32;
                    (rt - params.rt_tolerance_minutes, rt + params.rt_tolerance_minutes)
                }
                None => global,
            },
            Self::Calibrated(model) => match precursor.calibration_coordinate() {
                Some(coord) => {
                    let predicted = model.predict(coord) as f32;
                    let half =
                        model.window_half_width(params.calibrated_window_sigma_multiplier) as f32;
                    (predicted - half, predicted + half)
                }
                None => global,
            },
        }
    }
}

/// Fixed-tolerance windows around the library RT.
pub fn generate(
    precursors: &[LibraryPrecursorInput],
    scan_index: &impl ScanWindowIndex,
    params: &DiaSearchParameters,
) -> GenerationResult {
    generate_with(precursors, scan_index, params, RtWindowSource::Fixed)
}

/// Windows predicted by a calibration model.
pub fn generate_calibrated(
    precursors: &[LibraryPrecursorInput],
    scan_index: &impl ScanWindowIndex,
    params: &DiaSearchParameters,
    model: &RtCalibrationModel,
) -> GenerationResult {
    generate_with(
        precursors,
        scan_index,
        params,
        RtWindowSource::Calibrated(model),
    )
}

#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn generate_with(
    precursors: &[LibraryPrecursorInput],
    scan_index: &impl ScanWindowIndex,
    params: &DiaSearchParameters,
    source: RtWindowSource<'_>,
) -> GenerationResult {
    let global = (scan_index.global_rt_min(), scan_index.global_rt_max());

    let mut window_ids: Vec<Option<u32>> = Vec::with_capacity(precursors.len());
    let mut total_queries = 0;
    let mut skipped_no_window = 0;
    let mut skipped_no_fragments = 0;
    for p in precursors {
        let window_id = scan_index.find_window_for_precursor_mz(p.precursor_mz());
        match window_id {
            None => skipped_no_window += 1,
            Some(_) if p.fragment_count() == 0 => skipped_no_fragments += 1,
            Some(_) => total_queries += p.fragment_count(),
        }
        window_ids.push(window_id);
    }

    let mut queries = Vec::with_capacity(total_queries);
    let mut groups =
        Vec::with_capacity(precursors.len() - skipped_no_window - skipped_no_fragments);

    for (input_index, (p, window_id)) in precursors.iter().zip(window_ids).enumerate() {
        let Some(window_id) = window_id else {
            continue;
        };
        if p.fragment_count() == 0 {
            continue;
        }
        let (rt_min, rt_max) = source.window(p, params, global);
        let query_offset = queries.len();
        queries.extend(p.fragment_mzs().iter().map(|&target_mz| FragmentQuery {
            target_mz,
            tolerance_ppm: params.ppm_tolerance,
            rt_min,
            rt_max,
            window_id,
            query_id: 0,
        }));
        for (i, q) in queries[query_offset..].iter_mut().enumerate() {
            q.query_id = query_offset + i;
        }
        groups.push(PrecursorQueryGroup {
            input_index,
            query_offset,
            query_count: p.fragment_count(),
            window_id,
            rt_min,
            rt_max,
        });
    }
    debug_assert_eq!(queries.len(), total_queries);

    debug!(
        "Generated {} queries for {} precursors ({} without window, {} without fragments)",
        queries.len(),
        groups.len(),
        skipped_no_window,
        skipped_no_fragments
    );

    GenerationResult {
        queries,
        groups,
        skipped_no_window,
        skipped_no_fragments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Windows {
        bounds: Vec<(f64, f64)>,
    }

    impl ScanWindowIndex for Windows {
        fn find_window_for_precursor_mz(&self, precursor_mz: f64) -> Option<u32> {
            self.bounds
                .iter()
                .position(|(lo, hi)| *lo <= precursor_mz && precursor_mz <= *hi)
                .map(|x| x as u32)
        }

        fn global_rt_min(&self) -> f32 {
            1.0
        }

        fn global_rt_max(&self) -> f32 {
            60.0
        }
    }

    fn precursor(mz: f64, rt: Option<f64>, n_frags: usize) -> LibraryPrecursorInput {
        LibraryPrecursorInput::try_new(
            "PEPTIDE",
            mz,
            2,
            rt,
            false,
            (0..n_frags).map(|i| 200.0 + i as f32 * 100.0).collect(),
            vec![1.0; n_frags],
        )
        .unwrap()
    }

    fn windows() -> Windows {
        Windows {
            bounds: vec![(400.0, 425.0), (425.0, 450.0)],
        }
    }

    #[test]
    fn test_groups_tile_queries() {
        let precursors = vec![
            precursor(410.0, Some(20.0), 3),
            precursor(900.0, Some(20.0), 3),
            precursor(430.0, Some(30.0), 0),
            precursor(440.0, None, 5),
            precursor(425.0, Some(10.0), 2),
        ];
        let params = DiaSearchParameters::default();
        let res = generate(&precursors, &windows(), &params);

        assert_eq!(res.skipped_no_window, 1);
        assert_eq!(res.skipped_no_fragments, 1);
        assert_eq!(
            res.groups.len() + res.skipped_no_window + res.skipped_no_fragments,
            precursors.len()
        );
        assert_eq!(res.queries.len(), 3 + 5 + 2);

        let mut next = 0;
        for g in res.groups.iter() {
            assert_eq!(g.query_offset, next);
            next += g.query_count;
            for q in res.queries_for(g) {
                assert_eq!(q.window_id, g.window_id);
                assert_eq!(q.rt_min, g.rt_min);
                assert_eq!(q.rt_max, g.rt_max);
            }
        }
        assert_eq!(next, res.queries.len());
        for (i, q) in res.queries.iter().enumerate() {
            assert_eq!(q.query_id, i);
        }

        // Shared boundary goes to the first window.
        assert_eq!(res.groups[2].window_id, 0);
        assert_eq!(res.groups[2].input_index, 4);
    }

    #[test]
    fn test_fixed_windows_and_global_fallback() {
        let precursors = vec![precursor(410.0, Some(20.0), 2), precursor(410.0, None, 2)];
        let params = DiaSearchParameters::default();
        let res = generate(&precursors, &windows(), &params);
        assert_eq!((res.groups[0].rt_min, res.groups[0].rt_max), (15.0, 25.0));
        assert_eq!((res.groups[1].rt_min, res.groups[1].rt_max), (1.0, 60.0));
    }

    #[test]
    fn test_calibrated_windows() {
        let model = RtCalibrationModel::try_new(0.5, 2.0, 1.0, 0.99, 50).unwrap();
        let precursors = vec![
            precursor(410.0, Some(20.0), 2).with_irt(Some(40.0)),
            precursor(410.0, Some(20.0), 2),
            precursor(410.0, None, 2),
        ];
        let params = DiaSearchParameters::default();
        let res = generate_calibrated(&precursors, &windows(), &params, &model);

        // iRT 40 -> 22 min, 3 sigma = 3 min.
        assert_eq!((res.groups[0].rt_min, res.groups[0].rt_max), (19.0, 25.0));
        // Library RT used as the model input: 20 -> 12 min.
        assert_eq!((res.groups[1].rt_min, res.groups[1].rt_max), (9.0, 15.0));
        assert_eq!((res.groups[2].rt_min, res.groups[2].rt_max), (1.0, 60.0));
    }

    #[test]
    fn test_empty_input() {
        let res = generate(&[], &windows(), &DiaSearchParameters::default());
        assert!(res.queries.is_empty());
        assert!(res.groups.is_empty());
    }
}
