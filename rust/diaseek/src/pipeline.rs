//! End-to-end DIA library search over one run.
//!
//! generate queries -> extract XICs -> assemble and score -> FDR, with an
//! optional iterative RT calibration in front. All parallel work runs inside
//! a dedicated rayon pool sized by `max_threads`.

use crate::errors::Result;
use crate::models::{
    DiaSearchParameters,
    GenerationResult,
    LibraryPrecursorInput,
};
use crate::qvalues::{
    DiaFdrInfo,
    annotate_fdr,
    annotate_peptide_q_values,
    count_passing,
};
use crate::query_generation::{
    generate,
    generate_calibrated,
};
use crate::rt_calibration::{
    CalibrationOutcome,
    LinearRtFitter,
    RtCalibrationModel,
    SearchPass,
    calibrate,
};
use crate::scoring::{
    AssemblyTimings,
    DiaSearchResult,
    assemble_results_with_temporal_scoring,
};
use diaquery::{
    FragmentExtractor,
    ScanWindowIndex,
};
use serde::Serialize;
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    info,
    warn,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineTimings {
    pub calibration: Duration,
    pub generation: Duration,
    pub extraction: Duration,
    pub assembly: Duration,
    pub fdr: Duration,
    pub assembly_stages: AssemblyTimings,
}

impl Serialize for PipelineTimings {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("PipelineTimings", 6)?;
        state.serialize_field("calibration_ms", &self.calibration.as_millis())?;
        state.serialize_field("generation_ms", &self.generation.as_millis())?;
        state.serialize_field("extraction_ms", &self.extraction.as_millis())?;
        state.serialize_field("assembly_ms", &self.assembly.as_millis())?;
        state.serialize_field("fdr_ms", &self.fdr.as_millis())?;
        state.serialize_field("assembly_stages", &self.assembly_stages)?;
        state.end()
    }
}

impl std::ops::AddAssign for PipelineTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.calibration += rhs.calibration;
        self.generation += rhs.generation;
        self.extraction += rhs.extraction;
        self.assembly += rhs.assembly;
        self.fdr += rhs.fdr;
        self.assembly_stages += rhs.assembly_stages;
    }
}

/// Results of one search pass over a slice of the library.
#[derive(Debug, Clone, Serialize)]
pub struct DiaSearchBatch {
    pub results: Vec<DiaSearchResult>,
    pub skipped_no_window: usize,
    pub skipped_no_fragments: usize,
    pub timings: PipelineTimings,
}

impl DiaSearchBatch {
    /// Makes `input_index` relative to the full library when this batch
    /// searched the slice starting at `offset`.
    pub fn offset_input_indices(&mut self, offset: usize) {
        for res in self.results.iter_mut() {
            res.offset_input_index(offset);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiaSearchOutput {
    pub results: Vec<DiaSearchResult>,
    /// Parallel to `results`.
    pub fdr: Vec<DiaFdrInfo>,
    pub skipped_no_window: usize,
    pub skipped_no_fragments: usize,
    pub calibration: Option<CalibrationOutcome>,
    pub timings: PipelineTimings,
}

pub struct DiaSearchPipeline<'a, I: ScanWindowIndex, E: FragmentExtractor> {
    index: &'a I,
    extractor: &'a E,
    params: DiaSearchParameters,
    fitter: LinearRtFitter,
    pool: rayon::ThreadPool,
}

impl<'a, I: ScanWindowIndex, E: FragmentExtractor> DiaSearchPipeline<'a, I, E> {
    pub fn new(index: &'a I, extractor: &'a E, params: DiaSearchParameters) -> Result<Self> {
        if params.prefer_gpu {
            warn!("GPU extraction requested but not available, using the CPU extractor");
        }
        let num_threads = params.effective_max_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("diaseek-{}", i))
            .build()?;
        info!("Search pool with {} threads", num_threads);
        Ok(Self {
            index,
            extractor,
            params,
            fitter: LinearRtFitter::default(),
            pool,
        })
    }

    pub fn with_fitter(mut self, fitter: LinearRtFitter) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn params(&self) -> &DiaSearchParameters {
        &self.params
    }

    /// Runs `op` inside the search thread pool.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Iterative RT calibration on (a subset of) the library.
    pub fn calibrate(&self, precursors: &[LibraryPrecursorInput]) -> Result<CalibrationOutcome> {
        let start = Instant::now();
        let outcome = self.install(|| calibrate(precursors, self.index, &self.params, self, &self.fitter))?;
        info!(
            "RT calibration finished after {} iteration(s) ({:?}) in {:?}",
            outcome.iterations.len(),
            outcome.termination,
            start.elapsed()
        );
        match &outcome.model {
            Some(model) => info!("Final RT model: {}", model),
            None => warn!("No RT calibration model could be fitted, using fixed RT windows"),
        }
        Ok(outcome)
    }

    /// Generates, extracts and scores `precursors` with fixed RT windows, or
    /// calibrated ones when `model` is given.
    pub fn search(
        &self,
        precursors: &[LibraryPrecursorInput],
        model: Option<&RtCalibrationModel>,
    ) -> Result<DiaSearchBatch> {
        self.install(|| {
            let mut timings = PipelineTimings::default();
            let st = Instant::now();
            let generated = match model {
                Some(m) => generate_calibrated(precursors, self.index, &self.params, m),
                None => generate(precursors, self.index, &self.params),
            };
            timings.generation = st.elapsed();

            let results = self.score_generated(precursors, &generated, model, &mut timings)?;
            Ok(DiaSearchBatch {
                results,
                skipped_no_window: generated.skipped_no_window,
                skipped_no_fragments: generated.skipped_no_fragments,
                timings,
            })
        })
    }

    fn score_generated(
        &self,
        precursors: &[LibraryPrecursorInput],
        generated: &GenerationResult,
        model: Option<&RtCalibrationModel>,
        timings: &mut PipelineTimings,
    ) -> Result<Vec<DiaSearchResult>> {
        let st = Instant::now();
        let extraction = self.extractor.extract(&generated.queries)?;
        timings.extraction += st.elapsed();

        let st = Instant::now();
        let (results, stage_timings) = assemble_results_with_temporal_scoring(
            precursors,
            generated,
            &extraction,
            &self.params,
            model,
        )?;
        timings.assembly += st.elapsed();
        timings.assembly_stages += stage_timings;
        Ok(results)
    }

    /// FDR annotation with the configured q-value method.
    pub fn annotate(&self, results: &[DiaSearchResult]) -> Vec<DiaFdrInfo> {
        let mut fdr = annotate_fdr(results, self.params.q_value_method);
        annotate_peptide_q_values(results, &mut fdr, self.params.q_value_method);
        fdr
    }

    /// Calibration (when enabled), final search and FDR over the whole library.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn run(&self, precursors: &[LibraryPrecursorInput]) -> Result<DiaSearchOutput> {
        let mut timings = PipelineTimings::default();

        let calibration = if self.params.use_irt_calibration {
            let st = Instant::now();
            let outcome = self.calibrate(precursors)?;
            timings.calibration = st.elapsed();
            Some(outcome)
        } else {
            None
        };
        let model = calibration.as_ref().and_then(|x| x.model.as_ref());

        let batch = self.search(precursors, model)?;
        timings += batch.timings;

        let st = Instant::now();
        let fdr = self.annotate(&batch.results);
        timings.fdr = st.elapsed();

        info!(
            "Search done: {} results, {} targets at 1% FDR ({} without window, {} without fragments)",
            batch.results.len(),
            count_passing(&fdr, 0.01),
            batch.skipped_no_window,
            batch.skipped_no_fragments
        );

        Ok(DiaSearchOutput {
            results: batch.results,
            fdr,
            skipped_no_window: batch.skipped_no_window,
            skipped_no_fragments: batch.skipped_no_fragments,
            calibration,
            timings,
        })
    }
}

impl<I: ScanWindowIndex, E: FragmentExtractor> SearchPass for DiaSearchPipeline<'_, I, E> {
    fn search_pass(
        &self,
        precursors: &[LibraryPrecursorInput],
        generated: &GenerationResult,
        model: Option<&RtCalibrationModel>,
    ) -> Result<Vec<DiaSearchResult>> {
        let mut timings = PipelineTimings::default();
        self.score_generated(precursors, generated, model, &mut timings)
    }
}
