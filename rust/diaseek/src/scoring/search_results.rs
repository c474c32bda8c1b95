use super::peak_group::PeakGroup;
use super::temporal::ScoringStrategy;
use crate::errors::{
    DataProcessingError,
    ResultWritingError,
};
use crate::models::{
    LibraryPrecursorInput,
    PrecursorQueryGroup,
};
use crate::qvalues::{
    DiaFdrInfo,
    UNCALCULATED_Q_VALUE,
};
use diaquery::FragmentResult;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub enum SetField<T> {
    Some(T),
    #[default]
    None,
}

impl<T> SetField<T> {
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    pub fn expect_some(self, field_name: &'static str) -> Result<T, DataProcessingError> {
        match self {
            Self::Some(v) => Ok(v),
            Self::None => Err(DataProcessingError::ExpectedSetField {
                field: field_name,
                context: "".into(),
            }),
        }
    }
}

/// Scores of one precursor. NaN means "not computable".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiaScores {
    /// Primary score, from the configured strategy.
    pub dot_product_score: f32,
    pub raw_cosine: f32,
    pub spectral_angle_score: f32,

    // Full window
    pub apex_dot_product_score: f32,
    pub temporal_cosine_score: f32,
    pub summed_dot_product_score: f32,
    pub mean_fragment_correlation: f32,
    pub min_fragment_correlation: f32,

    // Restricted to the detected peak, full window values when there is none.
    pub peak_apex_score: f32,
    pub peak_temporal_score: f32,
    pub peak_mean_fragment_correlation: f32,
    pub peak_min_fragment_correlation: f32,

    pub time_points_used: usize,
    pub apex_time_index: Option<usize>,
    pub observed_apex_rt: f32,
}

impl DiaScores {
    pub const NAN: DiaScores = DiaScores {
        dot_product_score: f32::NAN,
        raw_cosine: f32::NAN,
        spectral_angle_score: f32::NAN,
        apex_dot_product_score: f32::NAN,
        temporal_cosine_score: f32::NAN,
        summed_dot_product_score: f32::NAN,
        mean_fragment_correlation: f32::NAN,
        min_fragment_correlation: f32::NAN,
        peak_apex_score: f32::NAN,
        peak_temporal_score: f32::NAN,
        peak_mean_fragment_correlation: f32::NAN,
        peak_min_fragment_correlation: f32::NAN,
        time_points_used: 0,
        apex_time_index: None,
        observed_apex_rt: f32::NAN,
    };
}

/// Retention time context of a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RtFeatures {
    /// Calibrated prediction when a model was used, else the library RT.
    pub predicted_rt: f32,
    pub rt_deviation_minutes: f32,
    /// Log-likelihood style penalty from the calibration model, 0 without one.
    pub rt_score: f32,
    pub rt_adjusted_score: f32,
}

impl RtFeatures {
    pub const UNKNOWN: RtFeatures = RtFeatures {
        predicted_rt: f32::NAN,
        rt_deviation_minutes: f32::NAN,
        rt_score: f32::NAN,
        rt_adjusted_score: f32::NAN,
    };
}

#[derive(Debug, Default)]
pub struct DiaSearchResultBuilder<'q> {
    precursor: SetField<&'q LibraryPrecursorInput>,
    group: SetField<&'q PrecursorQueryGroup>,
    extracted_intensities: SetField<Vec<f32>>,
    xic_point_counts: SetField<Vec<u32>>,
    scores: SetField<DiaScores>,
    peak_group: SetField<PeakGroup>,
    rt_features: SetField<RtFeatures>,
    scoring_strategy: SetField<ScoringStrategy>,
}

impl<'q> DiaSearchResultBuilder<'q> {
    pub fn with_precursor(
        mut self,
        precursor: &'q LibraryPrecursorInput,
        group: &'q PrecursorQueryGroup,
    ) -> Self {
        self.precursor = SetField::Some(precursor);
        self.group = SetField::Some(group);
        self
    }

    /// Per-fragment totals and point counts, in library fragment order.
    pub fn with_fragment_results(mut self, fragment_results: &[FragmentResult]) -> Self {
        self.extracted_intensities =
            SetField::Some(fragment_results.iter().map(|x| x.total_intensity).collect());
        self.xic_point_counts = SetField::Some(
            fragment_results
                .iter()
                .map(|x| x.data_point_count as u32)
                .collect(),
        );
        self
    }

    pub fn with_scores(mut self, scores: DiaScores) -> Self {
        self.scores = SetField::Some(scores);
        self
    }

    pub fn with_peak_group(mut self, peak_group: PeakGroup) -> Self {
        self.peak_group = SetField::Some(peak_group);
        self
    }

    pub fn with_rt_features(mut self, rt_features: RtFeatures) -> Self {
        self.rt_features = SetField::Some(rt_features);
        self
    }

    pub fn with_scoring_strategy(mut self, strategy: ScoringStrategy) -> Self {
        self.scoring_strategy = SetField::Some(strategy);
        self
    }

    pub fn finalize(self) -> Result<DiaSearchResult, DataProcessingError> {
        macro_rules! expect_some {
            ($field:ident) => {
                self.$field.expect_some(stringify!($field))?
            };
        }

        let precursor = expect_some!(precursor);
        let group = expect_some!(group);
        let extracted_intensities = expect_some!(extracted_intensities);
        let xic_point_counts = expect_some!(xic_point_counts);
        if extracted_intensities.len() != group.query_count {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: group.query_count,
                other: extracted_intensities.len(),
                context: "DiaSearchResultBuilder::finalize".into(),
            });
        }
        let fragments_detected = xic_point_counts.iter().filter(|&&x| x > 0).count();

        Ok(DiaSearchResult {
            sequence: precursor.sequence().to_string(),
            charge: precursor.charge(),
            precursor_mz: precursor.precursor_mz(),
            window_id: group.window_id,
            is_decoy: precursor.is_decoy(),
            input_index: group.input_index,
            fragments_queried: group.query_count,
            fragments_detected,
            extracted_intensities,
            xic_point_counts,
            library_retention_time: precursor.retention_time(),
            rt_window_start: group.rt_min,
            rt_window_end: group.rt_max,
            scores: expect_some!(scores),
            peak_group: expect_some!(peak_group),
            rt_features: expect_some!(rt_features),
            scoring_strategy_used: expect_some!(scoring_strategy),
        })
    }
}

/// One scored library precursor.
#[derive(Debug, Clone, Serialize)]
pub struct DiaSearchResult {
    sequence: String,
    charge: i32,
    precursor_mz: f64,
    window_id: u32,
    is_decoy: bool,
    input_index: usize,

    fragments_queried: usize,
    fragments_detected: usize,
    extracted_intensities: Vec<f32>,
    xic_point_counts: Vec<u32>,

    library_retention_time: Option<f64>,
    rt_window_start: f32,
    rt_window_end: f32,

    scores: DiaScores,
    peak_group: PeakGroup,
    rt_features: RtFeatures,
    scoring_strategy_used: ScoringStrategy,
}

impl DiaSearchResult {
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn precursor_mz(&self) -> f64 {
        self.precursor_mz
    }

    pub fn window_id(&self) -> u32 {
        self.window_id
    }

    pub fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    /// Position of the precursor in the library slice it was searched with.
    pub fn input_index(&self) -> usize {
        self.input_index
    }

    /// Shifts `input_index` when the precursors were searched as a slice
    /// starting at `offset` of a larger library.
    pub(crate) fn offset_input_index(&mut self, offset: usize) {
        self.input_index += offset;
    }

    pub fn fragments_queried(&self) -> usize {
        self.fragments_queried
    }

    pub fn fragments_detected(&self) -> usize {
        self.fragments_detected
    }

    pub fn extracted_intensities(&self) -> &[f32] {
        &self.extracted_intensities
    }

    pub fn xic_point_counts(&self) -> &[u32] {
        &self.xic_point_counts
    }

    pub fn library_retention_time(&self) -> Option<f64> {
        self.library_retention_time
    }

    pub fn rt_window(&self) -> (f32, f32) {
        (self.rt_window_start, self.rt_window_end)
    }

    pub fn scores(&self) -> &DiaScores {
        &self.scores
    }

    pub fn dot_product_score(&self) -> f32 {
        self.scores.dot_product_score
    }

    pub fn observed_apex_rt(&self) -> f32 {
        self.scores.observed_apex_rt
    }

    pub fn peak_group(&self) -> &PeakGroup {
        &self.peak_group
    }

    pub fn rt_features(&self) -> &RtFeatures {
        &self.rt_features
    }

    pub fn scoring_strategy_used(&self) -> ScoringStrategy {
        self.scoring_strategy_used
    }

    pub fn meets_min_fragments(&self, min_required: usize) -> bool {
        self.fragments_detected >= min_required
    }

    pub fn fragment_detection_rate(&self) -> f32 {
        if self.fragments_queried == 0 {
            0.0
        } else {
            self.fragments_detected as f32 / self.fragments_queried as f32
        }
    }

    pub fn as_record(&self) -> DiaSearchRecord {
        let pg = &self.peak_group;
        DiaSearchRecord {
            sequence: self.sequence.clone(),
            charge: self.charge,
            precursor_mz: self.precursor_mz,
            window_id: self.window_id,
            is_decoy: self.is_decoy,
            fragments_queried: self.fragments_queried as u32,
            fragments_detected: self.fragments_detected as u32,
            library_retention_time: self.library_retention_time.unwrap_or(f64::NAN),
            rt_window_start: self.rt_window_start,
            rt_window_end: self.rt_window_end,
            dot_product_score: self.scores.dot_product_score,
            raw_cosine: self.scores.raw_cosine,
            spectral_angle_score: self.scores.spectral_angle_score,
            apex_dot_product_score: self.scores.apex_dot_product_score,
            temporal_cosine_score: self.scores.temporal_cosine_score,
            summed_dot_product_score: self.scores.summed_dot_product_score,
            mean_fragment_correlation: self.scores.mean_fragment_correlation,
            min_fragment_correlation: self.scores.min_fragment_correlation,
            peak_apex_score: self.scores.peak_apex_score,
            peak_temporal_score: self.scores.peak_temporal_score,
            peak_mean_fragment_correlation: self.scores.peak_mean_fragment_correlation,
            peak_min_fragment_correlation: self.scores.peak_min_fragment_correlation,
            time_points_used: self.scores.time_points_used as u32,
            apex_time_index: self.scores.apex_time_index.map_or(-1, |x| x as i32),
            observed_apex_rt: self.scores.observed_apex_rt,
            peak_is_valid: pg.is_valid,
            peak_apex_rt: pg.apex_rt,
            peak_left_rt: pg.left_rt,
            peak_right_rt: pg.right_rt,
            peak_width: pg.width,
            peak_symmetry: pg.symmetry,
            peak_scan_count: pg.scan_count as u32,
            peak_total_signal: pg.total_signal,
            peak_candidate_count: pg.candidate_count as u32,
            predicted_rt: self.rt_features.predicted_rt,
            rt_deviation_minutes: self.rt_features.rt_deviation_minutes,
            rt_score: self.rt_features.rt_score,
            rt_adjusted_score: self.rt_features.rt_adjusted_score,
            fragment_detection_rate: self.fragment_detection_rate(),
            scoring_strategy: self.scoring_strategy_used.kind().to_string(),
            q_value: UNCALCULATED_Q_VALUE,
            peptide_q_value: f64::NAN,
            cumulative_target: 0,
            cumulative_decoy: 0,
        }
    }
}

impl std::fmt::Display for DiaSearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {} window={} frags={}/{} score={:.4} apex={:.4} temporal={:.4}",
            self.sequence,
            self.charge,
            if self.is_decoy { "DECOY" } else { "TARGET" },
            self.window_id,
            self.fragments_detected,
            self.fragments_queried,
            self.scores.dot_product_score,
            self.scores.apex_dot_product_score,
            self.scores.temporal_cosine_score,
        )
    }
}

/// Flat, fixed width view of a result for parquet output.
///
/// The per-fragment arrays have no fixed width so they only go to the
/// JSON output.
#[derive(Debug, Clone, Serialize, ParquetRecordWriter)]
pub struct DiaSearchRecord {
    sequence: String,
    charge: i32,
    precursor_mz: f64,
    window_id: u32,
    is_decoy: bool,
    fragments_queried: u32,
    fragments_detected: u32,
    library_retention_time: f64,
    rt_window_start: f32,
    rt_window_end: f32,

    dot_product_score: f32,
    raw_cosine: f32,
    spectral_angle_score: f32,
    apex_dot_product_score: f32,
    temporal_cosine_score: f32,
    summed_dot_product_score: f32,
    mean_fragment_correlation: f32,
    min_fragment_correlation: f32,
    peak_apex_score: f32,
    peak_temporal_score: f32,
    peak_mean_fragment_correlation: f32,
    peak_min_fragment_correlation: f32,
    time_points_used: u32,
    apex_time_index: i32,
    observed_apex_rt: f32,

    // Peak group
    peak_is_valid: bool,
    peak_apex_rt: f32,
    peak_left_rt: f32,
    peak_right_rt: f32,
    peak_width: f32,
    peak_symmetry: f32,
    peak_scan_count: u32,
    peak_total_signal: f32,
    peak_candidate_count: u32,

    // RT
    predicted_rt: f32,
    rt_deviation_minutes: f32,
    rt_score: f32,
    rt_adjusted_score: f32,

    fragment_detection_rate: f32,
    scoring_strategy: String,

    // FDR
    q_value: f64,
    peptide_q_value: f64,
    cumulative_target: u32,
    cumulative_decoy: u32,
}

impl DiaSearchRecord {
    pub fn with_fdr(mut self, fdr: &DiaFdrInfo) -> Self {
        self.q_value = fdr.q_value;
        self.peptide_q_value = fdr.peptide_q_value.unwrap_or(f64::NAN);
        self.cumulative_target = fdr.cumulative_target as u32;
        self.cumulative_decoy = fdr.cumulative_decoy as u32;
        self
    }
}

pub struct ResultParquetWriter {
    row_group_size: usize,
    writer: SerializedFileWriter<File>,
    buffer: Vec<DiaSearchRecord>,
}

impl ResultParquetWriter {
    pub fn new(
        out_path: impl AsRef<Path>,
        row_group_size: usize,
    ) -> Result<Self, ResultWritingError> {
        let file = match File::create_new(out_path.as_ref()) {
            Ok(file) => file,
            Err(err) => {
                tracing::error!(
                    "Failed to open file {:?} with error: {}",
                    out_path.as_ref(),
                    err
                );
                return Err(ResultWritingError::Io {
                    source: err,
                    path: out_path.as_ref().to_path_buf(),
                });
            }
        };
        let records: &[DiaSearchRecord] = &[];
        let schema = records.schema()?;
        let writer = SerializedFileWriter::new(file, schema, Default::default())?;
        Ok(Self {
            buffer: Vec::with_capacity(row_group_size),
            writer,
            row_group_size: row_group_size.max(1),
        })
    }

    fn flush_to_file(&mut self) -> Result<(), ResultWritingError> {
        debug!("Flushing {} results to file", self.buffer.len());
        let mut row_group = self.writer.next_row_group()?;
        self.buffer.as_slice().write_to_row_group(&mut row_group)?;
        row_group.close()?;
        self.buffer.clear();
        Ok(())
    }

    fn push(&mut self, record: DiaSearchRecord) -> Result<(), ResultWritingError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.row_group_size {
            self.flush_to_file()?;
        }
        Ok(())
    }

    /// Adds a result without FDR annotation.
    pub fn add(&mut self, result: &DiaSearchResult) -> Result<(), ResultWritingError> {
        self.push(result.as_record())
    }

    pub fn add_annotated(
        &mut self,
        result: &DiaSearchResult,
        fdr: &DiaFdrInfo,
    ) -> Result<(), ResultWritingError> {
        self.push(result.as_record().with_fdr(fdr))
    }

    pub fn close(mut self) -> Result<(), ResultWritingError> {
        if !self.buffer.is_empty() {
            self.flush_to_file()?;
        }
        self.writer.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diaquery::ExtractionResult;

    fn precursor() -> LibraryPrecursorInput {
        LibraryPrecursorInput::try_new(
            "PEPTIDEK",
            500.25,
            2,
            Some(30.0),
            false,
            vec![300.0, 400.0, 500.0],
            vec![1.0, 0.5, 0.25],
        )
        .unwrap()
    }

    fn group() -> PrecursorQueryGroup {
        PrecursorQueryGroup {
            input_index: 4,
            query_offset: 0,
            query_count: 3,
            window_id: 1,
            rt_min: 25.0,
            rt_max: 35.0,
        }
    }

    #[test]
    fn test_builder_requires_all_fields() {
        let p = precursor();
        let g = group();
        let res = DiaSearchResultBuilder::default()
            .with_precursor(&p, &g)
            .finalize();
        assert!(matches!(
            res,
            Err(DataProcessingError::ExpectedSetField {
                field: "extracted_intensities",
                ..
            })
        ));
    }

    #[test]
    fn test_builder_and_display() {
        let p = precursor();
        let g = group();
        let mut ext = ExtractionResult::default();
        ext.push_trace(0, &[30.0, 30.1], &[10.0, 5.0]);
        ext.push_trace(1, &[], &[]);
        ext.push_trace(2, &[30.0], &[2.0]);

        let res = DiaSearchResultBuilder::default()
            .with_precursor(&p, &g)
            .with_fragment_results(&ext.results)
            .with_scores(DiaScores {
                dot_product_score: 0.9,
                ..DiaScores::NAN
            })
            .with_peak_group(PeakGroup::NONE)
            .with_rt_features(RtFeatures::UNKNOWN)
            .with_scoring_strategy(ScoringStrategy::TemporalCosine)
            .finalize()
            .unwrap();

        assert_eq!(res.fragments_detected(), 2);
        assert_eq!(res.fragments_queried(), 3);
        assert_eq!(res.extracted_intensities(), &[15.0, 0.0, 2.0]);
        assert_eq!(res.xic_point_counts(), &[2, 0, 1]);
        assert!(res.meets_min_fragments(2));
        assert!(!res.meets_min_fragments(3));
        assert!((res.fragment_detection_rate() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(res.input_index(), 4);

        let shown = res.to_string();
        assert!(shown.starts_with("PEPTIDEK/2 TARGET"));
        assert!(shown.contains("frags=2/3"));

        let record = res.as_record();
        assert_eq!(record.apex_time_index, -1);
        assert!(!record.peak_is_valid);
        assert_eq!(record.scoring_strategy, "TemporalCosine");
        assert_eq!(record.q_value, UNCALCULATED_Q_VALUE);

        let annotated = record.with_fdr(&DiaFdrInfo {
            q_value: 0.01,
            peptide_q_value: Some(0.005),
            cumulative_target: 99,
            cumulative_decoy: 1,
            ..Default::default()
        });
        assert_eq!(annotated.q_value, 0.01);
        assert_eq!(annotated.peptide_q_value, 0.005);
        assert_eq!(annotated.cumulative_target, 99);

        let mut shifted = res.clone();
        shifted.offset_input_index(10);
        assert_eq!(shifted.input_index(), 14);

        let path = std::env::temp_dir().join(format!(
            "diaseek_results_{}.parquet",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let mut writer = ResultParquetWriter::new(&path, 1).unwrap();
        writer.add(&res).unwrap();
        writer
            .add_annotated(&shifted, &DiaFdrInfo::default())
            .unwrap();
        writer.close().unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        // Never overwrites an existing file.
        assert!(ResultParquetWriter::new(&path, 1).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_fragment_count_mismatch() {
        let p = precursor();
        let g = group();
        let mut ext = ExtractionResult::default();
        ext.push_trace(0, &[30.0], &[1.0]);
        let res = DiaSearchResultBuilder::default()
            .with_precursor(&p, &g)
            .with_fragment_results(&ext.results)
            .with_scores(DiaScores::NAN)
            .with_peak_group(PeakGroup::NONE)
            .with_rt_features(RtFeatures::UNKNOWN)
            .with_scoring_strategy(ScoringStrategy::Summed)
            .finalize();
        assert!(matches!(
            res,
            Err(DataProcessingError::ExpectedSlicesSameLength { .. })
        ));
    }
}
