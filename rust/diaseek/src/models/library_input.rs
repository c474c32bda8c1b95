use crate::errors::{
    DataProcessingError,
    DiaSeekError,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
};
use std::path::Path;

/// Library entry for one precursor, validated at construction.
///
/// Fragment m/z and intensity arrays are parallel and always have the
/// same length. Retention times are in minutes, iRT in library units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLibraryPrecursor")]
pub struct LibraryPrecursorInput {
    sequence: String,
    precursor_mz: f64,
    charge: i32,
    retention_time: Option<f64>,
    irt_value: Option<f64>,
    is_decoy: bool,
    fragment_mzs: Vec<f32>,
    fragment_intensities: Vec<f32>,
}

/// Unvalidated on-disk form, routed through [`LibraryPrecursorInput::try_new`].
#[derive(Debug, Clone, Deserialize)]
struct RawLibraryPrecursor {
    sequence: String,
    precursor_mz: f64,
    charge: i32,
    #[serde(default)]
    retention_time: Option<f64>,
    #[serde(default, alias = "irt")]
    irt_value: Option<f64>,
    #[serde(default)]
    is_decoy: bool,
    fragment_mzs: Vec<f32>,
    fragment_intensities: Vec<f32>,
}

impl TryFrom<RawLibraryPrecursor> for LibraryPrecursorInput {
    type Error = DataProcessingError;

    fn try_from(raw: RawLibraryPrecursor) -> Result<Self, Self::Error> {
        LibraryPrecursorInput::try_new(
            raw.sequence,
            raw.precursor_mz,
            raw.charge,
            raw.retention_time,
            raw.is_decoy,
            raw.fragment_mzs,
            raw.fragment_intensities,
        )
        .map(|x| x.with_irt(raw.irt_value))
    }
}

impl LibraryPrecursorInput {
    pub fn try_new(
        sequence: impl Into<String>,
        precursor_mz: f64,
        charge: i32,
        retention_time: Option<f64>,
        is_decoy: bool,
        fragment_mzs: Vec<f32>,
        fragment_intensities: Vec<f32>,
    ) -> Result<Self, DataProcessingError> {
        let sequence = sequence.into();
        if sequence.is_empty() {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("precursor sequence".into()),
            });
        }
        if !precursor_mz.is_finite() {
            return Err(DataProcessingError::ExpectedFiniteNonNanData {
                context: format!("precursor m/z of {}/{}", sequence, charge),
            });
        }
        if fragment_mzs.len() != fragment_intensities.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: fragment_mzs.len(),
                other: fragment_intensities.len(),
                context: format!("fragment m/z vs intensities of {}/{}", sequence, charge),
            });
        }
        Ok(Self {
            sequence,
            precursor_mz,
            charge,
            retention_time,
            irt_value: None,
            is_decoy,
            fragment_mzs,
            fragment_intensities,
        })
    }

    pub fn with_irt(mut self, irt_value: Option<f64>) -> Self {
        self.irt_value = irt_value;
        self
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn precursor_mz(&self) -> f64 {
        self.precursor_mz
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn retention_time(&self) -> Option<f64> {
        self.retention_time
    }

    pub fn irt_value(&self) -> Option<f64> {
        self.irt_value
    }

    pub fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    pub fn fragment_mzs(&self) -> &[f32] {
        &self.fragment_mzs
    }

    pub fn fragment_intensities(&self) -> &[f32] {
        &self.fragment_intensities
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_mzs.len()
    }

    /// Coordinate used for calibration: iRT if known, library RT otherwise.
    pub fn calibration_coordinate(&self) -> Option<f64> {
        self.irt_value.or(self.retention_time)
    }
}

/// Reads a library written as one JSON array, or as one precursor per
/// line for `.ndjson`/`.jsonl` files.
pub fn read_library(path: &Path) -> Result<Vec<LibraryPrecursorInput>, DiaSeekError> {
    let io_err = |source: std::io::Error| DiaSeekError::Io {
        source,
        path: Some(path.to_path_buf()),
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let is_ndjson = matches!(
        path.extension().and_then(|x| x.to_str()),
        Some("ndjson" | "jsonl")
    );
    if !is_ndjson {
        return Ok(serde_json::from_reader(reader)?);
    }

    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let elem = serde_json::from_str(&line).map_err(|e| DiaSeekError::ParseError {
            msg: format!("{}:{}: {}", path.display(), i + 1, e),
        })?;
        out.push(elem);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_fragment_arrays() {
        let res = LibraryPrecursorInput::try_new(
            "PEPTIDE",
            500.0,
            2,
            None,
            false,
            vec![100.0, 200.0, 300.0],
            vec![1.0, 2.0],
        );
        assert!(matches!(
            res,
            Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: 3,
                other: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let res = LibraryPrecursorInput::try_new("", 500.0, 2, None, false, vec![], vec![]);
        assert!(matches!(
            res,
            Err(DataProcessingError::ExpectedNonEmptyData { .. })
        ));
    }

    #[test]
    fn test_non_finite_precursor_mz() {
        let res = LibraryPrecursorInput::try_new("PEPTIDE", f64::NAN, 2, None, false, vec![], vec![]);
        assert!(matches!(
            res,
            Err(DataProcessingError::ExpectedFiniteNonNanData { .. })
        ));
    }

    #[test]
    fn test_read_ndjson_library() {
        let path = std::env::temp_dir().join(format!("diaseek_lib_{}.ndjson", std::process::id()));
        std::fs::write(
            &path,
            concat!(
                r#"{"sequence": "AAK", "precursor_mz": 400.0, "charge": 2, "fragment_mzs": [100.0], "fragment_intensities": [1.0]}"#,
                "\n\n",
                r#"{"sequence": "CCK", "precursor_mz": 410.0, "charge": 3, "is_decoy": true, "fragment_mzs": [], "fragment_intensities": []}"#,
                "\n",
            ),
        )
        .unwrap();
        let lib = read_library(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(lib.len(), 2);
        assert!(lib[1].is_decoy());
        assert_eq!(lib[1].fragment_count(), 0);

        let missing = read_library(Path::new("/nonexistent/library.json"));
        assert!(matches!(missing, Err(DiaSeekError::Io { .. })));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: LibraryPrecursorInput = serde_json::from_str(
            r#"{"sequence": "PEPTIDE", "precursor_mz": 500.5, "charge": 2,
                "irt": 33.0, "fragment_mzs": [100.0], "fragment_intensities": [1.0]}"#,
        )
        .unwrap();
        assert_eq!(ok.irt_value(), Some(33.0));
        assert_eq!(ok.retention_time(), None);
        assert!(!ok.is_decoy());
        assert_eq!(ok.calibration_coordinate(), Some(33.0));

        let bad: Result<LibraryPrecursorInput, _> = serde_json::from_str(
            r#"{"sequence": "PEPTIDE", "precursor_mz": 500.5, "charge": 2,
                "fragment_mzs": [100.0, 200.0], "fragment_intensities": [1.0]}"#,
        );
        assert!(bad.is_err());
    }
}
