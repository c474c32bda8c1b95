use diaquery::{
    DataProcessingError as DQDataProcessingError,
    DiaQueryError,
};
use std::path::PathBuf;

#[derive(Debug)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    ExpectedFiniteNonNanData {
        context: String,
    },
    ExpectedSetField {
        field: &'static str,
        context: String,
    },
    DiaQueryDataProcessingError {
        error: DQDataProcessingError,
        context: String,
    },
}

impl std::fmt::Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DataProcessingError {}

impl From<DQDataProcessingError> for DataProcessingError {
    fn from(x: DQDataProcessingError) -> Self {
        Self::DiaQueryDataProcessingError {
            error: x,
            context: "".to_string(),
        }
    }
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::ExpectedFiniteNonNanData {
                context: owned_context,
            }
            | DataProcessingError::ExpectedSetField {
                context: owned_context,
                ..
            }
            | DataProcessingError::DiaQueryDataProcessingError {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
        }
        self
    }
}

/// Failures of an RT calibration fit.
///
/// None of these abort a search; the calibration loop logs them and keeps
/// the previous model.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    InsufficientAnchors { found: usize, required: usize },
    DegenerateData { context: String },
    ZeroSlope,
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientAnchors { found, required } => write!(
                f,
                "Insufficient calibration anchors: found {}, need at least {}",
                found, required
            ),
            Self::DegenerateData { context } => {
                write!(f, "Degenerate calibration data: {}", context)
            }
            Self::ZeroSlope => write!(f, "Calibration slope must be finite and non-zero"),
        }
    }
}

impl std::error::Error for CalibrationError {}

#[derive(Debug)]
pub enum ResultWritingError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    Parquet {
        source: parquet::errors::ParquetError,
    },
}

impl From<parquet::errors::ParquetError> for ResultWritingError {
    fn from(source: parquet::errors::ParquetError) -> Self {
        Self::Parquet { source }
    }
}

#[derive(Debug)]
pub enum DiaSeekError {
    DiaQuery(DiaQueryError),
    Io {
        source: std::io::Error,
        path: Option<std::path::PathBuf>,
    },
    ParseError {
        msg: String,
    },
    DataProcessingError(DataProcessingError),
    Calibration(CalibrationError),
    ResultWriting(ResultWritingError),
    ThreadPool {
        msg: String,
    },
}

impl std::fmt::Display for DiaSeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DiaSeekError {}

pub type Result<T> = std::result::Result<T, DiaSeekError>;

impl From<DiaQueryError> for DiaSeekError {
    fn from(x: DiaQueryError) -> Self {
        Self::DiaQuery(x)
    }
}

impl From<serde_json::Error> for DiaSeekError {
    fn from(val: serde_json::Error) -> Self {
        DiaSeekError::ParseError {
            msg: val.to_string(),
        }
    }
}

impl From<DataProcessingError> for DiaSeekError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessingError(x)
    }
}

impl From<CalibrationError> for DiaSeekError {
    fn from(x: CalibrationError) -> Self {
        Self::Calibration(x)
    }
}

impl From<ResultWritingError> for DiaSeekError {
    fn from(x: ResultWritingError) -> Self {
        Self::ResultWriting(x)
    }
}

impl From<DQDataProcessingError> for DiaSeekError {
    fn from(x: DQDataProcessingError) -> Self {
        Self::DataProcessingError(DataProcessingError::DiaQueryDataProcessingError {
            error: x,
            context: "".to_string(),
        })
    }
}

impl From<rayon::ThreadPoolBuildError> for DiaSeekError {
    fn from(x: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool { msg: x.to_string() }
    }
}
