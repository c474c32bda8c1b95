use diaseek::{
    DiaSearchParameters,
    LinearRtFitter,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputConfig {
    /// JSON array of library precursors.
    pub library: PathBuf,
    /// JSON array of decoded MS2 scans.
    pub scans: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub chunk_size: usize,
    pub params: DiaSearchParameters,
    pub fitter: LinearRtFitter,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20_000,
            params: DiaSearchParameters::default(),
            fitter: LinearRtFitter::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub full_output: bool,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| CliError::ParseError { msg: e.to_string() })
    }

    /// Command line values take precedence over the config file.
    pub fn apply_cli_args(&mut self, args: &Cli) -> Result<(), CliError> {
        match (&mut self.input, &args.library_file, &args.scans_file) {
            (Some(input), library, scans) => {
                if let Some(library) = library {
                    input.library = library.clone();
                }
                if let Some(scans) = scans {
                    input.scans = scans.clone();
                }
            }
            (None, Some(library), Some(scans)) => {
                self.input = Some(InputConfig {
                    library: library.clone(),
                    scans: scans.clone(),
                });
            }
            (None, _, _) => {
                return Err(CliError::Config {
                    source: "No input provided, please provide one in either the config file or with the --library-file and --scans-file flags".to_string(),
                });
            }
        }

        if let Some(output_dir) = &args.output_dir {
            let full_output = self.output.as_ref().is_some_and(|x| x.full_output);
            self.output = Some(OutputConfig {
                directory: output_dir.clone(),
                full_output,
            });
        }
        match self.output.as_mut() {
            Some(output) => output.full_output |= args.full_output,
            None => {
                return Err(CliError::Config {
                    source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
                });
            }
        }

        if let Some(threads) = args.threads {
            self.analysis.params.max_threads = threads;
        }
        if self.analysis.chunk_size == 0 {
            return Err(CliError::Config {
                source: "analysis.chunk_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const CONFIG: &str = r#"{
        "input": {"library": "lib.json", "scans": "scans.json"},
        "analysis": {"chunk_size": 100, "params": {"ppm_tolerance": 10.0, "use_irt_calibration": true}},
        "output": {"directory": "out"}
    }"#;

    #[test]
    fn test_parse_partial_config() {
        let config: Config = serde_json::from_str(CONFIG).unwrap();
        assert_eq!(config.analysis.chunk_size, 100);
        assert_eq!(config.analysis.params.ppm_tolerance, 10.0);
        assert!(config.analysis.params.use_irt_calibration);
        assert_eq!(config.analysis.params.min_fragments_required, 3);
        assert_eq!(config.analysis.fitter, LinearRtFitter::default());
        assert!(!config.output.unwrap().full_output);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config: Config = serde_json::from_str(CONFIG).unwrap();
        let args = Cli::parse_from([
            "diaseek",
            "--config",
            "c.json",
            "--scans-file",
            "other_scans.json",
            "--output-dir",
            "elsewhere",
            "--full-output",
            "--threads",
            "4",
        ]);
        config.apply_cli_args(&args).unwrap();
        let input = config.input.unwrap();
        assert_eq!(input.library, PathBuf::from("lib.json"));
        assert_eq!(input.scans, PathBuf::from("other_scans.json"));
        let output = config.output.unwrap();
        assert_eq!(output.directory, PathBuf::from("elsewhere"));
        assert!(output.full_output);
        assert_eq!(config.analysis.params.max_threads, 4);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let mut config: Config =
            serde_json::from_str(r#"{"output": {"directory": "out"}}"#).unwrap();
        let args = Cli::parse_from(["diaseek", "--config", "c.json"]);
        assert!(matches!(
            config.apply_cli_args(&args),
            Err(CliError::Config { .. })
        ));
    }
}
