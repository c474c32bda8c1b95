use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the JSON spectral library (will over-write the config file)
    #[arg(short, long)]
    pub library_file: Option<PathBuf>,

    /// Path to the JSON dump of decoded MS2 scans (will over-write the config file)
    #[arg(short, long)]
    pub scans_file: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write every result with its per-fragment arrays as JSON
    #[arg(short, long)]
    pub full_output: bool,

    /// Worker threads, zero or negative for all cores (will over-write the config file)
    #[arg(short, long)]
    pub threads: Option<i32>,
}
