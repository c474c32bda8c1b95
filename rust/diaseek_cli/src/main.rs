mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> std::result::Result<(), errors::CliError> {
    // RUST_LOG wins over the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Cli::parse();
    let mut config = Config::from_file(&args.config)?;
    config.apply_cli_args(&args)?;
    info!("Parsed configuration: {:#?}", config);

    let (Some(input), Some(output)) = (config.input.as_ref(), config.output.as_ref()) else {
        return Err(errors::CliError::Config {
            source: "Both an input and an output are required".to_string(),
        });
    };

    std::fs::create_dir_all(&output.directory).map_err(|e| errors::CliError::Io {
        source: e.to_string(),
        path: Some(output.directory.to_string_lossy().to_string()),
    })?;

    let index = processing::load_scans(&input.scans)?;
    let library = processing::load_library(&input.library)?;
    processing::main_loop(&library, &index, &config.analysis, output)
}
