use super::config::{
    AnalysisConfig,
    OutputConfig,
};
use diaquery::{
    CpuFragmentExtractor,
    DiaScanIndex,
    RawScan,
};
use diaseek::errors::DiaSeekError;
use diaseek::models::read_library;
use diaseek::pipeline::PipelineTimings;
use diaseek::qvalues::count_passing;
use diaseek::scoring::ResultParquetWriter;
use diaseek::{
    CalibrationOutcome,
    DiaFdrInfo,
    DiaSearchPipeline,
    DiaSearchResult,
    LibraryPrecursorInput,
};
use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use serde::Serialize;
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
};
use std::path::Path;
use std::time::Instant;
use tracing::{
    debug,
    info,
};

use crate::errors::CliError;

fn open_reader(path: &Path) -> Result<BufReader<File>, CliError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })
}

pub fn load_library(path: &Path) -> Result<Vec<LibraryPrecursorInput>, CliError> {
    let st = Instant::now();
    let library = read_library(path).map_err(|e| CliError::DataReading {
        source: format!("library {}: {}", path.display(), e),
    })?;
    let num_decoys = library.iter().filter(|x| x.is_decoy()).count();
    info!(
        "Loaded library of {} precursors ({} decoys) from {} in {:?}",
        library.len(),
        num_decoys,
        path.display(),
        st.elapsed()
    );
    Ok(library)
}

pub fn load_scans(path: &Path) -> Result<DiaScanIndex, CliError> {
    let st = Instant::now();
    let scans: Vec<RawScan> =
        serde_json::from_reader(open_reader(path)?).map_err(|e| CliError::DataReading {
            source: format!("scans {}: {}", path.display(), e),
        })?;
    let index = DiaScanIndex::from_scans(scans)?;
    info!(
        "Indexed {} scans in {} windows from {} in {:?}",
        index.num_scans(),
        index.num_windows(),
        path.display(),
        st.elapsed()
    );
    Ok(index)
}

#[derive(Serialize)]
struct FullOutput<'a> {
    results: &'a [DiaSearchResult],
    fdr: &'a [DiaFdrInfo],
    calibration: Option<&'a CalibrationOutcome>,
    skipped_no_window: usize,
    skipped_no_fragments: usize,
    timings: &'a PipelineTimings,
}

fn write_json<T: Serialize>(data: &T, path: &Path) -> Result<(), CliError> {
    let file = File::create(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    serde_json::to_writer(BufWriter::new(file), data).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })
}

pub fn main_loop(
    library: &[LibraryPrecursorInput],
    index: &DiaScanIndex,
    analysis: &AnalysisConfig,
    output: &OutputConfig,
) -> std::result::Result<(), CliError> {
    let start = Instant::now();
    let extractor = CpuFragmentExtractor::new(index);
    let pipeline = DiaSearchPipeline::new(index, &extractor, analysis.params.clone())?
        .with_fitter(analysis.fitter.clone());
    let mut timings = PipelineTimings::default();

    // Calibration sees the whole library, the search itself runs in chunks.
    let calibration = if analysis.params.use_irt_calibration {
        let st = Instant::now();
        let outcome = pipeline.calibrate(library)?;
        timings.calibration = st.elapsed();
        Some(outcome)
    } else {
        None
    };
    let model = calibration.as_ref().and_then(|x| x.model.as_ref());

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .map_err(|e| CliError::Config {
        source: e.to_string(),
    })?;

    let mut results: Vec<DiaSearchResult> = Vec::new();
    let mut skipped_no_window = 0;
    let mut skipped_no_fragments = 0;
    let mut nqueried = 0;
    for (chunk_num, chunk) in library
        .chunks(analysis.chunk_size)
        .enumerate()
        .progress_with_style(style)
    {
        nqueried += chunk.len();
        let mut batch = pipeline.search(chunk, model)?;
        batch.offset_input_indices(chunk_num * analysis.chunk_size);
        skipped_no_window += batch.skipped_no_window;
        skipped_no_fragments += batch.skipped_no_fragments;
        timings += batch.timings;
        if let Some(best) = batch
            .results
            .iter()
            .filter(|x| !x.dot_product_score().is_nan())
            .max_by(|a, b| a.dot_product_score().total_cmp(&b.dot_product_score()))
        {
            debug!("Best score in chunk {}: {}", chunk_num, best);
        }
        results.extend(batch.results);
    }

    let st = Instant::now();
    let fdr = pipeline.annotate(&results);
    timings.fdr = st.elapsed();
    info!(
        "{} targets at 1% FDR, {} at 5% FDR",
        count_passing(&fdr, 0.01),
        count_passing(&fdr, 0.05)
    );

    let out_path_pq = output.directory.join("results.parquet");
    let mut pq_writer = ResultParquetWriter::new(&out_path_pq, 20_000).map_err(DiaSeekError::from)?;
    for (res, info) in results.iter().zip(fdr.iter()) {
        pq_writer
            .add_annotated(res, info)
            .map_err(DiaSeekError::from)?;
    }
    pq_writer.close().map_err(DiaSeekError::from)?;
    info!("Wrote {} results to {}", results.len(), out_path_pq.display());

    if let Some(outcome) = calibration.as_ref() {
        write_json(outcome, &output.directory.join("calibration.json"))?;
    }
    if output.full_output {
        let out_path_json = output.directory.join("results.json");
        write_json(
            &FullOutput {
                results: &results,
                fdr: &fdr,
                calibration: calibration.as_ref(),
                skipped_no_window,
                skipped_no_fragments,
                timings: &timings,
            },
            &out_path_json,
        )?;
        info!("Wrote full output to {}", out_path_json.display());
    }

    info!(
        "Timings: {}",
        serde_json::to_string(&timings).unwrap_or_default()
    );
    println!(
        "Processed {} precursors ({} without window, {} without fragments), wrote {} results",
        nqueried,
        skipped_no_window,
        skipped_no_fragments,
        results.len()
    );
    println!("Finished in {:?}", start.elapsed());
    Ok(())
}
