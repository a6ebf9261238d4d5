
//! Main entry point for the simka application.
//!
//! This file handles command-line parsing, logging setup, input validation, and
//! orchestrates the pairwise distance computation: the dataset sidecars are loaded
//! into a statistics store, the per-partition count streams are consumed in
//! parallel by one count processor each, the worker-local stores are merged, and
//! the distance matrices are derived and written to the output directory.
//! A separate `--data-info` mode only streams the datasets through the read
//! filter and reports per-dataset read counts.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use log::info;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::cli::Cli;
use crate::counts::{find_partitions, PartitionStream};
use crate::dataset::{build_statistics, parse_dataset_file, Dataset};
use crate::distance::DistanceEngine;
use crate::filter::SequenceFilter;
use crate::logging::setup_logger;
use crate::minimizer::MinimizerModel;
use crate::processor::CountProcessor;
use crate::progress::{progress_bar, progress_bar_msg};
use crate::reads::{open_sequence_file, MultiDatasetIterator};
use crate::stats::SimkaStatistics;

mod cli;
pub mod counts;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod filter;
pub mod logging;
pub mod minimizer;
pub mod processor;
pub mod progress;
pub mod reads;
pub mod stats;
pub mod top_k;

/// Common initialization required by all commands.
fn init(threads: usize) -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    info!("{} v{}", env!("CARGO_PKG_NAME"), VERSION);
    info!("{}", env::args().collect::<Vec<String>>().join(" "));

    info!("Using {} threads.", threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    Ok(())
}

/// Check that every read file listed in the dataset description exists.
fn verify_dataset_files(datasets: &[Dataset]) -> Result<()> {
    info!("Verifying all dataset read files exist.");
    let num_files = datasets.iter().map(|d| d.files.len()).sum::<usize>();
    let progress_bar = progress_bar(num_files as u64);
    for dataset in datasets {
        for path in &dataset.files {
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Read file {} of dataset '{}' does not exist.",
                    path.display(),
                    dataset.name
                ));
            }
            progress_bar.inc(1);
        }
    }
    progress_bar.finish();
    Ok(())
}

/// Stream every dataset through the read filter and report the per-dataset
/// read counts.
fn data_info(
    datasets: &[Dataset],
    filter: SequenceFilter,
    max_reads: u64,
    out_dir: &Path,
) -> Result<()> {
    let mut banks = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let mut sub_banks = Vec::with_capacity(dataset.files.len());
        for file in &dataset.files {
            sub_banks.push(open_sequence_file(file)?);
        }
        banks.push(sub_banks);
    }

    let mut counts = vec![0u64; datasets.len()];
    for read in MultiDatasetIterator::new(banks, filter, max_reads) {
        counts[read?.dataset] += 1;
    }

    let out_file = File::create(out_dir.join("read_counts.tsv"))?;
    let mut writer = BufWriter::new(out_file);
    writeln!(writer, "dataset\tnb_reads")?;
    for (dataset, count) in datasets.iter().zip(&counts) {
        info!(" - {}: {} reads", dataset.name, count);
        writeln!(writer, "{}\t{}", dataset.name, count)?;
    }

    Ok(())
}

fn main() -> Result<()> {
    let start = Instant::now();

    let args = Cli::parse();

    std::fs::create_dir_all(&args.out_dir)?;
    setup_logger(&args.out_dir)?;

    init(args.threads)?;

    anyhow::ensure!(
        args.minimizer_length <= args.kmer_length,
        "minimizer length ({}) must not exceed k-mer length ({})",
        args.minimizer_length,
        args.kmer_length
    );

    let datasets = parse_dataset_file(&args.input)?;
    info!("Processing {} datasets.", datasets.len());

    if !args.skip_file_check {
        verify_dataset_files(&datasets)?;
    }

    let filter = SequenceFilter::new(args.min_read_size, args.read_shannon_index);

    if args.data_info {
        data_info(&datasets, filter, args.max_reads, &args.out_dir)?;
        info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
        info!("Done.");
        return Ok(());
    }

    let tmp_dir: PathBuf = args
        .tmp_dir
        .clone()
        .unwrap_or_else(|| args.out_dir.join("tmp"));
    let context = build_statistics(&datasets, &tmp_dir, args.simple_dist, args.complex_dist)?;

    let partitions = find_partitions(&args.counts_dir)?;
    info!("Found {} partition streams.", partitions.len());

    let selection = if args.all_kmers {
        None
    } else {
        Some((
            MinimizerModel::new(args.kmer_length, args.minimizer_length),
            args.nb_selected_kmers,
        ))
    };

    let nb_banks = datasets.len();
    let out_dir = args.out_dir.clone();
    let progress = progress_bar_msg(partitions.len() as u64);

    // One worker-local store per partition; merging happens afterwards.
    let stores = partitions
        .par_iter()
        .map(|(id, path)| -> Result<SimkaStatistics> {
            let mut processor =
                CountProcessor::new(context.clone(), selection, out_dir.clone(), *id);
            for record in PartitionStream::open(path, nb_banks)? {
                let record = record?;
                processor.process(record.kmer, &record.counts);
            }
            let stats = processor.end()?;

            progress.set_message(format!("part_{}", id));
            progress.inc(1);
            Ok(stats)
        })
        .collect::<Result<Vec<_>>>()?;
    progress.finish();

    let mut global = context;
    for stats in &stores {
        global.merge(stats)?;
    }

    global.print();

    let stats_path = args.out_dir.join("simka_stats.gz");
    global.save(&stats_path)?;
    info!("Saved statistics to {}.", stats_path.display());

    let names: Vec<String> = datasets.iter().map(|d| d.name.clone()).collect();
    DistanceEngine::new(&global).output_matrices(&args.out_dir, &names)?;

    info!("Elapsed time (sec): {:.2}", start.elapsed().as_secs_f32());
    info!("Done.");

    Ok(())
}
