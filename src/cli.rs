
//! Command-line interface definition for the simka application.
//!
//! This file defines the `Cli` struct using the `clap` crate to parse and validate
//! command-line arguments. It covers the dataset description file, the per-partition
//! count streams produced by the upstream counter, the read filter and χ² selection
//! parameters, the optional distance families, and the number of threads. Custom
//! value parsers are provided for k-mer length and thread count. The CLI output is
//! styled using the `anstyle` crate for improved readability.

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_K: usize = 31;
const DEFAULT_MINIMIZER_LENGTH: usize = 8;
const DEFAULT_NB_SELECTED_KMERS: usize = 1000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(styles=get_styles())]
#[command(disable_help_subcommand = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// TSV file describing the datasets (name, read files separated by ';')
    #[arg(short = 'i', long, help_heading = "Inputs", value_parser = clap::value_parser!(PathBuf))]
    pub input: PathBuf,

    /// Directory holding the per-partition count streams (part_<id>.txt)
    #[arg(short = 'c', long, help_heading = "Inputs", value_parser = clap::value_parser!(PathBuf))]
    pub counts_dir: PathBuf,

    /// Temporary directory holding count_synchro sidecars (default: <out_dir>/tmp)
    #[arg(short = 't', long, help_heading = "Inputs", value_parser = clap::value_parser!(PathBuf))]
    pub tmp_dir: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long, help_heading = "Output", value_parser = clap::value_parser!(PathBuf))]
    pub out_dir: PathBuf,

    /// Length of k-mers
    #[arg(short, long, help_heading = "Kmer parameters", default_value_t = DEFAULT_K, value_parser = validate_kmer_length)]
    pub kmer_length: usize,

    /// Length of the minimisers used to group k-mers during selection
    #[arg(long, help_heading = "Kmer parameters", default_value_t = DEFAULT_MINIMIZER_LENGTH, value_parser = validate_kmer_length)]
    pub minimizer_length: usize,

    /// Number of top-scoring k-mers retained per partition by the χ² selection
    #[arg(long, help_heading = "Kmer parameters", default_value_t = DEFAULT_NB_SELECTED_KMERS)]
    pub nb_selected_kmers: usize,

    /// Disable the χ² selection and accumulate every k-mer
    #[arg(long, help_heading = "Kmer parameters", default_value_t = false)]
    pub all_kmers: bool,

    /// Maximum number of reads per dataset to process (0 = all)
    #[arg(long, help_heading = "Read filters", default_value_t = 0)]
    pub max_reads: u64,

    /// Minimal size a read should have to be kept
    #[arg(long, help_heading = "Read filters", default_value_t = 0)]
    pub min_read_size: usize,

    /// Minimal Shannon index a read should have to be kept (0 to 2)
    #[arg(long, help_heading = "Read filters", default_value_t = 0.0)]
    pub read_shannon_index: f64,

    /// Compute the simple abundance distances (chord, Hellinger, Kulczynski)
    #[arg(long, help_heading = "Distances", default_value_t = false)]
    pub simple_dist: bool,

    /// Compute the complex abundance distances (Whittaker, Jensen-Shannon, Canberra)
    #[arg(long, help_heading = "Distances", default_value_t = false)]
    pub complex_dist: bool,

    /// Number of threads to use
    #[arg(long, default_value_t = 1, value_parser = validate_threads)]
    pub threads: usize,

    /// Only stream the datasets through the read filter and report read counts
    #[arg(long, default_value_t = false)]
    pub data_info: bool,

    /// Skip verification that the dataset read files exist
    #[arg(long, default_value_t = false)]
    pub skip_file_check: bool,
}

fn validate_kmer_length(k: &str) -> Result<usize, String> {
    let k: usize = k
        .parse()
        .map_err(|_| format!("`{k}` isn't a valid k-mer length"))?;

    if !(1..=32).contains(&k) {
        return Err("k-mer length must be in the range [1, 32]".to_string());
    }

    Ok(k)
}

fn validate_threads(threads: &str) -> Result<usize, String> {
    let threads: usize = threads
        .parse()
        .map_err(|_| format!("`{threads}` isn't a valid value"))?;

    if !(1..=1024).contains(&threads) {
        return Err("Threads  must be in the range [1, 1024]".to_string());
    }

    Ok(threads)
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))),
        )
}

#[test]
fn test_verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}
