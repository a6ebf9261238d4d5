//! Per-partition `(kmer, counts)` record streams.
//!
//! The upstream counter partitions k-mer space and writes one text stream per
//! partition: a canonical k-mer token followed by the N per-dataset
//! abundances, whitespace separated, one record per line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Result, SimkaError};

pub type CountNumber = u64;
pub type CountVector = Vec<CountNumber>;

/// One k-mer with its per-dataset abundance vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountRecord {
    pub kmer: u64,
    pub counts: CountVector,
}

/// Lazily parses one partition stream.
pub struct PartitionStream {
    reader: BufReader<File>,
    path: PathBuf,
    nb_banks: usize,
    line_no: usize,
}

impl PartitionStream {
    pub fn open(path: &Path, nb_banks: usize) -> Result<Self> {
        let file = File::open(path)?;
        Ok(PartitionStream {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            nb_banks,
            line_no: 0,
        })
    }

    fn parse_line(&self, line: &str) -> Result<CountRecord> {
        let mut fields = line.split_whitespace();

        let kmer = fields
            .next()
            .ok_or_else(|| self.format_error("empty record"))?
            .parse::<u64>()
            .map_err(|_| self.format_error("k-mer token is not a decimal integer"))?;

        let mut counts = CountVector::with_capacity(self.nb_banks);
        for field in fields {
            let count = field
                .parse::<CountNumber>()
                .map_err(|_| self.format_error("abundance is not a decimal integer"))?;
            counts.push(count);
        }

        if counts.len() != self.nb_banks {
            return Err(self.format_error(format!(
                "expected {} abundances, found {}",
                self.nb_banks,
                counts.len()
            )));
        }

        Ok(CountRecord { kmer, counts })
    }

    fn format_error(&self, detail: impl Into<String>) -> SimkaError {
        SimkaError::input_format(
            &self.path,
            format!("line {}: {}", self.line_no, detail.into()),
        )
    }
}

impl Iterator for PartitionStream {
    type Item = Result<CountRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(self.parse_line(&line));
        }
    }
}

/// List the `part_<id>.txt` streams of a counts directory, ordered by id.
pub fn find_partitions(counts_dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut partitions = Vec::new();

    for entry in std::fs::read_dir(counts_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some(stem) = name.strip_prefix("part_").and_then(|s| s.strip_suffix(".txt")) else {
            continue;
        };

        let id = stem.parse::<usize>().map_err(|_| {
            SimkaError::input_format(&path, "partition id is not a decimal integer")
        })?;

        partitions.push((id, path));
    }

    if partitions.is_empty() {
        return Err(SimkaError::input_format(
            counts_dir,
            "no part_<id>.txt partition streams found",
        ));
    }

    partitions.sort();
    Ok(partitions)
}
