//! Dataset descriptions and their sidecar count files.
//!
//! The dataset file is a TSV with one dataset per line: a name and its read
//! files, `;`-separated when a dataset spans several sub-banks (e.g. paired
//! ends). Dataset identity is row order. The upstream counter leaves one
//! sidecar per dataset at `<tmp>/count_synchro/<name>.ok` with four decimal
//! lines: read count, solid distinct k-mers, solid k-mers, Σcounts².

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ahash::{HashSet, HashSetExt};

use crate::error::{Result, SimkaError};
use crate::stats::SimkaStatistics;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub files: Vec<PathBuf>,
}

/// Parse the dataset description TSV. `#` comments and blank lines are
/// skipped; duplicate names are rejected.
pub fn parse_dataset_file(path: &Path) -> Result<Vec<Dataset>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut datasets = Vec::new();
    let mut names = HashSet::new();

    for line in reader.lines() {
        let line = line?;

        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() != 2 {
            return Err(SimkaError::input_format(
                path,
                "each line must have exactly 2 columns (name, files)",
            ));
        }

        let name = fields[0].to_string();
        if !names.insert(name.clone()) {
            return Err(SimkaError::input_format(
                path,
                format!("duplicate dataset name '{}'", name),
            ));
        }

        let files: Vec<PathBuf> = fields[1]
            .split(';')
            .map(|f| PathBuf::from(f.trim()))
            .collect();

        datasets.push(Dataset { name, files });
    }

    if datasets.is_empty() {
        return Err(SimkaError::input_format(path, "no datasets listed"));
    }

    Ok(datasets)
}

/// Per-dataset totals written by the upstream counter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SidecarCounts {
    pub nb_reads: u64,
    pub nb_solid_distinct_kmers: u64,
    pub nb_solid_kmers: u64,
    pub sum_squared_counts: f64,
}

/// Read `<tmp>/count_synchro/<name>.ok`.
pub fn read_sidecar(tmp_dir: &Path, dataset_name: &str) -> Result<SidecarCounts> {
    let path = tmp_dir
        .join("count_synchro")
        .join(format!("{}.ok", dataset_name));
    let file = File::open(&path)?;
    let mut lines = BufReader::new(file).lines();

    let mut next_line = |what: &str| -> Result<String> {
        match lines.next() {
            Some(line) => Ok(line?),
            None => Err(SimkaError::input_format(
                &path,
                format!("missing {} line", what),
            )),
        }
    };

    let parse_u64 = |raw: String, what: &str| -> Result<u64> {
        raw.trim()
            .parse()
            .map_err(|_| SimkaError::input_format(&path, format!("{} is not a decimal", what)))
    };

    let nb_reads = parse_u64(next_line("nbReads")?, "nbReads")?;
    let nb_solid_distinct_kmers = parse_u64(
        next_line("nbSolidDistinctKmers")?,
        "nbSolidDistinctKmers",
    )?;
    let nb_solid_kmers = parse_u64(next_line("nbSolidKmers")?, "nbSolidKmers")?;
    let raw = next_line("sum of squared counts")?;
    let sum_squared_counts = raw.trim().parse().map_err(|_| {
        SimkaError::input_format(&path, "sum of squared counts is not a decimal")
    })?;

    Ok(SidecarCounts {
        nb_reads,
        nb_solid_distinct_kmers,
        nb_solid_kmers,
        sum_squared_counts,
    })
}

/// Build a zero-accumulator statistics store carrying the sidecar context of
/// every dataset.
pub fn build_statistics(
    datasets: &[Dataset],
    tmp_dir: &Path,
    compute_simple_distances: bool,
    compute_complex_distances: bool,
) -> Result<SimkaStatistics> {
    let mut reads = Vec::with_capacity(datasets.len());
    let mut sidecars = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let sidecar = read_sidecar(tmp_dir, &dataset.name)?;
        reads.push(sidecar.nb_reads);
        sidecars.push(sidecar);
    }

    let mut stats = SimkaStatistics::new(
        datasets.len(),
        compute_simple_distances,
        compute_complex_distances,
        &reads,
    );
    for (bank, sidecar) in sidecars.iter().enumerate() {
        stats.set_bank_kmer_counts(
            bank,
            sidecar.nb_solid_distinct_kmers,
            sidecar.nb_solid_kmers,
            sidecar.sum_squared_counts,
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(path: &Path, contents: &str) {
        let mut file = File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_parse_dataset_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datasets.tsv");
        write_file(
            &path,
            "# name\tfiles\nA\t/data/a.fastq.gz\nB\t/data/b_1.fastq.gz;/data/b_2.fastq.gz\n",
        );

        let datasets = parse_dataset_file(&path).unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].name, "A");
        assert_eq!(datasets[0].files, vec![PathBuf::from("/data/a.fastq.gz")]);
        assert_eq!(datasets[1].files.len(), 2);
    }

    #[test]
    fn test_duplicate_dataset_name_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datasets.tsv");
        write_file(&path, "A\t/data/a.fq\nA\t/data/b.fq\n");

        let err = parse_dataset_file(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_wrong_column_count_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datasets.tsv");
        write_file(&path, "A\n");

        assert!(matches!(
            parse_dataset_file(&path),
            Err(SimkaError::InputFormat { .. })
        ));
    }

    #[test]
    fn test_read_sidecar() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("count_synchro")).unwrap();
        write_file(
            &dir.path().join("count_synchro").join("A.ok"),
            "1000\n250\n900\n4200\n",
        );

        let counts = read_sidecar(dir.path(), "A").unwrap();
        assert_eq!(
            counts,
            SidecarCounts {
                nb_reads: 1000,
                nb_solid_distinct_kmers: 250,
                nb_solid_kmers: 900,
                sum_squared_counts: 4200.0,
            }
        );
    }

    #[test]
    fn test_sidecar_missing_line() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("count_synchro")).unwrap();
        write_file(&dir.path().join("count_synchro").join("A.ok"), "1000\n250\n");

        let err = read_sidecar(dir.path(), "A").unwrap_err();
        assert!(matches!(err, SimkaError::InputFormat { .. }));
        assert!(err.to_string().contains("nbSolidKmers"));
    }

    #[test]
    fn test_missing_sidecar_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_sidecar(dir.path(), "absent"),
            Err(SimkaError::Io(_))
        ));
    }

    #[test]
    fn test_build_statistics_applies_context() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("count_synchro")).unwrap();
        write_file(&dir.path().join("count_synchro").join("A.ok"), "10\n4\n9\n25\n");
        write_file(&dir.path().join("count_synchro").join("B.ok"), "20\n5\n11\n36\n");

        let datasets = vec![
            Dataset {
                name: "A".to_string(),
                files: vec![],
            },
            Dataset {
                name: "B".to_string(),
                files: vec![],
            },
        ];

        let stats = build_statistics(&datasets, dir.path(), true, false).unwrap();
        assert_eq!(stats.dataset_nb_reads, vec![10, 20]);
        assert_eq!(stats.total_reads, 30);
        assert_eq!(stats.nb_solid_distinct_kmers_per_bank, vec![4, 5]);
        assert_eq!(stats.nb_solid_kmers_per_bank, vec![9, 11]);
        assert_eq!(stats.chord_sqrt_n2, vec![5.0, 6.0]);
    }
}
