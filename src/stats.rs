//! Additive sufficient statistics for all supported distances.
//!
//! `SimkaStatistics` holds everything the distance engine needs: per-bank
//! totals loaded from the sidecar count files, one symmetric pair array per
//! shared-k-mer statistic, and dense N×N matrices for the asymmetric and
//! optional distance families. Accumulation is purely additive, so
//! worker-local stores merged in any order produce identical totals.
//!
//! The per-bank reference context (`dataset_nb_reads`, `total_reads`,
//! `nb_solid_distinct_kmers_per_bank`, `nb_solid_kmers_per_bank`,
//! `chord_sqrt_n2`) comes from the sidecars once per run; `merge` sums the
//! stream-accumulated fields and keeps the receiver's context.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use crate::error::{Result, SimkaError};

#[derive(Clone, Debug, PartialEq)]
pub struct SimkaStatistics {
    pub nb_banks: usize,
    pub compute_simple_distances: bool,
    pub compute_complex_distances: bool,

    pub nb_kmers: u64,
    pub nb_distinct_kmers: u64,
    pub nb_solid_kmers: u64,
    pub nb_erroneous_kmers: u64,
    pub nb_shared_kmers: u64,

    pub dataset_nb_reads: Vec<u64>,
    pub total_reads: u64,

    pub nb_solid_distinct_kmers_per_bank: Vec<u64>,
    pub nb_solid_kmers_per_bank: Vec<u64>,
    pub nb_kmers_per_bank: Vec<u64>,
    pub chord_sqrt_n2: Vec<f64>,

    // Symmetric pair arrays of length N(N+1)/2, indexed by sym_index.
    pub matrix_nb_distinct_shared_kmers: Vec<u64>,
    pub bray_curtis_numerator: Vec<u64>,

    // Asymmetric: total abundance of i restricted to k-mers also seen in j.
    pub matrix_nb_shared_kmers: Vec<Vec<u64>>,

    // Simple distance family.
    pub chord_ni_nj: Vec<Vec<f64>>,
    pub hellinger_sqrt_ni_nj: Vec<Vec<f64>>,
    pub kulczynski_min_ni_nj: Vec<Vec<u64>>,

    // Complex distance family.
    pub canberra: Vec<Vec<f64>>,
    pub whittaker_min_ni_nj: Vec<Vec<f64>>,
    pub kullback_leibler: Vec<Vec<f64>>,
}

fn square(n: usize, enabled: bool) -> Vec<Vec<f64>> {
    if enabled {
        vec![vec![0.0; n]; n]
    } else {
        Vec::new()
    }
}

impl SimkaStatistics {
    /// Zero-initialised store for `nb_banks` datasets. `dataset_nb_reads`
    /// carries the sidecar read counts (χ² null model); per-bank k-mer
    /// totals are applied afterwards with [`set_bank_kmer_counts`].
    ///
    /// [`set_bank_kmer_counts`]: SimkaStatistics::set_bank_kmer_counts
    pub fn new(
        nb_banks: usize,
        compute_simple_distances: bool,
        compute_complex_distances: bool,
        dataset_nb_reads: &[u64],
    ) -> Self {
        assert_eq!(dataset_nb_reads.len(), nb_banks);
        let pairs = nb_banks * (nb_banks + 1) / 2;

        SimkaStatistics {
            nb_banks,
            compute_simple_distances,
            compute_complex_distances,
            nb_kmers: 0,
            nb_distinct_kmers: 0,
            nb_solid_kmers: 0,
            nb_erroneous_kmers: 0,
            nb_shared_kmers: 0,
            dataset_nb_reads: dataset_nb_reads.to_vec(),
            total_reads: dataset_nb_reads.iter().sum(),
            nb_solid_distinct_kmers_per_bank: vec![0; nb_banks],
            nb_solid_kmers_per_bank: vec![0; nb_banks],
            nb_kmers_per_bank: vec![0; nb_banks],
            chord_sqrt_n2: if compute_simple_distances {
                vec![0.0; nb_banks]
            } else {
                Vec::new()
            },
            matrix_nb_distinct_shared_kmers: vec![0; pairs],
            bray_curtis_numerator: vec![0; pairs],
            matrix_nb_shared_kmers: vec![vec![0; nb_banks]; nb_banks],
            chord_ni_nj: square(nb_banks, compute_simple_distances),
            hellinger_sqrt_ni_nj: square(nb_banks, compute_simple_distances),
            kulczynski_min_ni_nj: if compute_simple_distances {
                vec![vec![0; nb_banks]; nb_banks]
            } else {
                Vec::new()
            },
            canberra: square(nb_banks, compute_complex_distances),
            whittaker_min_ni_nj: square(nb_banks, compute_complex_distances),
            kullback_leibler: square(nb_banks, compute_complex_distances),
        }
    }

    /// Index of the unordered pair (i, j), i ≤ j, into the symmetric arrays.
    #[inline]
    pub fn sym_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i <= j && j < self.nb_banks);
        j + (self.nb_banks - 1) * i - i * i.saturating_sub(1) / 2
    }

    /// Apply the sidecar k-mer totals of one dataset.
    pub fn set_bank_kmer_counts(
        &mut self,
        bank: usize,
        nb_solid_distinct_kmers: u64,
        nb_solid_kmers: u64,
        sum_squared_counts: f64,
    ) {
        self.nb_solid_distinct_kmers_per_bank[bank] = nb_solid_distinct_kmers;
        self.nb_solid_kmers_per_bank[bank] = nb_solid_kmers;
        if self.compute_simple_distances {
            self.chord_sqrt_n2[bank] = sum_squared_counts.sqrt();
        }
    }

    /// Field-wise addition of the accumulated statistics. The sidecar
    /// context of the receiver is kept: both operands of a well-formed run
    /// were built from the same sidecars.
    pub fn merge(&mut self, other: &SimkaStatistics) -> Result<()> {
        if self.nb_banks != other.nb_banks {
            return Err(SimkaError::SizeMismatch {
                expected: self.nb_banks,
                found: other.nb_banks,
            });
        }
        if self.compute_simple_distances != other.compute_simple_distances
            || self.compute_complex_distances != other.compute_complex_distances
        {
            return Err(SimkaError::FlagMismatch {
                expected_simple: self.compute_simple_distances,
                found_simple: other.compute_simple_distances,
                expected_complex: self.compute_complex_distances,
                found_complex: other.compute_complex_distances,
            });
        }

        self.nb_kmers += other.nb_kmers;
        self.nb_distinct_kmers += other.nb_distinct_kmers;
        self.nb_solid_kmers += other.nb_solid_kmers;
        self.nb_erroneous_kmers += other.nb_erroneous_kmers;
        self.nb_shared_kmers += other.nb_shared_kmers;

        for i in 0..self.nb_banks {
            self.nb_kmers_per_bank[i] += other.nb_kmers_per_bank[i];
        }

        for s in 0..self.matrix_nb_distinct_shared_kmers.len() {
            self.matrix_nb_distinct_shared_kmers[s] += other.matrix_nb_distinct_shared_kmers[s];
            self.bray_curtis_numerator[s] += other.bray_curtis_numerator[s];
        }

        for i in 0..self.nb_banks {
            for j in 0..self.nb_banks {
                self.matrix_nb_shared_kmers[i][j] += other.matrix_nb_shared_kmers[i][j];
            }
        }

        if self.compute_simple_distances {
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.chord_ni_nj[i][j] += other.chord_ni_nj[i][j];
                    self.hellinger_sqrt_ni_nj[i][j] += other.hellinger_sqrt_ni_nj[i][j];
                    self.kulczynski_min_ni_nj[i][j] += other.kulczynski_min_ni_nj[i][j];
                }
            }
        }

        if self.compute_complex_distances {
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.canberra[i][j] += other.canberra[i][j];
                    self.whittaker_min_ni_nj[i][j] += other.whittaker_min_ni_nj[i][j];
                    self.kullback_leibler[i][j] += other.kullback_leibler[i][j];
                }
            }
        }

        Ok(())
    }

    /// Persist every field as little-endian f64 through a gzip stream, in a
    /// fixed order readable by [`load`](SimkaStatistics::load).
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut out = GzEncoder::new(BufWriter::new(file), Compression::default());

        let mut push = |v: f64| out.write_all(&v.to_le_bytes());

        push(bool_to_f64(self.compute_simple_distances))?;
        push(bool_to_f64(self.compute_complex_distances))?;

        push(self.nb_kmers as f64)?;
        push(self.nb_erroneous_kmers as f64)?;
        push(self.nb_distinct_kmers as f64)?;
        push(self.nb_solid_kmers as f64)?;
        push(self.nb_shared_kmers as f64)?;

        for &v in &self.nb_solid_distinct_kmers_per_bank {
            push(v as f64)?;
        }
        for &v in &self.nb_kmers_per_bank {
            push(v as f64)?;
        }
        for &v in &self.nb_solid_kmers_per_bank {
            push(v as f64)?;
        }

        for row in &self.matrix_nb_shared_kmers {
            for &v in row {
                push(v as f64)?;
            }
        }

        for s in 0..self.matrix_nb_distinct_shared_kmers.len() {
            push(self.matrix_nb_distinct_shared_kmers[s] as f64)?;
            push(self.bray_curtis_numerator[s] as f64)?;
        }

        if self.compute_simple_distances {
            for &v in &self.chord_sqrt_n2 {
                push(v)?;
            }
            for row in &self.chord_ni_nj {
                for &v in row {
                    push(v)?;
                }
            }
            for row in &self.hellinger_sqrt_ni_nj {
                for &v in row {
                    push(v)?;
                }
            }
            for row in &self.kulczynski_min_ni_nj {
                for &v in row {
                    push(v as f64)?;
                }
            }
        }

        if self.compute_complex_distances {
            for row in &self.canberra {
                for &v in row {
                    push(v)?;
                }
            }
            for row in &self.whittaker_min_ni_nj {
                for &v in row {
                    push(v)?;
                }
            }
            for row in &self.kullback_leibler {
                for &v in row {
                    push(v)?;
                }
            }
        }

        out.finish()?.flush()?;
        Ok(())
    }

    /// Fill this store from a stream written by
    /// [`save`](SimkaStatistics::save). The store must already be sized for
    /// the run; persisted flags are verified against it.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let mut input = FloatSource::new(GzDecoder::new(BufReader::new(file)), path);

        let found_simple = input.next()? != 0.0;
        let found_complex = input.next()? != 0.0;
        if found_simple != self.compute_simple_distances
            || found_complex != self.compute_complex_distances
        {
            return Err(SimkaError::FlagMismatch {
                expected_simple: self.compute_simple_distances,
                found_simple,
                expected_complex: self.compute_complex_distances,
                found_complex,
            });
        }

        self.nb_kmers = input.next()? as u64;
        self.nb_erroneous_kmers = input.next()? as u64;
        self.nb_distinct_kmers = input.next()? as u64;
        self.nb_solid_kmers = input.next()? as u64;
        self.nb_shared_kmers = input.next()? as u64;

        for i in 0..self.nb_banks {
            self.nb_solid_distinct_kmers_per_bank[i] = input.next()? as u64;
        }
        for i in 0..self.nb_banks {
            self.nb_kmers_per_bank[i] = input.next()? as u64;
        }
        for i in 0..self.nb_banks {
            self.nb_solid_kmers_per_bank[i] = input.next()? as u64;
        }

        for i in 0..self.nb_banks {
            for j in 0..self.nb_banks {
                self.matrix_nb_shared_kmers[i][j] = input.next()? as u64;
            }
        }

        for s in 0..self.matrix_nb_distinct_shared_kmers.len() {
            self.matrix_nb_distinct_shared_kmers[s] = input.next()? as u64;
            self.bray_curtis_numerator[s] = input.next()? as u64;
        }

        if self.compute_simple_distances {
            for i in 0..self.nb_banks {
                self.chord_sqrt_n2[i] = input.next()?;
            }
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.chord_ni_nj[i][j] = input.next()?;
                }
            }
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.hellinger_sqrt_ni_nj[i][j] = input.next()?;
                }
            }
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.kulczynski_min_ni_nj[i][j] = input.next()? as u64;
                }
            }
        }

        if self.compute_complex_distances {
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.canberra[i][j] = input.next()?;
                }
            }
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.whittaker_min_ni_nj[i][j] = input.next()?;
                }
            }
            for i in 0..self.nb_banks {
                for j in 0..self.nb_banks {
                    self.kullback_leibler[i][j] = input.next()?;
                }
            }
        }

        Ok(())
    }

    /// Diagnostic summary of the run.
    pub fn print(&self) {
        let total_reads: u64 = self.dataset_nb_reads.iter().sum();
        let min_reads = self.dataset_nb_reads.iter().min().copied().unwrap_or(0);
        let max_reads = self.dataset_nb_reads.iter().max().copied().unwrap_or(0);
        let mean_reads = if self.nb_banks > 0 {
            total_reads / self.nb_banks as u64
        } else {
            0
        };

        let nb_kmers: u64 = self.nb_solid_kmers_per_bank.iter().sum();
        let nb_distinct_kmers: u64 = self.nb_solid_distinct_kmers_per_bank.iter().sum();

        info!("Stats");
        info!("\tReads");
        info!("\t\tTotal:    {}", total_reads);
        info!("\t\tMin:      {}", min_reads);
        info!("\t\tMax:      {}", max_reads);
        info!("\t\tAverage:  {}", mean_reads);
        info!("\tKmers");
        info!("\t\tDistinct kmers:  {}", nb_distinct_kmers);
        info!("\t\tKmers:           {}", nb_kmers);
        if nb_distinct_kmers > 0 {
            info!(
                "\t\tKmer coverage:   {:.2}",
                nb_kmers as f64 / nb_distinct_kmers as f64
            );
        }
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Reads a stream of little-endian f64 values, reporting truncation as an
/// input format error naming the file.
struct FloatSource<'a, R: Read> {
    inner: R,
    path: &'a Path,
}

impl<'a, R: Read> FloatSource<'a, R> {
    fn new(inner: R, path: &'a Path) -> Self {
        FloatSource { inner, path }
    }

    fn next(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SimkaError::input_format(self.path, "truncated statistics stream")
            } else {
                SimkaError::Io(e)
            }
        })?;
        Ok(f64::from_le_bytes(buf))
    }
}
