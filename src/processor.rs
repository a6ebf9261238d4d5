//! Per-partition consumer of `(kmer, counts)` records.
//!
//! Each partition worker owns one `CountProcessor` with a private statistics
//! store. In selection mode (the default) every record is scored with a χ²
//! statistic against the proportional-contribution null model and offered to
//! a bounded per-minimiser top-K; the retained records are folded into the
//! store at finalisation and dumped to the partition's selected-kmers file.
//! With selection disabled every record updates the store immediately.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::minimizer::MinimizerModel;
use crate::stats::SimkaStatistics;
use crate::top_k::MinimizerTopK;

struct Selection {
    model: MinimizerModel,
    top_k: MinimizerTopK,
}

pub struct CountProcessor {
    stats: SimkaStatistics,
    selection: Option<Selection>,
    shared_banks: Vec<usize>,
    output_dir: PathBuf,
    partition_id: usize,
}

impl CountProcessor {
    /// `selection` enables χ² top-K filtering with the given minimiser model
    /// and capacity; `None` accumulates every record directly.
    pub fn new(
        stats: SimkaStatistics,
        selection: Option<(MinimizerModel, usize)>,
        output_dir: PathBuf,
        partition_id: usize,
    ) -> Self {
        CountProcessor {
            stats,
            selection: selection.map(|(model, capacity)| Selection {
                model,
                top_k: MinimizerTopK::new(capacity),
            }),
            shared_banks: Vec::new(),
            output_dir,
            partition_id,
        }
    }

    /// Hot path: one record from the partition stream.
    pub fn process(&mut self, kmer: u64, counts: &[u64]) {
        if self.selection.is_none() {
            self.update_distance(counts);
            return;
        }

        let score = self.chi2_score(counts);
        if let Some(selection) = &mut self.selection {
            let minimizer = selection.model.minimizer(kmer);
            selection.top_k.offer(minimizer, score, counts.to_vec());
        }
    }

    /// χ² of the per-dataset abundances against each dataset's read share.
    /// Degenerate totals score 0 so the record still flows through.
    fn chi2_score(&self, counts: &[u64]) -> f64 {
        let total_abundance: u64 = counts.iter().sum();
        if total_abundance == 0 || self.stats.total_reads == 0 {
            return 0.0;
        }

        let t = total_abundance as f64;
        let r_tot = self.stats.total_reads as f64;

        let mut x2 = 0.0;
        for (i, &count) in counts.iter().enumerate() {
            let r_i = self.stats.dataset_nb_reads[i] as f64;
            if r_i == 0.0 {
                continue;
            }
            let diff = count as f64 / t - r_i / r_tot;
            x2 += diff * diff * r_tot * t / r_i;
        }

        x2
    }

    /// Finalise the partition: fold the retained records into the store in
    /// ascending score order, dump them to the selected-kmers file, and hand
    /// the worker-local store back for merging.
    pub fn end(mut self) -> Result<SimkaStatistics> {
        if let Some(selection) = self.selection.take() {
            let path = self
                .output_dir
                .join(format!("select_kmers_out_{}.txt", self.partition_id));
            let mut out = BufWriter::new(File::create(&path)?);

            for record in selection.top_k.drain() {
                self.update_distance(&record.counts);

                let mut line = String::new();
                for (i, count) in record.counts.iter().enumerate() {
                    if i > 0 {
                        line.push(' ');
                    }
                    line.push_str(&count.to_string());
                }
                writeln!(out, "{}", line)?;
            }

            out.flush()?;
        }

        Ok(self.stats)
    }

    /// Purely additive update of the pair statistics for one k-mer.
    pub fn update_distance(&mut self, counts: &[u64]) {
        self.shared_banks.clear();
        for (i, &count) in counts.iter().enumerate() {
            if count > 0 {
                self.shared_banks.push(i);
            }
        }

        self.update_distance_default(counts);

        if self.stats.compute_simple_distances {
            self.update_distance_simple(counts);
        }

        if self.stats.compute_complex_distances {
            self.update_distance_complex(counts);
        }
    }

    fn update_distance_default(&mut self, counts: &[u64]) {
        for ii in 0..self.shared_banks.len() {
            for jj in ii + 1..self.shared_banks.len() {
                let i = self.shared_banks[ii];
                let j = self.shared_banks[jj];
                let s = self.stats.sym_index(i, j);

                self.stats.matrix_nb_shared_kmers[i][j] += counts[i];
                self.stats.matrix_nb_shared_kmers[j][i] += counts[j];
                self.stats.matrix_nb_distinct_shared_kmers[s] += 1;
                self.stats.bray_curtis_numerator[s] += counts[i].min(counts[j]);
            }
        }
    }

    fn update_distance_simple(&mut self, counts: &[u64]) {
        for ii in 0..self.shared_banks.len() {
            for jj in ii + 1..self.shared_banks.len() {
                let i = self.shared_banks[ii];
                let j = self.shared_banks[jj];

                let abundance_i = counts[i] as f64;
                let abundance_j = counts[j] as f64;

                self.stats.chord_ni_nj[i][j] += abundance_i * abundance_j;
                self.stats.hellinger_sqrt_ni_nj[i][j] += (abundance_i * abundance_j).sqrt();
                self.stats.kulczynski_min_ni_nj[i][j] += counts[i].min(counts[j]);
            }
        }
    }

    fn update_distance_complex(&mut self, counts: &[u64]) {
        for i in 0..counts.len() {
            for j in i + 1..counts.len() {
                if counts[i] == 0 && counts[j] == 0 {
                    continue;
                }

                let abundance_i = counts[i] as f64;
                let abundance_j = counts[j] as f64;

                self.stats.canberra[i][j] +=
                    (abundance_i - abundance_j).abs() / (abundance_i + abundance_j);

                let n_i = self.stats.nb_solid_kmers_per_bank[i] as f64;
                let n_j = self.stats.nb_solid_kmers_per_bank[j] as f64;
                if n_i == 0.0 || n_j == 0.0 {
                    continue;
                }

                // x_y = a_i·N_j, y_x = a_j·N_i; a zero abundance contributes
                // no divergence term.
                let x_y = abundance_i * n_j;
                let y_x = abundance_j * n_i;

                let mut divergence = 0.0;
                if counts[i] > 0 {
                    divergence += (abundance_i / n_i) * ((2.0 * x_y) / (x_y + y_x)).ln();
                }
                if counts[j] > 0 {
                    divergence += (abundance_j / n_j) * ((2.0 * y_x) / (x_y + y_x)).ln();
                }

                self.stats.kullback_leibler[i][j] += divergence;
                self.stats.whittaker_min_ni_nj[i][j] += (x_y - y_x).abs();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stats_for(
        reads: &[u64],
        solid_distinct: &[u64],
        solid: &[u64],
        simple: bool,
        complex: bool,
    ) -> SimkaStatistics {
        let mut stats = SimkaStatistics::new(reads.len(), simple, complex, reads);
        for i in 0..reads.len() {
            let sum_sq = (solid[i] * solid[i]) as f64;
            stats.set_bank_kmer_counts(i, solid_distinct[i], solid[i], sum_sq);
        }
        stats
    }

    fn direct_processor(stats: SimkaStatistics) -> CountProcessor {
        CountProcessor::new(stats, None, PathBuf::new(), 0)
    }

    #[test]
    fn test_identical_datasets_accumulation() {
        // Two identical datasets: {AAA:(3,3), AAC:(1,1)}.
        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], false, false);
        let mut processor = direct_processor(stats);

        processor.process(0, &[3, 3]);
        processor.process(1, &[1, 1]);

        let stats = processor.end().unwrap();
        let s = stats.sym_index(0, 1);
        assert_eq!(stats.matrix_nb_distinct_shared_kmers[s], 2);
        assert_eq!(stats.bray_curtis_numerator[s], 4);
        assert_eq!(stats.matrix_nb_shared_kmers[0][1], 4);
        assert_eq!(stats.matrix_nb_shared_kmers[1][0], 4);
    }

    #[test]
    fn test_disjoint_datasets_accumulation() {
        // {AAA:(5,0), TTT:(0,7)}: no pair is ever shared.
        let stats = stats_for(&[10, 10], &[1, 1], &[5, 7], false, false);
        let mut processor = direct_processor(stats);

        processor.process(0, &[5, 0]);
        processor.process(63, &[0, 7]);

        let stats = processor.end().unwrap();
        let s = stats.sym_index(0, 1);
        assert_eq!(stats.matrix_nb_distinct_shared_kmers[s], 0);
        assert_eq!(stats.bray_curtis_numerator[s], 0);
        assert_eq!(stats.matrix_nb_shared_kmers[0][1], 0);
        assert_eq!(stats.matrix_nb_shared_kmers[1][0], 0);
    }

    #[test]
    fn test_bray_curtis_numerator_bound() {
        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], false, false);
        let mut processor = direct_processor(stats);

        processor.process(0, &[2, 2]);
        processor.process(1, &[2, 0]);
        processor.process(2, &[0, 2]);

        let stats = processor.end().unwrap();
        let s = stats.sym_index(0, 1);
        assert_eq!(stats.bray_curtis_numerator[s], 2);
        assert!(
            stats.bray_curtis_numerator[s]
                <= stats.nb_solid_kmers_per_bank[0].min(stats.nb_solid_kmers_per_bank[1])
        );
        assert_eq!(stats.matrix_nb_shared_kmers[0][1], 2);
        assert_eq!(stats.matrix_nb_shared_kmers[1][0], 2);
    }

    #[test]
    fn test_simple_block() {
        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], true, false);
        let mut processor = direct_processor(stats);

        processor.process(0, &[3, 3]);
        processor.process(1, &[1, 1]);

        let stats = processor.end().unwrap();
        assert_eq!(stats.chord_ni_nj[0][1], 10.0);
        assert!((stats.hellinger_sqrt_ni_nj[0][1] - 4.0).abs() < 1e-12);
        assert_eq!(stats.kulczynski_min_ni_nj[0][1], 4);
    }

    #[test]
    fn test_complex_block_single_positive_is_symmetric() {
        // A k-mer absent from dataset 0 must contribute the dataset-1 term,
        // and vice versa, with the roles swapped.
        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], false, true);
        let mut processor = direct_processor(stats);
        processor.process(0, &[0, 2]);
        let a = processor.end().unwrap();

        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], false, true);
        let mut processor = direct_processor(stats);
        processor.process(0, &[2, 0]);
        let b = processor.end().unwrap();

        assert!((a.kullback_leibler[0][1] - b.kullback_leibler[0][1]).abs() < 1e-12);
        assert_eq!(a.canberra[0][1], 1.0);
        assert_eq!(b.canberra[0][1], 1.0);
        assert_eq!(a.whittaker_min_ni_nj[0][1], 8.0);
        assert_eq!(b.whittaker_min_ni_nj[0][1], 8.0);

        // Equal abundances in equally sized banks diverge by zero.
        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], false, true);
        let mut processor = direct_processor(stats);
        processor.process(0, &[3, 3]);
        let c = processor.end().unwrap();
        assert!(c.kullback_leibler[0][1].abs() < 1e-12);
        assert_eq!(c.whittaker_min_ni_nj[0][1], 0.0);
    }

    #[test]
    fn test_chi2_score() {
        let stats = stats_for(&[10, 10], &[1, 1], &[4, 4], false, false);
        let processor = direct_processor(stats);

        // Balanced counts match the null model exactly.
        assert_eq!(processor.chi2_score(&[2, 2]), 0.0);

        // counts (3,1): X² = ((0.75-0.5)² + (0.25-0.5)²) · 20·4/10 = 1.0.
        assert!((processor.chi2_score(&[3, 1]) - 1.0).abs() < 1e-12);

        // Degenerate totals pass through with score 0.
        assert_eq!(processor.chi2_score(&[0, 0]), 0.0);
    }

    #[test]
    fn test_merge_equals_concatenation() {
        let records: Vec<Vec<u64>> = vec![
            vec![3, 0, 1],
            vec![1, 1, 1],
            vec![0, 5, 2],
            vec![2, 2, 0],
            vec![0, 0, 4],
        ];

        let base = || stats_for(&[5, 5, 5], &[4, 4, 4], &[6, 8, 8], true, true);

        let mut full = direct_processor(base());
        for (kmer, counts) in records.iter().enumerate() {
            full.process(kmer as u64, counts);
        }
        let full = full.end().unwrap();

        let mut first = direct_processor(base());
        for (kmer, counts) in records[..2].iter().enumerate() {
            first.process(kmer as u64, counts);
        }
        let mut merged = first.end().unwrap();

        let mut second = direct_processor(base());
        for (kmer, counts) in records[2..].iter().enumerate() {
            second.process(kmer as u64, counts);
        }
        let second = second.end().unwrap();

        merged.merge(&second).unwrap();

        // Integer-valued statistics match exactly; the transcendental sums
        // (square roots, logarithms) only up to summation order.
        assert_eq!(
            merged.matrix_nb_distinct_shared_kmers,
            full.matrix_nb_distinct_shared_kmers
        );
        assert_eq!(merged.bray_curtis_numerator, full.bray_curtis_numerator);
        assert_eq!(merged.matrix_nb_shared_kmers, full.matrix_nb_shared_kmers);
        assert_eq!(merged.kulczynski_min_ni_nj, full.kulczynski_min_ni_nj);
        assert_eq!(merged.chord_ni_nj, full.chord_ni_nj);
        assert_eq!(merged.whittaker_min_ni_nj, full.whittaker_min_ni_nj);
        for i in 0..3 {
            for j in 0..3 {
                assert!((merged.hellinger_sqrt_ni_nj[i][j] - full.hellinger_sqrt_ni_nj[i][j]).abs() < 1e-12);
                assert!((merged.canberra[i][j] - full.canberra[i][j]).abs() < 1e-12);
                assert!((merged.kullback_leibler[i][j] - full.kullback_leibler[i][j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_selection_mode_defers_and_dumps() {
        let dir = tempdir().unwrap();
        let stats = stats_for(&[10, 10], &[2, 2], &[4, 4], false, false);
        let model = MinimizerModel::new(8, 4);

        let mut processor = CountProcessor::new(
            stats,
            Some((model, 1)),
            dir.path().to_path_buf(),
            3,
        );

        // Distinct minimisers; the balanced record scores 0 and the skewed
        // one strictly higher, so only the skewed record is retained.
        let balanced = 0u64; // AAAAAAAA
        let skewed = u64::MAX; // TTTTTTTT
        processor.process(balanced, &[2, 2]);
        processor.process(skewed, &[4, 0]);

        let stats = processor.end().unwrap();

        // Only the retained record reached the store, and it is unshared.
        let s = stats.sym_index(0, 1);
        assert_eq!(stats.matrix_nb_distinct_shared_kmers[s], 0);

        let dumped = std::fs::read_to_string(dir.path().join("select_kmers_out_3.txt")).unwrap();
        assert_eq!(dumped, "4 0\n");
    }
}
