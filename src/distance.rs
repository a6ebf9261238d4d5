//! Closed-form derivation of the distance matrices.
//!
//! Every measure is a pure function of the sufficient statistics; no k-mer
//! is ever re-read. Presence/absence measures work on the (a, b, c)
//! decomposition of the distinct k-mer sets, abundance measures on the
//! pair-indexed running sums. Zero denominators never reach the output:
//! each dissimilarity falls back to 1, the chord/Hellinger family to √2.

use std::f64::consts::SQRT_2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

use crate::error::Result;
use crate::stats::SimkaStatistics;

pub type Matrix = Vec<Vec<f64>>;

pub struct DistanceEngine<'a> {
    stats: &'a SimkaStatistics,
}

impl<'a> DistanceEngine<'a> {
    pub fn new(stats: &'a SimkaStatistics) -> Self {
        DistanceEngine { stats }
    }

    /// Shared (a), i-only (b) and j-only (c) distinct k-mer counts.
    fn abc(&self, i: usize, j: usize) -> (f64, f64, f64) {
        let s = self.stats.sym_index(i.min(j), i.max(j));
        let a = self.stats.matrix_nb_distinct_shared_kmers[s];
        let b = self.stats.nb_solid_distinct_kmers_per_bank[i].saturating_sub(a);
        let c = self.stats.nb_solid_distinct_kmers_per_bank[j].saturating_sub(a);
        (a as f64, b as f64, c as f64)
    }

    fn bray_curtis_value(&self, i: usize, j: usize) -> f64 {
        let s = self.stats.sym_index(i.min(j), i.max(j));
        let numerator = 2.0 * self.stats.bray_curtis_numerator[s] as f64;
        let denominator = (self.stats.nb_solid_kmers_per_bank[i]
            + self.stats.nb_solid_kmers_per_bank[j]) as f64;
        if denominator == 0.0 {
            return 1.0;
        }
        1.0 - numerator / denominator
    }

    fn fill_symmetric(&self, f: impl Fn(usize, usize) -> f64) -> Matrix {
        let n = self.stats.nb_banks;
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i + 1..n {
                let dist = f(i, j);
                matrix[i][j] = dist;
                matrix[j][i] = dist;
            }
        }
        matrix
    }

    fn fill_asymmetric(&self, f: impl Fn(usize, usize) -> f64) -> Matrix {
        let n = self.stats.nb_banks;
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i + 1..n {
                matrix[i][j] = f(i, j);
                matrix[j][i] = f(j, i);
            }
        }
        matrix
    }

    // ---- presence/absence ----

    pub fn presence_absence_jaccard(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let den = a + b + c;
            if den == 0.0 {
                return 1.0;
            }
            (b + c) / den
        })
    }

    pub fn presence_absence_sorensen_bray_curtis(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let den = 2.0 * a + b + c;
            if den == 0.0 {
                return 1.0;
            }
            (b + c) / den
        })
    }

    pub fn presence_absence_ochiai(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let den = ((a + b) * (a + c)).sqrt();
            if den == 0.0 {
                return 1.0;
            }
            1.0 - a / den
        })
    }

    pub fn presence_absence_chord_hellinger(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let den = ((a + b) * (a + c)).sqrt();
            if den == 0.0 {
                return SQRT_2;
            }
            (2.0 * (1.0 - a / den)).max(0.0).sqrt()
        })
    }

    pub fn presence_absence_whittaker(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let (ab, ac) = (a + b, a + c);
            if ab == 0.0 || ac == 0.0 {
                return 1.0;
            }
            0.5 * (b / ab + c / ac + (a / ab - a / ac).abs())
        })
    }

    pub fn presence_absence_kulczynski(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let (ab, ac) = (a + b, a + c);
            if ab == 0.0 || ac == 0.0 {
                return 1.0;
            }
            1.0 - 0.5 * (a / ab + a / ac)
        })
    }

    pub fn presence_absence_simka_jaccard(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, _, _) = self.abc(i, j);
            let den = (self.stats.nb_solid_distinct_kmers_per_bank[i]
                + self.stats.nb_solid_distinct_kmers_per_bank[j]) as f64;
            if den == 0.0 {
                return 1.0;
            }
            1.0 - 2.0 * a / den
        })
    }

    pub fn presence_absence_simka_jaccard_asym(&self) -> Matrix {
        self.fill_asymmetric(|i, j| {
            let (a, _, _) = self.abc(i, j);
            let den = self.stats.nb_solid_distinct_kmers_per_bank[i] as f64;
            if den == 0.0 {
                return 1.0;
            }
            1.0 - a / den
        })
    }

    // ---- abundance ----

    pub fn abundance_bray_curtis(&self) -> Matrix {
        self.fill_symmetric(|i, j| self.bray_curtis_value(i, j))
    }

    /// Derived from Bray–Curtis so J = 2·BC/(1+BC) holds exactly.
    pub fn abundance_jaccard(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let bc = self.bray_curtis_value(i, j);
            2.0 * bc / (1.0 + bc)
        })
    }

    pub fn abundance_simka_jaccard(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let a1 = self.stats.matrix_nb_shared_kmers[i][j] as f64;
            let b1 = self.stats.matrix_nb_shared_kmers[j][i] as f64;
            let den = (self.stats.nb_solid_kmers_per_bank[i]
                + self.stats.nb_solid_kmers_per_bank[j]) as f64;
            if den == 0.0 {
                return 1.0;
            }
            1.0 - (a1 + b1) / den
        })
    }

    pub fn abundance_simka_jaccard_asym(&self) -> Matrix {
        self.fill_asymmetric(|i, j| {
            let a1 = self.stats.matrix_nb_shared_kmers[i][j] as f64;
            let den = self.stats.nb_solid_kmers_per_bank[i] as f64;
            if den == 0.0 {
                return 1.0;
            }
            1.0 - a1 / den
        })
    }

    pub fn abundance_ochiai(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let a1 = self.stats.matrix_nb_shared_kmers[i][j] as f64;
            let b1 = self.stats.matrix_nb_shared_kmers[j][i] as f64;
            let a0 = self.stats.nb_solid_kmers_per_bank[i] as f64;
            let b0 = self.stats.nb_solid_kmers_per_bank[j] as f64;
            if a0 == 0.0 || b0 == 0.0 {
                return 1.0;
            }
            1.0 - (a1 / a0).sqrt() * (b1 / b0).sqrt()
        })
    }

    pub fn abundance_sorensen(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let a1 = self.stats.matrix_nb_shared_kmers[i][j] as f64;
            let b1 = self.stats.matrix_nb_shared_kmers[j][i] as f64;
            let a0 = self.stats.nb_solid_kmers_per_bank[i] as f64;
            let b0 = self.stats.nb_solid_kmers_per_bank[j] as f64;
            let den = a0 * b1 + a1 * b0;
            if den == 0.0 {
                return 1.0;
            }
            1.0 - 2.0 * a1 * b1 / den
        })
    }

    pub fn abundance_chord(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let den = self.stats.chord_sqrt_n2[i] * self.stats.chord_sqrt_n2[j];
            if den == 0.0 {
                return SQRT_2;
            }
            let ni_nj = self.stats.chord_ni_nj[i.min(j)][i.max(j)];
            (2.0 - 2.0 * ni_nj / den).max(0.0).sqrt()
        })
    }

    pub fn abundance_hellinger(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let a0 = self.stats.nb_solid_kmers_per_bank[i] as f64;
            let b0 = self.stats.nb_solid_kmers_per_bank[j] as f64;
            let den = a0.sqrt() * b0.sqrt();
            if den == 0.0 {
                return SQRT_2;
            }
            let sqrt_ni_nj = self.stats.hellinger_sqrt_ni_nj[i.min(j)][i.max(j)];
            (2.0 - 2.0 * sqrt_ni_nj / den).max(0.0).sqrt()
        })
    }

    pub fn abundance_kulczynski(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let a0 = self.stats.nb_solid_kmers_per_bank[i] as f64;
            let b0 = self.stats.nb_solid_kmers_per_bank[j] as f64;
            let den = a0 * b0;
            if den == 0.0 {
                return 1.0;
            }
            let min_ni_nj = self.stats.kulczynski_min_ni_nj[i.min(j)][i.max(j)] as f64;
            1.0 - 0.5 * (a0 + b0) * min_ni_nj / den
        })
    }

    pub fn abundance_whittaker(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let a0 = self.stats.nb_solid_kmers_per_bank[i] as f64;
            let b0 = self.stats.nb_solid_kmers_per_bank[j] as f64;
            let den = a0 * b0;
            if den == 0.0 {
                return 1.0;
            }
            0.5 * self.stats.whittaker_min_ni_nj[i.min(j)][i.max(j)] / den
        })
    }

    pub fn abundance_jensen_shannon(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let kl = self.stats.kullback_leibler[i.min(j)][i.max(j)];
            (0.5 * kl).max(0.0).sqrt()
        })
    }

    pub fn abundance_canberra(&self) -> Matrix {
        self.fill_symmetric(|i, j| {
            let (a, b, c) = self.abc(i, j);
            let den = a + b + c;
            if den == 0.0 {
                return 1.0;
            }
            self.stats.canberra[i.min(j)][i.max(j)] / den
        })
    }

    /// Write every enabled matrix as a gzipped semicolon-separated CSV.
    pub fn output_matrices(&self, out_dir: &Path, bank_names: &[String]) -> Result<()> {
        let mut matrices: Vec<(&str, Matrix)> = vec![
            ("mat_presenceAbsence_chord", self.presence_absence_chord_hellinger()),
            ("mat_presenceAbsence_whittaker", self.presence_absence_whittaker()),
            ("mat_presenceAbsence_kulczynski", self.presence_absence_kulczynski()),
            ("mat_presenceAbsence_braycurtis", self.presence_absence_sorensen_bray_curtis()),
            ("mat_presenceAbsence_jaccard", self.presence_absence_jaccard()),
            ("mat_presenceAbsence_simka-jaccard", self.presence_absence_simka_jaccard()),
            ("mat_presenceAbsence_simka-jaccard_asym", self.presence_absence_simka_jaccard_asym()),
            ("mat_presenceAbsence_ochiai", self.presence_absence_ochiai()),
            ("mat_abundance_simka-jaccard", self.abundance_simka_jaccard()),
            ("mat_abundance_simka-jaccard_asym", self.abundance_simka_jaccard_asym()),
            ("mat_abundance_ab-ochiai", self.abundance_ochiai()),
            ("mat_abundance_ab-sorensen", self.abundance_sorensen()),
            ("mat_abundance_ab-jaccard", self.abundance_jaccard()),
            ("mat_abundance_braycurtis", self.abundance_bray_curtis()),
        ];

        if self.stats.compute_simple_distances {
            matrices.push(("mat_abundance_chord", self.abundance_chord()));
            matrices.push(("mat_abundance_hellinger", self.abundance_hellinger()));
            matrices.push(("mat_abundance_kulczynski", self.abundance_kulczynski()));
        }

        if self.stats.compute_complex_distances {
            matrices.push(("mat_abundance_whittaker", self.abundance_whittaker()));
            matrices.push(("mat_abundance_jensenshannon", self.abundance_jensen_shannon()));
            matrices.push(("mat_abundance_canberra", self.abundance_canberra()));
        }

        for (name, matrix) in &matrices {
            dump_matrix(out_dir, name, bank_names, matrix)?;
        }
        info!("Wrote {} distance matrices.", matrices.len());

        Ok(())
    }
}

/// One matrix as `<out_dir>/<tag>.csv.gz`: header row `;name_1;…;name_N`,
/// then one `name_i;v_1;…;v_N` row per dataset, cells with six fractional
/// digits.
fn dump_matrix(
    out_dir: &Path,
    tag: &str,
    bank_names: &[String],
    matrix: &Matrix,
) -> Result<()> {
    let path = out_dir.join(format!("{}.csv.gz", tag));
    let file = File::create(&path)?;
    let mut out = GzEncoder::new(BufWriter::new(file), Compression::default());

    let mut header = String::new();
    for name in bank_names {
        header.push(';');
        header.push_str(name);
    }
    writeln!(out, "{}", header)?;

    for (i, row) in matrix.iter().enumerate() {
        let mut line = bank_names[i].clone();
        for value in row {
            line.push(';');
            line.push_str(&format!("{:.6}", value));
        }
        writeln!(out, "{}", line)?;
    }

    out.finish()?.flush()?;
    Ok(())
}
