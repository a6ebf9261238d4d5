//! Minimiser derivation for canonical k-mer tokens.
//!
//! K-mers arrive from the upstream counter as opaque 2-bit packed canonical
//! tokens (A=0, C=1, G=2, T=3, first base in the high bits). The minimiser of
//! a token is the smallest m-base sub-word value over all k−m+1 windows. It
//! is only used as a lossy grouping key for the χ² selection, so the plain
//! packed value is compared directly.

#[derive(Clone, Copy, Debug)]
pub struct MinimizerModel {
    kmer_size: usize,
    minimizer_size: usize,
}

impl MinimizerModel {
    /// `minimizer_size` must not exceed `kmer_size`; both fit a u64 token.
    pub fn new(kmer_size: usize, minimizer_size: usize) -> Self {
        assert!(minimizer_size > 0 && minimizer_size <= kmer_size);
        assert!(kmer_size <= 32);

        MinimizerModel {
            kmer_size,
            minimizer_size,
        }
    }

    /// Minimum m-mer value over every window of the token.
    pub fn minimizer(&self, kmer: u64) -> u64 {
        let mask = if self.minimizer_size == 32 {
            u64::MAX
        } else {
            (1u64 << (2 * self.minimizer_size)) - 1
        };

        let mut min = u64::MAX;
        for shift in 0..=(self.kmer_size - self.minimizer_size) {
            let mmer = (kmer >> (2 * shift)) & mask;
            if mmer < min {
                min = mmer;
            }
        }

        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2-bit pack a DNA string, first base in the high bits.
    fn pack(seq: &[u8]) -> u64 {
        let mut v = 0u64;
        for &b in seq {
            v <<= 2;
            v |= match b {
                b'A' => 0,
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                _ => unreachable!(),
            };
        }
        v
    }

    #[test]
    fn test_homopolymer() {
        let model = MinimizerModel::new(8, 4);
        assert_eq!(model.minimizer(pack(b"AAAAAAAA")), 0);
        assert_eq!(model.minimizer(pack(b"TTTTTTTT")), pack(b"TTTT"));
    }

    #[test]
    fn test_picks_smallest_window() {
        let model = MinimizerModel::new(8, 4);
        // Windows of TTTTAACC include AACC = 0b00000101.
        assert_eq!(model.minimizer(pack(b"TTTTAACC")), pack(b"AACC"));
        // The A-run in the middle wins over both ends.
        assert_eq!(model.minimizer(pack(b"GGAAAAGG")), pack(b"AAAA"));
    }

    #[test]
    fn test_minimizer_equals_kmer_when_sizes_match() {
        let model = MinimizerModel::new(4, 4);
        let kmer = pack(b"GATC");
        assert_eq!(model.minimizer(kmer), kmer);
    }

    #[test]
    fn test_shared_minimizer_groups_kmers() {
        let model = MinimizerModel::new(8, 4);
        // Both tokens contain the window AAAA, the smallest possible m-mer.
        assert_eq!(
            model.minimizer(pack(b"CCAAAATT")),
            model.minimizer(pack(b"GGGAAAAC"))
        );
    }
}
