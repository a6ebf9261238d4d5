//! Filtered iteration over many datasets of reads.
//!
//! A dataset is a list of sub-banks (paired-end files count as separate
//! sub-banks). `MultiDatasetIterator` flattens all of them into one lazy
//! stream of reads annotated with their dataset index, applying the quality
//! filter and an optional per-dataset cap on *passing* reads. The iteration
//! is a flat state machine: advance within the sub-bank, advance to the next
//! sub-bank of the same dataset, advance to the next dataset, done.

use std::io;
use std::path::Path;

use needletail::parser::FastxReader;

use crate::error::{Result, SimkaError};
use crate::filter::SequenceFilter;

/// A read together with the index of the dataset it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedRead {
    pub dataset: usize,
    pub sequence: Vec<u8>,
}

pub struct MultiDatasetIterator<S> {
    banks: Vec<Vec<S>>,
    filter: SequenceFilter,
    max_reads: u64,
    dataset: usize,
    sub_bank: usize,
    kept: u64,
}

impl<S> MultiDatasetIterator<S>
where
    S: Iterator<Item = io::Result<Vec<u8>>>,
{
    /// `max_reads` caps the number of passing reads per dataset; 0 means
    /// unlimited.
    pub fn new(banks: Vec<Vec<S>>, filter: SequenceFilter, max_reads: u64) -> Self {
        MultiDatasetIterator {
            banks,
            filter,
            max_reads,
            dataset: 0,
            sub_bank: 0,
            kept: 0,
        }
    }

    fn next_dataset(&mut self) {
        self.dataset += 1;
        self.sub_bank = 0;
        self.kept = 0;
    }
}

impl<S> Iterator for MultiDatasetIterator<S>
where
    S: Iterator<Item = io::Result<Vec<u8>>>,
{
    type Item = Result<AnnotatedRead>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.dataset >= self.banks.len() {
                return None;
            }

            if self.max_reads != 0 && self.kept >= self.max_reads {
                // Cap reached: the remaining sub-banks of this dataset are
                // skipped entirely.
                self.next_dataset();
                continue;
            }

            let Some(bank) = self.banks[self.dataset].get_mut(self.sub_bank) else {
                self.next_dataset();
                continue;
            };

            match bank.next() {
                None => {
                    // Sub-bank exhausted; the kept count carries over.
                    self.sub_bank += 1;
                }
                Some(Err(e)) => {
                    // A read error is fatal for the whole stream.
                    self.dataset = self.banks.len();
                    return Some(Err(e.into()));
                }
                Some(Ok(sequence)) => {
                    if self.filter.accepts(&sequence) {
                        self.kept += 1;
                        return Some(Ok(AnnotatedRead {
                            dataset: self.dataset,
                            sequence,
                        }));
                    }
                }
            }
        }
    }
}

/// FASTA/FASTQ (possibly gzipped) sub-bank reader.
pub struct FastxSource {
    reader: Box<dyn FastxReader>,
}

impl Iterator for FastxSource {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next() {
            None => None,
            Some(Ok(record)) => Some(Ok(record.seq().into_owned())),
            Some(Err(e)) => Some(Err(io::Error::new(io::ErrorKind::InvalidData, e))),
        }
    }
}

pub fn open_sequence_file(path: &Path) -> Result<FastxSource> {
    let reader = needletail::parse_fastx_file(path)
        .map_err(|e| SimkaError::input_format(path, e.to_string()))?;
    Ok(FastxSource { reader })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    type VecSource = std::vec::IntoIter<io::Result<Vec<u8>>>;

    fn bank(reads: &[&str]) -> VecSource {
        reads
            .iter()
            .map(|r| Ok(r.as_bytes().to_vec()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn failing_bank(reads: &[&str]) -> VecSource {
        let mut items: Vec<io::Result<Vec<u8>>> =
            reads.iter().map(|r| Ok(r.as_bytes().to_vec())).collect();
        items.push(Err(io::Error::new(io::ErrorKind::Other, "bad record")));
        items.push(Ok(b"ACGT".to_vec()));
        items.into_iter()
    }

    fn collect_ok(it: MultiDatasetIterator<VecSource>) -> Vec<(usize, String)> {
        it.map(|r| {
            let read = r.unwrap();
            (read.dataset, String::from_utf8(read.sequence).unwrap())
        })
        .collect()
    }

    #[test]
    fn test_ordering_across_datasets_and_sub_banks() {
        let banks = vec![
            vec![bank(&["AA", "CC"]), bank(&["GG"])],
            vec![bank(&["TT"])],
        ];
        let it = MultiDatasetIterator::new(banks, SequenceFilter::default(), 0);

        assert_eq!(
            collect_ok(it),
            vec![
                (0, "AA".to_string()),
                (0, "CC".to_string()),
                (0, "GG".to_string()),
                (1, "TT".to_string()),
            ]
        );
    }

    #[test]
    fn test_cap_skips_remaining_sub_banks() {
        let banks = vec![
            vec![bank(&["AA", "CC"]), bank(&["GG", "TT"])],
            vec![bank(&["AC"])],
        ];
        let it = MultiDatasetIterator::new(banks, SequenceFilter::default(), 3);

        // Three reads from dataset 0 (the cap lands mid sub-bank 1), then
        // dataset 1 starts with a fresh count.
        assert_eq!(
            collect_ok(it),
            vec![
                (0, "AA".to_string()),
                (0, "CC".to_string()),
                (0, "GG".to_string()),
                (1, "AC".to_string()),
            ]
        );
    }

    #[test]
    fn test_only_passing_reads_count_toward_cap() {
        // Length filter drops the short reads; the cap of 2 applies to the
        // survivors only.
        let banks = vec![vec![bank(&["A", "ACGT", "C", "CCGG", "GGTT", "TTAA"])]];
        let filter = SequenceFilter::new(4, 0.0);
        let it = MultiDatasetIterator::new(banks, filter, 2);

        assert_eq!(
            collect_ok(it),
            vec![(0, "ACGT".to_string()), (0, "CCGG".to_string())]
        );
    }

    #[test]
    fn test_sub_bank_boundary_preserves_count() {
        let banks = vec![vec![bank(&["AA"]), bank(&["CC", "GG"])]];
        let it = MultiDatasetIterator::new(banks, SequenceFilter::default(), 2);

        assert_eq!(
            collect_ok(it),
            vec![(0, "AA".to_string()), (0, "CC".to_string())]
        );
    }

    #[test]
    fn test_read_error_is_fatal() {
        let banks = vec![vec![failing_bank(&["AA"])], vec![bank(&["CC"])]];
        let mut it = MultiDatasetIterator::new(banks, SequenceFilter::default(), 0);

        assert!(it.next().unwrap().is_ok());
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_empty_datasets_are_skipped() {
        let banks = vec![vec![bank(&[])], vec![bank(&["AA"])], vec![]];
        let it = MultiDatasetIterator::new(banks, SequenceFilter::default(), 0);

        assert_eq!(collect_ok(it), vec![(1, "AA".to_string())]);
    }

    #[test]
    fn test_fastx_source_reads_fasta() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.fa");
        let mut file = File::create(&path).unwrap();
        file.write_all(b">r1\nACGTACGT\n>r2\nTTTT\n").unwrap();

        let source = open_sequence_file(&path).unwrap();
        let reads: Vec<Vec<u8>> = source.map(|r| r.unwrap()).collect();
        assert_eq!(reads, vec![b"ACGTACGT".to_vec(), b"TTTT".to_vec()]);
    }
}
