//! Record selection: row ranges and worker partitions.
//!
//! Parallelism comes from running several engine instances, each owning a
//! contiguous, non-overlapping slice of the records and its own manifest.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rendermill_job_model::RawRecord;

use crate::StoreError;

/// Inclusive, 1-based row range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl RowRange {
    pub fn contains(&self, row: usize) -> bool {
        self.start.map_or(true, |s| row >= s) && self.end.map_or(true, |e| row <= e)
    }
}

/// The `index`-th (1-based) of `count` disjoint slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub count: usize,
}

impl Partition {
    pub fn new(index: usize, count: usize) -> Option<Self> {
        (count >= 1 && index >= 1 && index <= count).then_some(Self { index, count })
    }

    /// Bounds of this slice within `len` items.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let start = len * (self.index - 1) / self.count;
        let end = len * self.index / self.count;
        (start, end)
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let (start, end) = self.bounds(items.len());
        &items[start..end]
    }

    /// Per-partition manifest path: `manifest.json` becomes
    /// `manifest.part-2-of-4.json`.
    pub fn manifest_path(&self, base: &Path) -> PathBuf {
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest".to_string());
        let name = match base.extension() {
            Some(ext) => format!(
                "{stem}.part-{}-of-{}.{}",
                self.index,
                self.count,
                ext.to_string_lossy()
            ),
            None => format!("{stem}.part-{}-of-{}", self.index, self.count),
        };
        base.with_file_name(name)
    }
}

impl FromStr for Partition {
    type Err = StoreError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidPartition {
            spec: spec.to_string(),
        };
        let (k, n) = spec.split_once('/').ok_or_else(invalid)?;
        let index = k.trim().parse::<usize>().map_err(|_| invalid())?;
        let count = n.trim().parse::<usize>().map_err(|_| invalid())?;
        Partition::new(index, count).ok_or_else(invalid)
    }
}

/// Apply a row range, then a partition, keeping input order.
pub fn select_records(
    records: &[RawRecord],
    range: RowRange,
    partition: Option<Partition>,
) -> Vec<RawRecord> {
    let in_range: Vec<RawRecord> = records
        .iter()
        .filter(|r| range.contains(r.row))
        .cloned()
        .collect();

    match partition {
        Some(partition) => partition.slice(&in_range).to_vec(),
        None => in_range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn records(n: usize) -> Vec<RawRecord> {
        (1..=n)
            .map(|row| RawRecord {
                id: row.to_string(),
                row,
                fields: BTreeMap::new(),
            })
            .collect()
    }

    #[test]
    fn test_parse_partition() {
        assert_eq!("2/4".parse::<Partition>().unwrap(), Partition { index: 2, count: 4 });
        assert!("0/4".parse::<Partition>().is_err());
        assert!("5/4".parse::<Partition>().is_err());
        assert!("a/b".parse::<Partition>().is_err());
        assert!("3".parse::<Partition>().is_err());
    }

    #[test]
    fn test_manifest_path_per_partition() {
        let p = Partition { index: 2, count: 4 };
        assert_eq!(
            p.manifest_path(Path::new("/runs/manifest.json")),
            PathBuf::from("/runs/manifest.part-2-of-4.json")
        );
        assert_eq!(
            p.manifest_path(Path::new("state")),
            PathBuf::from("state.part-2-of-4")
        );
    }

    #[test]
    fn test_range_then_partition_keeps_order() {
        let selected = select_records(
            &records(10),
            RowRange {
                start: Some(3),
                end: Some(8),
            },
            Some(Partition { index: 2, count: 2 }),
        );
        let rows: Vec<usize> = selected.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![6, 7, 8]);
    }

    proptest! {
        #[test]
        fn partitions_are_disjoint_and_cover_everything(len in 0usize..200, count in 1usize..12) {
            let items: Vec<usize> = (0..len).collect();
            let mut seen = vec![];
            for index in 1..=count {
                let part = Partition::new(index, count).unwrap();
                seen.extend_from_slice(part.slice(&items));
            }
            prop_assert_eq!(seen, items);
        }

        #[test]
        fn partition_sizes_differ_by_at_most_one(len in 0usize..200, count in 1usize..12) {
            let sizes: Vec<usize> = (1..=count)
                .map(|i| {
                    let (s, e) = Partition::new(i, count).unwrap().bounds(len);
                    e - s
                })
                .collect();
            let min = sizes.iter().min().copied().unwrap_or(0);
            let max = sizes.iter().max().copied().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }
    }
}
