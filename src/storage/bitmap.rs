//! BitContainer - the sparse bit set behind a single row
//!
//! Column ids are stored as absolute `u64` values in a roaring treemap, so
//! rows coming from different shards can be combined without translation.

use crate::storage::error::{StorageError, StorageResult};
use roaring::RoaringTreemap;
use std::io::Read;

/// Sparse set of column ids for one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitContainer {
    bits: RoaringTreemap,
}

impl BitContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a container from an iterator of column ids
    pub fn from_bits(bits: impl IntoIterator<Item = u64>) -> Self {
        Self {
            bits: bits.into_iter().collect(),
        }
    }

    /// Set a column, returning true if it was previously unset
    pub fn set(&mut self, column_id: u64) -> bool {
        self.bits.insert(column_id)
    }

    /// Clear a column, returning true if it was previously set
    pub fn clear(&mut self, column_id: u64) -> bool {
        self.bits.remove(column_id)
    }

    /// Check whether a column is set
    pub fn contains(&self, column_id: u64) -> bool {
        self.bits.contains(column_id)
    }

    /// Number of set columns
    pub fn count(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// All set columns in ascending order
    pub fn bits(&self) -> Vec<u64> {
        self.bits.iter().collect()
    }

    /// Iterate set columns in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.bits.iter()
    }

    /// Highest set column
    pub fn max(&self) -> Option<u64> {
        self.bits.max()
    }

    pub fn union(&self, other: &BitContainer) -> BitContainer {
        Self {
            bits: &self.bits | &other.bits,
        }
    }

    pub fn intersect(&self, other: &BitContainer) -> BitContainer {
        Self {
            bits: &self.bits & &other.bits,
        }
    }

    pub fn difference(&self, other: &BitContainer) -> BitContainer {
        Self {
            bits: &self.bits - &other.bits,
        }
    }

    pub fn xor(&self, other: &BitContainer) -> BitContainer {
        Self {
            bits: &self.bits ^ &other.bits,
        }
    }

    /// Merge another container into this one
    pub fn union_in_place(&mut self, other: &BitContainer) {
        self.bits |= &other.bits;
    }

    /// Cardinality of the intersection without materializing it
    pub fn intersection_count(&self, other: &BitContainer) -> u64 {
        (&self.bits & &other.bits).len()
    }

    /// Serialize in the portable roaring format
    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) -> StorageResult<()> {
        self.bits.serialize_into(buf)?;
        Ok(())
    }

    /// Deserialize from the portable roaring format
    pub(crate) fn read_from(reader: impl Read) -> StorageResult<Self> {
        let bits = RoaringTreemap::deserialize_from(reader)
            .map_err(|e| StorageError::Corruption(format!("Invalid row bitmap: {}", e)))?;
        Ok(Self { bits })
    }
}

impl FromIterator<u64> for BitContainer {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self::from_bits(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear_report_changes() {
        let mut row = BitContainer::new();

        assert!(row.set(10));
        assert!(!row.set(10));
        assert!(row.contains(10));
        assert_eq!(row.count(), 1);

        assert!(row.clear(10));
        assert!(!row.clear(10));
        assert!(row.is_empty());
    }

    #[test]
    fn test_bits_are_sorted_and_deduplicated() {
        let row = BitContainer::from_bits([9, 1, 5, 1, 3_000_000]);
        assert_eq!(row.bits(), vec![1, 5, 9, 3_000_000]);
        assert_eq!(row.max(), Some(3_000_000));
    }

    #[test]
    fn test_set_algebra() {
        let a = BitContainer::from_bits([1, 2, 3, 4]);
        let b = BitContainer::from_bits([3, 4, 5]);

        assert_eq!(a.union(&b).bits(), vec![1, 2, 3, 4, 5]);
        assert_eq!(a.intersect(&b).bits(), vec![3, 4]);
        assert_eq!(a.difference(&b).bits(), vec![1, 2]);
        assert_eq!(a.xor(&b).bits(), vec![1, 2, 5]);
        assert_eq!(a.intersection_count(&b), 2);

        let mut c = a.clone();
        c.union_in_place(&b);
        assert_eq!(c.count(), 5);
    }

    #[test]
    fn test_portable_encoding() {
        let row = BitContainer::from_bits([0, 65_536, (1 << 20) + 7, 1 << 40]);
        let mut buf = Vec::new();
        row.write_to(&mut buf).unwrap();

        let restored = BitContainer::read_from(&buf[..]).unwrap();
        assert_eq!(restored, row);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = BitContainer::read_from(&[0xFFu8, 0xFF, 0xFF][..]);
        assert!(matches!(result, Err(StorageError::Corruption(_))));
    }
}
