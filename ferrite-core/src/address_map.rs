use crate::AddressRange;
use std::cmp::Ordering;
use thiserror::Error;

/// Generic map of 32-bit address ranges to values of type `T`.
///
/// The ranges cannot overlap. Lookups are a binary search over the ranges ordered by start
/// address.
#[derive(Debug)]
pub struct AddressMap<T> {
    ordered_ranges: Vec<(AddressRange, T)>,
}

impl<T> Default for AddressMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AddressMap<T> {
    /// Create new empty map.
    pub fn new() -> Self {
        Self {
            ordered_ranges: Vec::new(),
        }
    }

    /// Map `range` to `value`.
    ///
    /// Fails without modifying the map if `range` overlaps with a range that is already mapped.
    pub fn insert(&mut self, range: AddressRange, value: T) -> Result<(), AddressMapError> {
        let index = self
            .ordered_ranges
            .partition_point(|(other, _)| other.start() < range.start());
        let overlaps_prev = index
            .checked_sub(1)
            .map(|i| self.ordered_ranges[i].0.overlaps(range))
            .unwrap_or(false);
        let overlaps_next = self
            .ordered_ranges
            .get(index)
            .map(|(other, _)| other.overlaps(range))
            .unwrap_or(false);
        if overlaps_prev || overlaps_next {
            return Err(AddressMapError::OverlappingAddressRanges(range));
        }
        self.ordered_ranges.insert(index, (range, value));
        Ok(())
    }

    /// Returns the value that the address range containing `address` maps to, or `None` if
    /// `address` is in a vacant region.
    pub fn value(&self, address: u32) -> Option<&T> {
        self.range_value(address).map(|(_, value)| value)
    }

    /// Returns the mapped address range that contains `address`, together with its value, or
    /// `None` if `address` is in a vacant region.
    pub fn range_value(&self, address: u32) -> Option<(AddressRange, &T)> {
        self.ordered_ranges
            .binary_search_by(|(range, _)| {
                if address < range.start() {
                    Ordering::Greater
                } else if address <= range.end() {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            })
            .ok()
            .map(|index| {
                let (range, value) = &self.ordered_ranges[index];
                (*range, value)
            })
    }

    /// Iterate over all mapped ranges in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (AddressRange, &T)> {
        self.ordered_ranges.iter().map(|(range, value)| (*range, value))
    }
}

impl<T> TryFrom<Vec<(AddressRange, T)>> for AddressMap<T> {
    type Error = AddressMapError;

    fn try_from(mut value: Vec<(AddressRange, T)>) -> Result<Self, Self::Error> {
        value.sort_by_key(|(range, _)| range.start());

        let mut iter = value.iter();
        if let Some((mut prev_range, _)) = iter.next() {
            for &(range, _) in iter {
                if range.start() <= prev_range.end() {
                    return Err(AddressMapError::OverlappingAddressRanges(range));
                }
                prev_range = range;
            }
        }

        Ok(Self {
            ordered_ranges: value,
        })
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AddressMapError {
    /// Attempt to add an address range that overlaps with a previously added address range.
    #[error("address range {0} overlaps with previously added address range")]
    OverlappingAddressRanges(AddressRange),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_range;

    #[test]
    fn test_lookup() {
        let map = AddressMap::try_from(vec![
            (address_range![0x8000_0000, 0x8FFF_FFFF], "ram"),
            (address_range![0x1000, 0x1FFF], "rom"),
            (address_range![0x1000_0000, 0x1000_0007], "uart"),
        ])
        .unwrap();
        assert_eq!(Some(&"rom"), map.value(0x1000));
        assert_eq!(Some(&"rom"), map.value(0x1FFF));
        assert_eq!(None, map.value(0x2000));
        assert_eq!(Some(&"uart"), map.value(0x1000_0004));
        assert_eq!(Some(&"ram"), map.value(0x8123_4567));
        assert_eq!(None, map.value(0));
        assert_eq!(None, map.value(u32::MAX));
    }

    #[test]
    fn test_insert_rejects_overlap() {
        let mut map = AddressMap::new();
        map.insert(address_range![0x100, 0x1FF], 1).unwrap();
        map.insert(address_range![0x300, 0x3FF], 3).unwrap();
        assert!(map.insert(address_range![0x180, 0x27F], 2).is_err());
        assert!(map.insert(address_range![0x280, 0x300], 2).is_err());
        map.insert(address_range![0x200, 0x2FF], 2).unwrap();
        let values: Vec<_> = map.iter().map(|(_, value)| *value).collect();
        assert_eq!(vec![1, 2, 3], values);
        assert_eq!(
            Some((address_range![0x200, 0x2FF], &2)),
            map.range_value(0x2AB)
        );
    }

    #[test]
    fn test_try_from_rejects_overlap() {
        let result = AddressMap::try_from(vec![
            (address_range![0x0, 0x10], ()),
            (address_range![0x10, 0x20], ()),
        ]);
        assert!(result.is_err());
    }
}
