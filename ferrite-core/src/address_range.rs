use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::RangeInclusive;
use thiserror::Error;

/// A non-empty range in the 32-bit physical address space, bounded inclusively below and above.
///
/// Enforces the invariant that `self.start() <= self.end()`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AddressRange {
    start: u32,
    end: u32,
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

impl AddressRange {
    pub fn new(start: u32, end: u32) -> Result<Self, InvalidBoundsError> {
        (start <= end)
            .then_some(Self { start, end })
            .ok_or(InvalidBoundsError { start, end })
    }

    /// Create the range of `len` bytes starting at `start`.
    ///
    /// Fails if `len` is zero, or if the range would extend past `u32::MAX`.
    pub fn with_len(start: u32, len: u32) -> Result<Self, InvalidBoundsError> {
        len.checked_sub(1)
            .and_then(|delta| start.checked_add(delta))
            .map(|end| Self { start, end })
            .ok_or(InvalidBoundsError {
                start,
                end: start.wrapping_add(len).wrapping_sub(1),
            })
    }

    pub fn start(self) -> u32 {
        self.start
    }

    pub fn end(self) -> u32 {
        self.end
    }

    /// Check if an address is contained within this address range.
    pub fn contains(self, address: u32) -> bool {
        self.start <= address && address <= self.end
    }

    /// Returns `true` if both ranges share at least one address.
    pub fn overlaps(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Returns `self.end() - self.start()`, which is the size minus 1.
    ///
    /// This value is always within the range `0..=u32::MAX`.
    pub fn delta(self) -> u32 {
        self.end - self.start
    }

    /// Returns the size of this address range in bytes, as a `u64` so the full address space can
    /// be represented.
    pub fn size(self) -> u64 {
        self.delta() as u64 + 1
    }
}

impl TryFrom<RangeInclusive<u32>> for AddressRange {
    type Error = InvalidBoundsError;

    fn try_from(value: RangeInclusive<u32>) -> Result<Self, Self::Error> {
        Self::new(*value.start(), *value.end())
    }
}

impl From<AddressRange> for RangeInclusive<u32> {
    fn from(value: AddressRange) -> Self {
        value.start..=value.end
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("bounds [{start:#x}, {end:#x}] do not form a valid 32-bit address range")]
pub struct InvalidBoundsError {
    start: u32,
    end: u32,
}

#[macro_export]
macro_rules! address_range {
    ($start:expr, $end:expr) => {
        $crate::address_range::AddressRange::new($start, $end).unwrap()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        assert!(AddressRange::new(5, 4).is_err());
        let range = AddressRange::new(4, 4).unwrap();
        assert_eq!(1, range.size());
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn test_with_len() {
        let range = AddressRange::with_len(0x8000_0000, 0x1000).unwrap();
        assert_eq!(0x8000_0FFF, range.end());
        assert!(AddressRange::with_len(0x1000, 0).is_err());
        assert!(AddressRange::with_len(0xFFFF_F000, 0x2000).is_err());
        let full = AddressRange::with_len(0xFFFF_F000, 0x1000).unwrap();
        assert_eq!(u32::MAX, full.end());
    }

    #[test]
    fn test_overlaps() {
        let a = address_range![0x1000, 0x1FFF];
        assert!(a.overlaps(address_range![0x1FFF, 0x2FFF]));
        assert!(!a.overlaps(address_range![0x2000, 0x2FFF]));
        assert!(a.overlaps(address_range![0x0, 0xFFFF_FFFF]));
    }

    #[test]
    fn test_full_size() {
        assert_eq!(1 << 32, address_range![0, u32::MAX].size());
        assert_eq!("[0x10, 0x1f]", address_range![0x10, 0x1F].to_string());
    }
}
