//! Defines the interface through which the core reaches physical memory and devices.

use crate::AddressRange;
use std::fmt::Debug;

/// Identifies a device attached to a [`Bus`]. The numbering is up to the bus implementation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DeviceId(pub usize);

/// Whether a mapped region behaves like plain memory or like a device with side effects.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RangeKind {
    /// Main memory: accesses have no side effects other than reading or writing the stored bytes,
    /// so translations to it may be cached and instructions may be fetched from it.
    Memory,
    /// Memory-mapped I/O: every access must reach the device exactly once.
    Io,
}

/// A mapped region of the physical address space, as returned by [`Bus::find_range`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryRange {
    pub device: DeviceId,
    pub range: AddressRange,
    pub kind: RangeKind,
}

impl MemoryRange {
    pub fn is_memory(&self) -> bool {
        self.kind == RangeKind::Memory
    }

    /// Returns the offset of `address` within this range.
    ///
    /// `address` must be contained in the range.
    pub fn offset_of(&self, address: u32) -> u32 {
        debug_assert!(self.range.contains(address));
        address - self.range.start()
    }
}

/// Size of a single bus access, encoded as the base-two logarithm of its byte count.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AccessSize {
    Byte = 0,
    Halfword = 1,
    Word = 2,
}

impl AccessSize {
    /// Returns `log2` of the number of bytes accessed (`0..=2`).
    pub fn log2(self) -> u8 {
        self as u8
    }

    /// Returns the number of bytes accessed.
    pub fn len(self) -> u32 {
        1 << self.log2()
    }

    /// Returns a mask with the low `8 * self.len()` bits set.
    pub fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Halfword => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
        }
    }
}

/// The physical address space as seen from the core.
///
/// The core never caches anything for [`RangeKind::Io`] ranges, so every `read`/`write` on such a
/// range corresponds to exactly one guest access. For [`RangeKind::Memory`] ranges, the core keeps
/// the returned [`MemoryRange`] around in its TLBs and accesses it directly through
/// [`read`](Self::read)/[`write`](Self::write) until the next TLB flush. Implementors must
/// therefore keep a range's device and bounds stable while the core may still refer to it.
///
/// All values are little-endian and zero-extended to 32 bits. Accesses never fail: there is no way
/// for a device to signal a bus error to the core.
pub trait Bus: Debug {
    /// Returns the mapped region containing the physical `address`, or `None` if it is unmapped.
    fn find_range(&self, address: u32) -> Option<MemoryRange>;

    /// Read `size` bytes at `offset` within `range`.
    ///
    /// The access is guaranteed to be naturally aligned, but not to lie fully within `range`.
    fn read(&mut self, range: &MemoryRange, offset: u32, size: AccessSize) -> u32;

    /// Write the low `size` bytes of `value` at `offset` within `range`.
    ///
    /// The access is guaranteed to be naturally aligned, but not to lie fully within `range`.
    fn write(&mut self, range: &MemoryRange, offset: u32, value: u32, size: AccessSize);

    /// Notify the owner of `range` that the memory at `offset` was modified by the core.
    fn mark_dirty(&mut self, range: &MemoryRange, offset: u32);

    /// Read from a physical address.
    ///
    /// Unmapped addresses read as zero.
    fn load(&mut self, address: u32, size: AccessSize) -> u32 {
        match self.find_range(address) {
            Some(range) => {
                let offset = range.offset_of(address);
                self.read(&range, offset, size)
            }
            None => 0,
        }
    }

    /// Write to a physical address, marking memory dirty where needed.
    ///
    /// Writes to unmapped addresses are ignored.
    fn store(&mut self, address: u32, value: u32, size: AccessSize) {
        if let Some(range) = self.find_range(address) {
            let offset = range.offset_of(address);
            self.write(&range, offset, value, size);
            if range.is_memory() {
                self.mark_dirty(&range, offset);
            }
        }
    }
}
