//! Direct-mapped translation caches for the three kinds of memory accesses.

use log::debug;

use super::mmu::AccessType;
use crate::bus::MemoryRange;

/// Number of entries in each table.
pub const TLB_SIZE: usize = 256;

/// log2 of the page size.
pub const PAGE_SHIFT: u32 = 12;

const PAGE_MASK: u32 = (1 << PAGE_SHIFT) - 1;

const_assert!(TLB_SIZE.is_power_of_two());

/// A cached translation of a single virtual page to a page of main memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TlbEntry {
    /// Page-aligned virtual address.
    tag: u32,
    /// Page-aligned physical address.
    physical_page: u32,
    /// The memory range the physical page lies in.
    range: MemoryRange,
}

type Table = Box<[Option<TlbEntry>; TLB_SIZE]>;

/// Caches translations to main memory, one table per [`AccessType`].
///
/// Only translations to [`RangeKind::Memory`](crate::bus::RangeKind::Memory) ranges are cached,
/// accesses to I/O ranges always go through a full translation and [`Bus::find_range`].
///
/// [`Bus::find_range`]: crate::bus::Bus::find_range
#[derive(Debug, Clone)]
pub struct Tlb {
    fetch: Table,
    load: Table,
    store: Table,
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlb {
    pub fn new() -> Self {
        Self {
            fetch: Box::new([None; TLB_SIZE]),
            load: Box::new([None; TLB_SIZE]),
            store: Box::new([None; TLB_SIZE]),
        }
    }

    /// Returns the cached physical address and memory range for `virtual_address`, if any.
    ///
    /// Entries whose range does not contain the full physical address (i.e. the page only
    /// partially overlaps main memory) are treated as misses.
    pub fn lookup(&self, virtual_address: u32, access: AccessType) -> Option<(u32, MemoryRange)> {
        let entry = self.table(access)[index(virtual_address)]?;
        if entry.tag != virtual_address & !PAGE_MASK {
            return None;
        }
        let physical_address = entry.physical_page | virtual_address & PAGE_MASK;
        entry
            .range
            .range
            .contains(physical_address)
            .then_some((physical_address, entry.range))
    }

    /// Cache the translation of `virtual_address` to `physical_address`, which lies in `range`.
    ///
    /// Translations to I/O ranges are ignored.
    pub fn insert(
        &mut self,
        virtual_address: u32,
        physical_address: u32,
        range: MemoryRange,
        access: AccessType,
    ) {
        if !range.is_memory() {
            return;
        }
        self.table_mut(access)[index(virtual_address)] = Some(TlbEntry {
            tag: virtual_address & !PAGE_MASK,
            physical_page: physical_address & !PAGE_MASK,
            range,
        });
    }

    /// Invalidate every entry of every table.
    pub fn flush(&mut self) {
        debug!("Flushing TLB");
        for table in [&mut self.fetch, &mut self.load, &mut self.store] {
            table.fill(None);
        }
    }

    fn table(&self, access: AccessType) -> &Table {
        match access {
            AccessType::Fetch => &self.fetch,
            AccessType::Load => &self.load,
            AccessType::Store => &self.store,
        }
    }

    fn table_mut(&mut self, access: AccessType) -> &mut Table {
        match access {
            AccessType::Fetch => &mut self.fetch,
            AccessType::Load => &mut self.load,
            AccessType::Store => &mut self.store,
        }
    }
}

fn index(virtual_address: u32) -> usize {
    (virtual_address >> PAGE_SHIFT) as usize & (TLB_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_range;
    use crate::bus::{DeviceId, RangeKind};

    fn range(kind: RangeKind) -> MemoryRange {
        MemoryRange {
            device: DeviceId(0),
            range: address_range![0x8000_0000, 0x8000_FFFF],
            kind,
        }
    }

    #[test]
    fn test_lookup() {
        let mut tlb = Tlb::new();
        let ram = range(RangeKind::Memory);
        tlb.insert(0x0040_1234, 0x8000_3234, ram, AccessType::Load);
        assert_eq!(
            Some((0x8000_3FFC, ram)),
            tlb.lookup(0x0040_1FFC, AccessType::Load)
        );
        // Other tables are not affected.
        assert_eq!(None, tlb.lookup(0x0040_1FFC, AccessType::Store));
        // Same index, other tag.
        assert_eq!(None, tlb.lookup(0x0050_1000, AccessType::Load));

        tlb.flush();
        assert_eq!(None, tlb.lookup(0x0040_1234, AccessType::Load));
    }

    #[test]
    fn test_io_is_not_cached() {
        let mut tlb = Tlb::new();
        tlb.insert(0x1000, 0x8000_1000, range(RangeKind::Io), AccessType::Fetch);
        assert_eq!(None, tlb.lookup(0x1000, AccessType::Fetch));
    }

    #[test]
    fn test_partial_page() {
        let mut tlb = Tlb::new();
        let ram = MemoryRange {
            device: DeviceId(0),
            range: address_range![0x8000_0000, 0x8000_07FF],
            kind: RangeKind::Memory,
        };
        tlb.insert(0x2000, 0x8000_0000, ram, AccessType::Store);
        assert!(tlb.lookup(0x2400, AccessType::Store).is_some());
        assert_eq!(None, tlb.lookup(0x2800, AccessType::Store));
    }
}
