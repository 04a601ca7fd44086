use crate::bus::{AccessSize, RangeKind};
use crate::memory_map::Device;
use bitvec::prelude::*;

/// Number of bytes tracked by a single dirty bit.
pub const DIRTY_PAGE_SIZE: u32 = 4096;

/// Byte-based RAM that remembers which pages were written to by the core.
///
/// This can be categorized as *main memory* according to the types of memory resources defined by
/// the RISC-V spec, so the core is free to cache translations to it and fetch instructions from it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ram {
    data: Vec<u8>,
    dirty: BitVec,
}

impl Ram {
    /// Create a new zero-initialized RAM resource that can hold `size` bytes.
    pub fn new(size: u32) -> Self {
        let pages = size.div_ceil(DIRTY_PAGE_SIZE) as usize;
        Self {
            data: vec![0; size as usize],
            dirty: bitvec![0; pages],
        }
    }

    /// Returns the size expressed in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite RAM contents starting at `offset`. Bytes beyond the end are ignored.
    ///
    /// This is a host-side access, so it does not mark anything dirty.
    pub fn load_image(&mut self, offset: u32, image: &[u8]) {
        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(image.len()).min(self.data.len());
        self.data[start..end].copy_from_slice(&image[..end - start]);
    }

    /// Returns the indices of all pages marked dirty since the last [`clear_dirty`].
    ///
    /// [`clear_dirty`]: Self::clear_dirty
    pub fn dirty_pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.dirty.iter_ones()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.fill(false);
    }
}

impl Device for Ram {
    fn kind(&self) -> RangeKind {
        RangeKind::Memory
    }

    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        (0..size.len())
            .map(|i| {
                let byte = offset
                    .checked_add(i)
                    .and_then(|address| self.data.get(address as usize))
                    .copied()
                    .unwrap_or(0);
                (byte as u32) << (8 * i)
            })
            .fold(0, |value, byte| value | byte)
    }

    fn write(&mut self, offset: u32, value: u32, size: AccessSize) {
        for i in 0..size.len() {
            let Some(address) = offset.checked_add(i) else {
                break;
            };
            if let Some(byte) = self.data.get_mut(address as usize) {
                *byte = (value >> (8 * i)) as u8;
            }
        }
    }

    fn mark_dirty(&mut self, offset: u32) {
        if let Some(mut page) = self.dirty.get_mut((offset / DIRTY_PAGE_SIZE) as usize) {
            *page = true;
        }
    }
}
