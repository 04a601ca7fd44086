//! Host-target interface used by `riscv-tests` to report results.

use ferrite_core::bus::AccessSize;
use ferrite_core::memory_map::Device;

/// Size of the HTIF window: `tohost` at offset 0, `fromhost` at offset 0x40.
pub const LEN: u32 = 0x48;

const FROMHOST_OFFSET: u32 = 0x40;

/// The two 64-bit HTIF mailboxes, as memory-mapped I/O.
#[derive(Debug, Default)]
pub struct Htif {
    tohost: u64,
    fromhost: u64,
}

impl Htif {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value last written to `tohost` by the guest.
    pub fn tohost(&self) -> u64 {
        self.tohost
    }

    /// Returns the mailbox containing `offset`, and the byte offset within it.
    fn register(&mut self, offset: u32) -> Option<(&mut u64, u32)> {
        match offset {
            0..=7 => Some((&mut self.tohost, offset)),
            FROMHOST_OFFSET..=0x47 => Some((&mut self.fromhost, offset - FROMHOST_OFFSET)),
            _ => None,
        }
    }
}

impl Device for Htif {
    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        match self.register(offset) {
            Some((register, byte)) => (*register >> (8 * byte)) as u32 & size.mask(),
            None => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32, size: AccessSize) {
        if let Some((register, byte)) = self.register(offset) {
            let mask = (size.mask() as u64) << (8 * byte);
            *register = *register & !mask | ((value as u64) << (8 * byte)) & mask;
        }
    }
}
