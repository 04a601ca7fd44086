//! Memory accesses as seen from the core: alignment checks, address translation through the TLB,
//! and dispatch to main memory or memory-mapped devices.

use log::debug;

use super::mmu::AccessType;
use super::{Core, Exception};
use crate::bus::{AccessSize, Bus, MemoryRange};
use crate::instruction::is_compressed;
use crate::Alignment;

fn is_aligned(address: u32, size: AccessSize) -> bool {
    match size {
        AccessSize::Byte => Alignment::BYTE,
        AccessSize::Halfword => Alignment::HALFWORD,
        AccessSize::Word => Alignment::WORD,
    }
    .is_aligned(address)
}

impl<B: Bus> Core<B> {
    /// Translate `virtual_address`, consulting the TLB first, and look up the range the physical
    /// address lies in. Translations to main memory are cached.
    fn translate_cached(
        &mut self,
        virtual_address: u32,
        access: AccessType,
    ) -> Result<(u32, Option<MemoryRange>), Exception> {
        if let Some((physical_address, range)) = self.tlb.lookup(virtual_address, access) {
            return Ok((physical_address, Some(range)));
        }
        let physical_address = self.translate(virtual_address, access)?;
        let range = self.bus.find_range(physical_address);
        if let Some(range) = range {
            self.tlb.insert(virtual_address, physical_address, range, access);
        }
        Ok((physical_address, range))
    }

    /// Load `size` bytes from `virtual_address`, zero-extended to 32 bits.
    ///
    /// Loads from unmapped physical addresses return zero.
    pub(super) fn load(
        &mut self,
        virtual_address: u32,
        size: AccessSize,
    ) -> Result<u32, Exception> {
        if !is_aligned(virtual_address, size) {
            return Err(Exception::LoadAddressMisaligned(virtual_address));
        }
        let (physical_address, range) = self.translate_cached(virtual_address, AccessType::Load)?;
        Ok(self.read_physical(physical_address, range, size))
    }

    /// Store the low `size` bytes of `value` at `virtual_address`.
    ///
    /// Stores to unmapped physical addresses are dropped.
    pub(super) fn store(
        &mut self,
        virtual_address: u32,
        value: u32,
        size: AccessSize,
    ) -> Result<(), Exception> {
        if !is_aligned(virtual_address, size) {
            return Err(Exception::StoreOrAmoAddressMisaligned(virtual_address));
        }
        let (physical_address, range) = self.translate_cached(virtual_address, AccessType::Store)?;
        self.write_physical(physical_address, range, value, size);
        Ok(())
    }

    /// Fetch the raw instruction at `pc`: a single parcel for compressed instructions, two
    /// parcels otherwise.
    ///
    /// > Instructions are stored in memory as a sequence of 16-bit little-endian parcels,
    /// > regardless of memory system endianness. Parcels forming one instruction are stored at
    /// > increasing halfword addresses, with the lowest-addressed parcel holding the
    /// > lowest-numbered bits in the instruction specification.
    ///
    /// The parcels of a 32-bit instruction are translated separately, since the instruction may
    /// straddle a page boundary.
    pub(super) fn fetch(&mut self) -> Result<u32, Exception> {
        let pc = self.registers.pc();
        if !Alignment::HALFWORD.is_aligned(pc) {
            return Err(Exception::InstructionAddressMisaligned(pc));
        }
        let low = self.fetch_parcel(pc)?;
        if is_compressed(low) {
            return Ok(low as u32);
        }
        let high = self.fetch_parcel(pc.wrapping_add(2))?;
        Ok(low as u32 | (high as u32) << 16)
    }

    /// Instructions can only be fetched from main memory.
    fn fetch_parcel(&mut self, virtual_address: u32) -> Result<u16, Exception> {
        let (physical_address, range) = self.translate_cached(virtual_address, AccessType::Fetch)?;
        match range {
            Some(range) if range.is_memory() => {
                let offset = range.offset_of(physical_address);
                Ok(self.bus.read(&range, offset, AccessSize::Halfword) as u16)
            }
            _ => Err(Exception::InstructionAccessFault(virtual_address)),
        }
    }

    /// Load a word and register a reservation on its physical address.
    pub(super) fn load_reserved(&mut self, virtual_address: u32) -> Result<u32, Exception> {
        if !Alignment::WORD.is_aligned(virtual_address) {
            return Err(Exception::LoadAddressMisaligned(virtual_address));
        }
        let (physical_address, range) = self.translate_cached(virtual_address, AccessType::Load)?;
        self.reservation = Some(physical_address);
        Ok(self.read_physical(physical_address, range, AccessSize::Word))
    }

    /// Store `value` if the reservation is held on the physical address of `virtual_address`.
    ///
    /// Returns `true` if the store was performed. The reservation is always released.
    pub(super) fn store_conditional(
        &mut self,
        virtual_address: u32,
        value: u32,
    ) -> Result<bool, Exception> {
        let reservation = self.reservation.take();
        if !Alignment::WORD.is_aligned(virtual_address) {
            return Err(Exception::StoreOrAmoAddressMisaligned(virtual_address));
        }
        let (physical_address, range) = self.translate_cached(virtual_address, AccessType::Store)?;
        if reservation != Some(physical_address) {
            return Ok(false);
        }
        self.write_physical(physical_address, range, value, AccessSize::Word);
        Ok(true)
    }

    /// Atomically replace the word at `virtual_address` with `op(old_value)`, returning the old
    /// value.
    ///
    /// The access needs store permissions, so all faults are reported as store/AMO faults.
    pub(super) fn atomic_memory_operation<F>(
        &mut self,
        virtual_address: u32,
        op: F,
    ) -> Result<u32, Exception>
    where
        F: FnOnce(u32) -> u32,
    {
        if !Alignment::WORD.is_aligned(virtual_address) {
            return Err(Exception::StoreOrAmoAddressMisaligned(virtual_address));
        }
        let (physical_address, range) = self.translate_cached(virtual_address, AccessType::Store)?;
        let old_value = self.read_physical(physical_address, range, AccessSize::Word);
        self.write_physical(physical_address, range, op(old_value), AccessSize::Word);
        Ok(old_value)
    }

    fn read_physical(
        &mut self,
        physical_address: u32,
        range: Option<MemoryRange>,
        size: AccessSize,
    ) -> u32 {
        match range {
            Some(range) => {
                let offset = range.offset_of(physical_address);
                self.bus.read(&range, offset, size)
            }
            None => {
                debug!("Load from unmapped physical address {physical_address:#010x}");
                0
            }
        }
    }

    fn write_physical(
        &mut self,
        physical_address: u32,
        range: Option<MemoryRange>,
        value: u32,
        size: AccessSize,
    ) {
        match range {
            Some(range) => {
                let offset = range.offset_of(physical_address);
                self.bus.write(&range, offset, value & size.mask(), size);
                if range.is_memory() {
                    self.bus.mark_dirty(&range, offset);
                }
            }
            None => {
                debug!("Store to unmapped physical address {physical_address:#010x}");
            }
        }
    }
}
