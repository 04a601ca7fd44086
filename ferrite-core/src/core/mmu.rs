//! Sv32 page-based virtual memory.

use bitvec::{field::BitField, order::Lsb0, view::BitView};

use super::tlb::PAGE_SHIFT;
use super::{Core, Exception};
use crate::bus::{AccessSize, Bus};
use crate::PrivilegeLevel;

/// The kind of memory access a translation is performed for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AccessType {
    Fetch,
    Load,
    /// Stores, SC and AMOs.
    Store,
}

impl AccessType {
    /// Returns the page fault raised when translating `virtual_address` fails for this access.
    pub fn page_fault(self, virtual_address: u32) -> Exception {
        match self {
            Self::Fetch => Exception::InstructionPageFault(virtual_address),
            Self::Load => Exception::LoadPageFault(virtual_address),
            Self::Store => Exception::StoreOrAmoPageFault(virtual_address),
        }
    }
}

/// Supervisor Address Translation and Protection (satp) register.
///
/// > The satp register is an SXLEN-bit read/write register, formatted as shown in Figure 4.12 for
/// > SXLEN=32, which controls supervisor-mode address translation and protection. This register
/// > holds the physical page number (PPN) of the root page table, i.e., its supervisor physical
/// > address divided by 4 KiB; an address space identifier (ASID), which facilitates
/// > address-translation fences on a per-address-space basis; and the MODE field, which selects
/// > the current address-translation scheme.
///
/// ASIDs are not implemented, so the ASID field is hardwired to zero.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Satp(u32);

impl Default for Satp {
    fn default() -> Self {
        Self::new()
    }
}

impl Satp {
    const ASID_MASK: u32 = 0x7FC0_0000;
    const MODE: usize = 31;

    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn from_raw(value: u32) -> Self {
        Self(value & !Self::ASID_MASK)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the write changed the register, in which case cached translations must
    /// be discarded.
    pub fn write(&mut self, value: u32) -> bool {
        let value = value & !Self::ASID_MASK;
        let changed = value != self.0;
        self.0 = value;
        changed
    }

    /// Returns `true` for Sv32, `false` for Bare.
    pub fn mode(&self) -> bool {
        self.0.view_bits::<Lsb0>()[Self::MODE]
    }

    /// Returns the physical page number of the root page table.
    pub fn ppn(&self) -> u32 {
        self.0.view_bits::<Lsb0>()[0..22].load_le()
    }
}

/// Page table entry bits.
mod pte {
    pub const V: u32 = 1 << 0;
    pub const R: u32 = 1 << 1;
    pub const W: u32 = 1 << 2;
    pub const X: u32 = 1 << 3;
    pub const U: u32 = 1 << 4;
    pub const A: u32 = 1 << 6;
    pub const D: u32 = 1 << 7;
}

const LEVELS: u32 = 2;
const PTE_SIZE: u32 = 4;
const VPN_BITS: u32 = 10;

impl<B: Bus> Core<B> {
    /// Translate `virtual_address` into a physical address, performing a page table walk if
    /// needed. This bypasses the TLB.
    ///
    /// > When MPRV=1, load and store memory addresses are translated and protected, and
    /// > endianness is applied, as though the current privilege mode were set to MPP. Instruction
    /// > address-translation and protection are unaffected by the setting of MPRV.
    pub(super) fn translate(
        &mut self,
        virtual_address: u32,
        access: AccessType,
    ) -> Result<u32, Exception> {
        let privilege_level = match access {
            AccessType::Load | AccessType::Store if self.status.mprv() => self.status.mpp(),
            _ => self.privilege_level,
        };
        if privilege_level == PrivilegeLevel::Machine || !self.satp.mode() {
            return Ok(virtual_address);
        }
        self.walk(virtual_address, access, privilege_level)
    }

    /// The Sv32 address translation process.
    fn walk(
        &mut self,
        virtual_address: u32,
        access: AccessType,
        privilege_level: PrivilegeLevel,
    ) -> Result<u32, Exception> {
        let fault = || access.page_fault(virtual_address);

        let mut table = self.satp.ppn() << PAGE_SHIFT;
        for level in (0..LEVELS).rev() {
            let shift = PAGE_SHIFT + VPN_BITS * level;
            let vpn = (virtual_address >> shift) & ((1 << VPN_BITS) - 1);
            let pte_address = table.wrapping_add(vpn * PTE_SIZE);
            let mut pte = self.bus.load(pte_address, AccessSize::Word);

            if pte & pte::V == 0 || (pte & pte::R == 0 && pte & pte::W != 0) {
                return Err(fault());
            }

            if pte & (pte::R | pte::X) == 0 {
                // Pointer to the next level of the page table.
                table = (pte >> 10) << PAGE_SHIFT;
                continue;
            }

            let user_page = pte & pte::U != 0;
            match privilege_level {
                PrivilegeLevel::User if !user_page => return Err(fault()),
                PrivilegeLevel::Supervisor
                    if user_page && (access == AccessType::Fetch || !self.status.sum()) =>
                {
                    return Err(fault())
                }
                _ => {}
            }

            let permitted = match access {
                AccessType::Fetch => pte & pte::X != 0,
                AccessType::Load => {
                    pte & pte::R != 0 || (self.status.mxr() && pte & pte::X != 0)
                }
                AccessType::Store => pte & pte::W != 0,
            };
            if !permitted {
                return Err(fault());
            }

            let updated = match access {
                AccessType::Store => pte | pte::A | pte::D,
                _ => pte | pte::A,
            };
            if updated != pte {
                pte = updated;
                self.bus.store(pte_address, pte, AccessSize::Word);
            }

            let offset_mask = (1 << shift) - 1;
            let physical_base = (pte >> 10) << PAGE_SHIFT;
            return Ok(physical_base & !offset_mask | virtual_address & offset_mask);
        }

        // A non-leaf entry at level 0.
        Err(fault())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satp() {
        let mut satp = Satp::new();
        assert!(satp.write(0xFFFF_FFFF));
        assert_eq!(0x803F_FFFF, satp.read());
        assert!(satp.mode());
        assert_eq!(0x3F_FFFF, satp.ppn());
        assert!(!satp.write(0x803F_FFFF));
        assert!(satp.write(0x0000_0001));
        assert!(!satp.mode());
    }

    #[test]
    fn test_page_fault_causes() {
        assert_eq!(12, AccessType::Fetch.page_fault(0).code());
        assert_eq!(13, AccessType::Load.page_fault(0).code());
        assert_eq!(15, AccessType::Store.page_fault(0x42).code());
        assert_eq!(0x42, AccessType::Store.page_fault(0x42).value());
    }
}
