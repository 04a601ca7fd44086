use bitvec::{array::BitArray, field::BitField, order::Lsb0};

use super::status::Status;
use super::Interrupt;
use crate::interrupt::{MEIP, MSIP, MTIP, SEIP, SSIP, STIP};
use crate::PrivilegeLevel;

/// Interrupts that can be enabled in mie.
#[allow(clippy::identity_op)]
const VALID_INTERRUPTS_MASK: u32 = 0 | SSIP | MSIP | STIP | MTIP | SEIP | MEIP;

/// Interrupts that can be delegated to S-mode through mideleg.
#[allow(clippy::identity_op)]
const DELEGATABLE_INTERRUPTS_MASK: u32 = 0 | SSIP | STIP | SEIP;

/// Interrupts whose pending bit guest software may write through mip. SEIP is only driven by
/// [`InterruptController::raise_interrupts`](crate::interrupt::InterruptController).
#[allow(clippy::identity_op)]
const WRITABLE_PENDING_MASK: u32 = 0 | SSIP | STIP;

/// Order in which simultaneously pending and enabled interrupts are taken.
///
/// > Multiple simultaneous interrupts destined for M-mode are handled in the following decreasing
/// > priority order: MEI, MSI, MTI, SEI, SSI, STI.
const PRIORITY: [Interrupt; 6] = [
    Interrupt::MachineExternalInterrupt,
    Interrupt::MachineSoftwareInterrupt,
    Interrupt::MachineTimerInterrupt,
    Interrupt::SupervisorExternalInterrupt,
    Interrupt::SupervisorSoftwareInterrupt,
    Interrupt::SupervisorTimerInterrupt,
];

/// The mip, mie and mideleg registers, together with their S-mode views sip and sie.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Interrupts {
    /// For each bit index matching an interrupt's code, whether handling that interrupt should be
    /// delegated to S-mode (if not triggered in M-mode).
    delegate: BitArray<[u32; 1], Lsb0>,

    /// The mip register. Bits of unknown interrupts raised by devices are kept, but never
    /// serviced, since they cannot be enabled.
    mip: BitArray<[u32; 1], Lsb0>,

    /// The mie register.
    mie: BitArray<[u32; 1], Lsb0>,
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupts {
    pub fn new() -> Self {
        Self {
            delegate: BitArray::new([0x0000_0000]),
            mip: BitArray::new([0x0000_0000]),
            mie: BitArray::new([0x0000_0000]),
        }
    }

    /// Rebuild the registers from raw values, masking every register to its legal bits.
    pub fn from_raw(mideleg: u32, mip: u32, mie: u32) -> Self {
        Self {
            delegate: BitArray::new([mideleg & DELEGATABLE_INTERRUPTS_MASK]),
            mip: BitArray::new([mip]),
            mie: BitArray::new([mie & VALID_INTERRUPTS_MASK]),
        }
    }

    pub fn should_delegate(&self, interrupt: Interrupt) -> bool {
        self.delegate[interrupt.code() as usize]
    }

    /// Set the pending bits in `mask`, as requested by an external device.
    pub fn raise(&mut self, mask: u32) {
        let mip = self.mip.load_le::<u32>();
        self.mip.store_le(mip | mask);
    }

    /// Clear the pending bits in `mask`, as requested by an external device.
    pub fn lower(&mut self, mask: u32) {
        let mip = self.mip.load_le::<u32>();
        self.mip.store_le(mip & !mask);
    }

    /// Returns the interrupts that are both pending and enabled in mie, ignoring the global
    /// interrupt-enable bits and the privilege level.
    pub fn pending_enabled(&self) -> u32 {
        (self.mip & self.mie).load_le()
    }

    /// Returns the interrupt that should be taken right now, if any.
    ///
    /// > An interrupt i will trap to M-mode (causing the privilege mode to change to M-mode) if all
    /// > of the following are true: (a) either the current privilege mode is M and the MIE bit in
    /// > the mstatus register is set, or the current privilege mode has less privilege than M-mode;
    /// > (b) bit i is set in both mip and mie; and (c) if register mideleg exists, bit i is not set
    /// > in mideleg.
    ///
    /// > An interrupt i will trap to S-mode if both of the following are true: (a) either the
    /// > current privilege mode is S and the SIE bit in the sstatus register is set, or the current
    /// > privilege mode has less privilege than S-mode; and (b) bit i is set in both sip and sie.
    pub fn next_interrupt(&self, privilege: PrivilegeLevel, status: &Status) -> Option<Interrupt> {
        let pending = self.pending_enabled();
        if pending == 0 {
            return None;
        }
        let delegate = self.delegate.load_le::<u32>();

        let m_enabled = privilege < PrivilegeLevel::Machine || status.mie();
        let s_enabled = privilege < PrivilegeLevel::Supervisor
            || (privilege == PrivilegeLevel::Supervisor && status.sie());

        let mut interrupts = 0;
        if m_enabled {
            interrupts |= pending & !delegate;
        }
        if s_enabled {
            interrupts |= pending & delegate;
        }

        PRIORITY
            .into_iter()
            .find(|interrupt| interrupts & interrupt.mask() != 0)
    }

    pub fn read_mideleg(&self) -> u32 {
        self.delegate.load_le()
    }

    /// The mideleg register is **WARL**.
    pub fn write_mideleg(&mut self, value: u32) {
        self.delegate.store_le(value & DELEGATABLE_INTERRUPTS_MASK);
    }

    pub fn read_mip(&self) -> u32 {
        self.mip.load_le()
    }

    pub fn write_mip(&mut self, value: u32) {
        write_masked(&mut self.mip, value, WRITABLE_PENDING_MASK);
    }

    pub fn read_mie(&self) -> u32 {
        self.mie.load_le()
    }

    pub fn write_mie(&mut self, value: u32) {
        write_masked(&mut self.mie, value, VALID_INTERRUPTS_MASK);
    }

    pub fn read_sip(&self) -> u32 {
        (self.mip & self.delegate).load_le()
    }

    pub fn write_sip(&mut self, value: u32) {
        let delegate = self.delegate.load_le::<u32>();
        write_masked(&mut self.mip, value, delegate);
    }

    pub fn read_sie(&self) -> u32 {
        (self.mie & self.delegate).load_le()
    }

    pub fn write_sie(&mut self, value: u32) {
        // Since we are masking with `delegate`, it is not needed to also mask with
        // VALID_INTERRUPTS_MASK (or DELEGATABLE_INTERRUPTS_MASK).
        let delegate = self.delegate.load_le::<u32>();
        write_masked(&mut self.mie, value, delegate);
    }
}

fn write_masked(register: &mut BitArray<[u32; 1], Lsb0>, value: u32, mask: u32) {
    let old = register.load_le::<u32>();
    register.store_le(old & !mask | value & mask);
}
