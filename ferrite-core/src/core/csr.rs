//! Control and Status Register access.
//!
//! Part of the "Zicsr" extension.

use super::control::Counteren;
use super::status::{MSTATUS_MASK, SSTATUS_MASK};
use super::Core;
use crate::bus::Bus;
use crate::csr::{self, CsrAccessError, CsrSpecifier};
use crate::interrupt::RealTimeCounter;
use crate::PrivilegeLevel;

/// > The misa CSR is a WARL read-write register reporting the ISA supported by the hart.
///
/// MXL is 1 (32-bit), with the I, M, A, S, U and C extension bits set.
#[allow(clippy::identity_op)]
pub const MISA: u32 = 0
    | (1 << 30)
    | (1 << (b'I' - b'A'))
    | (1 << (b'M' - b'A'))
    | (1 << (b'A' - b'A'))
    | (1 << (b'S' - b'A'))
    | (1 << (b'U' - b'A'))
    | (1 << (b'C' - b'A'));

const_assert_eq!(MISA, 0x4014_1105);

impl<B: Bus> Core<B> {
    /// Validate an access to `specifier` from the current privilege level.
    ///
    /// On top of the rules encoded in the specifier itself (see [`csr::check_access`]), this
    /// applies the CSR-specific rules: satp is inaccessible from S-mode while `mstatus.TVM` is set,
    /// and the cycle and instret counters are gated by mcounteren and scounteren.
    ///
    /// This does not check whether the CSR exists, [`read_csr`](Self::read_csr) and
    /// [`write_csr`](Self::write_csr) take care of that.
    pub fn check_csr(
        &self,
        specifier: CsrSpecifier,
        will_write: bool,
    ) -> Result<(), CsrAccessError> {
        csr::check_access(specifier, self.privilege_level, will_write)?;
        let enabled = match specifier {
            csr::SATP => !(self.privilege_level == PrivilegeLevel::Supervisor && self.status.tvm()),
            csr::CYCLE | csr::CYCLEH => {
                self.control.counter_enabled(self.privilege_level, Counteren::CY)
            }
            csr::INSTRET | csr::INSTRETH => {
                self.control.counter_enabled(self.privilege_level, Counteren::IR)
            }
            _ => true,
        };
        match enabled {
            true => Ok(()),
            false => Err(CsrAccessError::Disabled(specifier)),
        }
    }

    /// Read the value of a CSR by its specifier, without any access checks.
    pub fn read_csr(&self, specifier: CsrSpecifier) -> Result<u32, CsrAccessError> {
        let value = match specifier {
            csr::SSTATUS => self.status.sstatus(),
            csr::SIE => self.interrupts.read_sie(),
            csr::STVEC => self.control.stvec.read(),
            csr::SCOUNTEREN => self.control.scounteren.read(),
            csr::SSCRATCH => self.trap.read_sscratch(),
            csr::SEPC => self.trap.read_sepc(),
            csr::SCAUSE => self.trap.scause.read(),
            csr::STVAL => self.trap.read_stval(),
            csr::SIP => self.interrupts.read_sip(),
            csr::SATP => self.satp.read(),

            csr::MSTATUS => self.status.mstatus(),
            csr::MISA => MISA,
            csr::MEDELEG => self.control.medeleg.read(),
            csr::MIDELEG => self.interrupts.read_mideleg(),
            csr::MIE => self.interrupts.read_mie(),
            csr::MTVEC => self.control.mtvec.read(),
            csr::MCOUNTEREN => self.control.mcounteren.read(),
            csr::MSTATUSH => 0,
            csr::MSCRATCH => self.trap.read_mscratch(),
            csr::MEPC => self.trap.read_mepc(),
            csr::MCAUSE => self.trap.mcause.read(),
            csr::MTVAL => self.trap.read_mtval(),
            csr::MIP => self.interrupts.read_mip(),

            csr::MCYCLE | csr::MINSTRET | csr::CYCLE | csr::INSTRET => self.mcycle as u32,
            csr::MCYCLEH | csr::MINSTRETH | csr::CYCLEH | csr::INSTRETH => {
                (self.mcycle >> 32) as u32
            }
            csr::TIME => self.real_time() as u32,
            csr::TIMEH => (self.real_time() >> 32) as u32,

            csr::MVENDORID | csr::MARCHID | csr::MIMPID => 0,
            csr::MHARTID => self.config.hart_id,

            _ => return Err(CsrAccessError::CsrUnsupported(specifier)),
        };
        Ok(value)
    }

    /// Write `value` to a CSR by its specifier, without any access checks.
    ///
    /// Every write goes through the register's WARL rules, so reading the CSR back may yield a
    /// different value. Writes to read-only CSRs are ignored.
    pub fn write_csr(&mut self, specifier: CsrSpecifier, value: u32) -> Result<(), CsrAccessError> {
        match specifier {
            csr::SSTATUS => self.write_status(value, SSTATUS_MASK),
            csr::SIE => self.interrupts.write_sie(value),
            csr::STVEC => self.control.stvec.write(value),
            csr::SCOUNTEREN => self.control.scounteren.write(value),
            csr::SSCRATCH => self.trap.write_sscratch(value),
            csr::SEPC => self.trap.write_sepc(value),
            csr::SCAUSE => self.trap.scause.write(value),
            csr::STVAL => self.trap.write_stval(value),
            csr::SIP => self.interrupts.write_sip(value),
            csr::SATP => {
                if self.satp.write(value) {
                    self.tlb.flush();
                }
            }

            csr::MSTATUS => self.write_status(value, MSTATUS_MASK),
            csr::MEDELEG => self.control.medeleg.write(value),
            csr::MIDELEG => self.interrupts.write_mideleg(value),
            csr::MIE => self.interrupts.write_mie(value),
            csr::MTVEC => self.control.mtvec.write(value),
            csr::MCOUNTEREN => self.control.mcounteren.write(value),
            csr::MSCRATCH => self.trap.write_mscratch(value),
            csr::MEPC => self.trap.write_mepc(value),
            csr::MCAUSE => self.trap.mcause.write(value),
            csr::MTVAL => self.trap.write_mtval(value),
            csr::MIP => self.interrupts.write_mip(value),

            csr::MCYCLE | csr::MINSTRET => {
                self.mcycle = self.mcycle & !0xFFFF_FFFF | value as u64;
            }
            csr::MCYCLEH | csr::MINSTRETH => {
                self.mcycle = self.mcycle & 0xFFFF_FFFF | (value as u64) << 32;
            }

            // Hardwired registers.
            csr::MISA | csr::MSTATUSH => {}
            csr::CYCLE
            | csr::TIME
            | csr::INSTRET
            | csr::CYCLEH
            | csr::TIMEH
            | csr::INSTRETH
            | csr::MVENDORID
            | csr::MARCHID
            | csr::MIMPID
            | csr::MHARTID => {}

            _ => return Err(CsrAccessError::CsrUnsupported(specifier)),
        }
        Ok(())
    }

    fn write_status(&mut self, value: u32, mask: u32) {
        if self.status.write(value, mask) {
            self.tlb.flush();
        }
    }

    /// Current value of the real-time counter backing the time CSR.
    fn real_time(&self) -> u64 {
        match &self.real_time_counter {
            Some(counter) => counter.time(),
            None => self.time(),
        }
    }
}

/// Without an external real-time counter, the core counts its own cycles at a fixed nominal
/// frequency.
impl<B: Bus> RealTimeCounter for Core<B> {
    fn time(&self) -> u64 {
        self.mcycle
    }

    fn frequency(&self) -> u32 {
        super::NOMINAL_FREQUENCY
    }
}

