use log::trace;

use super::{Core, Exception, ExecutionResult, Interrupt};
use crate::bus::Bus;
use crate::PrivilegeLevel;

/// Trap handling registers of M-mode and S-mode.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Trap {
    mscratch: u32,
    mepc: u32,
    pub mcause: Cause,
    mtval: u32,

    sscratch: u32,
    sepc: u32,
    pub scause: Cause,
    stval: u32,
}

impl Default for Trap {
    fn default() -> Self {
        Self::new()
    }
}

impl Trap {
    pub fn new() -> Self {
        Self {
            mscratch: 0,
            mepc: 0,
            mcause: Cause::new(),
            mtval: 0,

            sscratch: 0,
            sepc: 0,
            scause: Cause::new(),
            stval: 0,
        }
    }

    pub fn read_mscratch(&self) -> u32 {
        self.mscratch
    }

    pub fn write_mscratch(&mut self, value: u32) {
        self.mscratch = value;
    }

    pub fn read_mepc(&self) -> u32 {
        self.mepc
    }

    /// > mepc is a WARL register that must be able to hold all valid virtual addresses.
    ///
    /// Since IALIGN is 16, only bit 0 is hardwired to zero.
    pub fn write_mepc(&mut self, value: u32) {
        self.mepc = value & !0b1;
    }

    pub fn read_mtval(&self) -> u32 {
        self.mtval
    }

    pub fn write_mtval(&mut self, value: u32) {
        self.mtval = value;
    }

    pub fn read_sscratch(&self) -> u32 {
        self.sscratch
    }

    pub fn write_sscratch(&mut self, value: u32) {
        self.sscratch = value;
    }

    pub fn read_sepc(&self) -> u32 {
        self.sepc
    }

    pub fn write_sepc(&mut self, value: u32) {
        self.sepc = value & !0b1;
    }

    pub fn read_stval(&self) -> u32 {
        self.stval
    }

    pub fn write_stval(&mut self, value: u32) {
        self.stval = value;
    }
}

/// The mcause and scause registers.
///
/// > The mcause register is an MXLEN-bit read-write register. When a trap is taken into M-mode,
/// > mcause is written with a code indicating the event that caused the trap. Otherwise, mcause is
/// > never written by the implementation, though it may be explicitly written by software.
///
/// The Exception Code field is **WLRL**, so any value written by software is kept as is.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cause(u32);

impl Default for Cause {
    fn default() -> Self {
        Self::new()
    }
}

impl Cause {
    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32) {
        self.0 = value;
    }

    pub fn set(&mut self, cause: &TrapCause) {
        self.0 = match cause {
            TrapCause::Exception(exception) => exception.code(),
            TrapCause::Interrupt(interrupt) => 0x8000_0000 | interrupt.code(),
        };
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrapCause {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl From<Exception> for TrapCause {
    fn from(value: Exception) -> Self {
        Self::Exception(value)
    }
}

impl From<Interrupt> for TrapCause {
    fn from(value: Interrupt) -> Self {
        Self::Interrupt(value)
    }
}

impl<B: Bus> Core<B> {
    /// Enter the trap handler for a synchronous exception raised by the instruction at `pc`.
    pub(super) fn raise_exception(&mut self, exception: Exception) {
        self.enter_trap(exception.into(), exception.value());
    }

    /// Enter the trap handler for `interrupt`, interrupting the instruction at `pc`.
    pub(super) fn raise_interrupt(&mut self, interrupt: Interrupt) {
        self.enter_trap(interrupt.into(), 0);
    }

    /// > By default, all traps at any privilege level are handled in machine mode, though a
    /// > machine-mode handler can redirect traps back to the appropriate level with the MRET
    /// > instruction. To increase performance, implementations can provide individual read/write
    /// > bits within medeleg and mideleg to indicate that certain exceptions and interrupts should
    /// > be processed directly by a lower privilege level.
    ///
    /// > Traps never transition from a more-privileged mode to a less-privileged mode.
    fn enter_trap(&mut self, cause: TrapCause, value: u32) {
        self.mcycle = self.mcycle.wrapping_add(1);

        let from = self.privilege_level;
        let delegate = from <= PrivilegeLevel::Supervisor
            && match &cause {
                TrapCause::Exception(exception) => self.control.medeleg.should_delegate(exception),
                TrapCause::Interrupt(interrupt) => self.interrupts.should_delegate(*interrupt),
            };
        let pc = self.registers.pc();
        trace!(
            "Trap {cause:?} (tval {value:#010x}) at pc {pc:#010x} from privilege level {from}, \
             delegated: {delegate}"
        );

        let target = if delegate {
            self.trap.write_sepc(pc);
            self.trap.scause.set(&cause);
            self.trap.write_stval(value);
            self.status.set_spp(from.into());
            self.status.set_spie(self.status.sie());
            self.status.set_sie(false);
            PrivilegeLevel::Supervisor
        } else {
            self.trap.write_mepc(pc);
            self.trap.mcause.set(&cause);
            self.trap.write_mtval(value);
            self.status.set_mpp(from.into());
            self.status.set_mpie(self.status.mie());
            self.status.set_mie(false);
            PrivilegeLevel::Machine
        };
        self.set_privilege_level(target);

        let interrupt = match cause {
            TrapCause::Interrupt(interrupt) => Some(interrupt),
            TrapCause::Exception(_) => None,
        };
        *self.registers.pc_mut() = self.control.tvec(target).handler(interrupt);
    }

    /// Return from an M-mode trap handler.
    ///
    /// > An MRET or SRET instruction is used to return from a trap in M-mode or S-mode
    /// > respectively. When executing an xRET instruction, supposing xPP holds the value y, xIE is
    /// > set to xPIE; the privilege mode is changed to y; xPIE is set to 1; and xPP is set to the
    /// > least-privileged supported mode (U if U-mode is implemented, else M). If y≠M, xRET also
    /// > sets MPRV=0.
    pub(super) fn mret(&mut self, raw_instruction: u32) -> ExecutionResult {
        if self.privilege_level < PrivilegeLevel::Machine {
            return Err(Exception::IllegalInstruction(raw_instruction));
        }
        let y = self.status.mpp();
        self.status.set_mie(self.status.mpie());
        self.status.set_mpie(true);
        self.status.set_mpp(PrivilegeLevel::User.into());
        self.return_to(y, self.trap.read_mepc());
        Ok(())
    }

    /// Return from an S-mode trap handler.
    ///
    /// > When TSR=1, attempts to execute SRET while executing in S-mode will raise an illegal
    /// > instruction exception.
    pub(super) fn sret(&mut self, raw_instruction: u32) -> ExecutionResult {
        let allowed = match self.privilege_level {
            PrivilegeLevel::Machine => true,
            PrivilegeLevel::Supervisor => !self.status.tsr(),
            PrivilegeLevel::User => false,
        };
        if !allowed {
            return Err(Exception::IllegalInstruction(raw_instruction));
        }
        let y = self.status.spp();
        self.status.set_sie(self.status.spie());
        self.status.set_spie(true);
        self.status.set_spp(PrivilegeLevel::User.into());
        self.return_to(y, self.trap.read_sepc());
        Ok(())
    }

    fn return_to(&mut self, privilege_level: PrivilegeLevel, epc: u32) {
        if privilege_level != PrivilegeLevel::Machine && self.status.mprv() {
            self.status.set_mprv(false);
            self.tlb.flush();
        }
        self.set_privilege_level(privilege_level);
        *self.registers.pc_mut() = epc;
    }
}
