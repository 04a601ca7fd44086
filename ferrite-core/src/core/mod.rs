//! Provides a simulatable RV32IMASUC core implementation.

pub mod control;
mod csr;
mod execute;
pub mod interrupts;
mod memory;
pub mod mmu;
pub mod status;
pub mod tlb;
pub mod trap;

use crate::bus::Bus;
use crate::instruction::{
    is_compressed, AmoOp, BranchCondition, CsrOp, Instruction, LoadWidth, RegImmOp, RegRegOp,
    RegShiftImmOp, StoreWidth,
};
use crate::interrupt::{InterruptController, RealTimeCounter};
use crate::registers::Registers;
use crate::snapshot::{CpuSnapshot, SnapshotError};
use crate::PrivilegeLevel;
use control::{Control, Counteren, Medeleg, Tvec};
use execute::Executor;
use interrupts::Interrupts;
use mmu::Satp;
use status::Status;
use tlb::Tlb;
use trap::Trap;

/// Frequency at which the core claims to count time when no [`RealTimeCounter`] is attached.
const NOMINAL_FREQUENCY: u32 = 50_000_000;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// Address to which the core's PC register is reset.
    pub reset_vector: u32,
    /// Value of the mhartid CSR.
    pub hart_id: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_vector: 0x0000_1000,
            hart_id: 0,
        }
    }
}

/// RISC-V core implementing the RV32IMASUC ISA, with Sv32 virtual memory.
///
/// As we don't support hardware multithreading, every core always only has a single hart.
/// We therefore don't model RISC-V harts explicitly, but rather consider [`Core`] to be the whole
/// of a core with a single hart.
///
/// > A component is termed a core if it contains an independent instruction fetch unit.
/// > A RISC-V-compatible core might support multiple RISC-V-compatible hardware threads, or harts,
/// > through multithreading.
///
/// All memory accesses go through the [`Bus`] `B`. Devices signal interrupts through the core's
/// [`InterruptController`] implementation.
#[derive(Debug)]
pub struct Core<B: Bus> {
    config: Config,
    registers: Registers,
    status: Status,
    interrupts: Interrupts,
    control: Control,
    trap: Trap,
    satp: Satp,
    /// Cycle counter, also used as instructions-retired counter.
    mcycle: u64,
    privilege_level: PrivilegeLevel,
    /// Physical address of the word reserved by LR.W.
    reservation: Option<u32>,
    /// Set by WFI, cleared once an interrupt is pending and enabled.
    halted: bool,
    tlb: Tlb,
    bus: B,
    real_time_counter: Option<Box<dyn RealTimeCounter>>,
}

impl<B: Bus> Core<B> {
    /// Create a core in its hard-reset state, see [`reset_hard`](Self::reset_hard).
    pub fn new(bus: B, config: Config) -> Self {
        let reset_vector = config.reset_vector;
        Self {
            config,
            registers: Registers::new(reset_vector),
            status: Status::new(),
            interrupts: Interrupts::new(),
            control: Control::new(),
            trap: Trap::new(),
            satp: Satp::new(),
            mcycle: 0,
            privilege_level: PrivilegeLevel::Machine,
            reservation: None,
            halted: false,
            tlb: Tlb::new(),
            bus,
            real_time_counter: None,
        }
    }

    /// Force this core to its reset state.
    ///
    /// > Upon reset, a hart's privilege mode is set to M. The mstatus fields MIE and MPRV are reset
    /// > to 0. [...] The pc is set to an implementation-defined reset vector. The mcause register
    /// > is set to a value indicating the cause of the reset. All other hart state is UNSPECIFIED.
    ///
    /// The unspecified state is left untouched. Use [`reset_hard`](Self::reset_hard) to clear it
    /// as well.
    pub fn reset(&mut self) {
        *self.registers.pc_mut() = self.config.reset_vector;
        self.privilege_level = PrivilegeLevel::Machine;
        self.status.set_mie(false);
        self.status.set_mprv(false);
        self.trap.mcause.write(0);
        self.halted = false;
        self.tlb.flush();
    }

    /// Reset the core, and return every register, CSR, the reservation and the cycle counter to
    /// zero.
    pub fn reset_hard(&mut self) {
        self.registers = Registers::new(self.config.reset_vector);
        self.status = Status::new();
        self.interrupts = Interrupts::new();
        self.control = Control::new();
        self.trap = Trap::new();
        self.satp = Satp::new();
        self.mcycle = 0;
        self.reservation = None;
        self.reset();
    }

    /// Provide a read-only view of this core's configuration.
    ///
    /// It is not possible to modify the configuration after creation.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn privilege_level(&self) -> PrivilegeLevel {
        self.privilege_level
    }

    /// Returns `true` while the hart is waiting for an interrupt.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn mcycle(&self) -> u64 {
        self.mcycle
    }

    /// Attach the counter backing the time CSRs. Without one, time is derived from mcycle.
    pub fn set_real_time_counter(&mut self, counter: Box<dyn RealTimeCounter>) {
        self.real_time_counter = Some(counter);
    }

    /// Run the core for `cycles` cycles.
    ///
    /// Every executed instruction and every taken interrupt costs one cycle, an instruction that
    /// raises an exception costs two. The budget may be exceeded by one cycle in the latter case.
    /// Cycles left while the hart is halted are added to the cycle counter.
    pub fn step(&mut self, cycles: u64) {
        let mut executed = 0;
        while !self.halted && executed < cycles {
            executed += match self.interrupts.next_interrupt(self.privilege_level, &self.status) {
                Some(interrupt) => {
                    self.raise_interrupt(interrupt);
                    1
                }
                None => self.tick(),
            };
        }
        if executed < cycles {
            self.mcycle = self.mcycle.wrapping_add(cycles - executed);
        }
    }

    /// Fetch, decode and execute a single instruction, entering the trap handler if that fails.
    ///
    /// Returns the number of cycles consumed.
    fn tick(&mut self) -> u64 {
        self.mcycle = self.mcycle.wrapping_add(1);
        match self.fetch_and_execute() {
            Ok(()) => 1,
            Err(exception) => {
                self.raise_exception(exception);
                2
            }
        }
    }

    /// > The behavior upon decoding a reserved instruction is UNSPECIFIED.
    ///
    /// This implementation chooses to raise an [`Exception::IllegalInstruction`] when the
    /// instruction can not be decoded.
    fn fetch_and_execute(&mut self) -> ExecutionResult {
        let raw_instruction = self.fetch()?;
        let (instruction, length) = match is_compressed(raw_instruction as u16) {
            true => (Instruction::decode_compressed(raw_instruction as u16), 2),
            false => (Instruction::decode(raw_instruction), 4),
        };
        let instruction =
            instruction.map_err(|_| Exception::IllegalInstruction(raw_instruction))?;
        self.execute_instruction(instruction, raw_instruction, length)
    }

    /// Execute a single decoded instruction on this core.
    ///
    /// This only takes care of the instruction-specific operations, such as updating `x`
    /// registers, memory, CSRs and the `pc` register. Raised exceptions are returned, not handled.
    fn execute_instruction(
        &mut self,
        instruction: Instruction,
        raw_instruction: u32,
        length: u32,
    ) -> ExecutionResult {
        let mut executor = Executor {
            core: self,
            length,
            raw_instruction,
        };
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let op = match op {
                    RegImmOp::Addi => Executor::addi,
                    RegImmOp::Slti => Executor::slti,
                    RegImmOp::Sltiu => Executor::sltiu,
                    RegImmOp::Xori => Executor::xori,
                    RegImmOp::Ori => Executor::ori,
                    RegImmOp::Andi => Executor::andi,
                };
                op(&mut executor, dest, src, immediate)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let op = match op {
                    RegShiftImmOp::Slli => Executor::slli,
                    RegShiftImmOp::Srli => Executor::srli,
                    RegShiftImmOp::Srai => Executor::srai,
                };
                op(&mut executor, dest, src, shift_amount_u5)
            }
            Instruction::Auipc { dest, immediate } => executor.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => executor.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let op = match op {
                    RegRegOp::Add => Executor::add,
                    RegRegOp::Slt => Executor::slt,
                    RegRegOp::Sltu => Executor::sltu,
                    RegRegOp::And => Executor::and,
                    RegRegOp::Or => Executor::or,
                    RegRegOp::Xor => Executor::xor,
                    RegRegOp::Sll => Executor::sll,
                    RegRegOp::Srl => Executor::srl,
                    RegRegOp::Sub => Executor::sub,
                    RegRegOp::Sra => Executor::sra,
                    RegRegOp::Mul => Executor::mul,
                    RegRegOp::Mulh => Executor::mulh,
                    RegRegOp::Mulhsu => Executor::mulhsu,
                    RegRegOp::Mulhu => Executor::mulhu,
                    RegRegOp::Div => Executor::div,
                    RegRegOp::Divu => Executor::divu,
                    RegRegOp::Rem => Executor::rem,
                    RegRegOp::Remu => Executor::remu,
                };
                op(&mut executor, dest, src1, src2)
            }
            Instruction::Jal { dest, offset } => executor.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => executor.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let op = match condition {
                    BranchCondition::Beq => Executor::beq,
                    BranchCondition::Bne => Executor::bne,
                    BranchCondition::Blt => Executor::blt,
                    BranchCondition::Bltu => Executor::bltu,
                    BranchCondition::Bge => Executor::bge,
                    BranchCondition::Bgeu => Executor::bgeu,
                };
                op(&mut executor, src1, src2, offset)
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let op = match width {
                    LoadWidth::Lb => Executor::lb,
                    LoadWidth::Lh => Executor::lh,
                    LoadWidth::Lw => Executor::lw,
                    LoadWidth::Lbu => Executor::lbu,
                    LoadWidth::Lhu => Executor::lhu,
                };
                op(&mut executor, dest, base, offset)
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let op = match width {
                    StoreWidth::Sb => Executor::sb,
                    StoreWidth::Sh => Executor::sh,
                    StoreWidth::Sw => Executor::sw,
                };
                op(&mut executor, src, base, offset)
            }
            Instruction::Fence {
                predecessor,
                successor,
            } => executor.fence(predecessor, successor),
            Instruction::FenceI => executor.fence_i(),
            Instruction::Csr { op, dest, csr, src } => {
                let op = match op {
                    CsrOp::ReadWrite => Executor::csrrw,
                    CsrOp::ReadSet => Executor::csrrs,
                    CsrOp::ReadClear => Executor::csrrc,
                };
                op(&mut executor, dest, csr, src)
            }
            Instruction::Csri {
                op,
                dest,
                csr,
                immediate,
            } => {
                let op = match op {
                    CsrOp::ReadWrite => Executor::csrrwi,
                    CsrOp::ReadSet => Executor::csrrsi,
                    CsrOp::ReadClear => Executor::csrrci,
                };
                op(&mut executor, dest, csr, immediate)
            }
            Instruction::LrW { dest, address } => executor.lr_w(dest, address),
            Instruction::ScW { dest, address, src } => executor.sc_w(dest, address, src),
            Instruction::Amo {
                op,
                dest,
                address,
                src,
            } => {
                let op = match op {
                    AmoOp::Swap => Executor::amoswap_w,
                    AmoOp::Add => Executor::amoadd_w,
                    AmoOp::Xor => Executor::amoxor_w,
                    AmoOp::And => Executor::amoand_w,
                    AmoOp::Or => Executor::amoor_w,
                    AmoOp::Min => Executor::amomin_w,
                    AmoOp::Max => Executor::amomax_w,
                    AmoOp::Minu => Executor::amominu_w,
                    AmoOp::Maxu => Executor::amomaxu_w,
                };
                op(&mut executor, dest, address, src)
            }
            Instruction::Ecall => executor.ecall(),
            Instruction::Ebreak => executor.ebreak(),
            Instruction::Sret => executor.sret(),
            Instruction::Mret => executor.mret(),
            Instruction::Wfi => executor.wfi(),
            Instruction::SfenceVma { vaddr, asid } => executor.sfence_vma(vaddr, asid),
        }
    }

    /// Switch to `privilege_level`, discarding cached translations if it changes.
    fn set_privilege_level(&mut self, privilege_level: PrivilegeLevel) {
        if privilege_level != self.privilege_level {
            self.privilege_level = privilege_level;
            self.tlb.flush();
        }
    }

    /// Capture the complete architectural state of the core.
    pub fn state(&self) -> CpuSnapshot {
        CpuSnapshot {
            registers: self.registers.to_raw(),
            pc: self.registers.pc(),
            privilege_level: self.privilege_level,
            halted: self.halted,
            reservation: self.reservation,
            mcycle: self.mcycle,

            mstatus: self.status.mstatus(),
            medeleg: self.control.medeleg.read(),
            mideleg: self.interrupts.read_mideleg(),
            mie: self.interrupts.read_mie(),
            mip: self.interrupts.read_mip(),
            mtvec: self.control.mtvec.read(),
            mcounteren: self.control.mcounteren.read(),
            mscratch: self.trap.read_mscratch(),
            mepc: self.trap.read_mepc(),
            mcause: self.trap.mcause.read(),
            mtval: self.trap.read_mtval(),

            stvec: self.control.stvec.read(),
            scounteren: self.control.scounteren.read(),
            sscratch: self.trap.read_sscratch(),
            sepc: self.trap.read_sepc(),
            scause: self.trap.scause.read(),
            stval: self.trap.read_stval(),
            satp: self.satp.read(),
        }
    }

    /// Restore the architectural state captured by [`state`](Self::state).
    ///
    /// The snapshot is validated first: on error, the core is left untouched. WARL fields are
    /// masked to their legal values, as if written by software.
    pub fn set_state(&mut self, snapshot: &CpuSnapshot) -> Result<(), SnapshotError> {
        let status = Status::from_raw(snapshot.mstatus)
            .ok_or(SnapshotError::IllegalStatus(snapshot.mstatus))?;
        let tvec = |register, value| {
            Tvec::from_raw(value).ok_or(SnapshotError::ReservedVectorMode { register, value })
        };
        let mtvec = tvec("mtvec", snapshot.mtvec)?;
        let stvec = tvec("stvec", snapshot.stvec)?;

        let mut trap = Trap::new();
        trap.write_mscratch(snapshot.mscratch);
        trap.write_mepc(snapshot.mepc);
        trap.mcause.write(snapshot.mcause);
        trap.write_mtval(snapshot.mtval);
        trap.write_sscratch(snapshot.sscratch);
        trap.write_sepc(snapshot.sepc);
        trap.scause.write(snapshot.scause);
        trap.write_stval(snapshot.stval);

        self.registers = Registers::from_raw(snapshot.registers, snapshot.pc);
        self.status = status;
        self.interrupts = Interrupts::from_raw(snapshot.mideleg, snapshot.mip, snapshot.mie);
        self.control = Control {
            mtvec,
            medeleg: Medeleg::from_raw(snapshot.medeleg),
            mcounteren: Counteren::from_raw(snapshot.mcounteren),
            stvec,
            scounteren: Counteren::from_raw(snapshot.scounteren),
        };
        self.trap = trap;
        self.satp = Satp::from_raw(snapshot.satp);
        self.mcycle = snapshot.mcycle;
        self.privilege_level = snapshot.privilege_level;
        self.reservation = snapshot.reservation;
        self.halted = snapshot.halted;
        self.tlb.flush();
        Ok(())
    }
}

/// The core's mip register, as seen by the devices driving its interrupt lines.
impl<B: Bus> InterruptController for Core<B> {
    /// Besides setting the bits in mip, this wakes up a halted hart if any of the raised
    /// interrupts is enabled in mie.
    fn raise_interrupts(&mut self, mask: u32) {
        self.interrupts.raise(mask);
        if self.interrupts.pending_enabled() != 0 {
            self.halted = false;
        }
    }

    fn lower_interrupts(&mut self, mask: u32) {
        self.interrupts.lower(mask);
    }

    fn raised_interrupts(&self) -> u32 {
        self.interrupts.read_mip()
    }
}

/// Result of executing a single instruction: the exception to raise, if any.
pub type ExecutionResult = Result<(), Exception>;

/// Synchronous exceptions, carrying the value written to mtval or stval where one is defined.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Exception {
    /// Instruction address is not on a two-byte aligned boundary in memory.
    InstructionAddressMisaligned(u32),
    InstructionAccessFault(u32),
    /// Generic exception used to communicate one of many possible scenarios, carrying the faulting
    /// instruction (only the low 16 bits for compressed instructions):
    ///
    /// - (*UNSPECIFIED*) Attempt to decode a reserved instruction.
    /// - Attempt to access a non-existent CSR.
    /// - Attempt to access a CSR without the appropriate privilege level.
    /// - Attempt to write to a read-only CSR.
    /// - Attempt to execute a privileged instruction without the appropriate privilege level.
    IllegalInstruction(u32),
    Breakpoint,
    LoadAddressMisaligned(u32),
    LoadAccessFault(u32),
    StoreOrAmoAddressMisaligned(u32),
    StoreOrAmoAccessFault(u32),
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
    InstructionPageFault(u32),
    LoadPageFault(u32),
    StoreOrAmoPageFault(u32),
}

impl Exception {
    /// Exception code of [`Exception::EnvironmentCallFromMMode`].
    pub const ENVIRONMENT_CALL_FROM_M_MODE: u32 = 11;

    /// Returns the exception code (cause) for this exception.
    pub fn code(&self) -> u32 {
        match self {
            Self::InstructionAddressMisaligned(_) => 0,
            Self::InstructionAccessFault(_) => 1,
            Self::IllegalInstruction(_) => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned(_) => 4,
            Self::LoadAccessFault(_) => 5,
            Self::StoreOrAmoAddressMisaligned(_) => 6,
            Self::StoreOrAmoAccessFault(_) => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => Self::ENVIRONMENT_CALL_FROM_M_MODE,
            Self::InstructionPageFault(_) => 12,
            Self::LoadPageFault(_) => 13,
            Self::StoreOrAmoPageFault(_) => 15,
        }
    }

    /// Returns the trap value written to mtval or stval when this exception is taken.
    pub fn value(&self) -> u32 {
        match *self {
            Self::InstructionAddressMisaligned(value)
            | Self::InstructionAccessFault(value)
            | Self::IllegalInstruction(value)
            | Self::LoadAddressMisaligned(value)
            | Self::LoadAccessFault(value)
            | Self::StoreOrAmoAddressMisaligned(value)
            | Self::StoreOrAmoAccessFault(value)
            | Self::InstructionPageFault(value)
            | Self::LoadPageFault(value)
            | Self::StoreOrAmoPageFault(value) => value,
            Self::Breakpoint
            | Self::EnvironmentCallFromUMode
            | Self::EnvironmentCallFromSMode
            | Self::EnvironmentCallFromMMode => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Interrupt {
    SupervisorSoftwareInterrupt,
    MachineSoftwareInterrupt,
    SupervisorTimerInterrupt,
    MachineTimerInterrupt,
    SupervisorExternalInterrupt,
    MachineExternalInterrupt,
}

impl Interrupt {
    /// Returns the exception code (cause) for this interrupt.
    pub fn code(&self) -> u32 {
        match self {
            Self::SupervisorSoftwareInterrupt => 1,
            Self::MachineSoftwareInterrupt => 3,
            Self::SupervisorTimerInterrupt => 5,
            Self::MachineTimerInterrupt => 7,
            Self::SupervisorExternalInterrupt => 9,
            Self::MachineExternalInterrupt => 11,
        }
    }

    /// Returns the bit of this interrupt in mip and mie.
    pub fn mask(&self) -> u32 {
        1 << self.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AccessSize;
    use crate::csr::{self, CsrAccessError};
    use crate::interrupt::{MTIP, STIP};
    use crate::memory_map::MemoryMap;
    use crate::registers::Specifier;
    use crate::resources::ram::Ram;
    use crate::AddressRange;

    const RAM_BASE: u32 = 0x8000_0000;
    const RAM_SIZE: u32 = 0x0001_0000;
    const HANDLER: u32 = RAM_BASE + 0x100;

    const ECALL: u32 = 0x0000_0073;
    const SRET: u32 = 0x1020_0073;
    const MRET: u32 = 0x3020_0073;
    const WFI: u32 = 0x1050_0073;
    const SFENCE_VMA: u32 = 0x1200_0073;
    const NOP: u32 = 0x0000_0013;

    fn i_type(opcode: u32, funct3: u32, rd: u32, rs1: u32, immediate: i32) -> u32 {
        (immediate as u32 & 0xFFF) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    fn r_type(opcode: u32, funct7: u32, funct3: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
        funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    fn addi(rd: u32, rs1: u32, immediate: i32) -> u32 {
        i_type(0b0010011, 0b000, rd, rs1, immediate)
    }

    fn csrrw(rd: u32, csr: u16, rs1: u32) -> u32 {
        i_type(0b1110011, 0b001, rd, rs1, csr as i32)
    }

    fn csrrs(rd: u32, csr: u16, rs1: u32) -> u32 {
        i_type(0b1110011, 0b010, rd, rs1, csr as i32)
    }

    fn muldiv(funct3: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b0110011, 0b0000001, funct3, rd, rs1, rs2)
    }

    fn amo(funct5: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b0101111, funct5 << 2, 0b010, rd, rs1, rs2)
    }

    fn x(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    /// A core with 64 KiB of RAM at `RAM_BASE` holding `program`, reset to its start, with all
    /// M-mode traps going to `HANDLER`.
    fn new_core(program: &[u32]) -> Core<MemoryMap> {
        let mut map = MemoryMap::new();
        map.attach(
            AddressRange::with_len(RAM_BASE, RAM_SIZE).unwrap(),
            Box::new(Ram::new(RAM_SIZE)),
        )
        .unwrap();
        let image: Vec<u8> = program.iter().flat_map(|word| word.to_le_bytes()).collect();
        map.write_bytes(RAM_BASE, &image);
        let config = Config {
            reset_vector: RAM_BASE,
            ..Config::default()
        };
        let mut core = Core::new(map, config);
        core.write_csr(csr::MTVEC, HANDLER).unwrap();
        core
    }

    fn write_word(core: &mut Core<MemoryMap>, address: u32, value: u32) {
        core.bus_mut().store(address, value, AccessSize::Word);
    }

    fn read_word(core: &mut Core<MemoryMap>, address: u32) -> u32 {
        core.bus_mut().load(address, AccessSize::Word)
    }

    fn csr(core: &Core<MemoryMap>, specifier: u16) -> u32 {
        core.read_csr(specifier).unwrap()
    }

    #[test]
    fn test_addi_sequence() {
        let mut core = new_core(&[addi(1, 0, 5), addi(1, 1, 3)]);
        core.step(2);
        assert_eq!(8, core.registers().x(x(1)));
        assert_eq!(RAM_BASE + 8, core.registers().pc());
        assert_eq!(2, core.mcycle());
    }

    #[test]
    fn test_x0_is_hardwired() {
        let mut core = new_core(&[addi(0, 0, 5), 0x0001_2037 /* lui x0, 0x12 */]);
        core.step(2);
        assert_eq!(0, core.registers().x(Specifier::X0));
        assert_eq!(RAM_BASE + 8, core.registers().pc());
    }

    #[test]
    fn test_division_edge_cases() {
        let mut core = new_core(&[
            muldiv(0b100, 5, 1, 2),  // div x5, x1, x2
            muldiv(0b101, 6, 1, 2),  // divu x6, x1, x2
            muldiv(0b110, 7, 1, 2),  // rem x7, x1, x2
            muldiv(0b111, 8, 1, 2),  // remu x8, x1, x2
            muldiv(0b100, 9, 3, 4),  // div x9, x3, x4
            muldiv(0b110, 10, 3, 4), // rem x10, x3, x4
            muldiv(0b001, 11, 4, 4), // mulh x11, x4, x4
            muldiv(0b011, 12, 4, 4), // mulhu x12, x4, x4
            muldiv(0b010, 13, 4, 4), // mulhsu x13, x4, x4
        ]);
        let registers = core.registers_mut();
        registers.set_x(x(1), 7);
        registers.set_x(x(2), 0);
        registers.set_x(x(3), 0x8000_0000);
        registers.set_x(x(4), 0xFFFF_FFFF);
        core.step(9);

        let registers = core.registers();
        assert_eq!(0xFFFF_FFFF, registers.x(x(5)));
        assert_eq!(0xFFFF_FFFF, registers.x(x(6)));
        assert_eq!(7, registers.x(x(7)));
        assert_eq!(7, registers.x(x(8)));
        assert_eq!(0x8000_0000, registers.x(x(9)));
        assert_eq!(0, registers.x(x(10)));
        assert_eq!(0, registers.x(x(11)));
        assert_eq!(0xFFFF_FFFE, registers.x(x(12)));
        assert_eq!(0xFFFF_FFFF, registers.x(x(13)));
        assert_eq!(RAM_BASE + 36, registers.pc());
    }

    #[test]
    fn test_cycle_csr_access() {
        let write_cycle = csrrs(2, csr::CYCLE, 1);
        let mut core = new_core(&[csrrs(1, csr::CYCLE, 0), write_cycle]);

        core.step(1);
        assert_eq!(1, core.registers().x(x(1)));
        assert_eq!(RAM_BASE + 4, core.registers().pc());

        core.step(1);
        assert_eq!(0, core.registers().x(x(2)));
        assert_eq!(HANDLER, core.registers().pc());
        assert_eq!(2, csr(&core, csr::MCAUSE));
        assert_eq!(write_cycle, csr(&core, csr::MTVAL));
        assert_eq!(RAM_BASE + 4, csr(&core, csr::MEPC));
        assert_eq!(3, core.mcycle());
    }

    #[test]
    fn test_csr_privilege() {
        let read_mstatus = csrrs(1, csr::MSTATUS, 0);
        let mut core = new_core(&[read_mstatus]);
        core.set_privilege_level(PrivilegeLevel::User);
        core.step(1);

        assert_eq!(PrivilegeLevel::Machine, core.privilege_level());
        assert_eq!(HANDLER, core.registers().pc());
        assert_eq!(2, csr(&core, csr::MCAUSE));
        assert_eq!(read_mstatus, csr(&core, csr::MTVAL));
        // MPP holds U-mode.
        assert_eq!(0, csr(&core, csr::MSTATUS) & (0b11 << 11));
    }

    #[test]
    fn test_csrrw_swaps() {
        let mut core = new_core(&[csrrw(2, csr::MSCRATCH, 1), csrrw(0, csr::MSCRATCH, 2)]);
        core.registers_mut().set_x(x(1), 0x1234);
        core.write_csr(csr::MSCRATCH, 0x5678).unwrap();
        core.step(1);
        assert_eq!(0x5678, core.registers().x(x(2)));
        assert_eq!(0x1234, csr(&core, csr::MSCRATCH));
        core.step(1);
        assert_eq!(0x5678, csr(&core, csr::MSCRATCH));
    }

    #[test]
    fn test_counteren() {
        let mut core = new_core(&[]);
        core.set_privilege_level(PrivilegeLevel::User);
        assert_eq!(
            Err(CsrAccessError::Disabled(csr::CYCLE)),
            core.check_csr(csr::CYCLE, false)
        );
        core.write_csr(csr::MCOUNTEREN, 0b001).unwrap();
        assert!(core.check_csr(csr::CYCLE, false).is_err());
        core.write_csr(csr::SCOUNTEREN, 0b001).unwrap();
        assert!(core.check_csr(csr::CYCLE, false).is_ok());
        assert!(core.check_csr(csr::CYCLEH, false).is_ok());
        assert!(core.check_csr(csr::INSTRET, false).is_err());
        assert!(core.check_csr(csr::TIME, false).is_ok());

        core.set_privilege_level(PrivilegeLevel::Supervisor);
        core.write_csr(csr::SCOUNTEREN, 0).unwrap();
        assert!(core.check_csr(csr::CYCLE, false).is_ok());
    }

    #[test]
    fn test_satp_trapped_by_tvm() {
        let mut core = new_core(&[]);
        core.set_privilege_level(PrivilegeLevel::Supervisor);
        assert!(core.check_csr(csr::SATP, true).is_ok());
        core.write_csr(csr::MSTATUS, 1 << 20).unwrap();
        assert_eq!(
            Err(CsrAccessError::Disabled(csr::SATP)),
            core.check_csr(csr::SATP, false)
        );
    }

    #[test]
    fn test_time() {
        #[derive(Debug)]
        struct FixedCounter(u64);

        impl RealTimeCounter for FixedCounter {
            fn time(&self) -> u64 {
                self.0
            }

            fn frequency(&self) -> u32 {
                1_000_000
            }
        }

        let mut core = new_core(&[]);
        core.step(3);
        assert_eq!(core.mcycle() as u32, csr(&core, csr::TIME));
        assert_eq!(NOMINAL_FREQUENCY, core.frequency());

        core.set_real_time_counter(Box::new(FixedCounter(5 << 32 | 1234)));
        assert_eq!(1234, csr(&core, csr::TIME));
        assert_eq!(5, csr(&core, csr::TIMEH));
    }

    #[test]
    fn test_wfi_and_timer_interrupt() {
        let mut core = new_core(&[WFI, addi(1, 0, 1)]);
        core.write_csr(csr::MIE, MTIP).unwrap();
        core.write_csr(csr::MSTATUS, 1 << 3).unwrap();

        core.step(10);
        assert!(core.is_halted());
        assert_eq!(RAM_BASE + 4, core.registers().pc());
        assert_eq!(10, core.mcycle());

        core.step(5);
        assert!(core.is_halted());
        assert_eq!(15, core.mcycle());

        core.raise_interrupts(MTIP);
        assert!(!core.is_halted());
        core.step(1);
        assert_eq!(HANDLER, core.registers().pc());
        assert_eq!(0x8000_0007, csr(&core, csr::MCAUSE));
        assert_eq!(RAM_BASE + 4, csr(&core, csr::MEPC));
        // MPP = M, MPIE = 1, MIE = 0.
        assert_eq!(0x1880, csr(&core, csr::MSTATUS));
        assert_eq!(0, core.registers().x(x(1)));
    }

    #[test]
    fn test_disabled_interrupt_does_not_wake() {
        let mut core = new_core(&[WFI, addi(1, 0, 1)]);
        core.write_csr(csr::MIE, MTIP).unwrap();
        core.step(1);
        assert!(core.is_halted());

        core.raise_interrupts(STIP);
        assert!(core.is_halted());
        assert_eq!(STIP, core.raised_interrupts());

        // Enabled in mie but not in mstatus: the hart resumes without trapping.
        core.raise_interrupts(MTIP);
        core.step(1);
        assert_eq!(1, core.registers().x(x(1)));
        assert_eq!(RAM_BASE + 8, core.registers().pc());

        core.lower_interrupts(MTIP | STIP);
        assert_eq!(0, core.raised_interrupts());
    }

    #[test]
    fn test_wfi_is_a_nop_with_pending_interrupt() {
        let mut core = new_core(&[WFI]);
        core.write_csr(csr::MIE, MTIP).unwrap();
        core.raise_interrupts(MTIP);
        core.step(1);
        assert!(!core.is_halted());
        assert_eq!(RAM_BASE + 4, core.registers().pc());
    }

    #[test]
    fn test_privileged_instructions() {
        let mut core = new_core(&[WFI]);
        core.set_privilege_level(PrivilegeLevel::Supervisor);
        core.write_csr(csr::MSTATUS, 1 << 21).unwrap();
        core.step(1);
        assert_eq!(2, csr(&core, csr::MCAUSE));
        assert_eq!(WFI, csr(&core, csr::MTVAL));

        for instruction in [SFENCE_VMA, MRET, SRET] {
            let mut core = new_core(&[instruction]);
            core.set_privilege_level(PrivilegeLevel::User);
            core.step(1);
            assert_eq!(HANDLER, core.registers().pc());
            assert_eq!(2, csr(&core, csr::MCAUSE));
            assert_eq!(instruction, csr(&core, csr::MTVAL));
        }
    }

    #[test]
    fn test_ecall_and_ebreak() {
        let mut core = new_core(&[ECALL]);
        core.step(1);
        assert_eq!(11, csr(&core, csr::MCAUSE));
        assert_eq!(0, csr(&core, csr::MTVAL));
        assert_eq!(RAM_BASE, csr(&core, csr::MEPC));

        let mut core = new_core(&[0x0010_0073]);
        core.set_privilege_level(PrivilegeLevel::Supervisor);
        core.step(1);
        assert_eq!(3, csr(&core, csr::MCAUSE));
        // MPP holds S-mode.
        assert_eq!(0b01 << 11, csr(&core, csr::MSTATUS) & (0b11 << 11));
    }

    #[test]
    fn test_delegation_and_sret() {
        let mut core = new_core(&[MRET, NOP, NOP, NOP, ECALL]);
        write_word(&mut core, RAM_BASE + 0x200, SRET);
        core.write_csr(csr::MEDELEG, 1 << 8).unwrap();
        core.write_csr(csr::STVEC, RAM_BASE + 0x200).unwrap();
        core.write_csr(csr::MEPC, RAM_BASE + 0x10).unwrap();

        core.step(1);
        assert_eq!(PrivilegeLevel::User, core.privilege_level());
        assert_eq!(RAM_BASE + 0x10, core.registers().pc());

        core.step(1);
        assert_eq!(PrivilegeLevel::Supervisor, core.privilege_level());
        assert_eq!(RAM_BASE + 0x200, core.registers().pc());
        assert_eq!(8, csr(&core, csr::SCAUSE));
        assert_eq!(RAM_BASE + 0x10, csr(&core, csr::SEPC));
        assert_eq!(0, csr(&core, csr::MCAUSE));

        core.step(1);
        assert_eq!(PrivilegeLevel::User, core.privilege_level());
        assert_eq!(RAM_BASE + 0x10, core.registers().pc());
        // SPIE = 1, SPP = U.
        assert_eq!(1 << 5, csr(&core, csr::SSTATUS));
    }

    #[test]
    fn test_vectored_interrupt_delegation() {
        let mut core = new_core(&[MRET, NOP, NOP, NOP, NOP]);
        core.write_csr(csr::MIDELEG, STIP).unwrap();
        core.write_csr(csr::MIE, STIP).unwrap();
        core.write_csr(csr::STVEC, (RAM_BASE + 0x200) | 1).unwrap();
        core.write_csr(csr::MEPC, RAM_BASE + 0x10).unwrap();
        core.step(1);
        assert_eq!(PrivilegeLevel::User, core.privilege_level());

        core.raise_interrupts(STIP);
        core.step(1);
        assert_eq!(PrivilegeLevel::Supervisor, core.privilege_level());
        assert_eq!(RAM_BASE + 0x214, core.registers().pc());
        assert_eq!(0x8000_0005, csr(&core, csr::SCAUSE));
        assert_eq!(RAM_BASE + 0x10, csr(&core, csr::SEPC));
        assert_eq!(STIP, csr(&core, csr::SIP));
    }

    #[test]
    fn test_mret_clears_mprv() {
        let mut core = new_core(&[MRET]);
        // MPRV = 1, MPP = S, MIE = 1.
        core.write_csr(csr::MSTATUS, 1 << 17 | 0b01 << 11 | 1 << 3).unwrap();
        core.write_csr(csr::MEPC, RAM_BASE + 0x11).unwrap();
        core.step(1);
        assert_eq!(PrivilegeLevel::Supervisor, core.privilege_level());
        assert_eq!(RAM_BASE + 0x10, core.registers().pc());
        // MIE = MPIE = 0, MPIE = 1, MPP = U, MPRV = 0.
        assert_eq!(1 << 7, csr(&core, csr::MSTATUS));
    }

    #[test]
    fn test_atomics() {
        let data = RAM_BASE + 0x1000;
        let mut core = new_core(&[
            amo(0b00000, 3, 1, 2),  // amoadd.w x3, x2, (x1)
            amo(0b00010, 4, 1, 0),  // lr.w x4, (x1)
            amo(0b00011, 5, 1, 2),  // sc.w x5, x2, (x1)
            amo(0b00011, 6, 1, 2),  // sc.w x6, x2, (x1)
            amo(0b10000, 7, 1, 8),  // amomin.w x7, x8, (x1)
            amo(0b11100, 9, 1, 2),  // amomaxu.w x9, x2, (x1)
            amo(0b00001, 11, 10, 2), // amoswap.w x11, x2, (x10)
        ]);
        write_word(&mut core, data, 10);
        let registers = core.registers_mut();
        registers.set_x(x(1), data);
        registers.set_x(x(2), 5);
        registers.set_x(x(8), -3i32 as u32);
        registers.set_x(x(10), data + 2);

        core.step(2);
        assert_eq!(10, core.registers().x(x(3)));
        assert_eq!(15, core.registers().x(x(4)));
        assert_eq!(Some(data), core.state().reservation);

        core.step(2);
        assert_eq!(0, core.registers().x(x(5)));
        assert_eq!(1, core.registers().x(x(6)));
        assert_eq!(5, read_word(&mut core, data));
        assert_eq!(None, core.state().reservation);

        core.step(2);
        assert_eq!(5, core.registers().x(x(7)));
        assert_eq!(-3i32 as u32, core.registers().x(x(9)));
        assert_eq!(-3i32 as u32, read_word(&mut core, data));

        core.step(1);
        assert_eq!(6, csr(&core, csr::MCAUSE));
        assert_eq!(data + 2, csr(&core, csr::MTVAL));
        assert_eq!(0, core.registers().x(x(11)));
    }

    #[test]
    fn test_compressed_instructions() {
        let parcels: [u16; 8] = [
            0x4515, // c.li x10, 5
            0x050D, // c.addi x10, 3
            0x85AA, // c.mv x11, x10
            0x8613, // addi x12, x11, 1
            0x0015,
            0x2011, // c.jal 4
            0x0000,
            0x0000,
        ];
        let mut core = new_core(&[]);
        let image: Vec<u8> = parcels.iter().flat_map(|parcel| parcel.to_le_bytes()).collect();
        core.bus_mut().write_bytes(RAM_BASE, &image);

        core.step(4);
        let registers = core.registers();
        assert_eq!(8, registers.x(x(10)));
        assert_eq!(8, registers.x(x(11)));
        assert_eq!(9, registers.x(x(12)));
        assert_eq!(RAM_BASE + 10, registers.pc());

        core.step(1);
        assert_eq!(RAM_BASE + 12, core.registers().x(Specifier::RA));
        assert_eq!(RAM_BASE + 14, core.registers().pc());

        core.step(1);
        assert_eq!(HANDLER, core.registers().pc());
        assert_eq!(2, csr(&core, csr::MCAUSE));
        assert_eq!(0, csr(&core, csr::MTVAL));
        assert_eq!(RAM_BASE + 14, csr(&core, csr::MEPC));
    }

    #[test]
    fn test_fetch_faults() {
        let mut core = new_core(&[]);
        *core.registers_mut().pc_mut() = 0x1000;
        assert_eq!(Err(Exception::InstructionAccessFault(0x1000)), core.fetch());
        assert_eq!(
            Err(Exception::LoadAddressMisaligned(RAM_BASE + 1)),
            core.load(RAM_BASE + 1, AccessSize::Word)
        );
        assert_eq!(Ok(0), core.load(0x1000, AccessSize::Word));
    }

    #[test]
    fn test_snapshot() {
        let program = [
            addi(1, 0, 5),
            csrrw(0, csr::MSCRATCH, 1),
            addi(1, 1, 1),
            addi(2, 1, 1),
        ];
        let mut core = new_core(&program);
        core.step(2);
        let snapshot = core.state();
        let bytes = bincode::serialize(&snapshot).unwrap();
        let restored: CpuSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(snapshot, restored);

        let mut other = new_core(&program);
        other.set_state(&restored).unwrap();
        core.step(2);
        other.step(2);
        assert_eq!(core.state(), other.state());
        assert_eq!(7, other.registers().x(x(2)));
        assert_eq!(5, csr(&other, csr::MSCRATCH));
    }

    #[test]
    fn test_invalid_snapshot() {
        let mut core = new_core(&[]);
        let mut snapshot = core.state();
        snapshot.mstatus = 0b10 << 11;
        assert_eq!(
            Err(SnapshotError::IllegalStatus(0b10 << 11)),
            core.set_state(&snapshot)
        );
        snapshot.mstatus = 1 << 30;
        assert!(core.set_state(&snapshot).is_err());

        snapshot.mstatus = 0;
        snapshot.mtvec = RAM_BASE | 0b10;
        assert_eq!(
            Err(SnapshotError::ReservedVectorMode {
                register: "mtvec",
                value: RAM_BASE | 0b10
            }),
            core.set_state(&snapshot)
        );
        assert_eq!(HANDLER, csr(&core, csr::MTVEC));
    }

    #[test]
    fn test_reset() {
        let mut core = new_core(&[addi(1, 0, 1)]);
        core.step(1);
        core.write_csr(csr::MCAUSE, 5).unwrap();
        core.write_csr(csr::MSTATUS, 1 << 17 | 1 << 3 | 1 << 1).unwrap();
        core.set_privilege_level(PrivilegeLevel::Supervisor);

        core.reset();
        assert_eq!(RAM_BASE, core.registers().pc());
        assert_eq!(PrivilegeLevel::Machine, core.privilege_level());
        assert_eq!(0, csr(&core, csr::MCAUSE));
        assert_eq!(1 << 1, csr(&core, csr::MSTATUS));
        assert_eq!(1, core.registers().x(x(1)));
        assert_eq!(HANDLER, csr(&core, csr::MTVEC));

        core.reset_hard();
        assert_eq!(0, core.registers().x(x(1)));
        assert_eq!(0, csr(&core, csr::MSTATUS));
        assert_eq!(0, csr(&core, csr::MTVEC));
        assert_eq!(0, core.mcycle());
    }

    const ROOT_TABLE: u32 = RAM_BASE + 0x2000;
    const LEAF_TABLE: u32 = RAM_BASE + 0x3000;
    const SUPERVISOR_TABLE: u32 = RAM_BASE + 0x8000;

    /// PTE pointing to physical address `address`, with `flags` in its low bits.
    fn pte(address: u32, flags: u32) -> u32 {
        (address >> 12) << 10 | flags
    }

    /// Sets up page tables at `ROOT_TABLE`:
    ///
    /// - `0x0040_0000`: 4 MiB user superpage onto RAM, readable and executable.
    /// - `0x0080_0000`: 4 MiB user superpage onto RAM, execute-only.
    /// - `0x00C0_0000`: pointer to `LEAF_TABLE`, whose first entry is an illegal pointer.
    /// - `0x0100_0000`: superpage with W but not R.
    /// - `0x0140_0000`: pointer to `SUPERVISOR_TABLE`, whose first entry maps a supervisor page
    ///   onto `RAM_BASE + 0x4000`, readable and writable.
    fn sv32_core() -> Core<MemoryMap> {
        let mut core = new_core(&[]);
        let entries = [
            (1, pte(RAM_BASE, 0b1_1011)),
            (2, pte(RAM_BASE, 0b1_1001)),
            (3, pte(LEAF_TABLE, 0b1)),
            (4, pte(RAM_BASE, 0b1_0101)),
            (5, pte(SUPERVISOR_TABLE, 0b1)),
        ];
        for (index, entry) in entries {
            write_word(&mut core, ROOT_TABLE + 4 * index, entry);
        }
        write_word(&mut core, LEAF_TABLE, pte(LEAF_TABLE, 0b1));
        write_word(&mut core, SUPERVISOR_TABLE, pte(RAM_BASE + 0x4000, 0b0111));
        core.write_csr(csr::SATP, 1 << 31 | ROOT_TABLE >> 12).unwrap();
        core
    }

    #[test]
    fn test_sv32_accessed_and_dirty() {
        let mut core = sv32_core();
        core.set_privilege_level(PrivilegeLevel::Supervisor);
        write_word(&mut core, RAM_BASE + 0x4010, 0x1234_5678);

        assert_eq!(Ok(0x1234_5678), core.load(0x0140_0010, AccessSize::Word));
        assert_eq!(
            pte(RAM_BASE + 0x4000, 0b0100_0111),
            read_word(&mut core, SUPERVISOR_TABLE)
        );

        assert_eq!(Ok(()), core.store(0x0140_0020, 0xAB, AccessSize::Byte));
        assert_eq!(0xAB, read_word(&mut core, RAM_BASE + 0x4020));
        assert_eq!(
            pte(RAM_BASE + 0x4000, 0b1100_0111),
            read_word(&mut core, SUPERVISOR_TABLE)
        );

        // Not executable.
        *core.registers_mut().pc_mut() = 0x0140_0000;
        assert_eq!(Err(Exception::InstructionPageFault(0x0140_0000)), core.fetch());
        // Not mapped.
        assert_eq!(
            Err(Exception::StoreOrAmoPageFault(0x0200_0000)),
            core.store(0x0200_0000, 0, AccessSize::Word)
        );

        core.set_privilege_level(PrivilegeLevel::Machine);
        assert_eq!(Ok(0x1234_5678), core.load(RAM_BASE + 0x4010, AccessSize::Word));
    }

    #[test]
    fn test_sv32_permissions() {
        let mut core = sv32_core();
        write_word(&mut core, RAM_BASE + 0x1234, 0xCAFE_F00D);
        write_word(&mut core, RAM_BASE, 0x0BAD_CAFE);

        core.set_privilege_level(PrivilegeLevel::User);
        assert_eq!(Ok(0xCAFE_F00D), core.load(0x0040_1234, AccessSize::Word));
        assert_eq!(
            Err(Exception::StoreOrAmoPageFault(0x0040_1234)),
            core.store(0x0040_1234, 0, AccessSize::Word)
        );
        // Supervisor pages are not accessible from U-mode.
        assert_eq!(
            Err(Exception::LoadPageFault(0x0140_0000)),
            core.load(0x0140_0000, AccessSize::Word)
        );
        // Execute-only, unless MXR is set.
        assert_eq!(
            Err(Exception::LoadPageFault(0x0080_0000)),
            core.load(0x0080_0000, AccessSize::Word)
        );
        core.write_csr(csr::MSTATUS, 1 << 19).unwrap();
        assert_eq!(Ok(0x0BAD_CAFE), core.load(0x0080_0000, AccessSize::Word));
        // Non-leaf entry at level 0.
        assert_eq!(
            Err(Exception::LoadPageFault(0x00C0_0000)),
            core.load(0x00C0_0000, AccessSize::Word)
        );
        // W without R.
        assert_eq!(
            Err(Exception::LoadPageFault(0x0100_0000)),
            core.load(0x0100_0000, AccessSize::Word)
        );

        core.set_privilege_level(PrivilegeLevel::Supervisor);
        assert_eq!(
            Err(Exception::LoadPageFault(0x0040_1234)),
            core.load(0x0040_1234, AccessSize::Word)
        );
        core.write_csr(csr::MSTATUS, 1 << 18).unwrap();
        assert_eq!(Ok(0xCAFE_F00D), core.load(0x0040_1234, AccessSize::Word));
        // S-mode can never execute from user pages.
        *core.registers_mut().pc_mut() = 0x0040_1000;
        assert_eq!(Err(Exception::InstructionPageFault(0x0040_1000)), core.fetch());
    }

    #[test]
    fn test_sv32_mprv() {
        let mut core = sv32_core();
        write_word(&mut core, RAM_BASE + 0x1234, 0xCAFE_F00D);

        // MPRV = 1, MPP = U.
        core.write_csr(csr::MSTATUS, 1 << 17).unwrap();
        assert_eq!(Ok(0xCAFE_F00D), core.load(0x0040_1234, AccessSize::Word));
        // Fetches are not affected.
        *core.registers_mut().pc_mut() = RAM_BASE;
        assert_eq!(Ok(0), core.fetch());

        // MPP = S, without SUM.
        core.write_csr(csr::MSTATUS, 1 << 17 | 0b01 << 11).unwrap();
        assert_eq!(
            Err(Exception::LoadPageFault(0x0040_1234)),
            core.load(0x0040_1234, AccessSize::Word)
        );
    }

    #[test]
    fn test_satp_change_walks_again() {
        let mut core = sv32_core();
        let other_root = RAM_BASE + 0x5000;
        let other_table = RAM_BASE + 0x9000;
        write_word(&mut core, other_root + 4 * 5, pte(other_table, 0b1));
        write_word(&mut core, other_table, pte(RAM_BASE + 0x6000, 0b0111));
        write_word(&mut core, RAM_BASE + 0x4000, 0x1111_1111);
        write_word(&mut core, RAM_BASE + 0x6000, 0x2222_2222);
        core.set_privilege_level(PrivilegeLevel::Supervisor);

        assert_eq!(Ok(0x1111_1111), core.load(0x0140_0000, AccessSize::Word));
        // Cached until the next flush.
        write_word(&mut core, SUPERVISOR_TABLE, 0);
        assert_eq!(Ok(0x1111_1111), core.load(0x0140_0000, AccessSize::Word));

        core.write_csr(csr::SATP, 1 << 31 | other_root >> 12).unwrap();
        assert_eq!(Ok(0x2222_2222), core.load(0x0140_0000, AccessSize::Word));

        core.write_csr(csr::SATP, 1 << 31 | ROOT_TABLE >> 12).unwrap();
        assert_eq!(
            Err(Exception::LoadPageFault(0x0140_0000)),
            core.load(0x0140_0000, AccessSize::Word)
        );
    }

    #[test]
    fn test_sfence_vma_flushes() {
        let mut core = sv32_core();
        write_word(&mut core, RAM_BASE + 0x4000, 0x1111_1111);
        core.set_privilege_level(PrivilegeLevel::Supervisor);

        assert_eq!(Ok(0x1111_1111), core.load(0x0140_0000, AccessSize::Word));
        write_word(&mut core, SUPERVISOR_TABLE, 0);
        // The page tables map no supervisor code, so execute the fence directly.
        let sfence_vma = Instruction::decode(SFENCE_VMA).unwrap();
        core.execute_instruction(sfence_vma, SFENCE_VMA, 4).unwrap();
        assert_eq!(
            Err(Exception::LoadPageFault(0x0140_0000)),
            core.load(0x0140_0000, AccessSize::Word)
        );
    }
}
