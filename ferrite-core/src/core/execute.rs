use log::warn;

use super::{Core, Exception, ExecutionResult};
use crate::bus::{AccessSize, Bus};
use crate::csr::CsrSpecifier;
use crate::instruction::FenceOrderCombination;
use crate::registers::{Registers, Specifier};
use crate::PrivilegeLevel;

#[derive(Debug)]
pub(super) struct Executor<'c, B: Bus> {
    pub core: &'c mut Core<B>,
    /// Length of the executed instruction in bytes: 2 for compressed instructions, 4 otherwise.
    pub length: u32,
    /// The instruction as it was fetched, reported as trap value of illegal-instruction
    /// exceptions.
    pub raw_instruction: u32,
}

impl<'c, B: Bus> Executor<'c, B> {
    /// Executes an `addi` instruction.
    ///
    /// Corresponds to the assembly instruction `addi dest src immediate`.
    ///
    /// > ADDI adds the sign-extended 12-bit immediate to register rs1. Arithmetic overflow is
    /// > ignored and the result is simply the low XLEN bits of the result. ADDI rd, rs1, 0 is used
    /// > to implement the MV rd, rs1 assembler pseudoinstruction.
    pub fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add_signed(imm))
    }

    /// Executes a `slti` instruction.
    ///
    /// Corresponds to the assembly instruction `slti dest src immediate`.
    ///
    /// > SLTI (set less than immediate) places the value 1 in register rd if register rs1 is less
    /// > than the sign-extended immediate when both are treated as signed numbers, else 0 is
    /// > written to rd.
    pub fn slti(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i32) < imm) as u32)
    }

    /// Executes a `sltiu` instruction.
    ///
    /// Corresponds to the assembly instruction `sltiu dest src immediate`.
    ///
    /// > SLTIU is similar but compares the values as unsigned numbers (i.e., the immediate is first
    /// > sign-extended to XLEN bits then treated as an unsigned number).
    pub fn sltiu(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < (imm as u32)) as u32)
    }

    /// Executes an `andi` instruction.
    ///
    /// Corresponds to the assembly instruction `andi dest src immediate`.
    pub fn andi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & (imm as u32))
    }

    /// Executes an `ori` instruction.
    ///
    /// Corresponds to the assembly instruction `ori dest src immediate`.
    pub fn ori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | (imm as u32))
    }

    /// Executes a `xori` instruction.
    ///
    /// Corresponds to the assembly instruction `xori dest src immediate`.
    ///
    /// > Note, XORI rd, rs1, -1 performs a bitwise logical inversion of register rs1 (assembler
    /// > pseudoinstruction NOT rd, rs).
    pub fn xori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ (imm as u32))
    }

    /// Executes a `slli` instruction.
    ///
    /// Corresponds to the assembly instruction `slli dest src shift_amount_u5`.
    ///
    /// > SLLI is a logical left shift (zeros are shifted into the lower bits).
    pub fn slli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s << shamt)
    }

    /// Executes a `srli` instruction.
    ///
    /// Corresponds to the assembly instruction `srli dest src shift_amount_u5`.
    ///
    /// > SRLI is a logical right shift (zeros are shifted into the upper bits).
    pub fn srli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s >> shamt)
    }

    /// Executes a `srai` instruction.
    ///
    /// Corresponds to the assembly instruction `srai dest src shift_amount_u5`.
    ///
    /// > SRAI is an arithmetic right shift (the original sign bit is copied into the vacated upper
    /// > bits).
    pub fn srai(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| {
            ((s as i32) >> shamt) as u32
        })
    }

    /// Executes a `lui` instruction.
    ///
    /// Corresponds to the assembly instruction `lui dest immediate`.
    ///
    /// > LUI places the U-immediate value in the top 20 bits of the destination register rd,
    /// > filling in the lowest 12 bits with zeros.
    ///
    /// The bottom 12 bits of `immediate` are discarded.
    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        self.core.registers.set_x(dest, immediate as u32 & !0xFFF);
        self.increment_pc();
        Ok(())
    }

    /// Executes an `auipc` instruction.
    ///
    /// Corresponds to the assembly instruction `auipc dest immediate`.
    ///
    /// > AUIPC forms a 32-bit offset from the 20-bit U-immediate, filling in the lowest 12 bits
    /// > with zeros, adds this offset to the address of the AUIPC instruction, then places the
    /// > result in register rd.
    pub fn auipc(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let registers = &mut self.core.registers;
        let result = registers.pc().wrapping_add_signed(immediate & !0xFFF);
        registers.set_x(dest, result);
        self.increment_pc();
        Ok(())
    }

    /// Executes an `add` instruction.
    ///
    /// Corresponds to the assembly instruction `add dest src1 src2`.
    pub fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    /// Executes a `sub` instruction.
    ///
    /// Corresponds to the assembly instruction `sub dest src1 src2`.
    pub fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    /// Executes a `slt` instruction.
    ///
    /// Corresponds to the assembly instruction `slt dest src1 src2`.
    ///
    /// > SLT and SLTU perform signed and unsigned compares respectively, writing 1 to rd if
    /// > rs1 < rs2, 0 otherwise.
    pub fn slt(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) < (s2 as i32)) as u32
        })
    }

    /// Executes a `sltu` instruction.
    ///
    /// Corresponds to the assembly instruction `sltu dest src1 src2`.
    pub fn sltu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| (s1 < s2) as u32)
    }

    pub fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    pub fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    pub fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    /// Executes a `sll` instruction.
    ///
    /// Corresponds to the assembly instruction `sll dest src1 src2`.
    ///
    /// > SLL, SRL, and SRA perform logical left, logical right, and arithmetic right shifts on the
    /// > value in register rs1 by the shift amount held in the lower 5 bits of register rs2.
    pub fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 << (s2 & 0x1F))
    }

    pub fn srl(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 >> (s2 & 0x1F))
    }

    pub fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) >> (s2 & 0x1F)) as u32
        })
    }

    /// Executes a `mul` instruction.
    ///
    /// Corresponds to the assembly instruction `mul dest src1 src2`.
    ///
    /// > MUL performs an XLEN-bit×XLEN-bit multiplication of rs1 by rs2 and places the lower XLEN
    /// > bits in the destination register.
    pub fn mul(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_mul(s2))
    }

    /// Executes a `mulh` instruction.
    ///
    /// Corresponds to the assembly instruction `mulh dest src1 src2`.
    ///
    /// > MULH, MULHU, and MULHSU perform the same multiplication but return the upper XLEN bits
    /// > of the full 2×XLEN-bit product, for signed×signed, unsigned×unsigned, and
    /// > signed rs1×unsigned rs2 multiplication, respectively.
    pub fn mulh(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64 * s2 as i32 as i64) >> 32) as u32
        })
    }

    pub fn mulhsu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64 * s2 as i64) >> 32) as u32
        })
    }

    pub fn mulhu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as u64 * s2 as u64) >> 32) as u32
        })
    }

    /// Executes a `div` instruction.
    ///
    /// Corresponds to the assembly instruction `div dest src1 src2`.
    ///
    /// > DIV and DIVU perform an XLEN bits by XLEN bits signed and unsigned integer division of
    /// > rs1 by rs2, rounding towards zero.
    ///
    /// > The quotient of division by zero has all bits set.
    ///
    /// > Signed division overflow occurs only when the most-negative integer is divided by −1. The
    /// > quotient of a signed division with overflow is equal to the dividend.
    pub fn div(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => u32::MAX,
            _ => (s1 as i32).wrapping_div(s2 as i32) as u32,
        })
    }

    pub fn divu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => u32::MAX,
            _ => s1 / s2,
        })
    }

    /// Executes a `rem` instruction.
    ///
    /// Corresponds to the assembly instruction `rem dest src1 src2`.
    ///
    /// > REM and REMU provide the remainder of the corresponding division operation. For REM, the
    /// > sign of a nonzero result equals the sign of the dividend.
    ///
    /// > The remainder of division by zero equals the dividend. [...] the remainder is zero [on
    /// > signed overflow].
    pub fn rem(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => s1,
            _ => (s1 as i32).wrapping_rem(s2 as i32) as u32,
        })
    }

    pub fn remu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => s1,
            _ => s1 % s2,
        })
    }

    /// Executes a `jal` instruction.
    ///
    /// > The jump and link (JAL) instruction [...] stores the address of the instruction
    /// > following the jump ('pc'+4) into register rd.
    ///
    /// For a compressed jump, the link address is `pc + 2`.
    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| registers.pc().wrapping_add_signed(offset))
    }

    /// Executes a `jalr` instruction.
    ///
    /// > The target address is obtained by adding the sign-extended 12-bit I-immediate to the
    /// > register rs1, then setting the least-significant bit of the result to zero.
    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| {
            registers.x(base).wrapping_add_signed(offset) & !1
        })
    }

    pub fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 == s2)
    }

    pub fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 != s2)
    }

    pub fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) < (s2 as i32))
    }

    pub fn bltu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 < s2)
    }

    pub fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) >= (s2 as i32))
    }

    pub fn bgeu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 >= s2)
    }

    pub fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, AccessSize::Byte, |value| value as i8 as u32)
    }

    pub fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, AccessSize::Byte, |value| value)
    }

    pub fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, AccessSize::Halfword, |value| {
            value as i16 as u32
        })
    }

    pub fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, AccessSize::Halfword, |value| value)
    }

    pub fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, AccessSize::Word, |value| value)
    }

    pub fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, AccessSize::Byte)
    }

    pub fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, AccessSize::Halfword)
    }

    pub fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, AccessSize::Word)
    }

    pub fn fence(
        &mut self,
        predecessor: FenceOrderCombination,
        successor: FenceOrderCombination,
    ) -> ExecutionResult {
        // Since only one hart is supported, this is equivalent to a nop instruction.
        let _ = predecessor;
        let _ = successor;
        self.increment_pc();
        Ok(())
    }

    /// Executes a `fence.i` instruction.
    ///
    /// There is no instruction cache: stores are always visible to subsequent fetches.
    pub fn fence_i(&mut self) -> ExecutionResult {
        self.increment_pc();
        Ok(())
    }

    /// Executes a `csrrw` instruction.
    ///
    /// > If rd=x0, then the instruction shall not read the CSR and shall not cause any of the
    /// > side effects that might occur on a CSR read.
    pub fn csrrw(&mut self, dest: Specifier, csr: CsrSpecifier, src: Specifier) -> ExecutionResult {
        let value = self.core.registers.x(src);
        self.csr_op(dest, csr, dest != Specifier::X0, true, |_| value)
    }

    /// Executes a `csrrs` instruction.
    ///
    /// > If rs1=x0, then the instruction will not write to the CSR at all, and so shall not cause
    /// > any of the side effects that might otherwise occur on a CSR write, nor raise
    /// > illegal-instruction exceptions on accesses to read-only CSRs.
    pub fn csrrs(&mut self, dest: Specifier, csr: CsrSpecifier, src: Specifier) -> ExecutionResult {
        let mask = self.core.registers.x(src);
        self.csr_op(dest, csr, true, src != Specifier::X0, |old| old | mask)
    }

    pub fn csrrc(&mut self, dest: Specifier, csr: CsrSpecifier, src: Specifier) -> ExecutionResult {
        let mask = self.core.registers.x(src);
        self.csr_op(dest, csr, true, src != Specifier::X0, |old| old & !mask)
    }

    pub fn csrrwi(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_op(dest, csr, dest != Specifier::X0, true, |_| immediate)
    }

    pub fn csrrsi(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_op(dest, csr, true, immediate != 0, |old| old | immediate)
    }

    pub fn csrrci(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        self.csr_op(dest, csr, true, immediate != 0, |old| old & !immediate)
    }

    /// Executes a `lr.w` instruction.
    ///
    /// > LR.W loads a word from the address in rs1, places the sign-extended value in rd, and
    /// > registers a reservation set—a set of bytes that subsumes the bytes in the addressed word.
    pub fn lr_w(&mut self, dest: Specifier, address: Specifier) -> ExecutionResult {
        let address = self.core.registers.x(address);
        let value = self.core.load_reserved(address)?;
        self.core.registers.set_x(dest, value);
        self.increment_pc();
        Ok(())
    }

    /// Executes a `sc.w` instruction.
    ///
    /// > SC.W conditionally writes a word in rs2 to the address in rs1: the SC.W succeeds only if
    /// > the reservation is still valid and the reservation set contains the bytes being written.
    /// > If the SC.W succeeds, the instruction writes the word in rs2 to memory, and it writes zero
    /// > to rd. If the SC.W fails, the instruction does not write to memory, and it writes a
    /// > nonzero value to rd. Regardless of success or failure, executing an SC.W instruction
    /// > invalidates any reservation held by this hart.
    pub fn sc_w(&mut self, dest: Specifier, address: Specifier, src: Specifier) -> ExecutionResult {
        let registers = &self.core.registers;
        let (address, value) = (registers.x(address), registers.x(src));
        let stored = self.core.store_conditional(address, value)?;
        self.core.registers.set_x(dest, !stored as u32);
        self.increment_pc();
        Ok(())
    }

    pub fn amoswap_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |_, s| s)
    }

    pub fn amoadd_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m.wrapping_add(s))
    }

    pub fn amoxor_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m ^ s)
    }

    pub fn amoand_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m & s)
    }

    pub fn amoor_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m | s)
    }

    pub fn amomin_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| (m as i32).min(s as i32) as u32)
    }

    pub fn amomax_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| (m as i32).max(s as i32) as u32)
    }

    pub fn amominu_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m.min(s))
    }

    pub fn amomaxu_w(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m.max(s))
    }

    /// Executes an `ecall` instruction.
    ///
    /// > The ECALL instruction is used to make a service request to the execution environment.
    pub fn ecall(&mut self) -> ExecutionResult {
        Err(match self.core.privilege_level {
            PrivilegeLevel::User => Exception::EnvironmentCallFromUMode,
            PrivilegeLevel::Supervisor => Exception::EnvironmentCallFromSMode,
            PrivilegeLevel::Machine => Exception::EnvironmentCallFromMMode,
        })
    }

    /// Executes an `ebreak` instruction.
    ///
    /// > The EBREAK instruction is used to return control to a debugging environment.
    pub fn ebreak(&mut self) -> ExecutionResult {
        Err(Exception::Breakpoint)
    }

    pub fn sret(&mut self) -> ExecutionResult {
        self.core.sret(self.raw_instruction)
    }

    pub fn mret(&mut self) -> ExecutionResult {
        self.core.mret(self.raw_instruction)
    }

    /// Executes a `wfi` instruction.
    ///
    /// > The Wait for Interrupt instruction (WFI) provides a hint to the implementation that the
    /// > current hart can be stalled until an interrupt might need servicing.
    ///
    /// > When TW=1, then if WFI is executed in any less-privileged mode, and it does not complete
    /// > within an implementation-specific, bounded time limit, the WFI instruction causes an
    /// > illegal instruction exception.
    ///
    /// The time limit is zero, and WFI is never allowed in U-mode. The hart stays halted until an
    /// interrupt is both pending and enabled in mie, regardless of the global interrupt-enable
    /// bits.
    pub fn wfi(&mut self) -> ExecutionResult {
        let allowed = match self.core.privilege_level {
            PrivilegeLevel::Machine => true,
            PrivilegeLevel::Supervisor => !self.core.status.tw(),
            PrivilegeLevel::User => false,
        };
        if !allowed {
            return Err(Exception::IllegalInstruction(self.raw_instruction));
        }
        if self.core.interrupts.pending_enabled() == 0 {
            if self.core.interrupts.read_mie() == 0 {
                let pc = self.core.registers.pc();
                warn!("WFI at {pc:#010x} with all interrupts disabled, the hart will not wake up");
            }
            self.core.halted = true;
        }
        self.increment_pc();
        Ok(())
    }

    /// Executes a `sfence.vma` instruction.
    ///
    /// ASIDs are not implemented, and every fence flushes all cached translations.
    ///
    /// > When TVM=1, attempts to read or write the satp CSR or execute an SFENCE.VMA or SINVAL.VMA
    /// > instruction while executing in S-mode will raise an illegal instruction exception.
    pub fn sfence_vma(&mut self, vaddr: Specifier, asid: Specifier) -> ExecutionResult {
        let _ = vaddr;
        let _ = asid;
        let allowed = match self.core.privilege_level {
            PrivilegeLevel::Machine => true,
            PrivilegeLevel::Supervisor => !self.core.status.tvm(),
            PrivilegeLevel::User => false,
        };
        if !allowed {
            return Err(Exception::IllegalInstruction(self.raw_instruction));
        }
        self.core.tlb.flush();
        self.increment_pc();
        Ok(())
    }

    #[inline]
    fn reg_imm_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, i32) -> u32,
    {
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src), immediate));
        self.increment_pc();
        Ok(())
    }

    #[inline]
    fn reg_shamt_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        debug_assert!(shift_amount_u5 <= 31, "out of range u5 used");
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src), shift_amount_u5 & 0x1F));
        self.increment_pc();
        Ok(())
    }

    #[inline]
    fn reg_reg_op<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src1), registers.x(src2)));
        self.increment_pc();
        Ok(())
    }

    // With the C extension every target with bit 0 clear is aligned, so jumps and branches never
    // raise instruction-address-misaligned.
    fn jump_op<F>(&mut self, dest: Specifier, compute_target: F) -> ExecutionResult
    where
        F: FnOnce(&Registers) -> u32,
    {
        let length = self.length;
        let registers = &mut self.core.registers;
        let new_pc = compute_target(registers);
        let old_pc = registers.replace_pc(new_pc);
        registers.set_x(dest, old_pc.wrapping_add(length));
        Ok(())
    }

    // Takes the branch if `predicate` returns `true`.
    fn cond_branch<P>(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        predicate: P,
    ) -> ExecutionResult
    where
        P: FnOnce(u32, u32) -> bool,
    {
        let registers = &mut self.core.registers;
        if predicate(registers.x(src1), registers.x(src2)) {
            let new_pc = registers.pc().wrapping_add_signed(offset);
            *registers.pc_mut() = new_pc;
        } else {
            self.increment_pc();
        }
        Ok(())
    }

    #[inline]
    fn load_op<F>(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
        size: AccessSize,
        extend: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32) -> u32,
    {
        let address = self.core.registers.x(base).wrapping_add_signed(offset);
        let value = self.core.load(address, size)?;
        self.core.registers.set_x(dest, extend(value));
        self.increment_pc();
        Ok(())
    }

    #[inline]
    fn store_op(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
        size: AccessSize,
    ) -> ExecutionResult {
        let registers = &self.core.registers;
        let value = registers.x(src);
        let address = registers.x(base).wrapping_add_signed(offset);
        self.core.store(address, value, size)?;
        self.increment_pc();
        Ok(())
    }

    /// Shared implementation of the Zicsr instructions.
    ///
    /// The CSR is only read if `read` is set, and only written (with `op(old_value)`) if `write`
    /// is set. Any failed check raises an illegal-instruction exception.
    fn csr_op<F>(
        &mut self,
        dest: Specifier,
        csr: CsrSpecifier,
        read: bool,
        write: bool,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32) -> u32,
    {
        let illegal = Exception::IllegalInstruction(self.raw_instruction);
        self.core.check_csr(csr, write).map_err(|_| illegal)?;
        let old_value = match read {
            true => self.core.read_csr(csr).map_err(|_| illegal)?,
            false => 0,
        };
        if write {
            self.core.write_csr(csr, op(old_value)).map_err(|_| illegal)?;
        }
        self.core.registers.set_x(dest, old_value);
        self.increment_pc();
        Ok(())
    }

    fn amo_op<F>(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let registers = &self.core.registers;
        let (address, operand) = (registers.x(address), registers.x(src));
        let old_value = self
            .core
            .atomic_memory_operation(address, |value| op(value, operand))?;
        self.core.registers.set_x(dest, old_value);
        self.increment_pc();
        Ok(())
    }

    fn increment_pc(&mut self) {
        let pc = self.core.registers.pc_mut();
        *pc = pc.wrapping_add(self.length);
    }
}
