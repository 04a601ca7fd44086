//! Decoding of 32-bit instructions and expansion of 16-bit compressed instructions.

mod compressed;

use crate::csr::CsrSpecifier;
use crate::registers::Specifier;
use thiserror::Error;

/// Data structure that can hold any supported instruction in its decoded form.
///
/// Compressed instructions decode into the base instruction they expand to, so the executor never
/// needs to know about them, apart from the instruction length.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    },
    OpShiftImm {
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    },
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    Fence {
        predecessor: FenceOrderCombination,
        successor: FenceOrderCombination,
    },
    FenceI,
    Csr {
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src: Specifier,
    },
    Csri {
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    },
    LrW {
        dest: Specifier,
        address: Specifier,
    },
    ScW {
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    },
    Amo {
        op: AmoOp,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    },
    Ecall,
    Ebreak,
    Sret,
    Mret,
    Wfi,
    SfenceVma {
        vaddr: Specifier,
        asid: Specifier,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegShiftImmOp {
    Slli,
    Srli,
    Srai,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegRegOp {
    Add,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sub,
    Sra,
    // "M" extension
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FenceOrderCombination {
    pub device_input: bool,
    pub device_output: bool,
    pub memory_reads: bool,
    pub memory_writes: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    /// Atomic read/write CSR.
    ReadWrite,
    /// Atomic read and set bits in CSR.
    ReadSet,
    /// Atomic read and clear bits in CSR.
    ReadClear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmoOp {
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    Minu,
    Maxu,
}

/// Returns `true` if the 16-bit parcel `first_parcel` starts a compressed (16-bit) instruction.
///
/// > The base RISC-V ISA has fixed-length 32-bit instructions [...]. The compressed instruction
/// > set extension allows 16-bit instructions, which have their lowest two bits different from
/// > `11`.
pub fn is_compressed(first_parcel: u16) -> bool {
    first_parcel & 0b11 != 0b11
}

impl Instruction {
    /// Decode a 32-bit instruction.
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        match opcode(raw_instruction).ok_or(DecodeError::UnsupportedOpcode)? {
            Opcode::OpImm => match i_funct(raw_instruction) {
                Some(op) => Ok(Self::OpImm {
                    op,
                    dest: rd(raw_instruction),
                    src: rs1(raw_instruction),
                    immediate: i_imm(raw_instruction),
                }),
                None => match i_shfunct(raw_instruction) {
                    Some(op) => Ok(Self::OpShiftImm {
                        op,
                        dest: rd(raw_instruction),
                        src: rs1(raw_instruction),
                        shift_amount_u5: shamt(raw_instruction),
                    }),
                    None => Err(DecodeError::IllegalInstruction),
                },
            },
            Opcode::Auipc => Ok(Self::Auipc {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Lui => Ok(Self::Lui {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            Opcode::Op => match r_funct(raw_instruction) {
                Some(op) => Ok(Self::Op {
                    op,
                    dest: rd(raw_instruction),
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Jal => Ok(Self::Jal {
                dest: rd(raw_instruction),
                offset: j_imm(raw_instruction),
            }),
            Opcode::Jalr => match funct3(raw_instruction) {
                0b000 => Ok(Self::Jalr {
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                _ => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Branch => match b_funct(raw_instruction) {
                Some(condition) => Ok(Self::Branch {
                    condition,
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                    offset: b_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Load => match i_width(raw_instruction) {
                Some(width) => Ok(Self::Load {
                    width,
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Store => match s_width(raw_instruction) {
                Some(width) => Ok(Self::Store {
                    width,
                    src: rs2(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: s_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            Opcode::MiscMem => match funct3(raw_instruction) {
                0b000 => {
                    // All unused fields in the FENCE instruction encoding (fm, rs1, rd) are
                    // reserved for future use, and must be treated as a normal fence for forward
                    // compatibility. The same goes for FENCE.TSO, which is not supported.
                    let predecessor = FenceOrderCombination {
                        device_input: (raw_instruction >> 27) & 0b1 == 1,
                        device_output: (raw_instruction >> 26) & 0b1 == 1,
                        memory_reads: (raw_instruction >> 25) & 0b1 == 1,
                        memory_writes: (raw_instruction >> 24) & 0b1 == 1,
                    };
                    let successor = FenceOrderCombination {
                        device_input: (raw_instruction >> 23) & 0b1 == 1,
                        device_output: (raw_instruction >> 22) & 0b1 == 1,
                        memory_reads: (raw_instruction >> 21) & 0b1 == 1,
                        memory_writes: (raw_instruction >> 20) & 0b1 == 1,
                    };
                    Ok(Self::Fence {
                        predecessor,
                        successor,
                    })
                }
                // Zifencei: only the exact encoding with all other fields zero is accepted.
                0b001 if raw_instruction == 0x0000_100F => Ok(Self::FenceI),
                _ => Err(DecodeError::IllegalInstruction),
            },
            Opcode::Amo => decode_amo(raw_instruction),
            Opcode::System => decode_system(raw_instruction),
        }
    }

    /// Decode a 16-bit compressed instruction into the base instruction it expands to.
    pub fn decode_compressed(raw_instruction: u16) -> Result<Self, DecodeError> {
        compressed::expand(raw_instruction)
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("instruction has unsupported opcode")]
    UnsupportedOpcode,
    #[error("illegal instruction")]
    IllegalInstruction,
    #[error("reserved compressed instruction encoding")]
    ReservedCompressed,
}

fn decode_amo(raw_instruction: u32) -> Result<Instruction, DecodeError> {
    if funct3(raw_instruction) != 0b010 {
        return Err(DecodeError::IllegalInstruction);
    }
    let dest = rd(raw_instruction);
    let address = rs1(raw_instruction);
    let src = rs2(raw_instruction);
    // Bits 26 and 25 hold the aq and rl ordering bits, which are meaningless on a single hart.
    #[allow(clippy::unusual_byte_groupings)]
    let op = match raw_instruction >> 27 {
        0b00010 if src == Specifier::X0 => return Ok(Instruction::LrW { dest, address }),
        0b00011 => return Ok(Instruction::ScW { dest, address, src }),
        0b00001 => AmoOp::Swap,
        0b00000 => AmoOp::Add,
        0b00100 => AmoOp::Xor,
        0b01100 => AmoOp::And,
        0b01000 => AmoOp::Or,
        0b10000 => AmoOp::Min,
        0b10100 => AmoOp::Max,
        0b11000 => AmoOp::Minu,
        0b11100 => AmoOp::Maxu,
        _ => return Err(DecodeError::IllegalInstruction),
    };
    Ok(Instruction::Amo {
        op,
        dest,
        address,
        src,
    })
}

fn decode_system(raw_instruction: u32) -> Result<Instruction, DecodeError> {
    let dest = rd(raw_instruction);
    let csr = (raw_instruction >> 20) as CsrSpecifier;
    let csr_op = |op| Instruction::Csr {
        op,
        dest,
        csr,
        src: rs1(raw_instruction),
    };
    let csri_op = |op| Instruction::Csri {
        op,
        dest,
        csr,
        immediate: (raw_instruction >> 15) & 0x1F,
    };
    match funct3(raw_instruction) {
        0b000 => decode_privileged(raw_instruction),
        0b001 => Ok(csr_op(CsrOp::ReadWrite)),
        0b010 => Ok(csr_op(CsrOp::ReadSet)),
        0b011 => Ok(csr_op(CsrOp::ReadClear)),
        0b101 => Ok(csri_op(CsrOp::ReadWrite)),
        0b110 => Ok(csri_op(CsrOp::ReadSet)),
        0b111 => Ok(csri_op(CsrOp::ReadClear)),
        _ => Err(DecodeError::IllegalInstruction),
    }
}

/// Decodes the SYSTEM instructions with `funct3 == 0`.
fn decode_privileged(raw_instruction: u32) -> Result<Instruction, DecodeError> {
    if rd(raw_instruction) != Specifier::X0 {
        return Err(DecodeError::IllegalInstruction);
    }
    if funct7(raw_instruction) == 0b0001001 {
        return Ok(Instruction::SfenceVma {
            vaddr: rs1(raw_instruction),
            asid: rs2(raw_instruction),
        });
    }
    if rs1(raw_instruction) != Specifier::X0 {
        return Err(DecodeError::IllegalInstruction);
    }
    match raw_instruction >> 20 {
        0x000 => Ok(Instruction::Ecall),
        0x001 => Ok(Instruction::Ebreak),
        0x102 => Ok(Instruction::Sret),
        0x302 => Ok(Instruction::Mret),
        0x105 => Ok(Instruction::Wfi),
        _ => Err(DecodeError::IllegalInstruction),
    }
}

/// Returns the 7-bit *opcode* value of the instruction, or `None` if it isn't supported.
fn opcode(raw_instruction: u32) -> Option<Opcode> {
    #[allow(clippy::unusual_byte_groupings)]
    match raw_instruction & 0x7F {
        0b00_000_11 => Some(Opcode::Load),
        // LoadFp = 0b00_001_11,
        // custom-0
        0b00_011_11 => Some(Opcode::MiscMem),
        0b00_100_11 => Some(Opcode::OpImm),
        0b00_101_11 => Some(Opcode::Auipc),
        // OP-IMM-32
        // 48b
        0b01_000_11 => Some(Opcode::Store),
        // StoreFp = 0b01_001_11,
        // custom-1
        0b01_011_11 => Some(Opcode::Amo),
        0b01_100_11 => Some(Opcode::Op),
        0b01_101_11 => Some(Opcode::Lui),
        // OP-32
        // 64b
        // Madd = 0b10_000_11,
        // Msub = 0b10_001_11,
        // Nmsub = 0b10_010_11,
        // Nmadd = 0b10_011_11,
        // OpFp = 0b10_100_11,
        // reserved
        // custom-2/rv128
        // 48b
        0b11_000_11 => Some(Opcode::Branch),
        0b11_001_11 => Some(Opcode::Jalr),
        // reserved
        0b11_011_11 => Some(Opcode::Jal),
        0b11_100_11 => Some(Opcode::System),
        // reserved
        // custom-3/rv128
        // >= 80b
        _ => None,
    }
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 20) & 0x1F) as u8)
}

fn i_funct(raw_instruction: u32) -> Option<RegImmOp> {
    match funct3(raw_instruction) {
        0b000 => Some(RegImmOp::Addi),
        0b010 => Some(RegImmOp::Slti),
        0b011 => Some(RegImmOp::Sltiu),
        0b100 => Some(RegImmOp::Xori),
        0b110 => Some(RegImmOp::Ori),
        0b111 => Some(RegImmOp::Andi),
        _ => None,
    }
}

fn i_shfunct(raw_instruction: u32) -> Option<RegShiftImmOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b001) => Some(RegShiftImmOp::Slli),
        (0b0000000, 0b101) => Some(RegShiftImmOp::Srli),
        (0b0100000, 0b101) => Some(RegShiftImmOp::Srai),
        _ => None,
    }
}

fn i_width(raw_instruction: u32) -> Option<LoadWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(LoadWidth::Lb),
        0b001 => Some(LoadWidth::Lh),
        0b010 => Some(LoadWidth::Lw),
        0b100 => Some(LoadWidth::Lbu),
        0b101 => Some(LoadWidth::Lhu),
        _ => None,
    }
}

fn s_width(raw_instruction: u32) -> Option<StoreWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(StoreWidth::Sb),
        0b001 => Some(StoreWidth::Sh),
        0b010 => Some(StoreWidth::Sw),
        _ => None,
    }
}

fn r_funct(raw_instruction: u32) -> Option<RegRegOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b000) => Some(RegRegOp::Add),
        (0b0000000, 0b001) => Some(RegRegOp::Sll),
        (0b0000000, 0b010) => Some(RegRegOp::Slt),
        (0b0000000, 0b011) => Some(RegRegOp::Sltu),
        (0b0000000, 0b100) => Some(RegRegOp::Xor),
        (0b0000000, 0b101) => Some(RegRegOp::Srl),
        (0b0000000, 0b110) => Some(RegRegOp::Or),
        (0b0000000, 0b111) => Some(RegRegOp::And),
        (0b0100000, 0b000) => Some(RegRegOp::Sub),
        (0b0100000, 0b101) => Some(RegRegOp::Sra),
        (0b0000001, 0b000) => Some(RegRegOp::Mul),
        (0b0000001, 0b001) => Some(RegRegOp::Mulh),
        (0b0000001, 0b010) => Some(RegRegOp::Mulhsu),
        (0b0000001, 0b011) => Some(RegRegOp::Mulhu),
        (0b0000001, 0b100) => Some(RegRegOp::Div),
        (0b0000001, 0b101) => Some(RegRegOp::Divu),
        (0b0000001, 0b110) => Some(RegRegOp::Rem),
        (0b0000001, 0b111) => Some(RegRegOp::Remu),
        _ => None,
    }
}

fn b_funct(raw_instruction: u32) -> Option<BranchCondition> {
    match funct3(raw_instruction) {
        0b000 => Some(BranchCondition::Beq),
        0b001 => Some(BranchCondition::Bne),
        0b100 => Some(BranchCondition::Blt),
        0b101 => Some(BranchCondition::Bge),
        0b110 => Some(BranchCondition::Bltu),
        0b111 => Some(BranchCondition::Bgeu),
        _ => None,
    }
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw_instruction: u32) -> u8 {
    (raw_instruction >> 25) as u8
}

/// Returns the 5-bit *shamt* value for S-type shift instructions.
fn shamt(raw_instruction: u32) -> u32 {
    (raw_instruction >> 20) & 0x1F
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(raw_instruction: u32) -> i32 {
    raw_instruction as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(raw_instruction: u32) -> i32 {
    let imm_11_5 = raw_instruction & 0xFE00_0000;
    let imm_4_0 = raw_instruction & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits.
fn b_imm(raw_instruction: u32) -> i32 {
    let imm_12 = raw_instruction & 0x8000_0000;
    let imm_10_5 = raw_instruction & 0x7E00_0000;
    let imm_4_1 = raw_instruction & 0x0000_0F00;
    let imm_11 = raw_instruction & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the signed 32-bit U-immediate.
fn u_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits.
fn j_imm(raw_instruction: u32) -> i32 {
    let imm_20 = raw_instruction & 0x8000_0000;
    let imm_10_1 = raw_instruction & 0x7FE0_0000;
    let imm_11 = raw_instruction & 0x0010_0000;
    let imm_19_12 = raw_instruction & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Opcode {
    OpImm,
    Auipc,
    Lui,
    Op,
    Jal,
    Jalr,
    Branch,
    Load,
    Store,
    MiscMem,
    Amo,
    System,
}
