//! Expansion of the "C" standard extension for compressed instructions.
//!
//! > Each RVC instruction expands into a single 32-bit instruction in either the base ISA (RV32I/E,
//! > RV64I, or RV128I) or the F and D standard extensions.

use super::{
    BranchCondition, DecodeError, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp,
    StoreWidth,
};
use crate::registers::Specifier;

pub(super) fn expand(raw_instruction: u16) -> Result<Instruction, DecodeError> {
    // > A 16-bit instruction with all bits zero is permanently reserved as an illegal instruction.
    if raw_instruction == 0 {
        return Err(DecodeError::IllegalInstruction);
    }
    let raw = raw_instruction;
    match (raw & 0b11, field(raw, 15, 13, 0)) {
        // Quadrant 0
        (0b00, 0b000) => {
            // C.ADDI4SPN
            let immediate = field(raw, 12, 11, 4)
                | field(raw, 10, 7, 6)
                | field(raw, 6, 6, 2)
                | field(raw, 5, 5, 3);
            if immediate == 0 {
                return Err(DecodeError::ReservedCompressed);
            }
            Ok(Instruction::OpImm {
                op: RegImmOp::Addi,
                dest: reg_compressed(raw, 4),
                src: Specifier::SP,
                immediate: immediate as i32,
            })
        }
        (0b00, 0b010) => Ok(Instruction::Load {
            width: LoadWidth::Lw,
            dest: reg_compressed(raw, 4),
            base: reg_compressed(raw, 9),
            offset: cl_offset(raw),
        }),
        (0b00, 0b110) => Ok(Instruction::Store {
            width: StoreWidth::Sw,
            src: reg_compressed(raw, 4),
            base: reg_compressed(raw, 9),
            offset: cl_offset(raw),
        }),

        // Quadrant 1
        (0b01, 0b000) => {
            // C.ADDI, or C.NOP and HINTs when rd == x0, which all write x0.
            let dest = reg(raw, 11);
            Ok(Instruction::OpImm {
                op: RegImmOp::Addi,
                dest,
                src: dest,
                immediate: ci_imm(raw),
            })
        }
        (0b01, 0b001) => Ok(Instruction::Jal {
            dest: Specifier::RA,
            offset: cj_offset(raw),
        }),
        (0b01, 0b010) => Ok(Instruction::OpImm {
            op: RegImmOp::Addi,
            dest: reg(raw, 11),
            src: Specifier::X0,
            immediate: ci_imm(raw),
        }),
        (0b01, 0b011) => {
            let dest = reg(raw, 11);
            if dest == Specifier::SP {
                // C.ADDI16SP
                let immediate = sign_extend(
                    field(raw, 12, 12, 9)
                        | field(raw, 6, 6, 4)
                        | field(raw, 5, 5, 6)
                        | field(raw, 4, 3, 7)
                        | field(raw, 2, 2, 5),
                    10,
                );
                if immediate == 0 {
                    return Err(DecodeError::ReservedCompressed);
                }
                Ok(Instruction::OpImm {
                    op: RegImmOp::Addi,
                    dest,
                    src: dest,
                    immediate,
                })
            } else if dest == Specifier::X0 {
                // HINT
                Ok(nop())
            } else {
                // C.LUI
                let immediate = sign_extend(field(raw, 12, 12, 17) | field(raw, 6, 2, 12), 18);
                if immediate == 0 {
                    return Err(DecodeError::ReservedCompressed);
                }
                Ok(Instruction::Lui { dest, immediate })
            }
        }
        (0b01, 0b100) => expand_arithmetic(raw),
        (0b01, 0b101) => Ok(Instruction::Jal {
            dest: Specifier::X0,
            offset: cj_offset(raw),
        }),
        (0b01, funct3 @ (0b110 | 0b111)) => Ok(Instruction::Branch {
            condition: match funct3 {
                0b110 => BranchCondition::Beq,
                _ => BranchCondition::Bne,
            },
            src1: reg_compressed(raw, 9),
            src2: Specifier::X0,
            offset: cb_offset(raw),
        }),

        // Quadrant 2
        (0b10, 0b000) => {
            let dest = reg(raw, 11);
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Slli,
                dest,
                src: dest,
                shift_amount_u5: shift_amount(raw),
            })
        }
        (0b10, 0b010) => {
            // C.LWSP
            let dest = reg(raw, 11);
            if dest == Specifier::X0 {
                return Err(DecodeError::ReservedCompressed);
            }
            Ok(Instruction::Load {
                width: LoadWidth::Lw,
                dest,
                base: Specifier::SP,
                offset: (field(raw, 12, 12, 5) | field(raw, 6, 4, 2) | field(raw, 3, 2, 6)) as i32,
            })
        }
        (0b10, 0b100) => expand_jump_or_move(raw),
        (0b10, 0b110) => Ok(Instruction::Store {
            width: StoreWidth::Sw,
            src: reg(raw, 6),
            base: Specifier::SP,
            offset: (field(raw, 12, 9, 2) | field(raw, 8, 7, 6)) as i32,
        }),

        // Floating-point loads and stores, and RV64/RV128 only encodings.
        _ => Err(DecodeError::IllegalInstruction),
    }
}

/// C.SRLI, C.SRAI, C.ANDI, C.SUB, C.XOR, C.OR, C.AND.
fn expand_arithmetic(raw: u16) -> Result<Instruction, DecodeError> {
    let dest = reg_compressed(raw, 9);
    match field(raw, 11, 10, 0) {
        0b00 => Ok(Instruction::OpShiftImm {
            op: RegShiftImmOp::Srli,
            dest,
            src: dest,
            shift_amount_u5: shift_amount(raw),
        }),
        0b01 => Ok(Instruction::OpShiftImm {
            op: RegShiftImmOp::Srai,
            dest,
            src: dest,
            shift_amount_u5: shift_amount(raw),
        }),
        0b10 => Ok(Instruction::OpImm {
            op: RegImmOp::Andi,
            dest,
            src: dest,
            immediate: ci_imm(raw),
        }),
        _ => {
            if field(raw, 12, 12, 0) != 0 {
                // C.SUBW and C.ADDW on RV64, reserved otherwise.
                return Err(DecodeError::ReservedCompressed);
            }
            let op = match field(raw, 6, 5, 0) {
                0b00 => RegRegOp::Sub,
                0b01 => RegRegOp::Xor,
                0b10 => RegRegOp::Or,
                _ => RegRegOp::And,
            };
            Ok(Instruction::Op {
                op,
                dest,
                src1: dest,
                src2: reg_compressed(raw, 4),
            })
        }
    }
}

/// C.JR, C.MV, C.EBREAK, C.JALR, C.ADD.
fn expand_jump_or_move(raw: u16) -> Result<Instruction, DecodeError> {
    let rd = reg(raw, 11);
    let rs2 = reg(raw, 6);
    match (field(raw, 12, 12, 0), rd, rs2) {
        (0, Specifier::X0, Specifier::X0) => Err(DecodeError::ReservedCompressed),
        (0, base, Specifier::X0) => Ok(Instruction::Jalr {
            dest: Specifier::X0,
            base,
            offset: 0,
        }),
        (0, dest, src2) => Ok(Instruction::Op {
            op: RegRegOp::Add,
            dest,
            src1: Specifier::X0,
            src2,
        }),
        (_, Specifier::X0, Specifier::X0) => Ok(Instruction::Ebreak),
        (_, base, Specifier::X0) => Ok(Instruction::Jalr {
            dest: Specifier::RA,
            base,
            offset: 0,
        }),
        (_, dest, src2) => Ok(Instruction::Op {
            op: RegRegOp::Add,
            dest,
            src1: dest,
            src2,
        }),
    }
}

fn nop() -> Instruction {
    Instruction::OpImm {
        op: RegImmOp::Addi,
        dest: Specifier::X0,
        src: Specifier::X0,
        immediate: 0,
    }
}

/// Extracts bits `high..=low` of `raw` and places them at bit `to` of the result.
fn field(raw: u16, high: u32, low: u32, to: u32) -> u32 {
    let width = high - low + 1;
    ((raw as u32 >> low) & ((1 << width) - 1)) << to
}

/// Sign-extends the `bits`-bit value `value` to 32 bits.
fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Returns the full 5-bit register specifier starting at bit `high`.
fn reg(raw: u16, high: u32) -> Specifier {
    Specifier::from_u5(field(raw, high, high - 4, 0) as u8)
}

/// Returns the 3-bit (`x8..=x15`) register specifier starting at bit `high`.
fn reg_compressed(raw: u16, high: u32) -> Specifier {
    Specifier::from_u3_compressed(field(raw, high, high - 2, 0) as u8)
}

/// Returns the 6-bit immediate of CI-format instructions, sign-extended.
fn ci_imm(raw: u16) -> i32 {
    sign_extend(field(raw, 12, 12, 5) | field(raw, 6, 2, 0), 6)
}

/// Returns the shift amount of C.SLLI, C.SRLI and C.SRAI.
///
/// Bit 5 of the shift amount is reserved for custom extensions on RV32C, and is ignored here.
fn shift_amount(raw: u16) -> u32 {
    (field(raw, 12, 12, 5) | field(raw, 6, 2, 0)) & 0x1F
}

/// Returns the word offset of C.LW and C.SW.
fn cl_offset(raw: u16) -> i32 {
    (field(raw, 12, 10, 3) | field(raw, 6, 6, 2) | field(raw, 5, 5, 6)) as i32
}

/// Returns the jump offset of C.J and C.JAL.
fn cj_offset(raw: u16) -> i32 {
    sign_extend(
        field(raw, 12, 12, 11)
            | field(raw, 11, 11, 4)
            | field(raw, 10, 9, 8)
            | field(raw, 8, 8, 10)
            | field(raw, 7, 7, 6)
            | field(raw, 6, 6, 7)
            | field(raw, 5, 3, 1)
            | field(raw, 2, 2, 5),
        12,
    )
}

/// Returns the branch offset of C.BEQZ and C.BNEZ.
fn cb_offset(raw: u16) -> i32 {
    sign_extend(
        field(raw, 12, 12, 8)
            | field(raw, 11, 10, 3)
            | field(raw, 6, 5, 6)
            | field(raw, 4, 3, 1)
            | field(raw, 2, 2, 5),
        9,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    fn addi(dest: u8, src: u8, immediate: i32) -> Instruction {
        Instruction::OpImm {
            op: RegImmOp::Addi,
            dest: x(dest),
            src: x(src),
            immediate,
        }
    }

    #[test]
    fn test_quadrant_0() {
        // c.addi4spn x8, sp, 4
        assert_eq!(Ok(addi(8, 2, 4)), expand(0x0040));
        assert_eq!(Err(DecodeError::ReservedCompressed), expand(0x0004));
        assert_eq!(Err(DecodeError::IllegalInstruction), expand(0x0000));
        // c.lw x9, 4(x10)
        assert_eq!(
            Ok(Instruction::Load {
                width: LoadWidth::Lw,
                dest: x(9),
                base: x(10),
                offset: 4,
            }),
            expand(0x4144)
        );
        // c.sw x9, 64(x10)
        assert_eq!(
            Ok(Instruction::Store {
                width: StoreWidth::Sw,
                src: x(9),
                base: x(10),
                offset: 64,
            }),
            expand(0xC124)
        );
        // c.fld and c.flw
        assert_eq!(Err(DecodeError::IllegalInstruction), expand(0x2000));
        assert_eq!(Err(DecodeError::IllegalInstruction), expand(0x6000));
    }

    #[test]
    fn test_immediates_of_quadrant_1() {
        // c.nop
        assert_eq!(Ok(addi(0, 0, 0)), expand(0x0001));
        // c.addi x1, 1
        assert_eq!(Ok(addi(1, 1, 1)), expand(0x0085));
        // c.addi x8, -1
        assert_eq!(Ok(addi(8, 8, -1)), expand(0x147D));
        // c.li x10, -32
        assert_eq!(Ok(addi(10, 0, -32)), expand(0x5501));
        // c.addi16sp sp, -16
        assert_eq!(Ok(addi(2, 2, -16)), expand(0x717D));
        assert_eq!(Err(DecodeError::ReservedCompressed), expand(0x6101));
        // c.lui x3, 1
        assert_eq!(
            Ok(Instruction::Lui {
                dest: x(3),
                immediate: 0x1000,
            }),
            expand(0x6185)
        );
        assert_eq!(Err(DecodeError::ReservedCompressed), expand(0x6181));
    }

    #[test]
    fn test_control_transfer() {
        // c.j 2
        assert_eq!(
            Ok(Instruction::Jal {
                dest: x(0),
                offset: 2,
            }),
            expand(0xA009)
        );
        // c.j -2
        assert_eq!(
            Ok(Instruction::Jal {
                dest: x(0),
                offset: -2,
            }),
            expand(0xBFFD)
        );
        // c.jal 16
        assert_eq!(
            Ok(Instruction::Jal {
                dest: x(1),
                offset: 16,
            }),
            expand(0x2801)
        );
        // c.beqz x8, 8
        assert_eq!(
            Ok(Instruction::Branch {
                condition: BranchCondition::Beq,
                src1: x(8),
                src2: x(0),
                offset: 8,
            }),
            expand(0xC401)
        );
        // c.bnez x9, -4
        assert_eq!(
            Ok(Instruction::Branch {
                condition: BranchCondition::Bne,
                src1: x(9),
                src2: x(0),
                offset: -4,
            }),
            expand(0xFCF5)
        );
        // c.jr x1 (ret)
        assert_eq!(
            Ok(Instruction::Jalr {
                dest: x(0),
                base: x(1),
                offset: 0,
            }),
            expand(0x8082)
        );
        assert_eq!(Err(DecodeError::ReservedCompressed), expand(0x8002));
        // c.jalr x5
        assert_eq!(
            Ok(Instruction::Jalr {
                dest: x(1),
                base: x(5),
                offset: 0,
            }),
            expand(0x9282)
        );
        assert_eq!(Ok(Instruction::Ebreak), expand(0x9002));
    }

    #[test]
    fn test_arithmetic() {
        let reg_reg = |op, dest, src1, src2| Instruction::Op {
            op,
            dest: x(dest),
            src1: x(src1),
            src2: x(src2),
        };
        // c.srli x8, 3
        assert_eq!(
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Srli,
                dest: x(8),
                src: x(8),
                shift_amount_u5: 3,
            }),
            expand(0x800D)
        );
        // c.srai x8, 35, where bit 5 of the shift amount is ignored
        assert_eq!(
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Srai,
                dest: x(8),
                src: x(8),
                shift_amount_u5: 3,
            }),
            expand(0x940D)
        );
        // c.andi x9, -1
        assert_eq!(
            Ok(Instruction::OpImm {
                op: RegImmOp::Andi,
                dest: x(9),
                src: x(9),
                immediate: -1,
            }),
            expand(0x98FD)
        );
        // c.sub x8, x9
        assert_eq!(Ok(reg_reg(RegRegOp::Sub, 8, 8, 9)), expand(0x8C05));
        // c.and x8, x9
        assert_eq!(Ok(reg_reg(RegRegOp::And, 8, 8, 9)), expand(0x8C65));
        // c.subw
        assert_eq!(Err(DecodeError::ReservedCompressed), expand(0x9C05));
        // c.mv x10, x11
        assert_eq!(Ok(reg_reg(RegRegOp::Add, 10, 0, 11)), expand(0x852E));
        // c.add x10, x11
        assert_eq!(Ok(reg_reg(RegRegOp::Add, 10, 10, 11)), expand(0x952E));
    }

    #[test]
    fn test_stack_pointer_relative() {
        // c.slli x1, 4
        assert_eq!(
            Ok(Instruction::OpShiftImm {
                op: RegShiftImmOp::Slli,
                dest: x(1),
                src: x(1),
                shift_amount_u5: 4,
            }),
            expand(0x0092)
        );
        // c.lwsp x1, 8(sp)
        assert_eq!(
            Ok(Instruction::Load {
                width: LoadWidth::Lw,
                dest: x(1),
                base: x(2),
                offset: 8,
            }),
            expand(0x40A2)
        );
        assert_eq!(Err(DecodeError::ReservedCompressed), expand(0x4022));
        // c.swsp x1, 12(sp)
        assert_eq!(
            Ok(Instruction::Store {
                width: StoreWidth::Sw,
                src: x(1),
                base: x(2),
                offset: 12,
            }),
            expand(0xC606)
        );
    }
}
