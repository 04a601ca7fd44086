//! Specifiers of all implemented CSRs and the access rules encoded in them.
//!
//! Part of the "Zicsr" extension.
//!
//! > The standard RISC-V ISA sets aside a 12-bit encoding space (csr\[11:0]) for up to 4,096 CSRs.
//! > By convention, the upper 4 bits of the CSR address (csr\[11:8]) are used to encode the read
//! > and write accessibility of the CSRs according to privilege level as shown in Table 2.1. The
//! > top two bits (csr\[11:10]) indicate whether the register is read/write (00, 01, or 10) or
//! > read-only (11). The next two bits (csr\[9:8]) encode the lowest privilege level that can
//! > access the CSR.

use crate::{PrivilegeLevel, RawPrivilegeLevel};
use thiserror::Error;

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

//
// Unprivileged counters/timers (`0xC00..=0xC1F`, `0xC80..=0xC9F`).
//
/// Cycle counter for RDCYCLE instruction.
pub const CYCLE: CsrSpecifier = 0xC00;
/// Timer for RDTIME instruction.
pub const TIME: CsrSpecifier = 0xC01;
/// Instructions-retired counter for RDINSTRET instruction.
pub const INSTRET: CsrSpecifier = 0xC02;
/// Upper 32 bits of [`CYCLE`], RV32 only.
pub const CYCLEH: CsrSpecifier = 0xC80;
/// Upper 32 bits of [`TIME`], RV32 only.
pub const TIMEH: CsrSpecifier = 0xC81;
/// Upper 32 bits of [`INSTRET`], RV32 only.
pub const INSTRETH: CsrSpecifier = 0xC82;

//
// Supervisor trap setup (`0x100`, `0x104..=0x106`).
//
/// Supervisor status register.
pub const SSTATUS: CsrSpecifier = 0x100;
/// Supervisor interrupt-enable register.
pub const SIE: CsrSpecifier = 0x104;
/// Supervisor trap handler base address.
pub const STVEC: CsrSpecifier = 0x105;
/// Supervisor counter enable.
pub const SCOUNTEREN: CsrSpecifier = 0x106;

//
// Supervisor trap handling (`0x140..=0x144`).
//
/// Scratch register for supervisor trap handling.
pub const SSCRATCH: CsrSpecifier = 0x140;
/// Supervisor exception program counter.
pub const SEPC: CsrSpecifier = 0x141;
/// Supervisor trap cause.
pub const SCAUSE: CsrSpecifier = 0x142;
/// Supervisor bad address or instruction.
pub const STVAL: CsrSpecifier = 0x143;
/// Supervisor interrupt pending.
pub const SIP: CsrSpecifier = 0x144;

//
// Supervisor protection and translation (`0x180`).
//
/// Supervisor address translation and protection.
pub const SATP: CsrSpecifier = 0x180;

//
// Machine information registers (`0xF11..=0xF14`).
//
/// Vendor ID.
pub const MVENDORID: CsrSpecifier = 0xF11;
/// Architecture ID.
pub const MARCHID: CsrSpecifier = 0xF12;
/// Implementation ID.
pub const MIMPID: CsrSpecifier = 0xF13;
/// Hardware thead ID.
pub const MHARTID: CsrSpecifier = 0xF14;

//
// Machine trap setup (`0x300..=0x306`, `0x310`).
//
/// Machine status register.
pub const MSTATUS: CsrSpecifier = 0x300;
/// ISA and extensions.
pub const MISA: CsrSpecifier = 0x301;
/// Machine exception delegation register.
pub const MEDELEG: CsrSpecifier = 0x302;
/// Machine interrupt delegation register.
pub const MIDELEG: CsrSpecifier = 0x303;
/// Machine interrupt-enable register.
pub const MIE: CsrSpecifier = 0x304;
/// Machine trap-handle base address.
pub const MTVEC: CsrSpecifier = 0x305;
/// Machine counter enable.
pub const MCOUNTEREN: CsrSpecifier = 0x306;
/// Additional machine status register, RV32 only.
pub const MSTATUSH: CsrSpecifier = 0x310;

//
// Machine trap handling (`0x340..=0x344`).
//
/// Scratch register for machine trap handlers.
pub const MSCRATCH: CsrSpecifier = 0x340;
/// Machine exception program counter.
pub const MEPC: CsrSpecifier = 0x341;
/// Machine trap cause.
pub const MCAUSE: CsrSpecifier = 0x342;
/// Machine bad address or instruction.
pub const MTVAL: CsrSpecifier = 0x343;
/// Machine interrupt pending.
pub const MIP: CsrSpecifier = 0x344;

//
// Machine counters/timers (`0xB00`, `0xB02`, `0xB80`, `0xB82`).
//
/// Machine cycle counter.
pub const MCYCLE: CsrSpecifier = 0xB00;
/// Machine instructions-retired counter.
pub const MINSTRET: CsrSpecifier = 0xB02;
/// Upper 32 bits of [`MCYCLE`], RV32 only.
pub const MCYCLEH: CsrSpecifier = 0xB80;
/// Upper 32 bits of [`MINSTRET`], RV32 only.
pub const MINSTRETH: CsrSpecifier = 0xB82;

/// Returns `true` if `specifier` is valid, which is the case if it fits in 12 bits.
pub fn is_valid(specifier: CsrSpecifier) -> bool {
    specifier < 1 << 12
}

/// Returns `true` if this CSR only supports read access.
///
/// Requires [`is_valid(specifier)`](is_valid), otherwise the return value is undefined.
pub fn is_read_only(specifier: CsrSpecifier) -> bool {
    // The top two bits of a CSR specifier indicate whether the CSR is read-only (0b11) or
    // read/write (0b00, 0b01, 0b10)
    specifier >> 10 == 0b11 || is_unprivileged_counter(specifier)
}

/// Returns `true` for the unprivileged counter/timer range (`0xC00..=0xC1F`, `0xC80..=0xC9F`).
///
/// These are read-only shadows of the machine counters.
pub fn is_unprivileged_counter(specifier: CsrSpecifier) -> bool {
    matches!(specifier, 0xC00..=0xC1F | 0xC80..=0xC9F)
}

/// Returns the minimum required privilege level to access this CSR.
///
/// Requires [`is_valid(specifier)`](is_valid), otherwise the return value is undefined.
///
/// Note that this returns a [`RawPrivilegeLevel`], meaning the minimum required privilege level
/// may be a reserved level. This still has a defined meaning: only higher privilege levels are
/// allowed to access the CSR.
pub fn required_privilege_level(specifier: CsrSpecifier) -> RawPrivilegeLevel {
    // Bits `9:8` indicate the minimum required privilege level
    RawPrivilegeLevel::from_u2(((specifier >> 8) & 0b11) as u8)
}

/// Validates an access to `specifier` from `privilege_level` against the rules encoded in the
/// specifier itself.
///
/// This does not check whether the CSR is implemented, nor any CSR-specific access rules.
pub fn check_access(
    specifier: CsrSpecifier,
    privilege_level: PrivilegeLevel,
    will_write: bool,
) -> Result<(), CsrAccessError> {
    if !is_valid(specifier) {
        return Err(CsrAccessError::CsrUnsupported(specifier));
    }
    if will_write && is_read_only(specifier) {
        return Err(CsrAccessError::WriteToReadOnly(specifier));
    }
    let required_level = required_privilege_level(specifier);
    if privilege_level < required_level {
        return Err(CsrAccessError::Privileged {
            specifier,
            required_level,
            actual_level: privilege_level,
        });
    }
    Ok(())
}

/// Errors that can occur when attempting to access a CSR.
///
/// All of them are reported to the guest as an illegal-instruction exception.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CsrAccessError {
    #[error("unsupported CSR: {0:#05X}")]
    CsrUnsupported(CsrSpecifier),
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access specifier {specifier:#05X} from privilege level {actual_level}, \
             since it requires privilege level {required_level}"
    )]
    Privileged {
        /// The CSR for which access was requested.
        specifier: CsrSpecifier,
        /// The minimum required privilege level to access that CSR.
        required_level: RawPrivilegeLevel,
        /// The actual privilegel level from which the access was performed.
        actual_level: PrivilegeLevel,
    },
    /// Attempt to write to a read-only register.
    #[error("writing to read-only CSR {0:#05X} is invalid")]
    WriteToReadOnly(CsrSpecifier),
    /// Access denied by a CSR-specific rule, such as `mstatus.TVM` or a disabled counter.
    #[error("access to CSR {0:#05X} is disabled")]
    Disabled(CsrSpecifier),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only() {
        assert!(is_read_only(MHARTID));
        assert!(is_read_only(CYCLE));
        assert!(is_read_only(TIMEH));
        assert!(!is_read_only(MSTATUS));
        assert!(!is_read_only(MCYCLE));
        assert!(!is_read_only(SATP));
    }

    #[test]
    fn test_required_privilege_level() {
        assert_eq!(RawPrivilegeLevel::User, required_privilege_level(CYCLE));
        assert_eq!(RawPrivilegeLevel::Supervisor, required_privilege_level(SSTATUS));
        assert_eq!(RawPrivilegeLevel::Machine, required_privilege_level(MEPC));
        assert_eq!(RawPrivilegeLevel::Reserved, required_privilege_level(0x200));
    }

    #[test]
    fn test_check_access() {
        use PrivilegeLevel::*;
        assert!(check_access(CYCLE, User, false).is_ok());
        assert_eq!(
            Err(CsrAccessError::WriteToReadOnly(CYCLE)),
            check_access(CYCLE, Machine, true)
        );
        assert!(check_access(SEPC, Supervisor, true).is_ok());
        assert!(matches!(
            check_access(SEPC, User, false),
            Err(CsrAccessError::Privileged { .. })
        ));
        assert!(check_access(0x200, Supervisor, false).is_err());
        assert!(check_access(0x200, Machine, false).is_ok());
        assert!(check_access(0x1000, Machine, false).is_err());
    }
}
