use bitvec::{field::BitField, order::Lsb0, view::BitView};

use super::{Exception, Interrupt};
use crate::PrivilegeLevel;

/// Trap setup registers that are not covered by [`Status`](super::status::Status) or
/// [`Interrupts`](super::interrupts::Interrupts).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Control {
    pub mtvec: Tvec,
    pub medeleg: Medeleg,
    pub mcounteren: Counteren,

    pub stvec: Tvec,
    pub scounteren: Counteren,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        Self {
            mtvec: Tvec::new(),
            medeleg: Medeleg::new(),
            mcounteren: Counteren::new(),
            stvec: Tvec::new(),
            scounteren: Counteren::new(),
        }
    }

    /// Returns `true` if code running at `privilege_level` may read the counter whose
    /// counter-enable bit is `bit`.
    ///
    /// > When the CY, TM, IR, or HPMn bit in the mcounteren register is clear, attempts to read the
    /// > cycle, time, instret, or hpmcountern register while executing in S-mode or U-mode will
    /// > cause an illegal instruction exception. When one of these bits is set, access to the
    /// > corresponding register is permitted in the next implemented privilege mode (S-mode if
    /// > implemented, otherwise U-mode).
    pub fn counter_enabled(&self, privilege_level: PrivilegeLevel, bit: usize) -> bool {
        match privilege_level {
            PrivilegeLevel::Machine => true,
            PrivilegeLevel::Supervisor => self.mcounteren.bit(bit),
            PrivilegeLevel::User => self.mcounteren.bit(bit) && self.scounteren.bit(bit),
        }
    }

    /// Returns the trap vector to use when trapping into `privilege_level`.
    ///
    /// Traps never target U-mode, so anything below M-mode uses stvec.
    pub fn tvec(&self, privilege_level: PrivilegeLevel) -> &Tvec {
        match privilege_level {
            PrivilegeLevel::Machine => &self.mtvec,
            _ => &self.stvec,
        }
    }
}

/// Trap Vector Base Address Register (mtvec and stvec).
///
/// > The mtvec register is an MXLEN-bit WARL read/write register that holds trap vector
/// > configuration, consisting of a vector base address (BASE) and a vector mode (MODE).
///
/// > When MODE=Direct, all traps into machine mode cause the pc to be set to the address in the
/// > BASE field. When MODE=Vectored, all synchronous exceptions into machine mode cause the pc to
/// > be set to the address in the BASE field, whereas interrupts cause the pc to be set to the
/// > address in the BASE field plus four times the interrupt cause number.
///
/// The MODE field keeps only its low bit, so the reserved modes can never be stored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tvec(u32);

impl Default for Tvec {
    fn default() -> Self {
        Self::new()
    }
}

impl Tvec {
    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    /// Rebuild the register from a raw value, as long as it does not encode a reserved mode.
    pub fn from_raw(value: u32) -> Option<Self> {
        (value & 0b10 == 0).then_some(Self(value))
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32) {
        self.0 = value & !0b10;
    }

    /// Returns the vector base address (stored in BASE field).
    pub fn base(&self) -> u32 {
        self.0.view_bits::<Lsb0>()[2..].load_le::<u32>() << 2
    }

    /// Returns the vector mode (stored in MODE field).
    pub fn mode(&self) -> VectorMode {
        match self.0.view_bits::<Lsb0>()[0] {
            false => VectorMode::Direct,
            true => VectorMode::Vectored,
        }
    }

    /// Returns the address of the trap handler, where `interrupt` is `None` for exceptions.
    pub fn handler(&self, interrupt: Option<Interrupt>) -> u32 {
        match (self.mode(), interrupt) {
            (VectorMode::Vectored, Some(interrupt)) => {
                self.base().wrapping_add(4 * interrupt.code())
            }
            _ => self.base(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMode {
    Direct,
    Vectored,
}

/// The medeleg register is **WARL**.
///
/// Every synchronous exception can be delegated, except for an environment call from M-mode,
/// which can never be handled below M-mode.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Medeleg(u32);

impl Default for Medeleg {
    fn default() -> Self {
        Self::new()
    }
}

impl Medeleg {
    const READ_ONLY_ZERO_MASK: u32 = 1 << Exception::ENVIRONMENT_CALL_FROM_M_MODE;

    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn from_raw(value: u32) -> Self {
        let mut medeleg = Self::new();
        medeleg.write(value);
        medeleg
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32) {
        self.0 = value & !Self::READ_ONLY_ZERO_MASK;
    }

    pub fn should_delegate(&self, exception: &Exception) -> bool {
        self.0.view_bits::<Lsb0>()[exception.code() as usize]
    }
}

/// Counter-Enable register (mcounteren and scounteren).
///
/// All fields of the register are **WARL**. Only CY and IR are writable: `time` is always
/// accessible and there are no hardware performance-monitoring counters.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Counteren(u32);

impl Default for Counteren {
    fn default() -> Self {
        Self::new()
    }
}

impl Counteren {
    // Bit indices for the fields of the counter-enable register.
    pub const CY: usize = 0;
    pub const IR: usize = 2;

    const WRITABLE_MASK: u32 = (1 << Self::CY) | (1 << Self::IR);

    pub fn new() -> Self {
        Self(0x0000_0000)
    }

    pub fn from_raw(value: u32) -> Self {
        Self(value & Self::WRITABLE_MASK)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32) {
        self.0 = value & Self::WRITABLE_MASK;
    }

    pub fn cy(&self) -> bool {
        self.bit(Self::CY)
    }

    pub fn ir(&self) -> bool {
        self.bit(Self::IR)
    }

    fn bit(&self, index: usize) -> bool {
        self.0.view_bits::<Lsb0>()[index]
    }
}
