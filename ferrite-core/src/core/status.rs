use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::{PrivilegeLevel, RawPrivilegeLevel};

/// All bits of mstatus that can ever be set. Everything else reads as zero.
#[allow(clippy::identity_op)]
pub const MSTATUS_MASK: u32 = 0
    | (1 << idx::SIE)
    | (1 << idx::MIE)
    | (1 << idx::SPIE)
    | (1 << idx::MPIE)
    | (1 << idx::SPP)
    | (0b11 << idx::MPP)
    | (0b11 << idx::FS)
    | (1 << idx::MPRV)
    | (1 << idx::SUM)
    | (1 << idx::MXR)
    | (1 << idx::TVM)
    | (1 << idx::TW)
    | (1 << idx::TSR)
    | (1 << idx::SD);

/// Mask to be applied to mstatus to get sstatus.
#[allow(clippy::identity_op)]
pub const SSTATUS_MASK: u32 = 0
    | (1 << idx::SIE)
    | (1 << idx::SPIE)
    | (1 << idx::SPP)
    | (0b11 << idx::FS)
    | (0b11 << idx::XS)
    | (1 << idx::SUM)
    | (1 << idx::MXR)
    | (1 << idx::SD);

/// Fields whose change alters how addresses are translated for loads and stores.
const TRANSLATION_MASK: u32 = (1 << idx::MPRV) | (1 << idx::SUM) | (1 << idx::MXR);

const_assert_eq!(SSTATUS_MASK & !MSTATUS_MASK, 0b11 << idx::XS);

/// Provides the mstatus and sstatus registers.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart’s current operating state. A restricted view of mstatus appears
/// > as the sstatus register in the S-level ISA.
///
/// The hart is always little-endian, so UBE, SBE and MBE are hardwired to zero, which makes
/// mstatush read as zero. There are no V or custom extensions, so VS and XS are zero as well.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Status {
    mstatus: u32,
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

impl Status {
    pub fn new() -> Self {
        Self {
            mstatus: 0x0000_0000,
        }
    }

    /// Rebuild the register from a raw mstatus value, as long as it only holds legal values.
    pub fn from_raw(mstatus: u32) -> Option<Self> {
        if mstatus & !MSTATUS_MASK != 0 {
            return None;
        }
        let mpp = mstatus.view_bits::<Lsb0>()[idx::MPP..(idx::MPP + 2)].load_le::<u8>();
        if RawPrivilegeLevel::from_u2(mpp).is_reserved() {
            return None;
        }
        let mut status = Self { mstatus };
        status.update_sd();
        (status.mstatus == mstatus).then_some(status)
    }

    /// Returns the raw mstatus value.
    pub fn mstatus(&self) -> u32 {
        self.mstatus
    }

    /// Returns the raw sstatus value.
    pub fn sstatus(&self) -> u32 {
        self.mstatus & SSTATUS_MASK
    }

    /// Write `value` to the fields selected by `mask`, leaving all other fields untouched.
    ///
    /// Fields are updated through their setters, so WARL fields keep their legal values and
    /// read-only fields are not affected.
    ///
    /// Returns `true` if the write changes how loads and stores are translated, in which case
    /// cached translations must be discarded.
    pub fn write(&mut self, value: u32, mask: u32) -> bool {
        let old = self.mstatus;
        let updated = old & !mask | value & mask;
        let bits = updated.view_bits::<Lsb0>();

        self.set_sie(bits[idx::SIE]);
        self.set_mie(bits[idx::MIE]);
        self.set_spie(bits[idx::SPIE]);
        self.set_mpie(bits[idx::MPIE]);
        self.set_spp(RawPrivilegeLevel::from_u2(bits[idx::SPP] as u8));
        self.set_mpp(RawPrivilegeLevel::from_u2(
            bits[idx::MPP..(idx::MPP + 2)].load_le(),
        ));
        self.set_fs(ExtensionContextStatus::from_u2(
            bits[idx::FS..(idx::FS + 2)].load_le(),
        ));
        self.set_mprv(bits[idx::MPRV]);
        self.set_sum(bits[idx::SUM]);
        self.set_mxr(bits[idx::MXR]);
        self.set_tvm(bits[idx::TVM]);
        self.set_tw(bits[idx::TW]);
        self.set_tsr(bits[idx::TSR]);

        let changed = old ^ self.mstatus;
        let mpp_matters = old.view_bits::<Lsb0>()[idx::MPRV];
        changed & TRANSLATION_MASK != 0 || (mpp_matters && changed & (0b11 << idx::MPP) != 0)
    }

    /// Returns `true` if the MIE (M-mode Interrupt Enable) bit is set.
    pub fn mie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MIE]
    }

    /// Sets the MIE (M-mode Interrupt Enable) bit to `value`.
    pub fn set_mie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MIE, value);
    }

    /// Returns `true` if the SIE (S-mode Interrupt Enable) bit is set.
    pub fn sie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SIE]
    }

    /// Sets the SIE (S-mode Interrupt Enable) bit to `value`.
    pub fn set_sie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SIE, value);
    }

    /// Returns `true` if the MPIE (M-mode Previous Interrupt Enable) bit is set.
    pub fn mpie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MPIE]
    }

    /// Sets the MPIE (M-mode Previous Interrupt Enable) bit to `value`.
    pub fn set_mpie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MPIE, value);
    }

    /// Returns `true` if the SPIE (S-mode Previous Interrupt Enable) bit is set.
    pub fn spie(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SPIE]
    }

    /// Sets the SPIE (S-mode Previous Interrupt Enable) bit to `value`.
    pub fn set_spie(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPIE, value);
    }

    /// Returns the privilege level encoded by the MPP (M-mode Previous Privilege level) field.
    ///
    /// The MPP field is **WARL**.
    pub fn mpp(&self) -> PrivilegeLevel {
        let raw = RawPrivilegeLevel::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::MPP..(idx::MPP + 2)].load_le(),
        );
        // The setter never stores the reserved level.
        PrivilegeLevel::try_from(raw).unwrap_or(PrivilegeLevel::User)
    }

    /// Sets the privilege level encoded by the MPP (M-mode Previous Privilege level) field to
    /// `value`.
    ///
    /// The MPP field is **WARL**.
    pub fn set_mpp(&mut self, value: RawPrivilegeLevel) {
        let Ok(value) = PrivilegeLevel::try_from(value) else {
            // MPP is a WARL field, so ignore illegal values.
            return;
        };
        self.mstatus.view_bits_mut::<Lsb0>()[idx::MPP..(idx::MPP + 2)].store_le(value.as_u2());
    }

    /// Returns the privilege level encoded by the SPP (S-mode Previous Privilege level) field.
    pub fn spp(&self) -> PrivilegeLevel {
        match self.mstatus.view_bits::<Lsb0>()[idx::SPP] {
            false => PrivilegeLevel::User,
            true => PrivilegeLevel::Supervisor,
        }
    }

    /// Sets the privilege level encoded by the SPP (S-mode Previous Privilege level) field to
    /// `value`.
    ///
    /// The SPP field is **WARL**.
    pub fn set_spp(&mut self, value: RawPrivilegeLevel) {
        match PrivilegeLevel::try_from(value) {
            Ok(value) if value <= PrivilegeLevel::Supervisor => {
                let bit = value != PrivilegeLevel::User;
                self.mstatus.view_bits_mut::<Lsb0>().set(idx::SPP, bit);
            }
            _ => {} // SPP is a WARL field, so ignore illegal values.
        };
    }

    /// Returns `true` if the MPRV (Modify PRiVilege) bit is set.
    pub fn mprv(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MPRV]
    }

    /// Sets the MPRV (Modify PRiVilege) bit to `value`.
    pub fn set_mprv(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MPRV, value);
    }

    /// Returns `true` if the MXR (Make eXecutable Readable) bit is set.
    pub fn mxr(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::MXR]
    }

    /// Sets the MXR (Make eXecutable Readable) bit to `value`.
    pub fn set_mxr(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::MXR, value);
    }

    /// Returns `true` if the SUM (permit Supervisor User Memory access) bit is set.
    pub fn sum(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SUM]
    }

    /// Sets the SUM (permit Supervisor User Memory access) bit to `value`.
    pub fn set_sum(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SUM, value);
    }

    /// Returns `true` if the TVM (Trap Virtual Memory) bit is set.
    ///
    /// > When TVM=1, attempts to read or write the satp CSR or execute an SFENCE.VMA or
    /// > SINVAL.VMA instruction while executing in S-mode will raise an illegal instruction
    /// > exception.
    pub fn tvm(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::TVM]
    }

    /// Sets the TVM (Trap Virtual Memory) bit to `value`.
    pub fn set_tvm(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::TVM, value)
    }

    /// Returns `true` if the TW (Timeout Wait) bit is set.
    ///
    /// The time limit is zero, so a WFI below M-mode traps right away while TW is set.
    pub fn tw(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::TW]
    }

    /// Sets the TW (Timeout Wait) bit to `value`.
    pub fn set_tw(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::TW, value)
    }

    /// Returns `true` if the TSR (Trap SRET) bit is set.
    ///
    /// > When TSR=1, attempts to execute SRET while executing in S-mode will raise an illegal
    /// > instruction exception.
    pub fn tsr(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::TSR]
    }

    /// Sets the TSR (Trap SRET) bit to `value`.
    pub fn set_tsr(&mut self, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::TSR, value)
    }

    /// Returns the extension context status encoded by the FS (F extension Status) field.
    ///
    /// There is no F extension, but the field is kept writable so that kernels tracking FP state
    /// see consistent values.
    pub fn fs(&self) -> ExtensionContextStatus {
        ExtensionContextStatus::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::FS..(idx::FS + 2)].load_le(),
        )
    }

    /// Sets the extension context status encoded by the FS (F extension Status) field to `value`.
    pub fn set_fs(&mut self, value: ExtensionContextStatus) {
        self.mstatus.view_bits_mut::<Lsb0>()[idx::FS..(idx::FS + 2)].store_le(value as u8);
        self.update_sd();
    }

    /// Returns the extension context status encoded by the XS (X extension Status) field.
    ///
    /// Always [`ExtensionContextStatus::Off`], since there are no custom extensions.
    pub fn xs(&self) -> ExtensionContextStatus {
        ExtensionContextStatus::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::XS..(idx::XS + 2)].load_le(),
        )
    }

    /// Returns `true` if the SD (extension Status Dirty) bit is set.
    pub fn sd(&self) -> bool {
        self.mstatus.view_bits::<Lsb0>()[idx::SD]
    }

    fn update_sd(&mut self) {
        use ExtensionContextStatus::Dirty;
        let dirty = self.fs() == Dirty || self.xs() == Dirty;
        self.mstatus.view_bits_mut::<Lsb0>().set(idx::SD, dirty);
    }
}

/// Bit indices into mstatus register.
pub mod idx {
    pub const SIE: usize = 1;
    pub const MIE: usize = 3;
    pub const SPIE: usize = 5;
    pub const MPIE: usize = 7;
    pub const SPP: usize = 8;
    pub const MPP: usize = 11;
    pub const FS: usize = 13;
    pub const XS: usize = 15;
    pub const MPRV: usize = 17;
    pub const SUM: usize = 18;
    pub const MXR: usize = 19;
    pub const TVM: usize = 20;
    pub const TW: usize = 21;
    pub const TSR: usize = 22;
    pub const SD: usize = 31;
}

/// Possible values of the extension context status fields (FS, XS) in the mstatus register.
///
/// > | Status | FS and VS Meaning | XS Meaning                   |
/// > | ------ | ----------------- | ---------------------------- |
/// > | 0      | Off               | All off                      |
/// > | 1      | Initial           | None dirty or clean, some on |
/// > | 2      | Clean             | None dirty, some clean       |
/// > | 3      | Dirty             | Some dirty                   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtensionContextStatus {
    Off = 0,
    Initial = 1,
    Clean = 2,
    Dirty = 3,
}

impl ExtensionContextStatus {
    /// Convert a 2-bit value into an [`ExtensionContextStatus`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Off,
            1 => Self::Initial,
            2 => Self::Clean,
            3 => Self::Dirty,
            _ => panic!("out of range u2 used"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_is_masked() {
        let mut status = Status::new();
        status.write(0xFFFF_FFFF, 0xFFFF_FFFF);
        assert_eq!(MSTATUS_MASK, status.mstatus());
        assert!(status.sd());
        assert_eq!(PrivilegeLevel::Machine, status.mpp());
        assert_eq!(ExtensionContextStatus::Off, status.xs());
    }

    #[test]
    fn test_sd_tracks_fs() {
        let mut status = Status::new();
        status.write(0b11 << idx::FS, 0b11 << idx::FS);
        assert!(status.sd());
        status.write(0b10 << idx::FS, 0b11 << idx::FS);
        assert!(!status.sd());
        assert_eq!(ExtensionContextStatus::Clean, status.fs());
    }

    #[test]
    fn test_mpp_is_warl() {
        let mut status = Status::new();
        status.write(0b01 << idx::MPP, 0b11 << idx::MPP);
        assert_eq!(PrivilegeLevel::Supervisor, status.mpp());
        status.write(0b10 << idx::MPP, 0b11 << idx::MPP);
        assert_eq!(PrivilegeLevel::Supervisor, status.mpp());
    }

    #[test]
    fn test_sstatus_write_leaves_machine_fields() {
        let mut status = Status::new();
        status.set_mie(true);
        status.write(0, SSTATUS_MASK);
        assert!(status.mie());
        status.write(1 << idx::SIE | 1 << idx::MIE, SSTATUS_MASK);
        assert!(status.sie());
        assert_eq!(1 << idx::SIE, status.sstatus());
    }

    #[test]
    fn test_translation_change_detection() {
        let mut status = Status::new();
        assert!(!status.write(1 << idx::MIE, !0));
        assert!(status.write(1 << idx::SUM, 1 << idx::SUM));
        assert!(!status.write(1 << idx::SUM, 1 << idx::SUM));
        // MPP only matters while MPRV is set.
        assert!(!status.write(0b01 << idx::MPP, 0b11 << idx::MPP));
        assert!(status.write(1 << idx::MPRV, 1 << idx::MPRV));
        assert!(status.write(0b11 << idx::MPP, 0b11 << idx::MPP));
    }

    #[test]
    fn test_from_raw() {
        assert!(Status::from_raw(1 << idx::MIE).is_some());
        assert!(Status::from_raw(1 << 0).is_none());
        assert!(Status::from_raw(0b10 << idx::MPP).is_none());
        assert!(Status::from_raw(1 << idx::SD).is_none());
        assert!(Status::from_raw(0b11 << idx::FS | 1 << idx::SD).is_some());
    }
}
