//! Serializable architectural state of a [`Core`](crate::Core).

use crate::registers::LEN;
use crate::PrivilegeLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every piece of architectural state of a core, as returned by
/// [`Core::state`](crate::Core::state) and accepted by [`Core::set_state`](crate::Core::set_state).
///
/// CSRs are stored as the raw values a CSR read would return. The translation caches are not part
/// of the snapshot, restoring a snapshot flushes them.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    /// The `x` registers, indexed by their number.
    pub registers: [u32; LEN as usize],
    pub pc: u32,
    pub privilege_level: PrivilegeLevel,
    /// Set while the hart waits for an interrupt after executing WFI.
    pub halted: bool,
    /// Physical address reserved by the last LR.W, if any.
    pub reservation: Option<u32>,
    /// Cycle counter, which doubles as instructions-retired counter.
    pub mcycle: u64,

    pub mstatus: u32,
    pub medeleg: u32,
    pub mideleg: u32,
    pub mie: u32,
    pub mip: u32,
    pub mtvec: u32,
    pub mcounteren: u32,
    pub mscratch: u32,
    pub mepc: u32,
    pub mcause: u32,
    pub mtval: u32,

    pub stvec: u32,
    pub scounteren: u32,
    pub sscratch: u32,
    pub sepc: u32,
    pub scause: u32,
    pub stval: u32,
    pub satp: u32,
}

/// Reasons a [`CpuSnapshot`] can be rejected when restoring it.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SnapshotError {
    /// mstatus has bits set outside the implemented fields, an inconsistent SD bit, or a reserved
    /// MPP encoding.
    #[error("illegal mstatus value {0:#010x}")]
    IllegalStatus(u32),
    #[error("{register} value {value:#010x} uses a reserved vector mode")]
    ReservedVectorMode {
        register: &'static str,
        value: u32,
    },
}
