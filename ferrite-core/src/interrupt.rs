//! Interfaces between the core and the devices that drive its interrupt lines and clock.

use std::fmt::Debug;

/// Supervisor software interrupt pending bit in `mip`.
pub const SSIP: u32 = 1 << 1;
/// Machine software interrupt pending bit in `mip`.
pub const MSIP: u32 = 1 << 3;
/// Supervisor timer interrupt pending bit in `mip`.
pub const STIP: u32 = 1 << 5;
/// Machine timer interrupt pending bit in `mip`.
pub const MTIP: u32 = 1 << 7;
/// Supervisor external interrupt pending bit in `mip`.
pub const SEIP: u32 = 1 << 9;
/// Machine external interrupt pending bit in `mip`.
pub const MEIP: u32 = 1 << 11;

/// Something that collects interrupt requests from devices, such as the core's `mip` register.
///
/// Masks are made of the `*IP` bits defined in this module. Bits of interrupts that are not
/// implemented are accepted, but never serviced.
pub trait InterruptController {
    /// Mark the interrupts in `mask` as pending.
    fn raise_interrupts(&mut self, mask: u32);

    /// Clear the pending state of the interrupts in `mask`.
    fn lower_interrupts(&mut self, mask: u32);

    /// Returns the currently pending interrupts.
    fn raised_interrupts(&self) -> u32;
}

/// A free-running wall clock, exposed to the guest through the `time` and `timeh` CSRs.
pub trait RealTimeCounter: Debug {
    /// Current value of the counter, in ticks.
    fn time(&self) -> u64;

    /// Number of ticks per second.
    fn frequency(&self) -> u32;
}

impl<T: RealTimeCounter + ?Sized> RealTimeCounter for std::rc::Rc<T> {
    fn time(&self) -> u64 {
        (**self).time()
    }

    fn frequency(&self) -> u32 {
        (**self).frequency()
    }
}
