//! Devices that can be attached to a [`MemoryMap`](crate::memory_map::MemoryMap).

pub mod ram;
