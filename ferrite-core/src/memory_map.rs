//! A ready-to-use [`Bus`] that routes physical addresses to a set of attached devices.

use crate::address_map::{AddressMap, AddressMapError};
use crate::bus::{AccessSize, Bus, DeviceId, MemoryRange, RangeKind};
use crate::AddressRange;
use std::fmt::Debug;

/// A device that can be attached to a [`MemoryMap`].
///
/// Offsets are relative to the start of the range the device is mapped at. Accesses are naturally
/// aligned, but may extend past the end of the device (the bytes beyond it should be ignored).
pub trait Device: Debug {
    /// Whether this device is main memory or memory-mapped I/O. Defaults to I/O.
    fn kind(&self) -> RangeKind {
        RangeKind::Io
    }

    fn read(&mut self, offset: u32, size: AccessSize) -> u32;

    fn write(&mut self, offset: u32, value: u32, size: AccessSize);

    /// Called after the core modified memory at `offset`. Does nothing by default.
    fn mark_dirty(&mut self, offset: u32) {
        let _ = offset;
    }
}

/// A physical address space built from non-overlapping device mappings.
///
/// Vacant regions are allowed: loads from them return zero, stores are dropped.
#[derive(Debug, Default)]
pub struct MemoryMap {
    ranges: AddressMap<DeviceId>,
    devices: Vec<Box<dyn Device>>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `device` at `range`, returning the identifier it will be reported under.
    pub fn attach(
        &mut self,
        range: AddressRange,
        device: Box<dyn Device>,
    ) -> Result<DeviceId, AddressMapError> {
        let id = DeviceId(self.devices.len());
        self.ranges.insert(range, id)?;
        self.devices.push(device);
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&dyn Device> {
        self.devices.get(id.0).map(|device| device.as_ref())
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut (dyn Device + 'static)> {
        self.devices.get_mut(id.0).map(|device| device.as_mut())
    }

    /// Copy `data` into the address space starting at physical `address`, byte by byte.
    ///
    /// Bytes that land in vacant regions are dropped. Meant for loading firmware images.
    pub fn write_bytes(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let address = address.wrapping_add(i as u32);
            self.store(address, byte as u32, AccessSize::Byte);
        }
    }

    /// Read `buf.len()` bytes starting at physical `address`.
    ///
    /// Note that this performs regular reads, so I/O devices will see them.
    pub fn read_bytes(&mut self, address: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let address = address.wrapping_add(i as u32);
            *byte = self.load(address, AccessSize::Byte) as u8;
        }
    }
}

impl Bus for MemoryMap {
    fn find_range(&self, address: u32) -> Option<MemoryRange> {
        let (range, &device) = self.ranges.range_value(address)?;
        Some(MemoryRange {
            device,
            range,
            kind: self.devices[device.0].kind(),
        })
    }

    fn read(&mut self, range: &MemoryRange, offset: u32, size: AccessSize) -> u32 {
        match self.devices.get_mut(range.device.0) {
            Some(device) => device.read(offset, size),
            None => 0,
        }
    }

    fn write(&mut self, range: &MemoryRange, offset: u32, value: u32, size: AccessSize) {
        if let Some(device) = self.devices.get_mut(range.device.0) {
            device.write(offset, value, size);
        }
    }

    fn mark_dirty(&mut self, range: &MemoryRange, offset: u32) {
        if let Some(device) = self.devices.get_mut(range.device.0) {
            device.mark_dirty(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_range;
    use crate::resources::ram::Ram;

    /// Device that records every access it sees.
    #[derive(Debug, Default)]
    struct Probe {
        reads: u32,
        last_write: Option<(u32, u32)>,
    }

    impl Device for Probe {
        fn read(&mut self, offset: u32, _size: AccessSize) -> u32 {
            self.reads += 1;
            0xA000 | offset
        }

        fn write(&mut self, offset: u32, value: u32, _size: AccessSize) {
            self.last_write = Some((offset, value));
        }
    }

    #[test]
    fn test_routing() {
        let mut map = MemoryMap::new();
        let ram = map
            .attach(address_range![0x8000_0000, 0x8000_0FFF], Box::new(Ram::new(0x1000)))
            .unwrap();
        let probe = map
            .attach(address_range![0x1000_0000, 0x1000_00FF], Box::<Probe>::default())
            .unwrap();

        let range = map.find_range(0x8000_0010).unwrap();
        assert_eq!(ram, range.device);
        assert!(range.is_memory());
        let range = map.find_range(0x1000_0004).unwrap();
        assert_eq!(probe, range.device);
        assert_eq!(RangeKind::Io, range.kind);
        assert!(map.find_range(0x2000_0000).is_none());

        assert_eq!(0xA004, map.load(0x1000_0004, AccessSize::Word));
        map.store(0x1000_0008, 0x55, AccessSize::Byte);

        map.store(0x8000_0100, 0xDEAD_BEEF, AccessSize::Word);
        assert_eq!(0xBEEF, map.load(0x8000_0100, AccessSize::Halfword));
        assert_eq!(0xDE, map.load(0x8000_0103, AccessSize::Byte));
    }

    #[test]
    fn test_vacant_regions() {
        let mut map = MemoryMap::new();
        map.store(0x1234, 0xFFFF_FFFF, AccessSize::Word);
        assert_eq!(0, map.load(0x1234, AccessSize::Word));
    }

    #[test]
    fn test_byte_copy() {
        let mut map = MemoryMap::new();
        map.attach(address_range![0x100, 0x1FF], Box::new(Ram::new(0x100)))
            .unwrap();
        map.write_bytes(0x1FE, &[1, 2, 3, 4]);
        let mut buf = [0xFF; 4];
        map.read_bytes(0x1FE, &mut buf);
        assert_eq!([1, 2, 0, 0], buf);
    }

    #[test]
    fn test_overlapping_attach() {
        let mut map = MemoryMap::new();
        map.attach(address_range![0x0, 0xFFF], Box::new(Ram::new(0x1000)))
            .unwrap();
        assert!(map
            .attach(address_range![0x800, 0x17FF], Box::new(Ram::new(0x1000)))
            .is_err());
        assert!(map.device(DeviceId(1)).is_none());
    }
}
