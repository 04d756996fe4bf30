// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Structures
//======================================================================================================================

/// A contiguous memory zone mapped both in the process address space and in the bus address space seen by the
/// accelerator.
///
/// Translation is plain offset arithmetic. Neither direction checks that the input lies inside the zone; an address
/// outside of it yields a meaningless result. Use [MemZone::contains_virtual] and [MemZone::contains_physical] when the
/// input is not trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemZone {
    /// Virtual address of the first byte of the zone.
    virt_base: usize,
    /// Bus address of the first byte of the zone.
    phys_base: u64,
    /// Length of the zone in bytes.
    len: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl MemZone {
    pub const fn new(virt_base: usize, phys_base: u64, len: usize) -> Self {
        Self {
            virt_base,
            phys_base,
            len,
        }
    }

    pub const fn virt_base(&self) -> usize {
        self.virt_base
    }

    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Translates a bus address inside this zone into a virtual address.
    #[inline]
    pub const fn virtual_from_physical(&self, addr: u64) -> usize {
        (addr.wrapping_sub(self.phys_base) as usize).wrapping_add(self.virt_base)
    }

    /// Translates a virtual address inside this zone into a bus address.
    #[inline]
    pub const fn physical_from_virtual(&self, addr: usize) -> u64 {
        self.phys_base.wrapping_add(addr.wrapping_sub(self.virt_base) as u64)
    }

    /// Returns `true` if `addr` is a virtual address inside this zone.
    pub const fn contains_virtual(&self, addr: usize) -> bool {
        addr >= self.virt_base && addr - self.virt_base < self.len
    }

    /// Returns `true` if `addr` is a bus address inside this zone.
    pub const fn contains_physical(&self, addr: u64) -> bool {
        addr >= self.phys_base && addr - self.phys_base < self.len as u64
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Translates bus address `addr` into a virtual address using the mapping of `zone`.
#[inline]
pub const fn virtual_from_physical(addr: u64, zone: &MemZone) -> usize {
    zone.virtual_from_physical(addr)
}

/// Translates virtual address `addr` into a bus address using the mapping of `zone`.
#[inline]
pub const fn physical_from_virtual(addr: usize, zone: &MemZone) -> u64 {
    zone.physical_from_virtual(addr)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::MemZone;
    use crate::ensure_eq;
    use ::anyhow::{
        ensure,
        Result,
    };

    const ZONE: MemZone = MemZone::new(0x7F00_0000_0000, 0x8_0000_0000, 0x10_0000);

    #[test]
    fn translate_both_ways() -> Result<()> {
        ensure_eq!(super::virtual_from_physical(0x8_0000_1040, &ZONE), 0x7F00_0000_1040);
        ensure_eq!(super::physical_from_virtual(0x7F00_0000_1040, &ZONE), 0x8_0000_1040);
        for offset in [0usize, 1, 0x800, 0xF_FFFF] {
            let virt: usize = ZONE.virt_base() + offset;
            ensure_eq!(ZONE.virtual_from_physical(ZONE.physical_from_virtual(virt)), virt);
        }
        Ok(())
    }

    #[test]
    fn virtual_base_below_physical_base() -> Result<()> {
        let zone: MemZone = MemZone::new(0x1000, 0x10_0000, 0x2000);
        ensure_eq!(zone.virtual_from_physical(0x10_0800), 0x1800);
        ensure_eq!(zone.physical_from_virtual(0x1800), 0x10_0800);
        Ok(())
    }

    #[test]
    fn containment() -> Result<()> {
        ensure!(ZONE.contains_virtual(ZONE.virt_base()));
        ensure!(ZONE.contains_virtual(ZONE.virt_base() + ZONE.len() - 1));
        ensure!(!ZONE.contains_virtual(ZONE.virt_base() + ZONE.len()));
        ensure!(!ZONE.contains_virtual(ZONE.virt_base() - 1));
        ensure!(ZONE.contains_physical(0x8_0000_0000));
        ensure!(!ZONE.contains_physical(0x7_FFFF_FFFF));
        Ok(())
    }

    #[test]
    fn out_of_range_input_is_not_checked() -> Result<()> {
        // Below the zone: the arithmetic wraps instead of failing.
        let virt: usize = ZONE.virtual_from_physical(0);
        ensure_eq!(virt, 0x7F00_0000_0000usize.wrapping_sub(0x8_0000_0000));
        Ok(())
    }
}
