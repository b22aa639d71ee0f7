//! The interface every memory-mapped device exposes to the [`SystemBus`](crate::SystemBus).

use crate::PAGE_SIZE;
use downcast_rs::{impl_downcast, Downcast};
use std::fmt::Debug;

/// A device that can be attached to the [`SystemBus`](crate::SystemBus).
///
/// A peripheral occupies a whole number of pages of the bus address space. The bus hands it
/// *local* addresses, i.e. offsets from the base address it was attached at. Values are serialized
/// in little-endian byte order.
///
/// Implementors decide how to treat local addresses outside their own size. The RAM and ROM
/// resources mask them with [`Peripheral::translate_address`], which makes the address space
/// circular with a period of the next power of two of their size.
///
/// Reads take `&mut self` since reading a device register may have side effects. All accesses
/// must be handled without panics, whatever the address.
pub trait Peripheral: Downcast + Debug {
    /// Returns the number of [`PAGE_SIZE`] pages this peripheral occupies.
    fn page_count(&self) -> u32;

    /// Returns the size of this peripheral's local address space in bytes.
    fn size(&self) -> u32 {
        self.page_count().wrapping_mul(PAGE_SIZE)
    }

    /// Wraps `address` into the smallest power-of-two sized window covering [`Self::size`].
    ///
    /// Local addresses beyond the end of the peripheral (but within that window) are returned
    /// unchanged, so callers must still bounds check the result.
    fn translate_address(&self, address: u32) -> u32 {
        address & address_mask(self.size())
    }

    fn read_byte(&mut self, address: u32) -> u8;

    fn read_halfword(&mut self, address: u32) -> u16;

    fn read_word(&mut self, address: u32) -> u32;

    fn write_byte(&mut self, address: u32, value: u8);

    fn write_halfword(&mut self, address: u32, value: u16);

    fn write_word(&mut self, address: u32, value: u32);

    /// Called once per machine timestep, after the core has executed its instruction.
    fn cycle(&mut self) {}

    /// Called once per machine timestep after every peripheral has completed its [`Self::cycle`].
    fn timestep(&mut self) {}
}
impl_downcast!(Peripheral);

/// Returns `next_power_of_two(size) - 1`, saturating to all-ones for sizes above `1 << 31`.
fn address_mask(size: u32) -> u32 {
    size.checked_next_power_of_two()
        .map(|window| window.wrapping_sub(1))
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_mask() {
        assert_eq!(0x3FF, address_mask(1024));
        assert_eq!(0x7FF, address_mask(2048));
        // Three pages wrap at the next power of two: four pages.
        assert_eq!(0xFFF, address_mask(3 * 1024));
        assert_eq!(u32::MAX, address_mask(0x8000_0400));
        assert_eq!(0, address_mask(0));
    }
}
