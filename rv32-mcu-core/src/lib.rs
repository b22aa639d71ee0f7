//! Emulation of a small RV32IMA microcontroller: a machine-mode-only core, a page-routed system
//! bus, and the memory-mapped peripherals attached to it.
//!
//! Peripherals are owned by a [`PeripheralArena`] that belongs to the embedding application. The
//! [`SystemBus`] only stores [`PeripheralId`]s, so every operation that may touch memory takes the
//! arena as an explicit argument.

#[macro_use]
extern crate static_assertions;

pub mod arena;
pub mod core;
pub mod instruction;
pub mod machine;
pub mod peripheral;
pub mod registers;
pub mod resources;
pub mod system_bus;

pub use arena::{InvalidPeripheralIdError, PeripheralArena, PeripheralId};
pub use machine::Machine;
pub use peripheral::Peripheral;
pub use system_bus::{AttachError, SystemBus};

/// Size of a single page of the bus address space, in bytes.
///
/// The bus routes accesses with page granularity, and peripherals report their size as a number
/// of pages.
pub const PAGE_SIZE: u32 = 1024;

/// Number of bits an address must be shifted right by to obtain its page number.
pub const PAGE_SHIFT: u32 = PAGE_SIZE.trailing_zeros();

const_assert!(PAGE_SIZE.is_power_of_two());
const_assert_eq!(1 << PAGE_SHIFT, PAGE_SIZE);

/// The last page number that can be addressed with 32-bit addresses.
pub const LAST_VALID_PAGE: u32 = u32::MAX >> PAGE_SHIFT;

/// Returns the word index of a byte address, i.e. the address with its two least significant
/// bits dropped. Reservations are tracked at this granularity.
pub fn word_index(address: u32) -> u32 {
    address >> 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_constants() {
        assert_eq!(10, PAGE_SHIFT);
        assert_eq!(0x003F_FFFF, LAST_VALID_PAGE);
    }

    #[test]
    fn test_word_index() {
        assert_eq!(0, word_index(0));
        assert_eq!(0, word_index(3));
        assert_eq!(1, word_index(4));
        assert_eq!(0x3FFF_FFFF, word_index(u32::MAX));
    }
}
