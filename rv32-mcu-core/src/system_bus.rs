//! The system bus routing core memory accesses to peripherals.

use crate::arena::{InvalidPeripheralIdError, PeripheralArena, PeripheralId};
use crate::peripheral::Peripheral;
use crate::{word_index, LAST_VALID_PAGE, PAGE_SHIFT, PAGE_SIZE};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Where a claimed page is routed to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Mapping {
    peripheral: PeripheralId,
    /// Address the peripheral's first page is attached at.
    base_address: u32,
}

/// Abstraction of the microcontroller's main bus connecting all peripherals to the core.
///
/// The 32-bit address space is divided in [`PAGE_SIZE`] pages, each of which can be claimed by at
/// most one peripheral. Accesses are routed by the page of their (first) address, and the
/// peripheral receives the address relative to its base address.
///
/// Accesses to unmapped pages are bus errors, which are absorbed silently: loads return `0` and
/// stores are dropped.
///
/// The bus also tracks the set of *reserved* words used by load-reserved/store-conditional. Every
/// store through the bus clears the reservation on the word it targets.
///
/// The bus does not own any peripheral; it stores [`PeripheralId`]s into a [`PeripheralArena`]
/// that is passed in for every access.
#[derive(Debug, Default, Clone)]
pub struct SystemBus {
    mapped_pages: BTreeMap<u32, Mapping>,
    reserved_words: HashSet<u32>,
}

impl SystemBus {
    /// Create a bus with no peripherals attached and no reservations.
    pub fn new() -> Self {
        Self {
            mapped_pages: BTreeMap::new(),
            reserved_words: HashSet::new(),
        }
    }

    /// Map the peripheral `id` into the address space, starting at `base_address`.
    ///
    /// The peripheral claims `page_count()` consecutive pages. Attaching fails, without mapping
    /// any page, if `base_address` is not page-aligned, if the peripheral has no pages, if its
    /// pages would run past the end of the address space, or if any of its pages is already
    /// claimed.
    ///
    /// There is no way to detach a peripheral again.
    pub fn attach(
        &mut self,
        arena: &PeripheralArena,
        id: PeripheralId,
        base_address: u32,
    ) -> Result<(), AttachError> {
        if base_address % PAGE_SIZE != 0 {
            return Err(AttachError::MisalignedBase { base_address });
        }
        let page_count = arena.get(id)?.page_count();
        if page_count == 0 {
            return Err(AttachError::Empty);
        }
        let first_page = base_address >> PAGE_SHIFT;
        let last_page = first_page
            .checked_add(page_count - 1)
            .filter(|&page| page <= LAST_VALID_PAGE)
            .ok_or(AttachError::OutOfAddressSpace {
                base_address,
                page_count,
            })?;
        if let Some((&page, _)) = self.mapped_pages.range(first_page..=last_page).next() {
            return Err(AttachError::Overlap {
                address: page << PAGE_SHIFT,
            });
        }

        let mapping = Mapping {
            peripheral: id,
            base_address,
        };
        self.mapped_pages
            .extend((first_page..=last_page).map(|page| (page, mapping)));
        debug!(
            "Attached peripheral {id:?} at [{base_address:#010x}, {:#010x}]",
            (last_page << PAGE_SHIFT) | (PAGE_SIZE - 1)
        );
        Ok(())
    }

    /// Returns the peripheral that the page containing `address` is routed to, together with
    /// `address` relative to that peripheral's base address.
    pub fn route(&self, address: u32) -> Option<(PeripheralId, u32)> {
        self.mapped_pages
            .get(&(address >> PAGE_SHIFT))
            .map(|mapping| (mapping.peripheral, address - mapping.base_address))
    }

    /// Returns the number of claimed pages.
    pub fn mapped_page_count(&self) -> usize {
        self.mapped_pages.len()
    }

    pub fn load_byte(&self, arena: &mut PeripheralArena, address: u32) -> u8 {
        self.load(arena, address, |p, local| p.read_byte(local))
    }

    pub fn load_halfword(&self, arena: &mut PeripheralArena, address: u32) -> u16 {
        self.load(arena, address, |p, local| p.read_halfword(local))
    }

    pub fn load_word(&self, arena: &mut PeripheralArena, address: u32) -> u32 {
        self.load(arena, address, |p, local| p.read_word(local))
    }

    pub fn store_byte(&mut self, arena: &mut PeripheralArena, address: u32, value: u8) {
        self.store(arena, address, |p, local| p.write_byte(local, value))
    }

    pub fn store_halfword(&mut self, arena: &mut PeripheralArena, address: u32, value: u16) {
        self.store(arena, address, |p, local| p.write_halfword(local, value))
    }

    pub fn store_word(&mut self, arena: &mut PeripheralArena, address: u32, value: u32) {
        self.store(arena, address, |p, local| p.write_word(local, value))
    }

    /// Reserve the word containing `address`.
    pub fn set_reservation(&mut self, address: u32) {
        self.reserved_words.insert(word_index(address));
    }

    /// Returns `true` if the word containing `address` is reserved.
    pub fn is_reserved(&self, address: u32) -> bool {
        self.reserved_words.contains(&word_index(address))
    }

    /// Drop the reservation on the word containing `address`, if any.
    pub fn clear_reservation(&mut self, address: u32) {
        self.reserved_words.remove(&word_index(address));
    }

    /// Drop all reservations, as happens on every context switch.
    pub fn clear_all_reservations(&mut self) {
        self.reserved_words.clear();
    }

    /// Returns `true` if no word is reserved.
    pub fn has_no_reservations(&self) -> bool {
        self.reserved_words.is_empty()
    }

    fn load<T: Default, F>(&self, arena: &mut PeripheralArena, address: u32, op: F) -> T
    where
        F: FnOnce(&mut dyn Peripheral, u32) -> T,
    {
        match self.route(address) {
            Some((id, local)) => match arena.get_mut(id) {
                Ok(peripheral) => op(peripheral, local),
                Err(_) => T::default(),
            },
            // Bus error
            None => T::default(),
        }
    }

    fn store<F>(&mut self, arena: &mut PeripheralArena, address: u32, op: F)
    where
        F: FnOnce(&mut dyn Peripheral, u32),
    {
        if let Some((id, local)) = self.route(address) {
            if let Ok(peripheral) = arena.get_mut(id) {
                op(peripheral, local);
            }
        }
        self.clear_reservation(address);
    }
}

/// Reasons a peripheral cannot be attached to a [`SystemBus`].
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum AttachError {
    #[error("base address {base_address:#010x} is not page-aligned")]
    MisalignedBase { base_address: u32 },
    #[error("peripheral spans no pages")]
    Empty,
    #[error("{page_count} pages at {base_address:#010x} exceed the 32-bit address space")]
    OutOfAddressSpace { base_address: u32, page_count: u32 },
    #[error("page at {address:#010x} is already claimed by another peripheral")]
    Overlap { address: u32 },
    #[error(transparent)]
    InvalidId(#[from] InvalidPeripheralIdError),
}
