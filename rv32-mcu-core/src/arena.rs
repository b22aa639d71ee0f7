//! Owning storage for peripherals, addressed by copyable ids.

use crate::peripheral::Peripheral;
use generational_arena::{Arena, Index};
use thiserror::Error;

/// Identifies a peripheral stored in a [`PeripheralArena`].
///
/// Ids are never reused by the arena that created them, so a stale id can never refer to a
/// different peripheral.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PeripheralId(Index);

/// Arena owning all peripherals of a machine.
///
/// The arena belongs to the embedding application. The [`SystemBus`](crate::SystemBus) only holds
/// [`PeripheralId`]s into it, and borrows the arena for the duration of each access.
#[derive(Debug, Default)]
pub struct PeripheralArena {
    peripherals: Arena<Box<dyn Peripheral>>,
}

impl PeripheralArena {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            peripherals: Arena::new(),
        }
    }

    /// Moves `peripheral` into the arena, returning the id to address it by.
    pub fn insert<P: Peripheral>(&mut self, peripheral: P) -> PeripheralId {
        PeripheralId(self.peripherals.insert(Box::new(peripheral)))
    }

    /// Removes a peripheral that never made it onto a bus.
    pub(crate) fn remove(
        &mut self,
        id: PeripheralId,
    ) -> Result<Box<dyn Peripheral>, InvalidPeripheralIdError> {
        self.peripherals
            .remove(id.0)
            .ok_or(InvalidPeripheralIdError(id))
    }

    /// Returns the number of peripherals stored.
    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    /// Returns `true` if no peripherals are stored.
    pub fn is_empty(&self) -> bool {
        self.peripherals.is_empty()
    }

    pub fn get(&self, id: PeripheralId) -> Result<&dyn Peripheral, InvalidPeripheralIdError> {
        self.peripherals
            .get(id.0)
            .map(Box::as_ref)
            .ok_or(InvalidPeripheralIdError(id))
    }

    pub fn get_mut(
        &mut self,
        id: PeripheralId,
    ) -> Result<&mut dyn Peripheral, InvalidPeripheralIdError> {
        match self.peripherals.get_mut(id.0) {
            Some(peripheral) => Ok(peripheral.as_mut()),
            None => Err(InvalidPeripheralIdError(id)),
        }
    }

    /// Returns the peripheral with id `id` as its concrete type, or `None` if there is no such
    /// peripheral or it is of another type.
    pub fn get_as<P: Peripheral>(&self, id: PeripheralId) -> Option<&P> {
        self.peripherals.get(id.0)?.downcast_ref::<P>()
    }

    /// Mutable version of [`Self::get_as`].
    pub fn get_as_mut<P: Peripheral>(&mut self, id: PeripheralId) -> Option<&mut P> {
        self.peripherals.get_mut(id.0)?.downcast_mut::<P>()
    }

    /// Runs the per-cycle hook of every peripheral, then the per-timestep hook of every
    /// peripheral.
    pub fn timestep_all(&mut self) {
        for (_, peripheral) in self.peripherals.iter_mut() {
            peripheral.cycle();
        }
        for (_, peripheral) in self.peripherals.iter_mut() {
            peripheral.timestep();
        }
    }
}

/// An id was used that does not (or no longer) refer to a peripheral in the arena.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("no peripheral with id {0:?} in arena")]
pub struct InvalidPeripheralIdError(pub PeripheralId);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ram::Ram;
    use crate::resources::rom::Rom;

    #[derive(Debug, Default)]
    struct Counter {
        cycles: u32,
        timesteps: u32,
        cycles_at_timestep: u32,
    }

    impl Peripheral for Counter {
        fn page_count(&self) -> u32 {
            1
        }
        fn read_byte(&mut self, _address: u32) -> u8 {
            0
        }
        fn read_halfword(&mut self, _address: u32) -> u16 {
            0
        }
        fn read_word(&mut self, _address: u32) -> u32 {
            self.cycles
        }
        fn write_byte(&mut self, _address: u32, _value: u8) {}
        fn write_halfword(&mut self, _address: u32, _value: u16) {}
        fn write_word(&mut self, _address: u32, _value: u32) {}
        fn cycle(&mut self) {
            self.cycles += 1;
        }
        fn timestep(&mut self) {
            self.timesteps += 1;
            self.cycles_at_timestep = self.cycles;
        }
    }

    #[test]
    fn test_insert_and_get() {
        let mut arena = PeripheralArena::new();
        assert!(arena.is_empty());
        let ram = arena.insert(Ram::new(2));
        let rom = arena.insert(Rom::new(1, &[]));
        assert_eq!(2, arena.len());
        assert_eq!(2, arena.get(ram).unwrap().page_count());
        assert_eq!(1, arena.get(rom).unwrap().page_count());
    }

    #[test]
    fn test_downcast() {
        let mut arena = PeripheralArena::new();
        let ram = arena.insert(Ram::new(1));
        assert!(arena.get_as::<Ram>(ram).is_some());
        assert!(arena.get_as::<Rom>(ram).is_none());
        arena.get_as_mut::<Ram>(ram).unwrap().set_contents(&[1, 2, 3]);
        assert_eq!(0x0003_0201, arena.get_mut(ram).unwrap().read_word(0));
    }

    #[test]
    fn test_removed_id_is_invalid() {
        let mut arena = PeripheralArena::new();
        let ram = arena.insert(Ram::new(1));
        assert!(arena.remove(ram).is_ok());
        assert_eq!(Err(InvalidPeripheralIdError(ram)), arena.get(ram).map(|_| ()));
        let other = arena.insert(Ram::new(1));
        assert_ne!(ram, other);
        assert!(arena.get(ram).is_err());
    }

    #[test]
    fn test_timestep_order() {
        let mut arena = PeripheralArena::new();
        let a = arena.insert(Counter::default());
        let b = arena.insert(Counter::default());
        arena.timestep_all();
        arena.timestep_all();
        for id in [a, b] {
            let counter = arena.get_as::<Counter>(id).unwrap();
            assert_eq!(2, counter.cycles);
            assert_eq!(2, counter.timesteps);
            assert_eq!(2, counter.cycles_at_timestep);
        }
    }
}
