//! Provides a machine bundling a single core with the peripherals on its bus.

use crate::arena::{PeripheralArena, PeripheralId};
use crate::core::{Config, Core, ExecutionResult};
use crate::peripheral::Peripheral;
use crate::system_bus::{AttachError, SystemBus};
use log::warn;

/// A single-core machine: one [`Core`] and the [`PeripheralArena`] owning everything on its bus.
///
/// The machine progresses in timesteps. Each timestep executes exactly one instruction, then
/// runs the [`cycle`](Peripheral::cycle) hook of every peripheral, then the
/// [`timestep`](Peripheral::timestep) hook of every peripheral.
#[derive(Debug)]
pub struct Machine {
    arena: PeripheralArena,
    core: Core,
}

impl Machine {
    /// Create a machine with an empty bus.
    pub fn new(config: Config) -> Self {
        Self::from_parts(PeripheralArena::new(), Core::new(SystemBus::new(), config))
    }

    /// Bundle an existing arena with a core whose bus refers to peripherals in that arena.
    pub fn from_parts(arena: PeripheralArena, core: Core) -> Self {
        Self { arena, core }
    }

    /// Split the machine back into its arena and core.
    pub fn into_parts(self) -> (PeripheralArena, Core) {
        (self.arena, self.core)
    }

    /// Move `peripheral` into the machine and attach it to the bus at `base_address`.
    ///
    /// If it cannot be attached, the peripheral is dropped again and the error is returned.
    pub fn attach<P: Peripheral>(
        &mut self,
        peripheral: P,
        base_address: u32,
    ) -> Result<PeripheralId, AttachError> {
        let id = self.arena.insert(peripheral);
        let result = self
            .core
            .system_bus_mut()
            .attach(&self.arena, id, base_address);
        match result {
            Ok(()) => Ok(id),
            Err(err) => {
                warn!("Dropping peripheral that could not be attached: {err}");
                self.arena.remove(id).ok();
                Err(err)
            }
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core {
        &mut self.core
    }

    pub fn arena(&self) -> &PeripheralArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut PeripheralArena {
        &mut self.arena
    }

    /// Execute a single instruction, then let every peripheral advance one timestep.
    pub fn timestep(&mut self) -> ExecutionResult {
        let result = self.core.step(&mut self.arena);
        self.arena.timestep_all();
        result
    }

    /// Run up to `max_steps` timesteps, stopping early after a timestep for which `halt` returns
    /// `true`. Returns the number of timesteps performed.
    pub fn run<F>(&mut self, max_steps: u64, mut halt: F) -> u64
    where
        F: FnMut(&Self, ExecutionResult) -> bool,
    {
        for steps in 1..=max_steps {
            let result = self.timestep();
            if halt(self, result) {
                return steps;
            }
        }
        max_steps
    }

    /// Signal an external interrupt to the core, see [`Core::external_interrupt`].
    pub fn external_interrupt(&mut self) {
        self.core.external_interrupt();
    }

    /// Write `bytes` to consecutive physical addresses starting at `address`, through the bus.
    ///
    /// Stores are subject to the usual bus rules: bytes aimed at unmapped addresses or at ROM are
    /// dropped.
    pub fn load_physical(&mut self, address: u32, bytes: &[u8]) {
        let bus = self.core.system_bus_mut();
        for (offset, &byte) in (0..).zip(bytes) {
            bus.store_byte(&mut self.arena, address.wrapping_add(offset), byte);
        }
    }

    /// Read `len` bytes from consecutive physical addresses starting at `address`, through the bus.
    pub fn read_physical(&mut self, address: u32, len: usize) -> Vec<u8> {
        let bus = self.core.system_bus();
        (0..len as u32)
            .map(|offset| bus.load_byte(&mut self.arena, address.wrapping_add(offset)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ram::Ram;
    use crate::resources::rom::Rom;

    #[derive(Debug, Default)]
    struct Ticker {
        cycles: u32,
    }

    impl Peripheral for Ticker {
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
    }

    #[test]
    fn test_attach_failure_drops_peripheral() {
        let mut machine = Machine::new(Config::default());
        machine.attach(Ram::new(2), 0).unwrap();
        assert_eq!(
            Err(AttachError::Overlap { address: 0x400 }),
            machine.attach(Ram::new(1), 0x400)
        );
        assert_eq!(1, machine.arena().len());
    }

    #[test]
    fn test_load_and_read_physical() {
        let mut machine = Machine::new(Config::default());
        machine.attach(Rom::new(1, &[0xAA; 4]), 0).unwrap();
        machine.attach(Ram::new(1), 0x400).unwrap();
        machine.load_physical(0x3FE, &[1, 2, 3, 4]);
        assert_eq!(vec![0xAA, 0xAA, 3, 4], machine.read_physical(0x3FE, 4));
    }

    #[test]
    fn test_timestep_ticks_peripherals() {
        let mut machine = Machine::new(Config::default());
        // addi a0, a0, 1 repeated
        let program: Vec<u8> = [0x0015_0513u32; 4]
            .iter()
            .flat_map(|insn| insn.to_le_bytes())
            .collect();
        machine.attach(Rom::new(1, &program), 0).unwrap();
        let ticker = machine.attach(Ticker::default(), 0x400).unwrap();
        assert_eq!(3, machine.run(3, |_, _| false));
        assert_eq!(3, machine.core().get_register(10));
        assert_eq!(
            3,
            machine.arena().get_as::<Ticker>(ticker).unwrap().cycles
        );
    }

    #[test]
    fn test_run_halts_early() {
        let mut machine = Machine::new(Config::default());
        // addi a0, a0, 1; sbreak
        let mut program = 0x0015_0513u32.to_le_bytes().to_vec();
        program.extend(0x0010_0073u32.to_le_bytes());
        machine.attach(Rom::new(1, &program), 0).unwrap();
        let steps = machine.run(100, |_, result| result != ExecutionResult::Ok);
        assert_eq!(2, steps);
        assert_eq!(1, machine.core().get_register(10));
    }
}
