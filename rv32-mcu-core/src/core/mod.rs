//! Provides a simulatable RV32IMA core implementation, running in machine mode only.

pub mod csr;
mod execute;
mod trap;

pub use trap::{Exception, Interrupt, TrapCause, TRAP_VECTOR};

use crate::arena::PeripheralArena;
use crate::instruction::{
    AmoOp, BranchCondition, CsrOp, Instruction, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp,
    StoreWidth,
};
use crate::registers::{Registers, Specifier};
use crate::system_bus::SystemBus;
use csr::{CsRegisters, CsrError, CsrSpecifier};
use execute::Executor;
use log::trace;

#[derive(Debug, Default, Clone)]
pub struct Config {
    /// Address to which the core's PC register is reset.
    pub reset_vector: u32,
}

/// RISC-V core implementing the RV32IMA ISA with a minimal machine-mode privileged architecture.
///
/// The core owns its register file, its CSRs and the [`SystemBus`] it fetches from and performs
/// loads and stores on. The peripherals the bus routes to live in a [`PeripheralArena`] that is
/// passed in for every operation that may access memory.
///
/// There is a single trap vector ([`TRAP_VECTOR`]) and a two-level interrupt-enable stack
/// (`ie`, `ie1`), exposed through `mstatus`.
#[derive(Debug)]
pub struct Core {
    config: Config,
    registers: Registers,
    cs_registers: CsRegisters,
    system_bus: SystemBus,
}

impl Core {
    pub fn new(system_bus: SystemBus, config: Config) -> Self {
        Self {
            registers: Registers::new(config.reset_vector),
            cs_registers: CsRegisters::new(),
            system_bus,
            config,
        }
    }

    /// Force this core to its reset state.
    ///
    /// Peripheral contents are left untouched, but all reservations are dropped.
    pub fn reset(&mut self) {
        self.registers = Registers::new(self.config.reset_vector);
        self.cs_registers = CsRegisters::new();
        self.system_bus.clear_all_reservations();
    }

    /// Provide a read-only view of this core's configuration.
    ///
    /// It is not possible to modify the configuration after creation.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn cs_registers(&self) -> &CsRegisters {
        &self.cs_registers
    }

    pub fn system_bus(&self) -> &SystemBus {
        &self.system_bus
    }

    pub fn system_bus_mut(&mut self) -> &mut SystemBus {
        &mut self.system_bus
    }

    /// Returns the value of register `x{index}`.
    ///
    /// # Panics
    ///
    /// `index` must be in `0..=31`, otherwise this will panic.
    pub fn get_register(&self, index: u8) -> u32 {
        self.registers.x(Specifier::from_u5(index))
    }

    /// Sets register `x{index}` to `value`. Writes to `x0` are ignored.
    ///
    /// # Panics
    ///
    /// `index` must be in `0..=31`, otherwise this will panic.
    pub fn set_register(&mut self, index: u8, value: u32) {
        self.registers.set_x(Specifier::from_u5(index), value);
    }

    pub fn pc(&self) -> u32 {
        self.registers.pc()
    }

    /// Redirect execution to `pc`. The next [`step`](Self::step) fetches from there.
    pub fn set_pc(&mut self, pc: u32) {
        self.registers.set_pc(pc);
    }

    pub fn read_csr(&self, specifier: CsrSpecifier) -> Result<u32, CsrError> {
        self.cs_registers.read(specifier)
    }

    pub fn write_csr(&mut self, specifier: CsrSpecifier, value: u32) -> Result<(), CsrError> {
        self.cs_registers.write(specifier, value)
    }

    /// Returns `true` if interrupts are globally enabled (the `ie` bit of `mstatus`).
    pub fn interrupts_enabled(&self) -> bool {
        self.cs_registers.ie()
    }

    /// Fetch, decode and execute the instruction at `pc`, count it as retired, then move on to
    /// the next instruction (or the trap vector if it trapped).
    ///
    /// The returned result reflects the trap taken, if any. The trap has already been handled.
    pub fn step(&mut self, arena: &mut PeripheralArena) -> ExecutionResult {
        let pc = self.registers.pc();
        let raw_instruction = self.system_bus.load_word(arena, pc);
        let result = self.execute(arena, raw_instruction);
        self.cs_registers.increment_instret();
        self.registers.commit_pc();
        result
    }

    /// Execute a single raw instruction as if it was located at the current `pc`.
    ///
    /// This is not the same as [`step`](Self::step)! The instruction's effects on registers,
    /// memory and CSRs are performed, and `next_pc` is updated, but `pc` itself is not advanced
    /// and `instret` is not incremented.
    ///
    /// If the instruction raises an exception, the trap is taken before returning: `next_pc`
    /// then points to the trap vector.
    ///
    /// # Unspecified behavior
    ///
    /// > The behavior upon decoding a reserved instruction is UNSPECIFIED.
    ///
    /// This implementation chooses to raise an [`Exception::IllegalInstruction`] when
    /// `raw_instruction` has a reserved or unsupported encoding.
    pub fn execute(
        &mut self,
        arena: &mut PeripheralArena,
        raw_instruction: u32,
    ) -> ExecutionResult {
        self.registers.reset_next_pc();
        let result = match Instruction::decode(raw_instruction) {
            Ok(instruction) => self.execute_instruction(arena, instruction),
            Err(err) => {
                trace!("Failed to decode {raw_instruction:#010x}: {err}");
                ExecutionResult::Exception(Exception::IllegalInstruction)
            }
        };
        if let ExecutionResult::Exception(exception) = result {
            self.trap(exception.into());
        }
        result
    }

    /// Signal an external interrupt to the core.
    ///
    /// Must be called between steps. The trap is taken immediately, regardless of whether
    /// interrupts are enabled: `mepc` is set to the instruction that would have executed next, and
    /// the next [`step`](Self::step) executes the trap handler. Callers modelling maskable
    /// interrupts should check [`interrupts_enabled`](Self::interrupts_enabled) first.
    pub fn external_interrupt(&mut self) {
        self.trap(Interrupt::External.into());
        self.registers.commit_pc();
    }

    fn execute_instruction(
        &mut self,
        arena: &mut PeripheralArena,
        instruction: Instruction,
    ) -> ExecutionResult {
        let mut executor = Executor { arena, core: self };
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                let op = match op {
                    RegImmOp::Addi => Executor::addi,
                    RegImmOp::Slti => Executor::slti,
                    RegImmOp::Sltiu => Executor::sltiu,
                    RegImmOp::Xori => Executor::xori,
                    RegImmOp::Ori => Executor::ori,
                    RegImmOp::Andi => Executor::andi,
                };
                op(&mut executor, dest, src, immediate)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => {
                let op = match op {
                    RegShiftImmOp::Slli => Executor::slli,
                    RegShiftImmOp::Srli => Executor::srli,
                    RegShiftImmOp::Srai => Executor::srai,
                };
                op(&mut executor, dest, src, shift_amount_u5)
            }
            Instruction::Auipc { dest, immediate } => executor.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => executor.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                let op = match op {
                    RegRegOp::Add => Executor::add,
                    RegRegOp::Slt => Executor::slt,
                    RegRegOp::Sltu => Executor::sltu,
                    RegRegOp::And => Executor::and,
                    RegRegOp::Or => Executor::or,
                    RegRegOp::Xor => Executor::xor,
                    RegRegOp::Sll => Executor::sll,
                    RegRegOp::Srl => Executor::srl,
                    RegRegOp::Sub => Executor::sub,
                    RegRegOp::Sra => Executor::sra,
                    RegRegOp::Mul => Executor::mul,
                    RegRegOp::Mulh => Executor::mulh,
                    RegRegOp::Mulhsu => Executor::mulhsu,
                    RegRegOp::Mulhu => Executor::mulhu,
                    RegRegOp::Div => Executor::div,
                    RegRegOp::Divu => Executor::divu,
                    RegRegOp::Rem => Executor::rem,
                    RegRegOp::Remu => Executor::remu,
                };
                op(&mut executor, dest, src1, src2)
            }
            Instruction::Jal { dest, offset } => executor.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => executor.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => {
                let op = match condition {
                    BranchCondition::Beq => Executor::beq,
                    BranchCondition::Bne => Executor::bne,
                    BranchCondition::Blt => Executor::blt,
                    BranchCondition::Bltu => Executor::bltu,
                    BranchCondition::Bge => Executor::bge,
                    BranchCondition::Bgeu => Executor::bgeu,
                };
                op(&mut executor, src1, src2, offset)
            }
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => {
                let op = match width {
                    LoadWidth::Lb => Executor::lb,
                    LoadWidth::Lh => Executor::lh,
                    LoadWidth::Lw => Executor::lw,
                    LoadWidth::Lbu => Executor::lbu,
                    LoadWidth::Lhu => Executor::lhu,
                };
                op(&mut executor, dest, base, offset)
            }
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => {
                let op = match width {
                    StoreWidth::Sb => Executor::sb,
                    StoreWidth::Sh => Executor::sh,
                    StoreWidth::Sw => Executor::sw,
                };
                op(&mut executor, src, base, offset)
            }
            Instruction::Amo {
                op,
                dest,
                address,
                src,
            } => {
                let op = match op {
                    AmoOp::Lr => return executor.lr(dest, address),
                    AmoOp::Sc => Executor::sc,
                    AmoOp::Swap => Executor::amoswap,
                    AmoOp::Add => Executor::amoadd,
                    AmoOp::Xor => Executor::amoxor,
                    AmoOp::And => Executor::amoand,
                    AmoOp::Or => Executor::amoor,
                    AmoOp::Min => Executor::amomin,
                    AmoOp::Max => Executor::amomax,
                    AmoOp::Minu => Executor::amominu,
                    AmoOp::Maxu => Executor::amomaxu,
                };
                op(&mut executor, dest, address, src)
            }
            Instruction::Fence => executor.fence(),
            Instruction::FenceI => executor.fence_i(),
            Instruction::Scall => executor.scall(),
            Instruction::Sbreak => executor.sbreak(),
            Instruction::Eret => executor.eret(),
            Instruction::Csr {
                op,
                dest,
                csr,
                operand,
            } => {
                let op = match op {
                    CsrOp::ReadWrite => Executor::csrrw,
                    CsrOp::ReadSet => Executor::csrrs,
                    CsrOp::ReadClear => Executor::csrrc,
                };
                op(&mut executor, dest, csr, operand)
            }
        }
    }

    /// Take a trap: push the interrupt-enable stack, record the cause and the current `pc`, drop
    /// all reservations and continue at the trap vector.
    fn trap(&mut self, cause: TrapCause) {
        let pc = self.registers.pc();
        trace!("Taking trap {cause:?} at {pc:#010x}");
        self.cs_registers.enter_trap(pc, cause.code());
        self.system_bus.clear_all_reservations();
        self.registers.set_next_pc(TRAP_VECTOR);
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum ExecutionResult {
    /// Execution went normal
    #[default]
    Ok,
    /// Execution triggered an exception
    Exception(Exception),
}
