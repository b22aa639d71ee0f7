//! General purpose registers and the program counter pair.

use std::fmt;
use std::fmt::Formatter;

/// The type of a single `x` register.
pub type X = u32;

/// The bit width of the `x` registers.
pub const XLEN: u32 = X::BITS;

/// Number of `x` registers, `x0` through `x31`.
pub const LEN: u8 = 32;

/// The core's general purpose registers, together with `pc` and `next_pc`.
///
/// There are 32 `x` word-size (32 bit) registers, named `x0` up to `x31`.
/// The register `x0` (aka `zero`) is always zero. Writes to it are ignored.
///
/// `pc` holds the address of the instruction being executed. `next_pc` is where execution
/// continues once the current instruction has completed: it defaults to `pc + 4`, control transfer
/// instructions and traps redirect it, and [`Registers::commit_pc`] moves it into `pc`.
///
/// It is not possible to get a mutable reference to an `x` register, since that would allow
/// unchecked writes to register `x0`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Registers {
    x_registers: [X; LEN as usize],
    pc: u32,
    next_pc: u32,
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Registers {
    /// Returns a fresh set of all-zero registers, with `pc` set to `initial_pc`.
    pub fn new(initial_pc: u32) -> Self {
        Self {
            x_registers: [0; LEN as usize],
            pc: initial_pc,
            next_pc: initial_pc.wrapping_add(4),
        }
    }

    pub fn x(&self, specifier: Specifier) -> u32 {
        self.x_registers[usize::from(specifier)]
    }

    /// Sets the value of an `x` register.
    ///
    /// Writes to register `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: u32) {
        self.replace_x(specifier, value);
    }

    /// Like [`set_x`](Self::set_x), but hands back the previous value. Always returns `0` for
    /// `x0`.
    pub fn replace_x(&mut self, specifier: Specifier, value: u32) -> u32 {
        if specifier.0 == 0 {
            0
        } else {
            std::mem::replace(&mut self.x_registers[specifier.0 as usize], value)
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Sets `pc` directly. `next_pc` is reset to follow it.
    pub fn set_pc(&mut self, value: u32) {
        self.pc = value;
        self.next_pc = value.wrapping_add(4);
    }

    /// Returns the address execution continues at after the current instruction.
    pub fn next_pc(&self) -> u32 {
        self.next_pc
    }

    /// Redirects execution after the current instruction to `value`.
    pub fn set_next_pc(&mut self, value: u32) {
        self.next_pc = value;
    }

    /// Resets `next_pc` to the address of the sequentially next instruction.
    pub fn reset_next_pc(&mut self) {
        self.next_pc = self.pc.wrapping_add(4);
    }

    /// Moves `next_pc` into `pc`, completing the current instruction.
    pub fn commit_pc(&mut self) {
        self.set_pc(self.next_pc);
    }
}

/// Index of one of the [`LEN`] `x` registers, as encoded in the `rd`/`rs1`/`rs2` fields.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. `zero`.
    pub const X0: Self = Specifier(0);
    /// Register `x1`, a.k.a. `ra`, the return address by calling convention.
    pub const RA: Self = Specifier(1);
    /// Register `x2`, a.k.a. `sp`.
    pub const SP: Self = Specifier(2);
    /// Register `x10`, a.k.a. `a0`, the first argument and return value register.
    pub const A0: Self = Specifier(10);
    /// Register `x11`, a.k.a. `a1`.
    pub const A1: Self = Specifier(11);

    /// Returns `None` unless `index` names one of `x0..=x31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Build a specifier from a decoded 5-bit register field.
    ///
    /// # Panics
    ///
    /// Panics if `value_u5 > 31`.
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }

    /// All specifiers in ascending order.
    pub fn iter_all() -> impl Iterator<Item = Self> {
        (0..LEN).map(Self)
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
