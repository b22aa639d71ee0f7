/// Address execution continues at after any trap.
pub const TRAP_VECTOR: u32 = 0x0000_01C0;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Exception {
    /// Generic exception used to communicate one of many possible scenarios:
    ///
    /// - Attempt to decode a reserved or unsupported instruction.
    /// - Attempt to access a non-existent CSR.
    /// - Attempt to write to a read-only CSR.
    IllegalInstruction,
    /// Raised by SBREAK.
    Breakpoint,
    /// Raised by SCALL.
    EnvironmentCall,
}

impl Exception {
    /// Returns the exception code (cause) for this exception.
    pub fn code(&self) -> u32 {
        match self {
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::EnvironmentCall => 11,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Interrupt {
    External,
}

impl Interrupt {
    /// Returns the exception code (cause) for this interrupt.
    ///
    /// Interrupt causes share the code space of exceptions: no interrupt bit is set in `mcause`.
    pub fn code(&self) -> u32 {
        match self {
            Self::External => 15,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapCause {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl TrapCause {
    /// Returns the value written to `mcause` when this trap is taken.
    pub fn code(&self) -> u32 {
        match self {
            Self::Exception(exception) => exception.code(),
            Self::Interrupt(interrupt) => interrupt.code(),
        }
    }
}

impl From<Exception> for TrapCause {
    fn from(value: Exception) -> Self {
        Self::Exception(value)
    }
}

impl From<Interrupt> for TrapCause {
    fn from(value: Interrupt) -> Self {
        Self::Interrupt(value)
    }
}
