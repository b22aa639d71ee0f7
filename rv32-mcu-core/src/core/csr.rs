//! Machine-mode control and status registers.

use bitvec::{order::Lsb0, view::BitView};
use thiserror::Error;

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

/// Machine status register.
pub const MSTATUS: CsrSpecifier = 0x300;
/// Scratch register for machine trap handlers.
pub const MSCRATCH: CsrSpecifier = 0x340;
/// Machine exception program counter.
pub const MEPC: CsrSpecifier = 0x341;
/// Machine trap cause.
pub const MCAUSE: CsrSpecifier = 0x342;
/// Machine bad address.
pub const MBADADDR: CsrSpecifier = 0x343;

/// Cycle counter for RDCYCLE instruction.
pub const CYCLE: CsrSpecifier = 0xC00;
/// Timer for RDTIME instruction.
pub const TIME: CsrSpecifier = 0xC01;
/// Instructions-retired counter for RDINSTRET instruction.
pub const INSTRET: CsrSpecifier = 0xC02;
/// Upper 32 bits of [`CYCLE`].
pub const CYCLEH: CsrSpecifier = 0xC80;
/// Upper 32 bits of [`TIME`].
pub const TIMEH: CsrSpecifier = 0xC81;
/// Upper 32 bits of [`INSTRET`].
pub const INSTRETH: CsrSpecifier = 0xC82;

/// CPU description.
pub const MCPUID: CsrSpecifier = 0xF00;
/// Vendor and implementation ID.
pub const MIMPID: CsrSpecifier = 0xF01;
/// Hardware thread ID.
pub const MHARTID: CsrSpecifier = 0xF10;

/// RV32 base with the A, I and M extensions.
pub const MCPUID_VALUE: u32 = 0b0000_0000_0000_0000_0001_0001_0000_0001;
pub const MIMPID_VALUE: u32 = 0x0010_8000;
pub const MHARTID_VALUE: u32 = 0;

/// Bits of `mstatus` that always read as one: the privilege fields report machine mode.
const MSTATUS_FIXED: u32 = 0b0011_0110;

/// Bit indices for the fields of the mstatus register.
mod idx {
    pub const IE: usize = 0;
    pub const IE1: usize = 3;
}

/// The CSR file of the core.
///
/// `mstatus` is not stored as such: it is synthesized from the two-level interrupt-enable stack
/// (`ie`, `ie1`) on every read.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CsRegisters {
    ie: bool,
    ie1: bool,
    mscratch: u32,
    mepc: u32,
    mcause: u32,
    mbadaddr: u32,
    instret: u64,
}

impl CsRegisters {
    /// Create a CSR file with all registers zeroed and interrupts disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the CSR `specifier`.
    ///
    /// Reading never has side effects.
    pub fn read(&self, specifier: CsrSpecifier) -> Result<u32, CsrError> {
        match specifier {
            MSTATUS => Ok(self.read_mstatus()),
            MSCRATCH => Ok(self.mscratch),
            MEPC => Ok(self.mepc),
            MCAUSE => Ok(self.mcause),
            MBADADDR => Ok(self.mbadaddr),
            CYCLE | TIME | CYCLEH | TIMEH => Ok(0),
            INSTRET => Ok(self.instret as u32),
            INSTRETH => Ok((self.instret >> 32) as u32),
            MCPUID => Ok(MCPUID_VALUE),
            MIMPID => Ok(MIMPID_VALUE),
            MHARTID => Ok(MHARTID_VALUE),
            _ => Err(CsrError::Unsupported(specifier)),
        }
    }

    /// Write `value` to the CSR `specifier`.
    pub fn write(&mut self, specifier: CsrSpecifier, value: u32) -> Result<(), CsrError> {
        match specifier {
            MSTATUS => self.write_mstatus(value),
            MSCRATCH => self.mscratch = value,
            MEPC => self.mepc = value,
            MCAUSE => self.mcause = value,
            MBADADDR => self.mbadaddr = value,
            CYCLE | TIME | INSTRET | CYCLEH | TIMEH | INSTRETH | MCPUID | MIMPID | MHARTID => {
                return Err(CsrError::ReadOnly(specifier))
            }
            _ => return Err(CsrError::Unsupported(specifier)),
        }
        Ok(())
    }

    pub fn read_mstatus(&self) -> u32 {
        let mut mstatus = MSTATUS_FIXED;
        let bits = mstatus.view_bits_mut::<Lsb0>();
        bits.set(idx::IE, self.ie);
        bits.set(idx::IE1, self.ie1);
        mstatus
    }

    /// Only the `ie` and `ie1` fields are writable, all other bits are ignored.
    pub fn write_mstatus(&mut self, value: u32) {
        let bits = value.view_bits::<Lsb0>();
        self.ie = bits[idx::IE];
        self.ie1 = bits[idx::IE1];
    }

    pub fn ie(&self) -> bool {
        self.ie
    }

    pub fn ie1(&self) -> bool {
        self.ie1
    }

    pub fn mepc(&self) -> u32 {
        self.mepc
    }

    pub fn mcause(&self) -> u32 {
        self.mcause
    }

    pub fn instret(&self) -> u64 {
        self.instret
    }

    pub fn increment_instret(&mut self) {
        self.instret = self.instret.wrapping_add(1);
    }

    /// Push the interrupt-enable stack and record the trap in `mepc` and `mcause`.
    pub(super) fn enter_trap(&mut self, pc: u32, cause: u32) {
        self.ie1 = self.ie;
        self.ie = false;
        self.mepc = pc;
        self.mcause = cause;
    }

    /// Pop the interrupt-enable stack, returning the address to resume execution at.
    pub(super) fn return_from_trap(&mut self) -> u32 {
        self.ie = self.ie1;
        self.ie1 = true;
        self.mepc
    }
}

/// Errors that can occur when attempting to access a CSR.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrError {
    #[error("unsupported CSR: {0:#05x}")]
    Unsupported(CsrSpecifier),
    #[error("attempt to write to read-only CSR {0:#05x}")]
    ReadOnly(CsrSpecifier),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mstatus_synthesis() {
        let mut csrs = CsRegisters::new();
        assert_eq!(0x36, csrs.read(MSTATUS).unwrap());
        csrs.write(MSTATUS, 0xFFFF_FFFF).unwrap();
        assert!(csrs.ie());
        assert!(csrs.ie1());
        assert_eq!(0x3F, csrs.read(MSTATUS).unwrap());
        csrs.write(MSTATUS, 0x0000_0008).unwrap();
        assert!(!csrs.ie());
        assert!(csrs.ie1());
        assert_eq!(0x3E, csrs.read(MSTATUS).unwrap());
        csrs.write(MSTATUS, 0xFFFF_FFF6).unwrap();
        assert_eq!(0x36, csrs.read(MSTATUS).unwrap());
    }

    #[test]
    fn test_read_write_registers() {
        let mut csrs = CsRegisters::new();
        for csr in [MSCRATCH, MEPC, MCAUSE, MBADADDR] {
            assert_eq!(0, csrs.read(csr).unwrap());
            csrs.write(csr, 0xDEAD_0000 | u32::from(csr)).unwrap();
            assert_eq!(0xDEAD_0000 | u32::from(csr), csrs.read(csr).unwrap());
        }
    }

    #[test]
    fn test_read_only_registers() {
        let mut csrs = CsRegisters::new();
        assert_eq!(Ok(0x0000_1101), csrs.read(MCPUID));
        assert_eq!(Ok(0x0010_8000), csrs.read(MIMPID));
        assert_eq!(Ok(0), csrs.read(MHARTID));
        for csr in [CYCLE, TIME, CYCLEH, TIMEH] {
            assert_eq!(Ok(0), csrs.read(csr));
        }
        for csr in [CYCLE, TIME, INSTRET, CYCLEH, TIMEH, INSTRETH, MCPUID, MIMPID, MHARTID] {
            assert_eq!(Err(CsrError::ReadOnly(csr)), csrs.write(csr, 1));
        }
        assert_eq!(Ok(0x0000_1101), csrs.read(MCPUID));
    }

    #[test]
    fn test_unsupported() {
        let mut csrs = CsRegisters::new();
        // mtvec and mie are not part of this CSR file
        assert_eq!(Err(CsrError::Unsupported(0x305)), csrs.read(0x305));
        assert_eq!(Err(CsrError::Unsupported(0x304)), csrs.write(0x304, 0));
    }

    #[test]
    fn test_instret_halves() {
        let mut csrs = CsRegisters::new();
        csrs.instret = 0xFFFF_FFFF;
        csrs.increment_instret();
        assert_eq!(Ok(0), csrs.read(INSTRET));
        assert_eq!(Ok(1), csrs.read(INSTRETH));
        csrs.increment_instret();
        assert_eq!(Ok(1), csrs.read(INSTRET));
    }

    #[test]
    fn test_trap_stack() {
        let mut csrs = CsRegisters::new();
        csrs.write(MSTATUS, 1).unwrap();
        csrs.enter_trap(0x100, 2);
        assert!(!csrs.ie());
        assert!(csrs.ie1());
        assert_eq!(0x100, csrs.mepc());
        assert_eq!(2, csrs.mcause());
        // Nested trap loses the outer enable state
        csrs.enter_trap(0x1C4, 11);
        assert!(!csrs.ie1());
        assert_eq!(0x1C4, csrs.return_from_trap());
        assert!(!csrs.ie());
        assert!(csrs.ie1());
    }
}
