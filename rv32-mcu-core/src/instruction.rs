//! Decoding of raw 32-bit instruction words into [`Instruction`] values.

use crate::registers::Specifier;
use thiserror::Error;

/// Data structure that can hold any supported instruction in its decoded form.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    },
    OpShiftImm {
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    },
    Auipc {
        dest: Specifier,
        immediate: i32,
    },
    Lui {
        dest: Specifier,
        immediate: i32,
    },
    /// Register-register operation, including the M extension.
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Jal {
        dest: Specifier,
        offset: i32,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    },
    /// Word-sized atomic memory operation of the A extension.
    ///
    /// The *aq* and *rl* ordering bits are not retained: all accesses are performed in program
    /// order anyway.
    Amo {
        op: AmoOp,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    },
    Fence,
    FenceI,
    Scall,
    Sbreak,
    Eret,
    Csr {
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        operand: CsrOperand,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegShiftImmOp {
    Slli,
    Srli,
    Srai,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegRegOp {
    Add,
    Slt,
    Sltu,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sub,
    Sra,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmoOp {
    Lr,
    Sc,
    Swap,
    Add,
    Xor,
    And,
    Or,
    Min,
    Max,
    Minu,
    Maxu,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    /// Atomic read/write
    ReadWrite,
    /// Atomic read and set bits
    ReadSet,
    /// Atomic read and clear bits
    ReadClear,
}

/// Source of the value a CSR instruction writes, set or clears.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CsrOperand {
    Register(Specifier),
    /// Zero-extended 5-bit immediate encoded in the *rs1* field.
    Immediate(u32),
}

impl CsrOperand {
    /// Returns `true` if the *rs1* field of the instruction is zero, i.e. the operand is either
    /// `x0` or the immediate `0`.
    pub fn is_zero_field(self) -> bool {
        match self {
            Self::Register(specifier) => specifier == Specifier::X0,
            Self::Immediate(uimm) => uimm == 0,
        }
    }
}

impl Instruction {
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        if raw_instruction & 0b11 != 0b11 {
            return Err(DecodeError::NotThirtyTwoBit);
        }
        match opcode_group(raw_instruction)? {
            OpcodeGroup::OpImm => match i_funct(raw_instruction) {
                Some(op) => Ok(Self::OpImm {
                    op,
                    dest: rd(raw_instruction),
                    src: rs1(raw_instruction),
                    immediate: i_imm(raw_instruction),
                }),
                None => match i_shfunct(raw_instruction) {
                    Some(op) => Ok(Self::OpShiftImm {
                        op,
                        dest: rd(raw_instruction),
                        src: rs1(raw_instruction),
                        shift_amount_u5: shamt(raw_instruction),
                    }),
                    None => Err(DecodeError::IllegalInstruction),
                },
            },
            OpcodeGroup::Auipc => Ok(Self::Auipc {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            OpcodeGroup::Lui => Ok(Self::Lui {
                dest: rd(raw_instruction),
                immediate: u_imm(raw_instruction),
            }),
            OpcodeGroup::Op => match r_funct(raw_instruction) {
                Some(op) => Ok(Self::Op {
                    op,
                    dest: rd(raw_instruction),
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            OpcodeGroup::Jal => Ok(Self::Jal {
                dest: rd(raw_instruction),
                offset: j_imm(raw_instruction),
            }),
            OpcodeGroup::Jalr => match funct3(raw_instruction) {
                0b000 => Ok(Self::Jalr {
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                _ => Err(DecodeError::IllegalInstruction),
            },
            OpcodeGroup::Branch => match b_funct(raw_instruction) {
                Some(condition) => Ok(Self::Branch {
                    condition,
                    src1: rs1(raw_instruction),
                    src2: rs2(raw_instruction),
                    offset: b_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            OpcodeGroup::Load => match i_width(raw_instruction) {
                Some(width) => Ok(Self::Load {
                    width,
                    dest: rd(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: i_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            OpcodeGroup::Store => match s_width(raw_instruction) {
                Some(width) => Ok(Self::Store {
                    width,
                    src: rs2(raw_instruction),
                    base: rs1(raw_instruction),
                    offset: s_imm(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            // The ordering fields of FENCE are ignored: memory accesses complete immediately.
            OpcodeGroup::MiscMem => match funct3(raw_instruction) {
                0b000 => Ok(Self::Fence),
                0b001 => Ok(Self::FenceI),
                _ => Err(DecodeError::IllegalInstruction),
            },
            OpcodeGroup::Amo => match a_funct(raw_instruction) {
                Some(op) => Ok(Self::Amo {
                    op,
                    dest: rd(raw_instruction),
                    address: rs1(raw_instruction),
                    src: rs2(raw_instruction),
                }),
                None => Err(DecodeError::IllegalInstruction),
            },
            OpcodeGroup::System => i_sys(raw_instruction).ok_or(DecodeError::IllegalInstruction),
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("instruction is not a 32-bit encoding")]
    NotThirtyTwoBit,
    #[error("instruction has unsupported opcode group {0:#07b}")]
    UnsupportedOpcode(u8),
    #[error("illegal instruction")]
    IllegalInstruction,
}

/// Major opcode groups, identified by bits [6:2] of the instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpcodeGroup {
    Load,
    MiscMem,
    OpImm,
    Auipc,
    Store,
    Amo,
    Op,
    Lui,
    Branch,
    Jalr,
    Jal,
    System,
}

impl OpcodeGroup {
    /// Returns the group for the 5-bit tag in bits [6:2], or `None` if it isn't supported.
    pub fn from_tag(tag_u5: u8) -> Option<Self> {
        match tag_u5 {
            0 => Some(Self::Load),
            // LOAD-FP, custom-0
            3 => Some(Self::MiscMem),
            4 => Some(Self::OpImm),
            5 => Some(Self::Auipc),
            // OP-IMM-32, 48b
            8 => Some(Self::Store),
            // STORE-FP, custom-1
            11 => Some(Self::Amo),
            12 => Some(Self::Op),
            13 => Some(Self::Lui),
            // OP-32, 64b, MADD, MSUB, NMSUB, NMADD, OP-FP, reserved, custom-2, 48b
            24 => Some(Self::Branch),
            25 => Some(Self::Jalr),
            // reserved
            27 => Some(Self::Jal),
            28 => Some(Self::System),
            _ => None,
        }
    }
}

fn opcode_group(raw_instruction: u32) -> Result<OpcodeGroup, DecodeError> {
    let tag = ((raw_instruction >> 2) & 0x1F) as u8;
    OpcodeGroup::from_tag(tag).ok_or(DecodeError::UnsupportedOpcode(tag))
}

/// Returns the 5-bit *rd* value for R-type, I-type, U-type, J-type instructions.
fn rd(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 7) & 0x1F) as u8)
}

/// Returns the 5-bit *rs1* value for R-type, I-type, S-type, B-type instructions.
fn rs1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 15) & 0x1F) as u8)
}

/// Returns the 5-bit *rs2* value for R-type, S-type, B-type instructions.
fn rs2(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 20) & 0x1F) as u8)
}

fn i_funct(raw_instruction: u32) -> Option<RegImmOp> {
    match funct3(raw_instruction) {
        0b000 => Some(RegImmOp::Addi),
        0b010 => Some(RegImmOp::Slti),
        0b011 => Some(RegImmOp::Sltiu),
        0b100 => Some(RegImmOp::Xori),
        0b110 => Some(RegImmOp::Ori),
        0b111 => Some(RegImmOp::Andi),
        _ => None,
    }
}

fn i_shfunct(raw_instruction: u32) -> Option<RegShiftImmOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b001) => Some(RegShiftImmOp::Slli),
        (0b0000000, 0b101) => Some(RegShiftImmOp::Srli),
        (0b0100000, 0b101) => Some(RegShiftImmOp::Srai),
        _ => None,
    }
}

fn i_width(raw_instruction: u32) -> Option<LoadWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(LoadWidth::Lb),
        0b001 => Some(LoadWidth::Lh),
        0b010 => Some(LoadWidth::Lw),
        0b100 => Some(LoadWidth::Lbu),
        0b101 => Some(LoadWidth::Lhu),
        _ => None,
    }
}

fn s_width(raw_instruction: u32) -> Option<StoreWidth> {
    match funct3(raw_instruction) {
        0b000 => Some(StoreWidth::Sb),
        0b001 => Some(StoreWidth::Sh),
        0b010 => Some(StoreWidth::Sw),
        _ => None,
    }
}

fn r_funct(raw_instruction: u32) -> Option<RegRegOp> {
    match (funct7(raw_instruction), funct3(raw_instruction)) {
        (0b0000000, 0b000) => Some(RegRegOp::Add),
        (0b0000000, 0b001) => Some(RegRegOp::Sll),
        (0b0000000, 0b010) => Some(RegRegOp::Slt),
        (0b0000000, 0b011) => Some(RegRegOp::Sltu),
        (0b0000000, 0b100) => Some(RegRegOp::Xor),
        (0b0000000, 0b101) => Some(RegRegOp::Srl),
        (0b0000000, 0b110) => Some(RegRegOp::Or),
        (0b0000000, 0b111) => Some(RegRegOp::And),
        (0b0000001, 0b000) => Some(RegRegOp::Mul),
        (0b0000001, 0b001) => Some(RegRegOp::Mulh),
        (0b0000001, 0b010) => Some(RegRegOp::Mulhsu),
        (0b0000001, 0b011) => Some(RegRegOp::Mulhu),
        (0b0000001, 0b100) => Some(RegRegOp::Div),
        (0b0000001, 0b101) => Some(RegRegOp::Divu),
        (0b0000001, 0b110) => Some(RegRegOp::Rem),
        (0b0000001, 0b111) => Some(RegRegOp::Remu),
        (0b0100000, 0b000) => Some(RegRegOp::Sub),
        (0b0100000, 0b101) => Some(RegRegOp::Sra),
        _ => None,
    }
}

fn b_funct(raw_instruction: u32) -> Option<BranchCondition> {
    match funct3(raw_instruction) {
        0b000 => Some(BranchCondition::Beq),
        0b001 => Some(BranchCondition::Bne),
        0b100 => Some(BranchCondition::Blt),
        0b101 => Some(BranchCondition::Bge),
        0b110 => Some(BranchCondition::Bltu),
        0b111 => Some(BranchCondition::Bgeu),
        _ => None,
    }
}

fn a_funct(raw_instruction: u32) -> Option<AmoOp> {
    if funct3(raw_instruction) != 0b010 {
        return None;
    }
    // The low two bits of funct7 are aq and rl.
    match funct7(raw_instruction) >> 2 {
        0b00010 => Some(AmoOp::Lr),
        0b00011 => Some(AmoOp::Sc),
        0b00001 => Some(AmoOp::Swap),
        0b00000 => Some(AmoOp::Add),
        0b00100 => Some(AmoOp::Xor),
        0b01100 => Some(AmoOp::And),
        0b01000 => Some(AmoOp::Or),
        0b10000 => Some(AmoOp::Min),
        0b10100 => Some(AmoOp::Max),
        0b11000 => Some(AmoOp::Minu),
        0b11100 => Some(AmoOp::Maxu),
        _ => None,
    }
}

fn i_sys(raw_instruction: u32) -> Option<Instruction> {
    let csr_op = |op| {
        Some(Instruction::Csr {
            op,
            dest: rd(raw_instruction),
            csr: csr(raw_instruction),
            operand: CsrOperand::Register(rs1(raw_instruction)),
        })
    };
    let csr_imm_op = |op| {
        Some(Instruction::Csr {
            op,
            dest: rd(raw_instruction),
            csr: csr(raw_instruction),
            operand: CsrOperand::Immediate(u32::from(rs1(raw_instruction))),
        })
    };
    match funct3(raw_instruction) {
        0b000 => match csr(raw_instruction) {
            0x000 => Some(Instruction::Scall),
            0x001 => Some(Instruction::Sbreak),
            0x100 => Some(Instruction::Eret),
            _ => None,
        },
        0b001 => csr_op(CsrOp::ReadWrite),
        0b010 => csr_op(CsrOp::ReadSet),
        0b011 => csr_op(CsrOp::ReadClear),
        0b101 => csr_imm_op(CsrOp::ReadWrite),
        0b110 => csr_imm_op(CsrOp::ReadSet),
        0b111 => csr_imm_op(CsrOp::ReadClear),
        _ => None,
    }
}

/// Returns the 3-bit *funct3* value for R-type, I-type, S-type, B-type instructions.
fn funct3(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 12) & 0b111) as u8
}

/// Returns the 7-bit *funct7* value for R-type instructions.
fn funct7(raw_instruction: u32) -> u8 {
    (raw_instruction >> 25) as u8
}

/// Returns the 12-bit *csr* value of SYSTEM instructions, which doubles as *funct12*.
fn csr(raw_instruction: u32) -> u16 {
    (raw_instruction >> 20) as u16
}

/// Returns the 5-bit *shamt* value for I-type shift instructions.
fn shamt(raw_instruction: u32) -> u32 {
    (raw_instruction >> 20) & 0x1F
}

/// Returns the 12-bit I-immediate sign-extended to 32 bits.
fn i_imm(raw_instruction: u32) -> i32 {
    raw_instruction as i32 >> 20
}

/// Returns the 12-bit S-immediate sign-extended to 32 bits.
fn s_imm(raw_instruction: u32) -> i32 {
    let imm_11_5 = raw_instruction & 0xFE00_0000;
    let imm_4_0 = raw_instruction & 0x0000_0F80;
    (imm_11_5 | (imm_4_0 << 13)) as i32 >> 20
}

/// Returns the 13-bit B-immediate sign-extended to 32 bits.
fn b_imm(raw_instruction: u32) -> i32 {
    let imm_12 = raw_instruction & 0x8000_0000;
    let imm_10_5 = raw_instruction & 0x7E00_0000;
    let imm_4_1 = raw_instruction & 0x0000_0F00;
    let imm_11 = raw_instruction & 0x0000_0080;
    (imm_12 | (imm_11 << 23) | (imm_10_5 >> 1) | (imm_4_1 << 12)) as i32 >> 19
}

/// Returns the U-immediate: bits [31:12] of the instruction with the low 12 bits zeroed.
fn u_imm(raw_instruction: u32) -> i32 {
    (raw_instruction & 0xFFFF_F000) as i32
}

/// Returns the 21-bit J-immediate sign-extended to 32 bits.
fn j_imm(raw_instruction: u32) -> i32 {
    let imm_20 = raw_instruction & 0x8000_0000;
    let imm_10_1 = raw_instruction & 0x7FE0_0000;
    let imm_11 = raw_instruction & 0x0010_0000;
    let imm_19_12 = raw_instruction & 0x000F_F000;
    (imm_20 | (imm_19_12 << 11) | (imm_11 << 2) | (imm_10_1 >> 9)) as i32 >> 11
}
