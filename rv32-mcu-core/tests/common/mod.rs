//! Instruction encoders and machine setup shared by the integration tests.
#![allow(dead_code)]

use rv32_mcu_core::core::Config;
use rv32_mcu_core::resources::ram::Ram;
use rv32_mcu_core::Machine;

pub const ZERO: u32 = 0;
pub const RA: u32 = 1;
pub const T0: u32 = 5;
pub const T1: u32 = 6;
pub const T2: u32 = 7;
pub const A0: u32 = 10;
pub const A1: u32 = 11;
pub const A2: u32 = 12;
pub const A3: u32 = 13;

/// Start of the data area in the test machine's RAM. Fits in a positive 12-bit immediate.
pub const DATA: u32 = 0x400;

/// A machine with 4 pages of RAM at address 0, holding `program` at the reset vector 0.
pub fn machine_with_program(program: &[u32]) -> Machine {
    let mut machine = Machine::new(Config::default());
    machine.attach(Ram::new(4), 0).unwrap();
    load(&mut machine, 0, program);
    machine
}

/// Store `words` at consecutive word addresses starting at `address`.
pub fn load(machine: &mut Machine, address: u32, words: &[u32]) {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    machine.load_physical(address, &bytes);
}

pub fn read_word(machine: &mut Machine, address: u32) -> u32 {
    let bytes = machine.read_physical(address, 4);
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn run_steps(machine: &mut Machine, steps: u64) {
    for _ in 0..steps {
        machine.timestep();
    }
}

pub fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    ((imm as u32) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = imm as u32;
    ((imm >> 5) << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | ((imm & 0x1F) << 7) | 0x23
}

pub fn b_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
    let imm = imm as u32;
    (((imm >> 12) & 1) << 31)
        | (((imm >> 5) & 0x3F) << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (funct3 << 12)
        | (((imm >> 1) & 0xF) << 8)
        | (((imm >> 11) & 1) << 7)
        | 0x63
}

pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    i_type(imm, rs1, 0b000, rd, 0x13)
}

pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(0, rs2, rs1, 0b000, rd, 0x33)
}

pub fn mulhsu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(1, rs2, rs1, 0b010, rd, 0x33)
}

pub fn mulhu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    r_type(1, rs2, rs1, 0b011, rd, 0x33)
}

pub fn beq(rs1: u32, rs2: u32, offset: i32) -> u32 {
    b_type(offset, rs2, rs1, 0b000)
}

pub fn bne(rs1: u32, rs2: u32, offset: i32) -> u32 {
    b_type(offset, rs2, rs1, 0b001)
}

pub fn jal(rd: u32, offset: i32) -> u32 {
    let imm = offset as u32;
    (((imm >> 20) & 1) << 31)
        | (((imm >> 1) & 0x3FF) << 21)
        | (((imm >> 11) & 1) << 20)
        | (((imm >> 12) & 0xFF) << 12)
        | (rd << 7)
        | 0x6F
}

pub fn jalr(rd: u32, rs1: u32, offset: i32) -> u32 {
    i_type(offset, rs1, 0b000, rd, 0x67)
}

pub fn lw(rd: u32, rs1: u32, offset: i32) -> u32 {
    i_type(offset, rs1, 0b010, rd, 0x03)
}

pub fn lbu(rd: u32, rs1: u32, offset: i32) -> u32 {
    i_type(offset, rs1, 0b100, rd, 0x03)
}

pub fn sb(rs2: u32, rs1: u32, offset: i32) -> u32 {
    s_type(offset, rs2, rs1, 0b000)
}

pub fn sh(rs2: u32, rs1: u32, offset: i32) -> u32 {
    s_type(offset, rs2, rs1, 0b001)
}

pub fn sw(rs2: u32, rs1: u32, offset: i32) -> u32 {
    s_type(offset, rs2, rs1, 0b010)
}

/// Word-sized AMO with the given 5-bit function, aq = rl = 0.
pub fn amo(funct5: u32, rd: u32, rs2: u32, rs1: u32) -> u32 {
    r_type(funct5 << 2, rs2, rs1, 0b010, rd, 0x2F)
}

pub fn lr_w(rd: u32, rs1: u32) -> u32 {
    amo(0b00010, rd, 0, rs1)
}

pub fn sc_w(rd: u32, rs2: u32, rs1: u32) -> u32 {
    amo(0b00011, rd, rs2, rs1)
}

pub fn csrrw(rd: u32, csr: u32, rs1: u32) -> u32 {
    i_type(csr as i32, rs1, 0b001, rd, 0x73)
}

pub fn csrrs(rd: u32, csr: u32, rs1: u32) -> u32 {
    i_type(csr as i32, rs1, 0b010, rd, 0x73)
}

pub fn csrrsi(rd: u32, csr: u32, uimm: u32) -> u32 {
    i_type(csr as i32, uimm, 0b110, rd, 0x73)
}

pub fn scall() -> u32 {
    0x0000_0073
}

pub fn sbreak() -> u32 {
    0x0010_0073
}

pub fn eret() -> u32 {
    0x1000_0073
}
