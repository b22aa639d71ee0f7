use crate::arena::PeripheralArena;
use crate::core::{Core, Exception, ExecutionResult};
use crate::instruction::CsrOperand;
use crate::registers::{Registers, Specifier};
use log::trace;

/// Performs the operation of single decoded instructions on a [`Core`].
///
/// None of the methods advance `pc` themselves: `next_pc` is reset to `pc + 4` before execution,
/// and control transfer instructions only redirect `next_pc`.
#[derive(Debug)]
pub(super) struct Executor<'a, 'c> {
    pub arena: &'a mut PeripheralArena,
    pub core: &'c mut Core,
}

impl<'a, 'c> Executor<'a, 'c> {
    /// `dest = src + immediate`, wrapping on overflow. `addi rd, rs, 0` doubles as `mv`.
    pub fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s.wrapping_add_signed(imm))
    }

    /// Writes `1` to `dest` if `src < immediate` as signed integers, `0` otherwise.
    pub fn slti(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| ((s as i32) < imm) as u32)
    }

    /// Unsigned variant of [`slti`](Self::slti). The immediate is sign-extended before being
    /// reinterpreted, so `sltiu rd, rs, 1` tests for zero.
    pub fn sltiu(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| (s < (imm as u32)) as u32)
    }

    pub fn andi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s & (imm as u32))
    }

    pub fn ori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s | (imm as u32))
    }

    /// `xori rd, rs, -1` is bitwise `not`.
    pub fn xori(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        self.reg_imm_op(dest, src, immediate, |s, imm| s ^ (imm as u32))
    }

    /// # Panics
    ///
    /// Panics if `shift_amount_u5` is larger than 31.
    pub fn slli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s << shamt)
    }

    /// # Panics
    ///
    /// Panics if `shift_amount_u5` is larger than 31.
    pub fn srli(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| s >> shamt)
    }

    /// Arithmetic right shift: the sign bit of `src` fills the vacated upper bits.
    ///
    /// # Panics
    ///
    /// Panics if `shift_amount_u5` is larger than 31.
    pub fn srai(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        self.reg_shamt_op(dest, src, shift_amount_u5, |s, shamt| {
            ((s as i32) >> shamt) as u32
        })
    }

    /// Loads the upper 20 bits of `immediate` into `dest`. The low 12 bits are cleared.
    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        self.core.registers.set_x(dest, immediate as u32 & !0xFFF);
        ExecutionResult::Ok
    }

    /// Adds the upper 20 bits of `immediate` to the address of this instruction.
    pub fn auipc(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        let registers = &mut self.core.registers;
        let result = registers.pc().wrapping_add_signed(immediate & !0xFFF);
        registers.set_x(dest, result);
        ExecutionResult::Ok
    }

    pub fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    pub fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    pub fn slt(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) < (s2 as i32)) as u32
        })
    }

    pub fn sltu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| (s1 < s2) as u32)
    }

    pub fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    pub fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    pub fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    /// Register shifts only use the low 5 bits of `src2`.
    pub fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 << (s2 & 0x1F))
    }

    pub fn srl(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 >> (s2 & 0x1F))
    }

    pub fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) >> (s2 & 0x1F)) as u32
        })
    }

    /// Executes a `mul` instruction.
    ///
    /// > MUL performs an XLEN-bit×XLEN-bit multiplication of rs1 by rs2 and places the lower XLEN
    /// > bits in the destination register.
    pub fn mul(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_mul(s2))
    }

    /// Executes a `mulh` instruction.
    ///
    /// > MULH, MULHU, and MULHSU perform the same multiplication but return the upper XLEN bits of
    /// > the full 2×XLEN-bit product, for signed×signed, unsigned×unsigned, and signed rs1×unsigned
    /// > rs2 multiplication, respectively.
    pub fn mulh(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64 * s2 as i32 as i64) >> 32) as u32
        })
    }

    pub fn mulhsu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32 as i64 * s2 as i64) >> 32) as u32
        })
    }

    pub fn mulhu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as u64 * s2 as u64) >> 32) as u32
        })
    }

    /// Executes a `div` instruction.
    ///
    /// > The quotient of division by zero has all bits set, and the remainder of division by zero
    /// > equals the dividend. Signed division overflow occurs only when the most-negative integer
    /// > is divided by -1. The quotient of a signed division with overflow is equal to the
    /// > dividend, and the remainder is zero.
    pub fn div(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => u32::MAX,
            _ => (s1 as i32).wrapping_div(s2 as i32) as u32,
        })
    }

    pub fn divu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.checked_div(s2).unwrap_or(u32::MAX))
    }

    pub fn rem(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| match s2 {
            0 => s1,
            _ => (s1 as i32).wrapping_rem(s2 as i32) as u32,
        })
    }

    pub fn remu(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.checked_rem(s2).unwrap_or(s1))
    }

    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| registers.pc().wrapping_add_signed(offset))
    }

    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.jump_op(dest, |registers| {
            registers.x(base).wrapping_add_signed(offset) & !1
        })
    }

    pub fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 == s2)
    }

    pub fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 != s2)
    }

    pub fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) < (s2 as i32))
    }

    pub fn bltu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 < s2)
    }

    pub fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| (s1 as i32) >= (s2 as i32))
    }

    pub fn bgeu(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.cond_branch(src1, src2, offset, |s1, s2| s1 >= s2)
    }

    pub fn lb(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |this, address| {
            this.core.system_bus.load_byte(this.arena, address) as i8 as u32
        })
    }

    pub fn lbu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |this, address| {
            this.core.system_bus.load_byte(this.arena, address) as u32
        })
    }

    pub fn lh(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |this, address| {
            this.core.system_bus.load_halfword(this.arena, address) as i16 as u32
        })
    }

    pub fn lhu(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |this, address| {
            this.core.system_bus.load_halfword(this.arena, address) as u32
        })
    }

    pub fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.load_op(dest, base, offset, |this, address| {
            this.core.system_bus.load_word(this.arena, address)
        })
    }

    pub fn sb(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |this, address, value| {
            this.core
                .system_bus
                .store_byte(this.arena, address, value as u8)
        })
    }

    pub fn sh(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |this, address, value| {
            this.core
                .system_bus
                .store_halfword(this.arena, address, value as u16)
        })
    }

    pub fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        self.store_op(src, base, offset, |this, address, value| {
            this.core.system_bus.store_word(this.arena, address, value)
        })
    }

    /// Executes a `lr.w` instruction.
    ///
    /// > LR.W loads a word from the address in rs1, places the sign-extended value in rd, and
    /// > registers a reservation set.
    pub fn lr(&mut self, dest: Specifier, address: Specifier) -> ExecutionResult {
        let address = self.core.registers.x(address);
        let value = self.core.system_bus.load_word(self.arena, address);
        self.core.registers.set_x(dest, value);
        self.core.system_bus.set_reservation(address);
        ExecutionResult::Ok
    }

    /// Executes a `sc.w` instruction.
    ///
    /// The store only happens if the addressed word is still reserved, which also consumes the
    /// reservation. On failure `dest` is set to `1`; on success `dest` is left untouched.
    pub fn sc(&mut self, dest: Specifier, address: Specifier, src: Specifier) -> ExecutionResult {
        let address = self.core.registers.x(address);
        if self.core.system_bus.is_reserved(address) {
            let value = self.core.registers.x(src);
            self.core.system_bus.store_word(self.arena, address, value);
        } else {
            self.core.registers.set_x(dest, 1);
        }
        ExecutionResult::Ok
    }

    pub fn amoswap(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |_, s| s)
    }

    pub fn amoadd(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m.wrapping_add(s))
    }

    pub fn amoxor(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m ^ s)
    }

    pub fn amoand(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m & s)
    }

    pub fn amoor(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m | s)
    }

    pub fn amomin(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| (m as i32).min(s as i32) as u32)
    }

    pub fn amomax(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| (m as i32).max(s as i32) as u32)
    }

    pub fn amominu(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m.min(s))
    }

    pub fn amomaxu(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        self.amo_op(dest, address, src, |m, s| m.max(s))
    }

    pub fn fence(&mut self) -> ExecutionResult {
        // Memory accesses complete immediately and in order, so this is a nop.
        ExecutionResult::Ok
    }

    pub fn fence_i(&mut self) -> ExecutionResult {
        // Instructions are always fetched straight from the bus, so this is a nop.
        ExecutionResult::Ok
    }

    pub fn scall(&mut self) -> ExecutionResult {
        ExecutionResult::Exception(Exception::EnvironmentCall)
    }

    pub fn sbreak(&mut self) -> ExecutionResult {
        ExecutionResult::Exception(Exception::Breakpoint)
    }

    /// Executes an `eret` instruction, returning from the current trap handler.
    pub fn eret(&mut self) -> ExecutionResult {
        let mepc = self.core.cs_registers.return_from_trap();
        trace!("Returning from trap to {mepc:#010x}");
        self.core.registers.set_next_pc(mepc);
        self.core.system_bus.clear_all_reservations();
        ExecutionResult::Ok
    }

    /// Executes a `csrrw` or `csrrwi` instruction.
    pub fn csrrw(&mut self, dest: Specifier, csr: u16, operand: CsrOperand) -> ExecutionResult {
        self.csr_op(dest, csr, operand, |_, value| Some(value))
    }

    /// Executes a `csrrs` or `csrrsi` instruction.
    ///
    /// The CSR is not written if the operand field is zero, so read-only CSRs can be read with it.
    pub fn csrrs(&mut self, dest: Specifier, csr: u16, operand: CsrOperand) -> ExecutionResult {
        let write = !operand.is_zero_field();
        self.csr_op(dest, csr, operand, |old, value| write.then_some(old | value))
    }

    /// Executes a `csrrc` or `csrrci` instruction.
    ///
    /// The CSR is not written if the operand field is zero, so read-only CSRs can be read with it.
    pub fn csrrc(&mut self, dest: Specifier, csr: u16, operand: CsrOperand) -> ExecutionResult {
        let write = !operand.is_zero_field();
        self.csr_op(dest, csr, operand, |old, value| write.then_some(old & !value))
    }

    #[inline]
    fn reg_imm_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, i32) -> u32,
    {
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src), immediate));
        ExecutionResult::Ok
    }

    #[inline]
    fn reg_shamt_op<F>(
        &mut self,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        if shift_amount_u5 > 31 {
            panic!("out of range u5 used");
        }
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src), shift_amount_u5));
        ExecutionResult::Ok
    }

    #[inline]
    fn reg_reg_op<F>(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let registers = &mut self.core.registers;
        registers.set_x(dest, op(registers.x(src1), registers.x(src2)));
        ExecutionResult::Ok
    }

    fn jump_op<F>(&mut self, dest: Specifier, compute_target: F) -> ExecutionResult
    where
        F: FnOnce(&Registers) -> u32,
    {
        let registers = &mut self.core.registers;
        // Compute the target before `dest` is written, as it may be the base register.
        let target = compute_target(registers);
        let link = registers.pc().wrapping_add(4);
        registers.set_next_pc(target);
        registers.set_x(dest, link);
        ExecutionResult::Ok
    }

    // Takes the branch if `predicate` returns `true`.
    fn cond_branch<P>(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        predicate: P,
    ) -> ExecutionResult
    where
        P: FnOnce(u32, u32) -> bool,
    {
        let registers = &mut self.core.registers;
        if predicate(registers.x(src1), registers.x(src2)) {
            let target = registers.pc().wrapping_add_signed(offset);
            registers.set_next_pc(target);
        }
        ExecutionResult::Ok
    }

    #[inline]
    fn load_op<F>(
        &mut self,
        dest: Specifier,
        base: Specifier,
        offset: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(&mut Self, u32) -> u32,
    {
        let address = self.core.registers.x(base).wrapping_add_signed(offset);
        let value = op(self, address);
        self.core.registers.set_x(dest, value);
        ExecutionResult::Ok
    }

    #[inline]
    fn store_op<F>(
        &mut self,
        src: Specifier,
        base: Specifier,
        offset: i32,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(&mut Self, u32, u32),
    {
        let registers = &self.core.registers;
        let address = registers.x(base).wrapping_add_signed(offset);
        let value = registers.x(src);
        op(self, address, value);
        ExecutionResult::Ok
    }

    /// Read-modify-write of the addressed word, writing the old value to `dest`.
    ///
    /// `src` is read before `dest` is written.
    fn amo_op<F>(
        &mut self,
        dest: Specifier,
        address: Specifier,
        src: Specifier,
        op: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> u32,
    {
        let address = self.core.registers.x(address);
        let operand = self.core.registers.x(src);
        let old = self.core.system_bus.load_word(self.arena, address);
        self.core.registers.set_x(dest, old);
        self.core
            .system_bus
            .store_word(self.arena, address, op(old, operand));
        ExecutionResult::Ok
    }

    /// Read the CSR, then write back what `compute` returns (if anything), then write the old
    /// value to `dest`. If either CSR access fails, `dest` is left untouched.
    fn csr_op<F>(
        &mut self,
        dest: Specifier,
        csr: u16,
        operand: CsrOperand,
        compute: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32, u32) -> Option<u32>,
    {
        let value = match operand {
            CsrOperand::Register(src) => self.core.registers.x(src),
            CsrOperand::Immediate(uimm) => uimm,
        };
        let old = match self.core.cs_registers.read(csr) {
            Ok(old) => old,
            Err(err) => {
                trace!("Illegal CSR access: {err}");
                return ExecutionResult::Exception(Exception::IllegalInstruction);
            }
        };
        if let Some(new) = compute(old, value) {
            if let Err(err) = self.core.cs_registers.write(csr, new) {
                trace!("Illegal CSR access: {err}");
                return ExecutionResult::Exception(Exception::IllegalInstruction);
            }
        }
        self.core.registers.set_x(dest, old);
        ExecutionResult::Ok
    }
}
