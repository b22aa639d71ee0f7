mod common;

use common::*;
use proptest::prelude::*;
use rv32_mcu_core::core::csr::{MCAUSE, MEPC};
use rv32_mcu_core::core::{Exception, ExecutionResult};

#[test]
fn return_jumps_to_link_register() {
    // jalr x0, 0(ra)
    let mut machine = machine_with_program(&[0x0000_8067]);
    machine.core_mut().set_register(1, 0x0000_0F00);
    machine.timestep();
    assert_eq!(0x0000_0F00, machine.core().pc());
    assert_eq!(0, machine.core().get_register(0));
}

#[test]
fn double_through_temporary() {
    let mut machine = machine_with_program(&[
        add(T0, A0, ZERO),
        add(T0, T0, T0),
        add(A0, T0, ZERO),
    ]);
    machine.core_mut().set_register(10, 21);
    run_steps(&mut machine, 3);
    assert_eq!(42, machine.core().get_register(10));
    assert_eq!(12, machine.core().pc());
}

/// `jal ra, fib; sbreak` followed by an iterative Fibonacci subroutine taking and returning its
/// value in `a0`.
fn fibonacci_program() -> Vec<u32> {
    vec![
        /* 0x00 */ jal(RA, 8),
        /* 0x04 */ sbreak(),
        // fib:
        /* 0x08 */ addi(T0, ZERO, 0),
        /* 0x0C */ addi(T1, ZERO, 1),
        // loop:
        /* 0x10 */ beq(A0, ZERO, 0x18),
        /* 0x14 */ add(T2, T0, T1),
        /* 0x18 */ addi(T0, T1, 0),
        /* 0x1C */ addi(T1, T2, 0),
        /* 0x20 */ addi(A0, A0, -1),
        /* 0x24 */ jal(ZERO, -0x14),
        // done:
        /* 0x28 */ addi(A0, T0, 0),
        /* 0x2C */ jalr(ZERO, RA, 0),
    ]
}

#[test]
fn fibonacci_subroutine() {
    let mut machine = machine_with_program(&fibonacci_program());
    machine.core_mut().set_register(10, 15);
    let steps = machine.run(1_000, |_, result| {
        result == ExecutionResult::Exception(Exception::Breakpoint)
    });
    assert!(steps < 1_000, "program did not reach sbreak");
    assert_eq!(610, machine.core().get_register(10));
    assert_eq!(Ok(3), machine.core().read_csr(MCAUSE));
    assert_eq!(Ok(0x04), machine.core().read_csr(MEPC));
}

#[test]
fn store_and_load_round_trip_through_ram() {
    let mut machine = machine_with_program(&[
        addi(A1, ZERO, DATA as i32),
        addi(A0, ZERO, -5),
        sw(A0, A1, 8),
        lw(A2, A1, 8),
    ]);
    run_steps(&mut machine, 4);
    assert_eq!(0xFFFF_FFFB, machine.core().get_register(12));
    assert_eq!(0xFFFF_FFFB, read_word(&mut machine, DATA + 8));
}

#[test]
fn byte_copy_loop() {
    let mut machine = machine_with_program(&[
        /* 0x00 */ lbu(T0, A0, 0),
        /* 0x04 */ sb(T0, A1, 0),
        /* 0x08 */ addi(A0, A0, 1),
        /* 0x0C */ addi(A1, A1, 1),
        /* 0x10 */ addi(A2, A2, -1),
        /* 0x14 */ bne(A2, ZERO, -0x14),
    ]);
    load(&mut machine, DATA, &[0x8081_F0FF]);
    machine.core_mut().set_register(10, DATA);
    machine.core_mut().set_register(11, DATA + 0x11);
    machine.core_mut().set_register(12, 4);
    run_steps(&mut machine, 24);
    assert_eq!(0x18, machine.core().pc());
    assert_eq!(0x81F0_FF00, read_word(&mut machine, DATA + 0x10));
    assert_eq!(0x0000_0080, read_word(&mut machine, DATA + 0x14));
}

#[test]
fn halfword_store_through_program() {
    let mut machine = machine_with_program(&[sh(A0, A1, 2), sb(A0, A1, 1), lw(A2, A1, 0)]);
    machine.core_mut().set_register(10, 0x1234_CCDD);
    machine.core_mut().set_register(11, DATA);
    run_steps(&mut machine, 3);
    assert_eq!(0xCCDD_DD00, machine.core().get_register(12));
}

#[test]
fn high_multiplications_follow_isa() {
    let mut machine = machine_with_program(&[mulhsu(A2, A0, A1), mulhu(A3, A0, A1)]);
    machine.core_mut().set_register(10, (-2_i32) as u32);
    machine.core_mut().set_register(11, 3);
    run_steps(&mut machine, 2);
    // -2 * 3 = -6, whose upper word is all ones
    assert_eq!(0xFFFF_FFFF, machine.core().get_register(12));
    // 0xFFFF_FFFE * 3 = 0x2_FFFF_FFFA
    assert_eq!(0x0000_0002, machine.core().get_register(13));
}

#[test]
fn unmapped_memory_reads_zero() {
    let mut machine = machine_with_program(&[
        addi(A1, ZERO, -4),
        addi(A0, ZERO, 9),
        sw(A0, A1, 0),
        lw(A0, A1, 0),
    ]);
    run_steps(&mut machine, 4);
    assert_eq!(0, machine.core().get_register(10));
    assert_eq!(16, machine.core().pc());
}

proptest! {
    #[test]
    fn add_wraps(a in any::<u32>(), b in any::<u32>()) {
        let mut machine = machine_with_program(&[add(A2, A0, A1), add(ZERO, A0, A1)]);
        machine.core_mut().set_register(10, a);
        machine.core_mut().set_register(11, b);
        run_steps(&mut machine, 2);
        prop_assert_eq!(a.wrapping_add(b), machine.core().get_register(12));
        prop_assert_eq!(0, machine.core().get_register(0));
    }
}
