mod common;

use common::*;
use hithlum::config::{ABORT_STATUS, ALARM_TICKS, KERNEL_CS, USER_STACK_TOP};
use hithlum::task::{Signal, TaskStatus, SIGRETURN_TRAMPOLINE};
use hithlum::trap::TRAP_FRAME_SIZE;

const HANDLER: u32 = SHELL_ENTRY + 0x400;

fn set_handler(m: &mut Machine, signal: Signal, handler: u32) -> u32 {
    m.syscall(SYS_SET_HANDLER, [u32::from(signal), handler, 0])
}

/// 在当前任务上制造一次除零异常，返回异常发生时的帧
fn divide_by_zero(m: &mut Machine) -> hithlum::TrapFrame {
    m.frame.vector = 0;
    let faulting = m.frame;
    m.trap(0);
    faulting
}

#[test]
fn handler_runs_once_and_sigreturn_restores_registers() {
    let mut m = Machine::boot();
    assert_eq!(set_handler(&mut m, Signal::DivZero, HANDLER), 0);
    m.frame.ebx = 0xB0B0;
    m.frame.esi = 0x5151;
    m.frame.ebp = 0x0BB0;
    m.frame.eip = SHELL_ENTRY + 0x80;
    let old_esp = m.frame.esp;
    let faulting = divide_by_zero(&mut m);

    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eip, HANDLER);
    let trampoline = old_esp - 8;
    let saved = trampoline - TRAP_FRAME_SIZE as u32;
    assert_eq!(m.frame.esp, saved - 8);
    assert_eq!(m.peek_u32(m.frame.esp), trampoline);
    assert_eq!(m.peek_u32(m.frame.esp + 4), u32::from(Signal::DivZero));
    assert_eq!(m.peek(trampoline, 8), SIGRETURN_TRAMPOLINE.to_vec());
    assert!(m.kernel.task(1).unwrap().signals.in_handler);

    // 处理程序返回到 trampoline，执行 SIGRETURN
    m.frame.esp += 4;
    m.frame.eip = trampoline;
    m.frame.ebx = 0xDEAD;
    m.syscall(SYS_SIGRETURN, [0, 0, 0]);
    assert_eq!(m.frame, faulting);
    assert!(!m.kernel.task(1).unwrap().signals.in_handler);
}

#[test]
fn default_action_kills_with_abort_status() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    assert_eq!(m.slot(), 4);
    m.trap(13);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
    assert_eq!(m.kernel.status(4), TaskStatus::Empty);
}

#[test]
fn divide_error_kills_by_default() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    divide_by_zero(&mut m);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
}

#[test]
fn interrupt_reaches_foreground_on_its_next_run() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    m.kernel.interrupt_foreground();
    assert_eq!(m.kernel.status(4), TaskStatus::Running);
    m.tick();
    m.tick();
    assert_eq!(m.slot(), 3);
    m.tick();
    // 4 号任务恢复时被终止，控制回到 shell
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
    assert_eq!(m.kernel.status(4), TaskStatus::Empty);
}

#[test]
fn alarm_is_ignored_without_handler() {
    let mut m = Machine::boot();
    for _ in 0..ALARM_TICKS + 3 {
        m.tick();
    }
    for shell in 1..=3 {
        assert_eq!(m.kernel.status(shell), TaskStatus::Running);
    }
}

#[test]
fn alarm_broadcast_enters_registered_handler() {
    let mut m = Machine::boot();
    set_handler(&mut m, Signal::Alarm, HANDLER);
    let mut entered = false;
    for _ in 0..ALARM_TICKS + 3 {
        m.tick();
        if m.slot() == 1 && m.frame.eip == HANDLER {
            entered = true;
            break;
        }
    }
    assert!(entered);
    assert!(m.kernel.ticks() >= ALARM_TICKS as u64);
    assert_eq!(m.peek_u32(m.frame.esp + 4), u32::from(Signal::Alarm));
}

#[test]
fn handlers_do_not_nest() {
    let mut m = Machine::boot();
    set_handler(&mut m, Signal::DivZero, HANDLER);
    set_handler(&mut m, Signal::User1, HANDLER + 0x100);
    divide_by_zero(&mut m);
    assert_eq!(m.frame.eip, HANDLER);
    let handler_esp = m.frame.esp;

    m.kernel.raise_signal(1, Signal::User1);
    m.run_until(2);
    m.run_until(1);
    // 仍在第一个处理程序中
    assert_eq!(m.frame.eip, HANDLER);
    assert_eq!(m.frame.esp, handler_esp);

    m.frame.esp += 4;
    m.syscall(SYS_SIGRETURN, [0, 0, 0]);
    m.run_until(2);
    m.run_until(1);
    assert_eq!(m.frame.eip, HANDLER + 0x100);
    assert_eq!(m.peek_u32(m.frame.esp + 4), u32::from(Signal::User1));
}

#[test]
fn fault_inside_handler_kills_the_task() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    set_handler(&mut m, Signal::DivZero, HANDLER);
    divide_by_zero(&mut m);
    assert_eq!(m.slot(), 4);
    assert_eq!(m.frame.eip, HANDLER);

    divide_by_zero(&mut m);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
    assert_eq!(m.kernel.status(4), TaskStatus::Empty);
}

#[test]
fn segfault_in_user_handler_is_not_deferred() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    set_handler(&mut m, Signal::User1, HANDLER);
    m.kernel.raise_signal(4, Signal::User1);
    m.tick();
    m.run_until(4);
    assert_eq!(m.frame.eip, HANDLER);

    m.trap(14);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
    assert_eq!(m.kernel.status(4), TaskStatus::Empty);
}

#[test]
fn clearing_a_handler_restores_default() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    set_handler(&mut m, Signal::Segfault, HANDLER);
    assert_eq!(set_handler(&mut m, Signal::Segfault, 0), 0);
    m.trap(14);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
}

#[test]
fn invalid_signal_numbers_are_rejected() {
    let mut m = Machine::boot();
    assert_eq!(m.syscall(SYS_SET_HANDLER, [5, HANDLER, 0]), FAILED);
    assert_eq!(m.syscall(SYS_SET_HANDLER, [u32::MAX, HANDLER, 0]), FAILED);
}

#[test]
fn sigreturn_outside_handler_fails() {
    let mut m = Machine::boot();
    assert_eq!(m.syscall(SYS_SIGRETURN, [0, 0, 0]), FAILED);
    assert_eq!(m.slot(), 1);
}

#[test]
fn forged_kernel_context_is_a_segfault() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    set_handler(&mut m, Signal::DivZero, HANDLER);
    let old_esp = m.frame.esp;
    divide_by_zero(&mut m);

    // 把保存的 cs 改为内核代码段
    let saved = old_esp - 8 - TRAP_FRAME_SIZE as u32;
    m.poke(saved + 13 * 4, &KERNEL_CS.to_le_bytes());
    m.frame.esp += 4;
    m.syscall(SYS_SIGRETURN, [0, 0, 0]);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
    assert_eq!(m.kernel.status(4), TaskStatus::Empty);
}

#[test]
fn unusable_user_stack_aborts_the_task() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    set_handler(&mut m, Signal::DivZero, HANDLER);
    m.frame.esp = 0x0900_0000;
    divide_by_zero(&mut m);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, ABORT_STATUS);
}

#[test]
fn signal_frame_fits_below_initial_stack() {
    let mut m = Machine::boot();
    set_handler(&mut m, Signal::User1, HANDLER);
    m.kernel.raise_signal(1, Signal::User1);
    m.run_until(2);
    m.run_until(1);
    assert_eq!(
        m.frame.esp,
        USER_STACK_TOP as u32 - 8 - TRAP_FRAME_SIZE as u32 - 8
    );
}

#[test]
#[should_panic(expected = "machine halted")]
fn fault_before_boot_halts_the_machine() {
    let mut m = Machine::new();
    m.trap(13);
}
