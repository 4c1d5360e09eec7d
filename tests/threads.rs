mod common;

use common::*;
use hithlum::config::{task_frame, PROGRAM_IMAGE, THREAD_STACK_BASE, THREAD_STACK_TOP};
use hithlum::task::{TaskStatus, THREAD_EXIT_TRAMPOLINE};

const WORKER: u32 = SHELL_ENTRY + 0x200;

fn spawn_thread(m: &mut Machine) -> usize {
    assert_eq!(m.syscall(SYS_THREAD_CREATE, [SCRATCH, WORKER, 0]), 0);
    m.peek_u32(SCRATCH) as usize
}

#[test]
fn thread_shares_image_and_gets_private_stack() {
    let mut m = Machine::boot();
    let tid = spawn_thread(&mut m);
    assert_eq!(tid, 4);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.kernel.status(tid), TaskStatus::Running);

    let thread = m.kernel.task(tid).unwrap();
    assert_eq!(thread.thread_of, Some(1));
    assert_eq!(thread.terminal, 0);
    assert!(m.kernel.task(1).unwrap().threads.contains(tid));

    assert_eq!(
        m.kernel.translate_user(tid, PROGRAM_IMAGE),
        m.kernel.translate_user(1, PROGRAM_IMAGE)
    );
    assert_eq!(
        m.kernel.translate_user(tid, THREAD_STACK_BASE),
        Some(task_frame(tid))
    );
    assert_eq!(m.kernel.translate_user(1, THREAD_STACK_BASE), None);

    // 栈顶：退出 trampoline 及指向它的返回地址
    let trampoline = THREAD_STACK_TOP as u32 - THREAD_EXIT_TRAMPOLINE.len() as u32;
    let context = thread.context;
    assert_eq!(context.eip, WORKER);
    assert_eq!(context.esp, trampoline - 4);
    assert_eq!(m.peek_in(tid, trampoline - 4, 4), trampoline.to_le_bytes().to_vec());
    assert_eq!(
        m.peek_in(tid, trampoline, THREAD_EXIT_TRAMPOLINE.len()),
        THREAD_EXIT_TRAMPOLINE.to_vec()
    );
}

#[test]
fn join_blocks_until_thread_halts() {
    let mut m = Machine::boot();
    let tid = spawn_thread(&mut m);
    m.syscall(SYS_THREAD_JOIN, [tid as u32, 0, 0]);
    assert_eq!(m.kernel.status(1), TaskStatus::WaitingForThread);
    assert_ne!(m.slot(), 1);

    m.run_until(tid);
    assert_eq!(m.frame.eip, WORKER);
    // 线程函数返回 7，trampoline 以此调用 HALT
    m.syscall(SYS_HALT, [7, 0, 0]);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, 7);
    assert_eq!(m.kernel.status(1), TaskStatus::Running);
    assert_eq!(m.kernel.status(tid), TaskStatus::Empty);
    assert!(!m.kernel.task(1).unwrap().threads.contains(tid));
}

#[test]
fn waiting_owner_is_not_scheduled() {
    let mut m = Machine::boot();
    let tid = spawn_thread(&mut m);
    m.syscall(SYS_THREAD_JOIN, [tid as u32, 0, 0]);
    for _ in 0..8 {
        m.tick();
        assert_ne!(m.slot(), 1);
    }
}

#[test]
fn unjoined_thread_parks_as_zombie() {
    let mut m = Machine::boot();
    let tid = spawn_thread(&mut m);
    m.run_until(tid);
    m.syscall(SYS_HALT, [9, 0, 0]);
    assert_eq!(m.kernel.status(tid), TaskStatus::Zombie);
    assert_ne!(m.slot(), tid);

    // ZOMBIE 不再被调度
    for _ in 0..6 {
        m.tick();
        assert_ne!(m.slot(), tid);
    }

    m.run_until(1);
    assert_eq!(m.syscall(SYS_THREAD_JOIN, [tid as u32, 0, 0]), 9);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.kernel.status(tid), TaskStatus::Empty);
    assert_eq!(m.kernel.translate_user(tid, PROGRAM_IMAGE), None);
}

#[test]
fn process_halt_reclaims_its_threads() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    assert_eq!(m.slot(), 4);
    let first = spawn_thread(&mut m);
    let second = spawn_thread(&mut m);
    assert_eq!((first, second), (5, 6));
    assert_eq!(
        m.kernel.translate_user(second, THREAD_STACK_BASE),
        Some(task_frame(second))
    );

    m.syscall(SYS_HALT, [3, 0, 0]);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, 3);
    for slot in [4, first, second] {
        assert_eq!(m.kernel.status(slot), TaskStatus::Empty);
    }
}

#[test]
fn process_halt_reclaims_programs_started_by_its_threads() {
    let mut m = Machine::boot();
    m.execute(b"prog");
    let tid = spawn_thread(&mut m);
    m.run_until(tid);
    m.execute(b"prog");
    assert_eq!(m.slot(), 6);
    assert_eq!(m.kernel.task(6).unwrap().parent, tid);
    assert_eq!(m.kernel.foreground(0), Some(6));

    m.run_until(4);
    m.syscall(SYS_HALT, [2, 0, 0]);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, 2);
    for slot in [4, tid, 6] {
        assert_eq!(m.kernel.status(slot), TaskStatus::Empty);
    }
    assert_eq!(m.kernel.foreground(0), Some(1));

    // 终端 0 上只剩原来的 shell
    for _ in 0..8 {
        m.tick();
        assert!(m.slot() <= 3);
    }
}

#[test]
fn thread_joining_requires_own_thread() {
    let mut m = Machine::boot();
    assert_eq!(m.syscall(SYS_THREAD_JOIN, [2, 0, 0]), FAILED);
    assert_eq!(m.syscall(SYS_THREAD_JOIN, [1, 0, 0]), FAILED);
    assert_eq!(m.syscall(SYS_THREAD_JOIN, [8, 0, 0]), FAILED);
    assert_eq!(m.syscall(SYS_THREAD_JOIN, [99, 0, 0]), FAILED);

    let tid = spawn_thread(&mut m);
    m.run_until(2);
    assert_eq!(m.syscall(SYS_THREAD_JOIN, [tid as u32, 0, 0]), FAILED);
}

#[test]
fn thread_create_needs_a_free_slot_and_valid_out_pointer() {
    let mut m = Machine::boot();
    assert_eq!(m.syscall(SYS_THREAD_CREATE, [0, WORKER, 0]), FAILED);
    assert_eq!(m.kernel.status(4), TaskStatus::Empty);
    for _ in 4..10 {
        spawn_thread(&mut m);
    }
    assert_eq!(m.syscall(SYS_THREAD_CREATE, [SCRATCH, WORKER, 0]), FAILED);
}

#[test]
fn killed_thread_wakes_joiner_with_abort_status() {
    let mut m = Machine::boot();
    let tid = spawn_thread(&mut m);
    m.syscall(SYS_THREAD_JOIN, [tid as u32, 0, 0]);
    m.run_until(tid);
    m.trap(13);
    assert_eq!(m.slot(), 1);
    assert_eq!(m.frame.eax, hithlum::config::ABORT_STATUS);
    assert_eq!(m.kernel.status(tid), TaskStatus::Empty);
}
