//! # 任务控制块
//!
//! 任务由它在任务表中的槽位标识，槽位号同时充当进程号/线程号。

use crate::config::{MAX_ARGS, NUM_TASKS};
use crate::error::{KernelError, KernelResult};
use crate::fs::{FdTable, RtcPacing};
use crate::task::signal::SignalState;
use crate::trap::TrapFrame;

/// 任务状态
///
/// ```text
///              execute/thread_create
///   EMPTY ────────────────────────────▶ RUNNING ◀──────▶ SLEEPING
///     ▲                                 │   ▲     (父子进程交接)
///     │ halt / join 回收                 │   │
///     │                                 ▼   │ 被等待线程 halt
///     └──────── ZOMBIE ◀── 线程 halt ── RUNNING ⇄ WAITING_FOR_THREAD
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Empty,
    Running,
    Sleeping,
    Zombie,
    WaitingForThread,
}

/// 进程拥有的线程槽位集合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadSet(u32);

impl ThreadSet {
    pub fn insert(&mut self, slot: usize) {
        self.0 |= 1 << slot;
    }

    pub fn remove(&mut self, slot: usize) {
        self.0 &= !(1 << slot);
    }

    pub fn contains(&self, slot: usize) -> bool {
        slot < NUM_TASKS && self.0 & (1 << slot) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let bits = self.0;
        (0..NUM_TASKS).filter(move |&s| bits & (1 << s) != 0)
    }
}

/// 命令行中程序名之后的参数字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args {
    buf: [u8; MAX_ARGS],
    len: usize,
}

impl Args {
    pub const fn empty() -> Self {
        Self {
            buf: [0; MAX_ARGS],
            len: 0,
        }
    }

    pub fn new(bytes: &[u8]) -> KernelResult<Self> {
        if bytes.len() > MAX_ARGS {
            return Err(KernelError::InvalidArgument);
        }
        let mut args = Self::empty();
        args.buf[..bytes.len()].copy_from_slice(bytes);
        args.len = bytes.len();
        Ok(args)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// 任务控制块
#[derive(Debug, Clone)]
pub struct TaskControlBlock {
    pub status: TaskStatus,
    pub parent: usize,
    /// 任务让出 CPU 时保存的恢复点
    pub context: TrapFrame,
    /// 最近一次从用户态陷入时的用户栈指针
    pub user_esp: u32,
    pub kernel_stack: u32,
    pub terminal: usize,
    pub fd_table: FdTable,
    pub args: Args,
    pub signals: SignalState,
    /// 本进程拥有的线程
    pub threads: ThreadSet,
    /// 若本任务是线程，它所属的进程
    pub thread_of: Option<usize>,
    /// 若本任务是线程，正在等待它结束的任务
    pub joined_by: Option<usize>,
    /// 线程结束后留给 join 的状态
    pub exit_status: u32,
    pub rtc: RtcPacing,
}

impl TaskControlBlock {
    /// 新进程：stdin/stdout 已打开，从 `context` 开始运行
    pub fn new_process(
        parent: usize,
        terminal: usize,
        kernel_stack: u32,
        context: TrapFrame,
        args: Args,
    ) -> Self {
        Self {
            status: TaskStatus::Running,
            parent,
            context,
            user_esp: context.esp,
            kernel_stack,
            terminal,
            fd_table: FdTable::with_stdio(),
            args,
            signals: SignalState::new(),
            threads: ThreadSet::default(),
            thread_of: None,
            joined_by: None,
            exit_status: 0,
            rtc: RtcPacing::new(),
        }
    }

    /// 0 号空闲任务
    pub fn new_idle(kernel_stack: u32) -> Self {
        let mut idle = Self::new_process(0, 0, kernel_stack, TrapFrame::default(), Args::empty());
        idle.fd_table = FdTable::empty();
        idle
    }

    /// 新线程：复制所属进程的描述符、信号处理程序、终端与参数
    pub fn new_thread(
        owner: usize,
        owner_tcb: &TaskControlBlock,
        kernel_stack: u32,
        context: TrapFrame,
    ) -> Self {
        let mut thread = Self::new_process(
            owner,
            owner_tcb.terminal,
            kernel_stack,
            context,
            owner_tcb.args,
        );
        thread.fd_table = owner_tcb.fd_table.clone();
        thread.signals.handlers = owner_tcb.signals.handlers;
        thread.thread_of = Some(owner);
        thread
    }

    pub fn is_thread(&self) -> bool {
        self.thread_of.is_some()
    }
}
