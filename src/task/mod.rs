//! # 任务管理
//!
//! 进程与线程共用同一种任务控制块，存放在固定 10 个槽位的任务表中。
//!
//! - [`task`] - 任务控制块与状态
//! - [`manager`] - 任务表
//! - [`scheduler`] - 时间片轮转与任务切换
//! - [`signal`] - 信号的引发与投递
//! - [`terminal`] - 终端前台任务与活动终端切换
//! - `process` - 进程/线程的创建与拆除

mod manager;
mod process;
mod scheduler;
mod signal;
#[allow(clippy::module_inception)]
mod task;
mod terminal;

pub use manager::TaskTable;
pub use process::THREAD_EXIT_TRAMPOLINE;
pub use scheduler::Scheduler;
pub use signal::{
    DefaultAction, Signal, SignalContext, SignalFlags, SignalState, SIGRETURN_TRAMPOLINE,
};
pub use task::{Args, TaskControlBlock, TaskStatus, ThreadSet};
pub use terminal::Terminals;
