//! # Hithlum 内核核心
//!
//! 一个小型 x86 多终端教学内核的进程、内存、调度与信号核心。
//!
//! ## 组成
//!
//! - [`mm`] - 每任务页目录/页表的构建与切换，用户内存访问
//! - [`task`] - 任务表、调度器、信号子系统与终端前台管理
//! - [`syscall`] - 系统调用分发（进程生命周期、线程、文件描述符）
//! - [`fs`] - 文件描述符层，对外部驱动的多态封装
//! - [`trap`] - 陷阱帧、IRQ 表与统一的陷阱入口
//! - [`hal`] / [`drivers`] - 硬件与外部驱动的接缝
//!
//! ## 执行模型
//!
//! 所有进入内核的路径都经过 [`Kernel::handle_trap`]。任务切换、用户态进入、
//! `halt` 返回父进程以及 `sigreturn` 都表现为替换陷阱帧的内容：
//!
//! ```text
//!   user ──int/irq──▶ stub 压栈 TrapFrame ──▶ handle_trap(&mut frame)
//!                                              │
//!                         保存当前任务 context ◀─┤ 切换任务时
//!                         载入下一任务 context ─▶│
//!   user ◀────iret──── stub 弹出 TrapFrame ◀────┘
//! ```

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod hal;
pub mod kernel;
pub mod loader;
pub mod log;
pub mod mm;
pub mod syscall;
pub mod task;
pub mod trap;

pub use error::{KernelError, KernelResult};
pub use kernel::Kernel;
pub use trap::TrapFrame;
