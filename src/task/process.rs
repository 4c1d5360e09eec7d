//! # 进程与线程的生命周期
//!
//! - [`Kernel::spawn`] - 分配槽位、构建地址空间、清零私有帧并加载镜像
//! - [`Kernel::terminate`] - `halt` 的拆除部分，把控制权交回父任务
//! - [`Kernel::create_thread`] / [`Kernel::reap_thread`] - 线程的创建与回收
//!
//! ## halt 的四种情形
//!
//! | 情形 | 条件 | 处理 |
//! |------|------|------|
//! | (a) | 线程，所属进程正在 join 它 | 唤醒等待者并立即释放槽位 |
//! | (b) | 线程，无人等待 | 停在 ZOMBIE，保留状态等待 join |
//! | (c) | 进程仍拥有线程 | 先强制释放全部线程及其启动的子进程 |
//! | (d) | 普通进程 | 释放槽位 |
//!
//! 进程退出后恢复父进程在 `execute` 处保存的上下文，`eax` 为退出状态；
//! 父进程是空闲任务时，在同一终端上重新启动一个 shell。

use log::{debug, error, info, warn};

use crate::config::{
    kernel_stack_top, task_frame, LARGE_PAGE_SIZE, PROGRAM_IMAGE_OFFSET, SHELL,
    THREAD_STACK_TOP, USER_STACK_TOP,
};
use crate::drivers::{DentryKind, Devices};
use crate::error::{KernelError, KernelResult};
use crate::fs::FileContext;
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::loader;
use crate::mm::UserStack;
use crate::task::task::{Args, TaskControlBlock, TaskStatus};
use crate::trap::TrapFrame;

/// 线程函数返回后执行：`mov ebx, eax ; mov eax, 1 ; int 0x80`
///
/// 即以线程函数的返回值调用 HALT。
pub const THREAD_EXIT_TRAMPOLINE: [u8; 12] = [
    0x89, 0xC3, 0xB8, 0x01, 0x00, 0x00, 0x00, 0xCD, 0x80, 0x90, 0x90, 0x90,
];

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 在终端 `terminal` 上以 `parent` 为父进程创建新进程
    ///
    /// ## Returns
    ///
    /// 新进程的槽位。新进程处于 RUNNING，上下文是入口处的用户态帧，
    /// 并成为该终端的前台任务；调用方负责保存父进程上下文并切换过去。
    ///
    /// ## Errors
    ///
    /// - [`KernelError::NotFound`] - 程序不存在
    /// - [`KernelError::ResourceExhausted`] - 没有空槽位，所有任务保持不变
    /// - [`KernelError::InvalidImage`] - 魔数错误，槽位被释放，地址空间切回调用者
    pub(crate) fn spawn(
        &mut self,
        parent: usize,
        terminal: usize,
        command: &[u8],
    ) -> KernelResult<usize> {
        let (name, args) = loader::parse_command(command)?;
        let args = Args::new(args)?;
        let dentry = self
            .devices
            .lookup(name)
            .filter(|d| d.kind == DentryKind::Regular)
            .ok_or(KernelError::NotFound)?;
        let slot = self.tasks.alloc_slot()?;
        self.critical_section(|k| k.build_process(slot, parent, terminal, dentry.inode, args))?;
        info!(
            "spawn task {} ({}) parent {} terminal {}",
            slot,
            core::str::from_utf8(name).unwrap_or("?"),
            parent,
            terminal
        );
        Ok(slot)
    }

    fn build_process(
        &mut self,
        slot: usize,
        parent: usize,
        terminal: usize,
        inode: u32,
        args: Args,
    ) -> KernelResult<()> {
        let video = self.terminals.video_target(terminal);
        self.memory.space_mut(slot).build_task(slot, video);
        self.switch_page_directory(slot);
        self.hal.fill_phys(task_frame(slot), 0, LARGE_PAGE_SIZE);

        let dest = task_frame(slot) + PROGRAM_IMAGE_OFFSET;
        let entry = match loader::load_image(&mut self.hal, &self.devices, inode, dest) {
            Ok(entry) => entry,
            Err(e) => {
                self.memory.space_mut(slot).clear();
                let current = self.tasks.current_slot();
                self.switch_page_directory(current);
                return Err(e);
            }
        };

        let context = TrapFrame::user_entry(entry, USER_STACK_TOP as u32);
        self.tasks.insert(
            slot,
            TaskControlBlock::new_process(parent, terminal, kernel_stack_top(slot), context, args),
        );
        self.terminals.foreground[terminal] = slot;
        Ok(())
    }

    /// `halt` 的拆除部分：释放当前任务并把控制权交出
    ///
    /// 返回时 `frame` 已是下一个运行任务的上下文。
    pub(crate) fn terminate(&mut self, frame: &mut TrapFrame, status: u32) {
        let slot = self.tasks.current_slot();
        if slot == 0 {
            warn!("idle task cannot halt");
            return;
        }
        self.critical_section(|k| k.teardown(slot, frame, status));
    }

    fn teardown(&mut self, slot: usize, frame: &mut TrapFrame, status: u32) {
        self.close_all_files(slot);
        let Some(task) = self.tasks.get(slot) else {
            return;
        };
        let (parent, terminal, threads) = (task.parent, task.terminal, task.threads);

        if let Some(owner) = task.thread_of {
            let waiter = task
                .joined_by
                .filter(|&w| self.tasks.status(w) == TaskStatus::WaitingForThread);
            match waiter {
                Some(waiter) => {
                    self.release_thread(slot);
                    if let Some(w) = self.tasks.get_mut(waiter) {
                        w.status = TaskStatus::Running;
                        w.context.eax = status;
                    }
                    info!("thread {} of {} halts ({}), wakes {}", slot, owner, status, waiter);
                    self.resume(waiter, frame);
                }
                None => {
                    if let Some(t) = self.tasks.get_mut(slot) {
                        t.status = TaskStatus::Zombie;
                        t.exit_status = status;
                    }
                    info!("thread {} of {} halts ({}), zombie", slot, owner, status);
                    self.reschedule(frame);
                }
            }
            return;
        }

        for thread in threads.iter() {
            debug!("task {} reclaims thread {}", slot, thread);
            self.release_thread(thread);
        }
        self.tasks.free(slot);
        self.memory.space_mut(slot).clear();
        info!("task {} halts with {}, parent {}", slot, status, parent);

        let foreground = self.terminals.foreground[terminal];
        if foreground == slot || self.tasks.status(foreground) == TaskStatus::Empty {
            self.terminals.foreground[terminal] = parent;
        }
        match self.tasks.get_mut(parent) {
            Some(p) if parent != 0 => {
                p.status = TaskStatus::Running;
                p.context.eax = status;
                self.resume(parent, frame);
            }
            _ => self.respawn_shell(terminal, frame),
        }
    }

    /// 在终端上重新启动顶层 shell，失败时回到空闲任务
    fn respawn_shell(&mut self, terminal: usize, frame: &mut TrapFrame) {
        match self.spawn(0, terminal, SHELL) {
            Ok(shell) => self.resume(shell, frame),
            Err(e) => {
                error!("cannot restart shell on terminal {}: {}", terminal, e);
                self.terminals.foreground[terminal] = 0;
                self.resume(0, frame);
            }
        }
    }

    fn close_all_files(&mut self, slot: usize) {
        let Some(task) = self.tasks.get_mut(slot) else {
            return;
        };
        let mut ctx = FileContext {
            devices: &mut self.devices,
            terminal: task.terminal,
            rtc: &mut task.rtc,
        };
        for desc in task.fd_table.drain() {
            if let Err(e) = desc.ops().close(&mut ctx) {
                debug!("task {} close {:?}: {}", slot, desc.kind, e);
            }
        }
    }

    /// 创建线程，返回线程槽位
    ///
    /// 线程复制所属进程的地址空间，另外获得自己槽位的物理帧作为私有栈。
    /// 栈顶放置 [`THREAD_EXIT_TRAMPOLINE`] 作为线程函数的返回地址。
    pub(crate) fn create_thread(&mut self, entry: u32) -> KernelResult<usize> {
        let owner = self.tasks.process_of(self.tasks.current_slot());
        let slot = self.tasks.alloc_slot()?;
        let result = self.critical_section(|k| k.build_thread(owner, slot, entry));
        if result.is_err() {
            self.memory.space_mut(slot).clear();
        }
        result.map(|_| slot)
    }

    fn build_thread(&mut self, owner: usize, slot: usize, entry: u32) -> KernelResult<()> {
        self.memory.fork_thread_space(owner, slot);
        self.hal.fill_phys(task_frame(slot), 0, LARGE_PAGE_SIZE);

        let space = self.memory.space(slot);
        let mut stack = UserStack::new(THREAD_STACK_TOP as u32);
        let trampoline = stack.push(&mut self.hal, space, &THREAD_EXIT_TRAMPOLINE)?;
        stack.push_u32(&mut self.hal, space, trampoline)?;

        let owner_tcb = self.tasks.get(owner).ok_or(KernelError::NotFound)?;
        let thread = TaskControlBlock::new_thread(
            owner,
            owner_tcb,
            kernel_stack_top(slot),
            TrapFrame::user_entry(entry, stack.esp()),
        );
        self.tasks.insert(slot, thread);
        if let Some(o) = self.tasks.get_mut(owner) {
            o.threads.insert(slot);
        }
        info!("task {} creates thread {} at {:#x}", owner, slot, entry);
        Ok(())
    }

    /// 回收已成为 ZOMBIE 的线程，返回它的退出状态
    pub(crate) fn reap_thread(&mut self, thread: usize) -> KernelResult<u32> {
        let task = self.tasks.get(thread).ok_or(KernelError::InvalidArgument)?;
        if task.status != TaskStatus::Zombie {
            return Err(KernelError::WouldBlock);
        }
        let status = task.exit_status;
        self.release_thread(thread);
        Ok(status)
    }

    /// 释放线程槽位及其私有栈映射
    ///
    /// 线程经 `execute` 启动的子进程链一并回收。
    fn release_thread(&mut self, thread: usize) {
        self.reclaim_children(thread);
        let owner = self.tasks.get(thread).and_then(|t| t.thread_of);
        if let Some(o) = owner.and_then(|o| self.tasks.get_mut(o)) {
            o.threads.remove(thread);
        }
        self.close_all_files(thread);
        self.memory.space_mut(thread).unmap_thread_stack();
        self.memory.space_mut(thread).clear();
        self.tasks.free(thread);
    }

    /// 回收父任务为 `parent` 的全部进程及其后代
    fn reclaim_children(&mut self, parent: usize) {
        loop {
            let Some(child) = self
                .tasks
                .iter()
                .find(|&(s, t)| s != 0 && t.parent == parent && !t.is_thread())
                .map(|(s, _)| s)
            else {
                return;
            };
            let threads = self.tasks.get(child).map(|t| t.threads).unwrap_or_default();
            for thread in threads.iter() {
                self.release_thread(thread);
            }
            self.reclaim_children(child);
            self.close_all_files(child);
            self.memory.space_mut(child).clear();
            self.tasks.free(child);
            debug!("task {} reclaimed with its parent {}", child, parent);
        }
    }
}
