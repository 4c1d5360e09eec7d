//! # 进程、线程、信号与设备相关系统调用

use log::{debug, info};

use super::SyscallFlow;
use crate::config::{IO_PORT_SPACE, LARGE_PAGE_SIZE, MAX_ARGS, MAX_COMMAND, USER_BASE, USER_VIDEO};
use crate::drivers::Devices;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::mm::{check_user_range, copy_to_user, read_user_cstr, write_user_u32};
use crate::task::{Signal, TaskStatus};
use crate::trap::TrapFrame;

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 系统调用：结束当前任务
    ///
    /// 用户给出的状态只保留低 8 位，进程与线程一致。
    /// 父进程的 `execute`（或所属进程的 `thread_join`）返回该状态。
    pub(super) fn sys_halt(
        &mut self,
        status: u32,
        frame: &mut TrapFrame,
    ) -> KernelResult<SyscallFlow> {
        if self.tasks.current_slot() == 0 {
            return Err(KernelError::InvalidArgument);
        }
        self.terminate(frame, status & 0xFF);
        Ok(SyscallFlow::Switched)
    }

    /// 系统调用：执行程序
    ///
    /// 成功时不返回到调用处：调用者的上下文保存为恢复点并进入 SLEEPING，
    /// 直到子进程 `halt` 时以子进程的状态作为返回值恢复。
    ///
    /// ## Errors
    ///
    /// - 命令行无法读取或过长
    /// - 程序不存在、不是可执行镜像
    /// - 任务表已满
    pub(super) fn sys_execute(
        &mut self,
        command: u32,
        frame: &mut TrapFrame,
    ) -> KernelResult<SyscallFlow> {
        let mut buf = [0u8; MAX_COMMAND + 1];
        let len = {
            let slot = self.tasks.current_slot();
            read_user_cstr(&self.hal, self.memory.space(slot), command, &mut buf)?
        };

        let parent = self.tasks.current_slot();
        let terminal = self.tasks.current()?.terminal;
        let child = self.spawn(parent, terminal, &buf[..len])?;

        if let Some(p) = self.tasks.get_mut(parent) {
            p.context = *frame;
            if parent != 0 {
                p.status = TaskStatus::Sleeping;
            }
        }
        self.resume(child, frame);
        Ok(SyscallFlow::Switched)
    }

    /// 系统调用：取命令行参数
    ///
    /// 复制参数字符串及结尾的 NUL。没有参数或 `nbytes` 装不下时失败。
    pub(super) fn sys_getargs(&mut self, buf: u32, nbytes: u32) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        let args = self.tasks.current()?.args;
        let args = args.as_bytes();
        if args.is_empty() || args.len() + 1 > nbytes as usize {
            return Err(KernelError::InvalidArgument);
        }
        let mut out = [0u8; MAX_ARGS + 1];
        out[..args.len()].copy_from_slice(args);
        copy_to_user(
            &mut self.hal,
            self.memory.space(slot),
            buf,
            &out[..args.len() + 1],
        )?;
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：把文本显存映射到用户空间，地址写入 `*out`
    pub(super) fn sys_vidmap(&mut self, out: u32) -> KernelResult<SyscallFlow> {
        let slot = self.check_image_pointer(out)?;
        self.critical_section(|k| {
            k.memory.space_mut(slot).enable_user_video();
            k.switch_page_directory(slot);
        });
        write_user_u32(&mut self.hal, self.memory.space(slot), out, USER_VIDEO as u32)?;
        debug!("task {} vidmap", slot);
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：把整个 VGA 窗口映射到用户空间（mode X 程序）
    pub(super) fn sys_vidmap_all(&mut self, out: u32) -> KernelResult<SyscallFlow> {
        let slot = self.check_image_pointer(out)?;
        self.critical_section(|k| {
            k.memory.space_mut(slot).enable_vga_window();
            k.switch_page_directory(slot);
        });
        write_user_u32(&mut self.hal, self.memory.space(slot), out, USER_VIDEO as u32)?;
        debug!("task {} vidmap_all", slot);
        Ok(SyscallFlow::Return(0))
    }

    /// `out` 必须落在程序镜像所在的 4MB 区域内
    fn check_image_pointer(&self, out: u32) -> KernelResult<usize> {
        let out = out as usize;
        if !(USER_BASE..=USER_BASE + LARGE_PAGE_SIZE - 4).contains(&out) {
            return Err(KernelError::BadAddress);
        }
        let slot = self.tasks.current_slot();
        check_user_range(self.memory.space(slot), out as u32, 4)?;
        Ok(slot)
    }

    /// 系统调用：登记信号处理程序，`handler` 为 0 时恢复默认动作
    pub(super) fn sys_set_handler(
        &mut self,
        signum: u32,
        handler: u32,
    ) -> KernelResult<SyscallFlow> {
        let signal = Signal::try_from(signum).map_err(|_| KernelError::InvalidArgument)?;
        let task = self.tasks.current_mut()?;
        task.signals.handlers[u32::from(signal) as usize] = (handler != 0).then_some(handler);
        debug!("set handler {:?} -> {:#x}", signal, handler);
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：从信号处理程序返回
    ///
    /// 保存的上下文无法读取或被篡改时，任务在原地收到 `SEGFAULT`。
    pub(super) fn sys_sigreturn(&mut self, frame: &mut TrapFrame) -> KernelResult<SyscallFlow> {
        match self.restore_signal_context(frame) {
            Ok(()) => Ok(SyscallFlow::Switched),
            Err(KernelError::InvalidArgument) => Err(KernelError::InvalidArgument),
            Err(e) => {
                debug!("sigreturn failed: {}", e);
                self.deliver_signals(frame);
                Ok(SyscallFlow::Switched)
            }
        }
    }

    /// 系统调用：开关一段 I/O 端口的访问权限
    pub(super) fn sys_ioperm(&mut self, from: u32, num: u32, on: u32) -> KernelResult<SyscallFlow> {
        let end = from.checked_add(num).ok_or(KernelError::InvalidArgument)?;
        if end > IO_PORT_SPACE {
            return Err(KernelError::InvalidArgument);
        }
        self.hal.set_io_permission(from as u16, num, on != 0);
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：创建线程，线程号写入 `*out_id`
    pub(super) fn sys_thread_create(
        &mut self,
        out_id: u32,
        entry: u32,
    ) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        check_user_range(self.memory.space(slot), out_id, 4)?;
        let thread = self.create_thread(entry)?;
        write_user_u32(&mut self.hal, self.memory.space(slot), out_id, thread as u32)?;
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：等待线程结束
    ///
    /// 目标已是 ZOMBIE 时立即回收并返回其状态；否则调用者进入
    /// WAITING_FOR_THREAD 并让出 CPU，目标线程 `halt` 时把状态写入调用者的
    /// EAX 并唤醒它。
    pub(super) fn sys_thread_join(
        &mut self,
        tid: u32,
        frame: &mut TrapFrame,
    ) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        let tid = tid as usize;
        let owner = self.tasks.process_of(slot);
        let target = self.tasks.get(tid).ok_or(KernelError::InvalidArgument)?;
        if tid == slot || target.thread_of != Some(owner) {
            return Err(KernelError::InvalidArgument);
        }
        if target.joined_by.is_some_and(|w| w != slot) {
            return Err(KernelError::InvalidArgument);
        }

        match self.reap_thread(tid) {
            Ok(status) => {
                info!("task {} joins zombie thread {} ({})", slot, tid, status);
                Ok(SyscallFlow::Return(status as i32))
            }
            Err(KernelError::WouldBlock) => {
                if let Some(t) = self.tasks.get_mut(tid) {
                    t.joined_by = Some(slot);
                }
                self.tasks.current_mut()?.status = TaskStatus::WaitingForThread;
                debug!("task {} waits for thread {}", slot, tid);
                self.reschedule(frame);
                Ok(SyscallFlow::Switched)
            }
            Err(e) => Err(e),
        }
    }

    /// 系统调用：把当前 UNIX 时间写入 `*out`
    pub(super) fn sys_time(&mut self, out: u32) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        let now = self.devices.unix_time();
        write_user_u32(&mut self.hal, self.memory.space(slot), out, now)?;
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：切换键位布局
    pub(super) fn sys_loadkeys(&mut self, layout: u32) -> KernelResult<SyscallFlow> {
        if !self.devices.load_keymap(layout) {
            return Err(KernelError::InvalidArgument);
        }
        Ok(SyscallFlow::Return(0))
    }
}
