//! # 文件相关系统调用
//!
//! 所有操作都经过描述符的操作表完成，用户缓冲区按 [`IO_CHUNK`] 分段在内核
//! 缓冲区与用户空间之间拷贝。

use log::debug;

use super::SyscallFlow;
use crate::config::{FILENAME_LEN, IO_CHUNK};
use crate::drivers::Devices;
use crate::error::{KernelError, KernelResult};
use crate::fs::{self, FileContext, FileDescriptor, FileStat};
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::mm::{check_user_range, copy_from_user, copy_to_user, read_user_cstr};

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 在当前任务的描述符 `fd` 上执行 `f`
    fn with_file<R>(
        &mut self,
        fd: u32,
        f: impl FnOnce(&mut FileContext<'_>, &mut FileDescriptor) -> KernelResult<R>,
    ) -> KernelResult<R> {
        let task = self.tasks.current_mut()?;
        let desc = task.fd_table.get_mut(fd)?;
        let mut ctx = FileContext {
            devices: &mut self.devices,
            terminal: task.terminal,
            rtc: &mut task.rtc,
        };
        f(&mut ctx, desc)
    }

    /// 系统调用：从描述符读取
    ///
    /// 需要等待的读取（stdin 尚无完整行、RTC 周期未到）在没有读到任何数据时
    /// 返回 [`KernelError::WouldBlock`]，由分发器重启系统调用。
    pub(super) fn sys_read(&mut self, fd: u32, buf: u32, nbytes: u32) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        let len = nbytes as usize;
        if len > 0 {
            check_user_range(self.memory.space(slot), buf, len)?;
        }

        let mut chunk = [0u8; IO_CHUNK];
        let mut total = 0usize;
        loop {
            let want = (len - total).min(IO_CHUNK);
            let read = self.with_file(fd, |ctx, desc| {
                desc.ops().read(ctx, desc, &mut chunk[..want])
            });
            let n = match read {
                Ok(n) => n,
                Err(KernelError::WouldBlock) if total > 0 => break,
                Err(e) => return Err(e),
            };
            copy_to_user(
                &mut self.hal,
                self.memory.space(slot),
                buf + total as u32,
                &chunk[..n],
            )?;
            total += n;
            if n < want || total == len {
                break;
            }
        }
        Ok(SyscallFlow::Return(total as i32))
    }

    /// 系统调用：写入描述符
    pub(super) fn sys_write(
        &mut self,
        fd: u32,
        buf: u32,
        nbytes: u32,
    ) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        let len = nbytes as usize;
        if len > 0 {
            check_user_range(self.memory.space(slot), buf, len)?;
        }

        let mut chunk = [0u8; IO_CHUNK];
        let mut total = 0usize;
        loop {
            let want = (len - total).min(IO_CHUNK);
            copy_from_user(
                &self.hal,
                self.memory.space(slot),
                buf + total as u32,
                &mut chunk[..want],
            )?;
            let n = self.with_file(fd, |ctx, desc| desc.ops().write(ctx, desc, &chunk[..want]))?;
            total += n;
            if n < want || total >= len {
                break;
            }
        }
        Ok(SyscallFlow::Return(total as i32))
    }

    /// 系统调用：打开文件或设备，返回新描述符
    pub(super) fn sys_open(&mut self, name: u32) -> KernelResult<SyscallFlow> {
        let slot = self.tasks.current_slot();
        let mut buf = [0u8; FILENAME_LEN + 1];
        let len = read_user_cstr(&self.hal, self.memory.space(slot), name, &mut buf)?;
        let name = &buf[..len];
        match name {
            b"/dev/stdin" => return Ok(SyscallFlow::Return(0)),
            b"/dev/stdout" => return Ok(SyscallFlow::Return(1)),
            _ => {}
        }

        let desc = fs::resolve(&self.devices, name)?;
        let fd = self.tasks.current_mut()?.fd_table.alloc(desc)? as u32;
        if let Err(e) = self.with_file(fd, |ctx, desc| desc.ops().open(ctx)) {
            self.tasks.current_mut()?.fd_table.take(fd)?;
            return Err(e);
        }
        debug!("task {} opens fd {} ({:?})", slot, fd, desc.kind);
        Ok(SyscallFlow::Return(fd as i32))
    }

    /// 系统调用：关闭描述符，0/1 不可关闭
    pub(super) fn sys_close(&mut self, fd: u32) -> KernelResult<SyscallFlow> {
        let task = self.tasks.current_mut()?;
        let desc = task.fd_table.take(fd)?;
        let mut ctx = FileContext {
            devices: &mut self.devices,
            terminal: task.terminal,
            rtc: &mut task.rtc,
        };
        desc.ops().close(&mut ctx)?;
        Ok(SyscallFlow::Return(0))
    }

    /// 系统调用：把 `{kind, size}` 写入用户缓冲区
    pub(super) fn sys_stat(&mut self, fd: u32, buf: u32, nbytes: u32) -> KernelResult<SyscallFlow> {
        if (nbytes as usize) < FileStat::SIZE {
            return Err(KernelError::InvalidArgument);
        }
        let stat = self.with_file(fd, |ctx, desc| desc.ops().stat(ctx, desc))?;
        let slot = self.tasks.current_slot();
        copy_to_user(&mut self.hal, self.memory.space(slot), buf, &stat.to_bytes())?;
        Ok(SyscallFlow::Return(0))
    }
}
