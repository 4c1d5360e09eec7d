//! # 系统调用处理模块
//!
//! 用户程序通过 `int 0x80` 进入内核：EAX 为调用号，EBX/ECX/EDX 为参数，
//! 返回值写回 EAX。
//!
//! ## 支持的系统调用
//!
//! - **进程与线程**:
//!   - [`SyscallId::Halt`] / [`SyscallId::Execute`] - 进程的结束与创建
//!   - [`SyscallId::GetArgs`] - 取命令行参数
//!   - [`SyscallId::ThreadCreate`] / [`SyscallId::ThreadJoin`] - 线程
//! - **信号**: [`SyscallId::SetHandler`] / [`SyscallId::SigReturn`]
//! - **文件**: `read` / `write` / `open` / `close` / `stat`
//! - **设备**: `vidmap` / `vidmap_all` / `ioperm` / `time` / `loadkeys`
//!
//! ## 返回约定
//!
//! 处理函数返回 [`KernelResult<SyscallFlow>`]：
//!
//! - `Ok(Return(v))` - 把 `v` 写入 EAX
//! - `Ok(Switched)` - 陷阱帧已被替换为另一个恢复点，不再改动
//! - `Err(WouldBlock)` - 回退 EIP 到 `int 0x80` 并让出 CPU，任务下次运行时重新发起调用
//! - 其他 `Err` - 返回 -1
//!
//! 这是内核中唯一把错误转换为 -1 的地方。

mod fs;
mod process;

use log::{debug, trace};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::config::SYSCALL_INSN_LEN;
use crate::drivers::Devices;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::trap::TrapFrame;

/// 系统调用号
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum SyscallId {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    GetArgs = 7,
    Vidmap = 8,
    SetHandler = 9,
    SigReturn = 10,
    VidmapAll = 11,
    Ioperm = 12,
    ThreadCreate = 13,
    ThreadJoin = 14,
    Stat = 15,
    Time = 16,
    LoadKeys = 17,
}

/// 系统调用完成后陷阱帧的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallFlow {
    /// 返回到调用者，EAX = 返回值
    Return(i32),
    /// 已切换到另一个恢复点
    Switched,
}

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 系统调用入口
    pub(crate) fn handle_syscall(&mut self, frame: &mut TrapFrame) {
        let (id, args) = frame.syscall_args();
        let slot = self.tasks.current_slot();
        let result = match SyscallId::try_from(id) {
            Ok(syscall) => {
                trace!("task {} syscall {:?} {:x?}", slot, syscall, args);
                self.dispatch(syscall, args, frame)
            }
            Err(_) => {
                debug!("task {} unknown syscall {}", slot, id);
                Err(KernelError::InvalidArgument)
            }
        };
        match result {
            Ok(SyscallFlow::Return(value)) => frame.eax = value as u32,
            Ok(SyscallFlow::Switched) => {}
            Err(KernelError::WouldBlock) => {
                frame.eip = frame.eip.wrapping_sub(SYSCALL_INSN_LEN);
                self.reschedule(frame);
            }
            Err(e) => {
                debug!("task {} syscall {} failed: {}", slot, id, e);
                frame.eax = -1i32 as u32;
            }
        }
    }

    fn dispatch(
        &mut self,
        syscall: SyscallId,
        args: [u32; 3],
        frame: &mut TrapFrame,
    ) -> KernelResult<SyscallFlow> {
        match syscall {
            SyscallId::Halt => self.sys_halt(args[0], frame),
            SyscallId::Execute => self.sys_execute(args[0], frame),
            SyscallId::Read => self.sys_read(args[0], args[1], args[2]),
            SyscallId::Write => self.sys_write(args[0], args[1], args[2]),
            SyscallId::Open => self.sys_open(args[0]),
            SyscallId::Close => self.sys_close(args[0]),
            SyscallId::GetArgs => self.sys_getargs(args[0], args[1]),
            SyscallId::Vidmap => self.sys_vidmap(args[0]),
            SyscallId::SetHandler => self.sys_set_handler(args[0], args[1]),
            SyscallId::SigReturn => self.sys_sigreturn(frame),
            SyscallId::VidmapAll => self.sys_vidmap_all(args[0]),
            SyscallId::Ioperm => self.sys_ioperm(args[0], args[1], args[2]),
            SyscallId::ThreadCreate => self.sys_thread_create(args[0], args[1]),
            SyscallId::ThreadJoin => self.sys_thread_join(args[0], frame),
            SyscallId::Stat => self.sys_stat(args[0], args[1], args[2]),
            SyscallId::Time => self.sys_time(args[0]),
            SyscallId::LoadKeys => self.sys_loadkeys(args[0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_numbers() {
        assert_eq!(SyscallId::try_from(1u32).ok(), Some(SyscallId::Halt));
        assert_eq!(SyscallId::try_from(10u32).ok(), Some(SyscallId::SigReturn));
        assert_eq!(SyscallId::try_from(17u32).ok(), Some(SyscallId::LoadKeys));
        assert!(SyscallId::try_from(0u32).is_err());
        assert!(SyscallId::try_from(18u32).is_err());
        assert_eq!(u32::from(SyscallId::ThreadJoin), 14);
    }
}
