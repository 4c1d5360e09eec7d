//! # 终端标准输入输出
//!
//! stdin 只读、stdout 只写，都作用于调用任务所在的终端。
//! stdin 没有完整输入行时返回 [`KernelError::WouldBlock`]，由系统调用层
//! 让出 CPU 后重新发起读取。

use super::{File, FileContext, FileDescriptor, FileKind, FileStat};
use crate::drivers::DentryKind;
use crate::error::{KernelError, KernelResult};

pub struct TerminalStream;

impl File for TerminalStream {
    fn read(
        &self,
        ctx: &mut FileContext<'_>,
        desc: &mut FileDescriptor,
        buf: &mut [u8],
    ) -> KernelResult<usize> {
        if desc.kind != FileKind::Stdin {
            return Err(KernelError::InvalidDescriptor);
        }
        ctx.devices
            .read_line(ctx.terminal, buf)
            .ok_or(KernelError::WouldBlock)
    }

    fn write(
        &self,
        ctx: &mut FileContext<'_>,
        desc: &mut FileDescriptor,
        buf: &[u8],
    ) -> KernelResult<usize> {
        if desc.kind != FileKind::Stdout {
            return Err(KernelError::InvalidDescriptor);
        }
        Ok(ctx.devices.write(ctx.terminal, buf))
    }

    fn stat(&self, _ctx: &mut FileContext<'_>, _desc: &FileDescriptor) -> KernelResult<FileStat> {
        Ok(FileStat {
            kind: DentryKind::Device,
            size: 0,
        })
    }
}
