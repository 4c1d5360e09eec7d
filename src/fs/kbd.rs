//! 原始键盘事件设备 `/dev/kbd`，读取不阻塞

use super::{File, FileContext, FileDescriptor, FileStat};
use crate::drivers::DentryKind;
use crate::error::{KernelError, KernelResult};

pub struct KeyboardDevice;

impl File for KeyboardDevice {
    fn read(
        &self,
        ctx: &mut FileContext<'_>,
        _desc: &mut FileDescriptor,
        buf: &mut [u8],
    ) -> KernelResult<usize> {
        Ok(ctx.devices.read_keys(ctx.terminal, buf))
    }

    fn write(
        &self,
        _ctx: &mut FileContext<'_>,
        _desc: &mut FileDescriptor,
        _buf: &[u8],
    ) -> KernelResult<usize> {
        Err(KernelError::InvalidDescriptor)
    }

    fn stat(&self, _ctx: &mut FileContext<'_>, _desc: &FileDescriptor) -> KernelResult<FileStat> {
        Ok(FileStat {
            kind: DentryKind::Device,
            size: 0,
        })
    }
}
