//! # 文件系统中的文件与目录
//!
//! 文件系统是只读的：普通文件按偏移顺序读取，目录每次读取返回一个文件名，
//! 任何写入都会失败。

use super::{File, FileContext, FileDescriptor, FileKind, FileStat};
use crate::config::FILENAME_LEN;
use crate::drivers::DentryKind;
use crate::error::{KernelError, KernelResult};

pub struct BlockFile;

impl File for BlockFile {
    /// 读取普通文件数据或下一个目录项名
    ///
    /// ## Returns
    ///
    /// - 普通文件：读到的字节数，文件末尾返回 0
    /// - 目录：文件名长度（最多 32 字节，不含 NUL），遍历结束返回 0
    fn read(
        &self,
        ctx: &mut FileContext<'_>,
        desc: &mut FileDescriptor,
        buf: &mut [u8],
    ) -> KernelResult<usize> {
        match desc.kind {
            FileKind::Directory => {
                let Some(dentry) = ctx.devices.dentry_at(desc.pos) else {
                    return Ok(0);
                };
                let name = dentry.name();
                let len = name.len().min(buf.len()).min(FILENAME_LEN);
                buf[..len].copy_from_slice(&name[..len]);
                desc.pos += 1;
                Ok(len)
            }
            _ => {
                let n = ctx.devices.read_data(desc.inode, desc.pos, buf);
                desc.pos += n as u32;
                Ok(n)
            }
        }
    }

    fn write(
        &self,
        _ctx: &mut FileContext<'_>,
        _desc: &mut FileDescriptor,
        _buf: &[u8],
    ) -> KernelResult<usize> {
        Err(KernelError::InvalidDescriptor)
    }

    fn stat(&self, ctx: &mut FileContext<'_>, desc: &FileDescriptor) -> KernelResult<FileStat> {
        match desc.kind {
            FileKind::Directory => Ok(FileStat {
                kind: DentryKind::Directory,
                size: 0,
            }),
            _ => Ok(FileStat {
                kind: DentryKind::Regular,
                size: ctx
                    .devices
                    .file_size(desc.inode)
                    .ok_or(KernelError::NotFound)?,
            }),
        }
    }
}
