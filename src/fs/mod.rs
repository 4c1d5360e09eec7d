//! # 文件描述符层
//!
//! 每个打开的描述符携带一个类别标签，由标签选出一张 `&'static dyn File`
//! 操作表 `{open, close, read, write, stat}`。内核只通过这张表操作描述符，
//! 不关心驱动内部状态。
//!
//! ## 操作表实现
//!
//! - [`BlockFile`] - 文件系统中的普通文件与目录
//! - [`RtcDevice`] - 虚拟化的 RTC
//! - [`KeyboardDevice`] - 原始键盘事件
//! - [`TerminalStream`] - 终端的 stdin/stdout
//!
//! ## 描述符表
//!
//! ```text
//! fd_table[0] = stdin     固定，不可关闭
//! fd_table[1] = stdout    固定，不可关闭
//! fd_table[2..8]          open 时取最小的空位
//! ```

mod inode;
mod kbd;
mod rtc;
mod stdio;

pub use inode::BlockFile;
pub use kbd::KeyboardDevice;
pub use rtc::{RtcDevice, RtcPacing};
pub use stdio::TerminalStream;

use crate::config::MAX_FILES;
use crate::drivers::{DentryKind, Devices, FileSystem};
use crate::error::{KernelError, KernelResult};

/// 驱动操作所需的上下文
pub struct FileContext<'a> {
    pub devices: &'a mut dyn Devices,
    /// 调用任务所在终端
    pub terminal: usize,
    /// 调用任务的虚拟 RTC 状态
    pub rtc: &'a mut RtcPacing,
}

/// 文件操作表
pub trait File: Sync {
    fn open(&self, _ctx: &mut FileContext<'_>) -> KernelResult<()> {
        Ok(())
    }

    fn close(&self, _ctx: &mut FileContext<'_>) -> KernelResult<()> {
        Ok(())
    }

    /// 读取到内核缓冲区，返回字节数；需要等待时返回 [`KernelError::WouldBlock`]
    fn read(
        &self,
        ctx: &mut FileContext<'_>,
        desc: &mut FileDescriptor,
        buf: &mut [u8],
    ) -> KernelResult<usize>;

    fn write(
        &self,
        ctx: &mut FileContext<'_>,
        desc: &mut FileDescriptor,
        buf: &[u8],
    ) -> KernelResult<usize>;

    fn stat(&self, ctx: &mut FileContext<'_>, desc: &FileDescriptor) -> KernelResult<FileStat>;
}

/// 描述符类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Regular,
    Stdin,
    Stdout,
    Rtc,
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub kind: FileKind,
    /// 普通文件的 inode，设备为 0
    pub inode: u32,
    /// 文件偏移；目录中为下一个目录项下标
    pub pos: u32,
}

static BLOCK_FILE: BlockFile = BlockFile;
static RTC_DEVICE: RtcDevice = RtcDevice;
static KEYBOARD_DEVICE: KeyboardDevice = KeyboardDevice;
static TERMINAL_STREAM: TerminalStream = TerminalStream;

impl FileDescriptor {
    pub fn new(kind: FileKind, inode: u32) -> Self {
        Self { kind, inode, pos: 0 }
    }

    /// 该描述符的操作表
    pub fn ops(&self) -> &'static dyn File {
        match self.kind {
            FileKind::Directory | FileKind::Regular => &BLOCK_FILE,
            FileKind::Rtc => &RTC_DEVICE,
            FileKind::Keyboard => &KEYBOARD_DEVICE,
            FileKind::Stdin | FileKind::Stdout => &TERMINAL_STREAM,
        }
    }
}

/// STAT 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: DentryKind,
    pub size: u32,
}

impl FileStat {
    pub const SIZE: usize = 8;

    /// 用户看到的布局：`{kind: u32, size: u32}`
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&u32::from(self.kind).to_le_bytes());
        out[4..].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

/// 把 OPEN 的路径名解析为描述符（尚未调用驱动的 `open`）
///
/// `/dev/rtc` 与 `/dev/kbd` 是内建设备名，其他名字交给文件系统查找。
pub fn resolve<F: FileSystem + ?Sized>(fs: &F, name: &[u8]) -> KernelResult<FileDescriptor> {
    match name {
        b"/dev/rtc" => return Ok(FileDescriptor::new(FileKind::Rtc, 0)),
        b"/dev/kbd" => return Ok(FileDescriptor::new(FileKind::Keyboard, 0)),
        _ => {}
    }
    let dentry = fs.lookup(name).ok_or(KernelError::NotFound)?;
    let kind = match dentry.kind {
        DentryKind::Device => FileKind::Rtc,
        DentryKind::Directory => FileKind::Directory,
        DentryKind::Regular => FileKind::Regular,
    };
    Ok(FileDescriptor::new(kind, dentry.inode))
}

/// 每个任务的描述符表
#[derive(Debug, Clone)]
pub struct FdTable {
    entries: [Option<FileDescriptor>; MAX_FILES],
}

impl FdTable {
    pub const fn empty() -> Self {
        Self {
            entries: [None; MAX_FILES],
        }
    }

    /// 预先打开 stdin/stdout 的表
    pub fn with_stdio() -> Self {
        let mut table = Self::empty();
        table.entries[0] = Some(FileDescriptor::new(FileKind::Stdin, 0));
        table.entries[1] = Some(FileDescriptor::new(FileKind::Stdout, 0));
        table
    }

    /// 放入最小的空闲描述符，表满时返回 [`KernelError::ResourceExhausted`]
    pub fn alloc(&mut self, desc: FileDescriptor) -> KernelResult<usize> {
        let fd = (2..MAX_FILES)
            .find(|&fd| self.entries[fd].is_none())
            .ok_or(KernelError::ResourceExhausted)?;
        self.entries[fd] = Some(desc);
        Ok(fd)
    }

    pub fn get_mut(&mut self, fd: u32) -> KernelResult<&mut FileDescriptor> {
        self.entries
            .get_mut(fd as usize)
            .and_then(|e| e.as_mut())
            .ok_or(KernelError::InvalidDescriptor)
    }

    /// 取出一个可关闭的描述符；0/1 不可关闭
    pub fn take(&mut self, fd: u32) -> KernelResult<FileDescriptor> {
        if fd < 2 {
            return Err(KernelError::InvalidDescriptor);
        }
        self.entries
            .get_mut(fd as usize)
            .and_then(|e| e.take())
            .ok_or(KernelError::InvalidDescriptor)
    }

    /// 取出全部描述符（任务退出时释放）
    pub fn drain(&mut self) -> impl Iterator<Item = FileDescriptor> + '_ {
        self.entries.iter_mut().filter_map(|e| e.take())
    }

    pub fn is_open(&self, fd: usize) -> bool {
        matches!(self.entries.get(fd), Some(Some(_)))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_is_preopened_and_pinned() {
        let mut table = FdTable::with_stdio();
        assert!(table.is_open(0) && table.is_open(1));
        assert_eq!(table.take(0), Err(KernelError::InvalidDescriptor));
        assert_eq!(table.take(1), Err(KernelError::InvalidDescriptor));
        assert_eq!(table.get_mut(1).map(|d| d.kind), Ok(FileKind::Stdout));
    }

    #[test]
    fn alloc_takes_lowest_free_slot() {
        let mut table = FdTable::with_stdio();
        for expected in 2..MAX_FILES {
            assert_eq!(table.alloc(FileDescriptor::new(FileKind::Rtc, 0)), Ok(expected));
        }
        assert_eq!(
            table.alloc(FileDescriptor::new(FileKind::Rtc, 0)),
            Err(KernelError::ResourceExhausted)
        );
        table.take(4).unwrap();
        assert_eq!(table.alloc(FileDescriptor::new(FileKind::Regular, 3)), Ok(4));
    }

    #[test]
    fn out_of_range_descriptors_are_rejected() {
        let mut table = FdTable::with_stdio();
        assert_eq!(table.get_mut(2), Err(KernelError::InvalidDescriptor));
        assert_eq!(table.get_mut(99), Err(KernelError::InvalidDescriptor));
        assert_eq!(table.take(8), Err(KernelError::InvalidDescriptor));
    }

    #[test]
    fn drain_empties_the_table() {
        let mut table = FdTable::with_stdio();
        table.alloc(FileDescriptor::new(FileKind::Keyboard, 0)).unwrap();
        assert_eq!(table.drain().count(), 3);
        assert!(!table.is_open(0));
    }

    #[test]
    fn stat_layout() {
        let stat = FileStat {
            kind: DentryKind::Regular,
            size: 0x1234,
        };
        assert_eq!(stat.to_bytes(), [2, 0, 0, 0, 0x34, 0x12, 0, 0]);
    }
}
