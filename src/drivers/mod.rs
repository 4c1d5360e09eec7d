//! # 外部驱动接口
//!
//! 文件系统、终端、键盘与时钟由其他模块实现，内核核心只通过这里的 trait
//! 调用它们。[`Devices`] 把四者捆绑为一个类型参数，供 [`crate::Kernel`] 持有。

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::config::FILENAME_LEN;

/// 目录项类型，数值与文件系统镜像中的编码一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DentryKind {
    /// 设备文件（RTC）
    Device = 0,
    Directory = 1,
    Regular = 2,
}

/// 目录项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dentry {
    pub name: [u8; FILENAME_LEN],
    pub kind: DentryKind,
    pub inode: u32,
}

impl Dentry {
    /// 由名字构造，超出 32 字节的部分被截断
    pub fn new(name: &[u8], kind: DentryKind, inode: u32) -> Self {
        let mut buf = [0u8; FILENAME_LEN];
        let len = name.len().min(FILENAME_LEN);
        buf[..len].copy_from_slice(&name[..len]);
        Self {
            name: buf,
            kind,
            inode,
        }
    }

    /// 名字的有效部分（32 字节满长时没有 NUL）
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_LEN);
        &self.name[..len]
    }
}

/// 只读文件系统
pub trait FileSystem {
    fn lookup(&self, name: &[u8]) -> Option<Dentry>;
    fn dentry_at(&self, index: u32) -> Option<Dentry>;
    /// 从 `offset` 起读取文件数据，返回读到的字节数，0 表示文件末尾
    fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> usize;
    fn file_size(&self, inode: u32) -> Option<u32>;
}

/// 终端
pub trait Console {
    /// 取走终端 `terminal` 上一行完整的输入；尚无完整行时返回 `None`
    fn read_line(&mut self, terminal: usize, buf: &mut [u8]) -> Option<usize>;
    fn write(&mut self, terminal: usize, data: &[u8]) -> usize;
}

/// 键盘原始事件
pub trait Keyboard {
    /// 非阻塞读取原始按键事件
    fn read_keys(&mut self, terminal: usize, buf: &mut [u8]) -> usize;
    /// 切换键位布局，布局编号无效时返回 `false`
    fn load_keymap(&mut self, layout: u32) -> bool;
}

/// 墙上时钟
pub trait Clock {
    fn unix_time(&self) -> u32;
}

pub trait Devices: FileSystem + Console + Keyboard + Clock {}

impl<T: FileSystem + Console + Keyboard + Clock> Devices for T {}
