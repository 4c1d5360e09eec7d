//! # 页表项与页表
//!
//! 提供 x86 两级分页（非 PAE）所需的页表项打包/解包，以及页目录、页表两种
//! 4KB 对齐的表结构。所有位布局都集中在 [`PageEntry`] 中，其余代码只与
//! 这一标签化的枚举打交道。
//!
//! ## 表项位布局
//!
//! ```text
//! 4KB 表项 / 指向页表的目录项 (PS = 0):
//! ┌──────────────────────────┬─────┬─┬─┬─┬─┬─┬─┬─┬─┬─┐
//! │ frame[31:12]   (20 bit)  │avail│G│0│D│A│C│W│U│R│P│
//! └──────────────────────────┴─────┴─┴─┴─┴─┴─┴─┴─┴─┴─┘
//!
//! 4MB 目录项 (PS = 1):
//! ┌────────────┬─────────┬─┬─────┬─┬─┬─┬─┬─┬─┬─┬─┬─┐
//! │frame[31:22]│reserved │T│avail│G│1│D│A│C│W│U│R│P│
//! │  (10 bit)  │         │ │     │ │ │ │ │ │ │ │ │ │
//! └────────────┴─────────┴─┴─────┴─┴─┴─┴─┴─┴─┴─┴─┴─┘
//! ```

use bit_field::BitField;
use bitflags::bitflags;

use crate::config::ENTRIES_PER_TABLE;

bitflags! {
    /// 页表项低 12 位标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// Present - 映射有效
        const PRESENT = 1 << 0;
        /// Read/Write - 可写
        const WRITABLE = 1 << 1;
        /// User/Supervisor - 用户态可访问
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        /// Page Size - 仅目录项有效，置位表示 4MB 大页
        const PAGE_SIZE = 1 << 7;
        /// Global - 切换 CR3 时不刷新
        const GLOBAL = 1 << 8;
    }
}

/// 页表项
///
/// 两种硬件定义的布局各对应一个变体，`frame` 分别是 20 位与 10 位的帧号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
    NotPresent,
    /// 4KB 页，或目录中指向一张 4KB 页表的表项
    SmallPage {
        frame: u32,
        writable: bool,
        user: bool,
        global: bool,
    },
    /// 4MB 大页（只出现在目录中）
    LargePage {
        frame: u32,
        writable: bool,
        user: bool,
        global: bool,
    },
}

impl PageEntry {
    /// 指向物理地址 `phys` 所在 4KB 帧的表项
    pub fn small(phys: usize, writable: bool, user: bool) -> Self {
        PageEntry::SmallPage {
            frame: ((phys >> 12) & 0xF_FFFF) as u32,
            writable,
            user,
            global: false,
        }
    }

    /// 指向物理地址 `phys` 所在 4MB 帧的目录项
    pub fn large(phys: usize, writable: bool, user: bool, global: bool) -> Self {
        PageEntry::LargePage {
            frame: ((phys >> 22) & 0x3FF) as u32,
            writable,
            user,
            global,
        }
    }

    /// 打包为硬件格式
    pub fn pack(self) -> u32 {
        let mut raw = 0u32;
        match self {
            PageEntry::NotPresent => {}
            PageEntry::SmallPage {
                frame,
                writable,
                user,
                global,
            } => {
                raw.set_bits(12..32, frame);
                raw |= Self::flags(writable, user, global).bits();
            }
            PageEntry::LargePage {
                frame,
                writable,
                user,
                global,
            } => {
                raw.set_bits(22..32, frame);
                raw |= (Self::flags(writable, user, global) | PageFlags::PAGE_SIZE).bits();
            }
        }
        raw
    }

    /// 按目录项解释原始值，PS 位决定变体
    pub fn unpack_directory(raw: u32) -> Self {
        let flags = PageFlags::from_bits_truncate(raw);
        if !flags.contains(PageFlags::PRESENT) {
            return PageEntry::NotPresent;
        }
        let writable = flags.contains(PageFlags::WRITABLE);
        let user = flags.contains(PageFlags::USER);
        let global = flags.contains(PageFlags::GLOBAL);
        if flags.contains(PageFlags::PAGE_SIZE) {
            PageEntry::LargePage {
                frame: raw.get_bits(22..32),
                writable,
                user,
                global,
            }
        } else {
            PageEntry::SmallPage {
                frame: raw.get_bits(12..32),
                writable,
                user,
                global,
            }
        }
    }

    /// 按页表项解释原始值（页表中没有大页）
    pub fn unpack_table(raw: u32) -> Self {
        let flags = PageFlags::from_bits_truncate(raw);
        if !flags.contains(PageFlags::PRESENT) {
            return PageEntry::NotPresent;
        }
        PageEntry::SmallPage {
            frame: raw.get_bits(12..32),
            writable: flags.contains(PageFlags::WRITABLE),
            user: flags.contains(PageFlags::USER),
            global: flags.contains(PageFlags::GLOBAL),
        }
    }

    /// 映射目标的物理基址
    pub fn phys_addr(&self) -> Option<usize> {
        match *self {
            PageEntry::NotPresent => None,
            PageEntry::SmallPage { frame, .. } => Some((frame as usize) << 12),
            PageEntry::LargePage { frame, .. } => Some((frame as usize) << 22),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(
            self,
            PageEntry::SmallPage { user: true, .. } | PageEntry::LargePage { user: true, .. }
        )
    }

    fn flags(writable: bool, user: bool, global: bool) -> PageFlags {
        let mut flags = PageFlags::PRESENT;
        flags.set(PageFlags::WRITABLE, writable);
        flags.set(PageFlags::USER, user);
        flags.set(PageFlags::GLOBAL, global);
        flags
    }
}

/// 页目录
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageDirectory {
    entries: [u32; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    pub const fn new() -> Self {
        Self {
            entries: [0; ENTRIES_PER_TABLE],
        }
    }

    pub fn get(&self, index: usize) -> PageEntry {
        PageEntry::unpack_directory(self.entries[index])
    }

    pub fn set(&mut self, index: usize, entry: PageEntry) {
        self.entries[index] = entry.pack();
    }

    pub fn clear(&mut self) {
        self.entries = [0; ENTRIES_PER_TABLE];
    }

    /// 目录的基址，即写入 CR3 的值
    pub fn base_addr(&self) -> usize {
        self as *const Self as usize
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// 4KB 页表
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageTable {
    entries: [u32; ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [0; ENTRIES_PER_TABLE],
        }
    }

    pub fn get(&self, index: usize) -> PageEntry {
        PageEntry::unpack_table(self.entries[index])
    }

    pub fn set(&mut self, index: usize, entry: PageEntry) {
        self.entries[index] = entry.pack();
    }

    pub fn clear(&mut self) {
        self.entries = [0; ENTRIES_PER_TABLE];
    }

    pub fn base_addr(&self) -> usize {
        self as *const Self as usize
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}
