//! # 用户内存访问
//!
//! 用户缓冲区可能跨越页边界，每一页都要单独经过任务页表翻译。
//! 这里的函数把一次用户态访问拆成若干不跨页的物理片段，再交给
//! [`Hal`] 的物理内存原语完成拷贝。任何一页未映射或对用户不可见，
//! 整个访问返回 [`KernelError::BadAddress`]，且不会产生部分写入。

use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;
use crate::mm::AddressSpace;

/// 一个不跨页的物理片段
struct Chunk {
    phys: usize,
    offset: usize,
    len: usize,
}

/// 按页切分用户区间 `[va, va + len)`，逐页翻译
fn for_each_chunk(
    space: &AddressSpace,
    va: u32,
    len: usize,
    mut f: impl FnMut(Chunk),
) -> KernelResult<()> {
    let start = va as usize;
    let end = start.checked_add(len).ok_or(KernelError::BadAddress)?;
    if end > u32::MAX as usize + 1 {
        return Err(KernelError::BadAddress);
    }
    let mut cur = start;
    let mut offset = 0;
    while cur < end {
        let page_end = (cur / PAGE_SIZE + 1) * PAGE_SIZE;
        let chunk = page_end.min(end) - cur;
        let phys = space.translate_user(cur).ok_or(KernelError::BadAddress)?;
        f(Chunk {
            phys,
            offset,
            len: chunk,
        });
        cur += chunk;
        offset += chunk;
    }
    Ok(())
}

/// 检查用户区间是否完全映射
pub fn check_user_range(space: &AddressSpace, va: u32, len: usize) -> KernelResult<()> {
    if va == 0 {
        return Err(KernelError::BadAddress);
    }
    for_each_chunk(space, va, len, |_| {})
}

pub fn copy_to_user<H: Hal>(
    hal: &mut H,
    space: &AddressSpace,
    va: u32,
    data: &[u8],
) -> KernelResult<()> {
    check_user_range(space, va, data.len())?;
    for_each_chunk(space, va, data.len(), |c| {
        hal.write_phys(c.phys, &data[c.offset..c.offset + c.len]);
    })
}

pub fn copy_from_user<H: Hal>(
    hal: &H,
    space: &AddressSpace,
    va: u32,
    buf: &mut [u8],
) -> KernelResult<()> {
    check_user_range(space, va, buf.len())?;
    for_each_chunk(space, va, buf.len(), |c| {
        hal.read_phys(c.phys, &mut buf[c.offset..c.offset + c.len]);
    })
}

/// 读取以 NUL 结尾的用户字符串到 `buf`，返回不含 NUL 的长度
///
/// 字符串在 `buf` 装满之前没有结束时返回 [`KernelError::InvalidArgument`]。
pub fn read_user_cstr<H: Hal>(
    hal: &H,
    space: &AddressSpace,
    va: u32,
    buf: &mut [u8],
) -> KernelResult<usize> {
    if va == 0 {
        return Err(KernelError::BadAddress);
    }
    let mut byte = [0u8; 1];
    for (i, slot) in buf.iter_mut().enumerate() {
        let addr = (va as usize + i) as u32;
        let phys = space
            .translate_user(addr as usize)
            .ok_or(KernelError::BadAddress)?;
        hal.read_phys(phys, &mut byte);
        if byte[0] == 0 {
            return Ok(i);
        }
        *slot = byte[0];
    }
    Err(KernelError::InvalidArgument)
}

pub fn write_user_u32<H: Hal>(
    hal: &mut H,
    space: &AddressSpace,
    va: u32,
    value: u32,
) -> KernelResult<()> {
    copy_to_user(hal, space, va, &value.to_le_bytes())
}

/// 向下生长的用户栈写入器
pub struct UserStack {
    esp: u32,
}

impl UserStack {
    pub fn new(esp: u32) -> Self {
        Self { esp }
    }

    pub fn esp(&self) -> u32 {
        self.esp
    }

    /// 压入 `data`，返回它在用户空间的起始地址
    pub fn push<H: Hal>(
        &mut self,
        hal: &mut H,
        space: &AddressSpace,
        data: &[u8],
    ) -> KernelResult<u32> {
        let esp = self
            .esp
            .checked_sub(data.len() as u32)
            .ok_or(KernelError::BadAddress)?;
        copy_to_user(hal, space, esp, data)?;
        self.esp = esp;
        Ok(esp)
    }

    pub fn push_u32<H: Hal>(
        &mut self,
        hal: &mut H,
        space: &AddressSpace,
        value: u32,
    ) -> KernelResult<u32> {
        self.push(hal, space, &value.to_le_bytes())
    }
}
