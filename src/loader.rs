//! # 程序加载
//!
//! 程序镜像是平坦的：整个文件原样复制到任务私有大页的固定偏移处
//! （虚拟地址 `0x0804_8000`），不做重定位。
//!
//! ## 镜像头
//!
//! ```text
//! offset 0   4             24          28
//!        ┌───┬─────────────┬───────────┬──────── ...
//!        │7F 'E' 'L' 'F'│     ...     │ entry(LE) │
//!        └───┴─────────────┴───────────┴──────── ...
//! ```

use crate::config::{FILENAME_LEN, IMAGE_ENTRY_OFFSET, IMAGE_MAGIC, IO_CHUNK, MAX_IMAGE_SIZE};
use crate::drivers::FileSystem;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;

/// 镜像头的最小长度
pub const IMAGE_HEADER_LEN: usize = IMAGE_ENTRY_OFFSET + 4;

/// 拆分命令行为 `(程序名, 参数)`
///
/// 程序名前的空格被跳过，程序名到第一个空格为止；参数是其后的剩余部分，
/// 去掉开头的空格。命令行在第一个 NUL 处结束。
pub fn parse_command(command: &[u8]) -> KernelResult<(&[u8], &[u8])> {
    let end = command.iter().position(|&b| b == 0).unwrap_or(command.len());
    let command = &command[..end];
    let start = command.iter().position(|&b| b != b' ').unwrap_or(command.len());
    let command = &command[start..];

    let split = command.iter().position(|&b| b == b' ').unwrap_or(command.len());
    let (name, rest) = command.split_at(split);
    if name.is_empty() || name.len() > FILENAME_LEN {
        return Err(KernelError::NotFound);
    }
    let args_start = rest.iter().position(|&b| b != b' ').unwrap_or(rest.len());
    Ok((name, &rest[args_start..]))
}

/// 校验镜像头并取出入口地址
pub fn parse_header(header: &[u8]) -> KernelResult<u32> {
    if header.len() < IMAGE_HEADER_LEN || header[..4] != IMAGE_MAGIC {
        return Err(KernelError::InvalidImage);
    }
    let entry = &header[IMAGE_ENTRY_OFFSET..IMAGE_HEADER_LEN];
    Ok(u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]))
}

/// 把 `inode` 的全部内容复制到物理地址 `dest`，返回入口地址
///
/// 目标区域应已清零。读不到完整镜像头或魔数不符时返回
/// [`KernelError::InvalidImage`]。
pub fn load_image<H: Hal, F: FileSystem + ?Sized>(
    hal: &mut H,
    fs: &F,
    inode: u32,
    dest: usize,
) -> KernelResult<u32> {
    let mut chunk = [0u8; IO_CHUNK];
    let mut loaded = 0usize;
    while loaded < MAX_IMAGE_SIZE {
        let want = chunk.len().min(MAX_IMAGE_SIZE - loaded);
        let n = fs.read_data(inode, loaded as u32, &mut chunk[..want]);
        if n == 0 {
            break;
        }
        hal.write_phys(dest + loaded, &chunk[..n]);
        loaded += n;
    }

    let mut header = [0u8; IMAGE_HEADER_LEN];
    let len = loaded.min(IMAGE_HEADER_LEN);
    hal.read_phys(dest, &mut header[..len]);
    parse_header(&header[..len])
}
