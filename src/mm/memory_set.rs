//! # 地址空间
//!
//! 每个任务槽位在启动时静态预留一套页目录与两张私有页表（内核侧视频映射、
//! 用户侧视频别名），因此任务创建之后的地址空间构建永远不会失败。
//!
//! ## 每个地址空间的映射
//!
//! | 目录项 | 内容 | 权限 |
//! |--------|------|------|
//! | 0  | 4KB 页表：显存与各终端后台缓冲区的恒等映射 | 内核 |
//! | 1  | 4MB 全局大页：内核镜像 | 内核 |
//! | 32 | 4MB 大页：槽位独占的物理帧 | 用户 |
//! | 33 | 4KB 页表：视频别名（VIDMAP 之后才存在） | 用户 |
//! | 34 | 4MB 大页：线程私有栈（仅线程） | 用户 |

use crate::config::{
    task_frame, KERNEL_DIR_INDEX, KERNEL_START, KERNEL_VIDEO_DIR_INDEX, LARGE_PAGE_SIZE,
    NUM_TASKS, PAGE_SIZE, TERMINAL_BACKING, THREAD_STACK_DIR_INDEX, USER_DIR_INDEX,
    USER_VIDEO_DIR_INDEX, VGA_WINDOW_PAGES, VGA_WINDOW_START, VIDEO_PHYS,
};
use crate::mm::page_table::{PageDirectory, PageEntry, PageTable};

/// 映射的访问级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Kernel,
    User,
}

impl Privilege {
    fn user(self) -> bool {
        self == Privilege::User
    }
}

/// 让目录项 `dir_index` 指向 `table`，并把 `table` 的第 `page` 项映射到 `target`
pub fn setup_vid(
    directory: &mut PageDirectory,
    dir_index: usize,
    table: &mut PageTable,
    page: usize,
    target: usize,
    privilege: Privilege,
) {
    directory.set(
        dir_index,
        PageEntry::small(table.base_addr(), true, privilege.user()),
    );
    table.set(page, PageEntry::small(target, true, privilege.user()));
}

/// 把内核镜像映射为全局 4MB 大页，切换目录时不被刷新
pub fn setup_kernel_mem(directory: &mut PageDirectory, dir_index: usize) {
    directory.set(
        dir_index,
        PageEntry::large(KERNEL_START, true, false, true),
    );
}

/// 把槽位 `slot` 独占的物理帧映射到目录项 `dir_index`
pub fn setup_task_mem(directory: &mut PageDirectory, dir_index: usize, slot: usize) {
    directory.set(
        dir_index,
        PageEntry::large(task_frame(slot), true, true, false),
    );
}

/// 一个任务的地址空间
#[repr(C)]
#[derive(Clone, Default)]
pub struct AddressSpace {
    directory: PageDirectory,
    kernel_video: PageTable,
    user_video: PageTable,
    /// 用户视频页表当前覆盖整个 VGA 窗口（VIDMAP_ALL）
    vga_window: bool,
}

impl AddressSpace {
    pub const fn new() -> Self {
        Self {
            directory: PageDirectory::new(),
            kernel_video: PageTable::new(),
            user_video: PageTable::new(),
            vga_window: false,
        }
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// 只含内核与内核视频映射的地址空间（0 号空闲任务）
    pub fn build_kernel(&mut self) {
        self.clear();
        self.map_kernel_video();
        setup_kernel_mem(&mut self.directory, KERNEL_DIR_INDEX);
    }

    /// 普通任务的地址空间
    ///
    /// `video` 是用户视频别名最初指向的物理页：终端在前台时为真实显存，
    /// 否则为该终端的后台缓冲区。别名在 VIDMAP 之前对用户不可见。
    pub fn build_task(&mut self, slot: usize, video: usize) {
        self.build_kernel();
        setup_task_mem(&mut self.directory, USER_DIR_INDEX, slot);
        self.user_video
            .set(0, PageEntry::small(video, true, true));
    }

    /// 复制另一个地址空间（线程继承所属进程的映射）
    pub fn copy_from(&mut self, other: &AddressSpace) {
        self.clone_from(other);
        self.link_tables();
    }

    pub fn clear(&mut self) {
        self.directory.clear();
        self.kernel_video.clear();
        self.user_video.clear();
        self.vga_window = false;
    }

    /// 让目录中指向页表的表项重新指向本空间自己的页表
    ///
    /// 复制出的目录仍指向源空间的页表，装载 CR3 之前必须调用。
    pub fn link_tables(&mut self) {
        if let PageEntry::SmallPage { user, .. } = self.directory.get(KERNEL_VIDEO_DIR_INDEX) {
            self.directory.set(
                KERNEL_VIDEO_DIR_INDEX,
                PageEntry::small(self.kernel_video.base_addr(), true, user),
            );
        }
        if let PageEntry::SmallPage { user, .. } = self.directory.get(USER_VIDEO_DIR_INDEX) {
            self.directory.set(
                USER_VIDEO_DIR_INDEX,
                PageEntry::small(self.user_video.base_addr(), true, user),
            );
        }
    }

    /// 让用户视频别名对用户可见（VIDMAP）
    pub fn enable_user_video(&mut self) {
        self.directory.set(
            USER_VIDEO_DIR_INDEX,
            PageEntry::small(self.user_video.base_addr(), true, true),
        );
    }

    /// 把整个 VGA 窗口映射进用户视频页表（VIDMAP_ALL）
    ///
    /// 文本显存页仍跟随终端前后台，其余页恒等映射。
    pub fn enable_vga_window(&mut self) {
        let text = self.video_target();
        for page in 0..VGA_WINDOW_PAGES {
            let phys = VGA_WINDOW_START + page * PAGE_SIZE;
            self.user_video.set(page, PageEntry::small(phys, true, true));
        }
        self.vga_window = true;
        if let Some(text) = text {
            self.retarget_video(text);
        }
        self.enable_user_video();
    }

    /// 用户视频别名当前指向的物理页
    pub fn video_target(&self) -> Option<usize> {
        self.user_video.get(self.text_page()).phys_addr()
    }

    /// 终端切换时重定向用户视频别名
    pub fn retarget_video(&mut self, target: usize) {
        let page = self.text_page();
        self.user_video.set(page, PageEntry::small(target, true, true));
    }

    /// 为线程映射它的私有栈帧（槽位 `slot` 的物理帧）
    pub fn map_thread_stack(&mut self, slot: usize) {
        setup_task_mem(&mut self.directory, THREAD_STACK_DIR_INDEX, slot);
    }

    pub fn unmap_thread_stack(&mut self) {
        self.directory
            .set(THREAD_STACK_DIR_INDEX, PageEntry::NotPresent);
    }

    /// 将用户虚拟地址翻译为物理地址，只接受用户可访问的映射
    ///
    /// 页表的位置来自本空间自身的结构，而不是目录项中的地址。
    pub fn translate_user(&self, va: usize) -> Option<usize> {
        let dir_index = va / LARGE_PAGE_SIZE;
        match self.directory.get(dir_index) {
            entry @ PageEntry::LargePage { user: true, .. } => {
                Some(entry.phys_addr()? + va % LARGE_PAGE_SIZE)
            }
            PageEntry::SmallPage { user: true, .. } => {
                let table = match dir_index {
                    KERNEL_VIDEO_DIR_INDEX => &self.kernel_video,
                    USER_VIDEO_DIR_INDEX => &self.user_video,
                    _ => return None,
                };
                let entry = table.get((va / PAGE_SIZE) % 1024);
                if entry.is_user() {
                    Some(entry.phys_addr()? + va % PAGE_SIZE)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn map_kernel_video(&mut self) {
        setup_vid(
            &mut self.directory,
            KERNEL_VIDEO_DIR_INDEX,
            &mut self.kernel_video,
            VIDEO_PHYS / PAGE_SIZE,
            VIDEO_PHYS,
            Privilege::Kernel,
        );
        for backing in TERMINAL_BACKING {
            self.kernel_video
                .set(backing / PAGE_SIZE, PageEntry::small(backing, true, false));
        }
    }

    fn text_page(&self) -> usize {
        if self.vga_window {
            (VIDEO_PHYS - VGA_WINDOW_START) / PAGE_SIZE
        } else {
            0
        }
    }
}

/// 全部槽位的地址空间，启动时一次性预留
pub struct MemoryArena {
    spaces: [AddressSpace; NUM_TASKS],
}

impl MemoryArena {
    pub fn new() -> Self {
        Self {
            spaces: core::array::from_fn(|_| AddressSpace::new()),
        }
    }

    pub fn space(&self, slot: usize) -> &AddressSpace {
        &self.spaces[slot]
    }

    pub fn space_mut(&mut self, slot: usize) -> &mut AddressSpace {
        &mut self.spaces[slot]
    }

    /// 以 `owner` 的地址空间为基础构建线程 `slot` 的地址空间
    pub fn fork_thread_space(&mut self, owner: usize, slot: usize) {
        let (src, dst) = if owner < slot {
            let (left, right) = self.spaces.split_at_mut(slot);
            (&left[owner], &mut right[0])
        } else {
            let (left, right) = self.spaces.split_at_mut(owner);
            (&right[0], &mut left[slot])
        };
        dst.copy_from(src);
        dst.map_thread_stack(slot);
    }
}

impl Default for MemoryArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PROGRAM_IMAGE, THREAD_STACK_BASE, USER_BASE, USER_VIDEO};

    #[test]
    fn task_space_maps_private_frame() {
        let mut space = AddressSpace::new();
        space.build_task(3, VIDEO_PHYS);
        assert_eq!(space.translate_user(USER_BASE), Some(task_frame(3)));
        assert_eq!(
            space.translate_user(PROGRAM_IMAGE + 5),
            Some(task_frame(3) + 0x48005)
        );
        // 内核与内核视频映射对用户不可见
        assert_eq!(space.translate_user(KERNEL_START), None);
        assert_eq!(space.translate_user(VIDEO_PHYS), None);
        assert!(matches!(
            space.directory().get(KERNEL_DIR_INDEX),
            PageEntry::LargePage { global: true, user: false, .. }
        ));
    }

    #[test]
    fn video_alias_appears_after_vidmap() {
        let mut space = AddressSpace::new();
        space.build_task(1, TERMINAL_BACKING[2]);
        assert_eq!(space.translate_user(USER_VIDEO), None);
        space.enable_user_video();
        assert_eq!(space.translate_user(USER_VIDEO + 8), Some(TERMINAL_BACKING[2] + 8));
        space.retarget_video(VIDEO_PHYS);
        assert_eq!(space.translate_user(USER_VIDEO), Some(VIDEO_PHYS));
    }

    #[test]
    fn vga_window_keeps_text_page_routing() {
        let mut space = AddressSpace::new();
        space.build_task(1, TERMINAL_BACKING[0]);
        space.enable_vga_window();
        assert_eq!(space.translate_user(USER_VIDEO), Some(VGA_WINDOW_START));
        assert_eq!(
            space.translate_user(USER_VIDEO + 0x18000),
            Some(TERMINAL_BACKING[0])
        );
        space.retarget_video(VIDEO_PHYS);
        assert_eq!(space.translate_user(USER_VIDEO + 0x18000), Some(VIDEO_PHYS));
    }

    #[test]
    fn thread_space_copies_owner_and_adds_stack() {
        let mut arena = MemoryArena::new();
        arena.space_mut(2).build_task(2, VIDEO_PHYS);
        arena.space_mut(2).enable_user_video();
        arena.fork_thread_space(2, 5);

        let thread = arena.space(5);
        assert_eq!(thread.translate_user(USER_BASE), Some(task_frame(2)));
        assert_eq!(thread.translate_user(THREAD_STACK_BASE), Some(task_frame(5)));
        assert_eq!(thread.translate_user(USER_VIDEO), Some(VIDEO_PHYS));
        assert_eq!(
            thread.directory().get(USER_VIDEO_DIR_INDEX).phys_addr(),
            Some(thread.user_video.base_addr() & 0xFFFF_F000)
        );
        assert_eq!(arena.space(2).translate_user(THREAD_STACK_BASE), None);
    }
}
