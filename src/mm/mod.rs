//! # 内存管理模块
//!
//! - [`page_table`] - 页表项的打包/解包，页目录与页表结构
//! - [`memory_set`] - 每槽位的地址空间与静态预留的地址空间池
//! - [`user`] - 经由任务页表访问用户内存

pub mod memory_set;
pub mod page_table;
pub mod user;

pub use memory_set::{
    setup_kernel_mem, setup_task_mem, setup_vid, AddressSpace, MemoryArena, Privilege,
};
pub use page_table::{PageDirectory, PageEntry, PageFlags, PageTable};
pub use user::{
    check_user_range, copy_from_user, copy_to_user, read_user_cstr, write_user_u32, UserStack,
};
