//! # 内核配置常量
//!
//! 定义内核使用的各类配置参数：任务表容量、虚拟/物理内存布局、段选择子、
//! 定时器与 RTC 参数、程序镜像格式等。
//!
//! ## 虚拟地址布局（每个任务）
//!
//! ```text
//! 0x0000_0000 ┌──────────────────────┐ 目录项 0：4KB 页表（内核视频映射）
//!             │  video / backing     │
//! 0x0040_0000 ├──────────────────────┤ 目录项 1：4MB 全局大页（内核镜像）
//!             │  kernel              │
//! 0x0080_0000 ├──────────────────────┤
//!             │        ...           │
//! 0x0800_0000 ├──────────────────────┤ 目录项 32：4MB 大页 -> 物理 (slot+1)*4MB
//!             │  program image       │ 0x0804_8000 入口镜像
//!             │  user stack  ▼       │ 0x083F_FFFC 用户栈顶
//! 0x0840_0000 ├──────────────────────┤ 目录项 33：4KB 页表（用户视频别名）
//! 0x0880_0000 ├──────────────────────┤ 目录项 34：线程私有栈（4MB 大页）
//!             │  thread stack ▼      │ 0x08BF_FFFC
//! 0x08C0_0000 └──────────────────────┘
//! ```

/// 任务表容量（含 0 号空闲任务）
pub const NUM_TASKS: usize = 10;

/// 虚拟终端数量
pub const NUM_TERMINALS: usize = 3;

/// 每个任务的文件描述符数量，0/1 固定为 stdin/stdout
pub const MAX_FILES: usize = 8;

/// 信号种类数量
pub const NUM_SIGNALS: usize = 5;

/// 页面大小 (4KB)
pub const PAGE_SIZE: usize = 0x1000;

/// 大页大小 (4MB)
pub const LARGE_PAGE_SIZE: usize = 0x40_0000;

/// 每张页目录/页表的表项数
pub const ENTRIES_PER_TABLE: usize = 1024;

/// 内核镜像的虚拟/物理起始地址
pub const KERNEL_START: usize = 0x40_0000;
pub const KERNEL_DIR_INDEX: usize = KERNEL_START / LARGE_PAGE_SIZE;

/// 内核侧视频映射所在的目录项
pub const KERNEL_VIDEO_DIR_INDEX: usize = 0;

/// 用户程序区域
pub const USER_BASE: usize = 0x0800_0000;
pub const USER_DIR_INDEX: usize = USER_BASE / LARGE_PAGE_SIZE;

/// 程序镜像加载地址，以及它在任务私有大页中的偏移
pub const PROGRAM_IMAGE: usize = 0x0804_8000;
pub const PROGRAM_IMAGE_OFFSET: usize = PROGRAM_IMAGE - USER_BASE;

/// 用户栈顶
pub const USER_STACK_TOP: usize = USER_BASE + LARGE_PAGE_SIZE - 4;

/// 用户视频别名（VIDMAP 返回的地址）
pub const USER_VIDEO: usize = 0x0840_0000;
pub const USER_VIDEO_DIR_INDEX: usize = USER_VIDEO / LARGE_PAGE_SIZE;

/// 线程私有栈区域
pub const THREAD_STACK_BASE: usize = 0x0880_0000;
pub const THREAD_STACK_DIR_INDEX: usize = THREAD_STACK_BASE / LARGE_PAGE_SIZE;
pub const THREAD_STACK_TOP: usize = THREAD_STACK_BASE + LARGE_PAGE_SIZE - 4;

/// 文本模式显存物理地址
pub const VIDEO_PHYS: usize = 0xB8000;

/// 各终端的后台显存缓冲区（终端不在前台时，任务的视频别名指向这里）
pub const TERMINAL_BACKING: [usize; NUM_TERMINALS] = [0xB9000, 0xBA000, 0xBB000];

/// VGA 图形窗口（VIDMAP_ALL）
pub const VGA_WINDOW_START: usize = 0xA0000;
pub const VGA_WINDOW_PAGES: usize = 32;

/// 段选择子
pub const KERNEL_CS: u32 = 0x10;
pub const KERNEL_DS: u32 = 0x18;
pub const USER_CS: u32 = 0x23;
pub const USER_DS: u32 = 0x2B;

/// 内核栈
///
/// 每个槽位 8KB，从内核大页末尾向下排列。
pub const KERNEL_STACK_SIZE: usize = 0x2000;
pub const KERNEL_STACKS_END: usize = 0x80_0000;

/// 槽位 `slot` 独占的物理大页
///
/// 任务表下标与物理帧一一对应：槽位 *s* 使用第 *s+1* 个 4MB 帧。
/// 0 号空闲任务不使用私有大页（第 1 个帧即内核镜像本身）。
pub const fn task_frame(slot: usize) -> usize {
    (slot + 1) * LARGE_PAGE_SIZE
}

/// 槽位 `slot` 的内核栈顶（写入 TSS.esp0）
pub const fn kernel_stack_top(slot: usize) -> u32 {
    (KERNEL_STACKS_END - slot * KERNEL_STACK_SIZE - 4) as u32
}

/// 程序镜像魔数
pub const IMAGE_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// 入口地址在镜像头中的偏移（32 位小端）
pub const IMAGE_ENTRY_OFFSET: usize = 24;

/// 镜像最大长度（私有大页中镜像之后的全部空间）
pub const MAX_IMAGE_SIZE: usize = LARGE_PAGE_SIZE - PROGRAM_IMAGE_OFFSET;

/// 文件名最大长度
pub const FILENAME_LEN: usize = 32;

/// 参数字符串最大长度
pub const MAX_ARGS: usize = 128;

/// 命令行最大长度（程序名 + 空格 + 参数）
pub const MAX_COMMAND: usize = FILENAME_LEN + 1 + MAX_ARGS;

/// 内核主动终止任务时报告的状态
pub const ABORT_STATUS: u32 = 256;

/// 每个终端的顶层程序
pub const SHELL: &[u8] = b"shell";

/// PIT 分频值，约 15ms 一次时钟中断
pub const PIT_DIVISOR: u16 = 17898;

/// 每隔多少个调度 tick 广播一次 ALARM（约 10 秒）
pub const ALARM_TICKS: u32 = 667;

/// RTC 硬件频率与虚拟化后允许的频率范围
pub const RTC_BASE_FREQ: u32 = 1024;
pub const RTC_MIN_FREQ: u32 = 2;
pub const RTC_DEFAULT_FREQ: u32 = 2;

/// 中断线数量，以及每条中断线可挂接的处理程序数
pub const NR_IRQS: usize = 16;
pub const IRQ_CHAIN: usize = 4;

pub const TIMER_IRQ: u8 = 0;
pub const KEYBOARD_IRQ: u8 = 1;
pub const RTC_IRQ: u8 = 8;

/// 中断向量
pub const EXCEPTION_VECTORS: u32 = 32;
pub const IRQ_BASE_VECTOR: u32 = 0x20;
pub const SYSCALL_VECTOR: u32 = 0x80;

/// `int 0x80` 指令长度，重启系统调用时回退 EIP
pub const SYSCALL_INSN_LEN: u32 = 2;

/// I/O 端口空间大小
pub const IO_PORT_SPACE: u32 = 0x1_0000;

/// 内核与用户之间单次拷贝的缓冲区大小
pub const IO_CHUNK: usize = 1024;
