//! # i386 硬件实现
//!
//! [`X86Hal`] 用内联汇编实现 [`Hal`]。IDT 与 GDT 的建立、各向量入口桩属于
//! 启动代码，不在本模块内：入口桩按 [`TrapFrame`] 的字段顺序压栈后调用
//! 集成方的 `extern "C"` 函数，该函数调用 [`crate::Kernel::handle_trap`]，
//! 返回后以 [`enter_frame`] 弹出（可能已被替换的）陷阱帧。
//!
//! ## 物理内存访问
//!
//! 内核只恒等映射低 8MB，任务私有帧不在内核视野内。物理访问通过一个临时
//! 4MB 窗口（目录项 [`PHYS_WINDOW_DIR_INDEX`]）完成：写入当前目录、`invlpg`、
//! 拷贝、再撤销。

use core::arch::asm;

use crate::config::{KERNEL_DS, LARGE_PAGE_SIZE, PIT_DIVISOR};
use crate::hal::Hal;
use crate::mm::{PageDirectory, PageEntry};
use crate::trap::TrapFrame;

/// 物理访问窗口所在的目录项（0x0080_0000..0x00C0_0000）
pub const PHYS_WINDOW_DIR_INDEX: usize = 2;

const PIC_MASTER: u16 = 0x20;
const PIC_SLAVE: u16 = 0xA0;
const PIC_EOI: u8 = 0x60;
const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
const EFLAGS_IF: u32 = 1 << 9;

/// 32 位任务状态段，末尾紧跟 I/O 权限位图
#[repr(C, packed)]
pub struct TaskStateSegment {
    pub link: u32,
    pub esp0: u32,
    pub ss0: u32,
    _unused: [u32; 21],
    pub ldt: u32,
    pub trap: u16,
    pub iomap_base: u16,
    /// 置位表示禁止访问对应端口
    pub io_bitmap: [u8; 8192],
    io_end: u8,
}

impl TaskStateSegment {
    pub const fn new() -> Self {
        Self {
            link: 0,
            esp0: 0,
            ss0: KERNEL_DS,
            _unused: [0; 21],
            ldt: 0,
            trap: 0,
            iomap_base: 104,
            io_bitmap: [0xFF; 8192],
            io_end: 0xFF,
        }
    }
}

impl Default for TaskStateSegment {
    fn default() -> Self {
        Self::new()
    }
}

pub struct X86Hal {
    tss: &'static mut TaskStateSegment,
}

impl X86Hal {
    /// `tss` 必须是 GDT 中 TSS 描述符所指向的那一个
    pub fn new(tss: &'static mut TaskStateSegment) -> Self {
        Self { tss }
    }

    /// 把物理地址 `addr` 所在的 4MB 帧映射到窗口，返回窗口内的虚拟地址
    fn open_window(&self, addr: usize) -> usize {
        let entry = PageEntry::large(addr & !(LARGE_PAGE_SIZE - 1), true, false, false);
        let window = PHYS_WINDOW_DIR_INDEX * LARGE_PAGE_SIZE;
        unsafe {
            let directory = read_cr3() as *mut u32;
            directory.add(PHYS_WINDOW_DIR_INDEX).write_volatile(entry.pack());
            asm!("invlpg [{}]", in(reg) window, options(nostack, preserves_flags));
        }
        window + addr % LARGE_PAGE_SIZE
    }

    fn close_window(&self) {
        let window = PHYS_WINDOW_DIR_INDEX * LARGE_PAGE_SIZE;
        unsafe {
            let directory = read_cr3() as *mut u32;
            directory.add(PHYS_WINDOW_DIR_INDEX).write_volatile(0);
            asm!("invlpg [{}]", in(reg) window, options(nostack, preserves_flags));
        }
    }

    /// 对 `[addr, addr + len)` 逐个 4MB 帧调用 `f(窗口地址, 片段偏移, 片段长度)`
    fn with_phys(&self, addr: usize, len: usize, mut f: impl FnMut(usize, usize, usize)) {
        let mut done = 0;
        while done < len {
            let cur = addr + done;
            let chunk = (LARGE_PAGE_SIZE - cur % LARGE_PAGE_SIZE).min(len - done);
            let va = self.open_window(cur);
            f(va, done, chunk);
            done += chunk;
        }
        self.close_window();
    }
}

impl Hal for X86Hal {
    fn load_page_directory(&mut self, directory: &PageDirectory) {
        unsafe {
            asm!("mov cr3, {}", in(reg) directory.base_addr(), options(nostack, preserves_flags));
        }
    }

    fn set_kernel_stack(&mut self, esp0: u32) {
        self.tss.esp0 = esp0;
        self.tss.ss0 = KERNEL_DS;
    }

    fn interrupts_enabled(&self) -> bool {
        let flags: u32;
        unsafe {
            asm!("pushfd", "pop {}", out(reg) flags, options(preserves_flags));
        }
        flags & EFLAGS_IF != 0
    }

    fn disable_interrupts(&mut self) {
        unsafe { asm!("cli", options(nomem, nostack)) }
    }

    fn enable_interrupts(&mut self) {
        unsafe { asm!("sti", options(nomem, nostack)) }
    }

    fn restart_timer(&mut self) {
        unsafe {
            outb(PIT_COMMAND, 0x34);
            outb(PIT_CHANNEL0, (PIT_DIVISOR & 0xFF) as u8);
            outb(PIT_CHANNEL0, (PIT_DIVISOR >> 8) as u8);
        }
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        unsafe {
            if irq >= 8 {
                outb(PIC_SLAVE, PIC_EOI | (irq - 8));
                outb(PIC_MASTER, PIC_EOI | 2);
            } else {
                outb(PIC_MASTER, PIC_EOI | irq);
            }
        }
    }

    fn set_io_permission(&mut self, from: u16, num: u32, enable: bool) {
        for port in from as u32..from as u32 + num {
            let byte = &mut self.tss.io_bitmap[(port / 8) as usize];
            let bit = 1u8 << (port % 8);
            if enable {
                *byte &= !bit;
            } else {
                *byte |= bit;
            }
        }
    }

    fn halt_forever(&mut self) -> ! {
        loop {
            unsafe { asm!("cli", "hlt", options(nomem, nostack)) }
        }
    }

    fn read_phys(&self, addr: usize, buf: &mut [u8]) {
        let len = buf.len();
        self.with_phys(addr, len, |va, off, n| unsafe {
            core::ptr::copy_nonoverlapping(va as *const u8, buf[off..].as_mut_ptr(), n);
        });
    }

    fn write_phys(&mut self, addr: usize, data: &[u8]) {
        self.with_phys(addr, data.len(), |va, off, n| unsafe {
            core::ptr::copy_nonoverlapping(data[off..].as_ptr(), va as *mut u8, n);
        });
    }

    fn fill_phys(&mut self, addr: usize, value: u8, len: usize) {
        self.with_phys(addr, len, |va, _, n| unsafe {
            core::ptr::write_bytes(va as *mut u8, value, n);
        });
    }
}

/// 弹出陷阱帧并 `iretd`
///
/// 进入用户态与从信号处理返回都经由这里；目标为用户态时 CPU 同时恢复
/// `esp`/`ss`。
///
/// ## Safety
///
/// `frame` 必须位于当前内核栈上，且描述一个合法的返回上下文。
pub unsafe fn enter_frame(frame: *const TrapFrame) -> ! {
    unsafe {
        asm!(
            "mov esp, {0}",
            "pop ebx",
            "pop ecx",
            "pop edx",
            "pop esi",
            "pop edi",
            "pop ebp",
            "pop eax",
            "pop ds",
            "pop es",
            "pop fs",
            "add esp, 8",
            "iretd",
            in(reg) frame,
            options(noreturn),
        )
    }
}

unsafe fn read_cr3() -> usize {
    let cr3: usize;
    unsafe { asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags)) };
    cr3
}

#[inline(always)]
unsafe fn outb(port: u16, val: u8) {
    unsafe { asm!("out dx, al", in("dx") port, in("al") val, options(nostack, preserves_flags)) };
}
