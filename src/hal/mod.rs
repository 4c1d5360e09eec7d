//! # 硬件抽象层
//!
//! 内核核心只通过 [`Hal`] 接触 CPU 与芯片组：CR3、TSS、EFLAGS.IF、PIT、
//! PIC 以及物理内存。真实硬件上使用 [`x86::X86Hal`]，主机测试中使用
//! 记录调用的模拟实现。

#[cfg(target_arch = "x86")]
pub mod x86;

use crate::mm::PageDirectory;

pub trait Hal {
    /// 装载页目录基址（CR3）。全局页不会被刷新
    fn load_page_directory(&mut self, directory: &PageDirectory);

    /// 设置从用户态陷入时使用的内核栈（TSS.esp0）
    fn set_kernel_stack(&mut self, esp0: u32);

    fn interrupts_enabled(&self) -> bool;
    fn disable_interrupts(&mut self);
    fn enable_interrupts(&mut self);

    /// 重新装载 PIT 计数，使下一次时钟中断从现在起算
    fn restart_timer(&mut self);

    /// 向 PIC 发送中断结束
    fn end_of_interrupt(&mut self, irq: u8);

    /// 修改当前任务的 I/O 端口权限位图
    fn set_io_permission(&mut self, from: u16, num: u32, enable: bool);

    /// 永久停机
    fn halt_forever(&mut self) -> !;

    fn read_phys(&self, addr: usize, buf: &mut [u8]);
    fn write_phys(&mut self, addr: usize, data: &[u8]);
    fn fill_phys(&mut self, addr: usize, value: u8, len: usize);
}
