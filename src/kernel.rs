//! # 内核状态
//!
//! [`Kernel`] 拥有任务表、地址空间池、调度器、终端表与 IRQ 表，并持有硬件
//! 与外部驱动的实现。各子系统以 `impl Kernel` 的形式分布在 [`crate::task`]、
//! [`crate::trap`] 与 [`crate::syscall`] 中。
//!
//! ## 启动顺序
//!
//! ```text
//! Kernel::new(hal, devices)      0 号任务的地址空间、时钟与 RTC 的 IRQ 登记
//!        │
//!        ▼
//! kernel.start_shells(&mut frame)  每个终端一个 shell，frame 变为终端 0 的 shell
//!        │
//!        ▼
//! enter_frame(&frame)            进入用户态，此后只经由 handle_trap 进入内核
//! ```

use log::info;

use crate::config::{kernel_stack_top, NUM_TERMINALS, RTC_IRQ, SHELL, TIMER_IRQ};
use crate::drivers::Devices;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;
use crate::mm::MemoryArena;
use crate::task::{Scheduler, TaskControlBlock, TaskStatus, TaskTable, Terminals};
use crate::trap::{IrqHandler, IrqTable, TrapFrame};

pub struct Kernel<H: Hal, D: Devices> {
    pub(crate) hal: H,
    pub(crate) devices: D,
    pub(crate) tasks: TaskTable,
    pub(crate) memory: MemoryArena,
    pub(crate) sched: Scheduler,
    pub(crate) terminals: Terminals,
    pub(crate) irqs: IrqTable,
    /// 第一批 shell 已启动
    pub(crate) booted: bool,
}

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 建立只含 0 号空闲任务的内核
    pub fn new(hal: H, devices: D) -> Self {
        crate::log::init();
        let mut kernel = Self {
            hal,
            devices,
            tasks: TaskTable::create_init(),
            memory: MemoryArena::new(),
            sched: Scheduler::new(),
            terminals: Terminals::new(),
            irqs: IrqTable::new(),
            booted: false,
        };
        kernel.memory.space_mut(0).build_kernel();
        // 两条中断线此时都是空的，登记不会失败
        let _ = kernel.irqs.request(TIMER_IRQ, IrqHandler::Scheduler, 0);
        let _ = kernel.irqs.request(RTC_IRQ, IrqHandler::RtcPacing, 0);
        kernel.switch_page_directory(0);
        kernel.hal.set_kernel_stack(kernel_stack_top(0));
        info!("kernel core initialized");
        kernel
    }

    /// 在每个终端上启动顶层 shell
    ///
    /// `frame` 是引导代码当前的上下文，保存为 0 号任务的恢复点；返回后
    /// `frame` 是终端 0 的 shell 的入口帧。
    pub fn start_shells(&mut self, frame: &mut TrapFrame) -> KernelResult<()> {
        if self.booted {
            return Err(KernelError::InvalidArgument);
        }
        if let Some(idle) = self.tasks.get_mut(0) {
            idle.context = *frame;
        }
        for terminal in 0..NUM_TERMINALS {
            self.spawn(0, terminal, SHELL)?;
        }
        self.booted = true;
        let first = self.terminals.foreground[self.terminals.active];
        self.resume(first, frame);
        Ok(())
    }

    /// 关中断执行 `f`，结束后恢复原来的中断状态
    pub fn critical_section<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let enabled = self.hal.interrupts_enabled();
        self.hal.disable_interrupts();
        let result = f(self);
        if enabled {
            self.hal.enable_interrupts();
        }
        result
    }

    /// 驱动登记中断处理程序
    pub fn request_irq(&mut self, irq: u8, handler: fn(u32), dev_id: u32) -> KernelResult<()> {
        self.irqs.request(irq, IrqHandler::External(handler), dev_id)
    }

    /// 驱动注销中断处理程序
    pub fn free_irq(&mut self, irq: u8, dev_id: u32) -> KernelResult<()> {
        self.irqs.free(irq, dev_id)
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut D {
        &mut self.devices
    }

    pub fn current_slot(&self) -> usize {
        self.tasks.current_slot()
    }

    pub fn task(&self, slot: usize) -> Option<&TaskControlBlock> {
        self.tasks.get(slot)
    }

    pub fn status(&self, slot: usize) -> TaskStatus {
        self.tasks.status(slot)
    }

    /// 终端 `terminal` 的前台任务，终端号越界时为 `None`
    pub fn foreground(&self, terminal: usize) -> Option<usize> {
        self.terminals.foreground.get(terminal).copied()
    }

    pub fn active_terminal(&self) -> usize {
        self.terminals.active
    }

    /// 调度器 tick 计数
    pub fn ticks(&self) -> u64 {
        self.sched.ticks
    }

    /// 按任务 `slot` 的页表翻译用户地址
    pub fn translate_user(&self, slot: usize, va: usize) -> Option<usize> {
        self.memory.space(slot).translate_user(va)
    }
}
