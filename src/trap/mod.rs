//! # 陷阱处理
//!
//! 统一入口 [`Kernel::handle_trap`] 按向量号分派：
//!
//! | 向量 | 处理 |
//! |------|------|
//! | 0 | 除零，转换为 `DIV_ZERO` 信号 |
//! | 1..=31 | 其他 CPU 异常，转换为 `SEGFAULT` 信号 |
//! | 0x20..0x30 | 外部中断，沿 [`IrqTable`] 的处理链分发后发送 EOI |
//! | 0x80 | 系统调用 |
//!
//! 异常在任务从该异常返回之前投递对应信号；处理程序内部的异常直接终止任务。
//! 尚无任务运行或空闲任务本身出错时，没有可以通知的对象，只能停机。

mod context;
mod irq;

pub use context::{EFlags, TrapFrame, TRAP_FRAME_SIZE, TRAP_FRAME_WORDS};
pub use irq::{IrqAction, IrqChain, IrqHandler, IrqTable};

use log::{error, trace, warn};

use crate::config::{
    ABORT_STATUS, EXCEPTION_VECTORS, IRQ_BASE_VECTOR, NR_IRQS, SYSCALL_VECTOR,
};
use crate::drivers::Devices;
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::task::Signal;

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 所有陷阱的入口
    ///
    /// `frame` 是入口桩压入的上下文；返回时桩弹出的是 `frame` 的最新内容，
    /// 它可能已被替换为另一个任务的恢复点。
    pub fn handle_trap(&mut self, frame: &mut TrapFrame) {
        if frame.from_user() {
            if let Some(task) = self.tasks.get_mut(self.tasks.current_slot()) {
                task.user_esp = frame.esp;
            }
        }
        let vector = frame.vector;
        if vector < EXCEPTION_VECTORS {
            self.handle_exception(frame);
        } else if (IRQ_BASE_VECTOR..IRQ_BASE_VECTOR + NR_IRQS as u32).contains(&vector) {
            self.handle_irq(frame, (vector - IRQ_BASE_VECTOR) as u8);
        } else if vector == SYSCALL_VECTOR {
            self.handle_syscall(frame);
        } else {
            warn!("spurious trap vector {:#x}", vector);
        }
    }

    fn handle_exception(&mut self, frame: &mut TrapFrame) {
        let slot = self.tasks.current_slot();
        if !self.booted || slot == 0 {
            error!(
                "exception {} at {:#x} with no task to notify, halting",
                frame.vector, frame.eip
            );
            self.hal.halt_forever();
        }
        let signal = if frame.vector == 0 {
            Signal::DivZero
        } else {
            Signal::Segfault
        };
        warn!(
            "task {} exception {} (error {:#x}) at {:#x} -> {:?}",
            slot, frame.vector, frame.error_code, frame.eip, signal
        );
        // 处理程序内部出错时信号无法投递，重新执行只会再次出错
        if self.tasks.get(slot).is_some_and(|t| t.signals.in_handler) {
            warn!("task {} faults inside its signal handler", slot);
            self.terminate(frame, ABORT_STATUS);
            return;
        }
        self.raise_signal(slot, signal);
        self.deliver_signals(frame);
    }

    fn handle_irq(&mut self, frame: &mut TrapFrame, irq: u8) {
        let mut schedule = false;
        for action in self.irqs.chain(irq).iter().flatten() {
            match action.handler {
                IrqHandler::Scheduler => schedule = true,
                IrqHandler::RtcPacing => self.rtc_interrupt(),
                IrqHandler::External(handler) => handler(action.dev_id),
            }
        }
        self.hal.end_of_interrupt(irq);
        if schedule {
            trace!("timer irq");
            self.timer_tick(frame);
        }
    }

    /// 推进每个等待中的虚拟 RTC
    fn rtc_interrupt(&mut self) {
        for task in self.tasks.iter_mut() {
            task.rtc.on_tick();
        }
    }
}
