//! # IRQ 注册表
//!
//! 每条中断线一个固定长度的处理链。驱动登记处理程序与一个不透明的设备号，
//! 分发时按登记顺序依次调用，然后向 PIC 发送 EOI。

use crate::config::{IRQ_CHAIN, NR_IRQS};
use crate::error::{KernelError, KernelResult};

/// 中断处理程序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqHandler {
    /// 时钟中断：调度器
    Scheduler,
    /// RTC 中断：推进每个任务的虚拟 RTC 计数
    RtcPacing,
    /// 外部驱动，参数为登记时的设备号
    External(fn(u32)),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqAction {
    pub handler: IrqHandler,
    pub dev_id: u32,
}

pub type IrqChain = [Option<IrqAction>; IRQ_CHAIN];

pub struct IrqTable {
    lines: [IrqChain; NR_IRQS],
}

impl IrqTable {
    pub const fn new() -> Self {
        Self {
            lines: [[None; IRQ_CHAIN]; NR_IRQS],
        }
    }

    /// 在 `irq` 的处理链末尾登记一个处理程序
    pub fn request(&mut self, irq: u8, handler: IrqHandler, dev_id: u32) -> KernelResult<()> {
        let chain = self
            .lines
            .get_mut(irq as usize)
            .ok_or(KernelError::InvalidArgument)?;
        let slot = chain
            .iter_mut()
            .find(|a| a.is_none())
            .ok_or(KernelError::ResourceExhausted)?;
        *slot = Some(IrqAction { handler, dev_id });
        Ok(())
    }

    /// 注销 `irq` 上设备号为 `dev_id` 的处理程序，后面的处理程序前移
    pub fn free(&mut self, irq: u8, dev_id: u32) -> KernelResult<()> {
        let chain = self
            .lines
            .get_mut(irq as usize)
            .ok_or(KernelError::InvalidArgument)?;
        let pos = chain
            .iter()
            .position(|a| matches!(a, Some(a) if a.dev_id == dev_id))
            .ok_or(KernelError::NotFound)?;
        chain[pos..].rotate_left(1);
        chain[IRQ_CHAIN - 1] = None;
        Ok(())
    }

    /// `irq` 的处理链副本
    pub fn chain(&self, irq: u8) -> IrqChain {
        self.lines
            .get(irq as usize)
            .copied()
            .unwrap_or([None; IRQ_CHAIN])
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}
