//! # 信号子系统
//!
//! 引发信号只是在目标任务的待决集合中置位；真正的处理发生在任务下一次被
//! 恢复执行时（调度切换到它，或它从异常返回）。
//!
//! ## 信号与默认动作
//!
//! | 编号 | 信号 | 默认动作 |
//! |------|------|----------|
//! | 0 | `DIV_ZERO`  | 终止（状态 256） |
//! | 1 | `SEGFAULT`  | 终止（状态 256） |
//! | 2 | `INTERRUPT` | 终止（状态 256） |
//! | 3 | `ALARM`     | 忽略 |
//! | 4 | `USER1`     | 忽略 |
//!
//! ## 用户处理程序的栈帧
//!
//! ```text
//! 高地址  原 user esp
//!         ┌──────────────────────────────┐
//!         │ trampoline: mov eax,10       │ 8 字节
//!         │             int 0x80 ; nop   │
//!         ├──────────────────────────────┤ <- SignalContext.addr
//!         │ 被打断时的 TrapFrame（68 字节）│
//!         ├──────────────────────────────┤
//!         │ signum                       │ 处理程序的参数
//!         ├──────────────────────────────┤
//!         │ 返回地址 = trampoline         │ <- 处理程序入口时的 esp
//! 低地址  └──────────────────────────────┘
//! ```
//!
//! 处理程序返回后执行 trampoline，经 SIGRETURN 把保存的帧原样恢复。
//! 处理程序执行期间不会再投递新的信号。

use bitflags::bitflags;
use log::{debug, info, trace, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::config::{ABORT_STATUS, NUM_SIGNALS, USER_CS, USER_DS};
use crate::drivers::Devices;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::mm::{copy_from_user, UserStack};
use crate::trap::{TrapFrame, TRAP_FRAME_SIZE};

/// `mov eax, 10 ; int 0x80 ; nop`
pub const SIGRETURN_TRAMPOLINE: [u8; 8] = [0xB8, 0x0A, 0x00, 0x00, 0x00, 0xCD, 0x80, 0x90];

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum Signal {
    DivZero = 0,
    Segfault = 1,
    Interrupt = 2,
    Alarm = 3,
    User1 = 4,
}

bitflags! {
    /// 待决信号集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SignalFlags: u32 {
        const DIV_ZERO = 1 << 0;
        const SEGFAULT = 1 << 1;
        const INTERRUPT = 1 << 2;
        const ALARM = 1 << 3;
        const USER1 = 1 << 4;
    }
}

/// 未注册处理程序时的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Ignore,
}

impl Signal {
    /// 按投递优先级排列
    pub const ALL: [Signal; NUM_SIGNALS] = [
        Signal::DivZero,
        Signal::Segfault,
        Signal::Interrupt,
        Signal::Alarm,
        Signal::User1,
    ];

    pub fn flag(self) -> SignalFlags {
        SignalFlags::from_bits_truncate(1 << u32::from(self))
    }

    pub fn default_action(self) -> DefaultAction {
        match self {
            Signal::DivZero | Signal::Segfault | Signal::Interrupt => DefaultAction::Terminate,
            Signal::Alarm | Signal::User1 => DefaultAction::Ignore,
        }
    }
}

/// 进入处理程序前被打断的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalContext {
    /// 保存在用户栈上的 TrapFrame 地址
    pub addr: u32,
    /// 被打断的上下文是否处于用户态
    pub from_user: bool,
}

/// 每个任务的信号状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalState {
    pub pending: SignalFlags,
    pub handlers: [Option<u32>; NUM_SIGNALS],
    pub in_handler: bool,
    pub saved: Option<SignalContext>,
}

impl SignalState {
    pub const fn new() -> Self {
        Self {
            pending: SignalFlags::empty(),
            handlers: [None; NUM_SIGNALS],
            in_handler: false,
            saved: None,
        }
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 在任务 `slot` 上引发信号
    pub fn raise_signal(&mut self, slot: usize, signal: Signal) {
        if slot == 0 {
            return;
        }
        if let Some(task) = self.tasks.get_mut(slot) {
            trace!("raise {:?} on task {}", signal, slot);
            task.signals.pending.insert(signal.flag());
        }
    }

    /// 在当前任务恢复执行前处理待决信号
    ///
    /// 按编号顺序处理：被忽略的信号直接清除，遇到需要终止或需要进入用户
    /// 处理程序的信号后停止。`frame` 是当前任务即将恢复的上下文。
    pub(crate) fn deliver_signals(&mut self, frame: &mut TrapFrame) {
        let slot = self.tasks.current_slot();
        if slot == 0 {
            return;
        }
        for signal in Signal::ALL {
            let Some(task) = self.tasks.get_mut(slot) else {
                return;
            };
            if task.signals.in_handler {
                return;
            }
            if !task.signals.pending.contains(signal.flag()) {
                continue;
            }
            task.signals.pending.remove(signal.flag());
            let handler = task.signals.handlers[u32::from(signal) as usize];
            match handler {
                Some(handler) => {
                    if let Err(e) = self.enter_handler(slot, signal, handler, frame) {
                        warn!("task {} cannot take {:?}: {}", slot, signal, e);
                        self.terminate(frame, ABORT_STATUS);
                    }
                    return;
                }
                None => match signal.default_action() {
                    DefaultAction::Ignore => trace!("task {} ignores {:?}", slot, signal),
                    DefaultAction::Terminate => {
                        info!("task {} killed by {:?}", slot, signal);
                        self.terminate(frame, ABORT_STATUS);
                        return;
                    }
                },
            }
        }
    }

    /// 在用户栈上构造信号帧并转入处理程序
    fn enter_handler(
        &mut self,
        slot: usize,
        signal: Signal,
        handler: u32,
        frame: &mut TrapFrame,
    ) -> KernelResult<()> {
        let from_user = frame.from_user();
        let user_esp = if from_user {
            frame.esp
        } else {
            self.tasks.get(slot).ok_or(KernelError::NotFound)?.user_esp
        };

        let space = self.memory.space(slot);
        let mut stack = UserStack::new(user_esp);
        let trampoline = stack.push(&mut self.hal, space, &SIGRETURN_TRAMPOLINE)?;
        let saved = stack.push(&mut self.hal, space, &frame.to_bytes())?;
        stack.push_u32(&mut self.hal, space, signal.into())?;
        stack.push_u32(&mut self.hal, space, trampoline)?;

        let task = self.tasks.get_mut(slot).ok_or(KernelError::NotFound)?;
        task.signals.in_handler = true;
        task.signals.saved = Some(SignalContext {
            addr: saved,
            from_user,
        });
        debug!(
            "task {} enters {:?} handler {:#x}, esp {:#x}",
            slot,
            signal,
            handler,
            stack.esp()
        );
        *frame = TrapFrame::user_entry(handler, stack.esp());
        Ok(())
    }

    /// 从信号处理程序返回：把保存的上下文原样恢复到 `frame`
    ///
    /// 保存的上下文若原本来自用户态，却声称返回到非用户段，视为段错误。
    pub(crate) fn restore_signal_context(&mut self, frame: &mut TrapFrame) -> KernelResult<()> {
        let slot = self.tasks.current_slot();
        let task = self.tasks.current_mut()?;
        let saved = task.signals.saved.take().ok_or(KernelError::InvalidArgument)?;
        task.signals.in_handler = false;

        let mut raw = [0u8; TRAP_FRAME_SIZE];
        if let Err(e) = copy_from_user(&self.hal, self.memory.space(slot), saved.addr, &mut raw) {
            self.raise_signal(slot, Signal::Segfault);
            return Err(e);
        }
        let restored = TrapFrame::from_bytes(&raw);
        if saved.from_user && (restored.cs != USER_CS || restored.ss != USER_DS) {
            warn!("task {} forged a privileged signal context", slot);
            self.raise_signal(slot, Signal::Segfault);
            return Err(KernelError::FaultSignal);
        }
        *frame = restored;
        Ok(())
    }
}
