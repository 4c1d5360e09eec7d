//! # 终端与前台任务
//!
//! 每个终端同一时刻只有一个前台任务（该终端进程链最深处的子进程）。
//! 只有活动终端上的任务的视频别名指向真实显存，其余终端的任务写入各自的
//! 后台缓冲区。

use log::info;

use crate::config::{NUM_TASKS, NUM_TERMINALS, TERMINAL_BACKING, VIDEO_PHYS};
use crate::drivers::Devices;
use crate::error::{KernelError, KernelResult};
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::task::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminals {
    /// 终端 -> 前台任务槽位
    pub foreground: [usize; NUM_TERMINALS],
    /// 当前显示的终端
    pub active: usize,
    /// 下一次调度应直接运行活动终端的前台任务
    pub pending_switch: bool,
}

impl Terminals {
    pub const fn new() -> Self {
        Self {
            foreground: [0; NUM_TERMINALS],
            active: 0,
            pending_switch: false,
        }
    }

    /// 终端 `terminal` 上的任务的视频别名应指向的物理页
    pub fn video_target(&self, terminal: usize) -> usize {
        if terminal == self.active {
            VIDEO_PHYS
        } else {
            TERMINAL_BACKING[terminal]
        }
    }
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 切换活动终端（由键盘驱动的组合键触发）
    ///
    /// 重新指向新旧两个终端上所有任务的视频别名，并要求下一次调度直接运行
    /// 新终端的前台任务。屏幕内容在显存与后台缓冲区之间的搬运由终端驱动负责。
    pub fn request_terminal_switch(&mut self, terminal: usize) -> KernelResult<()> {
        if terminal >= NUM_TERMINALS {
            return Err(KernelError::InvalidArgument);
        }
        if terminal == self.terminals.active {
            return Ok(());
        }
        self.critical_section(|k| {
            let old = k.terminals.active;
            k.terminals.active = terminal;
            for slot in 1..NUM_TASKS {
                let Some(task) = k.tasks.get(slot) else {
                    continue;
                };
                if task.terminal == old || task.terminal == terminal {
                    let target = k.terminals.video_target(task.terminal);
                    k.memory.space_mut(slot).retarget_video(target);
                }
            }
            k.terminals.pending_switch = true;
            let current = k.tasks.current_slot();
            k.switch_page_directory(current);
            info!("terminal {} -> {}", old, terminal);
        });
        Ok(())
    }

    /// 向活动终端的前台任务发送 `INTERRUPT`（Ctrl+C）
    pub fn interrupt_foreground(&mut self) {
        let fg = self.terminals.foreground[self.terminals.active];
        self.raise_signal(fg, Signal::Interrupt);
    }
}
