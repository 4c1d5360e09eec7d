//! # 调度器
//!
//! 时钟中断驱动的时间片轮转。每个 tick：
//!
//! 1. 计数，每 [`ALARM_TICKS`] 个 tick 向所有任务广播 `ALARM`
//! 2. 把被打断的上下文保存进当前任务
//! 3. 选择下一个任务：
//!    - 若有待处理的前台终端切换请求，直接运行该终端的前台任务
//!    - 否则从上次调度的槽位之后轮转扫描，只选 RUNNING 的非空闲任务
//!    - 都没有时回落到 0 号空闲任务
//! 4. 装载下一个任务的地址空间与内核栈，投递待决信号，恢复其上下文
//!
//! 阻塞型系统调用通过 [`Kernel::reschedule`] 主动让出 CPU，它与时钟中断
//! 走同一条切换路径。

use log::trace;

use crate::config::{ALARM_TICKS, NUM_TASKS};
use crate::drivers::Devices;
use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::task::signal::Signal;
use crate::task::task::TaskStatus;
use crate::trap::TrapFrame;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    /// 上一次调度到的槽位
    pub last: usize,
    pub ticks: u64,
    /// 距下一次 ALARM 广播的 tick 数
    pub alarm_countdown: u32,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            last: 0,
            ticks: 0,
            alarm_countdown: ALARM_TICKS,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hal, D: Devices> Kernel<H, D> {
    /// 时钟中断
    pub(crate) fn timer_tick(&mut self, frame: &mut TrapFrame) {
        self.sched.ticks += 1;
        self.sched.alarm_countdown -= 1;
        if self.sched.alarm_countdown == 0 {
            self.sched.alarm_countdown = ALARM_TICKS;
            self.broadcast_alarm();
        }
        self.switch_task(frame);
    }

    /// 主动让出 CPU
    ///
    /// 重新装载 PIT，使下一个任务获得完整的时间片，然后走与时钟中断相同的
    /// 切换路径。
    pub fn reschedule(&mut self, frame: &mut TrapFrame) {
        self.hal.restart_timer();
        self.switch_task(frame);
    }

    fn broadcast_alarm(&mut self) {
        trace!("alarm broadcast at tick {}", self.sched.ticks);
        for slot in 1..NUM_TASKS {
            self.raise_signal(slot, Signal::Alarm);
        }
    }

    fn switch_task(&mut self, frame: &mut TrapFrame) {
        let slot = self.tasks.current_slot();
        if let Some(task) = self.tasks.get_mut(slot) {
            task.context = *frame;
        }
        let next = self.pick_next();
        trace!("switch {} -> {}", slot, next);
        self.resume(next, frame);
    }

    fn pick_next(&mut self) -> usize {
        if self.terminals.pending_switch {
            self.terminals.pending_switch = false;
            let fg = self.terminals.foreground[self.terminals.active];
            if fg != 0 && self.tasks.status(fg) == TaskStatus::Running {
                return fg;
            }
        }
        (1..=NUM_TASKS)
            .map(|i| (self.sched.last + i) % NUM_TASKS)
            .find(|&s| s != 0 && self.tasks.status(s) == TaskStatus::Running)
            .unwrap_or(0)
    }

    /// 让 `slot` 成为当前任务，并把它保存的上下文装入 `frame`
    ///
    /// 装载地址空间与内核栈后投递待决信号，这是任务的恢复点。
    pub(crate) fn resume(&mut self, slot: usize, frame: &mut TrapFrame) {
        let Some(task) = self.tasks.get(slot) else {
            return;
        };
        let (context, kernel_stack) = (task.context, task.kernel_stack);
        self.tasks.set_current(slot);
        self.sched.last = slot;
        self.switch_page_directory(slot);
        self.hal.set_kernel_stack(kernel_stack);
        *frame = context;
        crate::log::note_schedule(self.sched.ticks, slot);
        self.deliver_signals(frame);
    }

    /// 装载槽位 `slot` 的页目录，这是唯一改变活动地址空间的操作
    pub(crate) fn switch_page_directory(&mut self, slot: usize) {
        let space = self.memory.space_mut(slot);
        space.link_tables();
        self.hal.load_page_directory(space.directory());
    }
}
