//! # 任务表
//!
//! 固定容量的 PCB 数组加上当前任务下标。空槽位即 `EMPTY` 状态。
//! 槽位 0 是永远处于 RUNNING 的空闲任务。

use crate::config::{kernel_stack_top, NUM_TASKS};
use crate::error::{KernelError, KernelResult};
use crate::task::task::{TaskControlBlock, TaskStatus};

pub struct TaskTable {
    slots: [Option<TaskControlBlock>; NUM_TASKS],
    current: usize,
}

impl TaskTable {
    /// 建立只含 0 号空闲任务的任务表
    pub fn create_init() -> Self {
        let mut slots: [Option<TaskControlBlock>; NUM_TASKS] = core::array::from_fn(|_| None);
        slots[0] = Some(TaskControlBlock::new_idle(kernel_stack_top(0)));
        Self { slots, current: 0 }
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, slot: usize) {
        self.current = slot;
    }

    pub fn get(&self, slot: usize) -> Option<&TaskControlBlock> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut TaskControlBlock> {
        self.slots.get_mut(slot)?.as_mut()
    }

    pub fn current(&self) -> KernelResult<&TaskControlBlock> {
        self.get(self.current).ok_or(KernelError::NotFound)
    }

    pub fn current_mut(&mut self) -> KernelResult<&mut TaskControlBlock> {
        let slot = self.current;
        self.get_mut(slot).ok_or(KernelError::NotFound)
    }

    pub fn status(&self, slot: usize) -> TaskStatus {
        self.get(slot).map_or(TaskStatus::Empty, |t| t.status)
    }

    /// 第一个空槽位（不含 0 号）
    pub fn alloc_slot(&self) -> KernelResult<usize> {
        (1..NUM_TASKS)
            .find(|&s| self.slots[s].is_none())
            .ok_or(KernelError::ResourceExhausted)
    }

    pub fn insert(&mut self, slot: usize, tcb: TaskControlBlock) {
        self.slots[slot] = Some(tcb);
    }

    /// 释放槽位，槽位 0 永不释放
    pub fn free(&mut self, slot: usize) -> Option<TaskControlBlock> {
        if slot == 0 {
            return None;
        }
        self.slots.get_mut(slot)?.take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TaskControlBlock)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(s, t)| t.as_ref().map(|t| (s, t)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskControlBlock> {
        self.slots.iter_mut().flatten()
    }

    /// 任务所属的进程：线程返回其所属进程，进程返回自身
    pub fn process_of(&self, slot: usize) -> usize {
        self.get(slot).and_then(|t| t.thread_of).unwrap_or(slot)
    }
}
