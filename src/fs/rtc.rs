//! # 虚拟化 RTC
//!
//! 硬件 RTC 固定以 1024Hz 触发中断。每个任务在 PCB 中保存自己的
//! [`RtcPacing`]：`interval` 是一个虚拟周期包含的硬件 tick 数，
//! `remaining` 是本次等待还差的 tick 数。
//!
//! ```text
//!   read()            RTC IRQ       RTC IRQ             read()
//!     │ armed,          │ remaining    │ remaining        │ remaining == 0
//!     │ remaining=N     │ -= 1         │ -= 1   ...       │ -> 返回 0
//!     ▼                 ▼              ▼                  ▼
//! ```
//!
//! 等待期间 `read` 返回 [`KernelError::WouldBlock`]，任务通过让出 CPU 自旋。

use super::{File, FileContext, FileDescriptor, FileStat};
use crate::config::{RTC_BASE_FREQ, RTC_DEFAULT_FREQ, RTC_MIN_FREQ};
use crate::drivers::DentryKind;
use crate::error::{KernelError, KernelResult};

/// 单个任务的 RTC 节拍状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcPacing {
    pub interval: u32,
    pub remaining: u32,
    pub armed: bool,
}

impl RtcPacing {
    pub const fn new() -> Self {
        Self {
            interval: RTC_BASE_FREQ / RTC_DEFAULT_FREQ,
            remaining: 0,
            armed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// 设置虚拟频率，必须是 [2, 1024] 内的 2 的幂
    pub fn set_frequency(&mut self, freq: u32) -> KernelResult<()> {
        if !freq.is_power_of_two() || !(RTC_MIN_FREQ..=RTC_BASE_FREQ).contains(&freq) {
            return Err(KernelError::InvalidArgument);
        }
        self.interval = RTC_BASE_FREQ / freq;
        Ok(())
    }

    /// 检查一次等待是否完成，第一次调用开始计时
    pub fn poll(&mut self) -> KernelResult<()> {
        if !self.armed {
            self.armed = true;
            self.remaining = self.interval;
            return Err(KernelError::WouldBlock);
        }
        if self.remaining > 0 {
            return Err(KernelError::WouldBlock);
        }
        self.armed = false;
        Ok(())
    }

    /// 硬件 RTC 中断
    pub fn on_tick(&mut self) {
        if self.armed && self.remaining > 0 {
            self.remaining -= 1;
        }
    }
}

impl Default for RtcPacing {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RtcDevice;

impl File for RtcDevice {
    /// 打开时恢复为默认的 2Hz
    fn open(&self, ctx: &mut FileContext<'_>) -> KernelResult<()> {
        ctx.rtc.reset();
        Ok(())
    }

    fn read(
        &self,
        ctx: &mut FileContext<'_>,
        _desc: &mut FileDescriptor,
        _buf: &mut [u8],
    ) -> KernelResult<usize> {
        ctx.rtc.poll()?;
        Ok(0)
    }

    /// 写入 4 字节的频率
    fn write(
        &self,
        ctx: &mut FileContext<'_>,
        _desc: &mut FileDescriptor,
        buf: &[u8],
    ) -> KernelResult<usize> {
        let raw: [u8; 4] = buf.try_into().map_err(|_| KernelError::InvalidArgument)?;
        ctx.rtc.set_frequency(u32::from_le_bytes(raw))?;
        Ok(0)
    }

    fn stat(&self, _ctx: &mut FileContext<'_>, _desc: &FileDescriptor) -> KernelResult<FileStat> {
        Ok(FileStat {
            kind: DentryKind::Device,
            size: 0,
        })
    }
}
