//! # 内核错误类型
//!
//! 内核内部操作统一返回 [`KernelResult`]，以 `?` 向上传播；
//! 只有系统调用分发器把错误折叠成用户可见的 `-1`。

use core::fmt;

/// 内核错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// 任务表或文件描述符表已满
    ResourceExhausted,
    /// 程序或文件不存在
    NotFound,
    /// 程序镜像魔数错误或头部不完整
    InvalidImage,
    /// 描述符越界、未打开或不支持该操作
    InvalidDescriptor,
    /// 参数不合法
    InvalidArgument,
    /// 用户指针未映射或越出允许区域
    BadAddress,
    /// 操作需要等待，调用方应让出 CPU 后重试
    WouldBlock,
    /// 硬件异常已转换为信号
    FaultSignal,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::ResourceExhausted => "resource exhausted",
            KernelError::NotFound => "not found",
            KernelError::InvalidImage => "invalid program image",
            KernelError::InvalidDescriptor => "invalid file descriptor",
            KernelError::InvalidArgument => "invalid argument",
            KernelError::BadAddress => "bad user address",
            KernelError::WouldBlock => "operation would block",
            KernelError::FaultSignal => "hardware fault",
        };
        f.write_str(msg)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
