//! # 陷阱上下文
//!
//! [`TrapFrame`] 是入口桩压入内核栈的完整硬件上下文，同时也是每个任务保存
//! 的恢复点。进入用户态的帧只由 [`TrapFrame::user_entry`] 构造。
//!
//! ## 内存布局（低地址在上）
//!
//! ```text
//! +0x00  ebx ecx edx esi edi ebp eax     <- 入口桩压入的通用寄存器
//! +0x1C  ds  es  fs
//! +0x28  vector  error_code              <- 向量号与（可能是伪造的）错误码
//! +0x30  eip cs  eflags                  <- CPU 压入
//! +0x3C  esp ss                          <- 仅在特权级切换时由 CPU 压入
//! ```

use bitflags::bitflags;

use crate::config::{USER_CS, USER_DS};

bitflags! {
    /// EFLAGS 中内核关心的位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EFlags: u32 {
        const CARRY = 1 << 0;
        /// 保留位，恒为 1
        const RESERVED_1 = 1 << 1;
        const ZERO = 1 << 6;
        const INTERRUPT_ENABLE = 1 << 9;
        const DIRECTION = 1 << 10;
    }
}

/// 帧的字数
pub const TRAP_FRAME_WORDS: usize = 17;

/// 帧的字节数
pub const TRAP_FRAME_SIZE: usize = TRAP_FRAME_WORDS * 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eax: u32,
    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

impl TrapFrame {
    /// ring 0 -> 3 的入口帧
    ///
    /// 用户数据段、用户栈、开中断的 EFLAGS、用户代码段与入口地址。
    pub fn user_entry(entry: u32, esp: u32) -> Self {
        Self {
            ds: USER_DS,
            es: USER_DS,
            fs: USER_DS,
            eip: entry,
            cs: USER_CS,
            eflags: (EFlags::RESERVED_1 | EFlags::INTERRUPT_ENABLE).bits(),
            esp,
            ss: USER_DS,
            ..Self::default()
        }
    }

    /// 陷入前是否运行在 ring 3
    pub fn from_user(&self) -> bool {
        self.cs & 3 == 3
    }

    pub fn to_words(&self) -> [u32; TRAP_FRAME_WORDS] {
        [
            self.ebx,
            self.ecx,
            self.edx,
            self.esi,
            self.edi,
            self.ebp,
            self.eax,
            self.ds,
            self.es,
            self.fs,
            self.vector,
            self.error_code,
            self.eip,
            self.cs,
            self.eflags,
            self.esp,
            self.ss,
        ]
    }

    pub fn from_words(w: &[u32; TRAP_FRAME_WORDS]) -> Self {
        Self {
            ebx: w[0],
            ecx: w[1],
            edx: w[2],
            esi: w[3],
            edi: w[4],
            ebp: w[5],
            eax: w[6],
            ds: w[7],
            es: w[8],
            fs: w[9],
            vector: w[10],
            error_code: w[11],
            eip: w[12],
            cs: w[13],
            eflags: w[14],
            esp: w[15],
            ss: w[16],
        }
    }

    /// 按栈上布局序列化（小端）
    pub fn to_bytes(&self) -> [u8; TRAP_FRAME_SIZE] {
        let mut out = [0u8; TRAP_FRAME_SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.to_words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; TRAP_FRAME_SIZE]) -> Self {
        let mut words = [0u32; TRAP_FRAME_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self::from_words(&words)
    }

    /// 系统调用号与三个参数
    pub fn syscall_args(&self) -> (u32, [u32; 3]) {
        (self.eax, [self.ebx, self.ecx, self.edx])
    }
}
