//! # 日志系统模块
//!
//! 实现标准 `log` crate 的 [`Log`] 接口，输出带颜色与上下文信息的日志。
//! 内核本身不持有任何输出设备，由集成方通过 [`set_sink`] 注册一个
//! [`core::fmt::Write`] 实现（串口、VGA 控制台等）。未注册时日志被丢弃。
//!
//! ## 日志格式
//!
//! ```text
//! LEVEL [T0001] [TASK3] [hithlum::task::scheduler] [scheduler.rs:42] message
//! ```
//!
//! - `T` 后为调度器 tick 计数
//! - `TASK` 后为当前任务槽位
//!
//! ## 颜色方案
//!
//! - **ERROR**: 红色 (31)
//! - **WARN**: 亮黄色 (93)
//! - **INFO**: 蓝色 (34)
//! - **DEBUG**: 绿色 (32)
//! - **TRACE**: 暗灰色 (90)
//!
//! ## 级别配置
//!
//! 编译期环境变量 `LOG`：`ERROR` / `WARN` / `INFO` / `DEBUG` / `TRACE`，
//! 默认 `INFO`。

use core::fmt::Write;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ::log::{Level, LevelFilter, Log, Metadata, Record};
use lazy_static::lazy_static;
use spin::Mutex;

/// 日志输出目标
pub type LogSink = &'static mut (dyn Write + Send);

lazy_static! {
    /// 全局日志输出目标
    static ref SINK: Mutex<Option<LogSink>> = Mutex::new(None);
}

/// 最近一次记录的调度 tick
static TICKS: AtomicU64 = AtomicU64::new(0);

/// 最近一次记录的当前任务槽位
static CURRENT_TASK: AtomicUsize = AtomicUsize::new(0);

/// 简单日志实现
struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        // 级别过滤交给 log::set_max_level
        true
    }

    /// 格式化一条日志并写入已注册的输出目标
    ///
    /// ## Arguments
    ///
    /// * `record` - 日志记录，包含级别、消息、位置等信息
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31,
            Level::Warn => 93,
            Level::Info => 34,
            Level::Debug => 32,
            Level::Trace => 90,
        };

        let mut sink = SINK.lock();
        let Some(out) = sink.as_mut() else {
            return;
        };
        let file = record
            .file()
            .map(|f| f.rsplit('/').next().unwrap_or(f))
            .unwrap_or("unknown");
        // 输出失败时没有更底层的地方可以报告
        let _ = writeln!(
            out,
            "\u{1B}[{}m{:>5} [T{:>4}] [TASK{}] [{}] [{}:{}] {}\u{1B}[0m",
            color,
            record.level(),
            TICKS.load(Ordering::Relaxed),
            CURRENT_TASK.load(Ordering::Relaxed),
            record.target(),
            file,
            record.line().unwrap_or(0),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// 初始化日志系统
///
/// 安装全局 logger 并按 `LOG` 设置最大级别。重复调用是无害的：
/// 第二次起 `set_logger` 会失败，此时保持已有配置。
pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;

    if ::log::set_logger(&LOGGER).is_ok() {
        ::log::set_max_level(level_from_env(option_env!("LOG")));
    }
}

/// 注册日志输出目标，返回之前注册的目标
pub fn set_sink(sink: LogSink) -> Option<LogSink> {
    SINK.lock().replace(sink)
}

/// 记录调度上下文，供日志行首使用
pub(crate) fn note_schedule(ticks: u64, slot: usize) {
    TICKS.store(ticks, Ordering::Relaxed);
    CURRENT_TASK.store(slot, Ordering::Relaxed);
}

fn level_from_env(level: Option<&str>) -> LevelFilter {
    match level {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
