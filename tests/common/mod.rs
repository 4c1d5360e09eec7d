//! 集成测试共用的模拟硬件与设备
//!
//! [`Machine`] 扮演 CPU：它持有入口桩压入的陷阱帧，按用户程序的行为修改
//! 寄存器后调用 `handle_trap`，再从帧中读出结果。

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use hithlum::config::{
    IMAGE_ENTRY_OFFSET, IMAGE_MAGIC, IRQ_BASE_VECTOR, NUM_TERMINALS, PAGE_SIZE, PROGRAM_IMAGE,
    RTC_IRQ, SYSCALL_VECTOR, TIMER_IRQ, USER_DIR_INDEX,
};
use hithlum::drivers::{Clock, Console, Dentry, DentryKind, FileSystem, Keyboard};
use hithlum::hal::Hal;
use hithlum::mm::{PageDirectory, PageEntry};
use hithlum::{Kernel, TrapFrame};

pub const SHELL_ENTRY: u32 = PROGRAM_IMAGE as u32 + 0x18;
pub const PROG_ENTRY: u32 = PROGRAM_IMAGE as u32 + 0x40;

/// 用户态字符串与输出参数的暂存区（镜像之后、栈之前）
pub const SCRATCH: u32 = 0x0810_0000;

pub const SYS_HALT: u32 = 1;
pub const SYS_EXECUTE: u32 = 2;
pub const SYS_READ: u32 = 3;
pub const SYS_WRITE: u32 = 4;
pub const SYS_OPEN: u32 = 5;
pub const SYS_CLOSE: u32 = 6;
pub const SYS_GETARGS: u32 = 7;
pub const SYS_VIDMAP: u32 = 8;
pub const SYS_SET_HANDLER: u32 = 9;
pub const SYS_SIGRETURN: u32 = 10;
pub const SYS_VIDMAP_ALL: u32 = 11;
pub const SYS_IOPERM: u32 = 12;
pub const SYS_THREAD_CREATE: u32 = 13;
pub const SYS_THREAD_JOIN: u32 = 14;
pub const SYS_STAT: u32 = 15;
pub const SYS_TIME: u32 = 16;
pub const SYS_LOADKEYS: u32 = 17;

pub const FAILED: u32 = -1i32 as u32;

/// 稀疏物理内存并记录所有硬件操作
#[derive(Default)]
pub struct MockHal {
    pages: BTreeMap<usize, Box<[u8; PAGE_SIZE]>>,
    pub cr3_loads: usize,
    /// 最近一次装载的目录中用户程序区域的表项
    pub user_entry: Option<PageEntry>,
    pub esp0: u32,
    pub eois: Vec<u8>,
    pub timer_restarts: usize,
    pub io_grants: Vec<(u16, u32, bool)>,
    pub interrupts: bool,
}

impl MockHal {
    fn page_mut(&mut self, addr: usize) -> &mut [u8; PAGE_SIZE] {
        self.pages
            .entry(addr / PAGE_SIZE)
            .or_insert_with(|| Box::new([0; PAGE_SIZE]))
    }
}

impl Hal for MockHal {
    fn load_page_directory(&mut self, directory: &PageDirectory) {
        self.cr3_loads += 1;
        self.user_entry = Some(directory.get(USER_DIR_INDEX));
    }

    fn set_kernel_stack(&mut self, esp0: u32) {
        self.esp0 = esp0;
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    fn disable_interrupts(&mut self) {
        self.interrupts = false;
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }

    fn restart_timer(&mut self) {
        self.timer_restarts += 1;
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        self.eois.push(irq);
    }

    fn set_io_permission(&mut self, from: u16, num: u32, enable: bool) {
        self.io_grants.push((from, num, enable));
    }

    fn halt_forever(&mut self) -> ! {
        panic!("machine halted");
    }

    fn read_phys(&self, addr: usize, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            let a = addr + i;
            *b = self.pages.get(&(a / PAGE_SIZE)).map_or(0, |p| p[a % PAGE_SIZE]);
        }
    }

    fn write_phys(&mut self, addr: usize, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let a = addr + i;
            self.page_mut(a)[a % PAGE_SIZE] = b;
        }
    }

    fn fill_phys(&mut self, addr: usize, value: u8, len: usize) {
        if value == 0 && addr % PAGE_SIZE == 0 && len % PAGE_SIZE == 0 {
            let first = addr / PAGE_SIZE;
            let keys: Vec<usize> = self
                .pages
                .range(first..first + len / PAGE_SIZE)
                .map(|(&k, _)| k)
                .collect();
            for k in keys {
                self.pages.remove(&k);
            }
            return;
        }
        for a in addr..addr + len {
            self.page_mut(a)[a % PAGE_SIZE] = value;
        }
    }
}

struct RamFile {
    name: Vec<u8>,
    kind: DentryKind,
    data: Vec<u8>,
}

/// 内存中的文件系统、终端、键盘与时钟
#[derive(Default)]
pub struct RamDevices {
    files: Vec<RamFile>,
    pub input: [VecDeque<Vec<u8>>; NUM_TERMINALS],
    pub output: [Vec<u8>; NUM_TERMINALS],
    pub keys: VecDeque<u8>,
    pub keymap: u32,
    pub now: u32,
}

/// 魔数开头、入口位于第 24 字节的镜像
pub fn image(entry: u32, len: usize) -> Vec<u8> {
    let mut data = vec![0x90; len.max(IMAGE_ENTRY_OFFSET + 4)];
    data[..4].copy_from_slice(&IMAGE_MAGIC);
    data[IMAGE_ENTRY_OFFSET..IMAGE_ENTRY_OFFSET + 4].copy_from_slice(&entry.to_le_bytes());
    data
}

impl RamDevices {
    pub fn standard() -> Self {
        let mut devices = Self {
            now: 1_700_000_000,
            ..Self::default()
        };
        devices.add(b".", DentryKind::Directory, Vec::new());
        devices.add(b"rtc", DentryKind::Device, Vec::new());
        devices.add(b"shell", DentryKind::Regular, image(SHELL_ENTRY, 6000));
        devices.add(b"prog", DentryKind::Regular, image(PROG_ENTRY, 40));
        let mut bad = image(PROG_ENTRY, 40);
        bad[1] = b'X';
        devices.add(b"bad", DentryKind::Regular, bad);
        devices.add(b"frame0.txt", DentryKind::Regular, b"hello, hithlum\n".to_vec());
        devices
    }

    pub fn add(&mut self, name: &[u8], kind: DentryKind, data: Vec<u8>) {
        self.files.push(RamFile {
            name: name.to_vec(),
            kind,
            data,
        });
    }

    pub fn remove(&mut self, name: &[u8]) {
        self.files.retain(|f| f.name != name);
    }
}

impl FileSystem for RamDevices {
    fn lookup(&self, name: &[u8]) -> Option<Dentry> {
        self.files
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| self.dentry_at(i as u32))
    }

    fn dentry_at(&self, index: u32) -> Option<Dentry> {
        let f = self.files.get(index as usize)?;
        Some(Dentry::new(&f.name, f.kind, index))
    }

    fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> usize {
        let Some(f) = self.files.get(inode as usize) else {
            return 0;
        };
        let start = (offset as usize).min(f.data.len());
        let n = buf.len().min(f.data.len() - start);
        buf[..n].copy_from_slice(&f.data[start..start + n]);
        n
    }

    fn file_size(&self, inode: u32) -> Option<u32> {
        self.files.get(inode as usize).map(|f| f.data.len() as u32)
    }
}

impl Console for RamDevices {
    fn read_line(&mut self, terminal: usize, buf: &mut [u8]) -> Option<usize> {
        let line = self.input[terminal].pop_front()?;
        let n = line.len().min(buf.len());
        buf[..n].copy_from_slice(&line[..n]);
        Some(n)
    }

    fn write(&mut self, terminal: usize, data: &[u8]) -> usize {
        self.output[terminal].extend_from_slice(data);
        data.len()
    }
}

impl Keyboard for RamDevices {
    fn read_keys(&mut self, _terminal: usize, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            let Some(k) = self.keys.pop_front() else {
                break;
            };
            buf[n] = k;
            n += 1;
        }
        n
    }

    fn load_keymap(&mut self, layout: u32) -> bool {
        if layout < 3 {
            self.keymap = layout;
            true
        } else {
            false
        }
    }
}

impl Clock for RamDevices {
    fn unix_time(&self) -> u32 {
        self.now
    }
}

pub type TestKernel = Kernel<MockHal, RamDevices>;

/// 模拟的 CPU 与内核
pub struct Machine {
    pub kernel: Box<TestKernel>,
    /// 当前在 CPU 上的上下文
    pub frame: TrapFrame,
}

impl Machine {
    /// 仅建立内核，不启动 shell
    pub fn new() -> Self {
        Self {
            kernel: Box::new(Kernel::new(MockHal::default(), RamDevices::standard())),
            frame: TrapFrame::default(),
        }
    }

    /// 启动三个终端的 shell，CPU 停在终端 0 的 shell 入口
    pub fn boot() -> Self {
        let mut m = Self::new();
        m.kernel.start_shells(&mut m.frame).unwrap();
        m
    }

    pub fn slot(&self) -> usize {
        self.kernel.current_slot()
    }

    /// 当前任务执行 `int 0x80`，返回 EAX
    pub fn syscall(&mut self, id: u32, args: [u32; 3]) -> u32 {
        self.frame.eax = id;
        self.frame.ebx = args[0];
        self.frame.ecx = args[1];
        self.frame.edx = args[2];
        self.retry()
    }

    /// 按当前寄存器重新执行 `int 0x80`（被重启的系统调用恢复运行时）
    pub fn retry(&mut self) -> u32 {
        self.frame.eip += 2;
        self.trap(SYSCALL_VECTOR);
        self.frame.eax
    }

    pub fn trap(&mut self, vector: u32) {
        self.frame.vector = vector;
        self.kernel.handle_trap(&mut self.frame);
    }

    pub fn tick(&mut self) {
        self.trap(IRQ_BASE_VECTOR + TIMER_IRQ as u32);
    }

    /// 时钟中断直到 `slot` 上 CPU，最多 `NUM_TASKS` 次
    pub fn run_until(&mut self, slot: usize) {
        for _ in 0..hithlum::config::NUM_TASKS {
            if self.slot() == slot {
                return;
            }
            self.tick();
        }
        assert_eq!(self.slot(), slot, "task {} never scheduled", slot);
    }

    pub fn rtc_tick(&mut self) {
        self.trap(IRQ_BASE_VECTOR + RTC_IRQ as u32);
    }

    pub fn poke(&mut self, va: u32, data: &[u8]) {
        let slot = self.slot();
        self.poke_in(slot, va, data);
    }

    pub fn poke_in(&mut self, slot: usize, va: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let phys = self
                .kernel
                .translate_user(slot, va as usize + i)
                .expect("unmapped user address");
            self.kernel.hal_mut().write_phys(phys, &[b]);
        }
    }

    pub fn peek(&self, va: u32, len: usize) -> Vec<u8> {
        self.peek_in(self.slot(), va, len)
    }

    pub fn peek_in(&self, slot: usize, va: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let phys = self
                    .kernel
                    .translate_user(slot, va as usize + i)
                    .expect("unmapped user address");
                let mut b = [0u8];
                self.kernel.hal().read_phys(phys, &mut b);
                b[0]
            })
            .collect()
    }

    pub fn peek_u32(&self, va: u32) -> u32 {
        let raw = self.peek(va, 4);
        u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
    }

    /// 在暂存区放入 NUL 结尾的字符串，返回其地址
    pub fn put_str(&mut self, s: &[u8]) -> u32 {
        let mut data = s.to_vec();
        data.push(0);
        self.poke(SCRATCH, &data);
        SCRATCH
    }

    pub fn execute(&mut self, command: &[u8]) -> u32 {
        let cmd = self.put_str(command);
        self.syscall(SYS_EXECUTE, [cmd, 0, 0])
    }

    pub fn open(&mut self, name: &[u8]) -> u32 {
        let name = self.put_str(name);
        self.syscall(SYS_OPEN, [name, 0, 0])
    }
}
