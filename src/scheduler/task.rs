use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use spin::Mutex;

use super::context::Context;
use crate::fs::fd::File;

/// Max open files per process; mirrors the syscall layer's own 64-slot fd space
/// but kept smaller here since the scheduler never needs more than a handful
/// of console/pipe handles for its own bookkeeping tests.
pub const NOFILE: usize = 16;

/// Kernel stack size per process (16 KiB), matching the teacher's original
/// `TASK_STACK_SIZE`.
pub const KSTACKSIZE: usize = 4096 * 4;

/// A process/thread's start routine: called once, with its `arg`, on first schedule.
/// Never expected to return — it must end by calling `exit_current`/`thread_exit`.
pub type EntryFn = extern "C" fn(u64) -> !;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// Saved user-mode register snapshot. Populated only once a real ring-3 syscall
/// entry trampoline exists (out of scope for this build — see DESIGN.md); kept
/// here so the data model matches a real xv6-style process and so `fork`/LWP
/// creation have a well-defined place to copy it to/from.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TrapFrame {
    pub rcx: u64,
    pub rbx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    pub const fn zero() -> Self {
        TrapFrame {
            rcx: 0, rbx: 0, rdi: 0, rsi: 0, rdx: 0, rbp: 0,
            r8: 0, r9: 0, r10: 0, r11: 0, r12: 0, r13: 0, r14: 0, r15: 0,
            rip: 0, cs: 0, rflags: 0, rsp: 0, ss: 0,
        }
    }
}

pub struct Process {
    pub pid: u64,
    pub state: ProcState,
    pub kstack: Option<Box<[u8]>>,
    pub context: Context,
    pub trapframe: TrapFrame,

    pub parent: Option<u64>,
    pub pgdir: u64,
    pub sz: usize,
    pub ofile: [Option<Arc<Mutex<File>>>; NOFILE],
    pub cwd: Option<String>,

    pub chan: Option<usize>,
    pub killed: bool,
    pub name: String,

    pub entry: Option<EntryFn>,
    pub arg: u64,

    /// MLFQ level (0..=2) while `cpu_share == 0`; meaningless once in Stride.
    pub level: usize,
    /// Ticks consumed at the current MLFQ level since the last promotion/demotion.
    pub ticks: u32,
    /// Reserved CPU percentage; 0 means "scheduled via MLFQ".
    pub cpu_share: i32,
    pub stride: u32,
    pub pass: u64,

    pub is_lwp: bool,
    pub num_lwp: u32,
    pub all_lwp: u32,
    pub tid: i32,
    pub wtid: i32,
    pub retval: u64,
}

impl Process {
    pub fn unused() -> Self {
        Process {
            pid: 0,
            state: ProcState::Unused,
            kstack: None,
            context: Context::empty(),
            trapframe: TrapFrame::zero(),
            parent: None,
            pgdir: 0,
            sz: 0,
            ofile: core::array::from_fn(|_| None),
            cwd: None,
            chan: None,
            killed: false,
            name: String::new(),
            entry: None,
            arg: 0,
            level: 0,
            ticks: 0,
            cpu_share: 0,
            stride: 0,
            pass: 0,
            is_lwp: false,
            num_lwp: 0,
            all_lwp: 0,
            tid: -1,
            wtid: -1,
            retval: 0,
        }
    }

    /// Reset a reaped slot back to its pristine UNUSED state, dropping owned resources.
    pub fn scrub(&mut self) {
        *self = Process::unused();
    }

    pub fn in_stride(&self) -> bool {
        self.cpu_share > 0
    }
}
