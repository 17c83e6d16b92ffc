//! Hybrid CPU scheduler: a 3-level MLFQ competing against a Stride scheduler
//! over a single fixed-size process table, in the tradition of xv6's
//! `proc.c`. `PTABLE` is the one coarse lock serializing every mutation of
//! process state, the run queues, and the Stride accounting; everything in
//! this module and its submodules expects to be called with that lock either
//! already held or freely acquirable.

mod context;
mod cpu;
pub mod error;
mod lifecycle;
mod lwp;
mod mlfq;
mod sched_loop;
mod share;
pub mod task;
mod stride;

use alloc::string::String;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

pub use error::{SchedError, SchedResult};
pub use task::{EntryFn, ProcState, Process};

use mlfq::MlfqQueues;
use stride::StrideState;

/// Fixed size of the process table, mirroring xv6's own `NPROC`.
pub const NPROC: usize = 64;

pub struct ProcTable {
    pub procs: [Process; NPROC],
    pub mlfq: MlfqQueues<NPROC>,
    pub stride: StrideState,
    pub next_pid: u64,
    pub initpid: Option<u64>,
}

impl ProcTable {
    pub fn new() -> Self {
        ProcTable {
            procs: core::array::from_fn(|_| Process::unused()),
            mlfq: MlfqQueues::new(),
            stride: StrideState::new(),
            next_pid: 1,
            initpid: None,
        }
    }
}

lazy_static! {
    pub static ref PTABLE: Mutex<ProcTable> = Mutex::new(ProcTable::new());
}

/// Guards page-table mutation (`copy_uvm`/`alloc_uvm`/`dealloc_uvm`) the way
/// xv6 keeps that under a separate lock from the process table proper, since
/// growing an address space doesn't need to block unrelated scheduling
/// decisions.
pub static PGDIRLOCK: Mutex<()> = Mutex::new(());

/// Bring up the process table with a single runnable process, `init`, running
/// `entry`. Must be called once, before interrupts are enabled and before
/// `run()`.
pub fn init(entry: EntryFn) {
    lifecycle::userinit(entry);
}

/// Hand this CPU over to the scheduler loop. Never returns.
pub fn run() -> ! {
    sched_loop::scheduler_loop()
}

/// Called from the timer interrupt handler, after EOI, with interrupts still
/// disabled. Charges the running process one tick and, once its slice is up,
/// cooperatively yields on its behalf — the same hand-off `proc_yield` uses,
/// just reached from interrupt context rather than a syscall.
pub fn tick() {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = match cpu::mycpu().current {
        Some(idx) => idx,
        None => {
            drop(t);
            cpu::popcli();
            return;
        }
    };
    t.procs[idx].ticks += 1;
    if t.procs[idx].cpu_share == 0 {
        t.stride.totalticks += 1;
    }
    let pid = t.procs[idx].pid;
    drop(t);
    cpu::popcli();
    lifecycle::proc_yield(pid);
}

/// The pid of the process currently running on this CPU, if any.
pub fn current_pid() -> Option<u64> {
    cpu::pushcli();
    let idx = cpu::mycpu().current;
    let pid = idx.map(|i| PTABLE.lock().procs[i].pid);
    cpu::popcli();
    pid
}

/// Give up the CPU for one scheduling round.
pub fn yield_now() {
    if let Some(pid) = current_pid() {
        lifecycle::proc_yield(pid);
    }
}

/// Spawn a new heavyweight process running `entry(arg)`, parented to the
/// caller. Returns the child's pid.
pub fn fork_task(entry: EntryFn, arg: u64, name: &str) -> SchedResult<u64> {
    let parent = current_pid().ok_or(SchedError::NoSuchProcess)?;
    lifecycle::fork(parent, entry, arg, name)
}

/// Replace the calling process's program with `entry(arg)`, keeping its pid.
/// Never returns.
pub fn exec_current(entry: EntryFn, arg: u64, name: &str) -> ! {
    let pid = current_pid().expect("exec_current: no current process");
    lifecycle::exec(pid, entry, arg, name)
}

/// Terminate the calling process/thread-group per the rules in
/// `lifecycle::exit_current`. Never returns.
pub fn exit_current(code: u64) -> ! {
    let pid = current_pid().expect("exit_current: no current process");
    cpu::pushcli();
    {
        let mut t = PTABLE.lock();
        if let Some(idx) = t.procs.iter().position(|p| p.pid == pid) {
            t.procs[idx].retval = code;
        }
    }
    cpu::popcli();
    lifecycle::exit_current(pid)
}

/// Wait for any child of the caller to exit, reaping it and returning its pid.
pub fn wait() -> SchedResult<u64> {
    let pid = current_pid().ok_or(SchedError::NoSuchProcess)?;
    lifecycle::proc_wait(pid)
}

/// Mark `pid` killed; wakes it if sleeping.
pub fn kill(pid: u64) -> SchedResult<()> {
    lifecycle::kill(pid)
}

/// Grow (or shrink, for negative `n`) the calling process's address space.
pub fn growproc(n: i64) -> SchedResult<()> {
    let pid = current_pid().ok_or(SchedError::NoSuchProcess)?;
    lifecycle::growproc(pid, n)
}

/// Put the calling process to sleep on `chan` until a matching `wakeup`.
pub fn sleep(chan: usize) {
    if let Some(pid) = current_pid() {
        lifecycle::proc_sleep(pid, chan);
    }
}

/// Wake every process sleeping on `chan`.
pub fn wakeup(chan: usize) {
    lifecycle::wakeup(chan);
}

/// Reserve `share` percent of the CPU for the calling process via the Stride
/// scheduler, migrating it (and any live LWPs) out of the MLFQ.
pub fn set_cpu_share(share: i32) -> SchedResult<i32> {
    let pid = current_pid().ok_or(SchedError::NoSuchProcess)?;
    share::set_cpu_share(pid, share)
}

/// Create a new thread sharing the caller's address space. Returns the new
/// thread's tid.
pub fn thread_create(start: EntryFn, arg: u64) -> SchedResult<i32> {
    let pid = current_pid().ok_or(SchedError::NoSuchProcess)?;
    lwp::thread_create(pid, start, arg)
}

/// Terminate the calling thread. Never returns.
pub fn thread_exit(retval: u64) -> ! {
    let pid = current_pid().expect("thread_exit: no current process");
    lwp::thread_exit(pid, retval)
}

/// Block until thread `tid` (a child of the caller) exits, then reap it and
/// return its stored return value.
pub fn thread_join(tid: i32) -> SchedResult<u64> {
    let pid = current_pid().ok_or(SchedError::NoSuchProcess)?;
    lwp::thread_join(pid, tid)
}

/// Run `f` with a mutable reference to the calling process's open-file table
/// entry at `fd`, or `None` if `fd` is out of range. Used by the syscall
/// dispatcher so it never has to reach into `PTABLE` directly.
pub fn with_current_ofile<R>(fd: usize, f: impl FnOnce(&mut Option<alloc::sync::Arc<spin::Mutex<crate::fs::fd::File>>>) -> R) -> Option<R> {
    let pid = current_pid()?;
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = match t.procs.iter().position(|p| p.pid == pid) {
        Some(idx) => idx,
        None => {
            drop(t);
            cpu::popcli();
            return None;
        }
    };
    if fd >= task::NOFILE {
        drop(t);
        cpu::popcli();
        return None;
    }
    let result = f(&mut t.procs[idx].ofile[fd]);
    drop(t);
    cpu::popcli();
    Some(result)
}

/// Install `file` into the first free fd slot of the calling process, if any.
pub fn alloc_fd(file: alloc::sync::Arc<spin::Mutex<crate::fs::fd::File>>) -> Option<usize> {
    let pid = current_pid()?;
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = match t.procs.iter().position(|p| p.pid == pid) {
        Some(idx) => idx,
        None => {
            drop(t);
            cpu::popcli();
            return None;
        }
    };
    let slot = match t.procs[idx].ofile.iter().position(|f| f.is_none()) {
        Some(slot) => slot,
        None => {
            drop(t);
            cpu::popcli();
            return None;
        }
    };
    t.procs[idx].ofile[slot] = Some(file);
    drop(t);
    cpu::popcli();
    Some(slot)
}

/// The caller's current working directory, if it has one set.
pub fn current_cwd() -> Option<String> {
    let pid = current_pid()?;
    cpu::pushcli();
    let t = PTABLE.lock();
    let result = t.procs.iter().find(|p| p.pid == pid).and_then(|p| p.cwd.clone());
    drop(t);
    cpu::popcli();
    result
}

/// A snapshot of one process/thread's scheduling state, for `ps`.
pub struct TaskInfo {
    pub pid: u64,
    pub name: String,
    pub state: ProcState,
    pub is_lwp: bool,
    pub level: usize,
    pub cpu_share: i32,
    pub pass: u64,
}

/// Snapshot every live process/thread in the table, for the `ps` shell command.
pub fn list_tasks() -> Vec<TaskInfo> {
    cpu::pushcli();
    let t = PTABLE.lock();
    let tasks = t.procs
        .iter()
        .filter(|p| p.state != ProcState::Unused)
        .map(|p| TaskInfo {
            pid: p.pid,
            name: p.name.clone(),
            state: p.state,
            is_lwp: p.is_lwp,
            level: p.level,
            cpu_share: p.cpu_share,
            pass: p.pass,
        })
        .collect();
    drop(t);
    cpu::popcli();
    tasks
}
