//! The LWP (lightweight process) facility: threads that share a parent's
//! address space instead of getting their own, created and reaped at thread
//! granularity via `thread_create`/`thread_exit`/`thread_join` rather than
//! `fork`/`exit`/`wait`. `exit_current`'s own is-LWP branch (`lifecycle.rs`)
//! is a different path — a thread that calls plain `exit` tears down its
//! whole group, while `thread_exit` here only ever terminates the caller.

use super::cpu;
use super::error::{SchedError, SchedResult};
use super::sched_loop::sched;
use super::stride::{split_share, stride_for_share};
use super::task::{EntryFn, ProcState};
use super::PTABLE;

/// Create a new thread sharing `parent_pid`'s address space. Grows the
/// shared address space by two pages (the source reserves one for a guard
/// and one for the thread's stack) and, if the parent currently reserves a
/// Stride share, redistributes it across the parent and every sibling
/// thread. Returns the new thread's tid.
pub fn thread_create(parent_pid: u64, start: EntryFn, arg: u64) -> SchedResult<i32> {
    cpu::pushcli();
    let pg = super::PGDIRLOCK.lock();
    let mut t = PTABLE.lock();

    let parent_idx = match t.procs.iter().position(|p| p.pid == parent_pid) {
        Some(i) => i,
        None => {
            drop(t);
            drop(pg);
            cpu::popcli();
            return Err(SchedError::NoSuchProcess);
        }
    };
    let parent_name = t.procs[parent_idx].name.clone();

    let idx = match super::lifecycle::allocproc(&mut t, &parent_name, start, arg) {
        Ok(i) => i,
        Err(e) => {
            drop(t);
            drop(pg);
            cpu::popcli();
            return Err(e);
        }
    };

    let parent_pgdir = t.procs[parent_idx].pgdir;
    let old_sz = t.procs[parent_idx].sz;
    let new_sz = crate::memory::vm::alloc_uvm(parent_pgdir, old_sz, old_sz + 2 * 4096);
    t.procs[parent_idx].sz = new_sz;

    let tid = t.procs[parent_idx].num_lwp as i32;
    t.procs[parent_idx].num_lwp += 1;
    t.procs[parent_idx].all_lwp += 1;

    let cwd = t.procs[parent_idx].cwd.clone();
    let ofile = core::array::from_fn(|i| t.procs[parent_idx].ofile[i].clone());
    let trapframe = t.procs[parent_idx].trapframe;

    {
        let slot = &mut t.procs[idx];
        slot.is_lwp = true;
        slot.parent = Some(parent_pid);
        slot.pgdir = parent_pgdir;
        slot.sz = new_sz;
        slot.tid = tid;
        slot.cwd = cwd;
        slot.ofile = ofile;
        slot.trapframe = trapframe;
        slot.state = ProcState::Runnable;
    }

    // If the parent already reserves a Stride share, the same share is
    // re-split across it and all of its threads (the formula deliberately
    // divides by the thread count alone, not thread-count-plus-parent, and
    // hands every one of them the same average — this over-allocates by
    // construction, matching the source rather than "fixing" it).
    if t.procs[parent_idx].cpu_share > 0 {
        t.mlfq.remove(0, idx);
        let total_share = t.procs[parent_idx].cpu_share;
        let num_lwp = t.procs[parent_idx].num_lwp;
        let per_thread = split_share(total_share, num_lwp);
        let per_thread_stride = stride_for_share(per_thread);
        let pass = t.procs[parent_idx].pass;

        t.procs[parent_idx].cpu_share = per_thread;
        t.procs[parent_idx].stride = per_thread_stride;

        t.procs[idx].cpu_share = per_thread;
        t.procs[idx].stride = per_thread_stride;
        t.procs[idx].pass = pass;

        for i in 0..t.procs.len() {
            if i != idx && i != parent_idx && t.procs[i].is_lwp && t.procs[i].parent == Some(parent_pid) {
                t.procs[i].cpu_share = per_thread;
                t.procs[i].stride = per_thread_stride;
            }
        }
    }

    drop(t);
    drop(pg);
    cpu::popcli();
    Ok(tid)
}

/// Terminate the calling thread: release its files/cwd, reparent any
/// children it happens to have to `init`, credit its Stride share back, mark
/// it ZOMBIE, wake whoever might be blocked in `thread_join`, and hand off
/// to the scheduler for good. Does not touch sibling threads or the parent.
pub fn thread_exit(pid: u64, retval: u64) -> ! {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = t.procs.iter().position(|p| p.pid == pid).expect("thread_exit: unknown pid");

    for slot in t.procs[idx].ofile.iter_mut() {
        *slot = None;
    }
    t.procs[idx].cwd = None;

    super::lifecycle::reparent_children(&mut t, idx);

    let parent_pid = t.procs[idx].parent;
    super::lifecycle::unschedule(&mut t, idx);
    super::lifecycle::credit_share_back(&mut t, idx);
    t.procs[idx].retval = retval;
    t.procs[idx].state = ProcState::Zombie;

    drop(t);
    if let Some(p) = parent_pid {
        super::lifecycle::wakeup(p as usize);
    }
    let t = PTABLE.lock();
    let t = unsafe { sched(t, idx) };
    drop(t);
    cpu::popcli();
    unreachable!("exited thread resumed")
}

/// Block until the thread identified by `tid` (a child of `parent_pid`)
/// becomes ZOMBIE, then reap it and return its stored return value.
pub fn thread_join(parent_pid: u64, tid: i32) -> SchedResult<u64> {
    loop {
        cpu::pushcli();
        let mut t = PTABLE.lock();

        if let Some(parent_idx) = t.procs.iter().position(|p| p.pid == parent_pid) {
            t.procs[parent_idx].wtid = tid;
        }

        let target = t
            .procs
            .iter()
            .position(|p| p.is_lwp && p.parent == Some(parent_pid) && p.tid == tid && p.state != ProcState::Unused);

        match target {
            Some(idx) if t.procs[idx].state == ProcState::Zombie => {
                let retval = t.procs[idx].retval;
                super::lifecycle::unschedule(&mut t, idx);
                super::lifecycle::credit_share_back(&mut t, idx);
                t.procs[idx].kstack = None;
                t.procs[idx].scrub();

                if let Some(parent_idx) = t.procs.iter().position(|p| p.pid == parent_pid) {
                    t.procs[parent_idx].num_lwp = t.procs[parent_idx].num_lwp.saturating_sub(1);
                }

                drop(t);
                cpu::popcli();
                return Ok(retval);
            }
            Some(_) => {
                let killed = t
                    .procs
                    .iter()
                    .find(|p| p.pid == parent_pid)
                    .map(|p| p.killed)
                    .unwrap_or(false);
                drop(t);
                cpu::popcli();
                if killed {
                    return Err(SchedError::NoChildren);
                }
                super::lifecycle::proc_sleep(parent_pid, parent_pid as usize);
            }
            None => {
                drop(t);
                cpu::popcli();
                return Err(SchedError::NoSuchThread);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ProcTable;

    /// Mirrors what `thread_exit` does to a single LWP peer, without the
    /// global `PTABLE`/`pushcli` machinery: clear its files, reparent any
    /// children of its own to `init`, release its Stride share, and zombify.
    #[test_case]
    fn terminating_one_peer_reparents_its_children_and_credits_share() {
        let mut t = ProcTable::new();
        t.initpid = Some(99);

        t.procs[0].pid = 10; // thread-group owner
        t.procs[0].all_lwp = 2;
        t.procs[0].num_lwp = 2;

        t.procs[1].pid = 11; // peer A, the one exiting
        t.procs[1].is_lwp = true;
        t.procs[1].parent = Some(10);
        t.procs[1].state = ProcState::Runnable;
        t.procs[1].cpu_share = 15;

        t.procs[2].pid = 12; // peer B, unaffected
        t.procs[2].is_lwp = true;
        t.procs[2].parent = Some(10);
        t.procs[2].state = ProcState::Runnable;

        t.procs[3].pid = 13; // a child adopted by peer A
        t.procs[3].parent = Some(11);
        t.procs[3].state = ProcState::Runnable;

        super::super::lifecycle::reparent_children(&mut t, 1);
        super::super::lifecycle::unschedule(&mut t, 1);
        super::super::lifecycle::credit_share_back(&mut t, 1);
        t.procs[1].state = ProcState::Zombie;

        assert_eq!(t.procs[3].parent, Some(99));
        assert_eq!(t.stride.mlfq_share, 115);
        assert_eq!(t.procs[1].state, ProcState::Zombie);
        assert_eq!(t.procs[2].state, ProcState::Runnable);
    }

    #[test_case]
    fn reaping_a_joined_thread_decrements_owner_num_lwp() {
        let mut t = ProcTable::new();
        t.procs[0].pid = 10;
        t.procs[0].num_lwp = 2;

        t.procs[1].pid = 11;
        t.procs[1].is_lwp = true;
        t.procs[1].parent = Some(10);
        t.procs[1].tid = 5;
        t.procs[1].state = ProcState::Zombie;

        let target = t
            .procs
            .iter()
            .position(|p| p.is_lwp && p.parent == Some(10) && p.tid == 5 && p.state != ProcState::Unused)
            .expect("peer must be found");
        assert_eq!(t.procs[target].state, ProcState::Zombie);

        super::super::lifecycle::unschedule(&mut t, target);
        super::super::lifecycle::credit_share_back(&mut t, target);
        t.procs[target].kstack = None;
        t.procs[target].scrub();

        if let Some(owner_idx) = t.procs.iter().position(|p| p.pid == 10) {
            t.procs[owner_idx].num_lwp = t.procs[owner_idx].num_lwp.saturating_sub(1);
        }

        assert_eq!(t.procs[0].num_lwp, 1);
        assert_eq!(t.procs[target].state, ProcState::Unused);
    }
}
