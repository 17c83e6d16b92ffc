//! Process lifecycle: allocate, fork, exit, wait, sleep, wakeup, kill, yield.
//!
//! Every operation here acquires `PTABLE` — the single coarse lock that
//! serializes all process-table, queue, and Stride-accounting mutation,
//! matching xv6's own one-lock-for-everything `proc.c`.

use alloc::string::String;
use alloc::vec;

use super::context::{restore_context, Context};
use super::cpu;
use super::error::{SchedError, SchedResult};
use super::sched_loop::sched;
use super::task::{EntryFn, KSTACKSIZE, ProcState, Process};
use super::{ProcTable, PTABLE};

/// Find an UNUSED slot, assign it a pid, and install it at the tail of MLFQ
/// level 0 with a kernel stack and a context that will enter `forkret` and
/// then the caller-supplied `entry`/`arg`.
pub(super) fn allocproc(t: &mut ProcTable, name: &str, entry: EntryFn, arg: u64) -> SchedResult<usize> {
    let idx = t
        .procs
        .iter()
        .position(|p| p.state == ProcState::Unused)
        .ok_or(SchedError::NoFreeSlot)?;

    let pid = t.next_pid;
    t.next_pid += 1;

    let stack = vec![0u8; KSTACKSIZE].into_boxed_slice();
    let stack_top = (stack.as_ptr() as u64 + KSTACKSIZE as u64) & !0xF;
    let context = Context::new(forkret_trampoline as *const () as u64, stack_top);

    let slot = &mut t.procs[idx];
    *slot = Process::unused();
    slot.pid = pid;
    slot.state = ProcState::Embryo;
    slot.kstack = Some(stack);
    slot.context = context;
    slot.name = String::from(name);
    slot.entry = Some(entry);
    slot.arg = arg;

    t.mlfq.enqueue_tail(0, idx);
    Ok(idx)
}

/// Entry point a freshly allocated process's context lands on. Runs once per
/// slot, then hands off to the process's stored start routine. By the time
/// this runs the scheduler has already released `PTABLE` (see
/// `sched_loop::scheduler_loop`), so — unlike xv6's `forkret`, which must
/// explicitly release the lock it inherited from `scheduler()` — there is
/// nothing left to unlock here.
extern "C" fn forkret_trampoline() -> ! {
    let idx = cpu::mycpu().current.expect("forkret: no current process");
    let (entry, arg) = {
        let t = PTABLE.lock();
        (t.procs[idx].entry, t.procs[idx].arg)
    };
    match entry {
        Some(f) => f(arg),
        None => panic!("forkret: process has no entry point"),
    }
}

/// Allocate the first process in the system and mark it runnable.
pub fn userinit(entry: EntryFn) {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = allocproc(&mut t, "init", entry, 0).expect("userinit: process table full");
    t.procs[idx].cwd = Some(String::from("/"));
    t.procs[idx].state = ProcState::Runnable;
    t.initpid = Some(t.procs[idx].pid);
    drop(t);
    cpu::popcli();
}

/// Spawn a brand-new heavyweight process running `entry(arg)`, parented to
/// the caller. Returns the child's pid.
///
/// Real `fork()` duplicates the caller's address space and resumes the child
/// at the exact point `fork` was called, distinguished only by its return
/// value. Building that requires a live virtual-memory duplication path and a
/// ring-3 trap frame to copy — both out of scope here (see DESIGN.md). This
/// build's `fork` instead gives the child a fresh slot that begins running
/// `entry(arg)` from the top, inheriting the parent's open files, working
/// directory, and (address-space handle via `pgdir`/`sz`. This is the same
/// "start routine + argument" unit `thread_create` already uses, which is
/// the only resumable unit this kernel has without real user images.
pub fn fork(parent_pid: u64, entry: EntryFn, arg: u64, name: &str) -> SchedResult<u64> {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let parent_idx = t
        .procs
        .iter()
        .position(|p| p.pid == parent_pid)
        .ok_or(SchedError::NoSuchProcess)?;

    let idx = match allocproc(&mut t, name, entry, arg) {
        Ok(idx) => idx,
        Err(e) => {
            drop(t);
            cpu::popcli();
            return Err(e);
        }
    };

    let child_pgdir = crate::memory::vm::copy_uvm(t.procs[parent_idx].pgdir, t.procs[parent_idx].sz);
    let child_sz = t.procs[parent_idx].sz;
    let child_ofile = core::array::from_fn(|i| t.procs[parent_idx].ofile[i].clone());
    let child_cwd = t.procs[parent_idx].cwd.clone();
    let child_trapframe = t.procs[parent_idx].trapframe;

    let slot = &mut t.procs[idx];
    slot.parent = Some(parent_pid);
    slot.pgdir = child_pgdir;
    slot.sz = child_sz;
    slot.ofile = child_ofile;
    slot.cwd = child_cwd;
    slot.trapframe = child_trapframe;
    slot.state = ProcState::Runnable;
    let child_pid = slot.pid;

    drop(t);
    cpu::popcli();
    Ok(child_pid)
}

/// Grow or shrink the calling process's address space by `n` bytes (`n` may
/// be negative). LWPs grow their parent's shared `sz` instead of their own.
pub fn growproc(pid: u64, n: i64) -> SchedResult<()> {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = t.procs.iter().position(|p| p.pid == pid).ok_or(SchedError::NoSuchProcess)?;
    let target_idx = if t.procs[idx].is_lwp {
        let parent_pid = t.procs[idx].parent.ok_or(SchedError::NoSuchProcess)?;
        t.procs.iter().position(|p| p.pid == parent_pid).ok_or(SchedError::NoSuchProcess)?
    } else {
        idx
    };

    let old_sz = t.procs[target_idx].sz;
    let new_sz = if n >= 0 {
        crate::memory::vm::alloc_uvm(t.procs[target_idx].pgdir, old_sz, old_sz + n as usize)
    } else {
        crate::memory::vm::dealloc_uvm(t.procs[target_idx].pgdir, old_sz, old_sz.saturating_sub((-n) as usize))
    };
    t.procs[target_idx].sz = new_sz;
    drop(t);
    cpu::popcli();
    Ok(())
}

/// Remove `idx` from wherever the scheduler currently tracks it (its MLFQ
/// level, or nothing if it's a Stride process — Stride processes are found
/// by scanning `state`/`cpu_share`, not a queue).
pub(super) fn unschedule(t: &mut ProcTable, idx: usize) {
    if t.procs[idx].cpu_share == 0 {
        t.mlfq.remove(t.procs[idx].level, idx);
    }
}

/// Credit a Stride process's reserved share back to the MLFQ and recompute
/// `mlfq_stride`, used whenever a Stride process's slot is finally reclaimed.
pub(super) fn credit_share_back(t: &mut ProcTable, idx: usize) {
    if t.procs[idx].cpu_share > 0 {
        t.stride.mlfq_share += t.procs[idx].cpu_share;
        t.stride.recompute_mlfq_stride();
    }
}

/// Dismantle one LWP peer: drop its files/cwd, free its kernel stack, credit
/// its share back, and scrub the slot to UNUSED. Does not touch the parent.
fn dismantle_lwp(t: &mut ProcTable, idx: usize) {
    unschedule(t, idx);
    credit_share_back(t, idx);
    for slot in t.procs[idx].ofile.iter_mut() {
        *slot = None;
    }
    t.procs[idx].cwd = None;
    t.procs[idx].scrub();
}

/// Reclaim the shared address space reserved for a thread group's stacks.
/// Each `thread_create` grows the shared `sz` by two pages (guard + stack);
/// once the last thread is gone the group shrinks back by `(all_lwp - 1) * 2`
/// pages — the `- 1` because the group's own heavyweight process never
/// allocated a pair for itself — and `all_lwp` resets to 0.
fn shrink_thread_stacks(t: &mut ProcTable, idx: usize) {
    let all_lwp = t.procs[idx].all_lwp;
    if all_lwp > 0 {
        let pgdir = t.procs[idx].pgdir;
        let old_sz = t.procs[idx].sz;
        let shrink_by = (all_lwp as usize - 1) * 2 * 4096;
        let new_sz = crate::memory::vm::dealloc_uvm(pgdir, old_sz, old_sz.saturating_sub(shrink_by));
        t.procs[idx].sz = new_sz;
    }
    t.procs[idx].num_lwp = 0;
    t.procs[idx].all_lwp = 0;
}

/// Reparent every child of `idx` to `init`, if one exists.
pub(super) fn reparent_children(t: &mut ProcTable, idx: usize) {
    let orphaned_pid = t.procs[idx].pid;
    if let Some(init_pid) = t.initpid {
        for p in t.procs.iter_mut() {
            if p.parent == Some(orphaned_pid) {
                p.parent = Some(init_pid);
            }
        }
    }
}

/// Wake every slot sleeping on `chan`, without taking the lock (caller must
/// already hold it).
fn wakeup1(t: &mut ProcTable, chan: usize) {
    for i in 0..t.procs.len() {
        if t.procs[i].state == ProcState::Sleeping && t.procs[i].chan == Some(chan) {
            t.procs[i].chan = None;
            t.procs[i].state = ProcState::Runnable;
            t.procs[i].ticks = 0;
            t.procs[i].level = 0;
            if t.procs[i].cpu_share == 0 {
                t.mlfq.enqueue_front(0, i);
            } else {
                let min_pass = t
                    .procs
                    .iter()
                    .enumerate()
                    .filter(|(j, p)| *j != i && p.state == ProcState::Runnable && p.cpu_share > 0)
                    .map(|(_, p)| p.pass)
                    .min()
                    .unwrap_or(t.stride.mlfq_pass);
                t.procs[i].pass = min_pass;
            }
        }
    }
}

pub fn wakeup(chan: usize) {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    wakeup1(&mut t, chan);
    drop(t);
    cpu::popcli();
}

/// Put the calling process to sleep on `chan` until a matching `wakeup`.
pub fn proc_sleep(pid: u64, chan: usize) {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = match t.procs.iter().position(|p| p.pid == pid) {
        Some(idx) => idx,
        None => { drop(t); cpu::popcli(); return; }
    };

    unschedule(&mut t, idx);
    if t.procs[idx].cpu_share > 0 {
        t.procs[idx].pass = 0;
    }
    t.procs[idx].chan = Some(chan);
    t.procs[idx].state = ProcState::Sleeping;

    t = unsafe { sched(t, idx) };

    t.procs[idx].chan = None;
    drop(t);
    cpu::popcli();
}

/// Set the `killed` flag; if the target is sleeping, promote it to runnable
/// so it observes the flag at its next kernel exit.
pub fn kill(pid: u64) -> SchedResult<()> {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = t.procs.iter().position(|p| p.pid == pid && p.state != ProcState::Unused);
    let result = match idx {
        Some(idx) => {
            t.procs[idx].killed = true;
            if t.procs[idx].state == ProcState::Sleeping {
                t.procs[idx].state = ProcState::Runnable;
            }
            Ok(())
        }
        None => Err(SchedError::NoSuchProcess),
    };
    drop(t);
    cpu::popcli();
    result
}

/// Cooperatively give up the CPU for one scheduling round.
pub fn proc_yield(pid: u64) {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = match t.procs.iter().position(|p| p.pid == pid) {
        Some(idx) => idx,
        None => { drop(t); cpu::popcli(); return; }
    };
    t.procs[idx].state = ProcState::Runnable;
    t = unsafe { sched(t, idx) };
    drop(t);
    cpu::popcli();
}

/// Terminate the calling process. Implements the three xv6 cases: a plain
/// heavyweight process, a heavyweight process with live LWPs (dismantle them
/// first), or an LWP itself (dismantle its peers, then the whole group
/// terminates together — the source detaches the caller from its original
/// parent before marking it ZOMBIE, and this build preserves that so the
/// rest of `exit`'s bookkeeping only ever deals with one parent pointer).
pub fn exit_current(pid: u64) -> ! {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = t.procs.iter().position(|p| p.pid == pid).expect("exit_current: unknown pid");

    if t.procs[idx].is_lwp {
        let parent_pid = t.procs[idx].parent.expect("LWP exiting with no parent");
        let peer_indices: alloc::vec::Vec<usize> = t
            .procs
            .iter()
            .enumerate()
            .filter(|(j, p)| *j != idx && p.is_lwp && p.parent == Some(parent_pid) && p.state != ProcState::Unused)
            .map(|(j, _)| j)
            .collect();
        for peer in peer_indices {
            dismantle_lwp(&mut t, peer);
        }

        for slot in t.procs[idx].ofile.iter_mut() {
            *slot = None;
        }
        t.procs[idx].cwd = None;

        // Detach from the original tree, then mark both this LWP and its
        // parent ZOMBIE so the whole thread group terminates together.
        t.procs[idx].parent = Some(t.procs[idx].pid);
        unschedule(&mut t, idx);
        credit_share_back(&mut t, idx);
        t.procs[idx].state = ProcState::Zombie;

        if let Some(parent_idx) = t.procs.iter().position(|p| p.pid == parent_pid) {
            reparent_children(&mut t, parent_idx);
            for slot_idx in 0..t.procs[parent_idx].ofile.len() {
                t.procs[parent_idx].ofile[slot_idx] = None;
            }
            shrink_thread_stacks(&mut t, parent_idx);
            unschedule(&mut t, parent_idx);
            credit_share_back(&mut t, parent_idx);
            t.procs[parent_idx].state = ProcState::Zombie;
            let grandparent = t.procs[parent_idx].parent;
            drop(t);
            if let Some(gp) = grandparent {
                wakeup(gp as usize);
            }
            let t = PTABLE.lock();
            let t = unsafe { sched(t, idx) };
            drop(t);
            cpu::popcli();
            unreachable!("exited LWP resumed");
        }
        let t = unsafe { sched(t, idx) };
        drop(t);
        cpu::popcli();
        unreachable!("exited LWP resumed");
    }

    // Heavyweight process: dismantle any live LWPs first.
    let thread_indices: alloc::vec::Vec<usize> = t
        .procs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_lwp && p.parent == Some(t.procs[idx].pid) && p.state != ProcState::Unused)
        .map(|(j, _)| j)
        .collect();
    for child in thread_indices {
        dismantle_lwp(&mut t, child);
    }
    shrink_thread_stacks(&mut t, idx);

    for slot in t.procs[idx].ofile.iter_mut() {
        *slot = None;
    }
    t.procs[idx].cwd = None;

    reparent_children(&mut t, idx);

    let parent_pid = t.procs[idx].parent;
    unschedule(&mut t, idx);
    credit_share_back(&mut t, idx);
    t.procs[idx].state = ProcState::Zombie;

    drop(t);
    if let Some(p) = parent_pid {
        wakeup(p as usize);
    }
    let t = PTABLE.lock();
    let t = unsafe { sched(t, idx) };
    drop(t);
    cpu::popcli();
    unreachable!("exited process resumed")
}

/// Replace the calling process's start routine and resume it from the top,
/// as if it were a freshly allocated slot, without changing its pid or
/// parent. Used by `SYS_EXEC`: real `exec` replaces the address space in
/// place via `copy_uvm`'s page-table machinery, which this build doesn't
/// have; instead the existing slot is given a new kernel stack and a new
/// `forkret_trampoline` context, exactly mirroring what `allocproc` sets up
/// for a brand-new process, and the scheduler is re-entered. Never returns.
pub fn exec(pid: u64, entry: EntryFn, arg: u64, name: &str) -> ! {
    cpu::pushcli();
    let mut t = PTABLE.lock();
    let idx = t.procs.iter().position(|p| p.pid == pid).expect("exec: unknown pid");

    let stack = vec![0u8; KSTACKSIZE].into_boxed_slice();
    let stack_top = (stack.as_ptr() as u64 + KSTACKSIZE as u64) & !0xF;
    let context = Context::new(forkret_trampoline as *const () as u64, stack_top);

    t.procs[idx].kstack = Some(stack);
    t.procs[idx].context = context;
    t.procs[idx].entry = Some(entry);
    t.procs[idx].arg = arg;
    t.procs[idx].name = String::from(name);
    t.procs[idx].state = ProcState::Runnable;

    // Unlike `sched()`, there is no caller state on this kernel stack worth
    // preserving — the old image is being discarded wholesale — so this
    // drops straight back into the scheduler loop instead of saving a
    // context nobody will ever switch back to.
    drop(t);
    let sched_ctx_ptr = &cpu::mycpu().scheduler_context as *const Context;
    unsafe {
        restore_context(sched_ctx_ptr);
    }
    unreachable!("exec: restore_context returned")
}

/// Wait for any child to become ZOMBIE, reap it, and return its pid.
pub fn proc_wait(pid: u64) -> SchedResult<u64> {
    loop {
        cpu::pushcli();
        let mut t = PTABLE.lock();

        let mut any_children = false;
        let mut zombie_idx = None;
        for i in 0..t.procs.len() {
            if t.procs[i].parent == Some(pid) && t.procs[i].state != ProcState::Unused {
                any_children = true;
                if t.procs[i].state == ProcState::Zombie {
                    zombie_idx = Some(i);
                    break;
                }
            }
        }

        if let Some(idx) = zombie_idx {
            let reaped_pid = t.procs[idx].pid;
            unschedule(&mut t, idx);
            credit_share_back(&mut t, idx);
            t.procs[idx].kstack = None;
            if !t.procs[idx].is_lwp {
                crate::memory::vm::free_vm(t.procs[idx].pgdir);
            }
            t.procs[idx].scrub();
            drop(t);
            cpu::popcli();
            return Ok(reaped_pid);
        }

        if !any_children {
            drop(t);
            cpu::popcli();
            return Err(SchedError::NoChildren);
        }

        let self_idx = match t.procs.iter().position(|p| p.pid == pid) {
            Some(idx) => idx,
            None => { drop(t); cpu::popcli(); return Err(SchedError::NoSuchProcess); }
        };
        if t.procs[self_idx].killed {
            drop(t);
            cpu::popcli();
            return Err(SchedError::NoChildren);
        }

        drop(t);
        cpu::popcli();
        proc_sleep(pid, pid as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_mlfq_proc(t: &mut ProcTable, idx: usize, pid: u64, level: usize) {
        t.procs[idx].pid = pid;
        t.procs[idx].state = ProcState::Runnable;
        t.procs[idx].level = level;
        t.procs[idx].cpu_share = 0;
        t.mlfq.enqueue_tail(level, idx);
    }

    #[test_case]
    fn unschedule_removes_mlfq_process_from_its_queue() {
        let mut t = ProcTable::new();
        running_mlfq_proc(&mut t, 0, 1, 1);
        unschedule(&mut t, 0);
        assert!(t.mlfq.is_empty(1));
    }

    #[test_case]
    fn unschedule_is_noop_for_stride_process() {
        let mut t = ProcTable::new();
        t.procs[0].cpu_share = 40;
        t.procs[0].level = 1;
        // Nothing queued at level 1; this must not panic or touch the queue.
        unschedule(&mut t, 0);
        assert!(t.mlfq.is_empty(1));
    }

    #[test_case]
    fn credit_share_back_returns_stride_share_to_mlfq() {
        let mut t = ProcTable::new();
        t.procs[0].cpu_share = 25;
        t.stride.mlfq_share = 50;
        credit_share_back(&mut t, 0);
        assert_eq!(t.stride.mlfq_share, 75);
        assert_eq!(t.stride.mlfq_stride, super::super::stride::stride_for_share(75));
    }

    #[test_case]
    fn credit_share_back_is_noop_for_mlfq_process() {
        let mut t = ProcTable::new();
        t.stride.mlfq_share = 50;
        credit_share_back(&mut t, 0);
        assert_eq!(t.stride.mlfq_share, 50);
    }

    #[test_case]
    fn shrink_thread_stacks_frees_guard_and_stack_pages() {
        let mut t = ProcTable::new();
        t.procs[0].all_lwp = 3;
        t.procs[0].num_lwp = 2;
        t.procs[0].sz = 100 * 4096;
        shrink_thread_stacks(&mut t, 0);
        // (all_lwp - 1) * 2 pages freed: (3 - 1) * 2 = 4 pages.
        assert_eq!(t.procs[0].sz, 96 * 4096);
        assert_eq!(t.procs[0].num_lwp, 0);
        assert_eq!(t.procs[0].all_lwp, 0);
    }

    #[test_case]
    fn shrink_thread_stacks_is_noop_with_no_threads() {
        let mut t = ProcTable::new();
        t.procs[0].sz = 4096;
        shrink_thread_stacks(&mut t, 0);
        assert_eq!(t.procs[0].sz, 4096);
    }

    #[test_case]
    fn reparent_children_moves_orphans_to_init() {
        let mut t = ProcTable::new();
        t.procs[0].pid = 1;
        t.procs[1].pid = 2;
        t.procs[1].state = ProcState::Runnable;
        t.procs[1].parent = Some(1);
        t.procs[2].pid = 3;
        t.initpid = Some(3);
        reparent_children(&mut t, 0);
        assert_eq!(t.procs[1].parent, Some(3));
    }

    #[test_case]
    fn dismantle_lwp_scrubs_slot_to_unused() {
        let mut t = ProcTable::new();
        t.procs[0].pid = 5;
        t.procs[0].is_lwp = true;
        t.procs[0].state = ProcState::Zombie;
        t.procs[0].cpu_share = 10;
        t.stride.mlfq_share = 0;
        dismantle_lwp(&mut t, 0);
        assert_eq!(t.procs[0].state, ProcState::Unused);
        assert_eq!(t.procs[0].pid, 0);
        assert_eq!(t.stride.mlfq_share, 10);
    }

    #[test_case]
    fn wakeup1_wakes_matching_sleeper_and_enqueues_front() {
        let mut t = ProcTable::new();
        t.procs[0].pid = 1;
        t.procs[0].state = ProcState::Runnable;
        t.procs[0].level = 0;
        t.mlfq.enqueue_tail(0, 0);
        t.procs[1].pid = 2;
        t.procs[1].state = ProcState::Sleeping;
        t.procs[1].chan = Some(42);
        t.procs[1].level = 2;
        wakeup1(&mut t, 42);
        assert_eq!(t.procs[1].state, ProcState::Runnable);
        assert_eq!(t.procs[1].chan, None);
        assert_eq!(t.procs[1].level, 0);
        assert_eq!(t.mlfq.iter(0).collect::<alloc::vec::Vec<_>>(), alloc::vec![1, 0]);
    }

    #[test_case]
    fn wakeup1_ignores_sleepers_on_other_channels() {
        let mut t = ProcTable::new();
        t.procs[0].pid = 1;
        t.procs[0].state = ProcState::Sleeping;
        t.procs[0].chan = Some(7);
        wakeup1(&mut t, 99);
        assert_eq!(t.procs[0].state, ProcState::Sleeping);
    }
}
