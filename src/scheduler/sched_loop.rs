//! The per-CPU scheduler loop (spec §4.D) and the `sched()` hand-off that
//! every suspension point (`yield`, `sleep`, `exit`, `thread_exit`) uses to
//! return control to it.
//!
//! xv6 holds its raw `ptable.lock` across the `swtch` into/out of a process,
//! relying on the fact that a spinlock is just a memory flag independent of
//! which kernel stack is currently executing. A `spin::Mutex` guard is tied to
//! a Rust stack frame, so carrying one across a raw asm jump onto a different
//! stack is not something the type system can check. This build instead
//! releases the lock immediately before the raw context switch and reacquires
//! it immediately after; with interrupts disabled and `NCPU == 1` nothing else
//! can observe the table while it is unlocked, so this is a safe, purely
//! mechanical substitute for the same atomicity xv6 gets from holding the lock
//! across `swtch`.

use spin::MutexGuard;

use super::context::{switch_context, Context};
use super::task::{ProcState, KSTACKSIZE};
use super::{cpu, mlfq, ProcTable, PTABLE};

/// Release `ptable`, context-switch into this CPU's scheduler loop, and block
/// here until the scheduler chooses this process again, at which point the
/// lock is reacquired and handed back to the caller.
///
/// # Safety
/// `idx` must already have a state other than `Running`, and the caller must
/// be running with exactly one `pushcli` level outstanding and interrupts
/// disabled — the same guard conditions xv6's `sched()` asserts.
pub unsafe fn sched<'a>(ptable: MutexGuard<'a, ProcTable>, idx: usize) -> MutexGuard<'a, ProcTable> {
    let c = cpu::mycpu();
    if c.ncli != 1 {
        panic!("sched: ncli != 1");
    }
    if ptable.procs[idx].state == ProcState::Running {
        panic!("sched: process still marked running");
    }
    if x86_64::instructions::interrupts::are_enabled() {
        panic!("sched: interruptible");
    }

    let intena = c.intena;
    let proc_ctx_ptr = &ptable.procs[idx].context as *const Context as *mut Context;
    let sched_ctx_ptr = &c.scheduler_context as *const Context;

    drop(ptable);
    switch_context(proc_ctx_ptr, sched_ctx_ptr);

    let resumed = PTABLE.lock();
    cpu::mycpu().intena = intena;
    resumed
}

/// Entry point for this CPU's scheduler loop; installed as the initial `rip`
/// of the boot thread and never returns.
pub fn scheduler_loop() -> ! {
    loop {
        x86_64::instructions::interrupts::enable();
        cpu::pushcli();

        let mut t = PTABLE.lock();
        let winner = pick_next(&mut t);

        if let Some(idx) = winner {
            t.procs[idx].state = ProcState::Running;
            cpu::mycpu().current = Some(idx);
            if let Some(stack) = &t.procs[idx].kstack {
                let top = (stack.as_ptr() as u64 + KSTACKSIZE as u64) & !0xF;
                crate::interrupts::gdt::set_tss_rsp0(top);
            }

            let proc_ctx_ptr = &t.procs[idx].context as *const Context;
            let sched_ctx_ptr = &mut cpu::mycpu().scheduler_context as *mut Context;
            drop(t);

            unsafe {
                switch_context(sched_ctx_ptr, proc_ctx_ptr);
            }
            cpu::mycpu().current = None;

            let mut t2 = PTABLE.lock();
            apply_post_run_demotion(&mut t2, idx);
            drop(t2);
        } else {
            drop(t);
        }

        cpu::popcli();
    }
}

fn apply_post_run_demotion(t: &mut ProcTable, idx: usize) {
    if t.procs[idx].state == ProcState::Unused {
        return;
    }
    if t.procs[idx].cpu_share != 0 {
        return; // Stride process; MLFQ allotments don't apply.
    }
    let level = t.procs[idx].level;
    if t.procs[idx].ticks >= mlfq::ALLOTMENT[level] && level < mlfq::NLEVELS - 1 {
        t.mlfq.remove(level, idx);
        t.procs[idx].level = level + 1;
        t.procs[idx].ticks = 0;
        t.mlfq.enqueue_tail(level + 1, idx);
    }
}

/// Choose the next runnable slot: Stride's minimum-pass entry if one exists
/// and undercuts the MLFQ aggregate's own pass, ties favoring Stride;
/// otherwise one MLFQ turn (boost check, then levels 0..=2, restarting from 0
/// whenever a higher level gains entries while a lower one is being drained).
fn pick_next(t: &mut ProcTable) -> Option<usize> {
    let mut min_pass = t.stride.mlfq_pass;
    let mut winner = None;
    for i in 0..t.procs.len() {
        let p = &t.procs[i];
        if p.state == ProcState::Runnable && p.cpu_share > 0 && p.pass <= min_pass {
            min_pass = p.pass;
            winner = Some(i);
        }
    }
    if let Some(idx) = winner {
        t.procs[idx].pass += t.procs[idx].stride as u64;
        return Some(idx);
    }

    t.stride.mlfq_pass += t.stride.mlfq_stride as u64;

    if t.stride.totalticks >= mlfq::BOOST_THRESHOLD {
        t.mlfq.drain_to_tail(1, 0);
        t.mlfq.drain_to_tail(2, 0);
        for p in t.procs.iter_mut() {
            if p.state != ProcState::Unused && p.cpu_share == 0 {
                p.level = 0;
                p.ticks = 0;
            }
        }
        t.stride.totalticks = 0;
    }

    let mut level = 0usize;
    while level < mlfq::NLEVELS {
        if level > 0 {
            let higher_nonempty = (0..level).any(|hl| !t.mlfq.is_empty(hl));
            if higher_nonempty {
                level = 0;
                continue;
            }
        }
        let candidates: alloc::vec::Vec<usize> = t.mlfq.iter(level).collect();
        for slot in candidates {
            if t.procs[slot].state == ProcState::Runnable {
                return Some(slot);
            }
        }
        level += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable_at(t: &mut ProcTable, idx: usize, level: usize) {
        t.procs[idx].state = ProcState::Runnable;
        t.procs[idx].level = level;
        t.procs[idx].cpu_share = 0;
        t.mlfq.enqueue_tail(level, idx);
    }

    #[test_case]
    fn pick_next_prefers_lowest_nonempty_level() {
        let mut t = ProcTable::new();
        runnable_at(&mut t, 1, 1);
        runnable_at(&mut t, 0, 0);
        assert_eq!(pick_next(&mut t), Some(0));
    }

    #[test_case]
    fn pick_next_falls_through_to_next_level_when_empty() {
        let mut t = ProcTable::new();
        runnable_at(&mut t, 2, 2);
        assert_eq!(pick_next(&mut t), Some(2));
    }

    #[test_case]
    fn pick_next_favors_stride_entry_under_mlfq_pass() {
        let mut t = ProcTable::new();
        runnable_at(&mut t, 0, 0);
        t.procs[1].state = ProcState::Runnable;
        t.procs[1].cpu_share = 50;
        t.procs[1].stride = 200;
        t.procs[1].pass = 0;
        t.stride.mlfq_pass = 1000;
        assert_eq!(pick_next(&mut t), Some(1));
        assert_eq!(t.procs[1].pass, 200);
    }

    #[test_case]
    fn apply_post_run_demotion_promotes_past_allotment() {
        let mut t = ProcTable::new();
        runnable_at(&mut t, 0, 0);
        t.procs[0].ticks = mlfq::ALLOTMENT[0];
        apply_post_run_demotion(&mut t, 0);
        assert_eq!(t.procs[0].level, 1);
        assert_eq!(t.procs[0].ticks, 0);
        assert!(t.mlfq.is_empty(0));
        assert_eq!(t.mlfq.iter(1).collect::<alloc::vec::Vec<_>>(), alloc::vec![0]);
    }

    #[test_case]
    fn apply_post_run_demotion_leaves_stride_process_alone() {
        let mut t = ProcTable::new();
        t.procs[0].state = ProcState::Runnable;
        t.procs[0].cpu_share = 30;
        t.procs[0].level = 0;
        t.procs[0].ticks = 999;
        apply_post_run_demotion(&mut t, 0);
        assert_eq!(t.procs[0].level, 0);
        assert_eq!(t.procs[0].ticks, 999);
    }

    #[test_case]
    fn pick_next_boosts_when_totalticks_crosses_threshold() {
        let mut t = ProcTable::new();
        runnable_at(&mut t, 0, 2);
        t.procs[0].ticks = 7;
        t.stride.totalticks = mlfq::BOOST_THRESHOLD;
        let chosen = pick_next(&mut t);
        assert_eq!(chosen, Some(0));
        assert_eq!(t.procs[0].level, 0);
        assert_eq!(t.procs[0].ticks, 0);
        assert_eq!(t.stride.totalticks, 0);
    }
}
