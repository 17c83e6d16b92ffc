//! `set_cpu_share`: migrate a process (and its thread group) from the MLFQ
//! into the Stride scheduler.

use super::cpu;
use super::error::{SchedError, SchedResult};
use super::stride::{split_share, stride_for_share, MLFQ_FLOOR};
use super::task::ProcState;
use super::PTABLE;

pub fn set_cpu_share(pid: u64, share: i32) -> SchedResult<i32> {
    if share <= 0 {
        return Err(SchedError::InvalidShare);
    }

    cpu::pushcli();
    let mut t = PTABLE.lock();

    let idx = match t.procs.iter().position(|p| p.pid == pid) {
        Some(idx) => idx,
        None => {
            drop(t);
            cpu::popcli();
            return Err(SchedError::NoSuchProcess);
        }
    };

    if t.stride.mlfq_share - share <= MLFQ_FLOOR {
        drop(t);
        cpu::popcli();
        return Err(SchedError::ShareExceedsMlfqFloor);
    }

    let min_pass = t
        .procs
        .iter()
        .filter(|p| p.state == ProcState::Runnable && p.cpu_share > 0)
        .map(|p| p.pass)
        .min()
        .unwrap_or(t.stride.mlfq_pass);

    // Always decrement q_count on removal — xv6's own removal loop doesn't on
    // every path, which this build treats as a bug to fix rather than preserve.
    if t.procs[idx].cpu_share == 0 {
        let level = t.procs[idx].level;
        t.mlfq.remove(level, idx);
    }

    t.stride.mlfq_share -= share;
    t.stride.recompute_mlfq_stride();

    let num_lwp = t.procs[idx].num_lwp;
    if num_lwp > 0 {
        let per_thread = split_share(share, num_lwp);
        let caller_pid = t.procs[idx].pid;
        t.procs[idx].cpu_share = per_thread;
        t.procs[idx].stride = stride_for_share(per_thread);
        t.procs[idx].pass = min_pass;

        for i in 0..t.procs.len() {
            if i != idx && t.procs[i].is_lwp && t.procs[i].parent == Some(caller_pid) {
                t.procs[i].cpu_share = per_thread;
                t.procs[i].stride = stride_for_share(per_thread);
                t.procs[i].pass = min_pass;
            }
        }
        drop(t);
        cpu::popcli();
        Ok(per_thread)
    } else {
        t.procs[idx].cpu_share = share;
        t.procs[idx].stride = stride_for_share(share);
        t.procs[idx].pass = min_pass;
        drop(t);
        cpu::popcli();
        Ok(share)
    }
}
