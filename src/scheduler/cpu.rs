//! Per-CPU state: the scheduler's own parking context plus the xv6-style
//! `pushcli`/`popcli` interrupt-nesting counter that a kernel thread carries
//! with it across a context switch (it is a property of the logical thread of
//! control, not of the physical CPU core).

use super::context::Context;

/// This build runs a single logical CPU; the table is still indexed by CPU id
/// so a future build can raise it without reshaping the scheduler.
pub const NCPU: usize = 1;

#[derive(Clone, Copy)]
pub struct Cpu {
    /// The context the scheduler loop parks in while a process runs.
    pub scheduler_context: Context,
    /// Depth of nested `pushcli` calls.
    pub ncli: usize,
    /// Whether interrupts were enabled before the first `pushcli` in the nest.
    pub intena: bool,
    /// Index into `PTABLE.procs` of the process currently running here, if any.
    pub current: Option<usize>,
}

impl Cpu {
    pub const fn new() -> Self {
        Cpu {
            scheduler_context: Context::empty(),
            ncli: 0,
            intena: false,
            current: None,
        }
    }
}

static mut CPUS: [Cpu; NCPU] = [Cpu::new(); NCPU];

pub fn cpuid() -> usize {
    0
}

/// # Panics
/// Panics if called with interrupts enabled, matching xv6's own `mycpu`
/// guard: without that guard a timer interrupt could migrate the caller to
/// a different logical CPU mid-read on a real multi-CPU build.
pub fn mycpu() -> &'static mut Cpu {
    if x86_64::instructions::interrupts::are_enabled() {
        panic!("mycpu called with interrupts enabled");
    }
    unsafe { &mut (*core::ptr::addr_of_mut!(CPUS))[cpuid()] }
}

/// Disable interrupts, pushing one level onto this CPU's nesting count.
/// The first `pushcli` in a nest remembers whether interrupts were enabled
/// so the matching `popcli` can restore that state exactly.
pub fn pushcli() {
    let was_enabled = x86_64::instructions::interrupts::are_enabled();
    x86_64::instructions::interrupts::disable();
    let c = unsafe { &mut (*core::ptr::addr_of_mut!(CPUS))[cpuid()] };
    if c.ncli == 0 {
        c.intena = was_enabled;
    }
    c.ncli += 1;
}

/// Pop one level of `pushcli` nesting, re-enabling interrupts only once the
/// outermost `pushcli` unwinds and only if they were enabled beforehand.
pub fn popcli() {
    if x86_64::instructions::interrupts::are_enabled() {
        panic!("popcli: interrupts already enabled");
    }
    let c = unsafe { &mut (*core::ptr::addr_of_mut!(CPUS))[cpuid()] };
    if c.ncli == 0 {
        panic!("popcli: no matching pushcli");
    }
    c.ncli -= 1;
    if c.ncli == 0 && c.intena {
        x86_64::instructions::interrupts::enable();
    }
}
