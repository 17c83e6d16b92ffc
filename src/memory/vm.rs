//! Stand-in for xv6's `vm.c`: the process-facing virtual-memory operations
//! the scheduler calls into (`fork`, `growproc`, LWP creation) to size and
//! duplicate a process's address space.
//!
//! A real implementation would walk and copy page tables through the
//! `paging`/`frame_allocator` pair above. This kernel's paging subsystem only
//! reads the bootloader's identity map (see `paging::init_paging`) and has no
//! page-table-cloning or user-mapping path yet, so `pgdir` here is not a real
//! CR3 value — it is an opaque handle (in practice the owning process's pid)
//! threaded through unchanged, and `sz` is tracked as a plain byte count
//! rather than backed by real mappings. This keeps the scheduler's accounting
//! (address-space size, LWP stack growth, fork's "duplicate the parent")
//! faithful to the source's call shape without a real VM subsystem behind it;
//! see DESIGN.md.

/// Duplicate a process's address space for `fork`. Until real page-table
/// copying exists this just hands back the same handle — children end up
/// sharing the parent's identity-mapped region rather than a private copy.
pub fn copy_uvm(pgdir: u64, _sz: usize) -> u64 {
    pgdir
}

/// Grow `pgdir`'s mapped size from `old_sz` to `new_sz`, returning the new
/// size. No real allocation occurs since the only backing store is the
/// bootloader's identity map.
pub fn alloc_uvm(_pgdir: u64, _old_sz: usize, new_sz: usize) -> usize {
    new_sz
}

/// Shrink `pgdir`'s mapped size from `old_sz` to `new_sz`, returning the new
/// size.
pub fn dealloc_uvm(_pgdir: u64, _old_sz: usize, new_sz: usize) -> usize {
    new_sz
}

/// Release a process's address space once it has no threads left sharing it.
/// A real implementation would walk and free every page-table level; since
/// `pgdir` is just an opaque per-process handle here there are no pages to
/// walk, but the call site is kept so `proc_wait`'s reclamation order matches
/// the source's `exit`/`wait` (`freevm(pgdir)` after the kernel stack).
pub fn free_vm(_pgdir: u64) {}
