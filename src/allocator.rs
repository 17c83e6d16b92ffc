//! Kernel heap, backing every `alloc::{Vec,Box,String,Arc}` used by the scheduler and
//! filesystem modules.
//!
//! The bootloader identity-maps the first 1 GiB of physical memory (see `memory::init`),
//! so rather than carve a heap range out of a real virtual-memory mapper — the paging
//! subsystem here stops at reading the active level-4 table — the heap lives in a
//! statically reserved BSS region that is already mapped by construction.

use linked_list_allocator::LockedHeap;

pub const HEAP_SIZE: usize = 1024 * 1024; // 1 MiB

#[repr(align(4096))]
struct HeapArea([u8; HEAP_SIZE]);

static mut HEAP_AREA: HeapArea = HeapArea([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapError;

/// Hands the global allocator a statically reserved, already-mapped region to manage.
///
/// Must be called exactly once, before any `alloc`-crate type is constructed.
pub fn init_heap() -> Result<(), HeapError> {
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_AREA) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    Ok(())
}
