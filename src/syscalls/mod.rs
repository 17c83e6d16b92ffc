use crate::scheduler;

/// Syscall numbers (passed in RAX from userland).
pub const SYS_EXIT:  u64 = 0;
pub const SYS_WRITE: u64 = 1;
pub const SYS_YIELD: u64 = 2;
pub const SYS_GETPID: u64 = 3;
pub const SYS_FORK: u64   = 4;
pub const SYS_EXEC: u64   = 5;
pub const SYS_WAIT: u64   = 6;

// File Descriptor Syscalls (Phase 5.4)
pub const SYS_OPEN:  u64 = 7;
pub const SYS_CLOSE: u64 = 8;
pub const SYS_READ:  u64 = 9;
pub const SYS_DUP:   u64 = 10;
pub const SYS_DUP2:  u64 = 11;
pub const SYS_PIPE:  u64 = 12;

/// Central syscall dispatcher — called from the int 0x80 handler.
/// Arguments come from registers: rax=number, rdi=arg0, rsi=arg1, rdx=arg2.
/// Returns result in rax.
pub extern "C" fn dispatch(number: u64, arg0: u64, arg1: u64, arg2: u64) -> u64 {
    // Enable interrupts so that system calls can be preempted by hardware timers!
    // Since int 0x80 goes through an Interrupt Gate, the CPU automatically masks IF=0.
    x86_64::instructions::interrupts::enable();

    match number {
        SYS_EXIT => {
            let exit_code = arg0;
            scheduler::exit_current(exit_code);
        }
        SYS_READ => {
            let fd = arg0 as usize;
            let ptr = arg1 as *mut u8;
            let len = arg2 as usize;

            if len == 0 || len > 1024 * 1024 { return u64::MAX; }
            let slice = unsafe { core::slice::from_raw_parts_mut(ptr, len) };

            let file_arc = match scheduler::with_current_ofile(fd, |slot| slot.clone()) {
                Some(Some(f)) => f,
                _ => return u64::MAX,
            };

            use crate::fs::fd::FileType;
            loop {
                let mut file = file_arc.lock();
                if !file.readable { return u64::MAX; }

                match &mut file.file_type {
                    FileType::Console => {
                        // Console read is a simplified stand-in; TTY line
                        // discipline is out of scope here.
                        slice[0] = b'\n';
                        return 1;
                    }
                    FileType::Regular => {
                        // VFS read is a stand-in for Phase 5.4 — returns EOF.
                        return 0;
                    }
                    FileType::PipeRead(pipe_inner) => {
                        let chan = alloc::sync::Arc::as_ptr(pipe_inner) as usize;
                        let mut inner = pipe_inner.lock();
                        if !inner.is_empty() {
                            let read_bytes = inner.read(slice);
                            drop(inner);
                            drop(file);
                            scheduler::wakeup(chan);
                            return read_bytes as u64;
                        }
                        if inner.active_writers() == 0 {
                            return 0; // EOF
                        }
                        drop(inner);
                        drop(file);
                        scheduler::sleep(chan);
                        // loop back around and retry once woken
                    }
                    _ => return u64::MAX,
                }
            }
        }
        SYS_WRITE => {
            let fd = arg0 as usize;
            let ptr = arg1 as *const u8;
            let len = arg2 as usize;

            if len == 0 || len > 1024 * 1024 { return u64::MAX; }
            let slice = unsafe { core::slice::from_raw_parts(ptr, len) };

            let file_arc = match scheduler::with_current_ofile(fd, |slot| slot.clone()) {
                Some(Some(f)) => f,
                _ => return u64::MAX,
            };

            use crate::fs::fd::FileType;
            loop {
                let mut file = file_arc.lock();
                if !file.writable { return u64::MAX; }

                match &mut file.file_type {
                    FileType::Console => {
                        if let Ok(s) = core::str::from_utf8(slice) {
                            print_no_newline(s);
                        }
                        return len as u64;
                    }
                    FileType::Regular => {
                        // VFS write is a stand-in for Phase 5.4.
                        return len as u64;
                    }
                    FileType::PipeWrite(pipe_inner) => {
                        let chan = alloc::sync::Arc::as_ptr(pipe_inner) as usize;
                        let mut inner = pipe_inner.lock();
                        if !inner.is_full() {
                            let written = inner.write(slice);
                            drop(inner);
                            drop(file);
                            scheduler::wakeup(chan);
                            return written as u64;
                        }
                        if inner.active_readers() == 0 {
                            return u64::MAX; // broken pipe
                        }
                        drop(inner);
                        drop(file);
                        scheduler::sleep(chan);
                    }
                    _ => return u64::MAX,
                }
            }
        }
        SYS_YIELD => {
            scheduler::yield_now();
            0
        }
        SYS_GETPID => {
            scheduler::current_pid().unwrap_or(0)
        }
        SYS_FORK => {
            // Not POSIX fork: no address-space duplication is available, so
            // the caller passes the child's own start routine and argument
            // explicitly (arg0 = entry fn pointer, arg1 = arg) instead of
            // resuming at the call site. See DESIGN.md.
            let entry: scheduler::EntryFn = unsafe { core::mem::transmute(arg0 as usize) };
            match scheduler::fork_task(entry, arg1, "fork") {
                Ok(pid) => pid,
                Err(e) => {
                    crate::log_error!("sys_fork failed: {}", e);
                    u64::MAX
                }
            }
        }
        SYS_EXEC => {
            let ptr = arg0 as *const u8;
            let len = arg1 as usize;
            if len > 4096 { return u64::MAX; }
            let slice = unsafe { core::slice::from_raw_parts(ptr, len) };
            if let Ok(path) = core::str::from_utf8(slice) {
                match crate::loader::elf::load(path) {
                    Ok(()) => unreachable!("exec replaced this process"),
                    Err(e) => {
                        crate::log_error!("sys_exec failed: {:?}", e);
                        u64::MAX
                    }
                }
            } else {
                u64::MAX
            }
        }
        SYS_WAIT => {
            match scheduler::wait() {
                Ok(pid) => pid,
                Err(_) => u64::MAX,
            }
        }
        SYS_OPEN => {
            let ptr = arg0 as *const u8;
            let len = arg1 as usize;
            if len > 4096 { return u64::MAX; }
            let slice = unsafe { core::slice::from_raw_parts(ptr, len) };
            let path = core::str::from_utf8(slice).unwrap_or("");

            // FIXME: simplified VFS pass-through focusing only on FAT32 for
            // Phase 5.4 requirements. A real VFS open would return an inode
            // handle; here any non-empty path is accepted.
            if path.is_empty() { return u64::MAX; }

            use crate::fs::fd::File;
            match scheduler::alloc_fd(File::new_regular(path, true, true)) {
                Some(fd) => fd as u64,
                None => u64::MAX, // table full
            }
        }
        SYS_CLOSE => {
            let fd = arg0 as usize;
            match scheduler::with_current_ofile(fd, |slot| *slot = None) {
                Some(()) => 0,
                None => u64::MAX,
            }
        }
        SYS_DUP => {
            let old_fd = arg0 as usize;
            let file_arc = match scheduler::with_current_ofile(old_fd, |slot| slot.clone()) {
                Some(Some(f)) => f,
                _ => return u64::MAX,
            };
            match scheduler::alloc_fd(file_arc) {
                Some(new_fd) => new_fd as u64,
                None => u64::MAX,
            }
        }
        SYS_DUP2 => {
            let old_fd = arg0 as usize;
            let new_fd = arg1 as usize;
            if old_fd == new_fd { return new_fd as u64; }

            let file_arc = match scheduler::with_current_ofile(old_fd, |slot| slot.clone()) {
                Some(Some(f)) => f,
                _ => return u64::MAX,
            };
            match scheduler::with_current_ofile(new_fd, |slot| *slot = Some(file_arc)) {
                Some(()) => new_fd as u64,
                None => u64::MAX,
            }
        }
        SYS_PIPE => {
            let fds_ptr = arg0 as *mut [u32; 2];

            use alloc::sync::Arc;
            use alloc::string::String;
            use spin::Mutex;
            use crate::fs::fd::{File, FileType};

            let inner = crate::fs::pipe::PipeInner::new();
            inner.lock().add_reader();
            inner.lock().add_writer();

            let read_file = Arc::new(Mutex::new(File {
                file_type: FileType::PipeRead(inner.clone()),
                path: String::from("pipe"),
                offset: 0,
                readable: true,
                writable: false,
            }));
            let write_file = Arc::new(Mutex::new(File {
                file_type: FileType::PipeWrite(inner),
                path: String::from("pipe"),
                offset: 0,
                readable: false,
                writable: true,
            }));

            let fd_read = match scheduler::alloc_fd(read_file) {
                Some(fd) => fd,
                None => return u64::MAX,
            };
            let fd_write = match scheduler::alloc_fd(write_file) {
                Some(fd) => fd,
                None => {
                    scheduler::with_current_ofile(fd_read, |slot| *slot = None);
                    return u64::MAX;
                }
            };

            unsafe {
                (*fds_ptr)[0] = fd_read as u32;
                (*fds_ptr)[1] = fd_write as u32;
            }
            0
        }
        _ => {
            crate::log_warn!("syscall: unknown number {}", number);
            u64::MAX // error
        }
    }
}

/// Print without trailing newline.
fn print_no_newline(s: &str) {
    use core::fmt::Write;
    let _ = crate::vga::WRITER.lock().write_str(s);
    let _ = crate::serial::SERIAL1.lock().write_str(s);
}

// ── Kernel-side wrappers (called directly from kernel code, not via int 0x80) ──

/// sys_write: write a string to the VGA terminal (kernel-side).
pub fn sys_write(msg: &str) {
    crate::println!("{}", msg);
}

/// sys_yield: cooperatively yield the CPU.
pub fn sys_yield() {
    scheduler::yield_now();
}

/// sys_exit: terminate the current process with the given status.
pub fn sys_exit(code: u64) -> ! {
    scheduler::exit_current(code)
}

/// sys_spawn: fork a new heavyweight process running `entry(0)`.
pub fn sys_spawn(entry: scheduler::EntryFn, name: &str) -> u64 {
    match scheduler::fork_task(entry, 0, name) {
        Ok(pid) => pid,
        Err(e) => {
            crate::log_error!("sys_spawn failed: {}", e);
            u64::MAX
        }
    }
}

/// sys_getpid: return the current process's pid.
pub fn sys_getpid() -> u64 {
    scheduler::current_pid().unwrap_or(0)
}

pub fn init() {
    crate::log_info!("Syscall interface initialized.");
}
