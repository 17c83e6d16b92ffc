use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

// ══════════════════════════════════════════════════════════════
//  ELF64 constants
// ══════════════════════════════════════════════════════════════

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8    = 2;
const ELFDATA2LSB: u8   = 1;
const ET_EXEC: u16      = 2;
const EM_X86_64: u16    = 62;
const PT_LOAD: u32      = 1;

// ══════════════════════════════════════════════════════════════
//  ELF64 structures
// ══════════════════════════════════════════════════════════════

struct Elf64Ehdr {
    e_entry: u64,
    e_phoff: u64,
    e_phentsize: u16,
    e_phnum: u16,
}

impl Elf64Ehdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 64 { return Err(ExecError::InvalidFormat); }
        if data[0..4] != ELF_MAGIC { return Err(ExecError::InvalidFormat); }
        if data[4] != ELFCLASS64 { return Err(ExecError::UnsupportedArch); }
        if data[5] != ELFDATA2LSB { return Err(ExecError::UnsupportedArch); }

        let e_type = u16::from_le_bytes([data[16], data[17]]);
        let e_machine = u16::from_le_bytes([data[18], data[19]]);
        if e_type != ET_EXEC { return Err(ExecError::UnsupportedType); }
        if e_machine != EM_X86_64 { return Err(ExecError::UnsupportedArch); }

        Ok(Elf64Ehdr {
            e_entry: u64::from_le_bytes(data[24..32].try_into().unwrap()),
            e_phoff: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes([data[54], data[55]]),
            e_phnum: u16::from_le_bytes([data[56], data[57]]),
        })
    }
}

struct Elf64Phdr {
    p_type: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_filesz: u64,
    p_memsz: u64,
}

impl Elf64Phdr {
    fn parse(data: &[u8]) -> Result<Self, ExecError> {
        if data.len() < 56 { return Err(ExecError::InvalidFormat); }
        Ok(Elf64Phdr {
            p_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            p_offset: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            p_vaddr: u64::from_le_bytes(data[16..24].try_into().unwrap()),
            p_filesz: u64::from_le_bytes(data[32..40].try_into().unwrap()),
            p_memsz: u64::from_le_bytes(data[40..48].try_into().unwrap()),
        })
    }
}

// ══════════════════════════════════════════════════════════════
//  ExecError
// ══════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum ExecError {
    FileNotFound,
    InvalidFormat,
    UnsupportedArch,
    UnsupportedType,
    MemoryError,
    ReadError,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::FileNotFound    => write!(f, "File not found"),
            ExecError::InvalidFormat   => write!(f, "Invalid ELF format"),
            ExecError::UnsupportedArch => write!(f, "Unsupported architecture"),
            ExecError::UnsupportedType => write!(f, "Unsupported ELF type (need ET_EXEC)"),
            ExecError::MemoryError     => write!(f, "Memory allocation error"),
            ExecError::ReadError       => write!(f, "File read error"),
        }
    }
}

// ══════════════════════════════════════════════════════════════
//  User-mode task info — stored globally so the trampoline can access it
// ══════════════════════════════════════════════════════════════

use alloc::boxed::Box;

/// Info needed by the usermode trampoline, handed off as a leaked `Box`
/// pointer through `scheduler::exec_current`'s `arg: u64` rather than a
/// shared global, so a second `exec` racing the first can't clobber it.
struct UserTaskInfo {
    entry: u64,
    user_stack_top: u64,
}

/// Trampoline function — runs as the process's new program body once
/// `exec_current` resumes it, then jumps to Ring 3. Never returns.
extern "C" fn usermode_trampoline(arg: u64) -> ! {
    let info = unsafe { *Box::from_raw(arg as *mut UserTaskInfo) };

    let user_cs = crate::interrupts::gdt::user_code_selector().0;
    let user_ss = crate::interrupts::gdt::user_data_selector().0;

    crate::log_info!("ELF: jumping to Ring 3 — entry={:#x} stack={:#x} cs={:#x} ss={:#x}",
        info.entry, info.user_stack_top, user_cs, user_ss);

    crate::interrupts::usermode::jump_to_usermode(
        info.entry,
        info.user_stack_top,
        user_cs,
        user_ss,
    );
    unreachable!("jump_to_usermode returned")
}

// ══════════════════════════════════════════════════════════════
//  ELF Loader
// ══════════════════════════════════════════════════════════════

/// Stack size for user programs (16 KiB).
const USER_STACK_SIZE: usize = 4096 * 4;

/// Load an ELF64 binary and replace the calling process's program with it.
/// Segments land in the identity-mapped first gigabyte the same way the rest
/// of this kernel addresses physical memory (see `memory::mod::init`), so
/// unlike a real `exec` this never needs to map fresh pages for the image —
/// only the user stack region needs to exist, and it already does for the
/// same reason. On success this never returns.
pub fn load(path: &str) -> Result<(), ExecError> {
    // 1. Read entire file
    let file_data = read_file_all(path)?;

    // 2. Parse ELF header
    let ehdr = Elf64Ehdr::parse(&file_data)?;

    crate::log_info!("ELF: entry={:#x} phoff={} phnum={}", ehdr.e_entry, ehdr.e_phoff, ehdr.e_phnum);

    // 3. Find load range
    let mut load_base: u64 = u64::MAX;
    let mut load_end: u64 = 0;

    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let phdr = Elf64Phdr::parse(&file_data[off..])?;
        if phdr.p_type != PT_LOAD { continue; }
        if phdr.p_vaddr < load_base { load_base = phdr.p_vaddr; }
        let seg_end = phdr.p_vaddr + phdr.p_memsz;
        if seg_end > load_end { load_end = seg_end; }
    }

    if load_base == u64::MAX {
        return Err(ExecError::InvalidFormat);
    }

    // 4. Compute user stack bounds
    let load_end_aligned = (load_end + 4095) & !4095;
    let user_stack_base = load_end_aligned;
    let user_stack_top = user_stack_base + USER_STACK_SIZE as u64;

    // 5. Copy file data directly into the identity-mapped image range.
    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * ehdr.e_phentsize as usize;
        let phdr = Elf64Phdr::parse(&file_data[off..])?;
        if phdr.p_type != PT_LOAD { continue; }

        let dest_ptr = phdr.p_vaddr as *mut u8;
        let file_offset = phdr.p_offset as usize;
        let file_size = phdr.p_filesz as usize;

        if file_offset + file_size <= file_data.len() {
            unsafe {
                core::ptr::copy_nonoverlapping(
                    file_data[file_offset..].as_ptr(),
                    dest_ptr,
                    file_size,
                );
            }
        }

        // BSS zeroing
        if phdr.p_memsz > phdr.p_filesz {
            let bss_size = (phdr.p_memsz - phdr.p_filesz) as usize;
            unsafe {
                core::ptr::write_bytes(dest_ptr.add(file_size), 0, bss_size);
            }
        }
    }

    let real_entry = ehdr.e_entry;

    crate::log_info!("ELF: mapped at {:#x}, entry={:#x} stack_top={:#x}", load_base, real_entry, user_stack_top);

    // 6. Hand the entry point and stack top to the trampoline and replace
    // the calling process's program with it. Never returns.
    let task_name = extract_filename(path);
    let info = Box::new(UserTaskInfo {
        entry: real_entry,
        user_stack_top,
    });
    crate::scheduler::exec_current(usermode_trampoline, Box::into_raw(info) as u64, &task_name);
}

fn read_file_all(path: &str) -> Result<Vec<u8>, ExecError> {
    let vfs = crate::fs::VFS.lock();
    let inode = vfs.lookup(path).map_err(|_| ExecError::FileNotFound)?;
    if inode.size == 0 { return Err(ExecError::InvalidFormat); }
    let mut buf = vec![0u8; inode.size];
    let bytes_read = vfs.read_file(path, 0, &mut buf).map_err(|_| ExecError::ReadError)?;
    buf.truncate(bytes_read);
    Ok(buf)
}

fn extract_filename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).into()
}
