use crate::println;

/// exec — load and execute an ELF64 binary from disk.
pub fn run(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        println!("Usage: exec <path>");
        println!("  Example: exec /disk/test.elf");
        return;
    }

    println!("[EXEC] Loading {}...", path);

    // `load` replaces the calling process in place and never returns on
    // success, so reaching this match arm at all means it failed.
    match crate::loader::elf::load(path) {
        Ok(()) => unreachable!("exec succeeded but returned"),
        Err(e) => println!("[EXEC] Failed: {}", e),
    }
}
