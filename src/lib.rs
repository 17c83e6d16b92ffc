#![no_std]
#![feature(abi_x86_interrupt)]
#![cfg_attr(test, feature(custom_test_frameworks))]
#![cfg_attr(test, test_runner(crate::test_framework::test_runner))]
#![cfg_attr(test, reexport_test_harness_main = "test_main")]

extern crate alloc;

pub mod allocator;
pub mod vga;
pub mod serial;
pub mod interrupts;
pub mod memory;
pub mod scheduler;
pub mod syscalls;
pub mod drivers;
pub mod fs;
pub mod shell;
pub mod loader;

#[cfg(test)]
pub mod test_framework;

use core::panic::PanicInfo;

/// The body of `init`, pid 1: brings up the syscall/driver layers that need a
/// live process context, then drives the interactive shell's keyboard loop
/// forever. Runs as an ordinary MLFQ process, the same as anything `fork`ed
/// or `exec`ed afterward — there is nothing privileged about being pid 1
/// beyond being the root of the reparenting tree.
extern "C" fn kernel_main_task(_arg: u64) -> ! {
    syscalls::init();
    drivers::init();
    println!("AtomicOS is successfully running!");

    loop {
        use crate::drivers::keyboard::scancodes::KeyCode;
        let key = crate::drivers::keyboard::read_char();

        match key {
            KeyCode::Char(c) => print!("{}", c),
            KeyCode::Enter => println!(),
            KeyCode::Backspace => crate::vga::WRITER.lock().backspace(),
            KeyCode::Unknown => {}
        }
    }
}

#[no_mangle]
pub extern "C" fn _start(multiboot_info_addr: usize) -> ! {
    vga::init();
    serial::init();
    interrupts::init();
    log_info!("AtomicOS Kernel started.");

    memory::init(multiboot_info_addr);
    log_info!("AtomicOS Memory intialized.");

    scheduler::init(kernel_main_task);
    log_info!("AtomicOS Scheduler initialized.");

    #[cfg(test)]
    test_main();

    x86_64::instructions::interrupts::enable();
    scheduler::run();
}

#[panic_handler]
#[cfg(not(test))]
fn panic(info: &PanicInfo) -> ! {
    println!("{}", info);
    log_error!("{}", info);
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
#[cfg(test)]
fn panic(info: &PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}
