use crate::println;

/// yield — cooperatively yield to the next ready task.
pub fn run(_args: &str) {
    println!("yield: switching to next task...");
    crate::scheduler::yield_now();
}
