use crate::println;

/// ps — list active tasks from the real scheduler.
pub fn run(_args: &str) {
    let tasks = crate::scheduler::list_tasks();
    println!("  PID  STATE      LWP    LEVEL  SHARE  PASS       NAME");
    println!("  ---  ---------  -----  -----  -----  ---------  ----");
    for t in &tasks {
        let level_col = if t.cpu_share > 0 {
            alloc::string::String::from("-")
        } else {
            alloc::format!("{}", t.level)
        };
        println!(
            "  {:>3}  {:9?}  {:5}  {:>5}  {:>5}  {:>9}  {}",
            t.pid, t.state, t.is_lwp, level_col, t.cpu_share, t.pass, t.name
        );
    }
}
