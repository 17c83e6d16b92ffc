use core::fmt;

/// Mirrors `fs::error::FsError`/`FsResult` — the scheduler's own fallible
/// operations get the same enum-plus-Display treatment rather than bare
/// sentinel integers; only the syscall dispatcher lowers these to the raw
/// ABI values user mode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    NoFreeSlot,
    OutOfMemory,
    NoChildren,
    NoSuchThread,
    InvalidShare,
    ShareExceedsMlfqFloor,
    NoSuchProcess,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchedError::NoFreeSlot => write!(f, "process table is full"),
            SchedError::OutOfMemory => write!(f, "out of memory"),
            SchedError::NoChildren => write!(f, "no children to wait for"),
            SchedError::NoSuchThread => write!(f, "no such thread id"),
            SchedError::InvalidShare => write!(f, "cpu share must be positive"),
            SchedError::ShareExceedsMlfqFloor => {
                write!(f, "cpu share would starve the MLFQ below its floor")
            }
            SchedError::NoSuchProcess => write!(f, "no such process"),
        }
    }
}

pub type SchedResult<T> = Result<T, SchedError>;
