//! Errors surfaced by register-level hardware access.

pub type Result<T> = std::result::Result<T, RegisterError>;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("logical counter index {0} is out of range")]
    InvalidIndex(u32),

    #[error("failed to map MMIO region at 0x{base:X} (len 0x{len:X}): {reason}")]
    MmioMapFailed {
        base: u64,
        len: u64,
        reason: String,
    },

    #[error("system register access is unsupported on this target: {0}")]
    UnsupportedTarget(&'static str),

    #[error("counter index map has no free physical counters")]
    NoFreeCounters,
}
