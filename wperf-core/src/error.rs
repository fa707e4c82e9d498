//! Errors surfaced across the device-object boundary (the six response
//! statuses of spec.md §7), following the teacher's `thiserror`-based
//! error enum shape (`uncflow-agent/error.rs`).

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("device is not in a state that permits this operation: {0}")]
    InvalidDeviceState(String),

    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("caller-supplied buffer too small: need {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Unknown(String),

    #[error("register access failed: {0}")]
    Register(#[from] wperf_raw::RegisterError),
}
