//! # wperf-core
//!
//! The event scheduling, session-lock, and sampling engine shared by the
//! WindowsPerf kernel-mode device and user-mode agent: counter
//! allocation, per-core event assignment with multiplexing,
//! fixed-interval/overflow-driven collection, PC/LR sampling with
//! overflow-interrupt handling, SPE ring-buffer management, and the
//! IOCTL wire protocol types.
//!
//! Per spec.md §9, the kernel/user IOCTL boundary is modeled as an
//! in-process [`device::Device`] rather than a real `DeviceIoControl`
//! transport; everything above [`wperf_raw`]'s register access is plain
//! Rust so it can run (and be tested) without privileged access or real
//! hardware.

pub mod coreinfo;
pub mod device;
pub mod dmc;
pub mod error;
pub mod lock;
pub mod sampling;
pub mod scheduler;
pub mod wire;

pub use device::Device;
pub use error::{DeviceError, Result};
pub use lock::{HandleId, SessionLock};
pub use scheduler::{CoreSlot, Scheduler};
