//! # wperf-agent
//!
//! The user-mode half of WindowsPerf's metric-composition layer (C5):
//! symbolic event/metric resolution, the Shunting-Yard formula
//! evaluator, the `count.*` configuration store, and `Engine`, the
//! in-process counterpart to a real process opening the kernel-mode
//! device and issuing IOCTLs (spec.md §9).

pub mod common;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod shunting_yard;

pub use config::DrvConfig;
pub use engine::Engine;
pub use error::{AgentError, Result};
pub use metrics::MetricDef;
