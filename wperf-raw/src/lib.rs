//! # wperf-raw
//!
//! Typed register access to the ARM64 PMU, DSU, DMC, and SPE facilities
//! (the counter abstraction tier, C1): start/stop/reset/read primitives
//! and logical-to-physical counter index remapping.
//!
//! Real hardware is addressed only on `aarch64` builds with the
//! `aarch64-sysreg` feature enabled, via inline `mrs`/`msr` assembly
//! (`sysreg::SysregBackend`) and mapped MMIO (a real `dmc::MmioRegion`
//! impl). Every other build, and all tests, run against in-memory
//! simulated backends (`sysreg::SimBackend`, `dmc::SimMmio`) so the
//! scheduling and dispatch logic above this crate can be exercised
//! without real hardware.
//!
//! ## Usage
//!
//! ```ignore
//! use wperf_raw::pmu::Pmu;
//! use wperf_raw::sysreg::SimBackend;
//!
//! let pmu = Pmu::new(SimBackend::new());
//! pmu.counter_start();
//! let delta = pmu.read_cycle_counter_delta();
//! ```

pub mod counter_map;
pub mod dmc;
pub mod dsu;
pub mod error;
pub mod pmu;
pub mod register;
pub mod spe;
pub mod sysreg;

pub use counter_map::CounterIndexMap;
pub use dmc::{DmcChannel, MmioRegion};
pub use dsu::Dsu;
pub use error::{RegisterError, Result};
pub use pmu::Pmu;
pub use register::{Register, RegisterLayout};
pub use spe::{Spe, SpeConfig};
pub use sysreg::{SysReg, SystemRegister};
