//! Low-level system-register read/write primitives
//!
//! The core PMU's 31 programmable counters are each addressed by their
//! own named register (`PMEVTYPER<n>_EL0`/`PMEVCNTR<n>_EL0`): `mrs`/`msr`
//! take a compile-time-fixed register name, so there is no way to index
//! into the counter bank at runtime — the driver this is grounded on
//! (`original_source/wperf-driver/core.c`'s `CoreCouterSetType`/
//! `CoreReadCounter`) resolves this with a 31-way switch over the named
//! registers, and [`typer_reg`]/[`cntr_reg`] below mirror that switch.
//!
//! The DSU's cluster PMU is different: its counters ARE addressed
//! indirectly, through `CLUSTERPMSELR_EL1` selecting a counter before
//! `CLUSTERPMXEVCNTR_EL1`/`CLUSTERPMXEVTYPER_EL1` operate on it
//! (`original_source/wperf-driver/dsu.c`).
//!
//! Everywhere except a real aarch64 build, and in all tests, a simulated
//! register file stands in so the scheduling and dispatch logic above it
//! can be exercised without real hardware.

use crate::error::{RegisterError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Generates the `SysReg` enum, `SysregBackend`'s real-hardware
/// read/write, and the [`typer_reg`]/[`cntr_reg`] counter-index lookups
/// from one listing of registers, so the fixed and per-counter variants
/// never drift out of sync with each other.
macro_rules! sysreg_def {
    (
        fixed { $($fvariant:ident => $fname:literal),+ $(,)? }
        indexed { $(($idx:literal, $typer:ident, $tname:literal, $cntr:ident, $cname:literal)),+ $(,)? }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(non_camel_case_types)]
        pub enum SysReg {
            $($fvariant,)+
            $($typer,)+
            $($cntr,)+
        }

        #[cfg(all(target_arch = "aarch64", feature = "aarch64-sysreg"))]
        impl SystemRegister for SysregBackend {
            fn read(&self, reg: SysReg) -> u64 {
                let value: u64;
                unsafe {
                    match reg {
                        $(SysReg::$fvariant => core::arch::asm!(concat!("mrs {}, ", $fname), out(reg) value),)+
                        $(SysReg::$typer => core::arch::asm!(concat!("mrs {}, ", $tname), out(reg) value),)+
                        $(SysReg::$cntr => core::arch::asm!(concat!("mrs {}, ", $cname), out(reg) value),)+
                    }
                }
                value
            }

            fn write(&self, reg: SysReg, value: u64) {
                unsafe {
                    match reg {
                        $(SysReg::$fvariant => core::arch::asm!(concat!("msr ", $fname, ", {}"), in(reg) value),)+
                        $(SysReg::$typer => core::arch::asm!(concat!("msr ", $tname, ", {}"), in(reg) value),)+
                        $(SysReg::$cntr => core::arch::asm!(concat!("msr ", $cname, ", {}"), in(reg) value),)+
                    }
                    core::arch::asm!("isb");
                }
            }
        }

        /// Resolves a physical counter index (0..=30) to its dedicated
        /// `PMEVTYPER<n>_EL0` register (`core.c::CoreCouterSetType`'s switch).
        pub fn typer_reg(idx: u32) -> Result<SysReg> {
            match idx {
                $($idx => Ok(SysReg::$typer),)+
                _ => Err(RegisterError::InvalidIndex(idx)),
            }
        }

        /// Resolves a physical counter index (0..=30) to its dedicated
        /// `PMEVCNTR<n>_EL0` register (`core.c::CoreReadCounter`'s switch).
        pub fn cntr_reg(idx: u32) -> Result<SysReg> {
            match idx {
                $($idx => Ok(SysReg::$cntr),)+
                _ => Err(RegisterError::InvalidIndex(idx)),
            }
        }
    };
}

sysreg_def! {
    fixed {
        PMCR_EL0 => "PMCR_EL0",
        PMCNTENSET_EL0 => "PMCNTENSET_EL0",
        PMCNTENCLR_EL0 => "PMCNTENCLR_EL0",
        PMINTENSET_EL1 => "PMINTENSET_EL1",
        PMINTENCLR_EL1 => "PMINTENCLR_EL1",
        PMOVSSET_EL0 => "PMOVSSET_EL0",
        PMOVSCLR_EL0 => "PMOVSCLR_EL0",
        PMCCNTR_EL0 => "PMCCNTR_EL0",
        // Identification registers read by QUERY_HW_CFG.
        MIDR_EL1 => "MIDR_EL1",
        ID_DFR0_EL1 => "ID_DFR0_EL1",
        // DSU (DynamIQ Shared Unit) cluster PMU: selector-indirected,
        // unlike the core PMU above.
        CLUSTERPMCR_EL1 => "S3_0_C15_C5_0",
        CLUSTERPMCNTENSET_EL1 => "S3_0_C15_C5_1",
        CLUSTERPMCNTENCLR_EL1 => "S3_0_C15_C5_2",
        CLUSTERPMOVSSET_EL1 => "S3_0_C15_C5_3",
        CLUSTERPMOVSCLR_EL1 => "S3_0_C15_C5_4",
        CLUSTERPMSELR_EL1 => "S3_0_C15_C5_5",
        CLUSTERPMXEVCNTR_EL1 => "S3_0_C15_C6_0",
        CLUSTERPMXEVTYPER_EL1 => "S3_0_C15_C6_1",
        CLUSTERPMCCNTR_EL1 => "S3_0_C15_C6_2",
        // SPE
        PMBPTR_EL1 => "S3_0_C9_C10_1",
        PMBLIMITR_EL1 => "S3_0_C9_C10_0",
        PMSFCR_EL1 => "S3_0_C9_C9_4",
        PMSCR_EL1 => "S3_0_C9_C9_0",
        PMSICR_EL1 => "S3_0_C9_C9_2",
        PMSIRR_EL1 => "S3_0_C9_C9_3",
        PMSEVFR_EL1 => "S3_0_C9_C9_5",
        PMBSR_EL1 => "S3_0_C9_C10_3",
        PMBIDR_EL1 => "S3_0_C9_C10_7",
        PMSIDR_EL1 => "S3_0_C9_C9_7",
    }
    indexed {
        (0, PMEVTYPER0_EL0, "PMEVTYPER0_EL0", PMEVCNTR0_EL0, "PMEVCNTR0_EL0"),
        (1, PMEVTYPER1_EL0, "PMEVTYPER1_EL0", PMEVCNTR1_EL0, "PMEVCNTR1_EL0"),
        (2, PMEVTYPER2_EL0, "PMEVTYPER2_EL0", PMEVCNTR2_EL0, "PMEVCNTR2_EL0"),
        (3, PMEVTYPER3_EL0, "PMEVTYPER3_EL0", PMEVCNTR3_EL0, "PMEVCNTR3_EL0"),
        (4, PMEVTYPER4_EL0, "PMEVTYPER4_EL0", PMEVCNTR4_EL0, "PMEVCNTR4_EL0"),
        (5, PMEVTYPER5_EL0, "PMEVTYPER5_EL0", PMEVCNTR5_EL0, "PMEVCNTR5_EL0"),
        (6, PMEVTYPER6_EL0, "PMEVTYPER6_EL0", PMEVCNTR6_EL0, "PMEVCNTR6_EL0"),
        (7, PMEVTYPER7_EL0, "PMEVTYPER7_EL0", PMEVCNTR7_EL0, "PMEVCNTR7_EL0"),
        (8, PMEVTYPER8_EL0, "PMEVTYPER8_EL0", PMEVCNTR8_EL0, "PMEVCNTR8_EL0"),
        (9, PMEVTYPER9_EL0, "PMEVTYPER9_EL0", PMEVCNTR9_EL0, "PMEVCNTR9_EL0"),
        (10, PMEVTYPER10_EL0, "PMEVTYPER10_EL0", PMEVCNTR10_EL0, "PMEVCNTR10_EL0"),
        (11, PMEVTYPER11_EL0, "PMEVTYPER11_EL0", PMEVCNTR11_EL0, "PMEVCNTR11_EL0"),
        (12, PMEVTYPER12_EL0, "PMEVTYPER12_EL0", PMEVCNTR12_EL0, "PMEVCNTR12_EL0"),
        (13, PMEVTYPER13_EL0, "PMEVTYPER13_EL0", PMEVCNTR13_EL0, "PMEVCNTR13_EL0"),
        (14, PMEVTYPER14_EL0, "PMEVTYPER14_EL0", PMEVCNTR14_EL0, "PMEVCNTR14_EL0"),
        (15, PMEVTYPER15_EL0, "PMEVTYPER15_EL0", PMEVCNTR15_EL0, "PMEVCNTR15_EL0"),
        (16, PMEVTYPER16_EL0, "PMEVTYPER16_EL0", PMEVCNTR16_EL0, "PMEVCNTR16_EL0"),
        (17, PMEVTYPER17_EL0, "PMEVTYPER17_EL0", PMEVCNTR17_EL0, "PMEVCNTR17_EL0"),
        (18, PMEVTYPER18_EL0, "PMEVTYPER18_EL0", PMEVCNTR18_EL0, "PMEVCNTR18_EL0"),
        (19, PMEVTYPER19_EL0, "PMEVTYPER19_EL0", PMEVCNTR19_EL0, "PMEVCNTR19_EL0"),
        (20, PMEVTYPER20_EL0, "PMEVTYPER20_EL0", PMEVCNTR20_EL0, "PMEVCNTR20_EL0"),
        (21, PMEVTYPER21_EL0, "PMEVTYPER21_EL0", PMEVCNTR21_EL0, "PMEVCNTR21_EL0"),
        (22, PMEVTYPER22_EL0, "PMEVTYPER22_EL0", PMEVCNTR22_EL0, "PMEVCNTR22_EL0"),
        (23, PMEVTYPER23_EL0, "PMEVTYPER23_EL0", PMEVCNTR23_EL0, "PMEVCNTR23_EL0"),
        (24, PMEVTYPER24_EL0, "PMEVTYPER24_EL0", PMEVCNTR24_EL0, "PMEVCNTR24_EL0"),
        (25, PMEVTYPER25_EL0, "PMEVTYPER25_EL0", PMEVCNTR25_EL0, "PMEVCNTR25_EL0"),
        (26, PMEVTYPER26_EL0, "PMEVTYPER26_EL0", PMEVCNTR26_EL0, "PMEVCNTR26_EL0"),
        (27, PMEVTYPER27_EL0, "PMEVTYPER27_EL0", PMEVCNTR27_EL0, "PMEVCNTR27_EL0"),
        (28, PMEVTYPER28_EL0, "PMEVTYPER28_EL0", PMEVCNTR28_EL0, "PMEVCNTR28_EL0"),
        (29, PMEVTYPER29_EL0, "PMEVTYPER29_EL0", PMEVCNTR29_EL0, "PMEVCNTR29_EL0"),
        (30, PMEVTYPER30_EL0, "PMEVTYPER30_EL0", PMEVCNTR30_EL0, "PMEVCNTR30_EL0"),
    }
}

/// A backend able to read/write a named system register on the calling core.
///
/// Implementations MUST be called with affinity already pinned to the
/// target core; this trait has no notion of "which core", matching the
/// real `mrs`/`msr` instructions which always operate on the current PE.
pub trait SystemRegister: Send + Sync {
    fn read(&self, reg: SysReg) -> u64;
    fn write(&self, reg: SysReg, value: u64);
}

/// Real AArch64 system-register access via inline assembly.
#[cfg(all(target_arch = "aarch64", feature = "aarch64-sysreg"))]
pub struct SysregBackend;

/// In-memory register file used on non-aarch64 hosts and in all tests.
///
/// Every core-PMU counter register (`PMEVTYPER<n>_EL0`/`PMEVCNTR<n>_EL0`)
/// is its own independent map entry, matching real hardware's
/// directly-named access. Only the DSU's `CLUSTERPMXEVCNTR_EL1`/
/// `CLUSTERPMXEVTYPER_EL1` are modeled as indirected through
/// `CLUSTERPMSELR_EL1`, since that is the one family PMUv3 genuinely
/// addresses by selector.
pub struct SimBackend {
    regs: Mutex<HashMap<SysReg, u64>>,
    cluster_counter: Mutex<HashMap<u32, u64>>,
    cluster_type: Mutex<HashMap<u32, u64>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            regs: Mutex::new(HashMap::new()),
            cluster_counter: Mutex::new(HashMap::new()),
            cluster_type: Mutex::new(HashMap::new()),
        }
    }

    /// Test/simulation hook: advance the cycle counter and every
    /// currently-selected DSU event counter by `delta`.
    pub fn advance(&self, delta: u64) {
        let mut regs = self.regs.lock().unwrap();
        *regs.entry(SysReg::PMCCNTR_EL0).or_insert(0) += delta;
        *regs.entry(SysReg::CLUSTERPMCCNTR_EL1).or_insert(0) += delta;
        for v in self.cluster_counter.lock().unwrap().values_mut() {
            *v = v.wrapping_add(delta);
        }
        for n in 0..=30u32 {
            if let Ok(reg) = cntr_reg(n) {
                if let Some(v) = regs.get_mut(&reg) {
                    *v = v.wrapping_add(delta);
                }
            }
        }
    }

    fn cluster_selected_index(&self) -> u32 {
        *self.regs.lock().unwrap().get(&SysReg::CLUSTERPMSELR_EL1).unwrap_or(&0) as u32
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRegister for SimBackend {
    fn read(&self, reg: SysReg) -> u64 {
        match reg {
            SysReg::CLUSTERPMXEVCNTR_EL1 => {
                let idx = self.cluster_selected_index();
                *self.cluster_counter.lock().unwrap().get(&idx).unwrap_or(&0)
            }
            SysReg::CLUSTERPMXEVTYPER_EL1 => {
                let idx = self.cluster_selected_index();
                *self.cluster_type.lock().unwrap().get(&idx).unwrap_or(&0)
            }
            other => *self.regs.lock().unwrap().get(&other).unwrap_or(&0),
        }
    }

    fn write(&self, reg: SysReg, value: u64) {
        match reg {
            SysReg::CLUSTERPMXEVCNTR_EL1 => {
                let idx = self.cluster_selected_index();
                self.cluster_counter.lock().unwrap().insert(idx, value);
            }
            SysReg::CLUSTERPMXEVTYPER_EL1 => {
                let idx = self.cluster_selected_index();
                self.cluster_type.lock().unwrap().insert(idx, value);
            }
            other => {
                self.regs.lock().unwrap().insert(other, value);
            }
        }
    }
}

/// Selects `idx` via `CLUSTERPMSELR_EL1` then runs `f` against
/// `CLUSTERPMXEVCNTR_EL1`/`CLUSTERPMXEVTYPER_EL1` for that counter
/// (`original_source/wperf-driver/dsu.c::DSUSelectCounter`). The core PMU
/// has no equivalent: its counters are each a directly-named register,
/// resolved by [`typer_reg`]/[`cntr_reg`] instead.
pub fn with_selected_cluster<T>(
    backend: &dyn SystemRegister,
    idx: u32,
    f: impl FnOnce(&dyn SystemRegister) -> T,
) -> Result<T> {
    if idx > 31 {
        return Err(RegisterError::InvalidIndex(idx));
    }
    backend.write(SysReg::CLUSTERPMSELR_EL1, idx as u64);
    Ok(f(backend))
}
