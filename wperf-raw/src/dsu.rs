//! DSU (DynamIQ Shared Unit) cluster PMU primitives. Mirrors [`crate::pmu`]
//! one-for-one: same selector-indirection pattern, same counter-delta
//! accounting, but addressed through the cluster's own register family
//! (`CLUSTERPMCR_EL1` etc.) rather than the per-core PMU.

use crate::error::Result;
use crate::sysreg::{with_selected_cluster, SysReg, SystemRegister};
use std::collections::HashMap;
use std::sync::Mutex;

/// CLUSTERPMCR_EL1 bit positions mirror PMCR_EL0 (Arm DSU TRM).
pub mod clusterpmcr {
    pub const E: u64 = 1 << 0;
    pub const P: u64 = 1 << 1;
    pub const C: u64 = 1 << 2;
}

/// Typed access to one cluster's DSU PMU. One instance is owned per
/// cluster, shared by every core within it.
pub struct Dsu<B: SystemRegister> {
    backend: B,
    last_cycle_value: Mutex<u64>,
    last_counter_value: Mutex<HashMap<u32, u64>>,
}

impl<B: SystemRegister> Dsu<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            last_cycle_value: Mutex::new(0),
            last_counter_value: Mutex::new(HashMap::new()),
        }
    }

    pub fn pmcr_get(&self) -> u64 {
        self.backend.read(SysReg::CLUSTERPMCR_EL1)
    }

    pub fn pmcr_set(&self, value: u64) {
        self.backend.write(SysReg::CLUSTERPMCR_EL1, value);
    }

    pub fn counter_start(&self) {
        let v = self.pmcr_get();
        self.pmcr_set(v | clusterpmcr::E);
    }

    pub fn counter_stop(&self) {
        let v = self.pmcr_get();
        self.pmcr_set(v & !clusterpmcr::E);
    }

    /// As with the core PMU, reset clears general-purpose counters only
    /// and leaves the cluster cycle counter free-running.
    pub fn counter_reset(&self) {
        let v = self.pmcr_get();
        self.pmcr_set(v | clusterpmcr::P);
    }

    pub fn counter_disable(&self, mask: u32) {
        self.backend.write(SysReg::CLUSTERPMCNTENCLR_EL1, mask as u64);
    }

    pub fn counter_enable(&self, mask: u32) {
        self.backend.write(SysReg::CLUSTERPMCNTENSET_EL1, mask as u64);
    }

    pub fn counter_set_type(&self, physical_idx: u32, event_code_and_filter: u64) -> Result<()> {
        with_selected_cluster(&self.backend, physical_idx, |b| {
            b.write(SysReg::CLUSTERPMXEVTYPER_EL1, event_code_and_filter);
        })
    }

    pub fn read_counter(&self, physical_idx: u32) -> Result<u64> {
        with_selected_cluster(&self.backend, physical_idx, |b| {
            b.read(SysReg::CLUSTERPMXEVCNTR_EL1)
        })
    }

    pub fn read_cycle_counter_delta(&self) -> u64 {
        let current = self.backend.read(SysReg::CLUSTERPMCCNTR_EL1);
        let mut last = self.last_cycle_value.lock().unwrap();
        let delta = if current < *last { 0 } else { current - *last };
        *last = current;
        delta
    }

    pub fn read_counter_delta(&self, physical_idx: u32) -> Result<u64> {
        let current = self.read_counter(physical_idx)?;
        let mut map = self.last_counter_value.lock().unwrap();
        let last = map.entry(physical_idx).or_insert(0);
        let delta = if current < *last { 0 } else { current - *last };
        *last = current;
        Ok(delta)
    }

    pub fn forget_counter_history(&self, physical_idx: u32) {
        self.last_counter_value.lock().unwrap().remove(&physical_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysreg::SimBackend;

    #[test]
    fn cluster_cycle_delta_tracks_independently_of_core_pmu() {
        let dsu = Dsu::new(SimBackend::new());
        dsu.backend.write(SysReg::CLUSTERPMCCNTR_EL1, 1000);
        assert_eq!(dsu.read_cycle_counter_delta(), 1000);
        dsu.backend.write(SysReg::PMCCNTR_EL0, 5000);
        assert_eq!(dsu.read_cycle_counter_delta(), 0);
    }

    #[test]
    fn cluster_selector_does_not_collide_with_core_counter_regs() {
        let dsu = Dsu::new(SimBackend::new());
        dsu.counter_set_type(3, 0x42).unwrap();
        let core_reg = crate::sysreg::typer_reg(3).unwrap();
        assert_eq!(dsu.backend.read(core_reg), 0);
    }

    #[test]
    fn reset_does_not_set_cycle_reset_bit() {
        let dsu = Dsu::new(SimBackend::new());
        dsu.counter_reset();
        let pmcr = dsu.pmcr_get();
        assert_eq!(pmcr & clusterpmcr::C, 0);
        assert_ne!(pmcr & clusterpmcr::P, 0);
    }
}
