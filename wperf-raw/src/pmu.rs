//! Core PMU counter primitives (C1): start/stop/reset/read, with the
//! counter-delta cycle accounting described in spec.md §4.1 — the fixed
//! cycle counter is shared with other kernel consumers (ThreadProfiling
//! etc.) so it is never reset, only ever read as a delta from its last
//! observed value.

use crate::error::Result;
use crate::sysreg::{cntr_reg, typer_reg, SysReg, SystemRegister};
use std::collections::HashMap;
use std::sync::Mutex;

/// PMCR_EL0 bit positions (Arm ARM D13.3.5).
pub mod pmcr {
    pub const E: u64 = 1 << 0; // Enable
    pub const P: u64 = 1 << 1; // Event counter reset
    pub const C: u64 = 1 << 2; // Cycle counter reset
    pub const LC: u64 = 1 << 6; // Long cycle counter
    /// PMCR_EL0.N, bits [15:11]: number of implemented general-purpose
    /// counters (Arm ARM D13.3.1).
    pub const N_SHIFT: u64 = 11;
    pub const N_MASK: u64 = 0x1f;
}

/// Mask applied to a counter's event-type value before it is written to
/// `PMEVTYPER<n>_EL0` (`core.c::CoreCouterSetType`, `core.h::ARMV8_EVTYPE_MASK`).
pub const ARMV8_EVTYPE_MASK: u64 = 0xc800_ffff;

/// Typed access to a single core's PMU. One instance is owned per
/// `CoreInfo` slot in `wperf-core`.
pub struct Pmu<B: SystemRegister> {
    backend: B,
    last_cycle_value: Mutex<u64>,
    last_counter_value: Mutex<HashMap<u32, u64>>,
}

impl<B: SystemRegister> Pmu<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            last_cycle_value: Mutex::new(0),
            last_counter_value: Mutex::new(HashMap::new()),
        }
    }

    /// Access to the underlying register backend, for callers (e.g. the
    /// scheduler's test harness) that need to drive the simulated
    /// register file directly.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn pmcr_get(&self) -> u64 {
        self.backend.read(SysReg::PMCR_EL0)
    }

    pub fn pmcr_set(&self, value: u64) {
        self.backend.write(SysReg::PMCR_EL0, value);
    }

    /// Flip the global enable bit. Never touches the cycle counter: other
    /// kernel consumers may be relying on its free-running value, so we
    /// track deltas (see [`Self::read_cycle_counter`]) instead of
    /// resetting it on every start.
    pub fn counter_start(&self) {
        let v = self.pmcr_get();
        self.pmcr_set(v | pmcr::E);
    }

    pub fn counter_stop(&self) {
        let v = self.pmcr_get();
        self.pmcr_set(v & !pmcr::E);
    }

    /// Reset clears general-purpose counters only (PMCR_EL0.P), sets the
    /// long-event bit on supporting parts, and deliberately leaves the
    /// cycle counter (PMCR_EL0.C) untouched.
    pub fn counter_reset(&self) {
        let v = self.pmcr_get();
        self.pmcr_set(v | pmcr::P | pmcr::LC);
    }

    /// Number of implemented general-purpose counters
    /// (`device.c::WindowsPerfDeviceCreate`'s
    /// `numGPC = (pmcr >> ARMV8_PMCR_N_SHIFT) & ARMV8_PMCR_N_MASK`).
    pub fn gpc_count(&self) -> u8 {
        ((self.pmcr_get() >> pmcr::N_SHIFT) & pmcr::N_MASK) as u8
    }

    pub fn midr(&self) -> u64 {
        self.backend.read(SysReg::MIDR_EL1)
    }

    pub fn id_dfr0(&self) -> u64 {
        self.backend.read(SysReg::ID_DFR0_EL1)
    }

    /// PMUv3 version field, `ID_DFR0_EL1[11:8]`
    /// (`device.c::WindowsPerfDeviceCreate`'s
    /// `pmu_ver = (dfr0_value >> 8) & 0xf`).
    pub fn pmu_version(&self) -> u8 {
        ((self.id_dfr0() >> 8) & 0xf) as u8
    }

    pub fn counter_disable(&self, mask: u32) {
        self.backend.write(SysReg::PMCNTENCLR_EL0, mask as u64);
    }

    pub fn counter_enable(&self, mask: u32) {
        self.backend.write(SysReg::PMCNTENSET_EL0, mask as u64);
    }

    pub fn counter_irq_enable(&self, mask: u32) {
        self.backend.write(SysReg::PMINTENSET_EL1, mask as u64);
    }

    pub fn counter_irq_disable(&self, mask: u32) {
        self.backend.write(SysReg::PMINTENCLR_EL1, mask as u64);
    }

    /// Program the per-counter event selector. `physical_idx` MUST already
    /// have been resolved from a logical index via
    /// [`crate::counter_map::CounterIndexMap`] by the caller.
    pub fn counter_set_type(&self, physical_idx: u32, event_code_and_filter: u64) -> Result<()> {
        let reg = typer_reg(physical_idx)?;
        self.backend.write(reg, event_code_and_filter & ARMV8_EVTYPE_MASK);
        Ok(())
    }

    /// Read the raw value of a programmable counter.
    pub fn read_counter(&self, physical_idx: u32) -> Result<u64> {
        Ok(self.backend.read(cntr_reg(physical_idx)?))
    }

    /// Read the fixed cycle counter as a clamped delta from the last
    /// observed value (spec.md §4.1, §7, §8 invariant 5): a wrap anomaly
    /// (current < last) is clamped to a zero delta rather than producing
    /// a negative/huge result.
    pub fn read_cycle_counter_delta(&self) -> u64 {
        let current = self.backend.read(SysReg::PMCCNTR_EL0);
        let mut last = self.last_cycle_value.lock().unwrap();
        let delta = if current < *last { 0 } else { current - *last };
        *last = current;
        delta
    }

    /// Read a programmable counter as a delta from its last observed
    /// value. Used by the overflow-free "normal" scheduling path where
    /// counters are reset every round anyway (so this degenerates to the
    /// raw value, but stays symmetric with the cycle-counter path for
    /// future counters that cannot be reset).
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
    fn cycle_delta_clamps_on_wrap_anomaly() {
        let pmu = Pmu::new(SimBackend::new());
        pmu.backend.write(SysReg::PMCCNTR_EL0, 100);
        assert_eq!(pmu.read_cycle_counter_delta(), 100);
        pmu.backend.write(SysReg::PMCCNTR_EL0, 250);
        assert_eq!(pmu.read_cycle_counter_delta(), 150);
        // Anomaly: value appears to go backwards.
        pmu.backend.write(SysReg::PMCCNTR_EL0, 10);
        assert_eq!(pmu.read_cycle_counter_delta(), 0);
        // Subsequent deltas resume correctly from the new baseline.
        pmu.backend.write(SysReg::PMCCNTR_EL0, 40);
        assert_eq!(pmu.read_cycle_counter_delta(), 30);
    }

    #[test]
    fn start_stop_never_resets_cycle_counter() {
        let pmu = Pmu::new(SimBackend::new());
        pmu.backend.write(SysReg::PMCCNTR_EL0, 500);
        pmu.counter_start();
        pmu.counter_stop();
        assert_eq!(pmu.backend.read(SysReg::PMCCNTR_EL0), 500);
    }

    #[test]
    fn gpc_count_reads_pmcr_n_field() {
        let pmu = Pmu::new(SimBackend::new());
        pmu.pmcr_set(6 << pmcr::N_SHIFT);
        assert_eq!(pmu.gpc_count(), 6);
    }

    #[test]
    fn pmu_version_reads_dfr0_bits_11_8() {
        let pmu = Pmu::new(SimBackend::new());
        pmu.backend.write(SysReg::ID_DFR0_EL1, 0x6 << 8);
        assert_eq!(pmu.pmu_version(), 0x6);
    }

    #[test]
    fn reset_does_not_set_cycle_reset_bit() {
        let pmu = Pmu::new(SimBackend::new());
        pmu.counter_reset();
        let pmcr = pmu.pmcr_get();
        assert_eq!(pmcr & pmcr::C, 0);
        assert_ne!(pmcr & pmcr::P, 0);
    }
}
