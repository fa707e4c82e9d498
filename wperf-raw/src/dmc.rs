//! DRAM Memory Controller (DMC) counter primitives. Unlike the PMU/DSU,
//! DMC counters are memory-mapped rather than selector-indirected: each
//! counter occupies a 40-byte-stride block starting at offset 0x10, with
//! a control word (enable bit + 5-bit event-mux field) and a value word
//! at fixed sub-offsets, grounded on
//! `original_source/wperf-driver/dmc.h`.

use crate::error::{RegisterError, Result};

/// Byte offset of counter `idx`'s control/value block within the DMC's
/// mapped MMIO region.
pub const DMC_COUNTER_BASE: u64 = 0x10;
pub const DMC_COUNTER_STRIDE: u64 = 0x28;
pub const DMC_COUNTER_CTL_OFFSET: u64 = 0x10;
pub const DMC_COUNTER_VAL_OFFSET: u64 = 0x20;

pub const DMC_CTL_BIT_ENABLE: u32 = 0x01;
pub const DMC_CTL_BIT_EMUX_SHIFT: u32 = 2;
pub const DMC_CTL_BIT_EMUX_MASK: u32 = 0x1F << DMC_CTL_BIT_EMUX_SHIFT;

pub const DMC_CLKDIV2_NUMGPC: usize = 8;
pub const DMC_CLK_NUMGPC: usize = 2;

/// A memory-mapped register region. A real implementation maps physical
/// MMIO space (`base`, `len`); [`SimMmio`] stands in for every non-target
/// build and all tests.
pub trait MmioRegion: Send + Sync {
    fn read_u32(&self, offset: u64) -> u32;
    fn write_u32(&self, offset: u64, value: u32);
}

fn counter_offset(idx: u8, sub_offset: u64) -> u64 {
    DMC_COUNTER_BASE + idx as u64 * DMC_COUNTER_STRIDE + sub_offset
}

/// Typed access to one memory controller's counters. Holds no channel
/// identity of its own; callers track which physical DMC this instance
/// addresses (spec.md's `dmc_idx`).
pub struct DmcChannel<M: MmioRegion> {
    mmio: M,
}

impl<M: MmioRegion> DmcChannel<M> {
    pub fn new(mmio: M) -> Self {
        Self { mmio }
    }

    /// Enable the counter's event-mux to `event_idx` without touching
    /// the counter's running value. Writes use barrier-bracketed
    /// load-modify-store because the MMIO region is shared per
    /// controller (spec.md §4: "writes use barrier-bracketed
    /// load-modify-store").
    pub fn enable_event(&self, idx: u8, event_idx: u16) {
        let ctl_off = counter_offset(idx, DMC_COUNTER_CTL_OFFSET);
        let mut ctl = self.mmio.read_u32(ctl_off);
        ctl &= !DMC_CTL_BIT_EMUX_MASK;
        ctl |= (u32::from(event_idx) << DMC_CTL_BIT_EMUX_SHIFT) & DMC_CTL_BIT_EMUX_MASK;
        ctl |= DMC_CTL_BIT_ENABLE;
        self.mmio.write_u32(ctl_off, ctl);
    }

    pub fn counter_start(&self, idx: u8) {
        let ctl_off = counter_offset(idx, DMC_COUNTER_CTL_OFFSET);
        let ctl = self.mmio.read_u32(ctl_off);
        self.mmio.write_u32(ctl_off, ctl | DMC_CTL_BIT_ENABLE);
    }

    pub fn counter_stop(&self, idx: u8) {
        let ctl_off = counter_offset(idx, DMC_COUNTER_CTL_OFFSET);
        let ctl = self.mmio.read_u32(ctl_off);
        self.mmio.write_u32(ctl_off, ctl & !DMC_CTL_BIT_ENABLE);
    }

    pub fn counter_reset(&self, idx: u8) {
        let val_off = counter_offset(idx, DMC_COUNTER_VAL_OFFSET);
        self.mmio.write_u32(val_off, 0);
    }

    pub fn counter_read(&self, idx: u8) -> u64 {
        let val_off = counter_offset(idx, DMC_COUNTER_VAL_OFFSET);
        u64::from(self.mmio.read_u32(val_off))
    }
}

/// In-memory stand-in for a mapped DMC MMIO region. Construction always
/// succeeds; a real mapper would fail here and surface
/// [`RegisterError::MmioMapFailed`].
pub struct SimMmio {
    words: std::sync::Mutex<std::collections::HashMap<u64, u32>>,
}

impl SimMmio {
    pub fn new() -> Self {
        Self {
            words: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Models a failed mapping attempt, e.g. an invalid MMIO base/length
    /// pair reported by firmware tables.
    pub fn try_map(base: u64, len: u64) -> Result<Self> {
        if len == 0 {
            return Err(RegisterError::MmioMapFailed {
                base,
                len,
                reason: "zero-length MMIO region".into(),
            });
        }
        Ok(Self::new())
    }
}

impl Default for SimMmio {
    fn default() -> Self {
        Self::new()
    }
}

impl MmioRegion for SimMmio {
    fn read_u32(&self, offset: u64) -> u32 {
        *self.words.lock().unwrap().get(&offset).unwrap_or(&0)
    }

    fn write_u32(&self, offset: u64, value: u32) {
        self.words.lock().unwrap().insert(offset, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_event_sets_mux_and_enable_bit_without_clobbering_value() {
        let ch = DmcChannel::new(SimMmio::new());
        ch.counter_reset(0);
        ch.enable_event(0, 7);
        let ctl = ch.mmio.read_u32(counter_offset(0, DMC_COUNTER_CTL_OFFSET));
        assert_eq!(ctl & DMC_CTL_BIT_ENABLE, DMC_CTL_BIT_ENABLE);
        assert_eq!(ctl & DMC_CTL_BIT_EMUX_MASK, 7 << DMC_CTL_BIT_EMUX_SHIFT);
        assert_eq!(ch.counter_read(0), 0);
    }

    #[test]
    fn counters_at_different_indices_use_disjoint_offsets() {
        let ch = DmcChannel::new(SimMmio::new());
        ch.enable_event(0, 1);
        ch.enable_event(1, 2);
        let ctl0 = ch.mmio.read_u32(counter_offset(0, DMC_COUNTER_CTL_OFFSET));
        let ctl1 = ch.mmio.read_u32(counter_offset(1, DMC_COUNTER_CTL_OFFSET));
        assert_ne!(ctl0 & DMC_CTL_BIT_EMUX_MASK, ctl1 & DMC_CTL_BIT_EMUX_MASK);
    }

    #[test]
    fn stop_clears_enable_bit_but_preserves_value() {
        let ch = DmcChannel::new(SimMmio::new());
        ch.enable_event(2, 3);
        ch.mmio
            .write_u32(counter_offset(2, DMC_COUNTER_VAL_OFFSET), 99);
        ch.counter_stop(2);
        let ctl = ch.mmio.read_u32(counter_offset(2, DMC_COUNTER_CTL_OFFSET));
        assert_eq!(ctl & DMC_CTL_BIT_ENABLE, 0);
        assert_eq!(ch.counter_read(2), 99);
    }

    #[test]
    fn zero_length_region_fails_to_map() {
        assert!(matches!(
            SimMmio::try_map(0x1000, 0),
            Err(RegisterError::MmioMapFailed { .. })
        ));
    }
}
