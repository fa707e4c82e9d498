//! Counter Index Map: the injective logical -> physical GPC mapping
//! established once, at session-lock acquire time, by probing which
//! physical counters the hardware (or other kernel consumers) leave free.

use crate::error::{RegisterError, Result};

/// Total addressable counter space: 31 general-purpose counters (physical
/// indices 0..30) plus one fixed cycle counter (physical index 31).
pub const MAX_PHYSICAL_COUNTERS: u32 = 32;
pub const FIXED_CYCLE_PHYSICAL_IDX: u32 = 31;
/// The cycle event is always reserved at logical index 0 in a core's
/// pseudo-event array (spec.md §4.3); this is the index map's own
/// reservation of the *physical* fixed counter, which is a distinct
/// concern from the scheduler's logical event ordering.
pub const FIXED_CYCLE_LOGICAL_IDX: u32 = 31;

/// Injective logical-index -> physical-index mapping over the GPC space.
#[derive(Debug, Clone)]
pub struct CounterIndexMap {
    logical_to_physical: Vec<u32>,
}

impl CounterIndexMap {
    /// Build the map from a bitmask of physical GPCs (indices 0..30) that
    /// are free for this session. Bit 31 (the fixed counter) is implicit
    /// and always reserved.
    pub fn probe(free_physical_mask: u32) -> Result<Self> {
        let mut logical_to_physical = Vec::new();
        for phys in 0..FIXED_CYCLE_PHYSICAL_IDX {
            if free_physical_mask & (1 << phys) != 0 {
                logical_to_physical.push(phys);
            }
        }
        if logical_to_physical.is_empty() {
            return Err(RegisterError::NoFreeCounters);
        }
        Ok(Self { logical_to_physical })
    }

    /// Number of free general-purpose counters available to this session.
    pub fn free_gpc(&self) -> u32 {
        self.logical_to_physical.len() as u32
    }

    /// Map a logical counter index to its physical counter index.
    /// Logical index [`FIXED_CYCLE_LOGICAL_IDX`] always maps to the fixed
    /// cycle counter.
    pub fn physical(&self, logical: u32) -> Result<u32> {
        if logical == FIXED_CYCLE_LOGICAL_IDX {
            return Ok(FIXED_CYCLE_PHYSICAL_IDX);
        }
        self.logical_to_physical
            .get(logical as usize)
            .copied()
            .ok_or(RegisterError::InvalidIndex(logical))
    }

    /// The raw map as presented over the wire in `hw_cfg.counter_idx_map`.
    pub fn to_wire_array(&self) -> [u8; 32] {
        let mut out = [0xFFu8; 32];
        for (logical, &physical) in self.logical_to_physical.iter().enumerate() {
            out[logical] = physical as u8;
        }
        out[FIXED_CYCLE_LOGICAL_IDX as usize] = FIXED_CYCLE_PHYSICAL_IDX as u8;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_packs_free_counters_in_order() {
        // GPCs 0,2,3 free; 1 taken by another kernel consumer.
        let map = CounterIndexMap::probe(0b1101).unwrap();
        assert_eq!(map.free_gpc(), 3);
        assert_eq!(map.physical(0).unwrap(), 0);
        assert_eq!(map.physical(1).unwrap(), 2);
        assert_eq!(map.physical(2).unwrap(), 3);
    }

    #[test]
    fn cycle_counter_always_fixed() {
        let map = CounterIndexMap::probe(0xFFFF_FFFF).unwrap();
        assert_eq!(map.physical(FIXED_CYCLE_LOGICAL_IDX).unwrap(), 31);
    }

    #[test]
    fn no_free_counters_is_insufficient_resources() {
        assert!(matches!(
            CounterIndexMap::probe(0),
            Err(RegisterError::NoFreeCounters)
        ));
    }

    #[test]
    fn out_of_range_logical_index_is_invalid() {
        let map = CounterIndexMap::probe(0b1).unwrap();
        assert!(matches!(
            map.physical(5),
            Err(RegisterError::InvalidIndex(5))
        ));
    }
}
