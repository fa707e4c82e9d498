//! Core-Info, Pseudo-Event, and Sample Frame types (spec.md §3), grounded
//! on `original_source/wperf-driver/coreinfo.h`. A `CoreInfo` is the
//! per-core scheduling/sampling state the event scheduler (C3) and
//! sampling engine (C4) operate on; one is owned per core for the
//! lifetime of the device.

use crate::wire::{FrameChain, SAMPLE_CHAIN_BUFFER_SIZE};
use std::collections::VecDeque;

/// Per-core, per-event-class multiplexing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfAction {
    #[default]
    Disabled,
    Normal,
    Multiplex,
}

/// A single scheduled event: logical event id, any filter bits, the
/// accumulated counter value, how many rounds it has been scheduled for,
/// and (once assigned) the physical counter index backing it this round.
#[derive(Debug, Clone, Copy, Default)]
pub struct PseudoEvent {
    pub event_idx: u32,
    pub filter_bits: u64,
    pub value: u64,
    pub scheduled: u64,
    pub counter_idx: u32,
}

impl PseudoEvent {
    pub fn new(event_idx: u32, filter_bits: u64) -> Self {
        Self {
            event_idx,
            filter_bits,
            value: 0,
            scheduled: 0,
            counter_idx: crate::wire::INVALID_COUNTER_IDX,
        }
    }
}

/// Per-core scheduling and sampling state.
pub struct CoreInfo {
    pub idx: u32,
    pub events: Vec<PseudoEvent>,
    pub dsu_events: Vec<PseudoEvent>,
    pub timer_round: u64,
    pub dmc_ch: u8,
    pub prof_core: ProfAction,
    pub prof_dsu: ProfAction,
    pub prof_dmc: ProfAction,
    pub timer_running: bool,
    samples: VecDeque<FrameChain>,
    pub sample_generated: u64,
    pub sample_dropped: u64,
    pub ov_mask: u64,
}

impl CoreInfo {
    pub fn new(idx: u32) -> Self {
        Self {
            idx,
            events: Vec::new(),
            dsu_events: Vec::new(),
            timer_round: 0,
            dmc_ch: crate::wire::ALL_DMC_CHANNEL,
            prof_core: ProfAction::Disabled,
            prof_dsu: ProfAction::Disabled,
            prof_dmc: ProfAction::Disabled,
            timer_running: false,
            samples: VecDeque::new(),
            sample_generated: 0,
            sample_dropped: 0,
            ov_mask: 0,
        }
    }

    /// Reset all scheduling/sampling state back to its just-created
    /// shape, as the `RESET` IOCTL does to the real `CoreInfo` (spec.md
    /// §3 lifecycle: "reset on RESET").
    pub fn reset(&mut self) {
        self.events.clear();
        self.dsu_events.clear();
        self.timer_round = 0;
        self.prof_core = ProfAction::Disabled;
        self.prof_dsu = ProfAction::Disabled;
        self.prof_dmc = ProfAction::Disabled;
        self.timer_running = false;
        self.samples.clear();
        self.sample_generated = 0;
        self.sample_dropped = 0;
        self.ov_mask = 0;
    }

    /// Append a sample frame, dropping the oldest on overflow rather
    /// than blocking or growing without bound (spec.md §4.4: the ring
    /// buffer has a fixed capacity, [`SAMPLE_CHAIN_BUFFER_SIZE`]).
    pub fn push_sample(&mut self, frame: FrameChain) {
        if self.samples.len() >= SAMPLE_CHAIN_BUFFER_SIZE {
            self.samples.pop_front();
            self.sample_dropped += 1;
        }
        self.samples.push_back(frame);
        self.sample_generated += 1;
    }

    /// Drain every buffered sample frame (`SAMPLE_GET`).
    pub fn drain_samples(&mut self) -> Vec<FrameChain> {
        self.samples.drain(..).collect()
    }

    pub fn sample_len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_sample_drops_oldest_on_overflow() {
        let mut core = CoreInfo::new(0);
        for i in 0..SAMPLE_CHAIN_BUFFER_SIZE {
            core.push_sample(FrameChain {
                pc: i as u64,
                ..Default::default()
            });
        }
        assert_eq!(core.sample_dropped, 0);
        core.push_sample(FrameChain {
            pc: 9999,
            ..Default::default()
        });
        assert_eq!(core.sample_dropped, 1);
        assert_eq!(core.sample_len(), SAMPLE_CHAIN_BUFFER_SIZE);
        let drained = core.drain_samples();
        assert_eq!(drained[0].pc, 1);
        assert_eq!(core.sample_len(), 0);
    }

    #[test]
    fn reset_clears_all_scheduling_state() {
        let mut core = CoreInfo::new(0);
        core.events.push(PseudoEvent::new(5, 0));
        core.prof_core = ProfAction::Multiplex;
        core.push_sample(FrameChain::default());
        core.reset();
        assert!(core.events.is_empty());
        assert_eq!(core.prof_core, ProfAction::Disabled);
        assert_eq!(core.sample_len(), 0);
    }
}
