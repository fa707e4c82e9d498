//! Event Scheduler (C3): per-core counter assignment with time-division
//! multiplexing, and fixed-interval/overflow-driven collection. The
//! round algorithm is grounded line-for-line on
//! `original_source/wperf-driver/dpc.c`'s `multiplex_dpc`/`overflow_dpc`.
//!
//! Per spec.md §9's ISR/DPC -> message-passing redesign: the timer DPC
//! becomes a `tokio::task` per core driven by `tokio::time::interval`,
//! and the DPC context pointer becomes an owned `Arc<CoreSlot>` handed
//! to that task. No raw pointers cross the kernel/user boundary.

use crate::coreinfo::{CoreInfo, ProfAction, PseudoEvent};
use crate::error::{DeviceError, Result};
use crate::wire::CYCLE_EVENT_IDX;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use wperf_raw::{CounterIndexMap, Dsu, Pmu, SystemRegister};

/// Everything one core's scheduling task needs, owned behind an `Arc` so
/// the spawned task and the scheduler that started it can both reach it
/// without a raw pointer.
///
/// `dsu` models one DSU (cluster PMU) unit per core rather than one
/// shared per cluster: SPEC_FULL.md's CORE scope has no cluster-topology
/// type to group cores under, so each `CoreSlot` owns its own register
/// view instead of sharing one with its cluster-mates.
pub struct CoreSlot<B: SystemRegister> {
    pub idx: u32,
    pub pmu: Pmu<B>,
    pub dsu: Dsu<B>,
    pub counter_map: Mutex<Option<CounterIndexMap>>,
    pub dsu_counter_map: Mutex<Option<CounterIndexMap>>,
    pub info: Mutex<CoreInfo>,
}

impl<B: SystemRegister> CoreSlot<B> {
    pub fn new(idx: u32, backend: B, dsu_backend: B) -> Self {
        Self {
            idx,
            pmu: Pmu::new(backend),
            dsu: Dsu::new(dsu_backend),
            counter_map: Mutex::new(None),
            dsu_counter_map: Mutex::new(None),
            info: Mutex::new(CoreInfo::new(idx)),
        }
    }
}

/// One round of fixed-counter-only collection, used both by the
/// `PROF_NORMAL` path and as the first step of `PROF_MULTIPLEX` (spec.md
/// §4.3, `dpc.c::update_core_counting`/`multiplex_dpc`).
fn collect_fixed<B: SystemRegister>(slot: &CoreSlot<B>, info: &mut CoreInfo) {
    if let Some(cycle) = info.events.iter_mut().find(|e| e.event_idx == CYCLE_EVENT_IDX) {
        cycle.value += slot.pmu.read_cycle_counter_delta();
        cycle.scheduled += 1;
    }
}

/// `PROF_NORMAL`: every assigned GPC event has its own physical counter
/// all the time, so a round is just stop/read/reset/start.
fn normal_round<B: SystemRegister>(slot: &CoreSlot<B>) -> Result<()> {
    let mut info = slot.info.lock();
    slot.pmu.counter_stop();
    collect_fixed(slot, &mut info);
    for event in info.events.iter_mut() {
        if event.event_idx == CYCLE_EVENT_IDX {
            continue;
        }
        event.value += slot.pmu.read_counter_delta(event.counter_idx)?;
        event.scheduled += 1;
    }
    slot.pmu.counter_reset();
    slot.pmu.counter_start();
    Ok(())
}

/// `PROF_MULTIPLEX`: more logical events than free physical GPCs, so
/// each round collects the currently-assigned window, then rotates the
/// window by `free_gpc` events before re-enabling (`dpc.c::multiplex_dpc`).
fn multiplex_round<B: SystemRegister>(slot: &CoreSlot<B>) -> Result<()> {
    let mut info = slot.info.lock();
    let free_gpc = slot
        .counter_map
        .lock()
        .as_ref()
        .map(|m| m.free_gpc())
        .unwrap_or(0);
    if free_gpc == 0 {
        return Ok(());
    }

    let round = info.timer_round;
    let new_round = round + 1;

    // GPC-backed (non-fixed) events only.
    let gpc_events_num = info.events.iter().filter(|e| e.event_idx != CYCLE_EVENT_IDX).count() as u32;
    if gpc_events_num == 0 {
        info.timer_round = new_round;
        return Ok(());
    }

    let window1 = (free_gpc * round as u32) % gpc_events_num;
    let window2 = (free_gpc * new_round as u32) % gpc_events_num;

    slot.pmu.counter_stop();
    collect_fixed(slot, &mut info);

    let gpc_indices: Vec<usize> = info
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.event_idx != CYCLE_EVENT_IDX)
        .map(|(i, _)| i)
        .collect();

    for i in 0..free_gpc {
        let adjusted = (window1 + i) % gpc_events_num;
        let ev = gpc_indices[adjusted as usize];
        let counter_idx = info.events[ev].counter_idx;
        info.events[ev].value += slot.pmu.read_counter_delta(counter_idx)?;
        info.events[ev].scheduled += 1;
    }

    slot.pmu.counter_reset();

    let counter_map_guard = slot.counter_map.lock();
    let counter_map = counter_map_guard
        .as_ref()
        .expect("counter map established by assign_events before any round runs");
    for i in 0..free_gpc {
        let adjusted = (window2 + i) % gpc_events_num;
        let ev = gpc_indices[adjusted as usize];
        let physical = counter_map.physical(i)?;
        info.events[ev].counter_idx = physical;
        slot.pmu
            .counter_set_type(physical, (info.events[ev].event_idx as u64) | info.events[ev].filter_bits)?;
        slot.pmu.forget_counter_history(physical);
    }

    slot.pmu.counter_start();
    info.timer_round = new_round;
    Ok(())
}

/// `DSU PROF_NORMAL`: every assigned DSU event has its own physical
/// cluster counter, so a round is stop/read-all/reset/start
/// (`dsu.c::DSUUpdateDSUCounting`).
fn dsu_normal_round<B: SystemRegister>(slot: &CoreSlot<B>) -> Result<()> {
    let mut info = slot.info.lock();
    slot.dsu.counter_stop();
    if let Some(cycle) = info.dsu_events.iter_mut().find(|e| e.event_idx == CYCLE_EVENT_IDX) {
        cycle.value += slot.dsu.read_cycle_counter_delta();
        cycle.scheduled += 1;
    }
    for event in info.dsu_events.iter_mut() {
        if event.event_idx == CYCLE_EVENT_IDX {
            continue;
        }
        event.value += slot.dsu.read_counter_delta(event.counter_idx)?;
        event.scheduled += 1;
    }
    slot.dsu.counter_reset();
    slot.dsu.counter_start();
    Ok(())
}

/// `DSU PROF_MULTIPLEX`: same window-rotation scheme as
/// [`multiplex_round`], applied to `CoreInfo::dsu_events` and the
/// cluster PMU instead of the core PMU (`dpc.c`'s DSU branch of
/// `multiplex_dpc`).
fn dsu_multiplex_round<B: SystemRegister>(slot: &CoreSlot<B>) -> Result<()> {
    let mut info = slot.info.lock();
    let free_gpc = slot
        .dsu_counter_map
        .lock()
        .as_ref()
        .map(|m| m.free_gpc())
        .unwrap_or(0);
    if free_gpc == 0 {
        return Ok(());
    }

    let round = info.timer_round;
    let new_round = round + 1;

    let gpc_events_num = info.dsu_events.iter().filter(|e| e.event_idx != CYCLE_EVENT_IDX).count() as u32;
    if gpc_events_num == 0 {
        return Ok(());
    }

    let window1 = (free_gpc * round as u32) % gpc_events_num;
    let window2 = (free_gpc * new_round as u32) % gpc_events_num;

    slot.dsu.counter_stop();
    if let Some(cycle) = info.dsu_events.iter_mut().find(|e| e.event_idx == CYCLE_EVENT_IDX) {
        cycle.value += slot.dsu.read_cycle_counter_delta();
        cycle.scheduled += 1;
    }

    let gpc_indices: Vec<usize> = info
        .dsu_events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.event_idx != CYCLE_EVENT_IDX)
        .map(|(i, _)| i)
        .collect();

    for i in 0..free_gpc {
        let adjusted = (window1 + i) % gpc_events_num;
        let ev = gpc_indices[adjusted as usize];
        let counter_idx = info.dsu_events[ev].counter_idx;
        info.dsu_events[ev].value += slot.dsu.read_counter_delta(counter_idx)?;
        info.dsu_events[ev].scheduled += 1;
    }

    slot.dsu.counter_reset();

    let counter_map_guard = slot.dsu_counter_map.lock();
    let counter_map = counter_map_guard
        .as_ref()
        .expect("dsu counter map established by assign_dsu_events before any round runs");
    for i in 0..free_gpc {
        let adjusted = (window2 + i) % gpc_events_num;
        let ev = gpc_indices[adjusted as usize];
        let physical = counter_map.physical(i)?;
        info.dsu_events[ev].counter_idx = physical;
        slot.dsu.counter_set_type(
            physical,
            (info.dsu_events[ev].event_idx as u64) | info.dsu_events[ev].filter_bits,
        )?;
        slot.dsu.forget_counter_history(physical);
    }

    slot.dsu.counter_start();
    Ok(())
}

/// Runs one DSU scheduling round, independent of the core PMU's mode
/// (`dpc.c`'s DPC runs the core, then DSU, then DMC branches in
/// sequence off the same timer tick).
fn run_dsu_round<B: SystemRegister>(slot: &CoreSlot<B>) -> Result<()> {
    let prof_dsu = slot.info.lock().prof_dsu;
    match prof_dsu {
        ProfAction::Disabled => Ok(()),
        ProfAction::Normal => dsu_normal_round(slot),
        ProfAction::Multiplex => dsu_multiplex_round(slot),
    }
}

/// Runs one scheduling round for whichever mode the core is currently
/// in, then the DSU round if one is configured.
pub fn run_round<B: SystemRegister>(slot: &CoreSlot<B>) -> Result<()> {
    let prof_core = slot.info.lock().prof_core;
    match prof_core {
        ProfAction::Disabled => {}
        ProfAction::Normal => normal_round(slot)?,
        ProfAction::Multiplex => multiplex_round(slot)?,
    }
    run_dsu_round(slot)
}

/// Owns the per-core scheduling tasks. Starting/stopping profiling
/// spawns/aborts a `tokio::time::interval`-driven task per active core;
/// `reset` waits for every core's task to leave its current round before
/// clearing state, mirroring `sync_reset_dpc`'s barrier in the original.
pub struct Scheduler<B: SystemRegister + 'static> {
    slots: Vec<Arc<CoreSlot<B>>>,
    tasks: Mutex<Vec<Option<JoinHandle<()>>>>,
}

impl<B: SystemRegister + 'static> Scheduler<B> {
    pub fn new(slots: Vec<Arc<CoreSlot<B>>>) -> Self {
        let n = slots.len();
        Self {
            slots,
            tasks: Mutex::new((0..n).map(|_| None).collect()),
        }
    }

    pub fn slot(&self, core_idx: u32) -> Result<&Arc<CoreSlot<B>>> {
        self.slots
            .get(core_idx as usize)
            .ok_or_else(|| DeviceError::InvalidParameter(format!("core index {core_idx} out of range")))
    }

    pub fn core_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Establish the logical->physical counter map for a core (at
    /// session-lock acquire time, spec.md §4.2) and decide
    /// normal-vs-multiplex mode for the events it was just assigned.
    pub fn assign_events(
        &self,
        core_idx: u32,
        events: Vec<PseudoEvent>,
        free_physical_mask: u32,
    ) -> Result<()> {
        let slot = self.slot(core_idx)?;
        let map = CounterIndexMap::probe(free_physical_mask)?;
        let free_gpc = map.free_gpc();

        let mut info = slot.info.lock();
        let gpc_events_num = events.iter().filter(|e| e.event_idx != CYCLE_EVENT_IDX).count() as u32;
        info.prof_core = if gpc_events_num == 0 {
            ProfAction::Disabled
        } else if gpc_events_num <= free_gpc {
            ProfAction::Normal
        } else {
            ProfAction::Multiplex
        };
        info.events = events;

        // Program the first min(N, free_gpc) events' physical counters
        // now, regardless of Normal/Multiplex mode: `evt_assign_core`
        // assigns `event->counter_idx` unconditionally at ASSIGN_EVENTS
        // time in the original, before PMU_CTL_START decides which mode
        // to run in. `multiplex_round`'s first call depends on this.
        for (i, event) in info
            .events
            .iter_mut()
            .filter(|e| e.event_idx != CYCLE_EVENT_IDX)
            .take(free_gpc as usize)
            .enumerate()
        {
            event.counter_idx = map.physical(i as u32)?;
        }
        drop(info);
        *slot.counter_map.lock() = Some(map);
        Ok(())
    }

    /// Establish the logical->physical DSU counter map for a core and
    /// decide normal-vs-multiplex mode for the cluster events it was
    /// just assigned, mirroring [`Self::assign_events`] for the cluster
    /// PMU (`device.c`'s `evt_assign_dsu`).
    pub fn assign_dsu_events(
        &self,
        core_idx: u32,
        events: Vec<PseudoEvent>,
        free_physical_mask: u32,
    ) -> Result<()> {
        let slot = self.slot(core_idx)?;
        let map = CounterIndexMap::probe(free_physical_mask)?;
        let free_gpc = map.free_gpc();

        let mut info = slot.info.lock();
        let gpc_events_num = events.iter().filter(|e| e.event_idx != CYCLE_EVENT_IDX).count() as u32;
        info.prof_dsu = if gpc_events_num == 0 {
            ProfAction::Disabled
        } else if gpc_events_num <= free_gpc {
            ProfAction::Normal
        } else {
            ProfAction::Multiplex
        };
        info.dsu_events = events;

        for (i, event) in info
            .dsu_events
            .iter_mut()
            .filter(|e| e.event_idx != CYCLE_EVENT_IDX)
            .take(free_gpc as usize)
            .enumerate()
        {
            event.counter_idx = map.physical(i as u32)?;
        }
        drop(info);
        *slot.dsu_counter_map.lock() = Some(map);
        Ok(())
    }

    /// Start the interval-driven collection task for `core_idx` at
    /// `period_ms`. Idempotent: calling twice just replaces the task.
    pub fn start(&self, core_idx: u32, period_ms: u64) -> Result<()> {
        let slot = Arc::clone(self.slot(core_idx)?);
        slot.pmu.counter_reset();
        slot.pmu.counter_start();
        slot.info.lock().timer_running = true;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
            loop {
                interval.tick().await;
                if let Err(err) = run_round(&slot) {
                    tracing::warn!(core = slot.idx, error = %err, "scheduling round failed");
                }
            }
        });
        self.tasks.lock()[core_idx as usize] = Some(handle);
        Ok(())
    }

    pub fn stop(&self, core_idx: u32) -> Result<()> {
        let slot = self.slot(core_idx)?;
        if let Some(handle) = self.tasks.lock()[core_idx as usize].take() {
            handle.abort();
        }
        slot.pmu.counter_stop();
        slot.info.lock().timer_running = false;
        Ok(())
    }

    pub fn reset(&self, core_idx: u32) -> Result<()> {
        self.stop(core_idx)?;
        let slot = self.slot(core_idx)?;
        slot.info.lock().reset();
        slot.pmu.counter_reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wperf_raw::SimBackend;

    fn make_scheduler(n: usize) -> Scheduler<SimBackend> {
        let slots = (0..n)
            .map(|i| Arc::new(CoreSlot::new(i as u32, SimBackend::new(), SimBackend::new())))
            .collect();
        Scheduler::new(slots)
    }

    fn fixed_and_two_events() -> Vec<PseudoEvent> {
        vec![
            PseudoEvent::new(CYCLE_EVENT_IDX, 0),
            PseudoEvent::new(0x08, 0),
            PseudoEvent::new(0x11, 0),
        ]
    }

    #[test]
    fn assign_with_enough_free_gpc_selects_normal_mode() {
        let sched = make_scheduler(1);
        sched.assign_events(0, fixed_and_two_events(), 0b11).unwrap();
        assert_eq!(sched.slot(0).unwrap().info.lock().prof_core, ProfAction::Normal);
    }

    #[test]
    fn assign_with_fewer_gpc_than_events_selects_multiplex_mode() {
        let sched = make_scheduler(1);
        sched.assign_events(0, fixed_and_two_events(), 0b1).unwrap();
        assert_eq!(sched.slot(0).unwrap().info.lock().prof_core, ProfAction::Multiplex);
    }

    #[test]
    fn normal_round_accumulates_cycle_and_gpc_deltas() {
        let sched = make_scheduler(1);
        sched.assign_events(0, fixed_and_two_events(), 0b11).unwrap();
        let slot = Arc::clone(sched.slot(0).unwrap());
        slot.pmu.backend().advance(100);
        run_round(&slot).unwrap();
        let info = slot.info.lock();
        assert_eq!(info.events[0].scheduled, 1);
        assert!(info.events[0].value > 0);
    }

    #[test]
    fn multiplex_round_rotates_counter_window() {
        let sched = make_scheduler(1);
        sched.assign_events(0, fixed_and_two_events(), 0b1).unwrap();
        let slot = Arc::clone(sched.slot(0).unwrap());
        run_round(&slot).unwrap();
        let info = slot.info.lock();
        assert_eq!(info.timer_round, 1);
        let scheduled_once: Vec<_> = info.events[1..].iter().map(|e| e.scheduled).collect();
        assert_eq!(scheduled_once.iter().filter(|&&s| s == 1).count(), 1);
    }

    #[test]
    fn out_of_range_core_index_is_invalid_parameter() {
        let sched = make_scheduler(1);
        assert!(matches!(
            sched.assign_events(5, vec![], 0b1),
            Err(DeviceError::InvalidParameter(_))
        ));
    }
}
