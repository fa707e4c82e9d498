//! User-mode engine (spec.md §4.5/§9): the counterpart to
//! `wperf_core::Device` that a real user-mode process would reach
//! through `DeviceIoControl`. Here the "IOCTL" is just a method call on
//! an in-process `Device`, per spec.md §9's device-extension redesign;
//! `Engine` adds the metric-resolution layer C6 doesn't know about.

use crate::error::{AgentError, Result};
use crate::events::{event_name, resolve_event};
use crate::metrics::MetricDef;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wperf_core::coreinfo::PseudoEvent;
use wperf_core::wire::CYCLE_EVENT_IDX;
use wperf_core::{CoreSlot, Device, HandleId};
use wperf_raw::SystemRegister;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> HandleId {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Resolves a [`MetricDef`]'s event names into the pseudo-event list
/// `ASSIGN_EVENTS` expects, with the fixed cycle event always present at
/// logical index 0 (spec.md §4.3 "the cycle event is always reserved at
/// logical index 0").
fn metric_to_pseudo_events(metric: &MetricDef) -> Result<Vec<PseudoEvent>> {
    let mut events = vec![PseudoEvent::new(CYCLE_EVENT_IDX, 0)];
    for name in &metric.events {
        events.push(PseudoEvent::new(resolve_event(name)?, 0));
    }
    Ok(events)
}

/// One session's view of the device: a handle token plus the metric
/// currently assigned per core (needed to know which formula to
/// evaluate against a `READ_COUNTING` snapshot).
pub struct Engine<B: SystemRegister + 'static> {
    device: Device<B>,
    handle: HandleId,
    assigned: parking_lot::Mutex<HashMap<u32, MetricDef>>,
}

impl<B: SystemRegister + 'static> Engine<B> {
    pub fn new(slots: Vec<Arc<CoreSlot<B>>>, spe_backends: Vec<B>) -> Self {
        Self {
            device: Device::new(slots, spe_backends),
            handle: next_handle(),
            assigned: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// `LOCK_ACQUIRE`: claim the exclusive session lock before touching
    /// any counter-programming operation.
    pub fn open(&self, force: bool) -> Result<()> {
        self.device.lock_acquire(self.handle, force)?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.device.lock_release(self.handle)?;
        Ok(())
    }

    /// Resolve `metric` and program it onto `core_idx` via
    /// `ASSIGN_EVENTS`, remembering the mapping so later reads know how
    /// to evaluate the formula.
    pub fn assign_metric(&self, core_idx: u32, metric: MetricDef, free_physical_mask: u32) -> Result<()> {
        let events = metric_to_pseudo_events(&metric)?;
        self.device
            .assign_events(self.handle, core_idx, events, free_physical_mask)?;
        self.assigned.lock().insert(core_idx, metric);
        Ok(())
    }

    pub fn start(&self, core_idx: u32, period_ms: u64) -> Result<()> {
        self.device.start(self.handle, core_idx, period_ms)?;
        Ok(())
    }

    pub fn stop(&self, core_idx: u32) -> Result<()> {
        self.device.stop(self.handle, core_idx)?;
        Ok(())
    }

    pub fn reset(&self, core_idx: u32) -> Result<()> {
        self.device.reset(self.handle, core_idx)?;
        Ok(())
    }

    /// `READ_COUNTING` plus metric evaluation: snapshot the core's
    /// accumulated event values, label them by event name, and evaluate
    /// the metric formula that was assigned to this core.
    pub fn read_metric_value(&self, core_idx: u32) -> Result<f64> {
        let metric = self
            .assigned
            .lock()
            .get(&core_idx)
            .cloned()
            .ok_or_else(|| AgentError::ConfigError(format!("no metric assigned to core {core_idx}")))?;
        let read_out = self.device.read_counting(self.handle, core_idx)?;

        let mut deltas: HashMap<String, f64> = HashMap::new();
        for event in &read_out.evts {
            if event.event_idx == CYCLE_EVENT_IDX {
                deltas.insert("cycle".to_string(), event.value as f64);
                continue;
            }
            if let Some(name) = event_name(event.event_idx) {
                deltas.insert(name.to_string(), event.value as f64);
            }
        }
        metric.evaluate(&deltas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::lookup_builtin;
    use wperf_raw::SimBackend;

    fn make_engine(n: usize) -> Engine<SimBackend> {
        let slots: Vec<_> = (0..n)
            .map(|i| Arc::new(CoreSlot::new(i as u32, SimBackend::new(), SimBackend::new())))
            .collect();
        let spe_backends: Vec<_> = (0..n).map(|_| SimBackend::new()).collect();
        Engine::new(slots, spe_backends)
    }

    #[test]
    fn open_then_assign_then_read_reports_a_value() {
        let engine = make_engine(1);
        engine.open(false).unwrap();
        let dcache = lookup_builtin("dcache").unwrap().clone();
        engine.assign_metric(0, dcache, 0b11111).unwrap();
        engine.start(0, 5).unwrap();
        // Without real hardware advancing counters the value is 0, but
        // the read path itself must not error and must respect the
        // division-by-zero-is-zero rule.
        let value = engine.read_metric_value(0).unwrap();
        assert_eq!(value, 0.0);
        engine.stop(0).unwrap();
    }

    #[test]
    fn second_session_cannot_assign_while_locked() {
        let engine = make_engine(1);
        engine.open(false).unwrap();
        let imix = lookup_builtin("imix").unwrap().clone();
        // A different handle than the one `open` registered as holder.
        let result = engine
            .device
            .assign_events(engine.handle + 1, 0, metric_to_pseudo_events(&imix).unwrap(), 0b1);
        assert!(result.is_err());
    }
}
