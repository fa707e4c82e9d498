//! Named metrics (spec.md §4.5): a metric is `{ name, event-list (≤6),
//! formula }`. The five built-ins (imix, icache, dcache, itlb, dtlb) are
//! grounded verbatim on `original_source/wperf/metric.cpp`'s
//! `metric_builtin` table; additional metrics are loadable from a JSON
//! config file, a spec-silent supplement grounded on the pack's
//! precedent for `serde_json`-based config (`other_examples/manifests/
//! ssbanerje-rs-perf-utils`, `other_examples/manifests/parth21shah-linnix`).

use crate::error::{AgentError, Result};
use crate::events::resolve_event;
use crate::shunting_yard;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const MAX_METRIC_EVENTS: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDef {
    pub name: String,
    pub events: Vec<String>,
    /// Infix formula referencing event names and scalars, e.g.
    /// `"l1d_cache_refill / l1d_cache"`.
    pub formula: String,
}

impl MetricDef {
    pub fn new(name: impl Into<String>, events: Vec<&str>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: events.into_iter().map(str::to_string).collect(),
            formula: formula.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.events.len() > MAX_METRIC_EVENTS {
            return Err(AgentError::TooManyMetricEvents {
                name: self.name.clone(),
                got: self.events.len(),
                max: MAX_METRIC_EVENTS,
            });
        }
        for event in &self.events {
            resolve_event(event)?;
        }
        Ok(())
    }

    /// Evaluate the formula given per-event accumulated deltas (the
    /// counter-delta values `wperf_core::ReadOut` reports).
    pub fn evaluate(&self, deltas: &HashMap<String, f64>) -> Result<f64> {
        shunting_yard::eval(deltas, &self.formula)
    }
}

static BUILTIN_METRICS: Lazy<Vec<MetricDef>> = Lazy::new(|| {
    vec![
        MetricDef::new(
            "imix",
            vec!["inst_spec", "dp_spec", "vfp_spec", "ase_spec", "ld_spec", "st_spec"],
            "dp_spec + vfp_spec + ase_spec + ld_spec + st_spec / inst_spec",
        ),
        MetricDef::new(
            "icache",
            vec!["l1i_cache", "l1i_cache_refill", "l2i_cache", "l2i_cache_refill", "inst_retired"],
            "l1i_cache_refill / l1i_cache",
        ),
        MetricDef::new(
            "dcache",
            vec!["l1d_cache", "l1d_cache_refill", "l2d_cache", "l2d_cache_refill", "inst_retired"],
            "l1d_cache_refill / l1d_cache",
        ),
        MetricDef::new(
            "itlb",
            vec!["l1i_tlb", "l1i_tlb_refill", "l2i_tlb", "l2i_tlb_refill", "inst_retired"],
            "l1i_tlb_refill / l1i_tlb",
        ),
        MetricDef::new(
            "dtlb",
            vec!["l1d_tlb", "l1d_tlb_refill", "l2d_tlb", "l2d_tlb_refill", "inst_retired"],
            "l1d_tlb_refill / l1d_tlb",
        ),
    ]
});

pub fn builtin_metric_names() -> Vec<&'static str> {
    BUILTIN_METRICS.iter().map(|m| m.name.as_str()).collect()
}

pub fn lookup_builtin(name: &str) -> Option<&'static MetricDef> {
    BUILTIN_METRICS.iter().find(|m| m.name == name)
}

/// Loads a JSON array of [`MetricDef`] from `path`, validating each entry
/// (event-count cap, event-name resolvability) before returning.
pub fn load_metric_defs(path: impl AsRef<Path>) -> Result<Vec<MetricDef>> {
    let contents = std::fs::read_to_string(path)?;
    let defs: Vec<MetricDef> = serde_json::from_str(&contents)?;
    for def in &defs {
        def.validate()?;
    }
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_metrics_have_all_five_names() {
        let names = builtin_metric_names();
        for expected in ["imix", "icache", "dcache", "itlb", "dtlb"] {
            assert!(names.contains(&expected), "missing builtin metric {expected}");
        }
    }

    #[test]
    fn builtin_metrics_never_exceed_max_events() {
        for metric in BUILTIN_METRICS.iter() {
            assert!(metric.events.len() <= MAX_METRIC_EVENTS);
        }
    }

    #[test]
    fn dcache_ratio_evaluates_as_refill_over_total() {
        let metric = lookup_builtin("dcache").unwrap();
        let deltas = HashMap::from([
            ("l1d_cache".to_string(), 1000.0),
            ("l1d_cache_refill".to_string(), 100.0),
        ]);
        assert_eq!(metric.evaluate(&deltas).unwrap(), 0.1);
    }

    #[test]
    fn load_metric_defs_rejects_too_many_events() {
        let dir = std::env::temp_dir().join(format!("wperf-agent-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("metrics.json");
        let bogus = MetricDef::new(
            "toomany",
            vec!["cycle", "cycle", "cycle", "cycle", "cycle", "cycle", "cycle"],
            "cycle",
        );
        std::fs::write(&path, serde_json::to_string(&vec![bogus]).unwrap()).unwrap();
        assert!(load_metric_defs(&path).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
