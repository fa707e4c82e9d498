//! Config key-value store (spec.md §4.5): typed, named fields with
//! read-only/read-write metadata, generalized from the teacher's
//! `ExportConfig` shape (`sockets`/`cores` fields replaced by the
//! counting-period family `count.period*`).

use crate::error::{AgentError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
enum Access {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy)]
struct Field {
    value: i64,
    access: Access,
}

/// `count.period`, `count.period_min`, `count.period_max`, and any other
/// keys registered at construction time. `set("key=value")` parses on
/// `=` and rejects unknown keys or writes to read-only fields.
#[derive(Debug, Clone)]
pub struct DrvConfig {
    fields: HashMap<String, Field>,
}

const DEFAULT_PERIOD_MIN: i64 = 10;
const DEFAULT_PERIOD_MAX: i64 = 1_000_000;
const DEFAULT_PERIOD: i64 = 100;

impl DrvConfig {
    /// Seed the store with the counting-period family used by the
    /// scheduler (spec.md §4.3 `PERIOD_MIN`/`PERIOD_MAX`/`PMU_CTL_START_PERIOD`).
    pub fn new() -> Self {
        let mut fields = HashMap::new();
        fields.insert(
            "count.period".to_string(),
            Field { value: DEFAULT_PERIOD, access: Access::ReadWrite },
        );
        fields.insert(
            "count.period_min".to_string(),
            Field { value: DEFAULT_PERIOD_MIN, access: Access::ReadOnly },
        );
        fields.insert(
            "count.period_max".to_string(),
            Field { value: DEFAULT_PERIOD_MAX, access: Access::ReadOnly },
        );
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.fields.get(key).map(|f| f.value)
    }

    /// Returns `true` on a successful write, `false` if `key` is
    /// read-only (spec.md S5 "returns false (read-only)"). Unknown keys
    /// are a hard error since this is a configuration mistake, not a
    /// runtime race.
    pub fn set_value(&mut self, key: &str, value: i64) -> Result<bool> {
        let field = self
            .fields
            .get_mut(key)
            .ok_or_else(|| AgentError::ConfigError(format!("unknown config key: {key}")))?;
        match field.access {
            Access::ReadOnly => {
                tracing::warn!("rejected write to read-only config key {key}");
                Ok(false)
            }
            Access::ReadWrite => {
                if value < self.fields["count.period_min"].value
                    || value > self.fields["count.period_max"].value
                {
                    if key == "count.period" {
                        return Err(AgentError::ConfigError(format!(
                            "period {value} outside [period_min, period_max]"
                        )));
                    }
                }
                field.value = value;
                tracing::info!("set {key}={value}");
                Ok(true)
            }
        }
    }

    /// Parses `"key=value"` and applies it via [`Self::set_value`].
    pub fn set(&mut self, assignment: &str) -> Result<bool> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| AgentError::ConfigError(format!("malformed assignment: {assignment}")))?;
        let value: i64 = value
            .trim()
            .parse()
            .map_err(|_| AgentError::ConfigError(format!("not an integer: {value}")))?;
        self.set_value(key.trim(), value)
    }
}

impl Default for DrvConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `convert_timeout_arg_to_seconds` (spec.md S6): parse a duration like
/// `"2m"`, `"2.5h"`, `"100ms"`, `"3s"` into seconds. Unitless or
/// unrecognized suffixes are rejected.
pub fn convert_timeout_arg_to_seconds(arg: &str) -> Result<f64> {
    let arg = arg.trim();
    let (number, unit) = if let Some(stripped) = arg.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = arg.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = arg.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = arg.strip_suffix('h') {
        (stripped, "h")
    } else if let Some(stripped) = arg.strip_suffix('d') {
        (stripped, "d")
    } else {
        return Err(AgentError::ConfigError(format!("missing time unit: {arg}")));
    };

    if let Some((_, frac)) = number.split_once('.') {
        if frac.len() > 2 {
            return Err(AgentError::ConfigError(format!(
                "at most two decimal digits allowed: {arg}"
            )));
        }
    }

    let value: f64 = number
        .parse()
        .map_err(|_| AgentError::ConfigError(format!("not a number: {number}")))?;

    let seconds = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        "d" => value * 86400.0,
        _ => unreachable!(),
    };
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut config = DrvConfig::new();
        assert!(config.set("count.period=50").unwrap());
        assert_eq!(config.get("count.period"), Some(50));
    }

    #[test]
    fn read_only_write_is_rejected_without_mutation() {
        let mut config = DrvConfig::new();
        assert!(!config.set("count.period_min=10").unwrap());
        assert_eq!(config.get("count.period_min"), Some(DEFAULT_PERIOD_MIN));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let mut config = DrvConfig::new();
        assert!(config.set("bogus.key=1").is_err());
    }

    #[test]
    fn timeout_parsing_matches_s6() {
        assert_eq!(convert_timeout_arg_to_seconds("2m").unwrap(), 120.0);
        assert_eq!(convert_timeout_arg_to_seconds("2.5h").unwrap(), 9000.0);
        assert_eq!(convert_timeout_arg_to_seconds("100ms").unwrap(), 0.1);
        assert!(convert_timeout_arg_to_seconds("3.2222s").is_err());
    }
}
