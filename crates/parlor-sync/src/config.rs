use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Minimum time between a query change and its search settling.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Bounded queue between subscription forwarders and the session task.
pub const DEFAULT_DELIVERY_CAPACITY: usize = 256;

/// Backlog of diagnostics kept for slow observers.
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub settle_delay: Duration,
    pub delivery_capacity: usize,
    pub diagnostics_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Read overrides from `PARLOR_*` environment variables.
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settle_ms: Option<u64> = parse_var(&lookup, "PARLOR_SEARCH_SETTLE_MS")?;
        let delivery_capacity: Option<usize> = parse_var(&lookup, "PARLOR_DELIVERY_CAPACITY")?;
        let diagnostics_capacity: Option<usize> =
            parse_var(&lookup, "PARLOR_DIAGNOSTICS_CAPACITY")?;

        Ok(Self {
            settle_delay: settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            // zero-capacity channels panic on creation
            delivery_capacity: delivery_capacity
                .filter(|&n| n > 0)
                .unwrap_or(defaults.delivery_capacity),
            diagnostics_capacity: diagnostics_capacity
                .filter(|&n| n > 0)
                .unwrap_or(defaults.diagnostics_capacity),
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.settle_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("PARLOR_SEARCH_SETTLE_MS", "250"),
            ("PARLOR_DELIVERY_CAPACITY", "16"),
        ]))
        .unwrap();
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.delivery_capacity, 16);
        assert_eq!(config.diagnostics_capacity, DEFAULT_DIAGNOSTICS_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_falls_back() {
        let config =
            SyncConfig::from_lookup(lookup(&[("PARLOR_DIAGNOSTICS_CAPACITY", "0")])).unwrap();
        assert_eq!(config.diagnostics_capacity, DEFAULT_DIAGNOSTICS_CAPACITY);
    }

    #[test]
    fn test_invalid_value() {
        let err = SyncConfig::from_lookup(lookup(&[("PARLOR_SEARCH_SETTLE_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "PARLOR_SEARCH_SETTLE_MS", .. }
        ));
    }
}
