//! Logging setup.
//!
//! Both binaries log through `tracing`; the filter is assembled from the
//! config file, with `RUST_LOG` taking precedence over all of it when set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Logging section of a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Baseline level for everything: "trace" | "debug" | "info" | "warn" |
    /// "error".
    pub level: String,
    /// Per-crate overrides, e.g. `chainlens-indexer = "debug"`. Dashes are
    /// accepted and mapped to the module-path form.
    pub components: BTreeMap<String, String>,
    /// Emit one JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// The effective filter: `RUST_LOG` when the operator set it, otherwise
    /// the baseline level plus one directive per configured component.
    /// Unparseable directives are dropped rather than failing startup.
    pub fn filter(&self) -> EnvFilter {
        if let Ok(spec) = std::env::var(EnvFilter::DEFAULT_ENV) {
            if !spec.trim().is_empty() {
                return EnvFilter::new(spec);
            }
        }

        let mut filter = EnvFilter::new(&self.level);
        for (component, level) in &self.components {
            let spec = format!("{}={level}", component.replace('-', "_"));
            match spec.parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(_) => eprintln!("ignoring invalid log directive: {spec}"),
            }
        }
        filter
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_tracing(config: &LogConfig) {
    let builder = tracing_subscriber::fmt().with_env_filter(config.filter());
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_directives_join_the_baseline() {
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        let mut config = LogConfig::default();
        config.level = "warn".into();
        config
            .components
            .insert("chainlens-indexer".into(), "debug".into());

        let rendered = config.filter().to_string();
        assert!(rendered.contains("warn"), "filter: {rendered}");
        assert!(
            rendered.contains("chainlens_indexer=debug"),
            "filter: {rendered}"
        );
    }

    #[test]
    fn invalid_directives_are_dropped() {
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        let mut config = LogConfig::default();
        config.components.insert("chainlens-api".into(), "!!".into());

        let rendered = config.filter().to_string();
        assert!(!rendered.contains("chainlens_api"), "filter: {rendered}");
    }
}
