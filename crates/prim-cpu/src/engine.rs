use std::sync::Arc;

use prim_core::{Engine, EngineKind};

/// Environment variable enabling a summary log line per execution.
pub const VERBOSE_ENV: &str = "PRIM_VERBOSE";
/// Environment variable selecting the CPU engine index.
pub const INDEX_ENV: &str = "PRIM_CPU_INDEX";

/// Configuration for a [`CpuEngine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuEngineConfig {
    /// Device index reported by the engine.
    pub index: usize,
    /// Log every primitive execution at info level.
    pub verbose: bool,
}

impl CpuEngineConfig {
    /// Read the configuration from the process environment.
    ///
    /// - `PRIM_VERBOSE`: `1`, `true` or `yes` enable verbose execution logs
    /// - `PRIM_CPU_INDEX`: engine index (default 0)
    ///
    /// Unset or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let verbose = lookup(VERBOSE_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let index = lookup(INDEX_ENV)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        CpuEngineConfig { index, verbose }
    }
}

/// Host CPU engine. Execution on it completes inside `execute`.
#[derive(Debug, Clone, Default)]
pub struct CpuEngine {
    config: CpuEngineConfig,
}

impl CpuEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CpuEngineConfig) -> Self {
        CpuEngine { config }
    }

    pub fn config(&self) -> &CpuEngineConfig {
        &self.config
    }

    /// Wrap the engine for sharing between descriptors and primitives.
    pub fn into_shared(self) -> Arc<dyn Engine> {
        Arc::new(self)
    }
}

impl Engine for CpuEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Cpu
    }

    fn index(&self) -> usize {
        self.config.index
    }

    fn verbose(&self) -> bool {
        self.config.verbose
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CpuEngineConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, CpuEngineConfig::default());
        assert!(!config.verbose);
        assert_eq!(config.index, 0);
    }

    #[test]
    fn test_config_from_values() {
        let config =
            CpuEngineConfig::from_lookup(lookup_from(&[(VERBOSE_ENV, "True"), (INDEX_ENV, "3")]));
        assert!(config.verbose);
        assert_eq!(config.index, 3);
    }

    #[test]
    fn test_config_bad_values_fall_back() {
        let config =
            CpuEngineConfig::from_lookup(lookup_from(&[(VERBOSE_ENV, "loud"), (INDEX_ENV, "-1")]));
        assert!(!config.verbose);
        assert_eq!(config.index, 0);
    }

    #[test]
    fn test_engine_reports_config() {
        let engine = CpuEngine::with_config(CpuEngineConfig {
            index: 1,
            verbose: true,
        })
        .into_shared();
        assert_eq!(engine.kind(), EngineKind::Cpu);
        assert_eq!(engine.index(), 1);
        assert!(engine.verbose());
    }
}
