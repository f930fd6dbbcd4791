//! Engine-wide options, with defaults and environment overrides.

use lazy_static::lazy_static;
use tracing::*;

use crate::aromaticity::AromaticityOptions;
use crate::enrich::EnrichOptions;
use crate::pattern::MatchOptions;
use crate::rings::RingLimits;
use crate::write::WriteOptions;

/// Options for every stage, as used by [`crate::prepare`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub enrich: EnrichOptions,
    pub rings: RingLimits,
    pub aromaticity: AromaticityOptions,
    pub matching: MatchOptions,
    pub write: WriteOptions,
}

lazy_static! {
    /// Defaults with `MOLGRAPH_*` overrides applied, read once.
    static ref DEFAULT_CONFIG: EngineConfig = EngineConfig::from_env();
}

fn env_value<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}

impl EngineConfig {
    /// The process-wide configuration.
    pub fn global() -> &'static EngineConfig {
        &DEFAULT_CONFIG
    }

    /// The defaults, overridden by `MOLGRAPH_MAX_CYCLE_LENGTH`,
    /// `MOLGRAPH_MAX_MATCHES`, `MOLGRAPH_MAX_STEPS` and `MOLGRAPH_STRICT_VALENCE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`EngineConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(length) = env_value::<usize>(&lookup, "MOLGRAPH_MAX_CYCLE_LENGTH") {
            let rings = config.rings.clone().with_max_cycle_length(length);
            config = config.with_rings(rings);
        }
        if let Some(max) = env_value::<usize>(&lookup, "MOLGRAPH_MAX_MATCHES") {
            config.matching.max_matches = Some(max);
        }
        if let Some(steps) = env_value::<usize>(&lookup, "MOLGRAPH_MAX_STEPS") {
            config.matching.max_steps = Some(steps);
        }
        if let Some(strict) = env_value::<bool>(&lookup, "MOLGRAPH_STRICT_VALENCE") {
            config.enrich = config.enrich.with_strict(strict);
        }
        debug!("Engine configuration: {config:?}");
        config
    }

    pub fn with_enrich(mut self, enrich: EnrichOptions) -> Self {
        self.enrich = enrich;
        self
    }

    /// Ring limits apply to perception and to ring predicates in matching.
    pub fn with_rings(mut self, rings: RingLimits) -> Self {
        self.aromaticity = self.aromaticity.with_ring_limits(rings.clone());
        self.matching = self.matching.with_ring_limits(rings.clone());
        self.rings = rings;
        self
    }

    pub fn with_aromaticity(mut self, aromaticity: AromaticityOptions) -> Self {
        self.aromaticity = aromaticity;
        self
    }

    pub fn with_matching(mut self, matching: MatchOptions) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_write(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_ring_limits_propagate() {
        let config = EngineConfig::default().with_rings(RingLimits::default().with_max_cycle_length(12));
        assert_eq!(config.rings.max_cycle_length, 12);
        assert_eq!(config.aromaticity.ring_limits.max_cycle_length, 12);
        assert_eq!(config.matching.ring_limits.max_cycle_length, 12);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MOLGRAPH_MAX_MATCHES", "7"),
            ("MOLGRAPH_MAX_STEPS", "not a number"),
            ("MOLGRAPH_MAX_CYCLE_LENGTH", "10"),
            ("MOLGRAPH_STRICT_VALENCE", "true"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|name| vars.get(name).map(|value| value.to_string()));
        assert_eq!(config.matching.max_matches, Some(7));
        assert_eq!(config.matching.max_steps, MatchOptions::default().max_steps);
        assert_eq!(config.matching.ring_limits.max_cycle_length, 10);
        assert!(config.enrich.strict);

        assert_eq!(EngineConfig::from_lookup(|_| None), EngineConfig::default());
    }
}
