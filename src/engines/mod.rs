//! Analytics engines.
//!
//! Every engine is a bounded in-memory record store for one metric domain
//! with the same surface: record, list, get, rank, report, stats and clear.
//! The REST layer is generic over the [`Engine`] trait, so adding a domain
//! means adding a record type and its aggregates.

pub mod alert_correlation;
pub mod capacity;
pub mod compliance;
pub mod cost_allocation;
pub mod slo_budget;
pub mod store;

pub use alert_correlation::AlertCorrelationEngine;
pub use capacity::CapacityEngine;
pub use compliance::ComplianceEngine;
pub use cost_allocation::CostAllocationEngine;
pub use slo_budget::SloBudgetEngine;
pub use store::{RecordStore, StoredRecord};

use crate::config::EnginesConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by engine operations.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("record not found: {0}")]
    NotFound(Uuid),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A ranked aggregate (a service, team, framework...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub rank: usize,
    pub key: String,
    pub value: f64,
    pub count: usize,
}

/// Record counts and capacity for an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub engine: String,
    pub total_records: usize,
    pub max_records: usize,
    /// Record count per engine-specific key.
    pub distribution: BTreeMap<String, usize>,
}

/// The operations every engine exposes.
pub trait Engine: Send + Sync + 'static {
    type Record: StoredRecord + Serialize;
    type Input: DeserializeOwned + Send + 'static;
    type Filter: DeserializeOwned + Default + Send + 'static;
    type Report: Serialize + Send + 'static;

    /// Route slug, e.g. `alert-correlation`.
    fn name(&self) -> &'static str;

    /// Validate and store a new record.
    fn record(&self, input: Self::Input) -> EngineResult<Self::Record>;

    /// Matching records, newest first.
    fn list(&self, filter: &Self::Filter, limit: usize) -> Vec<Self::Record>;

    fn get(&self, id: Uuid) -> EngineResult<Self::Record>;

    fn rankings(&self) -> Vec<Ranking>;

    fn report(&self) -> Self::Report;

    fn stats(&self) -> EngineStats;

    /// Drop every record. Returns how many were removed.
    fn clear(&self) -> usize;
}

/// Sort `(key, value, count)` triples and number them from 1.
pub(crate) fn rank(mut entries: Vec<(String, f64, usize)>, descending: bool) -> Vec<Ranking> {
    entries.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
        let ord = if descending { ord.reverse() } else { ord };
        ord.then_with(|| a.0.cmp(&b.0))
    });

    entries
        .into_iter()
        .enumerate()
        .map(|(i, (key, value, count))| Ranking {
            rank: i + 1,
            key,
            value: round2(value),
            count,
        })
        .collect()
}

/// Count records per key.
pub(crate) fn distribution<R, F>(records: &[R], key: F) -> BTreeMap<String, usize>
where
    F: Fn(&R) -> String,
{
    let mut dist = BTreeMap::new();
    for record in records {
        *dist.entry(key(record)).or_insert(0) += 1;
    }
    dist
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn require_range(field: &'static str, value: f64, min: f64, max: f64) -> EngineResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::Validation {
            field,
            reason: format!("must be between {} and {} (got {})", min, max, value),
        });
    }
    Ok(())
}

/// Compare an optional filter value case-insensitively.
pub(crate) fn matches_opt(filter: &Option<String>, value: &str) -> bool {
    filter
        .as_deref()
        .map_or(true, |f| f.eq_ignore_ascii_case(value))
}

/// Key used to group records by a free-text name, matching how filters compare.
pub(crate) fn group_key(value: &str) -> String {
    value.to_ascii_lowercase()
}

/// Name and size of a registered engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    pub name: String,
    pub total_records: usize,
}

/// Owns one instance of every engine.
#[derive(Clone)]
pub struct EngineRegistry {
    pub alerts: Arc<AlertCorrelationEngine>,
    pub costs: Arc<CostAllocationEngine>,
    pub compliance: Arc<ComplianceEngine>,
    pub slo: Arc<SloBudgetEngine>,
    pub capacity: Arc<CapacityEngine>,
}

impl EngineRegistry {
    pub fn from_config(config: &EnginesConfig) -> Self {
        Self {
            alerts: Arc::new(AlertCorrelationEngine::new(config)),
            costs: Arc::new(CostAllocationEngine::new(config)),
            compliance: Arc::new(ComplianceEngine::new(config)),
            slo: Arc::new(SloBudgetEngine::new(config)),
            capacity: Arc::new(CapacityEngine::new(config)),
        }
    }

    pub fn summaries(&self) -> Vec<EngineSummary> {
        [
            self.alerts.stats(),
            self.costs.stats(),
            self.compliance.stats(),
            self.slo.stats(),
            self.capacity.stats(),
        ]
        .into_iter()
        .map(|s| EngineSummary {
            name: s.engine,
            total_records: s.total_records,
        })
        .collect()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::from_config(&EnginesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_and_numbers() {
        let ranked = rank(
            vec![
                ("b".to_string(), 2.0, 1),
                ("a".to_string(), 5.0, 3),
                ("c".to_string(), 2.0, 2),
            ],
            true,
        );
        let keys: Vec<&str> = ranked.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);

        let ascending = rank(vec![("x".to_string(), 3.0, 1), ("y".to_string(), 1.0, 1)], false);
        assert_eq!(ascending[0].key, "y");
    }

    #[test]
    fn test_require_range() {
        assert!(require_range("pct", 50.0, 0.0, 100.0).is_ok());
        assert!(require_range("pct", 100.1, 0.0, 100.0).is_err());
        assert!(require_range("pct", f64::NAN, 0.0, 100.0).is_err());
    }

    #[test]
    fn test_matches_opt() {
        assert!(matches_opt(&None, "checkout"));
        assert!(matches_opt(&Some("Checkout".to_string()), "checkout"));
        assert!(!matches_opt(&Some("billing".to_string()), "checkout"));
    }

    #[test]
    fn test_group_key_agrees_with_filters() {
        assert_eq!(group_key("Checkout"), group_key("checkout"));
        assert!(matches_opt(&Some(group_key("CHECKOUT")), "Checkout"));
    }

    #[test]
    fn test_registry_summaries() {
        let registry = EngineRegistry::default();
        let names: Vec<String> = registry.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "alert-correlation",
                "cost-allocation",
                "compliance",
                "slo-budget",
                "capacity"
            ]
        );
    }
}
