//! SLO error budget tracker.
//!
//! Each record is one SLO measured over a window. The remaining error budget
//! is the share of allowed unreliability (`100 - target`) not yet consumed.

use super::{
    distribution, group_key, matches_opt, rank, require_non_empty, require_range, round2, Engine,
    EngineError, EngineResult, EngineStats, Ranking, RecordStore, StoredRecord,
};
use crate::config::EnginesConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Healthy,
    AtRisk,
    Exhausted,
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BudgetStatus::Healthy => "healthy",
            BudgetStatus::AtRisk => "at_risk",
            BudgetStatus::Exhausted => "exhausted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloRecord {
    pub id: Uuid,
    pub service: String,
    pub slo_name: String,
    pub target_pct: f64,
    pub actual_pct: f64,
    pub window_days: u32,
    pub budget_remaining_pct: f64,
    pub status: BudgetStatus,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord for SloRecord {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SloInput {
    pub service: String,
    pub slo_name: String,
    pub target_pct: f64,
    pub actual_pct: f64,
    #[serde(default = "default_window")]
    pub window_days: u32,
}

fn default_window() -> u32 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SloFilter {
    pub service: Option<String>,
    pub status: Option<BudgetStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloBudgetReport {
    pub total_slos: usize,
    pub healthy: usize,
    pub at_risk: usize,
    pub exhausted: usize,
    pub avg_budget_remaining_pct: f64,
    /// Services with at least one exhausted SLO.
    pub services_exhausted: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Remaining error budget in percent, clamped to `-100..=100`.
pub fn budget_remaining_pct(target_pct: f64, actual_pct: f64) -> f64 {
    let allowed = 100.0 - target_pct;
    let consumed = (100.0 - actual_pct).max(0.0);
    ((allowed - consumed) / allowed * 100.0).clamp(-100.0, 100.0)
}

pub struct SloBudgetEngine {
    store: RecordStore<SloRecord>,
    at_risk_threshold_pct: f64,
}

impl SloBudgetEngine {
    pub fn new(config: &EnginesConfig) -> Self {
        Self {
            store: RecordStore::new(config.max_records),
            at_risk_threshold_pct: config.slo_at_risk_threshold_pct,
        }
    }

    fn classify(&self, remaining: f64) -> BudgetStatus {
        if remaining <= 0.0 {
            BudgetStatus::Exhausted
        } else if remaining < self.at_risk_threshold_pct {
            BudgetStatus::AtRisk
        } else {
            BudgetStatus::Healthy
        }
    }

    /// Latest record per SLO of a service.
    pub fn service_status(&self, service: &str) -> Vec<SloRecord> {
        let mut latest: HashMap<String, SloRecord> = HashMap::new();
        for record in self
            .store
            .snapshot()
            .into_iter()
            .filter(|r| r.service.eq_ignore_ascii_case(service))
        {
            latest.insert(record.slo_name.clone(), record);
        }

        let mut records: Vec<SloRecord> = latest.into_values().collect();
        records.sort_by(|a, b| a.slo_name.cmp(&b.slo_name));
        records
    }
}

impl Engine for SloBudgetEngine {
    type Record = SloRecord;
    type Input = SloInput;
    type Filter = SloFilter;
    type Report = SloBudgetReport;

    fn name(&self) -> &'static str {
        "slo-budget"
    }

    fn record(&self, input: SloInput) -> EngineResult<SloRecord> {
        require_non_empty("service", &input.service)?;
        require_non_empty("slo_name", &input.slo_name)?;
        require_range("actual_pct", input.actual_pct, 0.0, 100.0)?;
        if !(input.target_pct > 0.0 && input.target_pct < 100.0) {
            return Err(EngineError::Validation {
                field: "target_pct",
                reason: format!("must be strictly between 0 and 100 (got {})", input.target_pct),
            });
        }
        if input.window_days == 0 {
            return Err(EngineError::Validation {
                field: "window_days",
                reason: "must be at least 1".to_string(),
            });
        }

        let remaining = budget_remaining_pct(input.target_pct, input.actual_pct);
        let record = SloRecord {
            id: Uuid::new_v4(),
            service: input.service,
            slo_name: input.slo_name,
            target_pct: input.target_pct,
            actual_pct: input.actual_pct,
            window_days: input.window_days,
            budget_remaining_pct: round2(remaining),
            status: self.classify(remaining),
            created_at: Utc::now(),
        };
        self.store.insert(record.clone());
        Ok(record)
    }

    fn list(&self, filter: &SloFilter, limit: usize) -> Vec<SloRecord> {
        self.store.list(
            |r| {
                matches_opt(&filter.service, &r.service)
                    && filter.status.map_or(true, |s| s == r.status)
            },
            limit,
        )
    }

    fn get(&self, id: Uuid) -> EngineResult<SloRecord> {
        self.store.get(id).ok_or(EngineError::NotFound(id))
    }

    /// Services by their lowest remaining budget, most burnt first.
    fn rankings(&self) -> Vec<Ranking> {
        let mut services: HashMap<String, (f64, usize)> = HashMap::new();
        for record in self.store.snapshot() {
            let entry = services
                .entry(group_key(&record.service))
                .or_insert((f64::INFINITY, 0));
            entry.0 = entry.0.min(record.budget_remaining_pct);
            entry.1 += 1;
        }

        let entries = services
            .into_iter()
            .map(|(service, (min, count))| (service, min, count))
            .collect();
        rank(entries, false)
    }

    fn report(&self) -> SloBudgetReport {
        let records = self.store.snapshot();
        let count = |status: BudgetStatus| records.iter().filter(|r| r.status == status).count();

        let avg = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.budget_remaining_pct).sum::<f64>() / records.len() as f64
        };

        let mut services_exhausted: Vec<String> = records
            .iter()
            .filter(|r| r.status == BudgetStatus::Exhausted)
            .map(|r| group_key(&r.service))
            .collect();
        services_exhausted.sort();
        services_exhausted.dedup();

        let at_risk = count(BudgetStatus::AtRisk);
        let mut recommendations = Vec::new();
        if !services_exhausted.is_empty() {
            recommendations.push(format!(
                "Freeze feature releases for {} until error budget recovers",
                services_exhausted.join(", ")
            ));
        }
        if at_risk > 0 {
            recommendations.push(format!(
                "{} SLO(s) below {:.0}% budget; prioritize reliability work",
                at_risk, self.at_risk_threshold_pct
            ));
        }

        SloBudgetReport {
            total_slos: records.len(),
            healthy: count(BudgetStatus::Healthy),
            at_risk,
            exhausted: count(BudgetStatus::Exhausted),
            avg_budget_remaining_pct: round2(avg),
            services_exhausted,
            recommendations,
        }
    }

    fn stats(&self) -> EngineStats {
        let records = self.store.snapshot();
        EngineStats {
            engine: self.name().to_string(),
            total_records: records.len(),
            max_records: self.store.max_records(),
            distribution: distribution(&records, |r| r.status.to_string()),
        }
    }

    fn clear(&self) -> usize {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slo(service: &str, target: f64, actual: f64) -> SloInput {
        SloInput {
            service: service.to_string(),
            slo_name: "availability".to_string(),
            target_pct: target,
            actual_pct: actual,
            window_days: 30,
        }
    }

    #[test]
    fn test_budget_remaining() {
        assert!((budget_remaining_pct(99.9, 100.0) - 100.0).abs() < 1e-9);
        assert!((budget_remaining_pct(99.0, 99.5) - 50.0).abs() < 1e-9);
        assert!(budget_remaining_pct(99.9, 99.9).abs() < 1e-6);
        assert_eq!(budget_remaining_pct(99.9, 50.0), -100.0);
    }

    #[test]
    fn test_record_classifies_status() {
        let engine = SloBudgetEngine::new(&EnginesConfig::default());
        assert_eq!(
            engine.record(slo("api", 99.0, 99.9)).unwrap().status,
            BudgetStatus::Healthy
        );
        assert_eq!(
            engine.record(slo("api", 99.0, 99.1)).unwrap().status,
            BudgetStatus::AtRisk
        );
        assert_eq!(
            engine.record(slo("api", 99.0, 98.0)).unwrap().status,
            BudgetStatus::Exhausted
        );
    }

    #[test]
    fn test_record_validation() {
        let engine = SloBudgetEngine::new(&EnginesConfig::default());
        assert!(engine.record(slo("api", 100.0, 99.0)).is_err());
        assert!(engine.record(slo("api", 99.0, 101.0)).is_err());
        let mut zero_window = slo("api", 99.0, 99.0);
        zero_window.window_days = 0;
        assert!(engine.record(zero_window).is_err());
    }

    #[test]
    fn test_rankings_most_burnt_first() {
        let engine = SloBudgetEngine::new(&EnginesConfig::default());
        engine.record(slo("search", 99.0, 99.9)).unwrap();
        engine.record(slo("checkout", 99.0, 99.5)).unwrap();
        engine.record(slo("checkout", 99.0, 98.5)).unwrap();

        let rankings = engine.rankings();
        assert_eq!(rankings[0].key, "checkout");
        assert_eq!(rankings[0].value, -50.0);
        assert_eq!(rankings[0].count, 2);
        assert_eq!(rankings[1].key, "search");
    }

    #[test]
    fn test_rankings_group_services_case_insensitively() {
        let engine = SloBudgetEngine::new(&EnginesConfig::default());
        engine.record(slo("Checkout", 99.0, 99.5)).unwrap();
        engine.record(slo("checkout", 99.0, 98.0)).unwrap();
        engine.record(slo("search", 99.0, 99.9)).unwrap();

        let rankings = engine.rankings();
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].key, "checkout");
        assert_eq!(rankings[0].count, 2);
        assert_eq!(rankings[0].value, -100.0);
        let filter = SloFilter {
            service: Some("CHECKOUT".to_string()),
            status: None,
        };
        assert_eq!(rankings[0].count, engine.list(&filter, 10).len());

        engine.record(slo("CHECKOUT", 99.0, 97.0)).unwrap();
        assert_eq!(engine.report().services_exhausted, vec!["checkout".to_string()]);
    }

    #[test]
    fn test_report_and_service_status() {
        let engine = SloBudgetEngine::new(&EnginesConfig::default());
        engine.record(slo("checkout", 99.0, 98.0)).unwrap();
        engine.record(slo("search", 99.0, 99.1)).unwrap();

        let report = engine.report();
        assert_eq!(report.exhausted, 1);
        assert_eq!(report.at_risk, 1);
        assert_eq!(report.services_exhausted, vec!["checkout".to_string()]);
        assert_eq!(report.recommendations.len(), 2);

        let status = engine.service_status("CHECKOUT");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].status, BudgetStatus::Exhausted);
    }
}
