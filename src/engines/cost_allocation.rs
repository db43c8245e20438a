//! Cost allocation engine.
//!
//! Spend records attributed to teams and services, with how much of each
//! record could actually be allocated to an owner.

use super::{
    distribution, group_key, matches_opt, rank, require_non_empty, require_range, round2, Engine,
    EngineError, EngineResult, EngineStats, Ranking, RecordStore, StoredRecord,
};
use crate::config::EnginesConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostCategory {
    Compute,
    Storage,
    Network,
    License,
    Other,
}

impl fmt::Display for CostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CostCategory::Compute => "compute",
            CostCategory::Storage => "storage",
            CostCategory::Network => "network",
            CostCategory::License => "license",
            CostCategory::Other => "other",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: Uuid,
    pub team: String,
    pub service: String,
    pub category: CostCategory,
    pub amount_usd: f64,
    /// Share of the amount attributed to an owner (0..=100).
    pub allocated_pct: f64,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord for CostRecord {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl CostRecord {
    pub fn unallocated_usd(&self) -> f64 {
        self.amount_usd * (100.0 - self.allocated_pct) / 100.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostInput {
    pub team: String,
    pub service: String,
    pub category: CostCategory,
    pub amount_usd: f64,
    #[serde(default = "full_allocation")]
    pub allocated_pct: f64,
}

fn full_allocation() -> f64 {
    100.0
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CostFilter {
    pub team: Option<String>,
    pub service: Option<String>,
    pub category: Option<CostCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostAllocationReport {
    pub total_records: usize,
    pub total_spend_usd: f64,
    pub unallocated_spend_usd: f64,
    pub by_category_usd: BTreeMap<String, f64>,
    /// Records allocated below the target percentage.
    pub poorly_allocated: usize,
    pub top_team: Option<String>,
    pub recommendations: Vec<String>,
}

pub struct CostAllocationEngine {
    store: RecordStore<CostRecord>,
    allocation_target_pct: f64,
}

impl CostAllocationEngine {
    pub fn new(config: &EnginesConfig) -> Self {
        Self {
            store: RecordStore::new(config.max_records),
            allocation_target_pct: config.allocation_target_pct,
        }
    }
}

impl Engine for CostAllocationEngine {
    type Record = CostRecord;
    type Input = CostInput;
    type Filter = CostFilter;
    type Report = CostAllocationReport;

    fn name(&self) -> &'static str {
        "cost-allocation"
    }

    fn record(&self, input: CostInput) -> EngineResult<CostRecord> {
        require_non_empty("team", &input.team)?;
        require_non_empty("service", &input.service)?;
        require_range("amount_usd", input.amount_usd, 0.0, f64::MAX)?;
        require_range("allocated_pct", input.allocated_pct, 0.0, 100.0)?;

        let record = CostRecord {
            id: Uuid::new_v4(),
            team: input.team,
            service: input.service,
            category: input.category,
            amount_usd: input.amount_usd,
            allocated_pct: input.allocated_pct,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone());
        Ok(record)
    }

    fn list(&self, filter: &CostFilter, limit: usize) -> Vec<CostRecord> {
        self.store.list(
            |c| {
                matches_opt(&filter.team, &c.team)
                    && matches_opt(&filter.service, &c.service)
                    && filter.category.map_or(true, |cat| cat == c.category)
            },
            limit,
        )
    }

    fn get(&self, id: Uuid) -> EngineResult<CostRecord> {
        self.store.get(id).ok_or(EngineError::NotFound(id))
    }

    fn rankings(&self) -> Vec<Ranking> {
        let mut teams: HashMap<String, (f64, usize)> = HashMap::new();
        for cost in self.store.snapshot() {
            let entry = teams.entry(group_key(&cost.team)).or_default();
            entry.0 += cost.amount_usd;
            entry.1 += 1;
        }

        let entries = teams
            .into_iter()
            .map(|(team, (spend, count))| (team, spend, count))
            .collect();
        rank(entries, true)
    }

    fn report(&self) -> CostAllocationReport {
        let costs = self.store.snapshot();

        let total: f64 = costs.iter().map(|c| c.amount_usd).sum();
        let unallocated: f64 = costs.iter().map(CostRecord::unallocated_usd).sum();
        let poorly_allocated = costs
            .iter()
            .filter(|c| c.allocated_pct < self.allocation_target_pct)
            .count();

        let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
        for cost in &costs {
            *by_category.entry(cost.category.to_string()).or_insert(0.0) += cost.amount_usd;
        }
        for value in by_category.values_mut() {
            *value = round2(*value);
        }

        let top_team = self.rankings().into_iter().next().map(|r| r.key);

        let mut recommendations = Vec::new();
        if poorly_allocated > 0 {
            recommendations.push(format!(
                "Tag resources for {} record(s) allocated below {:.0}%",
                poorly_allocated, self.allocation_target_pct
            ));
        }
        if total > 0.0 && unallocated / total > 0.1 {
            recommendations.push(format!(
                "{:.1}% of spend is unallocated; enforce ownership tags in provisioning",
                unallocated / total * 100.0
            ));
        }
        if let Some((category, amount)) = by_category
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            if total > 0.0 && amount / total > 0.6 {
                recommendations.push(format!(
                    "{} dominates spend ({:.0}%); review rightsizing and commitments",
                    category,
                    amount / total * 100.0
                ));
            }
        }

        CostAllocationReport {
            total_records: costs.len(),
            total_spend_usd: round2(total),
            unallocated_spend_usd: round2(unallocated),
            by_category_usd: by_category,
            poorly_allocated,
            top_team,
            recommendations,
        }
    }

    fn stats(&self) -> EngineStats {
        let costs = self.store.snapshot();
        EngineStats {
            engine: self.name().to_string(),
            total_records: costs.len(),
            max_records: self.store.max_records(),
            distribution: distribution(&costs, |c| c.team.clone()),
        }
    }

    fn clear(&self) -> usize {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(team: &str, category: CostCategory, amount: f64, pct: f64) -> CostInput {
        CostInput {
            team: team.to_string(),
            service: format!("{}-svc", team),
            category,
            amount_usd: amount,
            allocated_pct: pct,
        }
    }

    #[test]
    fn test_record_validation() {
        let engine = CostAllocationEngine::new(&EnginesConfig::default());
        assert!(engine
            .record(cost("payments", CostCategory::Compute, -1.0, 100.0))
            .is_err());
        assert!(engine
            .record(cost("payments", CostCategory::Compute, 10.0, 120.0))
            .is_err());
        assert!(engine
            .record(cost("payments", CostCategory::Compute, 10.0, 100.0))
            .is_ok());
    }

    #[test]
    fn test_team_rankings_ignore_case() {
        let engine = CostAllocationEngine::new(&EnginesConfig::default());
        engine
            .record(cost("Payments", CostCategory::Compute, 100.0, 100.0))
            .unwrap();
        engine
            .record(cost("payments", CostCategory::Storage, 100.0, 100.0))
            .unwrap();
        engine
            .record(cost("search", CostCategory::Network, 150.0, 100.0))
            .unwrap();

        let rankings = engine.rankings();
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].key, "payments");
        assert_eq!(rankings[0].value, 200.0);
        assert_eq!(engine.report().top_team.as_deref(), Some("payments"));
    }

    #[test]
    fn test_input_defaults_to_full_allocation() {
        let input: CostInput = serde_json::from_str(
            r#"{"team": "data", "service": "etl", "category": "storage", "amount_usd": 12.5}"#,
        )
        .unwrap();
        assert_eq!(input.allocated_pct, 100.0);
        assert_eq!(input.category, CostCategory::Storage);
    }

    #[test]
    fn test_rankings_by_team_spend() {
        let engine = CostAllocationEngine::new(&EnginesConfig::default());
        engine
            .record(cost("search", CostCategory::Compute, 100.0, 100.0))
            .unwrap();
        engine
            .record(cost("payments", CostCategory::Storage, 300.0, 100.0))
            .unwrap();
        engine
            .record(cost("search", CostCategory::Network, 50.0, 100.0))
            .unwrap();

        let rankings = engine.rankings();
        assert_eq!(rankings[0].key, "payments");
        assert_eq!(rankings[1].key, "search");
        assert_eq!(rankings[1].value, 150.0);
        assert_eq!(rankings[1].count, 2);
    }

    #[test]
    fn test_report_unallocated_spend() {
        let engine = CostAllocationEngine::new(&EnginesConfig::default());
        engine
            .record(cost("search", CostCategory::Compute, 1000.0, 50.0))
            .unwrap();
        engine
            .record(cost("payments", CostCategory::Storage, 200.0, 100.0))
            .unwrap();

        let report = engine.report();
        assert_eq!(report.total_spend_usd, 1200.0);
        assert_eq!(report.unallocated_spend_usd, 500.0);
        assert_eq!(report.poorly_allocated, 1);
        assert_eq!(report.by_category_usd.get("compute"), Some(&1000.0));
        assert_eq!(report.top_team.as_deref(), Some("search"));
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn test_list_by_category() {
        let engine = CostAllocationEngine::new(&EnginesConfig::default());
        engine
            .record(cost("search", CostCategory::Compute, 1.0, 100.0))
            .unwrap();
        engine
            .record(cost("search", CostCategory::License, 1.0, 100.0))
            .unwrap();

        let filter = CostFilter {
            category: Some(CostCategory::License),
            ..CostFilter::default()
        };
        let listed = engine.list(&filter, 10);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].category, CostCategory::License);
    }
}
