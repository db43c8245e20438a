//! Capacity planning engine.
//!
//! Utilization samples per resource with a monthly growth rate, projected
//! forward with compound growth to estimate when a resource saturates.

use super::{
    distribution, matches_opt, rank, require_non_empty, require_range, round2, Engine,
    EngineError, EngineResult, EngineStats, Ranking, RecordStore, StoredRecord,
};
use crate::config::EnginesConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
            ResourceType::Disk => "disk",
            ResourceType::Network => "network",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub id: Uuid,
    pub resource_id: String,
    pub service: String,
    pub resource_type: ResourceType,
    pub utilization_pct: f64,
    pub monthly_growth_pct: f64,
    /// Months until 100% utilization at the current growth rate.
    pub months_to_exhaustion: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord for CapacityRecord {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapacityInput {
    pub resource_id: String,
    pub service: String,
    pub resource_type: ResourceType,
    pub utilization_pct: f64,
    #[serde(default)]
    pub monthly_growth_pct: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapacityFilter {
    pub service: Option<String>,
    pub resource_type: Option<ResourceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustionForecast {
    pub resource_id: String,
    pub service: String,
    pub resource_type: ResourceType,
    pub months_to_exhaustion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityReport {
    pub total_resources: usize,
    pub avg_utilization_pct: f64,
    /// Resources above the headroom threshold.
    pub low_headroom: Vec<String>,
    /// Resources forecast to saturate within the horizon, soonest first.
    pub forecasts: Vec<ExhaustionForecast>,
    pub recommendations: Vec<String>,
}

/// Compound-growth projection to 100% utilization.
pub fn months_to_exhaustion(utilization_pct: f64, monthly_growth_pct: f64) -> Option<f64> {
    if utilization_pct >= 100.0 {
        return Some(0.0);
    }
    if utilization_pct <= 0.0 || monthly_growth_pct <= 0.0 {
        return None;
    }
    Some((100.0 / utilization_pct).ln() / (1.0 + monthly_growth_pct / 100.0).ln())
}

pub struct CapacityEngine {
    store: RecordStore<CapacityRecord>,
    headroom_threshold_pct: f64,
    forecast_horizon_months: f64,
}

impl CapacityEngine {
    pub fn new(config: &EnginesConfig) -> Self {
        Self {
            store: RecordStore::new(config.max_records),
            headroom_threshold_pct: config.headroom_threshold_pct,
            forecast_horizon_months: config.forecast_horizon_months,
        }
    }

    /// Latest sample per resource.
    fn latest(&self) -> Vec<CapacityRecord> {
        let mut latest: HashMap<String, CapacityRecord> = HashMap::new();
        for record in self.store.snapshot() {
            latest.insert(record.resource_id.clone(), record);
        }
        let mut records: Vec<CapacityRecord> = latest.into_values().collect();
        records.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        records
    }

    /// Latest samples of a service above the headroom threshold.
    pub fn hot_spots(&self, service: &str) -> Vec<CapacityRecord> {
        self.latest()
            .into_iter()
            .filter(|r| {
                r.service.eq_ignore_ascii_case(service)
                    && r.utilization_pct >= self.headroom_threshold_pct
            })
            .collect()
    }
}

impl Engine for CapacityEngine {
    type Record = CapacityRecord;
    type Input = CapacityInput;
    type Filter = CapacityFilter;
    type Report = CapacityReport;

    fn name(&self) -> &'static str {
        "capacity"
    }

    fn record(&self, input: CapacityInput) -> EngineResult<CapacityRecord> {
        require_non_empty("resource_id", &input.resource_id)?;
        require_non_empty("service", &input.service)?;
        require_range("utilization_pct", input.utilization_pct, 0.0, 100.0)?;
        require_range("monthly_growth_pct", input.monthly_growth_pct, -100.0, 1000.0)?;

        let record = CapacityRecord {
            id: Uuid::new_v4(),
            months_to_exhaustion: months_to_exhaustion(
                input.utilization_pct,
                input.monthly_growth_pct,
            )
            .map(round2),
            resource_id: input.resource_id,
            service: input.service,
            resource_type: input.resource_type,
            utilization_pct: input.utilization_pct,
            monthly_growth_pct: input.monthly_growth_pct,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone());
        Ok(record)
    }

    fn list(&self, filter: &CapacityFilter, limit: usize) -> Vec<CapacityRecord> {
        self.store.list(
            |r| {
                matches_opt(&filter.service, &r.service)
                    && filter.resource_type.map_or(true, |t| t == r.resource_type)
            },
            limit,
        )
    }

    fn get(&self, id: Uuid) -> EngineResult<CapacityRecord> {
        self.store.get(id).ok_or(EngineError::NotFound(id))
    }

    /// Resources with a forecast, soonest exhaustion first.
    fn rankings(&self) -> Vec<Ranking> {
        let entries = self
            .latest()
            .into_iter()
            .filter_map(|r| r.months_to_exhaustion.map(|m| (r.resource_id, m, 1)))
            .collect();
        rank(entries, false)
    }

    fn report(&self) -> CapacityReport {
        let latest = self.latest();
        let avg = if latest.is_empty() {
            0.0
        } else {
            latest.iter().map(|r| r.utilization_pct).sum::<f64>() / latest.len() as f64
        };

        let low_headroom: Vec<String> = latest
            .iter()
            .filter(|r| r.utilization_pct >= self.headroom_threshold_pct)
            .map(|r| r.resource_id.clone())
            .collect();

        let mut forecasts: Vec<ExhaustionForecast> = latest
            .iter()
            .filter_map(|r| {
                r.months_to_exhaustion
                    .filter(|m| *m <= self.forecast_horizon_months)
                    .map(|m| ExhaustionForecast {
                        resource_id: r.resource_id.clone(),
                        service: r.service.clone(),
                        resource_type: r.resource_type,
                        months_to_exhaustion: m,
                    })
            })
            .collect();
        forecasts.sort_by(|a, b| {
            a.months_to_exhaustion
                .partial_cmp(&b.months_to_exhaustion)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut recommendations = Vec::new();
        if !low_headroom.is_empty() {
            recommendations.push(format!(
                "Scale out or rebalance {} resource(s) above {:.0}% utilization",
                low_headroom.len(),
                self.headroom_threshold_pct
            ));
        }
        if let Some(first) = forecasts.first() {
            recommendations.push(format!(
                "{} ({}) saturates in {:.1} month(s); start procurement now",
                first.resource_id, first.resource_type, first.months_to_exhaustion
            ));
        }

        CapacityReport {
            total_resources: latest.len(),
            avg_utilization_pct: round2(avg),
            low_headroom,
            forecasts,
            recommendations,
        }
    }

    fn stats(&self) -> EngineStats {
        let records = self.store.snapshot();
        EngineStats {
            engine: self.name().to_string(),
            total_records: records.len(),
            max_records: self.store.max_records(),
            distribution: distribution(&records, |r| r.resource_type.to_string()),
        }
    }

    fn clear(&self) -> usize {
        self.store.clear()
    }
}
