//! Alert correlation engine.
//!
//! Tracks alerts with the correlation group they were assigned to and how
//! strongly they matched it, and reports noisy services and weak groupings.

use super::{
    distribution, group_key, matches_opt, rank, require_non_empty, require_range, round2, Engine,
    EngineError, EngineResult, EngineStats, Ranking, RecordStore, StoredRecord,
};
use crate::config::EnginesConfig;
use crate::models::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

/// A stored alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub alert_name: String,
    pub service: String,
    pub severity: Severity,
    pub correlation_group: String,
    /// How strongly the alert matched its group (0..=1).
    pub correlation_score: f64,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord for AlertRecord {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertInput {
    pub alert_name: String,
    pub service: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub correlation_group: Option<String>,
    #[serde(default)]
    pub correlation_score: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    pub service: Option<String>,
    pub severity: Option<Severity>,
    pub correlation_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCorrelationReport {
    pub total_alerts: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub correlation_groups: usize,
    pub avg_correlation_score: f64,
    /// Services whose alert volume meets the noise threshold.
    pub noisy_services: Vec<String>,
    /// Alerts below the minimum correlation score.
    pub weakly_correlated: usize,
    pub recommendations: Vec<String>,
}

pub struct AlertCorrelationEngine {
    store: RecordStore<AlertRecord>,
    min_correlation_score: f64,
    noise_threshold: usize,
}

impl AlertCorrelationEngine {
    pub fn new(config: &EnginesConfig) -> Self {
        Self {
            store: RecordStore::new(config.max_records),
            min_correlation_score: config.min_correlation_score,
            noise_threshold: config.noise_threshold.max(1),
        }
    }

    /// Most recent alerts for a service, newest first.
    pub fn related_alerts(&self, service: &str, limit: usize) -> Vec<AlertRecord> {
        self.store
            .list(|a| a.service.eq_ignore_ascii_case(service), limit)
    }

    fn noisy_services(&self, alerts: &[AlertRecord]) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for alert in alerts {
            *counts.entry(group_key(&alert.service)).or_default() += 1;
        }

        let mut noisy: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.noise_threshold)
            .map(|(service, _)| service)
            .collect();
        noisy.sort();
        noisy
    }
}

impl Engine for AlertCorrelationEngine {
    type Record = AlertRecord;
    type Input = AlertInput;
    type Filter = AlertFilter;
    type Report = AlertCorrelationReport;

    fn name(&self) -> &'static str {
        "alert-correlation"
    }

    fn record(&self, input: AlertInput) -> EngineResult<AlertRecord> {
        require_non_empty("alert_name", &input.alert_name)?;
        require_non_empty("service", &input.service)?;
        require_range("correlation_score", input.correlation_score, 0.0, 1.0)?;

        // Uncorrelated alerts form a group of their own.
        let correlation_group = input
            .correlation_group
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| format!("{}:{}", input.service, input.alert_name));

        let record = AlertRecord {
            id: Uuid::new_v4(),
            alert_name: input.alert_name,
            service: input.service,
            severity: input.severity,
            correlation_group,
            correlation_score: input.correlation_score,
            created_at: Utc::now(),
        };

        debug!(
            "Recorded alert {} for {} in group {}",
            record.alert_name, record.service, record.correlation_group
        );
        self.store.insert(record.clone());
        Ok(record)
    }

    fn list(&self, filter: &AlertFilter, limit: usize) -> Vec<AlertRecord> {
        self.store.list(
            |a| {
                matches_opt(&filter.service, &a.service)
                    && matches_opt(&filter.correlation_group, &a.correlation_group)
                    && filter.severity.map_or(true, |s| s == a.severity)
            },
            limit,
        )
    }

    fn get(&self, id: Uuid) -> EngineResult<AlertRecord> {
        self.store.get(id).ok_or(EngineError::NotFound(id))
    }

    fn rankings(&self) -> Vec<Ranking> {
        let mut groups: HashMap<String, (f64, usize)> = HashMap::new();
        for alert in self.store.snapshot() {
            let entry = groups.entry(group_key(&alert.correlation_group)).or_default();
            entry.0 += alert.correlation_score;
            entry.1 += 1;
        }

        let entries = groups
            .into_iter()
            .map(|(group, (sum, count))| (group, sum / count as f64, count))
            .collect();
        rank(entries, true)
    }

    fn report(&self) -> AlertCorrelationReport {
        let alerts = self.store.snapshot();
        let total = alerts.len();

        let avg = if total == 0 {
            0.0
        } else {
            alerts.iter().map(|a| a.correlation_score).sum::<f64>() / total as f64
        };
        let weakly_correlated = alerts
            .iter()
            .filter(|a| a.correlation_score < self.min_correlation_score)
            .count();
        let groups = distribution(&alerts, |a| a.correlation_group.clone()).len();
        let noisy_services = self.noisy_services(&alerts);

        let mut recommendations = Vec::new();
        if !noisy_services.is_empty() {
            recommendations.push(format!(
                "Tune or deduplicate alert rules for noisy services: {}",
                noisy_services.join(", ")
            ));
        }
        if weakly_correlated > 0 {
            recommendations.push(format!(
                "Review correlation rules: {} alert(s) scored below {:.2}",
                weakly_correlated, self.min_correlation_score
            ));
        }
        if total > 0 && groups * 2 > total {
            recommendations.push(
                "Most alerts land in their own group; add topology-aware correlation keys"
                    .to_string(),
            );
        }

        AlertCorrelationReport {
            total_alerts: total,
            by_severity: distribution(&alerts, |a| a.severity.to_string().to_lowercase()),
            correlation_groups: groups,
            avg_correlation_score: round2(avg),
            noisy_services,
            weakly_correlated,
            recommendations,
        }
    }

    fn stats(&self) -> EngineStats {
        let alerts = self.store.snapshot();
        EngineStats {
            engine: self.name().to_string(),
            total_records: alerts.len(),
            max_records: self.store.max_records(),
            distribution: distribution(&alerts, |a| a.service.clone()),
        }
    }

    fn clear(&self) -> usize {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(noise_threshold: usize) -> AlertCorrelationEngine {
        AlertCorrelationEngine::new(&EnginesConfig {
            noise_threshold,
            ..EnginesConfig::default()
        })
    }

    fn alert(service: &str, group: Option<&str>, score: f64) -> AlertInput {
        AlertInput {
            alert_name: "HighLatency".to_string(),
            service: service.to_string(),
            severity: Severity::High,
            correlation_group: group.map(String::from),
            correlation_score: score,
        }
    }

    #[test]
    fn test_record_defaults_group() {
        let engine = engine(10);
        let record = engine.record(alert("checkout", None, 0.9)).unwrap();
        assert_eq!(record.correlation_group, "checkout:HighLatency");
        assert_eq!(engine.get(record.id).unwrap(), record);
    }

    #[test]
    fn test_record_rejects_invalid_score() {
        let engine = engine(10);
        let err = engine.record(alert("checkout", None, 1.5)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "correlation_score",
                ..
            }
        ));
        assert!(engine.record(alert(" ", None, 0.5)).is_err());
    }

    #[test]
    fn test_list_filters() {
        let engine = engine(10);
        engine.record(alert("checkout", Some("db"), 0.9)).unwrap();
        engine.record(alert("billing", Some("db"), 0.8)).unwrap();

        let filter = AlertFilter {
            service: Some("CHECKOUT".to_string()),
            ..AlertFilter::default()
        };
        assert_eq!(engine.list(&filter, 10).len(), 1);

        let filter = AlertFilter {
            correlation_group: Some("db".to_string()),
            ..AlertFilter::default()
        };
        assert_eq!(engine.list(&filter, 10).len(), 2);
        assert_eq!(engine.list(&filter, 1).len(), 1);
    }

    #[test]
    fn test_rankings_by_mean_score() {
        let engine = engine(10);
        engine.record(alert("a", Some("weak"), 0.2)).unwrap();
        engine.record(alert("a", Some("weak"), 0.4)).unwrap();
        engine.record(alert("b", Some("strong"), 0.95)).unwrap();

        let rankings = engine.rankings();
        assert_eq!(rankings[0].key, "strong");
        assert_eq!(rankings[1].key, "weak");
        assert_eq!(rankings[1].value, 0.3);
        assert_eq!(rankings[1].count, 2);
    }

    #[test]
    fn test_report_flags_noise_and_weak_correlation() {
        let engine = engine(2);
        engine.record(alert("checkout", Some("g1"), 0.9)).unwrap();
        engine.record(alert("checkout", Some("g1"), 0.5)).unwrap();
        engine.record(alert("search", Some("g2"), 0.95)).unwrap();

        let report = engine.report();
        assert_eq!(report.total_alerts, 3);
        assert_eq!(report.noisy_services, vec!["checkout".to_string()]);
        assert_eq!(report.weakly_correlated, 1);
        assert_eq!(report.correlation_groups, 2);
        assert_eq!(report.by_severity.get("high"), Some(&3));
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn test_related_alerts_and_clear() {
        let engine = engine(10);
        engine.record(alert("checkout", None, 0.9)).unwrap();
        engine.record(alert("search", None, 0.9)).unwrap();

        assert_eq!(engine.related_alerts("checkout", 10).len(), 1);
        assert_eq!(engine.clear(), 2);
        assert_eq!(engine.report().total_alerts, 0);
        assert!(engine.report().recommendations.is_empty());
    }
}
