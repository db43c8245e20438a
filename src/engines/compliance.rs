//! Compliance tracking engine.

use super::{
    distribution, matches_opt, rank, require_non_empty, round2, Engine, EngineError,
    EngineResult, EngineStats, Ranking, RecordStore, StoredRecord,
};
use crate::config::EnginesConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Soc2,
    PciDss,
    Hipaa,
    Iso27001,
    Gdpr,
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Framework::Soc2 => "soc2",
            Framework::PciDss => "pci_dss",
            Framework::Hipaa => "hipaa",
            Framework::Iso27001 => "iso27001",
            Framework::Gdpr => "gdpr",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    Compliant,
    Partial,
    NonCompliant,
    NotAssessed,
}

impl ControlStatus {
    /// Credit toward the compliance rate; `None` when not assessed.
    fn credit(&self) -> Option<f64> {
        match self {
            ControlStatus::Compliant => Some(1.0),
            ControlStatus::Partial => Some(0.5),
            ControlStatus::NonCompliant => Some(0.0),
            ControlStatus::NotAssessed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub id: Uuid,
    pub control_id: String,
    pub framework: Framework,
    pub status: ControlStatus,
    pub resource: String,
    pub evidence_count: u32,
    pub created_at: DateTime<Utc>,
}

impl StoredRecord for ComplianceRecord {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComplianceInput {
    pub control_id: String,
    pub framework: Framework,
    pub status: ControlStatus,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub evidence_count: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplianceFilter {
    pub framework: Option<Framework>,
    pub status: Option<ControlStatus>,
    pub resource: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceGap {
    pub control_id: String,
    pub framework: Framework,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub total_controls: usize,
    pub assessed_controls: usize,
    /// Overall compliance rate in percent.
    pub compliance_rate_pct: f64,
    pub rate_by_framework: BTreeMap<String, f64>,
    pub frameworks_below_target: Vec<String>,
    pub gaps: Vec<ComplianceGap>,
    /// Compliant controls recorded without any evidence.
    pub missing_evidence: usize,
    pub recommendations: Vec<String>,
}

pub struct ComplianceEngine {
    store: RecordStore<ComplianceRecord>,
    target_rate_pct: f64,
}

/// Rate in percent over assessed records, `None` when nothing was assessed.
fn compliance_rate<'a>(records: impl Iterator<Item = &'a ComplianceRecord>) -> Option<(f64, usize)> {
    let (credit, assessed) = records
        .filter_map(|r| r.status.credit())
        .fold((0.0, 0usize), |(sum, n), c| (sum + c, n + 1));

    if assessed == 0 {
        None
    } else {
        Some((credit / assessed as f64 * 100.0, assessed))
    }
}

impl ComplianceEngine {
    pub fn new(config: &EnginesConfig) -> Self {
        Self {
            store: RecordStore::new(config.max_records),
            target_rate_pct: config.compliance_target_pct,
        }
    }

    fn rates_by_framework(&self, records: &[ComplianceRecord]) -> HashMap<Framework, (f64, usize)> {
        let mut frameworks: Vec<Framework> = records.iter().map(|r| r.framework).collect();
        frameworks.sort();
        frameworks.dedup();

        frameworks
            .into_iter()
            .filter_map(|fw| {
                compliance_rate(records.iter().filter(|r| r.framework == fw)).map(|rate| (fw, rate))
            })
            .collect()
    }
}

impl Engine for ComplianceEngine {
    type Record = ComplianceRecord;
    type Input = ComplianceInput;
    type Filter = ComplianceFilter;
    type Report = ComplianceReport;

    fn name(&self) -> &'static str {
        "compliance"
    }

    fn record(&self, input: ComplianceInput) -> EngineResult<ComplianceRecord> {
        require_non_empty("control_id", &input.control_id)?;

        let record = ComplianceRecord {
            id: Uuid::new_v4(),
            control_id: input.control_id,
            framework: input.framework,
            status: input.status,
            resource: input.resource,
            evidence_count: input.evidence_count,
            created_at: Utc::now(),
        };
        self.store.insert(record.clone());
        Ok(record)
    }

    fn list(&self, filter: &ComplianceFilter, limit: usize) -> Vec<ComplianceRecord> {
        self.store.list(
            |r| {
                filter.framework.map_or(true, |f| f == r.framework)
                    && filter.status.map_or(true, |s| s == r.status)
                    && matches_opt(&filter.resource, &r.resource)
            },
            limit,
        )
    }

    fn get(&self, id: Uuid) -> EngineResult<ComplianceRecord> {
        self.store.get(id).ok_or(EngineError::NotFound(id))
    }

    /// Frameworks ordered worst first.
    fn rankings(&self) -> Vec<Ranking> {
        let records = self.store.snapshot();
        let entries = self
            .rates_by_framework(&records)
            .into_iter()
            .map(|(fw, (rate, assessed))| (fw.to_string(), rate, assessed))
            .collect();
        rank(entries, false)
    }

    fn report(&self) -> ComplianceReport {
        let records = self.store.snapshot();
        let overall = compliance_rate(records.iter());
        let by_framework = self.rates_by_framework(&records);

        let mut frameworks_below_target: Vec<String> = by_framework
            .iter()
            .filter(|(_, (rate, _))| *rate < self.target_rate_pct)
            .map(|(fw, _)| fw.to_string())
            .collect();
        frameworks_below_target.sort();

        let gaps: Vec<ComplianceGap> = records
            .iter()
            .filter(|r| r.status == ControlStatus::NonCompliant)
            .map(|r| ComplianceGap {
                control_id: r.control_id.clone(),
                framework: r.framework,
                resource: r.resource.clone(),
            })
            .collect();

        let missing_evidence = records
            .iter()
            .filter(|r| r.status == ControlStatus::Compliant && r.evidence_count == 0)
            .count();
        let not_assessed = records
            .iter()
            .filter(|r| r.status == ControlStatus::NotAssessed)
            .count();

        let mut recommendations = Vec::new();
        if !frameworks_below_target.is_empty() {
            recommendations.push(format!(
                "Prioritize remediation for {} (below {:.0}% target)",
                frameworks_below_target.join(", "),
                self.target_rate_pct
            ));
        }
        if !gaps.is_empty() {
            recommendations.push(format!(
                "Open remediation tickets for {} non-compliant control(s)",
                gaps.len()
            ));
        }
        if missing_evidence > 0 {
            recommendations.push(format!(
                "Attach audit evidence to {} compliant control(s)",
                missing_evidence
            ));
        }
        if not_assessed > 0 {
            recommendations.push(format!("Schedule assessment for {} control(s)", not_assessed));
        }

        ComplianceReport {
            total_controls: records.len(),
            assessed_controls: overall.map_or(0, |(_, n)| n),
            compliance_rate_pct: round2(overall.map_or(0.0, |(rate, _)| rate)),
            rate_by_framework: by_framework
                .into_iter()
                .map(|(fw, (rate, _))| (fw.to_string(), round2(rate)))
                .collect(),
            frameworks_below_target,
            gaps,
            missing_evidence,
            recommendations,
        }
    }

    fn stats(&self) -> EngineStats {
        let records = self.store.snapshot();
        EngineStats {
            engine: self.name().to_string(),
            total_records: records.len(),
            max_records: self.store.max_records(),
            distribution: distribution(&records, |r| r.framework.to_string()),
        }
    }

    fn clear(&self) -> usize {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(id: &str, framework: Framework, status: ControlStatus) -> ComplianceInput {
        ComplianceInput {
            control_id: id.to_string(),
            framework,
            status,
            resource: "prod-account".to_string(),
            evidence_count: 1,
        }
    }

    #[test]
    fn test_partial_counts_half_and_unassessed_excluded() {
        let engine = ComplianceEngine::new(&EnginesConfig::default());
        engine
            .record(control("CC6.1", Framework::Soc2, ControlStatus::Compliant))
            .unwrap();
        engine
            .record(control("CC6.2", Framework::Soc2, ControlStatus::Partial))
            .unwrap();
        engine
            .record(control("CC6.3", Framework::Soc2, ControlStatus::NotAssessed))
            .unwrap();

        let report = engine.report();
        assert_eq!(report.total_controls, 3);
        assert_eq!(report.assessed_controls, 2);
        assert_eq!(report.compliance_rate_pct, 75.0);
        assert_eq!(report.rate_by_framework.get("soc2"), Some(&75.0));
        assert_eq!(report.frameworks_below_target, vec!["soc2".to_string()]);
    }

    #[test]
    fn test_rankings_worst_first() {
        let engine = ComplianceEngine::new(&EnginesConfig::default());
        engine
            .record(control("1", Framework::Gdpr, ControlStatus::Compliant))
            .unwrap();
        engine
            .record(control("2", Framework::PciDss, ControlStatus::NonCompliant))
            .unwrap();

        let rankings = engine.rankings();
        assert_eq!(rankings[0].key, "pci_dss");
        assert_eq!(rankings[0].value, 0.0);
        assert_eq!(rankings[1].key, "gdpr");
    }

    #[test]
    fn test_report_gaps_and_evidence() {
        let engine = ComplianceEngine::new(&EnginesConfig::default());
        engine
            .record(control("10.2", Framework::PciDss, ControlStatus::NonCompliant))
            .unwrap();
        let mut no_evidence = control("10.3", Framework::PciDss, ControlStatus::Compliant);
        no_evidence.evidence_count = 0;
        engine.record(no_evidence).unwrap();

        let report = engine.report();
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].control_id, "10.2");
        assert_eq!(report.missing_evidence, 1);
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn test_empty_report() {
        let engine = ComplianceEngine::new(&EnginesConfig::default());
        let report = engine.report();
        assert_eq!(report.compliance_rate_pct, 0.0);
        assert!(report.recommendations.is_empty());
        assert!(engine.rankings().is_empty());
    }

    #[test]
    fn test_list_filter_by_status() {
        let engine = ComplianceEngine::new(&EnginesConfig::default());
        engine
            .record(control("A", Framework::Hipaa, ControlStatus::Compliant))
            .unwrap();
        engine
            .record(control("B", Framework::Hipaa, ControlStatus::NonCompliant))
            .unwrap();

        let filter = ComplianceFilter {
            status: Some(ControlStatus::NonCompliant),
            ..ComplianceFilter::default()
        };
        let listed = engine.list(&filter, 10);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].control_id, "B");
    }
}
