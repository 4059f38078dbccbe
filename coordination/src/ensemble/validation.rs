//! Advisory checks for ensemble definitions
//!
//! Validation never gates execution; it reports problems a definition
//! author should look at. Basic checks cover the fields execution relies
//! on, comprehensive checks add per-member rules.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::domain::{EnsembleDefinition, ExecutionMode, MAX_PRIORITY, MIN_PRIORITY};

use super::aggregation::AggregationStrategy;

/// How much checking to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    #[default]
    Basic,
    Comprehensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field: String,
    pub message: String,
    /// Stable machine-readable code, e.g. `ENSEMBLE_FEW_MEMBERS`
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// All findings for one ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub element_id: String,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub infos: Vec<ValidationIssue>,
    pub validation_time_ms: u64,
}

impl ValidationReport {
    fn new(element_id: &str) -> Self {
        Self {
            is_valid: true,
            element_id: element_id.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            infos: Vec::new(),
            validation_time_ms: 0,
        }
    }

    fn push(
        &mut self,
        severity: Severity,
        field: impl Into<String>,
        message: impl Into<String>,
        code: &str,
        suggestion: Option<String>,
    ) {
        let issue = ValidationIssue {
            severity,
            field: field.into(),
            message: message.into(),
            code: code.to_string(),
            suggestion,
        };
        match severity {
            Severity::Error => {
                self.is_valid = false;
                self.errors.push(issue);
            }
            Severity::Warning => self.warnings.push(issue),
            Severity::Info => self.infos.push(issue),
        }
    }

    /// Every code reported, in severity order
    pub fn codes(&self) -> Vec<&str> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .chain(&self.infos)
            .map(|i| i.code.as_str())
            .collect()
    }
}

/// Checks ensemble definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleValidator;

impl EnsembleValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, ensemble: &EnsembleDefinition, level: ValidationLevel) -> ValidationReport {
        let started = Instant::now();
        let mut report = ValidationReport::new(ensemble.id());

        self.validate_basic(ensemble, &mut report);
        if level == ValidationLevel::Comprehensive {
            self.validate_comprehensive(ensemble, &mut report);
        }

        report.validation_time_ms = started.elapsed().as_millis() as u64;
        report
    }

    fn validate_basic(&self, ensemble: &EnsembleDefinition, report: &mut ValidationReport) {
        if ensemble.members.len() < 2 {
            report.push(
                Severity::Warning,
                "members",
                "Ensemble should have at least 2 members for effective orchestration",
                "ENSEMBLE_FEW_MEMBERS",
                None,
            );
        }

        if ensemble.mode().is_none() {
            let allowed: Vec<&str> = ExecutionMode::all().iter().map(|m| m.as_str()).collect();
            report.push(
                Severity::Error,
                "execution_mode",
                format!("execution_mode must be one of: {}", allowed.join(", ")),
                "EXECUTION_MODE_INVALID_VALUE",
                Some(format!("Choose from: {}", allowed.join(", "))),
            );
        }

        if ensemble.aggregation_strategy.is_empty() {
            report.push(
                Severity::Error,
                "aggregation_strategy",
                "Aggregation strategy is required",
                "ENSEMBLE_NO_AGGREGATION",
                None,
            );
        } else if AggregationStrategy::parse(&ensemble.aggregation_strategy).is_none() {
            let allowed: Vec<&str> = AggregationStrategy::all().iter().map(|s| s.as_str()).collect();
            report.push(
                Severity::Error,
                "aggregation_strategy",
                format!(
                    "Unsupported aggregation strategy: {}",
                    ensemble.aggregation_strategy
                ),
                "ENSEMBLE_UNKNOWN_AGGREGATION",
                Some(format!("Choose from: {}", allowed.join(", "))),
            );
        }
    }

    fn validate_comprehensive(&self, ensemble: &EnsembleDefinition, report: &mut ValidationReport) {
        let mut roles = HashSet::new();
        let hybrid = ensemble.mode() == Some(ExecutionMode::Hybrid);

        for (i, member) in ensemble.members.iter().enumerate() {
            if member.role.is_empty() {
                report.push(
                    Severity::Error,
                    format!("members[{i}].role"),
                    "Member role is required",
                    "ENSEMBLE_MEMBER_NO_ROLE",
                    None,
                );
            }

            if !roles.insert(member.role.as_str()) {
                report.push(
                    Severity::Warning,
                    format!("members[{i}].role"),
                    format!("Duplicate role detected: {}", member.role),
                    "ENSEMBLE_DUPLICATE_ROLE",
                    None,
                );
            }

            if !member.in_schedulable_range() {
                report.push(
                    Severity::Error,
                    format!("members[{i}].priority"),
                    format!("Priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}"),
                    "ENSEMBLE_INVALID_PRIORITY",
                    None,
                );
                if hybrid {
                    report.push(
                        Severity::Warning,
                        format!("members[{i}].priority"),
                        format!(
                            "Hybrid execution never schedules member {} (priority {})",
                            member.agent_id, member.priority
                        ),
                        "ENSEMBLE_UNSCHEDULED_MEMBER",
                        None,
                    );
                }
            }
        }

        if ensemble.mode() == Some(ExecutionMode::Sequential) && ensemble.members.len() > 1 {
            report.push(
                Severity::Info,
                "execution_mode",
                "Ensure agents in sequential ensemble don't have circular dependencies",
                "ENSEMBLE_CHECK_CYCLES",
                None,
            );
        }
    }
}
