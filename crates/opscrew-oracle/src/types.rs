//! Wire types for oracle responses and the strict parser that turns raw
//! completion text into them.

use opscrew_core::types::{PlanStep, ResolutionPlan};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Outcome of parsing an oracle response: either the typed payload or an
/// explicit unparseable marker carrying the raw text for the reason
/// string. Never an error.
#[derive(Clone, Debug)]
pub enum OracleOutcome<T> {
    Parsed(T),
    Unparseable { raw: String, detail: String },
}

impl<T> OracleOutcome<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            OracleOutcome::Parsed(value) => Some(value),
            OracleOutcome::Unparseable { .. } => None,
        }
    }
}

/// Parse a completion into `T`. Models routinely wrap the JSON object in
/// prose, so a failed whole-string parse retries on the outermost
/// `{...}` span before giving up.
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> OracleOutcome<T> {
    let trimmed = raw.trim();
    match serde_json::from_str::<T>(trimmed) {
        Ok(value) => OracleOutcome::Parsed(value),
        Err(first_err) => {
            if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str::<T>(&trimmed[start..=end]) {
                        return OracleOutcome::Parsed(value);
                    }
                }
            }
            OracleOutcome::Unparseable {
                raw: raw.to_string(),
                detail: first_err.to_string(),
            }
        }
    }
}

/// Classification response: `{category, reason, confidence, service?}`.
/// A missing confidence means the oracle did not hedge, so it is trusted.
#[derive(Clone, Debug, Deserialize)]
pub struct OracleClassification {
    pub category: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub service: Option<String>,
}

fn full_confidence() -> f64 {
    1.0
}

/// One plan step on the wire.
#[derive(Clone, Debug, Deserialize)]
pub struct OraclePlanStep {
    pub step: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub validation: Option<String>,
    #[serde(default)]
    pub rollback: Option<String>,
}

/// Plan response: `{service, server, issue_summary, severity,
/// resolution_steps, risks, prerequisites}`.
#[derive(Clone, Debug, Deserialize)]
pub struct OraclePlan {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub issue_summary: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub resolution_steps: Vec<OraclePlanStep>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

impl OraclePlan {
    /// Lower the wire form into the core plan type (absent optional
    /// fields become empty strings).
    pub fn into_plan(self) -> ResolutionPlan {
        ResolutionPlan {
            service: self.service,
            server: self.server,
            summary: self.issue_summary,
            severity: self.severity,
            steps: self
                .resolution_steps
                .into_iter()
                .map(|s| PlanStep {
                    action: s.step,
                    purpose: s.purpose.unwrap_or_default(),
                    validation: s.validation.unwrap_or_default(),
                    rollback: s.rollback.unwrap_or_default(),
                })
                .collect(),
            risks: self.risks,
            prerequisites: self.prerequisites,
        }
    }
}

/// Server-selection response for the information path:
/// `{selected_servers, reasoning}`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerSelection {
    #[serde(default)]
    pub selected_servers: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classification_wrapped_in_prose() {
        let raw = "Sure, here is the classification:\n{\"category\": \"general_query\", \"reason\": \"asks for status\", \"confidence\": 0.9}\nLet me know!";
        let outcome: OracleOutcome<OracleClassification> = parse_response(raw);
        let c = outcome.parsed().unwrap();
        assert_eq!(c.category, "general_query");
        assert!((c.confidence - 0.9).abs() < 1e-9);
        assert!(c.service.is_none());
    }

    #[test]
    fn missing_confidence_is_trusted() {
        let raw = r#"{"category": "needs_resolution", "reason": "it crashed"}"#;
        let outcome: OracleOutcome<OracleClassification> = parse_response(raw);
        let c = outcome.parsed().unwrap();
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn garbage_is_unparseable_not_an_error() {
        let outcome: OracleOutcome<OracleClassification> =
            parse_response("I cannot classify this issue.");
        match outcome {
            OracleOutcome::Unparseable { raw, .. } => {
                assert!(raw.contains("cannot classify"));
            }
            OracleOutcome::Parsed(_) => panic!("garbage should not parse"),
        }
    }

    #[test]
    fn plan_lowers_into_core_type() {
        let raw = r#"{
            "service": "mysql",
            "server": "db01",
            "issue_summary": "mysqld wedged",
            "severity": "high",
            "resolution_steps": [
                {"step": "restart mysql", "purpose": "recover service",
                 "validation": "systemctl status mysql",
                 "rollback": "systemctl start mysql"}
            ],
            "risks": ["brief downtime"],
            "prerequisites": ["recent backup"]
        }"#;
        let outcome: OracleOutcome<OraclePlan> = parse_response(raw);
        let plan = outcome.parsed().unwrap().into_plan();
        assert_eq!(plan.server, "db01");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].validation, "systemctl status mysql");
        assert_eq!(plan.summary, "mysqld wedged");
    }

    #[test]
    fn plan_step_optional_fields_default_empty() {
        let raw = r#"{"service": "nginx", "server": "web01",
                      "resolution_steps": [{"step": "reload config"}]}"#;
        let outcome: OracleOutcome<OraclePlan> = parse_response(raw);
        let plan = outcome.parsed().unwrap().into_plan();
        assert!(plan.steps[0].purpose.is_empty());
        assert!(plan.steps[0].rollback.is_empty());
    }
}
