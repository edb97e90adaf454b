//! Deterministic plan validation — structural and heuristic checks only,
//! never a second oracle call. The verdict is what stands between an
//! oracle-authored plan and real infrastructure.

use opscrew_core::config::ServerRegistry;
use opscrew_core::types::{ResolutionPlan, ValidationVerdict};
use regex::Regex;

/// Minimum confidence for approval; identified risks veto regardless.
pub const APPROVAL_THRESHOLD: f64 = 0.7;

const SEVERITY_LEVELS: &[&str] = &["low", "medium", "high", "critical"];

const PENALTY_UNKNOWN_SEVERITY: f64 = 0.1;
const PENALTY_MISSING_RISKS: f64 = 0.1;
const PENALTY_MISSING_PREREQUISITES: f64 = 0.1;
const PENALTY_RISKY_STEP: f64 = 0.2;

/// Verbs that change or destroy state; a step using one must carry a
/// rollback command.
fn is_risky(action: &str) -> bool {
    Regex::new(r"(?i)\b(remove|delete|drop|truncate|restart|stop)\b")
        .map(|re| re.is_match(action))
        .unwrap_or(false)
}

pub fn validate(plan: &ResolutionPlan, registry: &ServerRegistry) -> ValidationVerdict {
    // Structural preconditions: hard rejections with zero confidence.
    if plan.service.trim().is_empty() || plan.server.trim().is_empty() {
        return ValidationVerdict::reject("plan is missing required service/server fields");
    }
    let Some(server) = registry.get(&plan.server) else {
        return ValidationVerdict::reject(format!(
            "server \"{}\" is not registered",
            plan.server
        ));
    };
    if !server.manages(&plan.service) {
        return ValidationVerdict::reject(format!(
            "service \"{}\" is not managed by server \"{}\"",
            plan.service, plan.server
        ));
    }
    if plan.steps.is_empty() {
        return ValidationVerdict::reject("plan has no resolution steps");
    }

    let mut risks = Vec::new();
    let mut suggestions = Vec::new();
    let mut penalty = 0.0;

    for (index, step) in plan.steps.iter().enumerate() {
        let n = index + 1;
        if step.purpose.trim().is_empty() {
            suggestions.push(format!("step {n}: add a purpose"));
        }
        if step.validation.trim().is_empty() {
            suggestions.push(format!("step {n}: add a validation command"));
        }
        if is_risky(&step.action) && step.rollback.trim().is_empty() {
            risks.push(format!(
                "risky operation without rollback: {}",
                step.action
            ));
            suggestions.push(format!("step {n}: add a rollback command"));
            penalty += PENALTY_RISKY_STEP;
        }
    }

    if !SEVERITY_LEVELS.contains(&plan.severity.to_ascii_lowercase().as_str()) {
        suggestions.push(format!(
            "set severity to one of {} (got \"{}\")",
            SEVERITY_LEVELS.join("|"),
            plan.severity
        ));
        penalty += PENALTY_UNKNOWN_SEVERITY;
    }
    if plan.risks.is_empty() {
        suggestions.push("document the expected risks".to_string());
        penalty += PENALTY_MISSING_RISKS;
    }
    if plan.prerequisites.is_empty() {
        suggestions.push("document the prerequisites".to_string());
        penalty += PENALTY_MISSING_PREREQUISITES;
    }

    let confidence = (1.0 - penalty).clamp(0.0, 1.0);
    let approved = confidence >= APPROVAL_THRESHOLD && risks.is_empty();

    let reason = if approved {
        format!("structural checks passed (confidence {confidence:.2})")
    } else if !risks.is_empty() {
        format!(
            "{} unmitigated risky step(s); rejected regardless of confidence {confidence:.2}",
            risks.len()
        )
    } else {
        format!("confidence {confidence:.2} below approval threshold {APPROVAL_THRESHOLD}")
    };

    ValidationVerdict {
        approved,
        confidence,
        reason,
        risks_identified: risks,
        suggested_modifications: suggestions,
    }
}
