//! Deterministic classification layer over the oracle outcome.
//!
//! The oracle proposes; this layer disposes. A response that failed to
//! parse degrades to `Uncategorized`, an unknown category string degrades
//! to `Uncategorized`, and a low-confidence answer can be overridden by a
//! fixed keyword table — always with the override appended to the reason,
//! never silently.

use opscrew_core::config::ServerRegistry;
use opscrew_core::types::Category;
use opscrew_oracle::types::{OracleClassification, OracleOutcome};
use tracing::debug;

/// Below this oracle confidence the keyword table gets a vote.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

const GENERAL_KEYWORDS: &[&str] = &[
    "status", "list", "uptime", "show", "usage", "disk", "memory", "cpu", "load",
];
const KNOWLEDGE_KEYWORDS: &[&str] = &["how do i", "how to", "what is", "explain", "why does"];
const RESOLUTION_KEYWORDS: &[&str] = &[
    "not responding",
    "is down",
    "crash",
    "unreachable",
    "broken",
    "failing",
];

#[derive(Clone, Debug)]
pub struct Classification {
    pub category: Category,
    pub reason: String,
    pub service: Option<String>,
}

pub fn classify(
    issue: &str,
    outcome: &OracleOutcome<OracleClassification>,
    registry: &ServerRegistry,
) -> Classification {
    let oracle = match outcome {
        OracleOutcome::Unparseable { detail, .. } => {
            return Classification {
                category: Category::Uncategorized,
                reason: format!("oracle response could not be parsed: {detail}"),
                service: extract_service(issue, None, registry),
            };
        }
        OracleOutcome::Parsed(c) => c,
    };

    let (mut category, mut reason) = match Category::parse(&oracle.category) {
        Some(category) => (category, oracle.reason.clone()),
        None => (
            Category::Uncategorized,
            format!(
                "{} [oracle proposed unknown category \"{}\"]",
                oracle.reason, oracle.category
            ),
        ),
    };

    if oracle.confidence < CONFIDENCE_THRESHOLD {
        if let Some((keyword, override_category)) = keyword_override(issue) {
            if override_category != category {
                debug!(
                    from = %category, to = %override_category, keyword,
                    confidence = oracle.confidence, "keyword override"
                );
                reason.push_str(&format!(
                    " [low oracle confidence {:.2}; issue text contains \"{}\", reclassified as {}]",
                    oracle.confidence, keyword, override_category
                ));
                category = override_category;
            }
        }
    }

    Classification {
        category,
        reason,
        service: extract_service(issue, oracle.service.as_deref(), registry),
    }
}

/// Deterministic keyword scan. General-query keywords win over the rest:
/// an issue that asks to "show status" is a lookup even when it also
/// mentions something being down.
fn keyword_override(issue: &str) -> Option<(&'static str, Category)> {
    let haystack = issue.to_ascii_lowercase();
    let tables: &[(&[&str], Category)] = &[
        (GENERAL_KEYWORDS, Category::GeneralQuery),
        (KNOWLEDGE_KEYWORDS, Category::KnowledgeQuery),
        (RESOLUTION_KEYWORDS, Category::NeedsResolution),
    ];
    for (keywords, category) in tables {
        if let Some(keyword) = keywords.iter().find(|k| haystack.contains(**k)) {
            return Some((*keyword, *category));
        }
    }
    None
}

/// The oracle's service if it named one, else a literal scan of the
/// registry vocabulary; a mentioned server id resolves to its first
/// managed service ("db01 is not responding" → mysql).
fn extract_service(
    issue: &str,
    from_oracle: Option<&str>,
    registry: &ServerRegistry,
) -> Option<String> {
    if let Some(service) = from_oracle {
        let service = service.trim();
        if !service.is_empty() {
            return Some(service.to_ascii_lowercase());
        }
    }
    let haystack = issue.to_ascii_lowercase();
    if let Some(service) = registry
        .known_services()
        .into_iter()
        .find(|service| haystack.contains(service.as_str()))
    {
        return Some(service);
    }
    registry
        .find_mentioned(issue)
        .and_then(|server| server.services.first())
        .map(|service| service.to_ascii_lowercase())
}
