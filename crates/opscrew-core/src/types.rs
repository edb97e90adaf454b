//! Data model: servers, commands, tickets, plans, verdicts, and execution
//! records. Everything here is a value type; ownership of long-lived
//! collections (registry, ticket log, execution log) lives with the
//! components that build them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Operating-system family of a managed host. Selects the command table
/// (service unit names differ between families, e.g. `mysqld` on CentOS).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[default]
    Linux,
    Centos,
    Ubuntu,
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Linux => f.write_str("linux"),
            OsFamily::Centos => f.write_str("centos"),
            OsFamily::Ubuntu => f.write_str("ubuntu"),
        }
    }
}

/// Credential reference for the remote-shell channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    KeyFile(PathBuf),
    Password(String),
}

impl Default for Credential {
    fn default() -> Self {
        Credential::Password(String::new())
    }
}

/// A registered host. Immutable after load; looked up by id in the
/// process-wide `ServerRegistry`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerDescriptor {
    #[serde(default)]
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub os: OsFamily,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub credential: Credential,
}

impl ServerDescriptor {
    /// Whether `service` is among this host's managed services
    /// (case-insensitive, matching the config vocabulary).
    pub fn manages(&self, service: &str) -> bool {
        self.services.iter().any(|s| s.eq_ignore_ascii_case(service))
    }
}

/// A single command to run: the string may carry `{service}` / `{host}`
/// placeholders filled in at dispatch time. Value type, no identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default = "CommandSpec::default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub expect_exit: i32,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_secs: Self::default_timeout(),
            expect_exit: 0,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn default_timeout() -> u64 {
        30
    }
}

/// Outcome of one executed command. Immutable once produced; on failure
/// `output` carries the merged stdout/stderr text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            exit_code: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code,
            timestamp: Utc::now(),
        }
    }
}

/// Issue categories — a fixed closed set. Anything the oracle emits
/// outside this set degrades to `Uncategorized`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    GeneralQuery,
    KnowledgeQuery,
    ApiQuery,
    NeedsResolution,
    #[default]
    Uncategorized,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general_query" => Some(Category::GeneralQuery),
            "knowledge_query" => Some(Category::KnowledgeQuery),
            "api_query" => Some(Category::ApiQuery),
            "needs_resolution" => Some(Category::NeedsResolution),
            "uncategorized" => Some(Category::Uncategorized),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::GeneralQuery => "general_query",
            Category::KnowledgeQuery => "knowledge_query",
            Category::ApiQuery => "api_query",
            Category::NeedsResolution => "needs_resolution",
            Category::Uncategorized => "uncategorized",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal (and one non-terminal) ticket states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Pending,
    Success,
    Error,
    AwaitingApproval,
    Cancelled,
}

/// One remediation step as proposed by the oracle. Empty strings mean the
/// oracle omitted the field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub validation: String,
    #[serde(default)]
    pub rollback: String,
}

/// A remediation plan. Oracle output — untrusted until a
/// `ValidationVerdict` approves it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub service: String,
    pub server: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

/// Deterministic verdict over a plan. `approved` is the only thing the
/// execution path looks at; the rest is for the human reviewer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub approved: bool,
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub risks_identified: Vec<String>,
    #[serde(default)]
    pub suggested_modifications: Vec<String>,
}

impl ValidationVerdict {
    /// Hard rejection: structural precondition failed.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            confidence: 0.0,
            reason: reason.into(),
            risks_identified: Vec::new(),
            suggested_modifications: Vec::new(),
        }
    }
}

/// Per-step audit entry inside an `ExecutionRecord`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: String,
    pub result: CommandResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<CommandResult>,
}

/// Audit trail of one remediation run. Append-only: once pushed to the
/// execution log it is never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub server: String,
    pub service: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    pub successful: bool,
}

/// One pass of an issue through the pipeline. Mutated in place by each
/// stage, appended to the ticket log exactly once, updated by id on
/// approval.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueTicket {
    pub id: Uuid,
    pub issue: String,
    pub created_at: DateTime<Utc>,
    pub category: Category,
    #[serde(default)]
    pub classification_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ResolutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ValidationVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    pub status: TicketStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IssueTicket {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue: issue.into(),
            created_at: Utc::now(),
            category: Category::Uncategorized,
            classification_reason: String::new(),
            service: None,
            plan: None,
            verdict: None,
            execution: None,
            response: None,
            status: TicketStatus::Pending,
            error: None,
        }
    }

    /// Resolve the ticket to `Error` with a displayable message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TicketStatus::Error;
        self.error = Some(error.into());
    }
}
