//! End-to-end pipeline tests against the embedded lab topology, a
//! scripted oracle, and the simulated remote channel.

use opscrew_agent::{Orchestrator, RemediationExecutor};
use opscrew_core::commands::BundleRegistry;
use opscrew_core::config::{OpscrewConfig, ServerRegistry};
use opscrew_core::types::{Category, PlanStep, ResolutionPlan, TicketStatus};
use opscrew_exec::{CommandExecutor, SafetyGate};
use opscrew_oracle::{Oracle, ScriptedOracle};
use std::sync::Arc;

struct Rig {
    orchestrator: Orchestrator,
}

fn rig(responses: &[&str]) -> Rig {
    let oracle: Arc<dyn Oracle> = Arc::new(ScriptedOracle::sequence(responses.iter().copied()));
    let config = OpscrewConfig::lab();
    let registry = Arc::new(ServerRegistry::from_config(&config));
    let gate = Arc::new(SafetyGate::new(config.roles.clone(), config.commands.clone()));
    let executor = Arc::new(CommandExecutor::new(
        Arc::clone(&registry),
        gate,
        &config.simulation,
    ));
    let remediation = Arc::new(RemediationExecutor::new(
        Arc::clone(&executor),
        Arc::clone(&registry),
    ));
    Rig {
        orchestrator: Orchestrator::new(
            oracle,
            executor,
            remediation,
            registry,
            BundleRegistry::with_builtin(),
        ),
    }
}

fn remediation_only() -> (Arc<RemediationExecutor>, Arc<ServerRegistry>) {
    let config = OpscrewConfig::lab();
    let registry = Arc::new(ServerRegistry::from_config(&config));
    let gate = Arc::new(SafetyGate::new(config.roles.clone(), config.commands.clone()));
    let executor = Arc::new(CommandExecutor::new(
        Arc::clone(&registry),
        gate,
        &config.simulation,
    ));
    (
        Arc::new(RemediationExecutor::new(executor, Arc::clone(&registry))),
        registry,
    )
}

// ===========================================================================
// Scenario A: risky plan without rollback is rejected
// ===========================================================================

#[tokio::test]
async fn scenario_a_unmitigated_restart_plan_is_rejected() {
    let rig = rig(&[
        r#"{"category": "needs_resolution", "reason": "db01 appears down", "confidence": 0.92}"#,
        r#"{
            "service": "mysql",
            "server": "db01",
            "issue_summary": "mysqld hung",
            "severity": "high",
            "resolution_steps": [
                {"step": "restart the mysql service", "purpose": "recover the daemon",
                 "validation": "systemctl status mysql"}
            ],
            "risks": ["brief downtime"],
            "prerequisites": ["recent backup"]
        }"#,
    ]);

    let ticket = rig.orchestrator.handle_issue("operator", "db01 is not responding").await;

    assert_eq!(ticket.category, Category::NeedsResolution);
    // Service inferred from the registry: db01 manages mysql.
    assert_eq!(ticket.service.as_deref(), Some("mysql"));

    let verdict = ticket.verdict.expect("verdict attached");
    assert!(!verdict.approved);
    assert!(verdict
        .risks_identified
        .iter()
        .any(|r| r.contains("risky operation without rollback")));
    assert_eq!(ticket.status, TicketStatus::Error);
    assert!(ticket.execution.is_none(), "rejected plan must never execute");
}

// ===========================================================================
// Scenario B: keyword override + canned transcript
// ===========================================================================

#[tokio::test]
async fn scenario_b_keyword_override_and_simulated_uptime() {
    let rig = rig(&[
        // The oracle guesses wrong with low confidence; the keyword
        // table corrects it.
        r#"{"category": "needs_resolution", "reason": "mentions uptime problem", "confidence": 0.45}"#,
        r#"{"selected_servers": ["web01"], "reasoning": "the query names web01"}"#,
    ]);

    let ticket = rig.orchestrator.handle_issue("operator", "show uptime on web01").await;

    assert_eq!(ticket.category, Category::GeneralQuery);
    assert!(
        ticket.classification_reason.contains("reclassified as general_query"),
        "override must be recorded in the reason: {}",
        ticket.classification_reason
    );
    assert_eq!(ticket.status, TicketStatus::Success);

    let response = ticket.response.expect("diagnostics payload");
    let output = response["server_outputs"]["web01"]["output"]
        .as_str()
        .expect("web01 transcript");
    assert!(output.contains("$ uptime"), "transcript missing uptime: {output}");
    assert!(output.contains("load average"), "canned uptime transcript expected");
}

// ===========================================================================
// Scenario C: failing step triggers a recorded rollback
// ===========================================================================

#[tokio::test]
async fn scenario_c_failed_step_records_rollback() {
    let rig = rig(&[
        r#"{"category": "needs_resolution", "reason": "stale cache suspected", "confidence": 0.9, "service": "mysql"}"#,
        // The step's command is blacklisted, so it fails at the gate and
        // the rollback runs.
        r#"{
            "service": "mysql",
            "server": "db01",
            "issue_summary": "stale cache directory",
            "severity": "medium",
            "resolution_steps": [
                {"step": "clear the stale cache directory", "purpose": "free disk space",
                 "validation": "rm -rf /var/cache/mysql-stale",
                 "rollback": "systemctl status mysql"}
            ],
            "risks": ["cache rebuild on next start"],
            "prerequisites": ["recent backup"]
        }"#,
    ]);

    let ticket = rig
        .orchestrator
        .handle_issue("operator", "db01 mysql cache directory is corrupted")
        .await;
    assert_eq!(ticket.status, TicketStatus::AwaitingApproval);
    let verdict = ticket.verdict.clone().expect("verdict attached");
    assert!(verdict.approved, "{}", verdict.reason);

    let ticket = rig
        .orchestrator
        .approve(ticket.id, "operator", true)
        .await
        .expect("approval succeeds");

    assert_eq!(ticket.status, TicketStatus::Error);
    let record = ticket.execution.expect("execution record attached");
    assert!(!record.successful);
    assert_eq!(record.steps.len(), 1);

    let step = &record.steps[0];
    assert!(!step.result.success);
    assert!(
        step.result.output.contains("rejected"),
        "failed validation output preserved: {}",
        step.result.output
    );
    let rollback = step.rollback.as_ref().expect("rollback result recorded");
    assert!(rollback.success);

    // The run landed in the append-only execution log.
    let history = rig.orchestrator.remediation().history().await;
    assert_eq!(history.len(), 1);
    assert!(!history[0].successful);
}

// ===========================================================================
// Routing edges
// ===========================================================================

#[tokio::test]
async fn unparseable_oracle_degrades_to_error_ticket() {
    let rig = rig(&["the oracle rambles instead of answering"]);
    let ticket = rig.orchestrator.handle_issue("operator", "something is wrong").await;
    assert_eq!(ticket.category, Category::Uncategorized);
    assert_eq!(ticket.status, TicketStatus::Error);
    assert!(ticket
        .error
        .as_deref()
        .is_some_and(|e| e.contains("could not be parsed")));
}

#[tokio::test]
async fn empty_issue_is_rejected_without_an_oracle_call() {
    let oracle = Arc::new(ScriptedOracle::empty());
    let config = OpscrewConfig::lab();
    let registry = Arc::new(ServerRegistry::from_config(&config));
    let gate = Arc::new(SafetyGate::new(config.roles.clone(), config.commands.clone()));
    let executor = Arc::new(CommandExecutor::new(
        Arc::clone(&registry),
        gate,
        &config.simulation,
    ));
    let remediation = Arc::new(RemediationExecutor::new(
        Arc::clone(&executor),
        Arc::clone(&registry),
    ));
    let orchestrator = Orchestrator::new(
        Arc::clone(&oracle) as Arc<dyn Oracle>,
        executor,
        remediation,
        registry,
        BundleRegistry::new(),
    );

    let ticket = orchestrator.handle_issue("operator", "   ").await;
    assert_eq!(ticket.status, TicketStatus::Error);
    assert_eq!(oracle.call_count().await, 0);
}

#[tokio::test]
async fn knowledge_query_returns_oracle_answer() {
    let rig = rig(&[
        r#"{"category": "knowledge_query", "reason": "how-to question", "confidence": 0.9}"#,
        "Rotate the key in place and reload the service.",
    ]);
    let ticket = rig
        .orchestrator
        .handle_issue("operator", "how do I rotate TLS keys without downtime?")
        .await;
    assert_eq!(ticket.category, Category::KnowledgeQuery);
    assert_eq!(ticket.status, TicketStatus::Success);
    let response = ticket.response.expect("answer payload");
    assert!(response["answer"].as_str().unwrap().contains("Rotate the key"));
}

#[tokio::test]
async fn general_query_with_no_selection_fails_closed() {
    let rig = rig(&[
        r#"{"category": "general_query", "reason": "status request", "confidence": 0.9}"#,
        r#"{"selected_servers": [], "reasoning": "nothing matches"}"#,
    ]);
    let ticket = rig.orchestrator.handle_issue("operator", "show status of the mainframe").await;
    assert_eq!(ticket.status, TicketStatus::Error);
    assert!(ticket
        .error
        .as_deref()
        .is_some_and(|e| e.contains("could not determine")));
}

#[tokio::test]
async fn declining_approval_cancels_the_ticket() {
    let rig = rig(&[
        r#"{"category": "needs_resolution", "reason": "nginx wedged", "confidence": 0.9, "service": "nginx"}"#,
        r#"{
            "service": "nginx",
            "server": "web01",
            "issue_summary": "worker pool exhausted",
            "severity": "medium",
            "resolution_steps": [
                {"step": "reload nginx workers", "purpose": "recycle the pool",
                 "validation": "systemctl status nginx",
                 "rollback": "systemctl status nginx"}
            ],
            "risks": ["none expected"],
            "prerequisites": ["config check"]
        }"#,
    ]);

    let ticket = rig.orchestrator.handle_issue("operator", "web01 nginx looks wedged").await;
    assert_eq!(ticket.status, TicketStatus::AwaitingApproval);

    let ticket = rig
        .orchestrator
        .approve(ticket.id, "operator", false)
        .await
        .expect("decline succeeds");
    assert_eq!(ticket.status, TicketStatus::Cancelled);
    assert!(ticket.execution.is_none());

    // The stored ticket was updated in place, not duplicated.
    let log = rig.orchestrator.ticket_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, TicketStatus::Cancelled);
}

#[tokio::test]
async fn approving_unknown_ticket_is_a_typed_error() {
    let rig = rig(&[]);
    let result = rig.orchestrator.approve(uuid::Uuid::new_v4(), "operator", true).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn approval_requires_the_remediation_permission() {
    let rig = rig(&[
        r#"{"category": "needs_resolution", "reason": "nginx wedged", "confidence": 0.9, "service": "nginx"}"#,
        r#"{
            "service": "nginx",
            "server": "web01",
            "issue_summary": "worker pool exhausted",
            "severity": "medium",
            "resolution_steps": [
                {"step": "reload nginx workers", "purpose": "recycle the pool",
                 "validation": "systemctl status nginx",
                 "rollback": "systemctl status nginx"}
            ],
            "risks": ["none expected"],
            "prerequisites": ["config check"]
        }"#,
    ]);

    let ticket = rig.orchestrator.handle_issue("operator", "web01 nginx looks wedged").await;
    assert_eq!(ticket.status, TicketStatus::AwaitingApproval);

    // "mallory" is unknown and falls back to the viewer role.
    let denied = rig.orchestrator.approve(ticket.id, "mallory", true).await;
    assert!(denied.is_err());

    // The ticket is untouched and still executable by an admin.
    let log = rig.orchestrator.ticket_log().await;
    assert_eq!(log[0].status, TicketStatus::AwaitingApproval);
    let executed = rig
        .orchestrator
        .approve(ticket.id, "operator", true)
        .await
        .expect("admin approval succeeds");
    assert_eq!(executed.status, TicketStatus::Success);
}

// ===========================================================================
// Remediation preconditions
// ===========================================================================

#[tokio::test]
async fn remediation_rejects_unknown_server() {
    let (remediation, _registry) = remediation_only();
    let plan = ResolutionPlan {
        service: "mysql".to_string(),
        server: "ghost99".to_string(),
        steps: vec![PlanStep {
            action: "check".to_string(),
            validation: "systemctl status mysql".to_string(),
            ..PlanStep::default()
        }],
        ..ResolutionPlan::default()
    };
    let result = remediation.execute(&plan, "operator").await;
    assert!(result.is_err());
    assert!(remediation.history().await.is_empty(), "no partial execution");
}

#[tokio::test]
async fn remediation_rejects_service_not_on_server() {
    let (remediation, _registry) = remediation_only();
    let plan = ResolutionPlan {
        service: "nginx".to_string(),
        server: "db01".to_string(),
        steps: vec![PlanStep {
            action: "check".to_string(),
            validation: "systemctl status nginx".to_string(),
            ..PlanStep::default()
        }],
        ..ResolutionPlan::default()
    };
    assert!(remediation.execute(&plan, "operator").await.is_err());
}

#[tokio::test]
async fn remediation_rejects_empty_step_list() {
    let (remediation, _registry) = remediation_only();
    let plan = ResolutionPlan {
        service: "mysql".to_string(),
        server: "db01".to_string(),
        ..ResolutionPlan::default()
    };
    assert!(remediation.execute(&plan, "operator").await.is_err());
}

#[tokio::test]
async fn remediation_runs_all_steps_and_latches_failure() {
    let (remediation, _registry) = remediation_only();
    let plan = ResolutionPlan {
        service: "mysql".to_string(),
        server: "db01".to_string(),
        summary: "two-step maintenance".to_string(),
        severity: "low".to_string(),
        steps: vec![
            PlanStep {
                action: "run a blocked command".to_string(),
                validation: "dd if=/dev/zero of=/tmp/x".to_string(),
                rollback: "systemctl status mysql".to_string(),
                ..PlanStep::default()
            },
            PlanStep {
                action: "check the service".to_string(),
                validation: "systemctl status mysql".to_string(),
                ..PlanStep::default()
            },
        ],
        risks: vec!["none".to_string()],
        prerequisites: vec!["none".to_string()],
    };
    let record = remediation.execute(&plan, "operator").await.expect("ran");
    assert!(!record.successful);
    assert_eq!(record.steps.len(), 2, "execution continues past a failed step");
    assert!(!record.steps[0].result.success);
    assert!(record.steps[0].rollback.is_some());
    assert!(record.steps[1].result.success);
    assert!(record.steps[1].rollback.is_none());
}
