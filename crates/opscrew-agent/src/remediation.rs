//! RemediationExecutor — turns an approved plan into audited actions.
//!
//! Steps run strictly in order because a later step (or its rollback) may
//! depend on an earlier step's effect. A failing step triggers its
//! rollback, is recorded, and execution continues; the record's overall
//! flag latches false on the first failure. The in-memory execution log
//! is append-only behind one writer lock and is never mutated after
//! append.
//!
//! Note on step semantics: each step's *validation* command is what
//! actually runs — the action text is descriptive. This mirrors the
//! established operator workflow where the check command doubles as the
//! fix trigger; the two fields stay separate in the data model.

use chrono::Utc;
use opscrew_core::config::ServerRegistry;
use opscrew_core::error::{Error, Result};
use opscrew_core::types::{CommandResult, ExecutionRecord, ResolutionPlan, StepOutcome};
use opscrew_exec::{CommandExecutor, CommandRequest};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const STEP_TIMEOUT_SECS: u64 = 60;

pub struct RemediationExecutor {
    executor: Arc<CommandExecutor>,
    registry: Arc<ServerRegistry>,
    log: Mutex<Vec<ExecutionRecord>>,
}

impl RemediationExecutor {
    pub fn new(executor: Arc<CommandExecutor>, registry: Arc<ServerRegistry>) -> Self {
        Self {
            executor,
            registry,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Execute a plan. Precondition violations (unknown server, service
    /// not on that server, empty steps) are typed errors — nothing
    /// partially executes.
    pub async fn execute(&self, plan: &ResolutionPlan, user: &str) -> Result<ExecutionRecord> {
        let Some(server) = self.registry.get(&plan.server) else {
            return Err(Error::UnknownServer(plan.server.clone()));
        };
        if !plan.service.trim().is_empty() && !server.manages(&plan.service) {
            return Err(Error::plan(format!(
                "service \"{}\" does not run on server \"{}\"",
                plan.service, plan.server
            )));
        }
        if plan.steps.is_empty() {
            return Err(Error::plan("plan has no steps to execute"));
        }

        info!(
            server = %plan.server, service = %plan.service, steps = plan.steps.len(),
            "executing remediation plan"
        );

        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(plan.steps.len());
        let mut successful = true;

        for (index, step) in plan.steps.iter().enumerate() {
            let result = if step.validation.trim().is_empty() {
                CommandResult::failure("step has no validation command to run", -1)
            } else {
                self.run_on_plan_target(plan, &step.validation, user).await
            };

            let mut rollback = None;
            if !result.success {
                successful = false;
                warn!(step = index + 1, output = %result.output, "remediation step failed");
                if !step.rollback.trim().is_empty() {
                    let rb = self.run_on_plan_target(plan, &step.rollback, user).await;
                    info!(step = index + 1, success = rb.success, "rollback executed");
                    rollback = Some(rb);
                }
            }

            outcomes.push(StepOutcome {
                index,
                action: step.action.clone(),
                result,
                rollback,
            });
        }

        let record = ExecutionRecord {
            server: plan.server.clone(),
            service: plan.service.clone(),
            started_at,
            steps: outcomes,
            successful,
        };
        self.log.lock().await.push(record.clone());
        Ok(record)
    }

    /// Snapshot of the audit trail.
    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.log.lock().await.clone()
    }

    async fn run_on_plan_target(
        &self,
        plan: &ResolutionPlan,
        command: &str,
        user: &str,
    ) -> CommandResult {
        let request = CommandRequest::new(command, user)
            .on_server(plan.server.clone())
            .for_service(plan.service.clone())
            .with_timeout(STEP_TIMEOUT_SECS);
        self.executor.run(&request).await
    }
}
