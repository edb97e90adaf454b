//! Orchestrator — the top-level state machine.
//!
//! One ticket at a time: classify → route → (remediation path) plan →
//! validate → await approval. Approval is a distinct call that either
//! hands the stored plan to the RemediationExecutor or cancels the
//! ticket. Every stage failure resolves the ticket to a terminal status;
//! nothing propagates out of `handle_issue`.

use crate::classifier::{self, Classification};
use crate::diagnostics;
use crate::remediation::RemediationExecutor;
use crate::validator;
use opscrew_core::commands::BundleRegistry;
use opscrew_core::config::ServerRegistry;
use opscrew_core::error::{Error, Result};
use opscrew_core::types::{Category, IssueTicket, TicketStatus};
use opscrew_exec::CommandExecutor;
use opscrew_oracle::types::{OracleClassification, OraclePlan, ServerSelection};
use opscrew_oracle::{parse_response, prompts, Oracle, OracleOutcome};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    executor: Arc<CommandExecutor>,
    remediation: Arc<RemediationExecutor>,
    registry: Arc<ServerRegistry>,
    bundles: BundleRegistry,
    tickets: Mutex<Vec<IssueTicket>>,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        executor: Arc<CommandExecutor>,
        remediation: Arc<RemediationExecutor>,
        registry: Arc<ServerRegistry>,
        bundles: BundleRegistry,
    ) -> Self {
        Self {
            oracle,
            executor,
            remediation,
            registry,
            bundles,
            tickets: Mutex::new(Vec::new()),
        }
    }

    pub fn remediation(&self) -> &Arc<RemediationExecutor> {
        &self.remediation
    }

    /// Process one issue through the pipeline. Always returns a ticket
    /// with a terminal status (or `AwaitingApproval`); the ticket is
    /// appended to the log exactly once, here.
    pub async fn handle_issue(&self, user: &str, issue: &str) -> IssueTicket {
        let mut ticket = IssueTicket::new(issue.trim());

        if issue.trim().is_empty() {
            ticket.fail("empty issue text");
            return self.finish(ticket).await;
        }
        info!(ticket = %ticket.id, "processing issue: {:.100}", issue);

        // Stage 1: classification.
        let classification = match self.classify(issue).await {
            Ok(classification) => classification,
            Err(e) => {
                ticket.fail(e.to_string());
                return self.finish(ticket).await;
            }
        };
        ticket.category = classification.category;
        ticket.classification_reason = classification.reason.clone();
        ticket.service = classification.service.clone();
        info!(ticket = %ticket.id, category = %ticket.category, "issue classified");

        // Stage 2: route.
        match ticket.category {
            Category::Uncategorized => {
                let reason = ticket.classification_reason.clone();
                ticket.fail(reason);
            }
            Category::GeneralQuery => self.run_general_query(&mut ticket, user).await,
            Category::KnowledgeQuery | Category::ApiQuery => {
                self.run_knowledge_query(&mut ticket).await
            }
            Category::NeedsResolution => self.run_resolution(&mut ticket).await,
        }

        self.finish(ticket).await
    }

    /// The distinct approval step: `yes` executes the stored plan, `no`
    /// cancels the ticket. The stored ticket is updated in place.
    pub async fn approve(&self, ticket_id: Uuid, user: &str, approved: bool) -> Result<IssueTicket> {
        let (plan, verdict) = {
            let tickets = self.tickets.lock().await;
            let ticket = tickets
                .iter()
                .find(|t| t.id == ticket_id)
                .ok_or_else(|| Error::UnknownTicket(ticket_id.to_string()))?;
            if ticket.status != TicketStatus::AwaitingApproval {
                return Err(Error::plan(format!(
                    "ticket {ticket_id} is not awaiting approval"
                )));
            }
            match (&ticket.plan, &ticket.verdict) {
                (Some(plan), Some(verdict)) => (plan.clone(), verdict.clone()),
                _ => {
                    return Err(Error::plan(format!(
                        "ticket {ticket_id} has no validated plan"
                    )))
                }
            }
        };

        if !approved {
            info!(ticket = %ticket_id, "remediation declined by {user}");
            return self
                .update_ticket(ticket_id, |ticket| {
                    ticket.status = TicketStatus::Cancelled;
                })
                .await;
        }

        if !self.executor.gate().authorize(user, "approve_remediation") {
            return Err(Error::PermissionDenied(format!(
                "user \"{user}\" may not approve remediation"
            )));
        }

        // The invariant the whole engine hangs on: no execution without
        // an approving verdict.
        if !verdict.approved {
            return Err(Error::plan(
                "plan was rejected by validation and cannot be executed",
            ));
        }

        info!(ticket = %ticket_id, "remediation approved by {user}");
        match self.remediation.execute(&plan, user).await {
            Ok(record) => {
                let successful = record.successful;
                self.update_ticket(ticket_id, move |ticket| {
                    ticket.execution = Some(record);
                    ticket.status = if successful {
                        TicketStatus::Success
                    } else {
                        TicketStatus::Error
                    };
                    if !successful {
                        ticket.error = Some("one or more remediation steps failed".to_string());
                    }
                })
                .await
            }
            Err(e) => {
                error!(ticket = %ticket_id, error = %e, "remediation could not start");
                let message = e.to_string();
                self.update_ticket(ticket_id, move |ticket| ticket.fail(message))
                    .await
            }
        }
    }

    /// Snapshot of the ticket log.
    pub async fn ticket_log(&self) -> Vec<IssueTicket> {
        self.tickets.lock().await.clone()
    }

    async fn classify(&self, issue: &str) -> Result<Classification> {
        let raw = self
            .oracle
            .complete(&prompts::classify(issue))
            .await
            .map_err(|e| Error::Oracle(e.to_string()))?;
        let outcome: OracleOutcome<OracleClassification> = parse_response(&raw);
        Ok(classifier::classify(issue, &outcome, &self.registry))
    }

    async fn run_general_query(&self, ticket: &mut IssueTicket, user: &str) {
        let selection = match self.select_servers(&ticket.issue).await {
            Ok(selection) => selection,
            Err(e) => {
                ticket.fail(e.to_string());
                return;
            }
        };
        if selection.selected_servers.is_empty() {
            ticket.fail("could not determine which server to query");
            return;
        }

        let reports = diagnostics::survey(
            &self.executor,
            &self.registry,
            &self.bundles,
            &selection.selected_servers,
            user,
        )
        .await;

        ticket.response = Some(json!({
            "reasoning": selection.reasoning,
            "selected_servers": selection.selected_servers,
            "server_outputs": reports
                .iter()
                .map(|(id, report)| (id.clone(), report.to_json()))
                .collect::<serde_json::Map<String, serde_json::Value>>(),
        }));
        ticket.status = TicketStatus::Success;
    }

    async fn run_knowledge_query(&self, ticket: &mut IssueTicket) {
        match self.oracle.complete(&prompts::knowledge(&ticket.issue)).await {
            Ok(answer) => {
                ticket.response = Some(json!({ "answer": answer.trim() }));
                ticket.status = TicketStatus::Success;
            }
            Err(e) => ticket.fail(format!("oracle error: {e}")),
        }
    }

    async fn run_resolution(&self, ticket: &mut IssueTicket) {
        let server_hint = self
            .registry
            .find_mentioned(&ticket.issue)
            .map(|s| s.id.clone())
            .or_else(|| {
                ticket
                    .service
                    .as_deref()
                    .and_then(|service| self.registry.find_hosting(service))
                    .map(|s| s.id.clone())
            });

        let raw = match self
            .oracle
            .complete(&prompts::plan(
                &ticket.issue,
                ticket.service.as_deref(),
                server_hint.as_deref(),
            ))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                ticket.fail(format!("oracle error: {e}"));
                return;
            }
        };

        let outcome: OracleOutcome<OraclePlan> = parse_response(&raw);
        let mut plan = match outcome {
            OracleOutcome::Parsed(plan) => plan.into_plan(),
            OracleOutcome::Unparseable { detail, .. } => {
                ticket.fail(format!("resolution plan could not be parsed: {detail}"));
                return;
            }
        };

        // Fill gaps the oracle left from what classification learned.
        if plan.service.trim().is_empty() {
            if let Some(service) = &ticket.service {
                plan.service = service.clone();
            }
        }
        if plan.server.trim().is_empty() {
            if let Some(server) = server_hint {
                plan.server = server;
            }
        }

        let verdict = validator::validate(&plan, &self.registry);
        info!(
            ticket = %ticket.id, approved = verdict.approved,
            confidence = verdict.confidence, "plan validated"
        );

        let approved = verdict.approved;
        let reason = verdict.reason.clone();
        ticket.plan = Some(plan);
        ticket.verdict = Some(verdict);
        if approved {
            ticket.status = TicketStatus::AwaitingApproval;
        } else {
            ticket.fail(format!("plan rejected: {reason}"));
        }
    }

    async fn select_servers(&self, query: &str) -> Result<ServerSelection> {
        let raw = self
            .oracle
            .complete(&prompts::select_servers(query, &self.registry.describe()))
            .await
            .map_err(|e| Error::Oracle(e.to_string()))?;
        let outcome: OracleOutcome<ServerSelection> = parse_response(&raw);
        Ok(match outcome {
            OracleOutcome::Parsed(selection) => selection,
            OracleOutcome::Unparseable { .. } => ServerSelection {
                selected_servers: Vec::new(),
                reasoning: "could not parse the server selection response".to_string(),
            },
        })
    }

    /// Append the finished ticket to the log (exactly once per pass).
    async fn finish(&self, ticket: IssueTicket) -> IssueTicket {
        self.tickets.lock().await.push(ticket.clone());
        ticket
    }

    async fn update_ticket(
        &self,
        ticket_id: Uuid,
        mutate: impl FnOnce(&mut IssueTicket),
    ) -> Result<IssueTicket> {
        let mut tickets = self.tickets.lock().await;
        let ticket = tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .ok_or_else(|| Error::UnknownTicket(ticket_id.to_string()))?;
        mutate(ticket);
        Ok(ticket.clone())
    }
}
