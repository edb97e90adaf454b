//! Diagnostics fan-out for the information path.
//!
//! Every selected server gets the standard health battery plus a status
//! check per managed service and any registered bundle extras. Servers
//! are surveyed concurrently and independently — one host timing out
//! must never stall the rest — while the commands *within* one server
//! run in order so the transcript reads like a session.

use futures::future::join_all;
use opscrew_core::commands::{self, BundleRegistry};
use opscrew_core::config::ServerRegistry;
use opscrew_core::types::{CommandSpec, ServerDescriptor};
use opscrew_exec::{CommandExecutor, CommandRequest};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Transcript of one server's survey.
#[derive(Clone, Debug)]
pub struct ServerReport {
    pub server: String,
    pub address: String,
    pub services: Vec<String>,
    pub transcript: String,
}

impl ServerReport {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "ip": self.address,
            "services": self.services,
            "output": self.transcript,
        })
    }
}

/// Survey the named servers concurrently. Unregistered ids are skipped;
/// per-command failures are recorded into the transcript rather than
/// aborting the sweep.
pub async fn survey(
    executor: &Arc<CommandExecutor>,
    registry: &Arc<ServerRegistry>,
    bundles: &BundleRegistry,
    servers: &[String],
    user: &str,
) -> BTreeMap<String, ServerReport> {
    let tasks = servers.iter().filter_map(|id| {
        let Some(server) = registry.get(id) else {
            debug!(server = id.as_str(), "skipping unregistered server in survey");
            return None;
        };
        let server = server.clone();
        let executor = Arc::clone(executor);
        let specs = survey_commands(&server, bundles);
        let user = user.to_string();
        Some(async move { survey_one(executor, server, specs, &user).await })
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|report| (report.server.clone(), report))
        .collect()
}

fn survey_commands(server: &ServerDescriptor, bundles: &BundleRegistry) -> Vec<CommandSpec> {
    let mut specs = commands::standard_battery(server.os);
    for service in &server.services {
        if let Some(status) = commands::service_status(server.os, service) {
            specs.push(CommandSpec::new(status));
        }
        if let Some(extra) = bundles.get(service) {
            specs.extend(extra.iter().cloned());
        }
    }
    specs
}

async fn survey_one(
    executor: Arc<CommandExecutor>,
    server: ServerDescriptor,
    specs: Vec<CommandSpec>,
    user: &str,
) -> ServerReport {
    let mut transcript = String::new();
    for spec in &specs {
        let request = CommandRequest::new(spec.command.clone(), user)
            .on_server(server.id.clone())
            .with_timeout(spec.timeout_secs);
        let result = executor.run(&request).await;
        // Some bundle commands legitimately exit non-zero (grep-style
        // checks); the spec's expected exit code decides, not just 0.
        let ok = result.success || result.exit_code == spec.expect_exit;
        let body = if ok {
            result.output
        } else {
            format!("Error: {}", result.output)
        };
        transcript.push_str(&format!("$ {}\n{}\n\n", spec.command, body));
    }
    ServerReport {
        server: server.id.clone(),
        address: server.address.clone(),
        services: server.services.clone(),
        transcript: transcript.trim_end().to_string(),
    }
}
