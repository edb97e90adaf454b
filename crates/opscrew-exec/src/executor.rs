//! CommandExecutor — sanitize, gate, substitute, dispatch.
//!
//! Strategy selection is by request shape: a named server goes to the
//! remote strategy (real SSH, or the simulated channel when the
//! process-wide toggle is on), no server means a local subprocess. Each
//! strategy is independently testable behind the `Executor` trait.

use crate::safety::SafetyGate;
use crate::sim::SimulatedExecutor;
use crate::ssh::SshExecutor;
use async_trait::async_trait;
use opscrew_core::config::{ServerRegistry, SimulationConfig};
use opscrew_core::types::{CommandResult, ServerDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// One command to run on behalf of a user, optionally against a
/// registered server.
#[derive(Clone, Debug)]
pub struct CommandRequest {
    pub command: String,
    pub user: String,
    pub server: Option<String>,
    pub service: Option<String>,
    pub timeout_secs: u64,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user: user.into(),
            server: None,
            service: None,
            timeout_secs: 30,
        }
    }

    pub fn on_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn for_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// An execution strategy. Implementations never panic and never hang
/// past the given timeout; every failure mode folds into a
/// `CommandResult` with `success = false`.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        command: &str,
        server: Option<&ServerDescriptor>,
        timeout: Duration,
    ) -> CommandResult;
}

/// Local subprocess strategy with bounded retry. Spawn errors are
/// transient and retried with a fixed delay; a non-zero exit is the
/// command's answer and is not retried; a timeout kills the child.
pub struct LocalExecutor {
    attempts: u32,
    retry_delay: Duration,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    async fn execute(
        &self,
        command: &str,
        _server: Option<&ServerDescriptor>,
        timeout: Duration,
    ) -> CommandResult {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            let run = Command::new("sh")
                .arg("-c")
                .arg(command)
                .kill_on_drop(true)
                .output();
            match tokio::time::timeout(timeout, run).await {
                // Timeout: dropping the future kills the child.
                Err(_) => {
                    warn!(command, timeout_secs = timeout.as_secs(), "local command timed out");
                    return CommandResult::failure(
                        format!("timed out after {}s", timeout.as_secs()),
                        -1,
                    );
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(command, attempt, error = %last_error, "local spawn failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Ok(Ok(output)) => {
                    let exit_code = output.status.code().unwrap_or(-1);
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if output.status.success() {
                        return CommandResult::ok(stdout.trim());
                    }
                    let merged = format!("{}\n{}", stdout.trim(), stderr.trim());
                    return CommandResult::failure(merged.trim(), exit_code);
                }
            }
        }
        CommandResult::failure(
            format!("failed after {} attempts: {last_error}", self.attempts),
            -1,
        )
    }
}

pub struct CommandExecutor {
    registry: Arc<ServerRegistry>,
    gate: Arc<SafetyGate>,
    local: LocalExecutor,
    remote: Arc<dyn Executor>,
}

impl CommandExecutor {
    /// Build the standard dispatcher: the remote strategy is real SSH,
    /// or the canned-transcript channel when simulation is enabled.
    /// Local execution stays real either way.
    pub fn new(
        registry: Arc<ServerRegistry>,
        gate: Arc<SafetyGate>,
        simulation: &SimulationConfig,
    ) -> Self {
        let remote: Arc<dyn Executor> = if simulation.enabled {
            info!("simulation mode enabled; remote commands return canned transcripts");
            Arc::new(SimulatedExecutor::with_defaults(simulation.responses.clone()))
        } else {
            Arc::new(SshExecutor::new())
        };
        Self::with_remote(registry, gate, remote)
    }

    /// Dispatcher with an explicit remote strategy (test seam).
    pub fn with_remote(
        registry: Arc<ServerRegistry>,
        gate: Arc<SafetyGate>,
        remote: Arc<dyn Executor>,
    ) -> Self {
        Self {
            registry,
            gate,
            local: LocalExecutor::default(),
            remote,
        }
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Run one command: sanitize, fill placeholders from the target
    /// descriptor, gate, dispatch. A disallowed command or unknown server
    /// yields a failed result and nothing executes.
    pub async fn run(&self, request: &CommandRequest) -> CommandResult {
        let sanitized = SafetyGate::sanitize(&request.command);
        let timeout = Duration::from_secs(request.timeout_secs.max(1));

        match request.server.as_deref() {
            Some(id) => {
                let Some(server) = self.registry.get(id) else {
                    warn!(server = id, command = %sanitized, "unknown server; refusing to execute");
                    return CommandResult::failure(format!("unknown server: {id}"), -1);
                };
                let command = substitute(&sanitized, server, request.service.as_deref());
                if !self.gate.is_allowed(&command) {
                    return rejected(&command);
                }
                info!(
                    target: "audit",
                    user = %request.user, server = %server.id, executor = self.remote.name(),
                    command = %command, "execute"
                );
                let result = self.remote.execute(&command, Some(server), timeout).await;
                info!(
                    target: "audit",
                    user = %request.user, server = %server.id,
                    success = result.success, exit_code = result.exit_code, "complete"
                );
                result
            }
            None => {
                if !self.gate.is_allowed(&sanitized) {
                    return rejected(&sanitized);
                }
                info!(
                    target: "audit",
                    user = %request.user, executor = self.local.name(), command = %sanitized,
                    "execute"
                );
                let result = self.local.execute(&sanitized, None, timeout).await;
                info!(
                    target: "audit",
                    user = %request.user, success = result.success,
                    exit_code = result.exit_code, "complete"
                );
                result
            }
        }
    }
}

fn rejected(command: &str) -> CommandResult {
    warn!(command, "command rejected by policy");
    CommandResult::failure(format!("command rejected by policy: {command}"), -1)
}

/// Fill host-specific placeholders and retarget host-implicit
/// diagnostics: `ping` variants that would hit localhost are rewritten
/// against the remote host's address.
fn substitute(command: &str, server: &ServerDescriptor, service: Option<&str>) -> String {
    let mut command = command.replace("{host}", &server.address);
    if let Some(service) = service {
        command = command.replace("{service}", service);
    }
    let trimmed = command.trim();
    if trimmed == "ping" {
        return format!("ping -c 4 {}", server.address);
    }
    if trimmed.starts_with("ping") && trimmed.contains("localhost") {
        return trimmed.replace("localhost", &server.address);
    }
    if trimmed.starts_with("ping ")
        && !trimmed.contains('.')
        && !trimmed.contains("127.0.0.1")
    {
        return format!("{trimmed} {}", server.address);
    }
    command
}
