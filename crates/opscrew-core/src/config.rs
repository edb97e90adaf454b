//! Process configuration — serde structs loaded once at startup and
//! passed by reference into each component. Pure types and parsing only;
//! nothing here reaches for global state, so tests can fabricate
//! registries freely.

use crate::error::Result;
use crate::types::ServerDescriptor;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpscrewConfig {
    pub servers: BTreeMap<String, ServerDescriptor>,
    pub roles: RolePolicy,
    pub commands: CommandPolicy,
    pub simulation: SimulationConfig,
    pub oracle: OracleConfig,
}

impl OpscrewConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: OpscrewConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// The built-in lab topology used when no config file is given:
    /// enough to drive the pipeline end to end in simulation mode.
    pub fn lab() -> Self {
        let content = include_str!("lab_config.json");
        serde_json::from_str(content).unwrap_or_default()
    }
}

/// Role policy: user → role, role → permitted actions. Unknown users get
/// the configured least-privileged fallback role.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolePolicy {
    pub roles: BTreeMap<String, Vec<String>>,
    pub users: BTreeMap<String, String>,
    pub fallback_role: String,
}

impl Default for RolePolicy {
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            "admin".to_string(),
            vec![
                "execute_any_command".to_string(),
                "approve_remediation".to_string(),
                "view_logs".to_string(),
            ],
        );
        roles.insert(
            "viewer".to_string(),
            vec!["view_logs".to_string(), "view_status".to_string()],
        );
        let mut users = BTreeMap::new();
        users.insert("system".to_string(), "admin".to_string());
        Self {
            roles,
            users,
            fallback_role: "viewer".to_string(),
        }
    }
}

impl RolePolicy {
    pub fn role_of(&self, user: &str) -> &str {
        self.users
            .get(user)
            .map(String::as_str)
            .unwrap_or(&self.fallback_role)
    }

    pub fn permits(&self, user: &str, permission: &str) -> bool {
        self.roles
            .get(self.role_of(user))
            .map(|perms| perms.iter().any(|p| p == permission))
            .unwrap_or(false)
    }
}

/// Command policy: whitelist patterns (with `{placeholder}` tokens) and
/// blacklist substrings. An empty whitelist means blacklist-only mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandPolicy {
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            whitelist: [
                "uptime",
                "free -m",
                "df -h",
                "cat /proc/loadavg",
                "top -b -n1",
                "top -b -n1 | head -n 15",
                "top -b -n1 | grep \"Cpu(s)\"",
                "uptime && free -m && df -h",
                "systemctl status {service}",
                "systemctl restart {service}",
                "mysql -V",
                "mysqladmin status",
                "tail -n 100 {path}",
                "ping -c 4 {host}",
                "ip a",
                "ip route",
                "ss -tuln",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blacklist: [
                "rm -rf",
                "shutdown",
                "reboot",
                ":(){ :|:& };:",
                "dd if=",
                "mkfs",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Simulation toggle plus configured canned command→transcript pairs;
/// these are merged over the built-in lab transcripts by the executor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub responses: BTreeMap<String, String>,
}

/// Oracle endpoint (a local Ollama instance by default).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "mistral".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Immutable lookup table of registered hosts, built once at startup from
/// the config map. Map keys win over any `id` field inside the entries.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<String, ServerDescriptor>,
}

impl ServerRegistry {
    pub fn new(mut servers: BTreeMap<String, ServerDescriptor>) -> Self {
        for (id, server) in servers.iter_mut() {
            server.id = id.clone();
        }
        Self { servers }
    }

    pub fn from_config(config: &OpscrewConfig) -> Self {
        Self::new(config.servers.clone())
    }

    pub fn get(&self, id: &str) -> Option<&ServerDescriptor> {
        self.servers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.servers.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Whether `server` is registered and lists `service` among its
    /// managed services.
    pub fn manages(&self, server: &str, service: &str) -> bool {
        self.get(server).map(|s| s.manages(service)).unwrap_or(false)
    }

    /// Lowercased vocabulary of every managed service name — the scan
    /// table for service extraction from issue text.
    pub fn known_services(&self) -> BTreeSet<String> {
        self.servers
            .values()
            .flat_map(|s| s.services.iter())
            .map(|s| s.to_ascii_lowercase())
            .collect()
    }

    /// First registered server whose id appears verbatim in `text`
    /// (lowercased scan) — how "db01 is not responding" resolves a host
    /// without the oracle naming one.
    pub fn find_mentioned(&self, text: &str) -> Option<&ServerDescriptor> {
        let haystack = text.to_ascii_lowercase();
        self.servers
            .values()
            .find(|s| haystack.contains(&s.id.to_ascii_lowercase()))
    }

    /// First server managing `service`, for filling in a plan whose
    /// oracle output omitted the host.
    pub fn find_hosting(&self, service: &str) -> Option<&ServerDescriptor> {
        self.servers.values().find(|s| s.manages(service))
    }

    /// Compact JSON rendering of the topology for oracle prompts.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.servers
                .iter()
                .map(|(id, s)| {
                    (
                        id.clone(),
                        serde_json::json!({
                            "address": s.address,
                            "os": s.os.to_string(),
                            "services": s.services,
                        }),
                    )
                })
                .collect(),
        )
    }
}

impl From<&OpscrewConfig> for ServerRegistry {
    fn from(config: &OpscrewConfig) -> Self {
        Self::from_config(config)
    }
}
