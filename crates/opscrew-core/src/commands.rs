//! OS command tables and diagnostic bundles.
//!
//! The metric map mirrors what an operator would type by hand on each OS
//! family; the bundle registry is populated by explicit `register` calls
//! at startup (no filesystem discovery), so the set of service-specific
//! diagnostics is deterministic and testable.

use crate::types::{CommandSpec, OsFamily};
use std::collections::BTreeMap;

/// Resolve a metric name ("cpu", "disk", a service name, …) to the
/// command that reports it on the given OS family. Unknown metrics fall
/// back to a service-status lookup; `None` means nothing maps.
pub fn lookup(os: OsFamily, metric: &str) -> Option<String> {
    let command = match metric {
        "cpu" => "top -b -n1 | grep \"Cpu(s)\"",
        "memory" => "free -m",
        "disk" => "df -h",
        "uptime" => "uptime",
        "load" => "cat /proc/loadavg",
        "network" => "ip a",
        "ports" => "ss -tuln",
        "route" => "ip route",
        "ping" => "ping -c 4 localhost",
        "status" => "uptime && free -m && df -h",
        service => return Some(service_status(os, service)?),
    };
    Some(command.to_string())
}

/// `systemctl status` command for a service, accounting for unit-name
/// divergence between families (MySQL is `mysqld` on CentOS).
pub fn service_status(os: OsFamily, service: &str) -> Option<String> {
    let unit = match service.to_ascii_lowercase().as_str() {
        "nginx" => "nginx",
        "tomcat" => "tomcat",
        "mysql" => match os {
            OsFamily::Centos => "mysqld",
            _ => "mysql",
        },
        "rabbitmq" => "rabbitmq-server",
        "memcache" | "memcached" => "memcached",
        _ => return None,
    };
    Some(format!("systemctl status {unit}"))
}

/// The baseline health battery every diagnostic sweep starts with.
pub fn standard_battery(os: OsFamily) -> Vec<CommandSpec> {
    ["uptime", "memory", "disk", "cpu", "load"]
        .iter()
        .filter_map(|metric| lookup(os, metric))
        .map(CommandSpec::new)
        .collect()
}

/// Explicit registry of service-specific command bundles. Populated by
/// an initialization call rather than directory scanning, so behavior is
/// the same in every environment.
#[derive(Debug, Clone, Default)]
pub struct BundleRegistry {
    bundles: BTreeMap<String, Vec<CommandSpec>>,
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in bundles.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            "mysql",
            vec![
                CommandSpec::new("mysql -V"),
                CommandSpec::new("mysqladmin status"),
                CommandSpec::new("tail -n 100 /var/log/mysql/error.log"),
            ],
        );
        registry
    }

    /// Register a bundle. Replaces any existing bundle for the service.
    pub fn register(&mut self, service: impl Into<String>, specs: Vec<CommandSpec>) {
        self.bundles.insert(service.into().to_ascii_lowercase(), specs);
    }

    pub fn get(&self, service: &str) -> Option<&[CommandSpec]> {
        self.bundles
            .get(&service.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn services(&self) -> Vec<&str> {
        self.bundles.keys().map(String::as_str).collect()
    }
}
