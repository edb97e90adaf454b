//! Simulated remote channel — canned transcripts instead of live hosts.
//!
//! Lookup order matches what operators expect from recorded sessions:
//! exact command match, then first-token prefix match, then a generic
//! non-failing response (friendlier for `status` commands). Unmatched
//! commands never fail; simulation exists to exercise the pipeline, not
//! to model outages (configure an explicit failing transcript for that).

use crate::executor::Executor;
use async_trait::async_trait;
use opscrew_core::types::{CommandResult, ServerDescriptor};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub struct SimulatedExecutor {
    responses: BTreeMap<String, String>,
}

impl SimulatedExecutor {
    pub fn new(responses: BTreeMap<String, String>) -> Self {
        Self { responses }
    }

    /// Built-in lab transcripts, with configured entries layered on top
    /// (configuration wins on key collisions).
    pub fn with_defaults(configured: BTreeMap<String, String>) -> Self {
        let mut responses = builtin_transcripts();
        responses.extend(configured);
        Self::new(responses)
    }

    fn lookup(&self, command: &str) -> Option<&str> {
        if let Some(output) = self.responses.get(command) {
            return Some(output);
        }
        // Prefix match on the pattern's first token, so "uptime -p"
        // still hits the recorded "uptime" transcript.
        self.responses
            .iter()
            .find(|(pattern, _)| {
                pattern
                    .split_whitespace()
                    .next()
                    .is_some_and(|head| command.starts_with(head))
            })
            .map(|(_, output)| output.as_str())
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn execute(
        &self,
        command: &str,
        server: Option<&ServerDescriptor>,
        _timeout: Duration,
    ) -> CommandResult {
        let host = server.map(|s| s.address.as_str()).unwrap_or("localhost");
        debug!(command, host, "simulated execution");

        if let Some(output) = self.lookup(command) {
            return CommandResult::ok(output.trim());
        }
        if command.contains("status") {
            return CommandResult::ok(format!(
                "Service is running\nSimulated response for: {command}"
            ));
        }
        CommandResult::ok(format!("Simulated output for: {command}\nServer: {host}"))
    }
}

fn builtin_transcripts() -> BTreeMap<String, String> {
    let entries: &[(&str, &str)] = &[
        (
            "uptime",
            " 00:53:02 up 2:47, 1 user, load average: 0.08, 0.12, 0.10",
        ),
        (
            "free -m",
            "               total        used        free      shared  buff/cache   available\n\
             Mem:            8032        1234        3854          22        2944        6540\n\
             Swap:           2048           0        2048",
        ),
        (
            "df -h",
            "Filesystem      Size  Used Avail Use% Mounted on\n\
             udev            3.9G     0  3.9G   0% /dev\n\
             /dev/sda1        98G   25G   69G  27% /",
        ),
        ("cat /proc/loadavg", "0.08 0.12 0.10 2/345 1011"),
        (
            "top -b -n1 | grep \"Cpu(s)\"",
            "%Cpu(s):  5.9 us,  3.4 sy,  0.0 ni, 89.5 id,  0.2 wa,  0.0 hi,  0.9 si,  0.0 st",
        ),
        (
            "systemctl status nginx",
            "● nginx.service - A high performance web server and a reverse proxy server\n\
             \x20  Loaded: loaded (/lib/systemd/system/nginx.service; enabled; vendor preset: enabled)\n\
             \x20  Active: active (running) since Thu 2025-05-16 00:10:31 UTC; 2h 42min ago\n\
             \x20Main PID: 1234 (nginx)",
        ),
        (
            "systemctl status mysql",
            "● mysql.service - MySQL Community Server\n\
             \x20  Loaded: loaded (/lib/systemd/system/mysql.service; enabled; vendor preset: enabled)\n\
             \x20  Active: active (running) since Thu 2025-05-16 00:05:41 UTC; 2h 47min ago\n\
             \x20Main PID: 1011 (mysqld)",
        ),
        (
            "systemctl status mysqld",
            "● mysqld.service - MySQL Server\n\
             \x20  Loaded: loaded (/usr/lib/systemd/system/mysqld.service; enabled; vendor preset: disabled)\n\
             \x20  Active: active (running) since Thu 2025-05-16 00:05:41 UTC; 2h 47min ago\n\
             \x20Main PID: 1011 (mysqld)",
        ),
    ];
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
