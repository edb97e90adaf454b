//! SafetyGate — the single choke point in front of the executor.
//!
//! Every command, whether oracle-suggested, plan step, or diagnostic,
//! passes through `sanitize` and `is_allowed` before anything runs. This
//! is the primary defense against an oracle that hallucinates destructive
//! actions.

use opscrew_core::config::{CommandPolicy, RolePolicy};
use regex::Regex;
use tracing::warn;

pub struct SafetyGate {
    roles: RolePolicy,
    policy: CommandPolicy,
}

impl SafetyGate {
    pub fn new(roles: RolePolicy, policy: CommandPolicy) -> Self {
        Self { roles, policy }
    }

    /// Role-based authorization: user → role → permission membership.
    /// Unknown users resolve to the least-privileged configured role.
    pub fn authorize(&self, user: &str, permission: &str) -> bool {
        let allowed = self.roles.permits(user, permission);
        if !allowed {
            warn!(user, permission, role = self.roles.role_of(user), "permission denied");
        }
        allowed
    }

    /// Strip shell metacharacters that enable injection or redirection
    /// (`;` `` ` `` `$` `>` `<`), preserving `|` and `&&` so legitimate
    /// multi-command diagnostics keep working. Idempotent.
    pub fn sanitize(command: &str) -> String {
        command
            .chars()
            .filter(|c| !matches!(c, ';' | '`' | '$' | '>' | '<'))
            .collect()
    }

    /// Check a (sanitized) command against the blacklist, then — when a
    /// whitelist is configured — require a whitelist match. Blacklist
    /// entries match as substrings; whitelist entries match the whole
    /// command, with `{placeholder}` tokens standing for any non-empty
    /// text.
    pub fn is_allowed(&self, command: &str) -> bool {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return false;
        }

        for blocked in &self.policy.blacklist {
            if trimmed.contains(blocked.as_str()) {
                warn!(command = trimmed, pattern = blocked.as_str(), "command blacklisted");
                return false;
            }
        }

        if self.policy.whitelist.is_empty() {
            return true;
        }

        // Chained diagnostics: every segment must clear the whitelist on
        // its own, so `uptime && rm data` cannot ride along.
        if trimmed.contains("&&") || trimmed.contains('|') {
            if self.whitelist_matches(trimmed) {
                return true;
            }
            return trimmed
                .split("&&")
                .flat_map(|part| part.split('|'))
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .all(|part| self.whitelist_matches(part));
        }

        if self.whitelist_matches(trimmed) {
            return true;
        }
        warn!(command = trimmed, "command not in whitelist");
        false
    }

    fn whitelist_matches(&self, command: &str) -> bool {
        self.policy.whitelist.iter().any(|entry| {
            entry.as_str() == command || placeholder_pattern_matches(entry, command)
        })
    }
}

/// Match `command` against a whitelist entry whose `{placeholder}` tokens
/// stand for any non-empty token sequence: escape the entry, then rewrite
/// the escaped placeholders into `.+`.
fn placeholder_pattern_matches(entry: &str, command: &str) -> bool {
    if !entry.contains('{') {
        return false;
    }
    let escaped = regex::escape(entry);
    let pattern = match Regex::new(r"\\\{[^}]+\\\}") {
        Ok(re) => re.replace_all(&escaped, ".+"),
        Err(_) => return false,
    };
    Regex::new(&format!("^{pattern}$"))
        .map(|re| re.is_match(command))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscrew_core::config::{CommandPolicy, RolePolicy};

    fn gate() -> SafetyGate {
        SafetyGate::new(RolePolicy::default(), CommandPolicy::default())
    }

    fn blacklist_only() -> SafetyGate {
        SafetyGate::new(
            RolePolicy::default(),
            CommandPolicy {
                whitelist: Vec::new(),
                ..CommandPolicy::default()
            },
        )
    }

    // ── sanitize ──

    #[test]
    fn sanitize_strips_metacharacters() {
        let out = SafetyGate::sanitize("cat /etc/passwd; rm x > /dev/null < y `id` $HOME");
        for c in [';', '`', '$', '>', '<'] {
            assert!(!out.contains(c), "{c:?} survived sanitation: {out}");
        }
    }

    #[test]
    fn sanitize_preserves_pipes_and_chaining() {
        let out = SafetyGate::sanitize("uptime && free -m | head -n 2");
        assert_eq!(out, "uptime && free -m | head -n 2");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for cmd in ["df -h", "echo a;b`c`$d>e<f", "top -b -n1 | grep x && uptime"] {
            let once = SafetyGate::sanitize(cmd);
            assert_eq!(SafetyGate::sanitize(&once), once);
        }
    }

    // ── blacklist ──

    #[test]
    fn blacklist_rejects_destructive_substrings() {
        let g = gate();
        assert!(!g.is_allowed("rm -rf /var/lib/mysql"));
        assert!(!g.is_allowed("sudo shutdown -h now"));
        assert!(!g.is_allowed("dd if=/dev/zero of=/dev/sda"));
        assert!(!g.is_allowed("mkfs.ext4 /dev/sdb1"));
        assert!(!g.is_allowed(":(){ :|:& };:"));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(!gate().is_allowed(""));
        assert!(!gate().is_allowed("   "));
    }

    // ── whitelist ──

    #[test]
    fn whitelist_exact_match() {
        let g = gate();
        assert!(g.is_allowed("uptime"));
        assert!(g.is_allowed("df -h"));
        assert!(!g.is_allowed("curl http://evil.example"));
    }

    #[test]
    fn whitelist_placeholder_matches_any_token() {
        let g = gate();
        assert!(g.is_allowed("systemctl status nginx"));
        assert!(g.is_allowed("systemctl status rabbitmq-server"));
        assert!(g.is_allowed("ping -c 4 192.168.56.11"));
        // Placeholder requires non-empty text.
        assert!(!g.is_allowed("systemctl status "));
    }

    #[test]
    fn whitelisted_chain_passes_as_whole_or_per_segment() {
        let g = gate();
        // Whole-string whitelist entry.
        assert!(g.is_allowed("uptime && free -m && df -h"));
        // Per-segment fallback.
        assert!(g.is_allowed("uptime && df -h"));
        // One bad segment poisons the chain.
        assert!(!g.is_allowed("uptime && curl http://evil.example"));
    }

    #[test]
    fn empty_whitelist_means_blacklist_only() {
        let g = blacklist_only();
        assert!(g.is_allowed("echo hello"));
        assert!(!g.is_allowed("rm -rf /"));
    }

    // ── authorize ──

    #[test]
    fn known_admin_gets_execute_permission() {
        let g = gate();
        assert!(g.authorize("system", "execute_any_command"));
    }

    #[test]
    fn unknown_user_falls_back_to_viewer() {
        let g = gate();
        assert!(!g.authorize("mallory", "execute_any_command"));
        assert!(g.authorize("mallory", "view_status"));
    }
}
