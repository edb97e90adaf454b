//! Prompt builders. Each returns the full completion prompt for one
//! oracle call; the expected JSON shape is spelled out inline because the
//! parsers in `types` depend on it.

/// Classification prompt: category + reason + confidence (+ service).
pub fn classify(issue: &str) -> String {
    format!(
        r#"You are an experienced IT support agent.

Classify the following issue into exactly one of these categories:
- general_query      (status, listings, resource usage)
- knowledge_query    (how-to and conceptual questions)
- api_query          (requests to look something up in an external system)
- needs_resolution   (something is broken and needs fixing)

Issue:
{issue}

Respond ONLY with JSON in this exact format:
{{
  "category": "<category_name>",
  "reason": "<brief reasoning>",
  "confidence": <0.0 to 1.0>,
  "service": "<affected service name, or omit if none>"
}}"#
    )
}

/// Server-selection prompt for the information path.
pub fn select_servers(query: &str, topology: &serde_json::Value) -> String {
    format!(
        r#"You are a systems assistant.
Given the user's query and the infrastructure below, identify which
server(s) the query is most relevant to.

Infrastructure:
{topology:#}

User query:
{query}

Respond ONLY with JSON in this exact format:
{{
  "selected_servers": ["<server id>", "..."],
  "reasoning": "<why these servers are relevant>"
}}"#
    )
}

/// Remediation-plan prompt. Hints narrow the oracle toward the hosts and
/// services the registry actually knows about.
pub fn plan(issue: &str, service_hint: Option<&str>, server_hint: Option<&str>) -> String {
    let mut hints = String::new();
    if let Some(service) = service_hint {
        hints.push_str(&format!("\nThe affected service is likely: {service}"));
    }
    if let Some(server) = server_hint {
        hints.push_str(&format!("\nThe affected server is likely: {server}"));
    }
    format!(
        r#"You are a site reliability engineer.

Given the reported issue, return a structured, safe resolution plan.
Commands must be idempotent and non-destructive, and every risky step
must carry a rollback command.

Issue:
{issue}
{hints}

Respond ONLY with JSON in this exact format:
{{
  "service": "<primary affected service>",
  "server": "<target server id>",
  "issue_summary": "<root cause in plain English>",
  "severity": "<low|medium|high|critical>",
  "resolution_steps": [
    {{
      "step": "<what to do>",
      "purpose": "<why>",
      "validation": "<shell command that performs or verifies it>",
      "rollback": "<shell command that undoes it>"
    }}
  ],
  "risks": ["<known risk>"],
  "prerequisites": ["<required precondition>"]
}}"#
    )
}

/// Free-text knowledge answer (no structured parsing downstream).
pub fn knowledge(question: &str) -> String {
    format!(
        r#"You are an expert IT assistant. Answer the following question in
a clear, concise, and actionable way:

Question: {question}"#
    )
}
