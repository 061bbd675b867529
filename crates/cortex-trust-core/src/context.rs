// crates/cortex-trust-core/src/context.rs
// ============================================================================
// Module: Cortex Trust Context Extractor
// Description: Pure feature extraction from a tool call's name and params.
// Purpose: Surface a bag of facts (keywords, path, host, risk ladder) that
//          Knowledge Discovery and the Enforcement Pipeline read, without
//          overriding the Classifier's tier/category verdict.
// Dependencies: once_cell, regex, serde_json, url
// ============================================================================

//! ## Overview
//! [`extract`] never fails: a param shape it cannot parse degrades to `None`
//! or an empty collection rather than an error, mirroring the teacher's
//! best-effort parsing style (a malformed `targetUrl` is swallowed via
//! `Url::parse(..).ok()`, never propagated).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

/// Coarse risk amplifier derived from a call's shape. A *hint* consumed by
/// Knowledge Discovery and the Enforcement Pipeline; it never overrides the
/// Classifier's tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    /// Nothing elevated detected.
    Low,
    /// A network-state-changing command.
    Medium,
    /// A force-push, publish, sudo, or service stop/restart.
    High,
    /// A destructive filesystem or disk operation.
    Critical,
}

/// Facts extracted from a tool call's name, action/command/channel fields,
/// and any path- or URL-bearing parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextFeatures {
    /// Normalized tokens: primary command, CLI sub-command, action/channel
    /// fields, falling back to the tool name when nothing else is present.
    pub keywords: Vec<String>,
    /// Project name extracted from a `/Projects/<name>` path segment.
    pub project_path: Option<String>,
    /// The `workdir` or `cwd` param, verbatim.
    pub working_dir: Option<String>,
    /// An IPv4 address, SSH target, or explicit `node` param.
    pub host_target: Option<String>,
    /// Hostname parsed from a `targetUrl` param.
    pub url_host: Option<String>,
    /// Curated-map lookup of a keyword against a known service type.
    pub service_type: Option<String>,
    /// The primary verb of the call (first command token, `action`, or the
    /// tool name).
    pub command_type: Option<String>,
    /// Heuristic risk ladder position.
    pub risk_level: RiskLevel,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Low
    }
}

static PROJECT_PATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Projects/([A-Za-z0-9_.-]+)").expect("static pattern"));

static IPV4_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("static pattern"));

static SSH_TARGET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bssh\s+(?:-\S+\s+)*([A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+)").expect("static pattern"));

static DESTRUCTIVE_DISK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(rm\s+-rf|dd\s+if=|mkfs|fdisk|shred)\b").expect("static pattern"));

static HIGH_RISK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(push\s+(--force|-f)|force-push|publish|sudo|systemctl\s+(stop|restart))\b").expect("static pattern")
});

static MEDIUM_RISK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(iptables|firewall-cmd|ufw|ip\s+(addr|link|route)|route\s+add)\b").expect("static pattern")
});

/// CLI tool names whose second token is treated as a meaningful sub-command.
const SUBCOMMAND_TOOLS: &[&str] = &["git", "docker", "npm", "ssh"];

/// Curated keyword-to-service-type lookup.
const SERVICE_TYPE_MAP: &[(&str, &str)] = &[
    ("flux", "comfyui"),
    ("comfyui", "comfyui"),
    ("postgres", "database"),
    ("postgresql", "database"),
    ("mysql", "database"),
    ("redis", "cache"),
    ("nginx", "proxy"),
    ("caddy", "proxy"),
    ("docker", "container_runtime"),
];

/// Extracts [`ContextFeatures`] from a tool call's name and JSON params.
///
/// # Invariants
/// - Pure: identical inputs always produce an identical result.
/// - Never panics or returns an error; unparsable fields degrade to `None`.
#[must_use]
pub fn extract(tool_name: &str, params: &Value) -> ContextFeatures {
    let command = str_field(params, "command");
    let action = str_field(params, "action");
    let channel = str_field(params, "channel");
    let working_dir = str_field(params, "workdir").or_else(|| str_field(params, "cwd"));
    let node = str_field(params, "node");
    let target_url = str_field(params, "targetUrl");

    let keywords = build_keywords(tool_name, command, action, channel);
    let project_path = first_path_match(params, &PROJECT_PATH_PATTERN);
    let host_target = host_target(command, node);
    let url_host = target_url.and_then(|raw| Url::parse(raw).ok()).and_then(|url| url.host_str().map(str::to_string));
    let service_type = keywords.iter().find_map(|keyword| {
        SERVICE_TYPE_MAP.iter().find(|(key, _)| key == keyword).map(|(_, value)| (*value).to_string())
    });
    let command_type = command
        .and_then(first_token)
        .or_else(|| action.map(str::to_string))
        .or_else(|| Some(tool_name.to_string()));
    let risk_level = risk_level_for(command);

    ContextFeatures {
        keywords,
        project_path,
        working_dir: working_dir.map(str::to_string),
        host_target,
        url_host,
        service_type,
        command_type,
        risk_level,
    }
}

fn str_field<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn first_token(command: &str) -> Option<String> {
    command.split_whitespace().next().map(str::to_string)
}

fn build_keywords(tool_name: &str, command: Option<&str>, action: Option<&str>, channel: Option<&str>) -> Vec<String> {
    let mut keywords = Vec::new();
    if let Some(command) = command {
        let mut tokens = command.split_whitespace();
        if let Some(primary) = tokens.next() {
            keywords.push(primary.to_lowercase());
            if SUBCOMMAND_TOOLS.contains(&primary) {
                if let Some(sub) = tokens.next() {
                    keywords.push(sub.to_lowercase());
                }
            }
        }
    }
    if let Some(action) = action {
        keywords.push(action.to_lowercase());
    }
    if let Some(channel) = channel {
        keywords.push(channel.to_lowercase());
    }
    if keywords.is_empty() {
        keywords.push(tool_name.to_lowercase());
    }
    keywords
}

fn first_path_match(params: &Value, pattern: &Regex) -> Option<String> {
    const PATH_FIELDS: &[&str] = &["path", "file", "target", "command", "workdir", "cwd"];
    for field in PATH_FIELDS {
        if let Some(value) = str_field(params, field) {
            if let Some(caps) = pattern.captures(value) {
                return caps.get(1).map(|m| m.as_str().to_string());
            }
        }
    }
    None
}

fn host_target(command: Option<&str>, node: Option<&str>) -> Option<String> {
    if let Some(node) = node {
        return Some(node.to_string());
    }
    let command = command?;
    if let Some(caps) = SSH_TARGET_PATTERN.captures(command) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    IPV4_PATTERN.find(command).map(|m| m.as_str().to_string())
}

fn risk_level_for(command: Option<&str>) -> RiskLevel {
    let Some(command) = command else { return RiskLevel::Low };
    if DESTRUCTIVE_DISK_PATTERN.is_match(command) {
        RiskLevel::Critical
    } else if HIGH_RISK_PATTERN.is_match(command) {
        RiskLevel::High
    } else if MEDIUM_RISK_PATTERN.is_match(command) {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::extract;
    use super::RiskLevel;

    #[test]
    fn ordinary_read_is_low_risk_with_tool_name_keyword() {
        let features = extract("read_file", &json!({"path": "/tmp/notes.txt"}));
        assert_eq!(features.risk_level, RiskLevel::Low);
        assert_eq!(features.keywords, vec!["read_file".to_string()]);
    }

    #[test]
    fn destructive_disk_command_is_critical() {
        let features = extract("exec", &json!({"command": "rm -rf /var/data"}));
        assert_eq!(features.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn force_push_is_high_risk() {
        let features = extract("exec", &json!({"command": "git push --force origin main"}));
        assert_eq!(features.risk_level, RiskLevel::High);
        assert_eq!(features.keywords, vec!["git".to_string(), "push".to_string()]);
    }

    #[test]
    fn firewall_command_is_medium_risk() {
        let features = extract("exec", &json!({"command": "iptables -A INPUT -j DROP"}));
        assert_eq!(features.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn project_path_is_extracted() {
        let features = extract("read_file", &json!({"path": "/home/m/Projects/cortex/src/main.rs"}));
        assert_eq!(features.project_path, Some("cortex".to_string()));
    }

    #[test]
    fn ipv4_host_target_is_extracted() {
        let features = extract("exec", &json!({"command": "ping 10.0.0.5"}));
        assert_eq!(features.host_target, Some("10.0.0.5".to_string()));
    }

    #[test]
    fn ssh_target_takes_priority_over_bare_ipv4_absence() {
        let features = extract("exec", &json!({"command": "ssh deploy@10.0.0.9 uptime"}));
        assert_eq!(features.host_target, Some("deploy@10.0.0.9".to_string()));
    }

    #[test]
    fn node_param_overrides_command_derived_host() {
        let features = extract("exec", &json!({"command": "ping 10.0.0.5", "node": "edge-3"}));
        assert_eq!(features.host_target, Some("edge-3".to_string()));
    }

    #[test]
    fn url_host_is_parsed_from_target_url() {
        let features = extract("web_search", &json!({"targetUrl": "https://example.com/path"}));
        assert_eq!(features.url_host, Some("example.com".to_string()));
    }

    #[test]
    fn malformed_target_url_does_not_fail_extraction() {
        let features = extract("web_search", &json!({"targetUrl": "not a url"}));
        assert_eq!(features.url_host, None);
    }

    #[test]
    fn service_type_is_looked_up_from_keywords() {
        let features = extract("exec", &json!({"command": "postgres -D /var/lib/pg"}));
        assert_eq!(features.service_type, Some("database".to_string()));
    }
}
