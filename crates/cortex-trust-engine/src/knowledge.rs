// crates/cortex-trust-engine/src/knowledge.rs
// ============================================================================
// Module: Knowledge Discovery
// Description: Parallel SOP and memory lookup for an impending tool call.
// Purpose: Answer "what standing procedures and prior memories apply here?"
//          within a bounded timeout, never failing the hot path.
// Dependencies: async-trait, cortex-trust-core, once_cell, regex, tokio
// ============================================================================

//! ## Overview
//! [`KnowledgeDiscovery`] is a pure downstream of the Trust Gate: it reads
//! [`cortex_trust_core::ContextFeatures`] and the raw params, and returns
//! data. It never calls back into the Enforcement Engine (see the
//! cyclic-reference note this design resolves by keeping Discovery
//! one-directional). SOP lookups are blocking local file reads, so they run
//! on [`tokio::task::spawn_blocking`] concurrently with the memory store's
//! async lookup via [`tokio::join!`]. Only the memory half sits under the
//! `max_lookup_ms` deadline: a memory-store timeout degrades to SOPs-only,
//! since the SOP side never shares a thread with it to be starved by it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use cortex_trust_core::Category;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Errors a knowledge-source lookup can report. Per the error-handling
/// design these are swallowed into empty results by the aggregator, never
/// propagated to the hot path.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("sop file unreadable: {0}")]
    SopUnreadable(String),
    #[error("memory store error: {0}")]
    MemoryStore(String),
}

/// Loads SOP file content from wherever standing procedures are kept.
pub trait SopLoader: Send + Sync {
    /// Reads the full content at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeError::SopUnreadable`] if the file cannot be read.
    fn load(&self, path: &str) -> Result<String, KnowledgeError>;
}

/// Reads SOP files directly from the local filesystem.
pub struct FsSopLoader;

impl SopLoader for FsSopLoader {
    fn load(&self, path: &str) -> Result<String, KnowledgeError> {
        std::fs::read_to_string(path).map_err(|err| KnowledgeError::SopUnreadable(format!("{path}: {err}")))
    }
}

/// One memory record returned by a [`MemoryStore`] search.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub confidence: f64,
    pub category: String,
    pub last_accessed: cortex_trust_core::Timestamp,
    pub access_count: u64,
}

/// The external, content-addressed memory store Cortex queries for prior
/// experience relevant to an impending action.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Searches for memories matching `query` keywords, optionally filtered
    /// to `categories`, above `min_confidence`, capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeError::MemoryStore`] on a backend failure.
    async fn search_memories_with_confidence(
        &self,
        query: &[String],
        categories: &[String],
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, KnowledgeError>;

    /// Creates a causal atom from a promoted feedback pattern.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeError::MemoryStore`] on a backend failure.
    async fn atom_create(&self, subject: &str, action: &str, outcome: &str, consequences: &str, source: &str, confidence: f64) -> Result<String, KnowledgeError>;
}

/// A single entry in the SOP pattern table: regex-matched contexts mapped to
/// one or more SOP files.
pub struct SopRule {
    pub pattern: Regex,
    pub label: &'static str,
    pub path: &'static str,
    pub priority: i32,
    pub sections: &'static [&'static str],
}

macro_rules! sop_rule {
    ($pattern:expr, $label:expr, $path:expr, $priority:expr, $sections:expr) => {
        SopRule { pattern: Regex::new($pattern).expect("static pattern"), label: $label, path: $path, priority: $priority, sections: $sections }
    };
}

/// The ordered SOP pattern table. Matched case-insensitively against the
/// JSON-serialized params.
static SOP_TABLE: Lazy<Vec<SopRule>> = Lazy::new(|| {
    vec![
        sop_rule!(r"(?i)\bpostgres|postgresql\b", "database-postgres", "sops/database/postgres.md", 90, &["Rollback", "Backups"]),
        sop_rule!(r"(?i)\bmysql\b", "database-mysql", "sops/database/mysql.md", 90, &["Rollback"]),
        sop_rule!(r"(?i)\bredis\b", "cache-redis", "sops/cache/redis.md", 70, &["Failover"]),
        sop_rule!(r"(?i)\bdeploy|release\b", "release-process", "sops/release/deploy.md", 95, &["Pre-flight", "Rollback"]),
        sop_rule!(r"(?i)\bgit\s+push\s+(--force|-f)\b", "git-force-push", "sops/git/force_push.md", 100, &["Risks"]),
        sop_rule!(r"(?i)\bsystemctl\s+(restart|stop)\b", "service-restart", "sops/ops/service_restart.md", 85, &["Order"]),
        sop_rule!(r"(?i)\bnginx\b", "proxy-nginx", "sops/proxy/nginx.md", 60, &["Reload"]),
        sop_rule!(r"(?i)\bdocker\s+compose\b", "container-compose", "sops/container/compose.md", 55, &["Networks"]),
        sop_rule!(r"(?i)\bkubectl\b", "container-kubernetes", "sops/container/kubernetes.md", 65, &["Rollout"]),
        sop_rule!(r"(?i)\bfleet|edge-\d+\b", "fleet-node", "sops/fleet/nodes.md", 50, &["Access"]),
        sop_rule!(r"(?i)\bsudo\b", "privileged-exec", "sops/ops/privileged_exec.md", 80, &["Audit"]),
        sop_rule!(r"(?i)\bstripe\b", "financial-stripe", "sops/financial/stripe.md", 99, &["Limits"]),
        sop_rule!(r"(?i)\baugur\b", "financial-augur", "sops/financial/augur.md", 99, &["Limits"]),
        sop_rule!(r"(?i)\bcrypto|wallet\b", "financial-crypto", "sops/financial/crypto.md", 99, &["Limits"]),
        sop_rule!(r"(?i)\biptables|firewall-cmd|ufw\b", "network-firewall", "sops/network/firewall.md", 88, &["Rules"]),
        sop_rule!(r"(?i)\bcron\b", "scheduling-cron", "sops/ops/cron.md", 40, &["Timezones"]),
    ]
});

/// One resolved SOP match, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SopMatch {
    pub label: String,
    pub path: String,
    pub content: String,
    pub priority: i32,
}

/// The union of SOP and memory lookups, with timing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeResult {
    pub sops: Vec<SopMatch>,
    pub memories: Vec<MemoryRecord>,
    pub elapsed: Duration,
    pub timed_out: bool,
}

struct CacheEntry<T> {
    value: T,
    cached_at: Instant,
}

type SopCache = Mutex<HashMap<&'static str, CacheEntry<String>>>;

/// Bounded-TTL caches and the two knowledge sources, combined into one
/// parallel-lookup facade.
pub struct KnowledgeDiscovery {
    sop_loader: Arc<dyn SopLoader>,
    memory_store: Arc<dyn MemoryStore>,
    sop_cache: Arc<SopCache>,
    cache_ttl: Duration,
    max_lookup: Duration,
}

impl KnowledgeDiscovery {
    /// Builds a discovery facade over the given sources.
    #[must_use]
    pub fn new(sop_loader: Box<dyn SopLoader>, memory_store: Arc<dyn MemoryStore>, cache_ttl: Duration, max_lookup: Duration) -> Self {
        Self { sop_loader: Arc::from(sop_loader), memory_store, sop_cache: Arc::new(Mutex::new(HashMap::new())), cache_ttl, max_lookup }
    }

    /// Looks up SOPs and memories relevant to `params_json` and `keywords`.
    /// The SOP lookup (blocking file reads) runs on the blocking pool while
    /// the memory lookup runs concurrently under `max_lookup_ms`. Never
    /// fails: a lookup error or timeout degrades to a partial or empty
    /// [`KnowledgeResult`].
    pub async fn lookup(&self, params_json: &str, keywords: &[String], categories: &[String]) -> KnowledgeResult {
        let started = Instant::now();

        let sop_loader = self.sop_loader.clone();
        let sop_cache = self.sop_cache.clone();
        let cache_ttl = self.cache_ttl;
        let params_owned = params_json.to_string();
        let sop_task = tokio::task::spawn_blocking(move || lookup_sops(&sop_loader, &sop_cache, cache_ttl, &params_owned));

        let memory_future = self.memory_store.search_memories_with_confidence(keywords, categories, 0.5, 20);

        let (sop_result, memory_result) = tokio::join!(sop_task, tokio::time::timeout(self.max_lookup, memory_future));

        let sops = sop_result.unwrap_or_default();
        let (memories, timed_out) = match memory_result {
            Ok(Ok(records)) => (records, false),
            Ok(Err(_)) => (Vec::new(), false),
            Err(_) => (Vec::new(), true),
        };

        KnowledgeResult { sops, memories, elapsed: started.elapsed(), timed_out }
    }
}

fn lookup_sops(sop_loader: &Arc<dyn SopLoader>, sop_cache: &SopCache, cache_ttl: Duration, params_json: &str) -> Vec<SopMatch> {
    let mut matches: Vec<SopMatch> = SOP_TABLE
        .iter()
        .filter(|rule| rule.pattern.is_match(params_json))
        .filter_map(|rule| load_cached(sop_loader, sop_cache, cache_ttl, rule).map(|content| SopMatch {
            label: rule.label.to_string(),
            path: rule.path.to_string(),
            content: extract_sections(&content, rule.sections),
            priority: rule.priority,
        }))
        .collect();
    matches.sort_by(|a, b| b.priority.cmp(&a.priority));
    matches
}

fn load_cached(sop_loader: &Arc<dyn SopLoader>, sop_cache: &SopCache, cache_ttl: Duration, rule: &SopRule) -> Option<String> {
    if let Ok(mut cache) = sop_cache.lock() {
        if let Some(entry) = cache.get(rule.label) {
            if entry.cached_at.elapsed() < cache_ttl {
                return Some(entry.value.clone());
            }
        }
        match sop_loader.load(rule.path) {
            Ok(content) => {
                cache.insert(rule.label, CacheEntry { value: content.clone(), cached_at: Instant::now() });
                Some(content)
            }
            Err(_) => None,
        }
    } else {
        sop_loader.load(rule.path).ok()
    }
}

/// Extracts named sections from SOP content. Honors Markdown headings
/// (`## Section`) and key-block style (`Section:` at column 0). Falls back
/// to the first 1500 characters if no named section matches.
fn extract_sections(content: &str, sections: &[&str]) -> String {
    let mut extracted = String::new();
    for section in sections {
        if let Some(found) = extract_markdown_heading(content, section).or_else(|| extract_key_block(content, section)) {
            extracted.push_str(&found);
            extracted.push('\n');
        }
    }
    if extracted.is_empty() {
        content.chars().take(1500).collect()
    } else {
        extracted
    }
}

fn extract_markdown_heading(content: &str, section: &str) -> Option<String> {
    let heading_marker = format!("## {section}");
    let start = content.find(&heading_marker)?;
    let rest = &content[start + heading_marker.len()..];
    let end = rest.find("\n## ").unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

fn extract_key_block(content: &str, section: &str) -> Option<String> {
    let marker = format!("{section}:");
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix(&marker) {
            return Some(rest.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test assertions use expect for clarity.")]

    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::FsSopLoader;
    use super::KnowledgeDiscovery;
    use super::KnowledgeError;
    use super::MemoryRecord;
    use super::MemoryStore;
    use super::SopLoader;

    struct StubSopLoader(String);

    impl SopLoader for StubSopLoader {
        fn load(&self, _path: &str) -> Result<String, KnowledgeError> {
            Ok(self.0.clone())
        }
    }

    struct NeverRespondingMemoryStore;

    #[async_trait]
    impl MemoryStore for NeverRespondingMemoryStore {
        async fn search_memories_with_confidence(
            &self,
            _query: &[String],
            _categories: &[String],
            _min_confidence: f64,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, KnowledgeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn atom_create(&self, _subject: &str, _action: &str, _outcome: &str, _consequences: &str, _source: &str, _confidence: f64) -> Result<String, KnowledgeError> {
            Ok("atom-1".to_string())
        }
    }

    struct EmptyMemoryStore;

    #[async_trait]
    impl MemoryStore for EmptyMemoryStore {
        async fn search_memories_with_confidence(
            &self,
            _query: &[String],
            _categories: &[String],
            _min_confidence: f64,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, KnowledgeError> {
            Ok(Vec::new())
        }

        async fn atom_create(&self, _subject: &str, _action: &str, _outcome: &str, _consequences: &str, _source: &str, _confidence: f64) -> Result<String, KnowledgeError> {
            Ok("atom-1".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn memory_timeout_degrades_to_sops_only() {
        let discovery = KnowledgeDiscovery::new(
            Box::new(StubSopLoader("## Rollback\ncontent here\n".to_string())),
            Arc::new(NeverRespondingMemoryStore),
            Duration::from_secs(1800),
            Duration::from_millis(50),
        );
        let result = discovery.lookup(r#"{"command": "git push --force"}"#, &["git".to_string()], &[]).await;
        assert!(result.timed_out);
        assert!(result.memories.is_empty());
        assert!(!result.sops.is_empty());
    }

    #[tokio::test]
    async fn matching_sop_rule_extracts_named_section() {
        let discovery = KnowledgeDiscovery::new(
            Box::new(StubSopLoader("## Rollback\nstop the service first\n## Backups\nother\n".to_string())),
            Arc::new(EmptyMemoryStore),
            Duration::from_secs(1800),
            Duration::from_millis(500),
        );
        let result = discovery.lookup(r#"{"command": "postgres -D /data"}"#, &["postgres".to_string()], &[]).await;
        assert!(result.sops.iter().any(|m| m.label == "database-postgres" && m.content.contains("stop the service first")));
    }

    #[tokio::test]
    async fn unreadable_sop_is_skipped_without_failing_lookup() {
        struct FailingLoader;
        impl SopLoader for FailingLoader {
            fn load(&self, path: &str) -> Result<String, KnowledgeError> {
                Err(KnowledgeError::SopUnreadable(path.to_string()))
            }
        }
        let discovery = KnowledgeDiscovery::new(Box::new(FailingLoader), Arc::new(EmptyMemoryStore), Duration::from_secs(1800), Duration::from_millis(500));
        let result = discovery.lookup(r#"{"command": "postgres -D /data"}"#, &["postgres".to_string()], &[]).await;
        assert!(result.sops.is_empty());
        assert!(!result.timed_out);
    }

    #[test]
    fn fs_sop_loader_reports_missing_file_as_error() {
        let loader = FsSopLoader;
        assert!(loader.load("/nonexistent/path/does-not-exist.md").is_err());
    }
}
