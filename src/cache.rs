//! Result cache with type-aware TTLs, LRU eviction, and adaptive tuning.
//!
//! Keys are `"<providerId>:<toolName>:<canonical-json(arguments)>"`. Tools
//! whose results are inherently unstable (random values, timestamps) are
//! never cached. Each tool type starts from its own TTL; hit-rate feedback
//! periodically nudges those TTLs up or down within fixed bounds.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Default maximum number of live entries.
const DEFAULT_MAX_SIZE: usize = 1000;

/// Adaptive TTL bounds and factors (milliseconds).
const TTL_CEILING_MS: u64 = 3_600_000;
const TTL_FLOOR_MS: u64 = 60_000;
const TTL_GROW_FACTOR: f64 = 1.2;
const TTL_SHRINK_FACTOR: f64 = 0.8;

/// Tool-name fragments that disqualify a result from caching.
const UNCACHEABLE_NAME_FRAGMENTS: &[&str] = &["random", "uuid", "current_time", "now"];

/// Argument fragments that disqualify a result from caching.
const UNCACHEABLE_ARG_FRAGMENTS: &[&str] = &["timestamp", "current"];

/// `(fragment list, type)` classification table; first match wins.
const TOOL_TYPE_RULES: &[(&[&str], &str)] = &[
    (&["file", "read", "write"], "filesystem"),
    (&["db", "sql", "query"], "database"),
    (&["http", "api", "request"], "network"),
    (&["compute", "calculate", "process"], "computation"),
    (&["static", "const", "reference"], "static"),
];

/// Starting TTL per tool type (milliseconds).
const DEFAULT_TYPE_TTLS: &[(&str, u64)] = &[
    ("filesystem", 60_000),
    ("database", 180_000),
    ("network", 120_000),
    ("computation", 600_000),
    ("static", 3_600_000),
    ("default", 300_000),
];

struct CacheEntry {
    value: Value,
    tool_type: String,
    expires_at: Instant,
    hit_count: u64,
    last_access: Instant,
    inserted_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    total_requests: u64,
    total_hits: u64,
    type_requests: HashMap<String, u64>,
    type_ttls: HashMap<String, u64>,
}

/// Process-wide result cache. All operations are linearizable: each one
/// runs under a single interior lock.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
}

/// Cache statistics plus tuning recommendations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hit_rate: f64,
    pub total_requests: u64,
    pub total_hits: u64,
    pub avg_hit_count: f64,
    /// Age of the oldest live entry, milliseconds.
    pub oldest_entry_ms: Option<u64>,
    /// Age of the newest live entry, milliseconds.
    pub newest_entry_ms: Option<u64>,
    pub type_requests: HashMap<String, u64>,
    pub type_ttls_ms: HashMap<String, u64>,
    pub recommendations: Vec<String>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                total_requests: 0,
                total_hits: 0,
                type_requests: HashMap::new(),
                type_ttls: DEFAULT_TYPE_TTLS
                    .iter()
                    .map(|(ty, ttl)| (ty.to_string(), *ttl))
                    .collect(),
            }),
            max_size,
        }
    }

    /// Look up a key. Counts the request; on a live entry, counts the hit
    /// (globally and for the entry's tool type) and refreshes its LRU
    /// position. Expired entries are deleted on sight.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.total_requests += 1;

        let now = Instant::now();
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => return None,
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }

        inner.total_hits += 1;
        let entry = inner
            .entries
            .get_mut(key)
            .expect("entry checked above while holding the lock");
        entry.hit_count += 1;
        entry.last_access = now;
        *inner
            .type_requests
            .entry(entry.tool_type.clone())
            .or_insert(0) += 1;

        Some(entry.value.clone())
    }

    /// Insert a result, unless the tool or its arguments mark it
    /// uncacheable. At capacity, the least recently accessed entry is
    /// evicted first.
    pub fn store(
        &self,
        tool_name: &str,
        args: &Value,
        key: String,
        value: Value,
        ttl_override_ms: Option<u64>,
    ) {
        if !should_cache(tool_name, args) {
            log::debug!("skipping cache for volatile tool '{tool_name}'");
            return;
        }

        let tool_type = classify_tool_type(tool_name);
        let mut inner = self.inner.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone())
            {
                log::debug!("cache full, evicting '{lru_key}'");
                inner.entries.remove(&lru_key);
            }
        }

        let ttl_ms = ttl_override_ms.unwrap_or_else(|| {
            inner
                .type_ttls
                .get(tool_type)
                .copied()
                .unwrap_or(300_000)
        });
        let now = Instant::now();
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                tool_type: tool_type.to_string(),
                expires_at: now + Duration::from_millis(ttl_ms),
                hit_count: 0,
                last_access: now,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries and re-tune per-type TTLs from hit-rate
    /// feedback. Runs on a timer and before every stats read.
    pub fn adapt(&self) {
        let mut inner = self.inner.lock();
        Self::adapt_locked(&mut inner);
    }

    /// Current statistics, refreshed through an adaptation pass first.
    pub fn stats(&self) -> CacheStats {
        let mut inner = self.inner.lock();
        Self::adapt_locked(&mut inner);

        let size = inner.entries.len();
        let hit_rate = if inner.total_requests == 0 {
            0.0
        } else {
            inner.total_hits as f64 / inner.total_requests as f64
        };
        let avg_hit_count = if size == 0 {
            0.0
        } else {
            inner.entries.values().map(|e| e.hit_count).sum::<u64>() as f64 / size as f64
        };

        let now = Instant::now();
        let oldest_entry_ms = inner
            .entries
            .values()
            .map(|e| e.inserted_at)
            .min()
            .map(|t| now.duration_since(t).as_millis() as u64);
        let newest_entry_ms = inner
            .entries
            .values()
            .map(|e| e.inserted_at)
            .max()
            .map(|t| now.duration_since(t).as_millis() as u64);

        let mut recommendations = Vec::new();
        if hit_rate < 0.3 {
            recommendations.push(
                "Low cache hit rate - consider longer TTLs or more cacheable call patterns"
                    .to_string(),
            );
        }
        if size as f64 / self.max_size as f64 > 0.9 {
            recommendations.push(
                "Cache is near capacity - consider raising the size limit".to_string(),
            );
        }
        if hit_rate > 0.8 {
            recommendations
                .push("Excellent cache performance - no tuning needed".to_string());
        }
        if inner.total_requests < 10 {
            recommendations.push(
                "Insufficient data for reliable recommendations - keep collecting".to_string(),
            );
        }

        CacheStats {
            size,
            hit_rate,
            total_requests: inner.total_requests,
            total_hits: inner.total_hits,
            avg_hit_count,
            oldest_entry_ms,
            newest_entry_ms,
            type_requests: inner.type_requests.clone(),
            type_ttls_ms: inner.type_ttls.clone(),
            recommendations,
        }
    }

    fn adapt_locked(inner: &mut CacheInner) {
        let now = Instant::now();
        inner.entries.retain(|_, entry| entry.expires_at > now);

        // Per-type hit rate: mean hit count of live entries of that type,
        // over the requests served for that type. No requests means 0.
        let mut type_hits: HashMap<&str, (u64, u64)> = HashMap::new();
        for entry in inner.entries.values() {
            let slot = type_hits.entry(entry.tool_type.as_str()).or_insert((0, 0));
            slot.0 += entry.hit_count;
            slot.1 += 1;
        }

        let mut tuned: Vec<(String, u64)> = Vec::new();
        for (tool_type, ttl) in &inner.type_ttls {
            let (hits, live) = type_hits
                .get(tool_type.as_str())
                .copied()
                .unwrap_or((0, 0));
            if live == 0 {
                continue;
            }
            let avg_hits = hits as f64 / live as f64;
            let requests = inner.type_requests.get(tool_type).copied().unwrap_or(0);
            let rate = if requests == 0 {
                0.0
            } else {
                avg_hits / requests as f64
            };

            if rate > 0.7 {
                let grown = ((*ttl as f64 * TTL_GROW_FACTOR) as u64).min(TTL_CEILING_MS);
                tuned.push((tool_type.clone(), grown));
            } else if rate < 0.2 {
                let shrunk = ((*ttl as f64 * TTL_SHRINK_FACTOR) as u64).max(TTL_FLOOR_MS);
                tuned.push((tool_type.clone(), shrunk));
            }
        }
        for (tool_type, ttl) in tuned {
            inner.type_ttls.insert(tool_type, ttl);
        }
    }
}

/// Whether a tool call result is safe to cache.
///
/// Tools with inherently unstable output (random values, identifiers,
/// clock reads) and calls whose arguments mention timestamps are excluded.
pub fn should_cache(tool_name: &str, args: &Value) -> bool {
    let name = tool_name.to_lowercase();
    if UNCACHEABLE_NAME_FRAGMENTS
        .iter()
        .any(|fragment| name.contains(fragment))
    {
        return false;
    }

    let rendered = args.to_string().to_lowercase();
    !UNCACHEABLE_ARG_FRAGMENTS
        .iter()
        .any(|fragment| rendered.contains(fragment))
}

/// Map a tool name onto a cache type bucket; first matching rule wins.
pub fn classify_tool_type(tool_name: &str) -> &'static str {
    let name = tool_name.to_lowercase();
    for (fragments, tool_type) in TOOL_TYPE_RULES {
        if fragments.iter().any(|fragment| name.contains(fragment)) {
            return tool_type;
        }
    }
    "default"
}

/// Build the cache key for one invocation.
pub fn cache_key(provider_id: &str, tool_name: &str, args: &Value) -> String {
    format!("{provider_id}:{tool_name}:{}", canonical_json(args))
}

/// Deterministic JSON rendering: object keys sorted at every level, no
/// whitespace. Scalars use serde_json's output, which already produces
/// shortest round-trippable numbers and minimally escaped strings.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String((*key).clone()));
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}
