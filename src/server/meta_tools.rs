//! The eight built-in meta-tools.
//!
//! These are served in-process by the aggregator itself: introspection over
//! providers, usage, cache behavior and routing, plus control over the
//! deduplication engine. Meta-tool calls never touch the cache or the
//! metrics store. Every input schema declares `additionalProperties: false`
//! and the argument structs mirror that with `deny_unknown_fields`, so bad
//! arguments come back as tool-level errors rather than protocol failures.

use std::collections::HashSet;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use rmcp::RoleServer;
use rmcp::model::{CallToolResult, Content, Tool};
use rmcp::service::Peer;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::sanitize_command;
use crate::dedup::pair_similarity;
use crate::error::MetaError;
use crate::inventory::NamespacedTool;
use crate::metrics::{MetricsStore, PerformanceMetrics};

use super::MetaServer;
use super::dispatch::{error_result, run_in_waves};

pub const DISCOVER_SERVERS: &str = "discover_servers";
pub const ANALYZE_USAGE: &str = "analyze_usage";
pub const GET_CACHE_STATS: &str = "get_cache_stats";
pub const SUGGEST_TOOLS: &str = "suggest_tools";
pub const BATCH_EXECUTE: &str = "batch_execute";
pub const OPTIMIZE_ROUTING: &str = "optimize_routing";
pub const CONFIGURE_DEDUPLICATION: &str = "configure_deduplication";
pub const ANALYZE_TOOL_SIMILARITY: &str = "analyze_tool_similarity";

pub const META_TOOL_NAMES: &[&str] = &[
    DISCOVER_SERVERS,
    ANALYZE_USAGE,
    GET_CACHE_STATS,
    SUGGEST_TOOLS,
    BATCH_EXECUTE,
    OPTIMIZE_ROUTING,
    CONFIGURE_DEDUPLICATION,
    ANALYZE_TOOL_SIMILARITY,
];

/// How many suggestions `suggest_tools` returns at most.
const MAX_SUGGESTIONS: usize = 10;

/// Default and bounds for `batch_execute` wave width.
const DEFAULT_BATCH_CONCURRENCY: usize = 5;
const MAX_BATCH_CONCURRENCY: usize = 20;

/// Warning thresholds for `optimize_routing`.
const WARN_SUCCESS_RATE: f64 = 0.8;
const WARN_RESPONSE_TIME_MS: f64 = 5000.0;

pub fn is_meta_tool(name: &str) -> bool {
    META_TOOL_NAMES.contains(&name)
}

/// Definitions for all eight meta-tools, in listing order.
pub fn meta_tool_definitions() -> Vec<Tool> {
    vec![
        tool_def(
            DISCOVER_SERVERS,
            "List every downstream MCP server with its status, tool count, and performance summary",
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        ),
        tool_def(
            ANALYZE_USAGE,
            "Usage metrics over a timeframe: per-server detail or a fleet overview, plus cache statistics",
            json!({
                "type": "object",
                "properties": {
                    "timeframe": {
                        "type": "string",
                        "enum": ["hour", "day", "week"],
                        "description": "Window to report over (default: day)"
                    },
                    "serverId": {
                        "type": "string",
                        "description": "Report a single server instead of the overview"
                    }
                },
                "additionalProperties": false
            }),
        ),
        tool_def(
            GET_CACHE_STATS,
            "Result cache statistics: hit rate, sizes, per-type TTLs, and tuning recommendations",
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        ),
        tool_def(
            SUGGEST_TOOLS,
            "Rank available tools by relevance to a task description",
            json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "description": "What you are trying to accomplish"
                    },
                    "context": {
                        "type": "object",
                        "description": "Optional additional context"
                    }
                },
                "required": ["task"],
                "additionalProperties": false
            }),
        ),
        tool_def(
            BATCH_EXECUTE,
            "Execute several tool calls concurrently in bounded waves, returning per-item outcomes in submission order",
            json!({
                "type": "object",
                "properties": {
                    "operations": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "tool": {"type": "string"},
                                "arguments": {"type": "object"}
                            },
                            "required": ["tool"],
                            "additionalProperties": false
                        }
                    },
                    "concurrency": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 20,
                        "description": "Wave width (default: 5)"
                    }
                },
                "required": ["operations"],
                "additionalProperties": false
            }),
        ),
        tool_def(
            OPTIMIZE_ROUTING,
            "Flag providers with poor success rates or slow responses, with current cache statistics",
            json!({
                "type": "object",
                "properties": {
                    "tool": {
                        "type": "string",
                        "description": "Restrict the report to one tool name"
                    }
                },
                "additionalProperties": false
            }),
        ),
        tool_def(
            CONFIGURE_DEDUPLICATION,
            "Adjust the deduplication engine; toggling it rebuilds the exposed tool surface",
            json!({
                "type": "object",
                "properties": {
                    "enabled": {"type": "boolean"},
                    "similarityThreshold": {"type": "number", "minimum": 0, "maximum": 1},
                    "autoMerge": {"type": "boolean"},
                    "getStats": {"type": "boolean"}
                },
                "additionalProperties": false
            }),
        ),
        tool_def(
            ANALYZE_TOOL_SIMILARITY,
            "Compare two tools, or list every tool similar to a target",
            json!({
                "type": "object",
                "properties": {
                    "tool1": {"type": "string"},
                    "tool2": {"type": "string"},
                    "listSimilar": {"type": "boolean"},
                    "toolName": {"type": "string"}
                },
                "additionalProperties": false
            }),
        ),
    ]
}

fn tool_def(name: &'static str, description: &'static str, schema: Value) -> Tool {
    Tool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema: super::schema_object(&schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

// Argument shapes. `deny_unknown_fields` realizes `additionalProperties:
// false` at the deserialization layer.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyArgs {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AnalyzeUsageArgs {
    timeframe: Option<String>,
    server_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuggestToolsArgs {
    task: String,
    #[allow(dead_code)]
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchExecuteArgs {
    operations: Vec<BatchOperation>,
    concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchOperation {
    tool: String,
    #[serde(default = "empty_object")]
    arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptimizeRoutingArgs {
    tool: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigureDedupArgs {
    enabled: Option<bool>,
    similarity_threshold: Option<f64>,
    auto_merge: Option<bool>,
    get_stats: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AnalyzeSimilarityArgs {
    tool1: Option<String>,
    tool2: Option<String>,
    list_similar: Option<bool>,
    tool_name: Option<String>,
}

impl MetaServer {
    /// Dispatch one meta-tool call. Always returns a well-formed result;
    /// failures become tool-level errors.
    pub(crate) async fn handle_meta_tool(
        &self,
        name: &str,
        args: Value,
        peer: &Peer<RoleServer>,
    ) -> CallToolResult {
        let outcome = match name {
            DISCOVER_SERVERS => self.discover_servers(args),
            ANALYZE_USAGE => self.analyze_usage(args),
            GET_CACHE_STATS => self.get_cache_stats(args),
            SUGGEST_TOOLS => self.suggest_tools(args),
            BATCH_EXECUTE => self.batch_execute(args).await,
            OPTIMIZE_ROUTING => self.optimize_routing(args),
            CONFIGURE_DEDUPLICATION => self.configure_deduplication(args, peer).await,
            ANALYZE_TOOL_SIMILARITY => self.analyze_tool_similarity(args),
            other => Err(MetaError::UnknownTool {
                name: other.to_string(),
            }),
        };

        match outcome {
            Ok(value) => {
                let rendered = serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|_| value.to_string());
                CallToolResult::success(vec![Content::text(rendered)])
            }
            Err(e) => error_result(e.to_string()),
        }
    }

    fn discover_servers(&self, args: Value) -> Result<Value, MetaError> {
        let _: EmptyArgs = parse_args(DISCOVER_SERVERS, args)?;

        let servers: Vec<Value> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|provider| {
                json!({
                    "id": provider.config.id,
                    "name": provider.config.name,
                    "description": provider.config.description,
                    "status": provider.status,
                    "toolCount": provider.tool_count,
                    "command": sanitize_command(&provider.config.command).join(" "),
                    "metrics": provider_summary(&self.metrics, &provider.config.id),
                })
            })
            .collect();

        Ok(json!({
            "servers": servers,
            "total": servers.len(),
        }))
    }

    fn analyze_usage(&self, args: Value) -> Result<Value, MetaError> {
        let args: AnalyzeUsageArgs = parse_args(ANALYZE_USAGE, args)?;

        let timeframe = args.timeframe.as_deref().unwrap_or("day");
        let window_hours = match timeframe {
            "hour" => 1.0,
            "day" => 24.0,
            "week" => 168.0,
            other => {
                return Err(MetaError::MetaToolUsage {
                    tool: ANALYZE_USAGE.to_string(),
                    reason: format!("unknown timeframe '{other}' (expected hour, day, or week)"),
                });
            }
        };

        let in_window = |m: &PerformanceMetrics| {
            m.last_used
                .elapsed()
                .map(|idle| idle.as_secs_f64() / 3600.0 <= window_hours)
                .unwrap_or(true)
        };
        let rows: Vec<((String, String), PerformanceMetrics)> = self
            .metrics
            .snapshot()
            .into_iter()
            .filter(|(_, m)| in_window(m))
            .collect();

        let total_calls: u64 = rows.iter().map(|(_, m)| m.total_calls).sum();
        let total_failures: u64 = rows.iter().map(|(_, m)| m.failure_count).sum();

        let detail = if let Some(server_id) = &args.server_id {
            if !self.registry.contains(server_id) {
                return Err(MetaError::MetaToolUsage {
                    tool: ANALYZE_USAGE.to_string(),
                    reason: format!("unknown serverId '{server_id}'"),
                });
            }
            let tools: Vec<Value> = rows
                .iter()
                .filter(|((pid, _), _)| pid == server_id)
                .map(|((_, tool), m)| json!({ "tool": tool, "metrics": metrics_json(m) }))
                .collect();
            json!({ "serverId": server_id, "tools": tools })
        } else {
            let mut per_provider: Vec<Value> = Vec::new();
            for id in self.registry.provider_ids() {
                let provider_rows: Vec<&PerformanceMetrics> = rows
                    .iter()
                    .filter(|((pid, _), _)| *pid == id)
                    .map(|(_, m)| m)
                    .collect();
                if provider_rows.is_empty() {
                    continue;
                }
                per_provider.push(json!({
                    "serverId": id,
                    "summary": aggregate_metrics(&provider_rows),
                }));
            }
            json!({ "servers": per_provider })
        };

        Ok(json!({
            "timeframe": timeframe,
            "totalCalls": total_calls,
            "totalFailures": total_failures,
            "cacheStats": to_json(ANALYZE_USAGE, &self.cache.stats())?,
            "usage": detail,
        }))
    }

    fn get_cache_stats(&self, args: Value) -> Result<Value, MetaError> {
        let _: EmptyArgs = parse_args(GET_CACHE_STATS, args)?;
        to_json(GET_CACHE_STATS, &self.cache.stats())
    }

    fn suggest_tools(&self, args: Value) -> Result<Value, MetaError> {
        let args: SuggestToolsArgs = parse_args(SUGGEST_TOOLS, args)?;

        let mut scored: Vec<(NamespacedTool, f64)> = self
            .inventory
            .namespaced_snapshot()
            .into_iter()
            .filter(|tool| self.registry.is_connected(&tool.provider_id))
            .map(|tool| {
                let metrics = self.metrics.get(&tool.provider_id, &tool.spec.name);
                let score = relevance_score(
                    &args.task,
                    &tool.qualified_name,
                    tool.spec.description.as_deref().unwrap_or(""),
                    metrics.as_ref(),
                );
                (tool, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let suggestions: Vec<Value> = scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(tool, score)| {
                json!({
                    "tool": tool.qualified_name,
                    "providerId": tool.provider_id,
                    "relevanceScore": score,
                    "description": tool.spec.description.as_deref().unwrap_or(""),
                })
            })
            .collect();

        Ok(json!({ "task": args.task, "suggestions": suggestions }))
    }

    async fn batch_execute(&self, args: Value) -> Result<Value, MetaError> {
        let args: BatchExecuteArgs = parse_args(BATCH_EXECUTE, args)?;

        let concurrency = args.concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY);
        if concurrency == 0 || concurrency > MAX_BATCH_CONCURRENCY {
            return Err(MetaError::MetaToolUsage {
                tool: BATCH_EXECUTE.to_string(),
                reason: format!(
                    "concurrency must be between 1 and {MAX_BATCH_CONCURRENCY}, got {concurrency}"
                ),
            });
        }

        let operations: Vec<(usize, BatchOperation)> =
            args.operations.into_iter().enumerate().collect();
        let results = run_in_waves(operations, concurrency, |(index, op)| async move {
            if is_meta_tool(&op.tool) {
                return json!({
                    "index": index,
                    "tool": op.tool,
                    "status": "error",
                    "error": "meta-tools cannot be batched",
                });
            }

            let result = self.dispatch_tool_call(&op.tool, op.arguments).await;
            let failed = result.is_error.unwrap_or(false);
            let rendered =
                serde_json::to_value(&result).unwrap_or_else(|_| json!("unrenderable result"));
            json!({
                "index": index,
                "tool": op.tool,
                "status": if failed { "error" } else { "ok" },
                "result": rendered,
            })
        })
        .await;

        Ok(json!({ "count": results.len(), "results": results }))
    }

    fn optimize_routing(&self, args: Value) -> Result<Value, MetaError> {
        let args: OptimizeRoutingArgs = parse_args(OPTIMIZE_ROUTING, args)?;

        let mut warnings: Vec<Value> = Vec::new();
        for ((provider_id, tool_name), m) in self.metrics.snapshot() {
            if let Some(filter) = &args.tool {
                if tool_name != *filter {
                    continue;
                }
            }

            let mut issues = Vec::new();
            if m.success_rate < WARN_SUCCESS_RATE {
                issues.push(format!("low success rate {:.2}", m.success_rate));
            }
            if m.avg_response_time_ms > WARN_RESPONSE_TIME_MS {
                issues.push(format!("slow responses ({:.0} ms avg)", m.avg_response_time_ms));
            }
            if issues.is_empty() {
                continue;
            }

            warnings.push(json!({
                "providerId": provider_id,
                "tool": tool_name,
                "issues": issues,
                "metrics": metrics_json(&m),
            }));
        }

        Ok(json!({
            "healthy": warnings.is_empty(),
            "warnings": warnings,
            "cacheStats": to_json(OPTIMIZE_ROUTING, &self.cache.stats())?,
        }))
    }

    async fn configure_deduplication(
        &self,
        args: Value,
        peer: &Peer<RoleServer>,
    ) -> Result<Value, MetaError> {
        let args: ConfigureDedupArgs = parse_args(CONFIGURE_DEDUPLICATION, args)?;

        if let Some(threshold) = args.similarity_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(MetaError::MetaToolUsage {
                    tool: CONFIGURE_DEDUPLICATION.to_string(),
                    reason: format!("similarityThreshold must be in [0, 1], got {threshold}"),
                });
            }
        }

        let before = self.inventory.update_dedup(|config| {
            if let Some(enabled) = args.enabled {
                config.enabled = enabled;
            }
            if let Some(threshold) = args.similarity_threshold {
                config.similarity_threshold = threshold;
            }
            if let Some(auto_merge) = args.auto_merge {
                config.auto_merge = auto_merge;
            }
        });

        let toggled = args.enabled.is_some_and(|enabled| enabled != before.enabled);
        if toggled {
            self.rebuild_inventory();
            if let Err(e) = peer.notify_tool_list_changed().await {
                log::warn!("failed to notify tool list change: {e}");
            }
        }

        let mut response = json!({
            "config": to_json(CONFIGURE_DEDUPLICATION, &self.inventory.dedup_config())?,
            "rebuilt": toggled,
        });
        if args.get_stats.unwrap_or(false) {
            response["stats"] = to_json(CONFIGURE_DEDUPLICATION, &self.inventory.stats())?;
            response["toolCounts"] = json!({
                "namespaced": self.inventory.namespaced_count(),
                "merged": self.inventory.merged_count(),
                "metaTools": META_TOOL_NAMES.len(),
            });
        }
        Ok(response)
    }

    fn analyze_tool_similarity(&self, args: Value) -> Result<Value, MetaError> {
        let args: AnalyzeSimilarityArgs = parse_args(ANALYZE_TOOL_SIMILARITY, args)?;
        let config = self.inventory.dedup_config();

        if args.list_similar.unwrap_or(false) {
            let Some(target_name) = &args.tool_name else {
                return Err(MetaError::MetaToolUsage {
                    tool: ANALYZE_TOOL_SIMILARITY.to_string(),
                    reason: "listSimilar requires toolName".into(),
                });
            };
            let target = self.lookup_tool(target_name)?;

            let mut similar: Vec<Value> = self
                .inventory
                .namespaced_snapshot()
                .into_iter()
                .filter(|other| other.qualified_name != target.qualified_name)
                .filter_map(|other| {
                    let verdict = pair_similarity(&config, &target.spec, &other.spec);
                    (verdict.score > 0.5).then(|| {
                        json!({
                            "tool": other.qualified_name,
                            "score": verdict.score,
                            "reason": verdict.reason,
                            "strategy": verdict.strategy,
                        })
                    })
                })
                .collect();
            similar.sort_by(|a, b| {
                let score = |v: &Value| v["score"].as_f64().unwrap_or(0.0);
                score(b).partial_cmp(&score(a)).unwrap_or(std::cmp::Ordering::Equal)
            });

            return Ok(json!({ "target": target.qualified_name, "similar": similar }));
        }

        let (Some(name1), Some(name2)) = (&args.tool1, &args.tool2) else {
            return Err(MetaError::MetaToolUsage {
                tool: ANALYZE_TOOL_SIMILARITY.to_string(),
                reason: "provide either tool1 and tool2, or listSimilar with toolName".into(),
            });
        };

        let first = self.lookup_tool(name1)?;
        let second = self.lookup_tool(name2)?;
        let verdict = pair_similarity(&config, &first.spec, &second.spec);

        Ok(json!({
            "tool1": first.qualified_name,
            "tool2": second.qualified_name,
            "score": verdict.score,
            "reason": verdict.reason,
            "strategy": verdict.strategy,
        }))
    }

    fn lookup_tool(&self, name: &str) -> Result<NamespacedTool, MetaError> {
        self.inventory
            .find_tool(name)
            .ok_or_else(|| MetaError::UnknownTool {
                name: name.to_string(),
            })
    }
}

/// Relevance of one tool to a free-form task description.
///
/// Name containment counts 0.5, task-word overlap with the description up
/// to 0.3, and observed performance up to 0.3; the sum is clipped to 1.
pub(crate) fn relevance_score(
    task: &str,
    qualified_name: &str,
    description: &str,
    metrics: Option<&PerformanceMetrics>,
) -> f64 {
    let task = task.to_lowercase();
    let name = qualified_name.to_lowercase();
    let description = description.to_lowercase();

    let mut score = 0.0;
    if name.contains(&task) || task.contains(&name) {
        score += 0.5;
    }

    let task_words: HashSet<&str> = task.split_whitespace().collect();
    if !task_words.is_empty() {
        let description_words: HashSet<&str> = description.split_whitespace().collect();
        let overlap = task_words.intersection(&description_words).count();
        score += 0.3 * overlap as f64 / task_words.len() as f64;
    }

    if let Some(m) = metrics {
        let response_score = (1.0 - m.avg_response_time_ms / 10_000.0).max(0.0);
        score += 0.2 * m.success_rate + 0.1 * response_score;
    }

    score.min(1.0)
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, MetaError> {
    serde_json::from_value(args).map_err(|e| MetaError::MetaToolUsage {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn to_json<T: serde::Serialize>(tool: &str, value: &T) -> Result<Value, MetaError> {
    serde_json::to_value(value).map_err(|e| MetaError::MetaToolUsage {
        tool: tool.to_string(),
        reason: format!("failed to render response: {e}"),
    })
}

fn metrics_json(m: &PerformanceMetrics) -> Value {
    json!({
        "totalCalls": m.total_calls,
        "failureCount": m.failure_count,
        "successRate": m.success_rate,
        "avgResponseTimeMs": m.avg_response_time_ms,
        "lastUsed": rfc3339(m.last_used),
    })
}

/// Aggregate one provider's per-tool rows into a single summary.
fn aggregate_metrics(rows: &[&PerformanceMetrics]) -> Value {
    let total_calls: u64 = rows.iter().map(|m| m.total_calls).sum();
    let failures: u64 = rows.iter().map(|m| m.failure_count).sum();
    let success_rate = if total_calls == 0 {
        1.0
    } else {
        (total_calls - failures) as f64 / total_calls as f64
    };
    let avg_response = if total_calls == 0 {
        0.0
    } else {
        rows.iter()
            .map(|m| m.avg_response_time_ms * m.total_calls as f64)
            .sum::<f64>()
            / total_calls as f64
    };
    let last_used = rows.iter().map(|m| m.last_used).max();

    json!({
        "totalCalls": total_calls,
        "failureCount": failures,
        "successRate": success_rate,
        "avgResponseTimeMs": avg_response,
        "lastUsed": last_used.map(rfc3339),
        "toolsTracked": rows.len(),
    })
}

fn provider_summary(metrics: &MetricsStore, provider_id: &str) -> Value {
    let rows: Vec<PerformanceMetrics> = metrics
        .snapshot()
        .into_iter()
        .filter(|((pid, _), _)| pid == provider_id)
        .map(|(_, m)| m)
        .collect();
    let refs: Vec<&PerformanceMetrics> = rows.iter().collect();
    aggregate_metrics(&refs)
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_eight_meta_tools() {
        let defs = meta_tool_definitions();
        assert_eq!(defs.len(), 8);
        let names: Vec<&str> = defs.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, META_TOOL_NAMES);
        for name in META_TOOL_NAMES {
            assert!(is_meta_tool(name));
        }
        assert!(!is_meta_tool("file_read"));
    }

    #[test]
    fn every_schema_closes_additional_properties() {
        for def in meta_tool_definitions() {
            assert_eq!(
                def.input_schema.get("additionalProperties"),
                Some(&Value::Bool(false)),
                "{} must declare additionalProperties: false",
                def.name
            );
        }
    }

    #[test]
    fn relevance_rewards_name_containment() {
        let with_name = relevance_score("read file", "fs:read_file", "", None);
        let without = relevance_score("send mail", "fs:read_file", "", None);
        assert!(with_name < 0.5 + 1e-9); // no containment either way here
        assert_eq!(without, 0.0);

        let contained = relevance_score("fs:read_file", "fs:read_file", "", None);
        assert!((contained - 0.5).abs() < 1e-9);
    }

    #[test]
    fn relevance_counts_word_overlap() {
        let score = relevance_score(
            "read a file from disk",
            "fs:open",
            "read any file on local disk",
            None,
        );
        // "read", "file", and "disk" appear in the description; no name containment.
        assert!((score - 0.3 * 3.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn relevance_includes_metrics_and_clips() {
        let mut m = PerformanceMetrics::default();
        m.total_calls = 10;
        m.success_rate = 1.0;
        m.avg_response_time_ms = 0.0;

        let score = relevance_score(
            "fs:read_file",
            "fs:read_file",
            "fs:read_file does everything fs:read_file",
            Some(&m),
        );
        assert!(score <= 1.0);
        // 0.5 name + 0.3 overlap-part + 0.2 + 0.1 would exceed 1 without the clip.
        let unclipped = relevance_score("fs:read_file", "fs:read_file", "", Some(&m));
        assert!((unclipped - 0.8).abs() < 1e-9);
    }

    #[test]
    fn batch_arguments_default_to_empty_object() {
        let args: BatchExecuteArgs = serde_json::from_value(json!({
            "operations": [{"tool": "fs:read_file"}]
        }))
        .unwrap();
        assert_eq!(args.operations[0].arguments, json!({}));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<AnalyzeUsageArgs, _> =
            serde_json::from_value(json!({"timeframe": "day", "bogus": 1}));
        assert!(result.is_err());

        let result: Result<EmptyArgs, _> = serde_json::from_value(json!({"x": 1}));
        assert!(result.is_err());
    }
}
