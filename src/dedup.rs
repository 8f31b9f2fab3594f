//! Tool deduplication engine.
//!
//! Clusters near-identical tools exposed by different providers into merged
//! groups so the upstream client sees one tool surface instead of N copies.
//! Pair scoring blends name, description, and schema similarity with
//! configurable weights; clustering is a greedy single pass, with a cheap
//! name-based pre-grouping stage for large inventories.

use rmcp::model::Tool;
use serde::Serialize;
use serde_json::Value;

use crate::similarity::{jaro_winkler, schema_similarity};

/// Description used when no member of a merged group has one.
const MISSING_DESCRIPTION: &str = "No description available";

/// Inventories larger than this go through name pre-grouping before the
/// full greedy pass.
const LARGE_SET_THRESHOLD: usize = 100;

/// Name similarity floor for the pre-grouping stage. Pairs below this can
/// never merge in large-set mode, even with identical schemas; accepted
/// precision/performance trade-off.
const PREGROUP_NAME_THRESHOLD: f64 = 0.6;

/// Deduplication engine configuration. Weights are data, not constants;
/// callers may tune them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicationConfig {
    pub enabled: bool,
    pub similarity_threshold: f64,
    pub auto_merge: bool,
    pub name_weight: f64,
    pub description_weight: f64,
    pub schema_weight: f64,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.8,
            auto_merge: true,
            name_weight: 0.40,
            description_weight: 0.35,
            schema_weight: 0.25,
        }
    }
}

/// How a pair of tools was judged similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityStrategy {
    Name,
    Description,
    Schema,
    Hybrid,
}

/// Pairwise similarity verdict between two tools.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSimilarity {
    pub score: f64,
    pub reason: String,
    pub strategy: SimilarityStrategy,
}

/// A cluster of similar tools presented as one tool.
///
/// `members` is never empty; `primary_provider_id` always belongs to one of
/// the members. Singleton groups carry confidence 1.0.
#[derive(Debug, Clone)]
pub struct MergedTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub members: Vec<(String, Tool)>,
    pub confidence: f64,
    pub primary_provider_id: String,
}

/// Aggregate statistics over one clustering run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub total_input_tools: usize,
    pub total_output_tools: usize,
    pub merged_groups: usize,
    pub reduction_percentage: f64,
    pub avg_confidence: f64,
}

/// Score a pair of tools with the configured weights.
///
/// The reason string names every signal that fired (similar names,
/// descriptions, schemas); the strategy records which signal dominated.
/// Descriptions only count when both sides actually have one.
pub fn pair_similarity(config: &DeduplicationConfig, a: &Tool, b: &Tool) -> ToolSimilarity {
    let name_sim = jaro_winkler(&a.name, &b.name);

    let desc_a = a.description.as_deref().unwrap_or("");
    let desc_b = b.description.as_deref().unwrap_or("");
    let desc_sim = if desc_a.is_empty() || desc_b.is_empty() {
        0.0
    } else {
        jaro_winkler(desc_a, desc_b)
    };

    let schema_a = schema_value(a);
    let schema_b = schema_value(b);
    let schema_sim = schema_similarity(Some(&schema_a), Some(&schema_b));

    let score = config.name_weight * name_sim
        + config.description_weight * desc_sim
        + config.schema_weight * schema_sim;

    let mut reasons = Vec::new();
    if name_sim > 0.8 {
        reasons.push("similar names");
    }
    if desc_sim > 0.7 {
        reasons.push("similar descriptions");
    }
    if schema_sim > 0.8 {
        reasons.push("similar schemas");
    }
    let reason = if reasons.is_empty() {
        "no significant similarities".to_string()
    } else {
        reasons.join(", ")
    };

    let strategy = if name_sim > 0.9 && schema_sim > 0.8 {
        SimilarityStrategy::Name
    } else if desc_sim > 0.8 && schema_sim > 0.7 {
        SimilarityStrategy::Description
    } else if schema_sim > 0.9 {
        SimilarityStrategy::Schema
    } else {
        SimilarityStrategy::Hybrid
    };

    ToolSimilarity {
        score,
        reason,
        strategy,
    }
}

/// A tool's input schema as a plain JSON value.
pub fn schema_value(tool: &Tool) -> Value {
    Value::Object((*tool.input_schema).clone())
}

/// Cluster a flat list of `(provider_id, tool)` entries into merged groups.
///
/// Small inputs get a direct greedy pass; large ones are first pre-grouped
/// by name similarity so the quadratic pass only runs inside each group.
pub fn cluster_tools(
    config: &DeduplicationConfig,
    entries: &[(String, Tool)],
) -> Vec<MergedTool> {
    let indices: Vec<usize> = (0..entries.len()).collect();

    if entries.len() <= LARGE_SET_THRESHOLD {
        return greedy_cluster(config, entries, &indices);
    }

    let mut merged = Vec::new();
    for group in pregroup_by_name(entries, &indices) {
        merged.extend(greedy_cluster(config, entries, &group));
    }
    merged
}

/// Statistics for a clustering run over `input_count` tools.
pub fn dedup_stats(input_count: usize, merged: &[MergedTool]) -> DedupStats {
    let output_count = merged.len();
    let merged_groups = merged.iter().filter(|m| m.members.len() > 1).count();
    let reduction_percentage = if input_count == 0 {
        0.0
    } else {
        (input_count - output_count) as f64 / input_count as f64 * 100.0
    };
    let avg_confidence = if merged.is_empty() {
        0.0
    } else {
        merged.iter().map(|m| m.confidence).sum::<f64>() / merged.len() as f64
    };

    DedupStats {
        total_input_tools: input_count,
        total_output_tools: output_count,
        merged_groups,
        reduction_percentage,
        avg_confidence,
    }
}

/// Greedy single-pass grouping: each unprocessed entry opens a group and
/// absorbs every later entry whose pair score clears the threshold.
fn greedy_cluster(
    config: &DeduplicationConfig,
    entries: &[(String, Tool)],
    indices: &[usize],
) -> Vec<MergedTool> {
    let mut processed = vec![false; indices.len()];
    let mut merged = Vec::new();

    for (pos, &i) in indices.iter().enumerate() {
        if processed[pos] {
            continue;
        }
        processed[pos] = true;

        let mut group = vec![i];
        let mut merge_scores = Vec::new();

        for (later_pos, &j) in indices.iter().enumerate().skip(pos + 1) {
            if processed[later_pos] {
                continue;
            }
            let verdict = pair_similarity(config, &entries[i].1, &entries[j].1);
            if verdict.score >= config.similarity_threshold {
                processed[later_pos] = true;
                group.push(j);
                merge_scores.push(verdict.score);
            }
        }

        merged.push(build_merged(entries, &group, &merge_scores));
    }

    merged
}

/// Cheap pre-grouping on name similarity alone.
fn pregroup_by_name(entries: &[(String, Tool)], indices: &[usize]) -> Vec<Vec<usize>> {
    let mut processed = vec![false; indices.len()];
    let mut groups = Vec::new();

    for (pos, &i) in indices.iter().enumerate() {
        if processed[pos] {
            continue;
        }
        processed[pos] = true;

        let mut group = vec![i];
        for (later_pos, &j) in indices.iter().enumerate().skip(pos + 1) {
            if processed[later_pos] {
                continue;
            }
            if jaro_winkler(&entries[i].1.name, &entries[j].1.name) >= PREGROUP_NAME_THRESHOLD {
                processed[later_pos] = true;
                group.push(j);
            }
        }
        groups.push(group);
    }

    groups
}

/// Assemble a merged tool from a group of entry indices.
///
/// The exposed name is the most frequent member name (first encountered wins
/// ties); the description is the longest non-empty one. The member with the
/// longest description is the representative: it supplies the schema and the
/// primary provider.
fn build_merged(
    entries: &[(String, Tool)],
    group: &[usize],
    merge_scores: &[f64],
) -> MergedTool {
    let members: Vec<(String, Tool)> = group
        .iter()
        .map(|&i| (entries[i].0.clone(), entries[i].1.clone()))
        .collect();

    let name = most_frequent_name(&members);

    let representative = members
        .iter()
        .enumerate()
        .max_by_key(|(idx, (_, tool))| {
            let len = tool.description.as_deref().map_or(0, str::len);
            // Stable max on ties: prefer the earliest member.
            (len, std::cmp::Reverse(*idx))
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let (primary_provider_id, rep_tool) = &members[representative];
    let description = rep_tool
        .description
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or(MISSING_DESCRIPTION)
        .to_string();

    let confidence = if members.len() == 1 || merge_scores.is_empty() {
        1.0
    } else {
        merge_scores.iter().sum::<f64>() / merge_scores.len() as f64
    };

    MergedTool {
        name,
        description,
        input_schema: schema_value(rep_tool),
        primary_provider_id: primary_provider_id.clone(),
        members: members.clone(),
        confidence,
    }
}

/// Most frequent member name, ties broken by first appearance.
fn most_frequent_name(members: &[(String, Tool)]) -> String {
    let mut best: Option<(&str, usize)> = None;
    for (_, tool) in members {
        let count = members
            .iter()
            .filter(|(_, other)| other.name == tool.name)
            .count();
        let better = match best {
            Some((_, best_count)) => count > best_count,
            None => true,
        };
        if better {
            best = Some((tool.name.as_ref(), count));
        }
    }
    best.map(|(name, _)| name.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::borrow::Cow;
    use std::sync::Arc;

    fn tool(name: &str, description: &str, schema: Value) -> Tool {
        let schema_map = match schema {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Tool {
            name: Cow::Owned(name.to_string()),
            title: None,
            description: if description.is_empty() {
                None
            } else {
                Some(Cow::Owned(description.to_string()))
            },
            input_schema: Arc::new(schema_map),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }

    fn path_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }

    #[test]
    fn default_weights_keep_lookalike_names_apart() {
        // Name similarity is high and schemas are identical, but with empty
        // descriptions the weighted score stays below the 0.8 threshold.
        let config = DeduplicationConfig::default();
        let a = tool("list_files", "", path_schema());
        let b = tool("listFiles", "", path_schema());

        let verdict = pair_similarity(&config, &a, &b);
        assert!(verdict.score < config.similarity_threshold, "got {}", verdict.score);

        let entries = vec![("A".to_string(), a), ("B".to_string(), b)];
        let merged = cluster_tools(&config, &entries);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn lowered_threshold_merges_lookalikes() {
        let config = DeduplicationConfig {
            similarity_threshold: 0.5,
            ..Default::default()
        };
        let entries = vec![
            ("A".to_string(), tool("list_files", "", path_schema())),
            ("B".to_string(), tool("listFiles", "", path_schema())),
        ];

        let merged = cluster_tools(&config, &entries);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].members.len(), 2);
        // Tied name frequencies: first encountered wins.
        assert_eq!(merged[0].name, "list_files");
        assert_eq!(merged[0].description, MISSING_DESCRIPTION);
    }

    #[test]
    fn identical_tools_merge_with_full_confidence_signal() {
        let config = DeduplicationConfig::default();
        let entries = vec![
            ("A".to_string(), tool("read_file", "Read a file", path_schema())),
            ("B".to_string(), tool("read_file", "Read a file", path_schema())),
        ];

        let merged = cluster_tools(&config, &entries);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].confidence > 0.99);
    }

    #[test]
    fn singleton_groups_have_confidence_one() {
        let config = DeduplicationConfig::default();
        let entries = vec![(
            "A".to_string(),
            tool("fetch_url", "Fetch a URL", json!({"properties": {"url": {"type": "string"}}})),
        )];

        let merged = cluster_tools(&config, &entries);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].confidence, 1.0);
        assert_eq!(merged[0].primary_provider_id, "A");
    }

    #[test]
    fn primary_provider_is_always_a_member() {
        let config = DeduplicationConfig::default();
        let entries = vec![
            ("A".to_string(), tool("read_file", "short", path_schema())),
            ("B".to_string(), tool("read_file", "a much longer description", path_schema())),
        ];

        let merged = cluster_tools(&config, &entries);
        for m in &merged {
            assert!(!m.members.is_empty());
            assert!(m.members.iter().any(|(pid, _)| *pid == m.primary_provider_id));
        }
        // Longest description wins representative selection.
        assert_eq!(merged[0].primary_provider_id, "B");
        assert_eq!(merged[0].description, "a much longer description");
    }

    #[test]
    fn dedup_is_idempotent_over_its_own_output() {
        let config = DeduplicationConfig::default();
        let entries = vec![
            ("A".to_string(), tool("read_file", "Read a file from disk", path_schema())),
            ("B".to_string(), tool("read_file", "Read a file from disk", path_schema())),
            ("C".to_string(), tool("send_mail", "Send an email", json!({"properties": {"to": {"type": "string"}}}))),
        ];

        let first = cluster_tools(&config, &entries);
        // Re-feed the merged output as singleton entries.
        let refed: Vec<(String, Tool)> = first
            .iter()
            .map(|m| {
                (
                    m.primary_provider_id.clone(),
                    tool(&m.name, &m.description, m.input_schema.clone()),
                )
            })
            .collect();
        let second = cluster_tools(&config, &refed);

        let mut names_first: Vec<&str> = first.iter().map(|m| m.name.as_str()).collect();
        let mut names_second: Vec<&str> = second.iter().map(|m| m.name.as_str()).collect();
        names_first.sort_unstable();
        names_second.sort_unstable();
        assert_eq!(names_first, names_second);
    }

    #[test]
    fn reason_lists_fired_signals() {
        let config = DeduplicationConfig::default();
        let a = tool("read_file", "Read a file from disk", path_schema());
        let b = tool("read_file", "Read a file from disk", path_schema());
        let verdict = pair_similarity(&config, &a, &b);
        assert_eq!(
            verdict.reason,
            "similar names, similar descriptions, similar schemas"
        );
        assert_eq!(verdict.strategy, SimilarityStrategy::Name);

        let c = tool("alpha", "", json!({"properties": {"x": {"type": "number"}}}));
        let d = tool("zzzz", "", json!({"properties": {"y": {"type": "string"}}}));
        let verdict = pair_similarity(&config, &c, &d);
        assert_eq!(verdict.reason, "no significant similarities");
        assert_eq!(verdict.strategy, SimilarityStrategy::Hybrid);
    }

    #[test]
    fn schema_only_match_uses_schema_strategy() {
        let config = DeduplicationConfig::default();
        let a = tool("alpha", "", path_schema());
        let b = tool("omega", "", path_schema());
        let verdict = pair_similarity(&config, &a, &b);
        assert_eq!(verdict.strategy, SimilarityStrategy::Schema);
    }

    #[test]
    fn stats_report_reduction() {
        let config = DeduplicationConfig::default();
        let entries = vec![
            ("A".to_string(), tool("read_file", "Read a file", path_schema())),
            ("B".to_string(), tool("read_file", "Read a file", path_schema())),
            ("C".to_string(), tool("send_mail", "Send an email", json!({"properties": {"to": {"type": "string"}}}))),
        ];
        let merged = cluster_tools(&config, &entries);
        let stats = dedup_stats(entries.len(), &merged);

        assert_eq!(stats.total_input_tools, 3);
        assert_eq!(stats.total_output_tools, 2);
        assert_eq!(stats.merged_groups, 1);
        assert!((stats.reduction_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn large_sets_still_merge_within_name_groups() {
        let config = DeduplicationConfig::default();
        let mut entries = Vec::new();
        for i in 0..120 {
            entries.push((
                format!("P{i}"),
                tool(&format!("unique_tool_{i}"), "", json!({"properties": {}})),
            ));
        }
        entries.push(("X".to_string(), tool("read_file", "Read a file", path_schema())));
        entries.push(("Y".to_string(), tool("read_file", "Read a file", path_schema())));

        let merged = cluster_tools(&config, &entries);
        let read = merged.iter().find(|m| m.name == "read_file").expect("merged read_file");
        assert_eq!(read.members.len(), 2);
    }
}
