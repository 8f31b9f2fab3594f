//! Aggregated tool inventory.
//!
//! The ground truth is the namespaced map (`"<providerId>:<toolName>"` →
//! tool); on top of it sits the optional merged surface produced by the
//! deduplication engine. Rebuilds compute both maps from a snapshot of the
//! provider tool lists and swap them in atomically; in-flight calls keep
//! resolving against the snapshot they already took.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rmcp::model::Tool;

use crate::dedup::{DedupStats, DeduplicationConfig, MergedTool, cluster_tools, dedup_stats};

/// A provider tool under its globally unique qualified name.
#[derive(Debug, Clone)]
pub struct NamespacedTool {
    pub qualified_name: String,
    pub provider_id: String,
    pub spec: Tool,
}

/// Separator between provider id and tool name in qualified names.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Build the qualified name for a provider tool.
pub fn qualified_name(provider_id: &str, tool_name: &str) -> String {
    format!("{provider_id}{NAMESPACE_SEPARATOR}{tool_name}")
}

/// Split a qualified name back into `(provider_id, tool_name)`.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEPARATOR)
}

/// The aggregator's tool maps plus the deduplication configuration.
pub struct Inventory {
    dedup: RwLock<DeduplicationConfig>,
    maps: RwLock<Maps>,
}

#[derive(Default)]
struct Maps {
    namespaced: BTreeMap<String, NamespacedTool>,
    merged: BTreeMap<String, MergedTool>,
    input_count: usize,
}

impl Inventory {
    pub fn new(dedup: DeduplicationConfig) -> Self {
        Self {
            dedup: RwLock::new(dedup),
            maps: RwLock::new(Maps::default()),
        }
    }

    pub fn dedup_config(&self) -> DeduplicationConfig {
        self.dedup.read().clone()
    }

    /// Apply a change to the dedup config, returning the previous value.
    pub fn update_dedup(
        &self,
        apply: impl FnOnce(&mut DeduplicationConfig),
    ) -> DeduplicationConfig {
        let mut config = self.dedup.write();
        let before = config.clone();
        apply(&mut config);
        before
    }

    /// Rebuild both maps from a snapshot of provider tool lists.
    ///
    /// The merged surface is only published when deduplication is enabled
    /// and auto-merge is on; otherwise it stays empty and listings fall
    /// back to the namespaced surface. When two disjoint groups elect the
    /// same representative name, the first keeps it and later groups are
    /// exposed under their primary's qualified name instead.
    pub fn rebuild(&self, entries: Vec<(String, Tool)>) {
        let config = self.dedup_config();

        let mut namespaced = BTreeMap::new();
        for (provider_id, tool) in &entries {
            let qualified = qualified_name(provider_id, &tool.name);
            namespaced.insert(
                qualified.clone(),
                NamespacedTool {
                    qualified_name: qualified,
                    provider_id: provider_id.clone(),
                    spec: tool.clone(),
                },
            );
        }

        let mut merged = BTreeMap::new();
        if config.enabled && config.auto_merge {
            for mut group in cluster_tools(&config, &entries) {
                if merged.contains_key(&group.name) {
                    group.name = qualified_name(&group.primary_provider_id, &group.name);
                }
                merged.insert(group.name.clone(), group);
            }
        }

        let mut maps = self.maps.write();
        maps.namespaced = namespaced;
        maps.merged = merged;
        maps.input_count = entries.len();
    }

    pub fn get_namespaced(&self, qualified: &str) -> Option<NamespacedTool> {
        self.maps.read().namespaced.get(qualified).cloned()
    }

    pub fn get_merged(&self, name: &str) -> Option<MergedTool> {
        self.maps.read().merged.get(name).cloned()
    }

    /// Find a tool by qualified name, or by bare name across providers
    /// (first match in map order).
    pub fn find_tool(&self, name: &str) -> Option<NamespacedTool> {
        let maps = self.maps.read();
        if let Some(tool) = maps.namespaced.get(name) {
            return Some(tool.clone());
        }
        maps.namespaced
            .values()
            .find(|tool| tool.spec.name == name)
            .cloned()
    }

    pub fn namespaced_snapshot(&self) -> Vec<NamespacedTool> {
        self.maps.read().namespaced.values().cloned().collect()
    }

    pub fn merged_snapshot(&self) -> Vec<MergedTool> {
        self.maps.read().merged.values().cloned().collect()
    }

    /// Whether the merged surface is the one shown to the upstream client.
    pub fn merged_active(&self) -> bool {
        let config = self.dedup_config();
        config.enabled && config.auto_merge && !self.maps.read().merged.is_empty()
    }

    pub fn namespaced_count(&self) -> usize {
        self.maps.read().namespaced.len()
    }

    pub fn merged_count(&self) -> usize {
        self.maps.read().merged.len()
    }

    /// Statistics for the current surface, recomputed from a fresh
    /// clustering pass so they are meaningful even when auto-merge is off.
    pub fn stats(&self) -> DedupStats {
        let config = self.dedup_config();
        let entries: Vec<(String, Tool)> = self
            .namespaced_snapshot()
            .into_iter()
            .map(|tool| (tool.provider_id, tool.spec))
            .collect();
        let clustered = cluster_tools(&config, &entries);
        dedup_stats(entries.len(), &clustered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::borrow::Cow;
    use std::sync::Arc;

    fn tool(name: &str, description: &str) -> Tool {
        let schema = json!({"type": "object", "properties": {"path": {"type": "string"}}});
        let map = match schema {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        Tool {
            name: Cow::Owned(name.to_string()),
            title: None,
            description: if description.is_empty() {
                None
            } else {
                Some(Cow::Owned(description.to_string()))
            },
            input_schema: Arc::new(map),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }

    #[test]
    fn qualified_names_round_trip() {
        let q = qualified_name("fs", "read_file");
        assert_eq!(q, "fs:read_file");
        assert_eq!(split_qualified(&q), Some(("fs", "read_file")));
        assert_eq!(split_qualified("plain"), None);
    }

    #[test]
    fn rebuild_populates_namespaced_map() {
        let inventory = Inventory::new(DeduplicationConfig::default());
        inventory.rebuild(vec![
            ("a".into(), tool("read_file", "Read a file")),
            ("b".into(), tool("send_mail", "Send an email")),
        ]);

        assert_eq!(inventory.namespaced_count(), 2);
        let found = inventory.get_namespaced("a:read_file").unwrap();
        assert_eq!(found.provider_id, "a");
        assert_eq!(found.spec.name, "read_file");
    }

    #[test]
    fn identical_tools_collapse_into_merged_surface() {
        let inventory = Inventory::new(DeduplicationConfig::default());
        inventory.rebuild(vec![
            ("a".into(), tool("read_file", "Read a file")),
            ("b".into(), tool("read_file", "Read a file")),
        ]);

        assert!(inventory.merged_active());
        let merged = inventory.get_merged("read_file").unwrap();
        assert_eq!(merged.members.len(), 2);
        assert!(merged
            .members
            .iter()
            .any(|(pid, _)| *pid == merged.primary_provider_id));
    }

    #[test]
    fn disabled_dedup_publishes_no_merged_surface() {
        let inventory = Inventory::new(DeduplicationConfig {
            enabled: false,
            ..Default::default()
        });
        inventory.rebuild(vec![
            ("a".into(), tool("read_file", "")),
            ("b".into(), tool("read_file", "")),
        ]);

        assert!(!inventory.merged_active());
        assert_eq!(inventory.merged_count(), 0);
        assert_eq!(inventory.namespaced_count(), 2);
    }

    #[test]
    fn auto_merge_off_keeps_namespaced_surface() {
        let inventory = Inventory::new(DeduplicationConfig {
            auto_merge: false,
            ..Default::default()
        });
        inventory.rebuild(vec![
            ("a".into(), tool("read_file", "Read a file")),
            ("b".into(), tool("read_file", "Read a file")),
        ]);

        assert!(!inventory.merged_active());
        // Statistics still see the duplicate pair.
        let stats = inventory.stats();
        assert_eq!(stats.merged_groups, 1);
    }

    #[test]
    fn find_tool_accepts_bare_names() {
        let inventory = Inventory::new(DeduplicationConfig::default());
        inventory.rebuild(vec![("a".into(), tool("read_file", ""))]);

        assert!(inventory.find_tool("a:read_file").is_some());
        assert!(inventory.find_tool("read_file").is_some());
        assert!(inventory.find_tool("missing").is_none());
    }

    #[test]
    fn toggling_dedup_changes_the_surface() {
        let inventory = Inventory::new(DeduplicationConfig::default());
        let entries = vec![
            ("a".to_string(), tool("read_file", "Read a file")),
            ("b".to_string(), tool("read_file", "Read a file")),
        ];
        inventory.rebuild(entries.clone());
        assert!(inventory.merged_active());

        let before = inventory.update_dedup(|c| c.enabled = false);
        assert!(before.enabled);
        inventory.rebuild(entries);
        assert!(!inventory.merged_active());
    }
}
