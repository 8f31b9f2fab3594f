//! Routing decisions.
//!
//! A namespaced target names its provider explicitly, so there is nothing to
//! decide. A merged target is scored: every connected member is ranked by
//! its observed metrics and the best becomes the primary, with up to three
//! fallbacks behind it. Scores are recomputed on every call; metrics are
//! cheap and drift matters.

use crate::error::MetaError;
use crate::inventory::{Inventory, split_qualified};
use crate::metrics::MetricsStore;

/// Number of fallback providers kept behind the primary.
const MAX_FALLBACKS: usize = 3;

/// One dispatch target: a provider and the tool name it knows the call by.
/// Members of a merged group may expose the operation under different names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    pub provider_id: String,
    pub tool_name: String,
}

/// The router's verdict for one invocation.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub primary: RouteCandidate,
    pub fallbacks: Vec<RouteCandidate>,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl RoutingDecision {
    /// Primary first, then fallbacks in rank order.
    pub fn candidates(&self) -> impl Iterator<Item = &RouteCandidate> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}

/// Resolve a call target into a routing decision.
///
/// `is_connected` reports whether a provider currently has a live session;
/// disconnected providers are never candidates.
pub fn route(
    target: &str,
    inventory: &Inventory,
    metrics: &MetricsStore,
    is_connected: impl Fn(&str) -> bool,
) -> Result<RoutingDecision, MetaError> {
    if let Some((provider_id, tool_name)) = split_qualified(target) {
        let Some(tool) = inventory.get_namespaced(target) else {
            return Err(MetaError::UnknownTool {
                name: target.to_string(),
            });
        };
        if !is_connected(&tool.provider_id) {
            return Err(MetaError::ProviderUnavailable {
                id: provider_id.to_string(),
            });
        }
        return Ok(RoutingDecision {
            primary: RouteCandidate {
                provider_id: tool.provider_id,
                tool_name: tool_name.to_string(),
            },
            fallbacks: Vec::new(),
            confidence: 1.0,
            reasons: vec!["explicitly namespaced target".to_string()],
        });
    }

    let Some(merged) = inventory.get_merged(target) else {
        return Err(MetaError::UnknownTool {
            name: target.to_string(),
        });
    };

    // Keep member order through the (stable) sort so ties break by
    // insertion order of the merged group.
    let mut ranked: Vec<(RouteCandidate, f64)> = merged
        .members
        .iter()
        .filter(|(provider_id, _)| is_connected(provider_id))
        .map(|(provider_id, tool)| {
            let score = metrics.score(provider_id, &tool.name);
            (
                RouteCandidate {
                    provider_id: provider_id.clone(),
                    tool_name: tool.name.to_string(),
                },
                score,
            )
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let Some((primary, top_score)) = ranked.first().cloned() else {
        return Err(MetaError::ProviderUnavailable {
            id: merged.primary_provider_id.clone(),
        });
    };

    let fallbacks: Vec<RouteCandidate> = ranked
        .iter()
        .skip(1)
        .take(MAX_FALLBACKS)
        .map(|(candidate, _)| candidate.clone())
        .collect();

    let reasons = vec![
        format!(
            "performance score {:.3} for provider '{}'",
            top_score, primary.provider_id
        ),
        format!("{} connected candidate(s)", ranked.len()),
    ];

    Ok(RoutingDecision {
        primary,
        fallbacks,
        confidence: top_score,
        reasons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DeduplicationConfig;
    use rmcp::model::Tool;
    use serde_json::json;
    use std::borrow::Cow;
    use std::sync::Arc;

    fn tool(name: &str) -> Tool {
        let schema = json!({"type": "object", "properties": {"path": {"type": "string"}}});
        let map = match schema {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        Tool {
            name: Cow::Owned(name.to_string()),
            title: None,
            description: Some(Cow::Owned("Read a file from disk".to_string())),
            input_schema: Arc::new(map),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }

    fn merged_inventory() -> Inventory {
        let inventory = Inventory::new(DeduplicationConfig::default());
        inventory.rebuild(vec![
            ("A".to_string(), tool("read")),
            ("B".to_string(), tool("read")),
        ]);
        assert!(inventory.merged_active());
        inventory
    }

    #[test]
    fn higher_success_rate_wins_over_lower_latency() {
        let inventory = merged_inventory();
        let metrics = MetricsStore::new();
        for i in 0..10 {
            metrics.record("A", "read", i >= 2, 100);
            metrics.record("B", "read", true, 200);
        }

        let decision = route("read", &inventory, &metrics, |_| true).unwrap();
        assert_eq!(decision.primary.provider_id, "B");
        assert_eq!(decision.fallbacks.len(), 1);
        assert_eq!(decision.fallbacks[0].provider_id, "A");
        assert!((decision.confidence - 0.994).abs() < 1e-9);
    }

    #[test]
    fn unscored_members_tie_break_by_insertion_order() {
        let inventory = merged_inventory();
        let metrics = MetricsStore::new();

        let decision = route("read", &inventory, &metrics, |_| true).unwrap();
        assert_eq!(decision.primary.provider_id, "A");
        assert_eq!(decision.confidence, 0.5);
    }

    #[test]
    fn disconnected_members_are_skipped() {
        let inventory = merged_inventory();
        let metrics = MetricsStore::new();

        let decision = route("read", &inventory, &metrics, |id| id == "B").unwrap();
        assert_eq!(decision.primary.provider_id, "B");
        assert!(decision.fallbacks.is_empty());

        let err = route("read", &inventory, &metrics, |_| false).unwrap_err();
        assert!(matches!(err, MetaError::ProviderUnavailable { .. }));
    }

    #[test]
    fn namespaced_targets_never_fail_over() {
        let inventory = merged_inventory();
        let metrics = MetricsStore::new();

        let decision = route("A:read", &inventory, &metrics, |_| true).unwrap();
        assert_eq!(decision.primary.provider_id, "A");
        assert_eq!(decision.primary.tool_name, "read");
        assert!(decision.fallbacks.is_empty());

        let err = route("A:read", &inventory, &metrics, |_| false).unwrap_err();
        assert!(matches!(err, MetaError::ProviderUnavailable { .. }));
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let inventory = merged_inventory();
        let metrics = MetricsStore::new();

        assert!(matches!(
            route("nope", &inventory, &metrics, |_| true),
            Err(MetaError::UnknownTool { .. })
        ));
        assert!(matches!(
            route("A:nope", &inventory, &metrics, |_| true),
            Err(MetaError::UnknownTool { .. })
        ));
    }

    #[test]
    fn at_most_three_fallbacks() {
        let inventory = Inventory::new(DeduplicationConfig::default());
        inventory.rebuild(
            ["A", "B", "C", "D", "E", "F"]
                .iter()
                .map(|pid| (pid.to_string(), tool("read")))
                .collect(),
        );
        let metrics = MetricsStore::new();

        let decision = route("read", &inventory, &metrics, |_| true).unwrap();
        assert_eq!(decision.fallbacks.len(), 3);
    }
}
