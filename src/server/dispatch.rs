//! Invocation dispatch: cache probe, sequential failover, metric updates.
//!
//! Each call resolves to a routing decision, probes the cache under the
//! primary's key, and on a miss walks the candidate chain in order. Fallback
//! attempts are strictly sequential. A candidate that answers ends the walk,
//! even when the answer is a tool-level error; only transport-level failures
//! move on to the next candidate. Shutdown aborts the walk without recording
//! a metric failure.

use std::borrow::Cow;
use std::time::Instant;

use rmcp::model::{CallToolRequestParam, CallToolResult, Content};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::cache_key;
use crate::error::MetaError;
use crate::metrics::MetricsStore;
use crate::router::{RouteCandidate, RoutingDecision, route};

use super::MetaServer;

impl MetaServer {
    /// Route and execute one provider tool call, returning a well-formed
    /// result in every case.
    pub async fn dispatch_tool_call(&self, target: &str, args: Value) -> CallToolResult {
        let decision = match route(target, &self.inventory, &self.metrics, |id| {
            self.registry.is_connected(id)
        }) {
            Ok(decision) => decision,
            Err(e) => return error_result(e.to_string()),
        };

        let primary_key = cache_key(
            &decision.primary.provider_id,
            &decision.primary.tool_name,
            &args,
        );
        if let Some(value) = self.cache.get(&primary_key) {
            match serde_json::from_value::<CallToolResult>(value) {
                Ok(result) => {
                    log::debug!("cache hit for '{target}'");
                    return result;
                }
                Err(e) => log::warn!("dropping undecodable cache entry for '{target}': {e}"),
            }
        }

        let args_object = match &args {
            Value::Object(map) => Some(map.clone()),
            _ => None,
        };

        let outcome = try_candidates(&decision, &self.metrics, &self.shutdown, |candidate| {
            let args_object = args_object.clone();
            async move { self.call_provider(candidate, args_object).await }
        })
        .await;

        match outcome {
            Ok((winner, result)) => {
                let failed = result.is_error.unwrap_or(false);
                if !failed {
                    let winner_key = cache_key(&winner.provider_id, &winner.tool_name, &args);
                    match serde_json::to_value(&result) {
                        Ok(value) => {
                            self.cache
                                .store(&winner.tool_name, &args, winner_key, value, None);
                        }
                        Err(e) => log::warn!("result for '{target}' is not cacheable: {e}"),
                    }
                }
                result
            }
            Err(e) => error_result(e.to_string()),
        }
    }

    /// Invoke one candidate's tool on its provider session.
    async fn call_provider(
        &self,
        candidate: RouteCandidate,
        args: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult, MetaError> {
        let Some(client) = self.registry.client(&candidate.provider_id) else {
            return Err(MetaError::ProviderUnavailable {
                id: candidate.provider_id.clone(),
            });
        };

        client
            .call_tool(CallToolRequestParam {
                name: Cow::Owned(candidate.tool_name.clone()),
                arguments: args,
            })
            .await
            .map_err(|e| match e {
                rmcp::ServiceError::McpError(data) => MetaError::ToolInvocation {
                    provider: candidate.provider_id.clone(),
                    tool: candidate.tool_name.clone(),
                    reason: data.message.to_string(),
                },
                other => {
                    // Anything below the protocol level means the session
                    // is gone; keep the entry but drop the dead session.
                    self.registry.mark_disconnected(&candidate.provider_id);
                    MetaError::ToolInvocation {
                        provider: candidate.provider_id.clone(),
                        tool: candidate.tool_name.clone(),
                        reason: other.to_string(),
                    }
                }
            })
    }
}

/// Walk a routing decision's candidates in order until one answers.
///
/// Every answered or failed attempt updates the metrics store; a shutdown
/// cancellation aborts immediately and records nothing. Returns the winning
/// candidate with its result, or the last failure when every candidate is
/// exhausted.
pub async fn try_candidates<F, Fut>(
    decision: &RoutingDecision,
    metrics: &MetricsStore,
    shutdown: &CancellationToken,
    mut call: F,
) -> Result<(RouteCandidate, CallToolResult), MetaError>
where
    F: FnMut(RouteCandidate) -> Fut,
    Fut: Future<Output = Result<CallToolResult, MetaError>>,
{
    let mut last_error = None;

    for candidate in decision.candidates() {
        let started = Instant::now();
        let attempt = tokio::select! {
            outcome = call(candidate.clone()) => outcome,
            _ = shutdown.cancelled() => return Err(MetaError::Shutdown),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match attempt {
            Ok(result) => {
                let failed = result.is_error.unwrap_or(false);
                metrics.record(
                    &candidate.provider_id,
                    &candidate.tool_name,
                    !failed,
                    elapsed_ms,
                );
                return Ok((candidate.clone(), result));
            }
            Err(MetaError::Shutdown) => return Err(MetaError::Shutdown),
            Err(e) => {
                log::warn!(
                    "attempt on provider '{}' failed: {e}",
                    candidate.provider_id
                );
                metrics.record(&candidate.provider_id, &candidate.tool_name, false, elapsed_ms);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(MetaError::UnknownTool {
        name: decision.primary.tool_name.clone(),
    }))
}

/// Run items through an async operation in waves of at most `concurrency`.
///
/// Operations inside one wave run concurrently; waves are strictly
/// sequential, and results come back in submission order regardless of
/// completion order within a wave.
pub async fn run_in_waves<T, R, F, Fut>(items: Vec<T>, concurrency: usize, run: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let concurrency = concurrency.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut pending = items.into_iter();

    loop {
        let wave: Vec<T> = pending.by_ref().take(concurrency).collect();
        if wave.is_empty() {
            break;
        }
        results.extend(futures::future::join_all(wave.into_iter().map(&run)).await);
    }

    results
}

/// A tool-level error result; the upstream client still receives a
/// well-formed response.
pub fn error_result(message: String) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn candidate(provider: &str) -> RouteCandidate {
        RouteCandidate {
            provider_id: provider.to_string(),
            tool_name: "read".to_string(),
        }
    }

    fn decision(primary: &str, fallbacks: &[&str]) -> RoutingDecision {
        RoutingDecision {
            primary: candidate(primary),
            fallbacks: fallbacks.iter().map(|p| candidate(p)).collect(),
            confidence: 0.5,
            reasons: vec![],
        }
    }

    fn ok_result(text: &str) -> CallToolResult {
        CallToolResult::success(vec![Content::text(text.to_string())])
    }

    #[tokio::test]
    async fn failover_moves_to_next_candidate_and_records_both() {
        let metrics = MetricsStore::new();
        let shutdown = CancellationToken::new();
        let d = decision("A", &["B"]);

        let (winner, result) = try_candidates(&d, &metrics, &shutdown, |c| async move {
            if c.provider_id == "A" {
                Err(MetaError::ToolInvocation {
                    provider: "A".into(),
                    tool: "read".into(),
                    reason: "connection reset".into(),
                })
            } else {
                Ok(ok_result("from B"))
            }
        })
        .await
        .unwrap();

        assert_eq!(winner.provider_id, "B");
        assert!(!result.is_error.unwrap_or(false));

        let a = metrics.get("A", "read").unwrap();
        assert_eq!((a.total_calls, a.failure_count), (1, 1));
        let b = metrics.get("B", "read").unwrap();
        assert_eq!((b.total_calls, b.failure_count), (1, 0));
    }

    #[tokio::test]
    async fn exhausted_candidates_surface_the_last_cause() {
        let metrics = MetricsStore::new();
        let shutdown = CancellationToken::new();
        let d = decision("A", &["B"]);

        let err = try_candidates(&d, &metrics, &shutdown, |c| async move {
            Err::<CallToolResult, _>(MetaError::ToolInvocation {
                provider: c.provider_id.clone(),
                tool: "read".into(),
                reason: format!("{} is down", c.provider_id),
            })
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("B is down"));
    }

    #[tokio::test]
    async fn answered_tool_errors_do_not_fail_over() {
        let metrics = MetricsStore::new();
        let shutdown = CancellationToken::new();
        let d = decision("A", &["B"]);
        let calls = Arc::new(Mutex::new(Vec::new()));

        let calls_seen = calls.clone();
        let (winner, result) = try_candidates(&d, &metrics, &shutdown, move |c| {
            let calls_seen = calls_seen.clone();
            async move {
                calls_seen.lock().push(c.provider_id.clone());
                Ok(CallToolResult::error(vec![Content::text("no such file")]))
            }
        })
        .await
        .unwrap();

        assert_eq!(winner.provider_id, "A");
        assert!(result.is_error.unwrap_or(false));
        assert_eq!(calls.lock().as_slice(), ["A"]);
        // Answered-but-failed still counts against the provider.
        assert_eq!(metrics.get("A", "read").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn shutdown_aborts_without_recording_metrics() {
        let metrics = MetricsStore::new();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let d = decision("A", &["B"]);

        let err = try_candidates(&d, &metrics, &shutdown, |_| async {
            std::future::pending::<Result<CallToolResult, MetaError>>().await
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MetaError::Shutdown));
        assert!(metrics.is_empty());
    }

    #[tokio::test]
    async fn waves_run_sequentially_and_preserve_submission_order() {
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let ops = vec![1, 2, 3, 4];
        let log = events.clone();
        let results = run_in_waves(ops, 2, |i| {
            let log = log.clone();
            async move {
                log.lock().push(format!("start {i}"));
                // First wave members outlive their wave-mate's start, so any
                // cross-wave overlap would reorder the start events.
                tokio::time::sleep(Duration::from_millis(if i % 2 == 1 { 40 } else { 5 })).await;
                log.lock().push(format!("end {i}"));
                i * 10
            }
        })
        .await;

        assert_eq!(results, vec![10, 20, 30, 40]);

        let events = events.lock();
        let pos = |needle: &str| events.iter().position(|e| e == needle).unwrap();
        // Wave one is o1 and o2; o3 and o4 must not start until both ended.
        assert!(pos("end 1") < pos("start 3"));
        assert!(pos("end 2") < pos("start 3"));
        assert!(pos("end 1") < pos("start 4"));
        // Results stayed in submission order even though o2 finished first.
        assert!(pos("end 2") < pos("end 1"));
    }
}
