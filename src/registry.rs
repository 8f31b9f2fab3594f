//! Downstream provider lifecycle.
//!
//! Each provider is an MCP server spawned as a child process and driven
//! through an rmcp client over its stdio. The registry owns every session:
//! registration validates the command, connection performs the handshake and
//! tool listing, and disconnected providers keep their entry (with no
//! session) so accumulated metrics stay meaningful.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use rmcp::{
    RoleClient, ServiceExt,
    model::Tool,
    service::RunningService,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{ProviderConfig, sanitize_command, validate_command};
use crate::error::MetaError;
use crate::metrics::MetricsStore;

/// Live client session to one downstream server.
pub type ProviderClient = RunningService<RoleClient, ()>;

/// Metric row recorded when a provider fails its connection handshake.
pub const HANDSHAKE_TOOL: &str = "initialize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// One registered downstream server.
pub struct Provider {
    pub config: ProviderConfig,
    pub status: ProviderStatus,
    pub tools: Vec<Tool>,
    client: Option<Arc<ProviderClient>>,
}

/// Read-only view of a provider for introspection tools.
#[derive(Debug, Clone)]
pub struct ProviderSummary {
    pub config: ProviderConfig,
    pub status: ProviderStatus,
    pub tool_count: usize,
}

/// Registry of every configured provider, connected or not.
pub struct ProviderRegistry {
    providers: DashMap<String, Provider>,
    /// Registration order, for deterministic listings.
    order: RwLock<Vec<String>>,
    metrics: Arc<MetricsStore>,
    shutdown: CancellationToken,
}

impl ProviderRegistry {
    pub fn new(metrics: Arc<MetricsStore>, shutdown: CancellationToken) -> Self {
        Self {
            providers: DashMap::new(),
            order: RwLock::new(Vec::new()),
            metrics,
            shutdown,
        }
    }

    /// Register a provider config without connecting it yet.
    ///
    /// Rejects duplicate ids and configs that fail command validation.
    pub fn register(&self, config: ProviderConfig) -> Result<(), MetaError> {
        validate_command(&config)?;

        if self.providers.contains_key(&config.id) {
            return Err(MetaError::Config {
                id: config.id.clone(),
                reason: "duplicate provider id".into(),
            });
        }

        let id = config.id.clone();
        self.providers.insert(
            id.clone(),
            Provider {
                config,
                status: ProviderStatus::Connecting,
                tools: Vec::new(),
                client: None,
            },
        );
        self.order.write().push(id);
        Ok(())
    }

    /// Connect every registered provider concurrently. Individual failures
    /// are logged and recorded; none aborts startup.
    pub async fn connect_all(&self) {
        let ids = self.ordered_ids();
        join_all(ids.iter().map(|id| self.connect(id))).await;
    }

    /// Connect one provider: spawn the child, perform the MCP handshake,
    /// and fetch its tool list.
    pub async fn connect(&self, id: &str) {
        let Some(config) = self.providers.get(id).map(|p| p.config.clone()) else {
            return;
        };

        let started = Instant::now();
        match spawn_client(&config).await {
            Ok((client, tools)) => {
                log::info!(
                    "provider '{}' connected with {} tool(s)",
                    id,
                    tools.len()
                );
                if let Some(mut provider) = self.providers.get_mut(id) {
                    provider.status = ProviderStatus::Connected;
                    provider.tools = tools;
                    provider.client = Some(Arc::new(client));
                }
            }
            Err(e) => {
                log::warn!("provider '{id}' failed to connect: {e}");
                if let Some(mut provider) = self.providers.get_mut(id) {
                    provider.status = ProviderStatus::Disconnected;
                    provider.client = None;
                }
                let elapsed = started.elapsed().as_millis() as u64;
                self.metrics.record(id, HANDSHAKE_TOOL, false, elapsed);
            }
        }
    }

    /// The live session for a connected provider.
    pub fn client(&self, id: &str) -> Option<Arc<ProviderClient>> {
        self.providers.get(id).and_then(|provider| {
            (provider.status == ProviderStatus::Connected)
                .then(|| provider.client.clone())
                .flatten()
        })
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.providers
            .get(id)
            .is_some_and(|p| p.status == ProviderStatus::Connected)
    }

    /// Drop a provider's session after a transport failure. The entry stays
    /// registered so its metrics survive.
    pub fn mark_disconnected(&self, id: &str) {
        if let Some(mut provider) = self.providers.get_mut(id) {
            if provider.status != ProviderStatus::Disconnected {
                log::warn!("provider '{id}' marked disconnected");
            }
            provider.status = ProviderStatus::Disconnected;
            provider.client = None;
        }
    }

    /// Every provider's `(id, tool)` entries in registration order, the raw
    /// material for the aggregated inventory.
    pub fn tool_entries(&self) -> Vec<(String, Tool)> {
        let mut entries = Vec::new();
        for id in self.ordered_ids() {
            if let Some(provider) = self.providers.get(&id) {
                for tool in &provider.tools {
                    entries.push((id.clone(), tool.clone()));
                }
            }
        }
        entries
    }

    /// Ordered snapshot of all providers for introspection.
    pub fn snapshot(&self) -> Vec<ProviderSummary> {
        self.ordered_ids()
            .into_iter()
            .filter_map(|id| {
                self.providers.get(&id).map(|provider| ProviderSummary {
                    config: provider.config.clone(),
                    status: provider.status,
                    tool_count: provider.tools.len(),
                })
            })
            .collect()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.ordered_ids()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Cancel in-flight work and close every live session. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let ids = self.ordered_ids();
        for id in ids {
            let client = self
                .providers
                .get_mut(&id)
                .and_then(|mut provider| provider.client.take());
            let Some(client) = client else { continue };

            match Arc::try_unwrap(client) {
                Ok(client) => {
                    if let Err(e) = client.cancel().await {
                        log::warn!("error closing session to '{id}': {e}");
                    }
                }
                Err(_) => {
                    log::warn!("session to '{id}' still in use at shutdown; dropping handle");
                }
            }
            if let Some(mut provider) = self.providers.get_mut(&id) {
                provider.status = ProviderStatus::Disconnected;
            }
        }
    }

    fn ordered_ids(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Insert an already-connected provider. Test seam: production code
    /// always goes through `register` + `connect`.
    #[doc(hidden)]
    pub fn insert_connected(&self, config: ProviderConfig, tools: Vec<Tool>) {
        let id = config.id.clone();
        self.providers.insert(
            id.clone(),
            Provider {
                config,
                status: ProviderStatus::Connected,
                tools,
                client: None,
            },
        );
        self.order.write().push(id);
    }
}

/// Spawn the provider's child process and run the MCP handshake over its
/// stdio, returning the session and the advertised tools.
async fn spawn_client(config: &ProviderConfig) -> Result<(ProviderClient, Vec<Tool>), MetaError> {
    let command = sanitize_command(&config.command);

    let transport = TokioChildProcess::new(
        tokio::process::Command::new(&command[0]).configure(|cmd| {
            cmd.args(&command[1..])
                .stderr(std::process::Stdio::inherit());
        }),
    )
    .map_err(|e| MetaError::Config {
        id: config.id.clone(),
        reason: format!("failed to spawn child process: {e}"),
    })?;

    let client = ().serve(transport).await.map_err(|e| MetaError::ToolInvocation {
        provider: config.id.clone(),
        tool: HANDSHAKE_TOOL.to_string(),
        reason: format!("initialize failed: {e}"),
    })?;

    let tools = client
        .peer()
        .list_all_tools()
        .await
        .map_err(|e| MetaError::ToolInvocation {
            provider: config.id.clone(),
            tool: "tools/list".to_string(),
            reason: e.to_string(),
        })?;

    Ok((client, tools))
}
