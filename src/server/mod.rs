//! Upstream-facing MCP server.
//!
//! Presents the whole aggregate as one ordinary MCP server over stdio: the
//! eight built-in meta-tools first, then either the merged tool surface or
//! every provider tool under its qualified name. Tool calls are routed to
//! downstream providers with caching and failover.

pub mod dispatch;
pub mod meta_tools;

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    model::{
        GetPromptRequestParam, GetPromptResult, Implementation, ListPromptsResult,
        ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ReadResourceRequestParam, ReadResourceResult,
        ServerCapabilities, ServerInfo, Tool, ToolsCapability,
        CallToolRequestParam, CallToolResult,
    },
    service::RequestContext,
    transport::stdio,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::inventory::Inventory;
use crate::metrics::MetricsStore;
use crate::registry::ProviderRegistry;

/// The aggregator core: one instance per process, owning the registry,
/// metrics, cache, and inventory. Tests build a fresh one and drive it.
pub struct MetaServer {
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) metrics: Arc<MetricsStore>,
    pub(crate) cache: Arc<ResultCache>,
    pub(crate) inventory: Arc<Inventory>,
    pub(crate) shutdown: CancellationToken,
}

impl MetaServer {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        metrics: Arc<MetricsStore>,
        cache: Arc<ResultCache>,
        inventory: Arc<Inventory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            metrics,
            cache,
            inventory,
            shutdown,
        }
    }

    /// Recompute the tool inventory from the current provider tool lists.
    pub fn rebuild_inventory(&self) {
        self.inventory.rebuild(self.registry.tool_entries());
        log::info!(
            "inventory rebuilt: {} namespaced tool(s), {} merged group(s)",
            self.inventory.namespaced_count(),
            self.inventory.merged_count()
        );
    }

    /// Serve the upstream session over this process's stdio until the client
    /// disconnects or shutdown is requested.
    pub async fn serve_stdio(self) -> anyhow::Result<()> {
        let shutdown = self.shutdown.clone();

        let service = self.serve(stdio()).await.inspect_err(|e| {
            log::error!("failed to start upstream session: {e:?}");
        })?;

        tokio::select! {
            quit = service.waiting() => {
                let _ = quit?;
                log::info!("upstream client disconnected");
            }
            _ = shutdown.cancelled() => {
                log::info!("shutdown requested, closing upstream session");
            }
        }
        Ok(())
    }

    /// The provider-tool surface shown to the upstream client.
    fn provider_tool_listing(&self) -> Vec<Tool> {
        if self.inventory.merged_active() {
            self.inventory
                .merged_snapshot()
                .into_iter()
                .map(|merged| Tool {
                    name: merged.name.clone().into(),
                    title: None,
                    description: Some(merged.description.clone().into()),
                    input_schema: schema_object(&merged.input_schema),
                    output_schema: None,
                    annotations: None,
                    icons: None,
                })
                .collect()
        } else {
            self.inventory
                .namespaced_snapshot()
                .into_iter()
                .map(|tool| Tool {
                    name: tool.qualified_name.clone().into(),
                    title: None,
                    description: tool.spec.description.clone(),
                    input_schema: tool.spec.input_schema.clone(),
                    output_schema: None,
                    annotations: None,
                    icons: None,
                })
                .collect()
        }
    }
}

/// Convert a JSON value into the schema object form rmcp tools carry.
pub(crate) fn schema_object(schema: &Value) -> Arc<serde_json::Map<String, Value>> {
    match schema {
        Value::Object(map) => Arc::new(map.clone()),
        _ => Arc::new(serde_json::Map::new()),
    }
}

impl ServerHandler for MetaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                ..Default::default()
            },
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Aggregates multiple MCP tool servers behind one endpoint with \
                 deduplication, performance-based routing, and result caching. \
                 Use the discover_servers and suggest_tools meta-tools to explore \
                 what is available."
                    .to_string(),
            ),
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.to_string();
        let args = Value::Object(request.arguments.unwrap_or_default());

        if meta_tools::is_meta_tool(&name) {
            return Ok(self.handle_meta_tool(&name, args, &context.peer).await);
        }

        Ok(self.dispatch_tool_call(&name, args).await)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let mut tools = meta_tools::meta_tool_definitions();
        tools.extend(self.provider_tool_listing());

        log::debug!("listing {} tool(s) upstream", tools.len());
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn get_prompt(
        &self,
        _request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        Err(McpError::invalid_request(
            "Prompts are not supported by this server",
            None,
        ))
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult {
            prompts: vec![],
            next_cursor: None,
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult {
            resources: vec![],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        Err(McpError::invalid_request(
            "Resources are not supported by this server",
            Some(json!({ "uri": request.uri })),
        ))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult {
            resource_templates: Vec::new(),
            next_cursor: None,
        })
    }
}
