//! Error types for the meta-server core.

use thiserror::Error;

/// Errors raised by the aggregation and routing core.
///
/// None of these ever escape the upstream request handler as a protocol
/// failure: the dispatcher translates every variant into a tool-level error
/// result before answering the client.
#[derive(Debug, Error)]
pub enum MetaError {
    /// A provider config is malformed or failed command validation.
    /// The provider is dropped; never fatal to the process.
    #[error("invalid provider config '{id}': {reason}")]
    Config { id: String, reason: String },

    /// The provider exists but has no live session.
    #[error("provider '{id}' is not connected")]
    ProviderUnavailable { id: String },

    /// No tool with this name exists in the current inventory.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// A remote tool call failed on a specific provider.
    #[error("tool '{tool}' failed on provider '{provider}': {reason}")]
    ToolInvocation {
        provider: String,
        tool: String,
        reason: String,
    },

    /// Bad arguments to one of the built-in meta-tools.
    #[error("invalid arguments for '{tool}': {reason}")]
    MetaToolUsage { tool: String, reason: String },

    /// An outbound call was canceled by shutdown. Reported to the caller
    /// but never recorded as a metric failure.
    #[error("call canceled by shutdown")]
    Shutdown,
}
