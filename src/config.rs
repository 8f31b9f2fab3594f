//! Provider configuration and command validation.
//!
//! Downstream servers are spawned as child processes, so configs coming from
//! the environment or from editor config directories are screened before
//! anything is executed: the interpreter must be on a short whitelist and no
//! argument may smuggle shell metacharacters, path traversal, or privileged
//! commands. Arguments are additionally sanitized before being handed to the
//! spawner.

use serde::{Deserialize, Serialize};

use crate::error::MetaError;

/// Configuration for one downstream MCP server.
///
/// `command[0]` is the executable, the rest are its arguments. Immutable
/// once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Interpreters allowed to host a provider process.
const COMMAND_WHITELIST: &[&str] = &[
    "node", "python", "python3", "npx", "uv", "pipx", "deno", "bun",
];

/// Shell metacharacters rejected in any command element and stripped from
/// arguments before spawning.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']',
];

/// Validate a provider command before spawning.
///
/// Rejects an empty command, an executable outside the whitelist, and any
/// element containing shell metacharacters, `..`, a `/dev/` path, an
/// `rm -` invocation, or `sudo`.
pub fn validate_command(config: &ProviderConfig) -> Result<(), MetaError> {
    let reject = |reason: String| MetaError::Config {
        id: config.id.clone(),
        reason,
    };

    if config.command.is_empty() {
        return Err(reject("command is empty".into()));
    }

    let executable = config.command[0].as_str();
    if !COMMAND_WHITELIST.contains(&executable) {
        return Err(reject(format!(
            "executable '{executable}' is not whitelisted (allowed: {})",
            COMMAND_WHITELIST.join(", ")
        )));
    }

    for element in &config.command {
        if element.contains(SHELL_METACHARACTERS) {
            return Err(reject(format!(
                "'{element}' contains shell metacharacters"
            )));
        }
        if element.contains("..") {
            return Err(reject(format!("'{element}' contains path traversal")));
        }
        if element.starts_with("/dev/") {
            return Err(reject(format!("'{element}' targets a device path")));
        }
        if contains_rm_dash(element) {
            return Err(reject(format!("'{element}' contains an rm invocation")));
        }
        if element.contains("sudo") {
            return Err(reject(format!("'{element}' contains sudo")));
        }
    }

    Ok(())
}

/// Strip shell metacharacters and `..` sequences from each argument.
///
/// Runs after [`validate_command`] as a second line of screening; a config
/// that passes validation is unchanged by this.
pub fn sanitize_command(command: &[String]) -> Vec<String> {
    command
        .iter()
        .map(|element| {
            element
                .chars()
                .filter(|c| !SHELL_METACHARACTERS.contains(c))
                .collect::<String>()
                .replace("..", "")
        })
        .collect()
}

/// Detect `rm` followed by whitespace and a dash anywhere in an element.
fn contains_rm_dash(element: &str) -> bool {
    let tokens: Vec<&str> = element.split_whitespace().collect();
    tokens
        .windows(2)
        .any(|pair| pair[0] == "rm" && pair[1].starts_with('-'))
}
