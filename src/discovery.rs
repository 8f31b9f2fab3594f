//! Provider discovery.
//!
//! Two sources, merged first-seen-wins by provider id:
//! 1. the `MCP_SERVER_CONFIG` environment variable, holding a JSON array of
//!    provider configs (parse errors are logged and ignored),
//! 2. a platform-specific set of editor config directories, scanned for
//!    `*.mcp.json` files and files named exactly `mcp-config.json`.
//!
//! Configs loaded from `--config` are injected ahead of both sources and
//! take the same first-seen-wins slot.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use crate::config::ProviderConfig;

/// Environment variable expected to contain a JSON array of provider configs.
pub const CONFIG_ENV_VAR: &str = "MCP_SERVER_CONFIG";

/// File name accepted in addition to the `*.mcp.json` suffix.
const CONFIG_FILE_NAME: &str = "mcp-config.json";

/// Editor directories holding MCP config files, relative to the platform
/// config root.
const EDITOR_SUBDIRS: &[&str] = &["Claude Desktop", "Cursor", "Code/User"];

/// Collect provider configs from every source. `cli_configs` come first,
/// then the environment variable, then the file-system scan; the first
/// config seen for an id wins.
pub fn discover_providers(cli_configs: Vec<ProviderConfig>) -> Vec<ProviderConfig> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut configs = Vec::new();

    let mut absorb = |candidates: Vec<ProviderConfig>| {
        for config in candidates {
            if seen.insert(config.id.clone()) {
                configs.push(config);
            } else {
                log::debug!("ignoring duplicate provider id '{}'", config.id);
            }
        }
    };

    absorb(cli_configs);

    if let Ok(raw) = std::env::var(CONFIG_ENV_VAR) {
        absorb(parse_env_configs(&raw));
    }

    for dir in candidate_config_dirs() {
        absorb(scan_config_dir(&dir));
    }

    configs
}

/// Parse the `MCP_SERVER_CONFIG` payload. A malformed payload yields an
/// empty list; individual malformed entries are skipped.
pub fn parse_env_configs(raw: &str) -> Vec<ProviderConfig> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("ignoring unparsable {CONFIG_ENV_VAR}: {e}");
            return Vec::new();
        }
    };

    let Value::Array(items) = value else {
        log::warn!("{CONFIG_ENV_VAR} must be a JSON array of provider configs");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match parse_config_value(item) {
            Ok(config) => Some(config),
            Err(reason) => {
                log::warn!("skipping invalid provider config in {CONFIG_ENV_VAR}: {reason}");
                None
            }
        })
        .collect()
}

/// Load configs for the `-c/--config` flag: a JSON file holding an array of
/// provider configs, or a directory scanned like the platform directories.
pub fn load_cli_configs(path: &Path) -> anyhow::Result<Vec<ProviderConfig>> {
    if path.is_dir() {
        return Ok(scan_config_dir(path));
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    let items = match value {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        _ => anyhow::bail!(
            "config file {} must hold a provider config or an array of them",
            path.display()
        ),
    };

    let mut configs = Vec::new();
    for item in items {
        let config = parse_config_value(item)
            .map_err(|reason| anyhow::anyhow!("{}: {reason}", path.display()))?;
        configs.push(config);
    }
    Ok(configs)
}

/// Scan one directory for provider config files. Missing or unreadable
/// directories degrade to an empty result.
pub fn scan_config_dir(dir: &Path) -> Vec<ProviderConfig> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut file_names: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?.to_string();
            (name.ends_with(".mcp.json") || name == CONFIG_FILE_NAME).then_some((name, path))
        })
        .collect();
    // Deterministic pick order for first-seen-wins.
    file_names.sort();

    let mut configs = Vec::new();
    for (name, path) in file_names {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("failed to read {}: {e}", path.display());
                continue;
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("failed to parse {name}: {e}");
                continue;
            }
        };

        let items = match value {
            Value::Array(items) => items,
            single => vec![single],
        };
        for item in items {
            match parse_config_value(item) {
                Ok(config) => {
                    log::debug!("discovered provider '{}' in {name}", config.id);
                    configs.push(config);
                }
                Err(reason) => log::warn!("skipping invalid config in {name}: {reason}"),
            }
        }
    }

    configs
}

/// Platform-specific directories to scan for config files.
fn candidate_config_dirs() -> Vec<PathBuf> {
    let root = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else {
        dirs::config_dir()
    };

    let Some(root) = root else {
        return Vec::new();
    };

    EDITOR_SUBDIRS
        .iter()
        .map(|subdir| root.join(subdir).join("mcp"))
        .collect()
}

/// Validate a raw JSON value as a provider config: string `id`, string
/// `name`, non-empty string-array `command`.
fn parse_config_value(value: Value) -> Result<ProviderConfig, String> {
    let config: ProviderConfig =
        serde_json::from_value(value).map_err(|e| e.to_string())?;

    if config.id.is_empty() {
        return Err("empty id".into());
    }
    if config.name.is_empty() {
        return Err("empty name".into());
    }
    if config.command.is_empty() {
        return Err(format!("provider '{}' has an empty command", config.id));
    }
    Ok(config)
}
