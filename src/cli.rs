//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::dedup::DeduplicationConfig;

/// Meta-orchestrator for MCP tool servers.
///
/// Presents itself to an MCP client as a single stdio server while
/// aggregating every configured downstream server behind one endpoint,
/// with tool deduplication, performance-based routing, and result caching.
#[derive(Parser, Debug)]
#[command(name = "mcp-meta-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Provider configuration: a JSON file holding provider configs, or a
    /// directory scanned for `*.mcp.json` files.
    ///
    /// Configs given here take precedence over the `MCP_SERVER_CONFIG`
    /// environment variable and the platform config directories.
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log verbosity.
    #[arg(
        short = 'l',
        long,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug"],
    )]
    pub log_level: String,

    /// Expose every tool under its provider-qualified name instead of
    /// merging near-identical tools.
    #[arg(long)]
    pub disable_dedup: bool,

    /// Similarity threshold for merging near-identical tools (0..1).
    #[arg(long, value_name = "FLOAT", value_parser = parse_threshold)]
    pub sim_threshold: Option<f64>,

    /// Merge similar tools into a single exposed surface. This is the
    /// default; the flag makes it explicit in scripts.
    #[arg(long)]
    pub auto_merge: bool,
}

impl Cli {
    /// Deduplication config derived from the flags.
    pub fn dedup_config(&self) -> DeduplicationConfig {
        let mut config = DeduplicationConfig::default();
        if self.disable_dedup {
            config.enabled = false;
        }
        if let Some(threshold) = self.sim_threshold {
            config.similarity_threshold = threshold;
        }
        if self.auto_merge {
            config.auto_merge = true;
        }
        config
    }
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("threshold must be in [0, 1], got {value}"))
    }
}
