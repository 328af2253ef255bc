// src/config/model.rs

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [node]
/// path = "/usr/local/bin/node"
/// args = "--no-warnings --max-old-space-size=512"
/// stop_grace_ms = 2000
/// ```
///
/// Every key is optional; a file with no `[node]` table yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub node: NodeSection,
}

/// `[node]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    /// Interpreter binary, resolved through `PATH` when not absolute.
    #[serde(default = "default_node_path")]
    pub path: String,

    /// Extra arguments, space separated, appended after the REPL bootstrap.
    #[serde(default)]
    pub args: Option<String>,

    /// How long `stop()` waits after the graceful signal before killing.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_node_path() -> String {
    "node".to_string()
}

fn default_stop_grace_ms() -> u64 {
    2000
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            path: default_node_path(),
            args: None,
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

/// Validated settings for one executor.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`) or
/// [`ExecutorSettings::new`], which applies the same checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub node_path: String,
    pub node_args: Option<String>,
    pub stop_grace_ms: u64,
}

impl ExecutorSettings {
    pub(crate) fn new_unchecked(node: NodeSection) -> Self {
        Self {
            node_path: node.path,
            node_args: node.args,
            stop_grace_ms: node.stop_grace_ms,
        }
    }

    /// Extra arguments split on spaces.
    ///
    /// Runs of spaces do not produce empty arguments, and an unset or blank
    /// string yields no arguments at all.
    pub fn extra_args(&self) -> Vec<String> {
        self.node_args
            .as_deref()
            .map(|s| {
                s.split(' ')
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stop_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::new_unchecked(NodeSection::default())
    }
}
