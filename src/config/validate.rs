// src/config/validate.rs

use crate::config::model::{ExecutorSettings, NodeSection, RawConfigFile};
use crate::errors::{ReplrunError, Result};

impl TryFrom<RawConfigFile> for ExecutorSettings {
    type Error = ReplrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_node_section(&raw.node)?;
        Ok(ExecutorSettings::new_unchecked(raw.node))
    }
}

impl ExecutorSettings {
    /// Build settings from explicit values, applying the same checks as a
    /// config file.
    pub fn new(node_path: impl Into<String>, node_args: Option<String>) -> Result<Self> {
        ExecutorSettings::try_from(RawConfigFile {
            node: NodeSection {
                path: node_path.into(),
                args: node_args,
                ..NodeSection::default()
            },
        })
    }
}

pub fn validate_node_section(node: &NodeSection) -> Result<()> {
    if node.path.trim().is_empty() {
        return Err(ReplrunError::ConfigError(
            "[node].path must not be empty".to_string(),
        ));
    }
    Ok(())
}
