#![allow(dead_code)]

use replrun::config::ExecutorSettings;

/// Builder for `ExecutorSettings` to simplify test setup.
pub struct SettingsBuilder {
    node_path: String,
    node_args: Option<String>,
    stop_grace_ms: Option<u64>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            node_path: "node".to_string(),
            node_args: None,
            stop_grace_ms: None,
        }
    }

    pub fn node_path(mut self, path: &str) -> Self {
        self.node_path = path.to_string();
        self
    }

    pub fn node_args(mut self, args: &str) -> Self {
        self.node_args = Some(args.to_string());
        self
    }

    pub fn stop_grace_ms(mut self, ms: u64) -> Self {
        self.stop_grace_ms = Some(ms);
        self
    }

    pub fn build(self) -> ExecutorSettings {
        let mut settings = ExecutorSettings::new(self.node_path, self.node_args)
            .expect("Failed to build valid settings from builder");
        if let Some(ms) = self.stop_grace_ms {
            settings.stop_grace_ms = ms;
        }
        settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
