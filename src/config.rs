use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub extraction: ExtractionConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding one sub-directory per reference (branch or commit).
    pub root: String,
    /// Only files with this extension are treated as workflow documents.
    pub file_extension: String,
}

/// Pattern lists driving extraction. New URL-shaped keys or call node types
/// are added here, not in the traversal code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Parameter keys (case-insensitive) whose string values may hold URLs.
    pub url_keys: Vec<String>,
    /// Substrings of node types that invoke another workflow.
    pub call_node_types: Vec<String>,
    /// Substrings of node types that receive webhooks.
    pub webhook_node_types: Vec<String>,
    /// Parameter key fragments whose literal values are reported as secrets.
    pub secret_key_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Pair orphaned base/head entries by file and kind/path.
    pub heuristics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: "./workflows".to_string(),
            file_extension: "json".to_string(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            url_keys: strings(&["url", "webhookUrl", "path", "endpoint", "baseUrl", "apiUrl"]),
            call_node_types: strings(&["executeWorkflow", "toolWorkflow"]),
            webhook_node_types: strings(&["webhook", "formTrigger"]),
            secret_key_names: strings(&["apikey", "api_key", "token", "secret", "password"]),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { heuristics: true }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "WFMERGE_", e.g. WFMERGE_SERVER__PORT
        config = config.add_source(
            config::Environment::with_prefix("WFMERGE")
                .separator("__")
                .prefix_separator("_")
                .list_separator(",")
                .with_list_parse_key("extraction.url_keys")
                .with_list_parse_key("extraction.call_node_types")
                .with_list_parse_key("extraction.webhook_node_types")
                .with_list_parse_key("extraction.secret_key_names")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the document source root, falling back to `WORKFLOWS_DIR`
    pub fn source_root(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("WORKFLOWS_DIR") {
            return PathBuf::from(dir);
        }
        PathBuf::from(&self.source.root)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_known_url_keys() {
        let config = AppConfig::default();
        assert!(config.extraction.url_keys.iter().any(|k| k == "webhookUrl"));
        assert!(config.reconcile.heuristics);
        assert_eq!(config.server_address(), "127.0.0.1:3001");
    }
}
