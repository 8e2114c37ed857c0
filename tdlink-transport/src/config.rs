// ABOUTME: Transport section of the configuration file.
// ABOUTME: Holds the backend type plus a free-form table handed to the factory.

use serde::{Deserialize, Serialize};

/// Transport configuration with type discriminator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport type: "process", "mock"
    #[serde(rename = "type", default = "default_transport_type")]
    pub transport_type: String,

    /// Remaining fields passed to the transport factory
    #[serde(flatten)]
    pub config: toml::Table,
}

fn default_transport_type() -> String {
    "process".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport_type: default_transport_type(),
            config: toml::Table::new(),
        }
    }
}

impl TransportConfig {
    /// Get transport type name
    pub fn transport_type(&self) -> &str {
        &self.transport_type
    }

    /// Convert config table to serde_json::Value for the registry
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| serde_json::json!({}))
    }
}
