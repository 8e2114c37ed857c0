// ABOUTME: Registry pattern for runtime transport selection.
// ABOUTME: Backends register factories, tdlink creates by name from config.

use crate::config::TransportConfig;
use crate::traits::Transport;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function that creates a transport from config
pub type TransportFactory = Box<dyn Fn(&Value) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// Registry for runtime transport selection
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
}

impl TransportRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a transport factory by name
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// Create a transport by name with the given config
    pub fn create(&self, name: &str, config: &Value) -> Result<Arc<dyn Transport>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown transport: {}", name))?;
        factory(config)
    }

    /// List available transport names
    pub fn available(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Create a transport from a TransportConfig
    pub fn create_from_config(&self, config: &TransportConfig) -> Result<Arc<dyn Transport>> {
        self.create(config.transport_type(), &config.to_json_value())
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        use crate::backends::mock::MockTransport;
        use crate::backends::process::ProcessTransport;

        Self::new()
            .register("mock", MockTransport::factory())
            .register("process", ProcessTransport::factory())
    }
}
