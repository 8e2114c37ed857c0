// ABOUTME: Root library module for the tdlink console client
// ABOUTME: Wires configuration, logging, and the console prompt onto the core client

pub mod app;
pub mod cli;
pub mod logging;
pub mod prompt;

// Re-export the engine so the binary and tests need a single import path
pub use tdlink_core::{config, metrics, paths};
pub use tdlink_core::{Client, Config};
