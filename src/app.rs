// ABOUTME: Application wiring: transport from config, client, console login, and shutdown
// ABOUTME: Also renders the diagnostics printed by the `config` and `paths` subcommands

use crate::prompt::{ConsoleAuthenticator, ConsolePrompt};
use anyhow::{Context, Result};
use std::sync::Arc;
use tdlink_core::{paths, Client, Config, Event, EventKind};
use tdlink_transport::TransportRegistry;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

/// Build a client from configuration using the default transport registry
pub fn build_client(config: &Config) -> Result<Client> {
    let registry = TransportRegistry::default();
    let transport = registry
        .create_from_config(&config.transport)
        .with_context(|| {
            format!(
                "Failed to create '{}' transport (available: {})",
                config.transport.transport_type(),
                registry.available().join(", ")
            )
        })?;

    Ok(Client::builder(transport)
        .parameters(config.tdlib_parameters())
        .poll_timeout(config.client.poll_timeout())
        .verbosity(config.client.verbosity)
        .chat_load_limit(config.client.chat_load_limit)
        .build())
}

/// Log the events a console session cares about
pub fn attach_event_log(client: &Client) {
    client.subscribe_all(EventKind::UpdateConnectionState, |event: &Event| {
        if let Some(state) = event.field("state.@type") {
            tracing::info!(state = %state, "Connection state changed");
        }
        Ok(())
    });
    client.subscribe_all(EventKind::UpdateNewChat, |event: &Event| {
        tracing::info!(
            chat_id = ?event.field("chat.id"),
            title = ?event.field("chat.title"),
            "Chat loaded"
        );
        Ok(())
    });
    client.subscribe_all(EventKind::UpdateNewMessage, |event: &Event| {
        tracing::info!(
            chat_id = ?event.field("message.chat_id"),
            message_id = ?event.field("message.id"),
            "New message"
        );
        Ok(())
    });
    client.subscribe_all(EventKind::Error, |event: &Event| {
        tracing::warn!(
            code = ?event.field("code"),
            message = ?event.field("message"),
            "Backend returned an error"
        );
        Ok(())
    });
}

/// Run the client until Ctrl-C or the session closes
pub async fn run(config: Config) -> Result<()> {
    if let Some(addr) = config.logging.metrics_addr {
        tdlink_core::metrics::init_prometheus(addr)?;
    }

    let client = Arc::new(build_client(&config)?);
    attach_event_log(&client);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
            }
            shutdown.cancel();
        });
    }

    if config.client.console_authentication {
        let (prompt, requests) = ConsolePrompt::channel();
        prompt.watch_rejections(&client);
        client.set_prompt_handler(Arc::new(prompt));
        let authenticator = ConsoleAuthenticator::new(
            Arc::clone(&client),
            requests,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .with_phone(config.telegram.phone.clone());
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = authenticator.run(token).await {
                tracing::error!(error = %e, "Console login stopped");
            }
        });
    }

    let result = client.run(shutdown.clone()).await;
    shutdown.cancel();
    result
}

/// Resolved configuration as TOML with secrets replaced
pub fn redacted_config(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    shown.telegram.api_hash = redact(&shown.telegram.api_hash);
    shown.telegram.database_encryption_key = redact(&shown.telegram.database_encryption_key);
    shown.telegram.phone = shown.telegram.phone.as_deref().map(redact);
    toml::to_string_pretty(&shown).context("Failed to render configuration")
}

fn redact(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Directories tdlink uses, one `name: path` per line
pub fn describe_paths(config: Option<&Config>) -> String {
    let mut lines = vec![
        format!("config file: {}", paths::config_file().display()),
        format!("data dir:    {}", paths::data_dir().display()),
    ];
    match config {
        Some(config) => {
            lines.push(format!("database:    {}", config.database_dir().display()));
            lines.push(format!("files:       {}", config.files_dir().display()));
            if let Some(dir) = config.log_dir() {
                lines.push(format!("logs:        {}", dir.display()));
            }
        }
        None => {
            lines.push(format!("database:    {}", paths::database_dir().display()));
            lines.push(format!("files:       {}", paths::files_dir().display()));
        }
    }
    lines.join("\n")
}
