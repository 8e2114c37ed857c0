// ABOUTME: Main entry point for the tdlink console client
// ABOUTME: Parses the CLI, loads configuration, initializes logging, and runs the client loop

use anyhow::Result;
use clap::Parser;
use tdlink::cli::{Cli, Commands};
use tdlink::{app, logging, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\ntdlink panicked:\n{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.selected() {
        Commands::Paths => {
            let config = Config::load_from(cli.config.as_deref()).ok();
            println!("{}", app::describe_paths(config.as_ref()));
            Ok(())
        }
        Commands::Config => {
            let config = Config::load_from(cli.config.as_deref())?;
            println!("{}", app::redacted_config(&config)?);
            Ok(())
        }
        Commands::Run => {
            let config = Config::load_from(cli.config.as_deref())?;
            let _guard = logging::init(config.log_dir().as_deref())?;
            tracing::info!(
                api_id = config.telegram.api_id,
                transport = %config.transport.transport_type(),
                test_dc = config.telegram.use_test_dc,
                "Starting tdlink"
            );
            app::run(config).await
        }
    }
}
