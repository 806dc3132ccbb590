//! Chat Client - interactive entry point
//!
//! Loads configuration, connects to the chat server, and runs the command loop
//! until `/quit`, end of input, or Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use chat_client::cli::{Cli, Commands, ConfigSubcommand};
use chat_client::commands::{CommandDispatcher, CommandOutcome};
use chat_client::config::{self, ClientConfig};
use chat_client::console::{Console, ConsoleHandle, StdoutConsole};
use chat_client::error::{Error, Result};
use chat_client::events::EventRouter;
use chat_client::logging;
use chat_client::state::ConnectionState;
use chat_client::supervisor::{
    HeartbeatSupervisor, ReconnectOutcome, ReconnectionManager, Shutdown, StatsReporter,
};
use chat_client::transport::WsTransport;
use chat_client::version;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        Commands::Run { .. } => {}
    }

    let Commands::Run {
        config,
        username,
        host,
        port,
    } = cli.command
    else {
        return Ok(());
    };

    let config = match load_run_config(config.as_deref(), username, host, port) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(&e),
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting chat client"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("chat-client")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    let result = runtime.block_on(run_client(config));
    // A pending stdin read sits on a blocking thread that cannot be cancelled
    runtime.shutdown_timeout(Duration::from_millis(500));

    if let Err(e) = result {
        exit_with(&e);
    }
    Ok(())
}

fn load_run_config(
    path: Option<&str>,
    username: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(path)?;
    config.apply_cli_overrides(username, host, port)?;
    Ok(config)
}

fn exit_with(e: &Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

/// Interactive session: connect, supervise, and process commands
async fn run_client(config: ClientConfig) -> Result<()> {
    let endpoint = config.endpoint();
    info!(
        username = %config.client.username,
        server = %endpoint,
        path = %endpoint.path,
        secure = endpoint.secure,
        "Configuration loaded"
    );

    let state = Arc::new(ConnectionState::new(config.client.username.clone()));
    let console: ConsoleHandle = Arc::new(StdoutConsole);
    let router = Arc::new(EventRouter::with_default_bindings(
        state.clone(),
        console.clone(),
        config.client.greeting.clone(),
    ));
    let transport = Arc::new(WsTransport::new(config.connect_timeout()));
    let manager = Arc::new(ReconnectionManager::new(
        transport,
        router,
        endpoint.clone(),
        config.reconnect_settings(),
    ));

    console.line(&format!("Connecting to {} as {}...", endpoint, config.client.username));
    match manager.reconnect().await {
        Ok(ReconnectOutcome::Confirmed { client_id, .. }) => {
            info!(client_id = %client_id, "Session established");
        }
        Ok(ReconnectOutcome::Unconfirmed { .. }) => {
            console.line("Connected, waiting for the server to confirm the session");
        }
        Err(e) => {
            if config.reconnect.exit_on_startup_failure {
                return Err(e);
            }
            warn!(error = %e, "Starting without a connection");
            console.line(&format!("Could not connect to {}: {}", endpoint, e));
            console.line("Use /forcereconnect to try again");
        }
    }
    console.line("Type /help for a list of commands");

    let shutdown = Shutdown::new();
    let heartbeat = HeartbeatSupervisor::new(state.clone(), config.heartbeat_settings())
        .spawn(shutdown.subscribe());
    let stats = StatsReporter::new(state.clone(), config.stats_interval()).spawn(shutdown.subscribe());

    let dispatcher = CommandDispatcher::new(state.clone(), console.clone(), manager.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Command loop started");

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if dispatcher.dispatch(&line).await == CommandOutcome::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read input");
                        break;
                    }
                }
            }
        }
    }

    // Graceful shutdown
    shutdown.trigger();
    for (name, task) in [("heartbeat", heartbeat), ("stats", stats)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
    manager.shutdown().await;

    info!(stats = %state.stats(), "Chat client shutting down");
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = ClientConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match ClientConfig::load(config.as_deref()) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => exit_with(&e),
        },
    }

    Ok(())
}
