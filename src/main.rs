//! Guestbook API - GitHub sign-in, stateless sessions, and a public guestbook

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use guestbook::{
    api::Server,
    cli::{Cli, Command, TokenCommand},
    config::Config,
    secrets::SecretCache,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Token(ref token_cmd)) => run_token_command(&cli, token_cmd).await,
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Load configuration, applying CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Run session token commands
async fn run_token_command(cli: &Cli, cmd: &TokenCommand) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    let secrets = match SecretCache::from_config(&config.secrets) {
        Ok(cache) => match cache.get().await {
            Ok(secrets) => secrets,
            Err(e) => {
                eprintln!("❌ Failed to load secrets: {e}");
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            eprintln!("❌ Invalid secrets configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cmd.run(&secrets.signing_key) {
        Ok(result) => {
            println!("{}", result.output);
            result.exit_code
        }
        Err(e) => {
            eprintln!("❌ Token command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the API server
async fn run_server(cli: Cli) -> ExitCode {
    let Some(config) = load_config(&cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        store = ?config.store.backend,
        "Starting Guestbook API"
    );

    let server = match Server::new(config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Guestbook API shutdown complete");
    ExitCode::SUCCESS
}
