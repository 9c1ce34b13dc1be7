//! chatinterface: terminal chat client.
//!
//! Logs in against a chat server, keeps the credential in the local secret
//! store, and runs an interactive chat session over the server's socket.

mod commands;
mod config;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

/// chatinterface: chat from the terminal
#[derive(Parser)]
#[command(name = "chatinterface", version, about = "Terminal chat client")]
struct Cli {
    /// Server URL (defaults to the last login)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and save the credential
    Login {
        /// Account name (prompted when omitted)
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Open an interactive chat session
    Chat {
        /// Conversation to open on start
        peer: Option<String>,
    },

    /// Show the account behind the saved credential
    Whoami,

    /// Forget the saved credential
    Logout,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                "chatinterface=debug,chatinterface_cli=debug,chatinterface_client=debug,chatinterface_core=debug",
            )
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("chatinterface=warn,chatinterface_cli=warn")
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    // Both reqwest and tokio-tungstenite use rustls; pin one provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("crypto provider already installed");
    }

    let config_path = cli.config.clone().unwrap_or_else(config::Config::default_path);
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("chatinterface: {e:#}; using defaults");
            config::Config::default()
        }
    };

    let server = cli.server.as_deref();
    let result = match cli.command {
        Command::Login { username } => {
            commands::login::run(server, username.as_deref(), &cfg).await
        }
        Command::Chat { peer } => {
            commands::chat::run(server, peer.as_deref(), &cfg).await
        }
        Command::Whoami => commands::whoami::run(server, &cfg).await,
        Command::Logout => commands::logout::run(server).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("chatinterface: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chatinterface",
            "chat",
            "alice",
            "--server",
            "https://chat.example.com",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.server.as_deref(), Some("https://chat.example.com"));
        assert!(matches!(cli.command, Command::Chat { peer: Some(ref p) } if p == "alice"));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["chatinterface"]).is_err());
    }
}
