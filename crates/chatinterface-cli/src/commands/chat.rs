//! `chatinterface chat [peer]`: interactive chat session.
//!
//! Reads stdin line by line. Plain lines are sent to the open conversation;
//! lines starting with `/` are commands (`/open <peer>`, `/peers`, `/help`,
//! `/quit`).

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use chatinterface_client::{
    HttpChatApi, SessionCoordinator, SessionPhase, WebSocketConnector,
};

use crate::config::Config;
use crate::render::TerminalRenderer;

const HELP: &str = "Commands: /open <peer>, /peers, /help, /quit. Anything else is sent to the open conversation.";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Send(&'a str),
    Open(&'a str),
    Peers,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Send(line);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("open", peer) if !peer.is_empty() => Input::Open(peer),
        ("peers", "") => Input::Peers,
        ("help", "") => Input::Help,
        ("quit" | "exit", "") => Input::Quit,
        _ => Input::Unknown(trimmed),
    }
}

pub async fn run(server: Option<&str>, peer: Option<&str>, cfg: &Config) -> Result<()> {
    let store = super::secret_store()?;
    let session = super::saved_session(&store, server)?;
    let api = HttpChatApi::new(
        &session.http_origin,
        Some(&session.credential),
        cfg.request_timeout(),
    )?;

    let coordinator = SessionCoordinator::new(
        session,
        Arc::new(api),
        Arc::new(WebSocketConnector::with_timeout(cfg.request_timeout())),
        Arc::new(TerminalRenderer::stdout()),
        cfg.coordinator_config(),
    );
    coordinator
        .start()
        .await
        .context("could not start chat session")?;

    if let Some(peer) = peer {
        coordinator.select_peer(peer);
    }
    println!("{HELP}");

    let result = input_loop(&coordinator).await;
    coordinator.shutdown().await;
    result
}

async fn input_loop(coordinator: &SessionCoordinator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut phase = coordinator.subscribe_phase();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    debug!("stdin closed");
                    return Ok(());
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Send(body) => {
                        // Failures are already shown by the renderer.
                        let _ = coordinator.send_message(body).await;
                    }
                    Input::Open(peer) => coordinator.select_peer(peer),
                    Input::Peers => print_peers(coordinator).await,
                    Input::Help => println!("{HELP}"),
                    Input::Quit => return Ok(()),
                    Input::Unknown(command) => eprintln!("unknown command: {command} (try /help)"),
                }
            }
            changed = phase.changed() => {
                if changed.is_err() || *phase.borrow() == SessionPhase::Terminated {
                    bail!("chat session ended: lost connection to server");
                }
            }
        }
    }
}

async fn print_peers(coordinator: &SessionCoordinator) {
    let active = coordinator.active_peer();
    let state = coordinator.state();
    let state = state.lock().await;
    let peers = state.conversations.peers();
    if peers.is_empty() {
        println!("No conversations yet. Use /open <peer> to start one.");
        return;
    }
    for peer in peers {
        let marker = if active.as_deref() == Some(peer) { "*" } else { " " };
        println!("{marker} {peer}");
    }
}
