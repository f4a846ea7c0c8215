//! Operator commands for the listening side.
//!
//! The operator types `#`-prefixed commands on stdin. [`AdminCommand::parse`]
//! turns a line into a command and [`Dispatcher`] carries it out against the
//! peer registry.

use std::{io, sync::Arc};

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    config::RelayConfig,
    console::{Console, Tag},
    escape,
    peer::PeerId,
    registry::PeerRegistry,
};

pub const AVAILABLE_COMMANDS: &str = "Available commands: #send, #broadcast, #list, #help, #quit";

const HELP: &[&str] = &[
    "Server mode commands:",
    "  #send <clientIP> <message>: Send a message to a specific client",
    "  #broadcast <message>: Send a message to all connected clients",
    "  #list: Show all connected clients",
    "  #help: Show this help message",
    "  #help program: Show full program usage",
    "  #quit, #exit: Shut down the server",
    "",
    "Escape sequences in messages:",
    r"  \r   CR (0x0D)",
    r"  \n   LF (0x0A)",
    r"  \t   TAB (0x09)",
    r"  \\   Backslash (0x5C)",
    r"  \xHH Arbitrary byte (e.g. \x1B for ESC)",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Send { peer: PeerId, text: String },
    Broadcast { text: String },
    List,
    Help { program: bool },
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: #send <clientIP> <message>")]
    SendUsage,
    #[error("Usage: #broadcast <message>")]
    BroadcastUsage,
    #[error("Unknown command: {0}")]
    Unknown(String),
}

impl AdminCommand {
    /// Parses one operator line. Blank lines yield `Ok(None)`.
    ///
    /// Message text is kept as typed apart from the whitespace separating it
    /// from the preceding argument; escape sequences are decoded later, when
    /// the message is sent.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']).trim_start();
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (keyword, rest) = split_word(line);
        let command = match keyword.to_ascii_lowercase().as_str() {
            "#send" => {
                let (peer, text) = split_word(rest);
                if peer.is_empty() || text.is_empty() {
                    return Err(CommandError::SendUsage);
                }
                AdminCommand::Send {
                    peer: PeerId::from(peer),
                    text: text.to_string(),
                }
            }
            "#broadcast" => {
                if rest.is_empty() {
                    return Err(CommandError::BroadcastUsage);
                }
                AdminCommand::Broadcast {
                    text: rest.to_string(),
                }
            }
            "#list" => AdminCommand::List,
            "#help" => AdminCommand::Help {
                program: rest.trim().eq_ignore_ascii_case("program"),
            },
            "#quit" | "#exit" => AdminCommand::Quit,
            _ => return Err(CommandError::Unknown(keyword.to_string())),
        };
        Ok(Some(command))
    }
}

/// Splits off the first whitespace-delimited word; the remainder has its
/// leading whitespace removed.
fn split_word(input: &str) -> (&str, &str) {
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim_start()),
        None => (input, ""),
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Client not found: {0}")]
    NotFound(PeerId),
    #[error("Send error [{peer}]: {source}")]
    Write {
        peer: PeerId,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a broadcast. Failures are per peer; they never stop delivery
/// to the others.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: Vec<PeerId>,
    pub failed: Vec<(PeerId, io::Error)>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes operator commands against the registry.
pub struct Dispatcher {
    registry: Arc<PeerRegistry>,
    config: RelayConfig,
    console: Console,
    program_usage: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<PeerRegistry>, config: RelayConfig, console: Console) -> Self {
        Self {
            registry,
            config,
            console,
            program_usage: String::new(),
        }
    }

    /// Text shown for `#help program`.
    pub fn with_program_usage(mut self, usage: impl Into<String>) -> Self {
        self.program_usage = usage.into();
        self
    }

    /// Reads operator lines until `#quit`/`#exit` or the end of input.
    pub async fn run(&self, mut input: mpsc::Receiver<String>) {
        self.console.prompt();
        while let Some(line) = input.recv().await {
            if self.handle_line(&line).await == Flow::Quit {
                return;
            }
        }
        self.console.line("Operator input closed, shutting down server...");
    }

    pub async fn handle_line(&self, line: &str) -> Flow {
        match AdminCommand::parse(line) {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => {
                self.console.prompt();
                Flow::Continue
            }
            Err(err @ CommandError::Unknown(_)) => {
                self.console.block([err.to_string(), AVAILABLE_COMMANDS.to_string()]);
                Flow::Continue
            }
            Err(err) => {
                self.console.line(err);
                Flow::Continue
            }
        }
    }

    pub async fn execute(&self, command: AdminCommand) -> Flow {
        match command {
            AdminCommand::Send { peer, text } => {
                if let Err(err) = self.send(&peer, &text).await {
                    self.console.line(err);
                }
            }
            AdminCommand::Broadcast { text } => {
                let report = self.broadcast(&text).await;
                self.console.line(format_args!(
                    "Broadcast completed: sent to {} clients",
                    report.delivered_count()
                ));
            }
            AdminCommand::List => self.list(),
            AdminCommand::Help { program: true } => self.console.line(&self.program_usage),
            AdminCommand::Help { program: false } => self.console.block(HELP),
            AdminCommand::Quit => {
                self.console.line("Shutting down server...");
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    /// Sends `text` (escape sequences decoded, delimiter appended) to one peer.
    pub async fn send(&self, peer: &PeerId, text: &str) -> Result<(), SendError> {
        let handle = self
            .registry
            .lookup(peer)
            .ok_or_else(|| SendError::NotFound(peer.clone()))?;

        let wire = self.config.frame(&escape::decode(text));
        handle.send(&wire).await.map_err(|source| SendError::Write {
            peer: peer.clone(),
            source,
        })?;
        self.console.sent(Tag::Peer(peer), text, &wire);
        Ok(())
    }

    /// Sends `text` to every peer registered when the broadcast starts.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let wire = self.config.frame(&escape::decode(text));
        let peers = self.registry.snapshot();

        let results = join_all(peers.into_iter().map(|(peer, handle)| {
            let wire = &wire;
            async move {
                let result = handle.send(wire).await;
                (peer, result)
            }
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (peer, result) in results {
            match result {
                Ok(()) => {
                    self.console.sent(Tag::Peer(&peer), text, &wire);
                    report.delivered.push(peer);
                }
                Err(err) => {
                    self.console.line(format_args!("Send error [{peer}]: {err}"));
                    report.failed.push((peer, err));
                }
            }
        }
        report
    }

    fn list(&self) {
        let ids = self.registry.ids();
        let mut lines = vec!["Connected clients:".to_string()];
        if ids.is_empty() {
            lines.push("  No clients connected".to_string());
        } else {
            lines.extend(ids.iter().map(|id| format!("  {id}")));
            lines.push(format!("Total: {} clients", ids.len()));
        }
        self.console.block(lines);
    }
}
