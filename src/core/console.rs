//! Interactive command loop.
//!
//! Reads operator lines and either answers the oldest pending consent
//! prompt or runs a command through the [`Dispatcher`]. Outbound operations
//! run inline, so the loop waits for each one to finish or time out.

use log::{debug, warn};
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

use crate::core::Dispatcher;
use crate::core::consent::{Decision, PendingConsent};
use crate::transfer::{PullOutcome, PushOutcome};
use crate::utils::P2PError;

const USAGE: &str =
    "Commands: list <peer>, request <peer> <filename>, send <peer> <filename>, peers, help, exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List { peer: String },
    Request { peer: String, file: String },
    Send { peer: String, file: String },
    Peers,
    Help,
    Exit,
    Empty,
}

impl ConsoleCommand {
    /// Parse an operator line. The error is the usage text to show.
    pub fn parse(line: &str) -> std::result::Result<Self, &'static str> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first() else {
            return Ok(ConsoleCommand::Empty);
        };

        match first.to_lowercase().as_str() {
            "list" => match parts.as_slice() {
                [_, peer] => Ok(ConsoleCommand::List {
                    peer: peer.to_string(),
                }),
                _ => Err("Usage: list <peer>"),
            },
            "request" => match parts.as_slice() {
                [_, peer, file] => Ok(ConsoleCommand::Request {
                    peer: peer.to_string(),
                    file: file.to_string(),
                }),
                _ => Err("Usage: request <peer> <filename>"),
            },
            "send" => match parts.as_slice() {
                [_, peer, file] => Ok(ConsoleCommand::Send {
                    peer: peer.to_string(),
                    file: file.to_string(),
                }),
                _ => Err("Usage: send <peer> <filename>"),
            },
            "peers" => Ok(ConsoleCommand::Peers),
            "help" => Ok(ConsoleCommand::Help),
            "exit" | "quit" => Ok(ConsoleCommand::Exit),
            _ => Err(USAGE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Console {
    dispatcher: Arc<Dispatcher>,
    pending: VecDeque<PendingConsent>,
}

impl Console {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            pending: VecDeque::new(),
        }
    }

    /// Run until `exit` or until the input closes.
    pub async fn run(
        mut self,
        mut lines: mpsc::Receiver<String>,
        mut consents: mpsc::Receiver<PendingConsent>,
    ) {
        println!("{}", USAGE);
        prompt("Enter command: ");

        loop {
            tokio::select! {
                Some(pending) = consents.recv() => self.enqueue(pending),
                line = lines.recv() => match line {
                    Some(line) => {
                        if self.handle_line(&line).await == Flow::Exit {
                            println!("Shutting down...");
                            break;
                        }
                        self.reprompt();
                    }
                    None => {
                        debug!("Console input closed");
                        break;
                    }
                },
            }
        }

        for pending in self.pending.drain(..) {
            pending.answer(Decision::Denied);
        }
    }

    fn enqueue(&mut self, pending: PendingConsent) {
        if self.pending.is_empty() {
            println!();
            prompt(&pending.request.to_string());
        }
        self.pending.push_back(pending);
    }

    fn reprompt(&self) {
        match self.pending.front() {
            Some(next) => prompt(&next.request.to_string()),
            None => prompt("Enter command: "),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Answer the oldest live consent prompt with `line`, or run it as a command.
    /// A line typed while only expired prompts were queued is used up by
    /// them and never runs as a command.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let mut expired = false;
        while let Some(pending) = self.pending.pop_front() {
            if pending.is_expired() {
                println!("Request for {} from {} expired", pending.request.file_name, pending.request.peer);
                expired = true;
                continue;
            }
            let decision = Decision::from_answer(line);
            let file_name = pending.request.file_name.clone();
            if !pending.answer(decision) {
                println!("Request for {} expired before the answer arrived", file_name);
            }
            return Flow::Continue;
        }
        if expired {
            return Flow::Continue;
        }

        match ConsoleCommand::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(usage) => {
                println!("{}", usage);
                Flow::Continue
            }
        }
    }

    async fn execute(&self, command: ConsoleCommand) -> Flow {
        match command {
            ConsoleCommand::List { peer } => match self.dispatcher.list(&peer).await {
                Ok((record, files)) if files.is_empty() => {
                    println!("No files available from {} ({})", record.display_name(), record.key());
                }
                Ok((record, files)) => println!(
                    "Files available from {} ({}): {}",
                    record.display_name(),
                    record.key(),
                    files.join(", ")
                ),
                Err(e) => report(&format!("Error requesting file list from {}", peer), e),
            },
            ConsoleCommand::Request { peer, file } => {
                match self.dispatcher.request(&peer, &file).await {
                    Ok((record, PullOutcome::Received { path, bytes })) => {
                        println!(
                            "Received file {} ({} bytes) from {} ({})",
                            file,
                            bytes,
                            record.display_name(),
                            record.key()
                        );
                        println!("Saved file to: {}", path.display());
                    }
                    Ok((record, PullOutcome::Denied { .. })) => println!(
                        "Request for {} denied by {} ({})",
                        file,
                        record.display_name(),
                        record.key()
                    ),
                    Err(e) => report(&format!("Error requesting file {} from {}", file, peer), e),
                }
            }
            ConsoleCommand::Send { peer, file } => match self.dispatcher.send(&peer, &file).await {
                Ok((record, PushOutcome::Sent { bytes })) => println!(
                    "Sent file {} ({} bytes) to {} ({})",
                    file,
                    bytes,
                    record.display_name(),
                    record.key()
                ),
                Ok((record, PushOutcome::Denied { .. })) => println!(
                    "Offer for {} denied by {} ({})",
                    file,
                    record.display_name(),
                    record.key()
                ),
                Err(e) => report(&format!("Error sending file {} to {}", file, peer), e),
            },
            ConsoleCommand::Peers => {
                let peers = self.dispatcher.registry().peers().await;
                if peers.is_empty() {
                    println!("No peers discovered yet");
                }
                for record in peers {
                    println!("  {} at {}", record.display_name(), record.key());
                }
            }
            ConsoleCommand::Help => println!("{}", USAGE),
            ConsoleCommand::Exit => return Flow::Exit,
            ConsoleCommand::Empty => {}
        }
        Flow::Continue
    }
}

fn report(context: &str, error: P2PError) {
    match error {
        P2PError::PeerNotFound { .. } | P2PError::FileNotFound(_) => println!("{}", error),
        other => {
            warn!("{}: {}", context, other);
            println!("{}: {}", context, other);
        }
    }
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

/// Forward stdin lines from a dedicated thread. A blocking read there never
/// holds up runtime shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
