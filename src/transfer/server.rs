use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, sleep};

use crate::core::consent::{Consent, ConsentRequest, TransferKind};
use crate::core::protocol::{Command, END_SENTINEL, Reply};
use crate::network::Transport;
use crate::storage::{FileManager, validate_file_name};
use crate::utils::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotFound,
    InvalidName,
    Refused,
    /// Approved, but the file could not be opened or created.
    Unavailable,
}

/// What one inbound connection amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Listing { files: usize },
    Sent { file: String, bytes: u64 },
    Received { file: String, bytes: u64, path: PathBuf },
    Denied { file: String, reason: DenyReason },
    /// The peer closed without sending a command.
    Closed,
    Unknown(String),
}

/// Serves exactly one command per connection against the shared directory.
pub struct RequestHandler {
    files: Arc<FileManager>,
    consent: Arc<dyn Consent>,
}

impl RequestHandler {
    pub fn new(files: Arc<FileManager>, consent: Arc<dyn Consent>) -> Self {
        Self { files, consent }
    }

    /// Handle one connection, then shut down our write side so the peer
    /// sees the end of any payload.
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<Served> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let served = self.dispatch(&mut reader, &mut write_half, peer).await;

        if let Err(e) = write_half.shutdown().await {
            debug!("Shutdown of connection to {} failed: {}", peer, e);
        }
        served
    }

    pub async fn dispatch<R, W>(&self, reader: &mut R, writer: &mut W, peer: SocketAddr) -> Result<Served>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(line) = Transport::read_line(reader, None).await? else {
            return Ok(Served::Closed);
        };
        if line.trim().is_empty() {
            return Ok(Served::Closed);
        }

        match Command::parse(&line) {
            Some(Command::ListFiles) => self.send_listing(writer).await,
            Some(Command::RequestFile(name)) => self.serve_request(writer, peer, name).await,
            Some(Command::OfferFile(name)) => self.serve_offer(reader, writer, peer, name).await,
            None => Ok(Served::Unknown(line)),
        }
    }

    async fn send_listing<W>(&self, writer: &mut W) -> Result<Served>
    where
        W: AsyncWrite + Unpin,
    {
        let files = match self.files.list_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!("Listing shared directory failed: {}", e);
                Vec::new()
            }
        };
        if files.is_empty() {
            info!("No files available in {}", self.files.shared_dir().display());
        }

        for file in &files {
            Transport::write_line(writer, file, None).await?;
        }
        Transport::write_line(writer, END_SENTINEL, None).await?;

        Ok(Served::Listing { files: files.len() })
    }

    async fn serve_request<W>(&self, writer: &mut W, peer: SocketAddr, name: String) -> Result<Served>
    where
        W: AsyncWrite + Unpin,
    {
        if validate_file_name(&name).is_err() {
            return deny(writer, name, DenyReason::InvalidName).await;
        }
        if !self.files.contains(&name).await {
            return deny(writer, name, DenyReason::NotFound).await;
        }

        let decision = self
            .consent
            .decide(ConsentRequest {
                peer,
                file_name: name.clone(),
                kind: TransferKind::Request,
            })
            .await;
        if !decision.is_approved() {
            return deny(writer, name, DenyReason::Refused).await;
        }

        let mut file = match self.files.open(&name).await {
            Ok(file) => file,
            Err(e) => {
                warn!("Approved file {} became unavailable: {}", name, e);
                return deny(writer, name, DenyReason::Unavailable).await;
            }
        };

        Transport::write_line(writer, &Reply::Approve(name.clone()).to_line(), None).await?;
        let bytes = Transport::pipe(&mut file, writer, None).await?;

        Ok(Served::Sent { file: name, bytes })
    }

    async fn serve_offer<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        peer: SocketAddr,
        name: String,
    ) -> Result<Served>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if validate_file_name(&name).is_err() {
            return deny(writer, name, DenyReason::InvalidName).await;
        }

        let decision = self
            .consent
            .decide(ConsentRequest {
                peer,
                file_name: name.clone(),
                kind: TransferKind::Offer,
            })
            .await;
        if !decision.is_approved() {
            return deny(writer, name, DenyReason::Refused).await;
        }

        let (mut file, path) = match self.files.create(&name).await {
            Ok(created) => created,
            Err(e) => {
                warn!("Cannot store offered file {}: {}", name, e);
                return deny(writer, name, DenyReason::Unavailable).await;
            }
        };

        Transport::write_line(writer, &Reply::Accept(name.clone()).to_line(), None).await?;
        let bytes = Transport::pipe(reader, &mut file, None).await?;

        Ok(Served::Received {
            file: name,
            bytes,
            path,
        })
    }
}

async fn deny<W>(writer: &mut W, name: String, reason: DenyReason) -> Result<Served>
where
    W: AsyncWrite + Unpin,
{
    Transport::write_line(writer, &Reply::Deny(name.clone()).to_line(), None).await?;
    Ok(Served::Denied { file: name, reason })
}

/// Accept loop. Each connection gets its own task, so an unanswered consent
/// prompt only holds up the peer that asked.
pub struct Server {
    listener: TcpListener,
    handler: Arc<RequestHandler>,
}

impl Server {
    pub fn new(listener: TcpListener, handler: Arc<RequestHandler>) -> Self {
        Self { listener, handler }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Server listening on port {}", addr.port());
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("New connection from: {}", addr);
                    let handler = self.handler.clone();

                    tokio::spawn(async move {
                        match handler.handle(stream, addr).await {
                            Ok(served) => log_served(addr, &served),
                            Err(e) => error!("Server error handling client {}: {}", addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

fn log_served(addr: SocketAddr, served: &Served) {
    match served {
        Served::Listing { files } => info!("Sent file list ({} files) to {}", files, addr),
        Served::Sent { file, bytes } => info!("Sent file {} ({} bytes) to {}", file, bytes, addr),
        Served::Received { file, bytes, path } => info!(
            "Received file {} ({} bytes) from {}, saved to {}",
            file,
            bytes,
            addr,
            path.display()
        ),
        Served::Denied { file, reason } => match reason {
            DenyReason::NotFound => info!("File {} not found", file),
            DenyReason::InvalidName => warn!("Rejected file name {:?} from {}", file, addr),
            DenyReason::Refused => info!("Denied file {} to {}", file, addr),
            DenyReason::Unavailable => warn!("File {} unavailable for {}", file, addr),
        },
        Served::Closed => debug!("{} closed without a command", addr),
        Served::Unknown(line) => warn!("Unknown command from {}: {:?}", addr, line),
    }
}
