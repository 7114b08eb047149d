use log::{debug, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::core::protocol::{Command, Reply, is_end_of_listing};
use crate::network::Transport;
use crate::storage::{FileManager, validate_file_name};
use crate::utils::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Received { path: PathBuf, bytes: u64 },
    /// The peer said no. `reply` is the raw line, `None` if it hung up silently.
    Denied { reply: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Sent { bytes: u64 },
    Denied { reply: Option<String> },
}

/// Outbound side of the protocol. Every call opens its own connection and
/// every read and write is bounded by `io_timeout`.
#[derive(Clone)]
pub struct PeerClient {
    files: Arc<FileManager>,
    io_timeout: Duration,
}

impl PeerClient {
    pub fn new(files: Arc<FileManager>, io_timeout: Duration) -> Self {
        Self { files, io_timeout }
    }

    async fn open(&self, addr: SocketAddr, command: &Command) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        let stream = Transport::connect(addr, self.io_timeout).await?;
        let (read_half, mut write_half) = stream.into_split();
        Transport::write_line(&mut write_half, &command.to_line(), Some(self.io_timeout)).await?;
        debug!("Sent {} to {}", command, addr);
        Ok((BufReader::new(read_half), write_half))
    }

    /// Fetch the peer's file listing, in the order the peer sent it.
    pub async fn list(&self, addr: SocketAddr) -> Result<Vec<String>> {
        let (mut reader, _writer) = self.open(addr, &Command::ListFiles).await?;

        let mut files = Vec::new();
        while let Some(line) = Transport::read_line(&mut reader, Some(self.io_timeout)).await? {
            if is_end_of_listing(&line) {
                break;
            }
            if !line.is_empty() {
                files.push(line);
            }
        }

        debug!("{} listed {} files", addr, files.len());
        Ok(files)
    }

    /// Ask the peer for `name` and store it in our shared directory if approved.
    pub async fn pull(&self, addr: SocketAddr, name: &str) -> Result<PullOutcome> {
        validate_file_name(name)?;
        let (mut reader, _writer) = self
            .open(addr, &Command::RequestFile(name.to_string()))
            .await?;

        let reply = Transport::read_line(&mut reader, Some(self.io_timeout)).await?;
        if !matches!(reply.as_deref().and_then(Reply::parse), Some(Reply::Approve(_))) {
            return Ok(PullOutcome::Denied { reply });
        }

        let (mut file, path) = self.files.create(name).await?;
        let bytes = Transport::pipe(&mut reader, &mut file, Some(self.io_timeout)).await?;

        info!("Received file {} ({} bytes) from {}", name, bytes, addr);
        Ok(PullOutcome::Received { path, bytes })
    }

    /// Offer `name` from our shared directory. Fails before connecting if the
    /// file does not exist.
    pub async fn push(&self, addr: SocketAddr, name: &str) -> Result<PushOutcome> {
        let mut file = self.files.open(name).await?;
        let (mut reader, mut writer) = self
            .open(addr, &Command::OfferFile(name.to_string()))
            .await?;

        let reply = Transport::read_line(&mut reader, Some(self.io_timeout)).await?;
        if !matches!(reply.as_deref().and_then(Reply::parse), Some(Reply::Accept(_))) {
            return Ok(PushOutcome::Denied { reply });
        }

        let bytes = Transport::pipe(&mut file, &mut writer, Some(self.io_timeout)).await?;
        writer.shutdown().await?;

        // The peer closes once the file is on its disk.
        Transport::pipe(&mut reader, &mut tokio::io::sink(), Some(self.io_timeout)).await?;

        info!("Sent file {} ({} bytes) to {}", name, bytes, addr);
        Ok(PushOutcome::Sent { bytes })
    }
}
