use log::{debug, info};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::core::protocol::{CHUNK_SIZE, MAX_LINE_LEN};
use crate::utils::{P2PError, Result};

pub struct Transport;

impl Transport {
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                P2PError::Timeout(format!("connecting to {} took longer than {:?}", addr, timeout))
            })?
            .map_err(|e| {
                P2PError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
            })?;

        info!("Connected to {}", addr);
        Ok(stream)
    }

    /// Read one line, without its terminator. `None` means the peer closed
    /// the connection before sending anything.
    pub async fn read_line<R>(reader: &mut R, timeout: Option<Duration>) -> Result<Option<String>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut limited = (&mut *reader).take(MAX_LINE_LEN);
        let read = with_timeout(timeout, "line read", limited.read_until(b'\n', &mut buf)).await?;

        if read == 0 {
            return Ok(None);
        }
        if read as u64 == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
            return Err(P2PError::InvalidResponse(format!(
                "line exceeds {} bytes",
                MAX_LINE_LEN
            )));
        }

        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    pub async fn write_line<W>(writer: &mut W, line: &str, timeout: Option<Duration>) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        with_timeout(timeout, "line write", async {
            writer.write_all(line.as_bytes()).await?;
            if !line.ends_with('\n') {
                writer.write_all(b"\n").await?;
            }
            writer.flush().await
        })
        .await
    }

    /// Copy `reader` into `writer` in `CHUNK_SIZE` pieces until the reader
    /// reaches end of stream. `idle_timeout` bounds every single read and write.
    pub async fn pipe<R, W>(reader: &mut R, writer: &mut W, idle_timeout: Option<Duration>) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let n = with_timeout(idle_timeout, "read", reader.read(&mut buffer)).await?;
            if n == 0 {
                break;
            }
            with_timeout(idle_timeout, "write", writer.write_all(&buffer[..n])).await?;
            total += n as u64;
        }

        with_timeout(idle_timeout, "flush", writer.flush()).await?;
        debug!("Piped {} bytes", total);
        Ok(total)
    }
}

async fn with_timeout<F, T>(timeout: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| P2PError::Timeout(format!("{} took longer than {:?}", what, limit)))?
            .map_err(P2PError::from),
        None => fut.await.map_err(P2PError::from),
    }
}
