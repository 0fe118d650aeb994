//! ClamAV malware scanning over the clamd INSTREAM protocol.
//!
//! The daemon is an external collaborator; when it is unreachable the gate
//! decides fail-open vs fail-closed (see `SecurityGate`), not this client.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const INSTREAM_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    /// Signature name as reported by the daemon, e.g. `Eicar-Test-Signature`.
    Infected { signature: String },
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("clamd connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("clamd scan timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected clamd response: {0}")]
    Protocol(String),
}

/// Seam for the Security Gate; lets tests stub the daemon.
#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, buffer: &[u8]) -> Result<ScanOutcome, ScanError>;
}

/// Talks to a clamd daemon using the zINSTREAM command: length-prefixed
/// chunks terminated by a zero-length chunk, one-line reply.
pub struct ClamAvScanner {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ClamAvScanner {
    pub fn new(host: String, port: u16, timeout: Duration) -> Self {
        Self {
            host,
            port,
            timeout,
        }
    }

    async fn scan_inner(&self, buffer: &[u8]) -> Result<ScanOutcome, ScanError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        stream.write_all(b"zINSTREAM\0").await?;
        for chunk in buffer.chunks(INSTREAM_CHUNK) {
            stream.write_all(&(chunk.len() as u32).to_be_bytes()).await?;
            stream.write_all(chunk).await?;
        }
        stream.write_all(&0u32.to_be_bytes()).await?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        let reply = String::from_utf8_lossy(&reply);
        let reply = reply.trim_end_matches(['\0', '\n']).trim();
        debug!(reply, "clamd response");

        parse_clamd_reply(reply)
    }
}

#[async_trait]
impl MalwareScanner for ClamAvScanner {
    async fn scan(&self, buffer: &[u8]) -> Result<ScanOutcome, ScanError> {
        tokio::time::timeout(self.timeout, self.scan_inner(buffer))
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))?
    }
}

/// Used when scanning is disabled by configuration; every buffer passes.
pub struct DisabledScanner;

#[async_trait]
impl MalwareScanner for DisabledScanner {
    async fn scan(&self, _buffer: &[u8]) -> Result<ScanOutcome, ScanError> {
        Ok(ScanOutcome::Clean)
    }
}

fn parse_clamd_reply(reply: &str) -> Result<ScanOutcome, ScanError> {
    if reply.ends_with("OK") {
        return Ok(ScanOutcome::Clean);
    }
    if let Some(rest) = reply.strip_suffix(" FOUND") {
        let signature = rest
            .rsplit_once(": ")
            .map(|(_, sig)| sig)
            .unwrap_or(rest)
            .to_string();
        return Ok(ScanOutcome::Infected { signature });
    }
    Err(ScanError::Protocol(reply.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_reply() {
        assert_eq!(parse_clamd_reply("stream: OK").unwrap(), ScanOutcome::Clean);
    }

    #[test]
    fn test_parse_infected_reply_extracts_signature() {
        let outcome = parse_clamd_reply("stream: Eicar-Test-Signature FOUND").unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Infected {
                signature: "Eicar-Test-Signature".to_string()
            }
        );
    }

    #[test]
    fn test_parse_garbage_reply_is_protocol_error() {
        assert!(matches!(
            parse_clamd_reply("INSTREAM size limit exceeded"),
            Err(ScanError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_scanner_always_clean() {
        let outcome = DisabledScanner.scan(b"anything").await.unwrap();
        assert_eq!(outcome, ScanOutcome::Clean);
    }
}
