//! Line-delimited stdio transport (spec.md §4.1, §6).
//!
//! Framing: one JSON object per newline-terminated line, the "acceptable
//! alternative" framing spec.md names — the same framing `mcp_client.rs`
//! uses for its stdio child-process transport (`BufReader::lines()` on the
//! read side, `write_all` + `\n` on the write side). Reader and writer are
//! backed by independent byte streams, so this type is generic over any
//! `AsyncRead`/`AsyncWrite` pair: a spawned child's stdout/stdin, or an
//! in-process `tokio::io::duplex` pair for tests.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use super::Cancellation;
use super::DoneSignal;
use super::Transport;
use super::TransportError;
use crate::router::Router;
use crate::types::Message;

/// Optional handle to a spawned child process the transport owns. When
/// present, `close`/`Drop` reaps it — the transport does not spawn the
/// child itself (spawning is CLI glue's job per spec.md §1), but it may be
/// constructed directly over an already-spawned child's stdio handles.
pub type OwnedChild = tokio::process::Child;

pub struct StdioTransport<W: AsyncWrite + Unpin + Send + 'static> {
    reader: Mutex<Option<Box<dyn tokio::io::AsyncRead + Unpin + Send>>>,
    writer: Mutex<W>,
    started: AtomicBool,
    done: DoneSignal,
    child: Mutex<Option<OwnedChild>>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> StdioTransport<W> {
    pub fn new<R>(reader: R, writer: W) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        StdioTransport {
            reader: Mutex::new(Some(Box::new(reader))),
            writer: Mutex::new(writer),
            started: AtomicBool::new(false),
            done: DoneSignal::new(),
            child: Mutex::new(None),
        }
    }

}

impl StdioTransport<tokio::process::ChildStdin> {
    /// Construct a transport over an already-spawned child's stdio pipes;
    /// `close` reaps the child. Spawning the child itself is left to the
    /// caller (CLI glue, per spec.md §1) — this only takes ownership of its
    /// stdio handles.
    pub fn from_child(mut child: tokio::process::Child) -> std::io::Result<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout not piped"))?;
        Ok(StdioTransport {
            reader: Mutex::new(Some(Box::new(stdout))),
            writer: Mutex::new(stdin),
            started: AtomicBool::new(false),
            done: DoneSignal::new(),
            child: Mutex::new(Some(child)),
        })
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> Transport for StdioTransport<W> {
    async fn start(
        &self,
        router: Router,
        cancellation: Cancellation,
    ) -> Result<(), TransportError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyStarted);
        }

        let reader = self
            .reader
            .lock()
            .await
            .take()
            .expect("reader taken exactly once, guarded by `started`");
        let done = self.done.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = done.wait() => break,
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if line.trim().is_empty() {
                                    continue;
                                }
                                debug!(%line, "stdio <-");
                                match serde_json::from_str(&line) {
                                    Ok(raw) => router.dispatch(raw),
                                    Err(e) => warn!(error = %e, %line, "malformed JSON on stdio"),
                                }
                            }
                            Ok(None) => break, // EOF
                            Err(e) => {
                                warn!(error = %e, "stdio read error");
                                break;
                            }
                        }
                    }
                }
            }
            router.close();
            done.fire();
        });

        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.done.is_done() {
            return Err(TransportError::Closed);
        }
        let line = message
            .to_line()
            .map_err(|e| TransportError::Other(anyhow::anyhow!("serialize frame: {e}")))?;
        let mut writer = self.writer.lock().await;
        debug!(%line, "stdio ->");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        self.done.fire();
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }

    async fn done(&self) {
        self.done.wait().await;
    }
}
