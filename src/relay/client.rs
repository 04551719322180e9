// Client side of the relay protocol

use crate::relay::event::Event;
use crate::relay::protocol::{from_line, to_line, Request, Response};
use crate::relay::session::SessionId;
use anyhow::{Context, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Client-side buffer for incoming events
const EVENT_BUFFER: usize = 1000;

/// An `error` frame returned by the server
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

/// Connection parameters for a relay server
#[derive(Debug, Clone)]
pub struct RelayClient {
    addr: String,
}

impl RelayClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn open(&self) -> Result<(BufReader<OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf)> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("Failed to connect to {}", self.addr))?;
        let (read_half, write_half) = stream.into_split();
        Ok((BufReader::new(read_half), write_half))
    }

    /// One request, one response, on a fresh connection
    async fn call(&self, request: &Request) -> Result<Response> {
        let (mut reader, mut writer) = self.open().await?;
        writer
            .write_all(&to_line(request)?)
            .await
            .context("Failed to send request")?;
        read_response(&mut reader).await
    }

    /// Obtain a session id for `name`
    pub async fn authorize(&self, name: &str) -> Result<SessionId> {
        let response = self
            .call(&Request::Authorize {
                name: name.to_string(),
            })
            .await?;

        match response {
            Response::Authorized { session_id } => {
                SessionId::from_hex(&session_id).context("Server returned a malformed session id")
            }
            other => Err(unexpected(other)),
        }
    }

    /// Relay `message` to `target`. Returns whether it was delivered.
    pub async fn say(&self, source: &str, target: &str, message: &str) -> Result<bool> {
        let response = self
            .call(&Request::Say {
                source_name: source.to_string(),
                target_name: target.to_string(),
                message: message.to_string(),
            })
            .await?;

        match response {
            Response::Ack { delivered } => Ok(delivered),
            other => Err(unexpected(other)),
        }
    }

    /// Open the event stream for a session
    pub async fn connect(&self, session_id: SessionId) -> Result<EventStream> {
        let (mut reader, mut writer) = self.open().await?;
        writer
            .write_all(&to_line(&Request::Connect {
                session_id: session_id.to_hex(),
            })?)
            .await
            .context("Failed to send connect request")?;

        match read_response(&mut reader).await? {
            Response::Connected => {}
            other => return Err(unexpected(other)),
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(async move {
            // holding the write half keeps the stream open
            let _writer = writer;
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Event stream read failed: {}", e);
                        break;
                    }
                }

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match from_line::<Response>(trimmed) {
                    Ok(Response::Event { event }) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(other) => tracing::warn!("Unexpected frame on event stream: {:?}", other),
                    Err(e) => tracing::warn!("Failed to parse event frame: {}", e),
                }
            }
        });

        Ok(EventStream { rx, task })
    }
}

async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> Result<Response> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .context("Failed to read response")?;
    if n == 0 {
        anyhow::bail!("Server closed the connection");
    }
    from_line(line.trim()).context("Failed to parse response")
}

fn unexpected(response: Response) -> anyhow::Error {
    match response {
        Response::Error { kind, message } => RemoteError { kind, message }.into(),
        other => anyhow::anyhow!("Unexpected response: {:?}", other),
    }
}

/// Events arriving on a connected session.
///
/// Dropping the stream closes the connection, which ends the session.
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Next event, or `None` once the server closed the stream
    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
