// TCP front end for the relay service

use crate::relay::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::event::Event;
use crate::relay::lifecycle::{Connection, EventSink, RelayService, StreamEnd};
use crate::relay::protocol::{from_line, to_line, Request, Response};
use crate::relay::session::SessionId;
use crate::relay::stats::{spawn_reporter, ThroughputStats};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Writes events to a client as `event` frames
struct LineSink {
    writer: OwnedWriteHalf,
}

#[async_trait]
impl EventSink for LineSink {
    async fn send(&mut self, event: Event) -> Result<(), RelayError> {
        let bytes = to_line(&Response::Event { event })
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        self.writer.write_all(&bytes).await?;
        Ok(())
    }
}

/// A running relay listener
pub struct RelayServer {
    service: RelayService,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Bind `listen` and start accepting clients in the background
    pub async fn start(listen: &str, config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("Failed to bind {}", listen))?;
        let local_addr = listener.local_addr().context("Failed to read local address")?;

        let stats = Arc::new(ThroughputStats::new());
        let stats_interval = config.stats_interval();
        let service = RelayService::with_stats(config, stats.clone());
        let shutdown = CancellationToken::new();

        if let Some(every) = stats_interval {
            spawn_reporter(stats, service.registry().clone(), every, shutdown.clone());
        }

        let service_clone = service.clone();
        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::run_listener(listener, service_clone, shutdown_clone).await {
                tracing::error!("Listener error: {}", e);
            }
        });

        tracing::info!("Relay listening on {}", local_addr);

        Ok(Self {
            service,
            local_addr,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn service(&self) -> &RelayService {
        &self.service
    }

    /// Stop accepting and cancel every open connection
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn run_listener(
        listener: TcpListener,
        service: RelayService,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let service = service.clone();
                            let cancel = shutdown.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, peer, service, cancel).await {
                                    tracing::warn!("Connection from {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Listener shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Serve requests on one connection until EOF or until it turns into a stream
    async fn handle_connection(
        stream: TcpStream,
        peer: SocketAddr,
        service: RelayService,
        cancel: CancellationToken,
    ) -> Result<()> {
        let conn_id = Uuid::new_v4();
        tracing::debug!("Connection {} from {}", conn_id, peer);

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            line.clear();

            let n = tokio::select! {
                r = reader.read_line(&mut line) => r.context("Failed to read request")?,
                _ = cancel.cancelled() => return Ok(()),
            };
            if n == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: Request = match from_line(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    tracing::warn!("Failed to parse request on {}: {}", conn_id, e);
                    write_frame(&mut write_half, &Response::bad_request(e.to_string())).await?;
                    continue;
                }
            };

            let response = match request {
                Request::Authorize { name } => match service.authorize(&name).await {
                    Ok(id) => Response::Authorized {
                        session_id: id.to_hex(),
                    },
                    Err(e) => Response::error(&e),
                },
                Request::Say {
                    source_name,
                    target_name,
                    message,
                } => match service.say(&source_name, &target_name, &message).await {
                    Ok(delivery) => Response::Ack {
                        delivered: delivery.is_delivered(),
                    },
                    Err(e) => Response::error(&e),
                },
                Request::Connect { session_id } => {
                    let id = match SessionId::from_hex(&session_id) {
                        Ok(id) => id,
                        Err(e) => {
                            write_frame(
                                &mut write_half,
                                &Response::bad_request(format!("bad session id: {}", e)),
                            )
                            .await?;
                            continue;
                        }
                    };

                    match service.connect(id).await {
                        Ok(connection) => {
                            write_frame(&mut write_half, &Response::Connected).await?;
                            let end = stream_events(connection, reader, write_half, cancel).await;
                            tracing::debug!("Connection {} stream ended: {:?}", conn_id, end);
                            return Ok(());
                        }
                        Err(e) => Response::error(&e),
                    }
                }
            };

            write_frame(&mut write_half, &response).await?;
        }

        tracing::debug!("Connection {} closed", conn_id);
        Ok(())
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Response) -> Result<()> {
    let bytes = to_line(frame).context("Failed to encode response")?;
    writer
        .write_all(&bytes)
        .await
        .context("Failed to write response")
}

/// Run the stream loop for a connected client.
///
/// Client EOF cancels the stream; anything else the client sends is ignored.
async fn stream_events(
    connection: Connection,
    mut reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    cancel: CancellationToken,
) -> StreamEnd {
    let stream_cancel = cancel.child_token();

    let watcher = {
        let stream_cancel = stream_cancel.clone();
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => tracing::debug!("Ignoring input on event stream"),
                }
            }
            stream_cancel.cancel();
        })
    };

    let end = connection.run(LineSink { writer }, stream_cancel).await;
    watcher.abort();
    end
}
