//! Connection lifecycle: one websocket channel to the backend, rebuilt with
//! bounded exponential backoff, plus a same-shape HTTP fallback for sends
//! while the channel is down.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::wire::{Inbound, Outbound};

/// Transitions are owned exclusively by the connection task; everyone else
/// observes them through the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Channel is down; sends go over the HTTP fallback until reconnect.
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub ws_url: Url,
    pub http_url: Url,
    /// First reconnect delay; doubles per consecutive failure.
    pub backoff_base: Duration,
    /// Ceiling for the reconnect delay.
    pub backoff_cap: Duration,
}

/// An outbound frame paired with its delivery acknowledgement. The ack fires
/// only after the frame was written to the socket; dropping it fails the
/// pending send.
type Frame = (String, oneshot::Sender<()>);

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("channel went away before the message was delivered")]
    ChannelClosed,
    #[error("http fallback request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http fallback returned status {0}")]
    Status(u16),
}

/// Handle to the background connection task. Dropping it tears the task
/// down via the cancellation token.
pub struct Connection {
    config: ConnectionConfig,
    session_id: String,
    state_rx: watch::Receiver<ConnectionState>,
    outbound_tx: mpsc::UnboundedSender<Frame>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    nudge: Arc<Notify>,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl Connection {
    /// Spawn the connection task. Inbound messages from either transport are
    /// delivered on the returned receiver in transport order.
    pub fn spawn(
        config: ConnectionConfig,
        session_id: String,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let nudge = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        tokio::spawn(run_loop(
            config.clone(),
            state_tx,
            inbound_tx.clone(),
            outbound_rx,
            nudge.clone(),
            cancel.clone(),
        ));

        let conn = Self {
            config,
            session_id,
            state_rx,
            outbound_tx,
            inbound_tx,
            nudge,
            http: reqwest::Client::new(),
            cancel,
        };
        (conn, inbound_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Request an immediate reconnect attempt, independent of the backoff
    /// timer. Wired to terminal focus-gain.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Transmit a message. Over the channel when it is open; otherwise a
    /// same-shape HTTP POST whose response body is delivered as an inbound
    /// message. Fallback failures never mutate the connection state.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        let envelope = Outbound {
            message: text.to_string(),
            session_id: self.session_id.clone(),
        };

        if self.state() == ConnectionState::Connected {
            let frame = serde_json::to_string(&envelope)?;
            let (ack_tx, ack_rx) = oneshot::channel();
            self.outbound_tx
                .send((frame, ack_tx))
                .map_err(|_| SendError::ChannelClosed)?;
            // Resolves once the frame hit the socket; fails if the channel
            // died first, so a send never silently vanishes.
            return ack_rx.await.map_err(|_| SendError::ChannelClosed);
        }

        debug!(url = %self.config.http_url, "channel down, sending over http fallback");
        let response = self
            .http
            .post(self.config.http_url.clone())
            .json(&envelope)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SendError::Status(response.status().as_u16()));
        }
        let inbound: Inbound = response.json().await?;
        let _ = self.inbound_tx.send(inbound);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    config: ConnectionConfig,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
    nudge: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut backoff = config.backoff_base;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        state_tx.send_replace(ConnectionState::Connecting);
        match connect_async(config.ws_url.as_str()).await {
            Ok((socket, _response)) => {
                info!(url = %config.ws_url, "channel open");
                state_tx.send_replace(ConnectionState::Connected);
                backoff = config.backoff_base;
                pump_socket(socket, &inbound_tx, &mut outbound_rx, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
                warn!(url = %config.ws_url, "channel closed");
            }
            Err(err) => {
                warn!(url = %config.ws_url, error = %err, "failed to open channel");
            }
        }
        state_tx.send_replace(ConnectionState::Disconnected);
        // Anything still queued missed the socket; fail the pending sends
        // now instead of leaving them hanging until the next connect.
        fail_pending(&mut outbound_rx);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
            _ = nudge.notified() => {
                debug!("reconnect nudge");
            }
        }
        backoff = (backoff * 2).min(config.backoff_cap);
    }
}

/// Drive one open socket until it closes or the task is cancelled.
async fn pump_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    inbound_tx: &mpsc::UnboundedSender<Inbound>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    cancel: &CancellationToken,
) {
    // Frames queued while the channel was down cannot be delivered on this
    // socket; failing their acks turns them into send errors instead of
    // silent losses. The client never replays a frame on its own.
    fail_pending(outbound_rx);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.close().await;
                return;
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some((frame, ack)) => {
                        match sink.send(WsMessage::Text(frame)).await {
                            Ok(()) => {
                                let _ = ack.send(());
                            }
                            Err(err) => {
                                warn!(error = %err, "channel send failed");
                                // Dropping the ack fails the pending send.
                                return;
                            }
                        }
                    }
                    None => return,
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<Inbound>(&text) {
                            Ok(inbound) => {
                                let _ = inbound_tx.send(inbound);
                            }
                            Err(err) => {
                                warn!(error = %err, "ignoring malformed inbound frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "channel read failed");
                        return;
                    }
                }
            }
        }
    }
}

/// Fail every queued send by dropping its ack.
fn fail_pending(outbound_rx: &mut mpsc::UnboundedReceiver<Frame>) {
    while outbound_rx.try_recv().is_ok() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    // A frame that can no longer reach the socket must fail its ack so the
    // caller sees a send error rather than a silent loss.
    #[tokio::test]
    async fn undeliverable_frame_fails_its_ack() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            drop(socket);
        });

        let (socket, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        server.await.unwrap();

        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        outbound_tx
            .send(("{\"message\":\"x\"}".to_string(), ack_tx))
            .unwrap();

        let cancel = CancellationToken::new();
        pump_socket(socket, &inbound_tx, &mut outbound_rx, &cancel).await;

        assert!(ack_rx.await.is_err());
    }
}
