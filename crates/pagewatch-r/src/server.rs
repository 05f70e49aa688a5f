use futures::{SinkExt, StreamExt};
use pagewatch_engine::error::DeliveryError;
use pagewatch_engine::host::ParentChannel;
use pagewatch_engine::protocol::Envelope;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind relay: {0}")]
    Bind(#[from] std::io::Error),
}

/// One envelope addressed to a destination origin.
#[derive(Debug, Clone)]
struct Outbound {
    target_origin: String,
    text: String,
}

/// A parent channel whose parents are WebSocket peers.
///
/// Each peer is addressed by the `Origin` header it sent during the
/// handshake. An envelope posted for origin `o` reaches only peers whose
/// origin matches `o`, or every peer when `o` is `*`. Peers that sent no
/// `Origin` receive wildcard posts only.
#[derive(Clone)]
pub struct WebSocketChannel {
    port: u16,
    outbound_tx: broadcast::Sender<Outbound>,
}

impl WebSocketChannel {
    pub fn new(port: u16) -> Self {
        let (outbound_tx, _) = broadcast::channel(256);
        Self { port, outbound_tx }
    }

    /// Binds to localhost and starts accepting peers. Port 0 picks a free port;
    /// the bound address is returned.
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        info!("Relay listening on: {}", local);

        let outbound_tx = self.outbound_tx.clone();
        tokio::spawn(async move {
            info!("Relay accept loop started");
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("Accepted TCP connection from: {}", peer);
                // Subscribe before the handshake so nothing posted after the
                // peer sees its upgrade response is missed.
                let outbound_rx = outbound_tx.subscribe();
                tokio::spawn(serve_peer(stream, peer, outbound_rx));
            }
        });

        Ok(local)
    }

    /// Number of peers currently subscribed, including those mid-handshake.
    pub fn connected(&self) -> usize {
        self.outbound_tx.receiver_count()
    }
}

impl ParentChannel for WebSocketChannel {
    fn post_message(&self, envelope: &Envelope, target_origin: &str) -> Result<(), DeliveryError> {
        let text = serde_json::to_string(envelope)?;
        if self
            .outbound_tx
            .send(Outbound {
                target_origin: target_origin.to_string(),
                text,
            })
            .is_err()
        {
            debug!("No relay peers connected, dropping {}", envelope.kind);
        }
        Ok(())
    }
}

fn origin_matches(target: &str, peer: Option<&str>) -> bool {
    if target == "*" {
        return true;
    }
    peer.is_some_and(|peer| peer.trim_end_matches('/') == target.trim_end_matches('/'))
}

async fn serve_peer(
    stream: TcpStream,
    peer: SocketAddr,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) {
    let mut origin: Option<String> = None;
    let capture_origin = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        origin = req
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(resp)
    };
    let ws_stream = match accept_hdr_async(stream, capture_origin).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Error during the websocket handshake occurred: {}", e);
            return;
        }
    };

    info!(
        "New relay peer {} (origin: {})",
        peer,
        origin.as_deref().unwrap_or("none")
    );
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Ok(outbound) => {
                    if !origin_matches(&outbound.target_origin, origin.as_deref()) {
                        continue;
                    }
                    if let Err(e) = ws_sender.send(Message::Text(outbound.text)).await {
                        error!("Failed to send message to {}: {}", peer, e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Relay peer {} lagged, {} envelopes dropped", peer, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay peer {} closed", peer);
                    break;
                }
                Some(Err(e)) => {
                    error!("WebSocket error from {}: {}", peer, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
