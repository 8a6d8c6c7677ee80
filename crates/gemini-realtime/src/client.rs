use crate::error::GeminiError;
use crate::types::{Blob, ClientMessage, RealtimeInput, ServerEvent, ServerMessage, Setup};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

pub mod config;
pub mod consts;

pub use config::{Config, ConfigBuilder};

type ClientTx = mpsc::Sender<ClientMessage>;
type ServerTx = broadcast::Sender<ServerEvent>;
pub type ServerRx = broadcast::Receiver<ServerEvent>;

/// A live, acknowledged connection to the Gemini Live API.
pub struct LiveClient {
    c_tx: Option<ClientTx>,
    s_tx: ServerTx,
    shutdown: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
}

/// A cloneable, non-blocking handle for pushing realtime audio.
#[derive(Clone)]
pub struct AudioSender {
    c_tx: ClientTx,
}

impl AudioSender {
    /// Queues one audio chunk. Never waits: a full queue is reported as `Busy`.
    pub fn try_send_audio(&self, audio: Blob) -> Result<(), GeminiError> {
        self.c_tx
            .try_send(ClientMessage::RealtimeInput(RealtimeInput { audio }))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => GeminiError::Busy,
                mpsc::error::TrySendError::Closed(_) => GeminiError::Closed,
            })
    }
}

/// Connects, sends `setup`, and resolves once the server acknowledges it.
pub async fn connect(config: &Config, setup: Setup) -> Result<LiveClient> {
    let api_key = config.api_key().ok_or(GeminiError::MissingApiKey)?;
    let url = format!("{}?key={}", config.live_url(), api_key.expose_secret());
    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to Gemini Live WebSocket")?;
    tracing::info!("Connected to Gemini Live WebSocket.");

    let (mut write, mut read) = ws_stream.split();
    let (c_tx, mut c_rx) = mpsc::channel::<ClientMessage>(config.capacity());
    let (s_tx, _) = broadcast::channel::<ServerEvent>(config.capacity());
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    // Subscribe before the reader starts so the acknowledgment cannot be missed.
    let mut setup_rx = s_tx.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = c_rx.recv() => {
                    let Some(msg) = msg else { break };
                    match serde_json::to_string(&msg) {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::error!("failed to send live message: {}", e);
                                break;
                            }
                        }
                        Err(e) => tracing::error!("failed to serialize live message: {}", e),
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
        let _ = write.send(Message::Close(None)).await;
        let _ = write.close().await;
        tracing::debug!("Gemini live writer stopped.");
    });

    let reader_tx = s_tx.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!("Error reading from Gemini WebSocket: {}", e);
                    let _ = reader_tx.send(ServerEvent::Failed(e.to_string()));
                    return;
                }
            };
            // The service sends JSON in both text and binary frames.
            let payload = match message {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bin) => bin,
                Message::Close(frame) => {
                    tracing::info!("Gemini WebSocket connection closed: {:?}", frame);
                    let reason = frame.map(|f| f.reason.to_string());
                    let _ = reader_tx.send(ServerEvent::Closed { reason });
                    return;
                }
                _ => continue,
            };
            match serde_json::from_slice::<ServerMessage>(&payload) {
                Ok(msg) => {
                    if let Some(go_away) = &msg.go_away {
                        tracing::warn!("Gemini asked to disconnect, time left: {:?}", go_away.time_left);
                    }
                    if reader_tx.send(ServerEvent::Message(msg)).is_err() {
                        tracing::debug!("no subscribers for live message");
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "failed to deserialize live message: {}, text=> {:?}",
                        e,
                        String::from_utf8_lossy(&payload)
                    );
                }
            }
        }
        let _ = reader_tx.send(ServerEvent::Closed { reason: None });
    });

    let mut client = LiveClient {
        c_tx: Some(c_tx),
        s_tx,
        shutdown: Some(shutdown_tx),
        reader,
    };

    client
        .send(ClientMessage::Setup(setup))
        .await
        .context("Failed to send live setup")?;

    let acknowledged = tokio::time::timeout(config.setup_timeout(), async {
        loop {
            match setup_rx.recv().await {
                Ok(ServerEvent::Message(msg)) if msg.setup_complete.is_some() => return Ok(()),
                Ok(ServerEvent::Message(_)) => continue,
                Ok(ServerEvent::Failed(e)) => return Err(GeminiError::SetupFailed(e)),
                Ok(ServerEvent::Closed { reason }) => {
                    return Err(GeminiError::SetupFailed(
                        reason.unwrap_or_else(|| "connection closed".to_string()),
                    ));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(GeminiError::Closed),
            }
        }
    })
    .await;

    match acknowledged {
        Ok(Ok(())) => {
            tracing::info!("Gemini live session set up.");
            Ok(client)
        }
        Ok(Err(e)) => {
            client.close();
            Err(e.into())
        }
        Err(_) => {
            client.close();
            Err(GeminiError::SetupFailed("timed out".to_string()).into())
        }
    }
}

impl LiveClient {
    /// Subscribes to server events.
    pub fn server_events(&self) -> ServerRx {
        self.s_tx.subscribe()
    }

    /// A handle for realtime audio, or `None` once the client is closed.
    pub fn audio_sender(&self) -> Option<AudioSender> {
        self.c_tx.clone().map(|c_tx| AudioSender { c_tx })
    }

    async fn send(&mut self, msg: ClientMessage) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(msg).await.map_err(|_| GeminiError::Closed)?;
                Ok(())
            }
            None => Err(GeminiError::Closed.into()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.c_tx.is_none()
    }

    /// Sends a close frame and stops both socket tasks. Idempotent.
    pub fn close(&mut self) {
        if self.c_tx.take().is_none() {
            return;
        }
        tracing::info!("Closing Gemini live connection.");
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.reader.abort();
        let _ = self.s_tx.send(ServerEvent::Closed { reason: None });
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[derive(Clone, Copy)]
    enum Reply {
        Acknowledge,
        Close,
        Silent,
    }

    /// Accepts one connection, checks the first frame is `setup`, then replies.
    async fn serve_once(reply: Reply) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Text(text))) => assert!(text.contains("\"setup\"")),
                other => panic!("expected setup frame, got {other:?}"),
            }
            match reply {
                Reply::Acknowledge => {
                    ws.send(Message::Text(r#"{"setupComplete":{}}"#.to_string()))
                        .await
                        .unwrap();
                }
                Reply::Close => {
                    ws.send(Message::Close(None)).await.unwrap();
                }
                Reply::Silent => {}
            }
            // Hold the socket open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });
        addr
    }

    fn local_config(addr: SocketAddr) -> Config {
        Config::builder()
            .with_live_url(&format!("ws://{addr}/"))
            .with_api_key("test")
            .with_setup_timeout(Duration::from_millis(200))
            .build()
    }

    fn setup() -> Setup {
        Setup::audio("gemini-live-test", "Be brief.", "Puck")
    }

    #[tokio::test]
    async fn test_connect_waits_for_acknowledgment() {
        let addr = serve_once(Reply::Acknowledge).await;

        let mut client = connect(&local_config(addr), setup()).await.unwrap();

        assert!(!client.is_closed());
        assert!(client.audio_sender().is_some());
        client.close();
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_connect_closed_before_acknowledgment() {
        let addr = serve_once(Reply::Close).await;

        let err = connect(&local_config(addr), setup()).await.err().unwrap();

        assert!(matches!(
            err.downcast_ref::<GeminiError>(),
            Some(GeminiError::SetupFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_times_out_without_acknowledgment() {
        let addr = serve_once(Reply::Silent).await;

        let err = connect(&local_config(addr), setup()).await.err().unwrap();

        match err.downcast_ref::<GeminiError>() {
            Some(GeminiError::SetupFailed(reason)) => assert_eq!(reason, "timed out"),
            other => panic!("expected a setup timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_requires_api_key() {
        let config = Config::builder().without_api_key().build();

        let err = connect(&config, setup()).await.err().unwrap();

        assert!(matches!(
            err.downcast_ref::<GeminiError>(),
            Some(GeminiError::MissingApiKey)
        ));
    }
}
