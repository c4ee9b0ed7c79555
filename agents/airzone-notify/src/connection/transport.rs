//! Transport
//!
//! The bidirectional text-frame channel under the supervisor, and its
//! WebSocket implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event surfaced by a transport, in receipt order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open; always the first event
    Open,
    /// A text frame
    Text(String),
    /// The channel failed; a `Close` follows
    Error(String),
    /// The channel is closed
    Close(Option<String>),
}

/// An open text-frame channel
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next event
    async fn next_event(&mut self) -> TransportEvent;

    /// Send a text frame
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Close the channel
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// WebSocket connector based on tokio-tungstenite
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (stream, response) = timeout(self.connect_timeout, connect_async(url))
            .await
            .context("Connection timeout")?
            .context("Failed to connect to WebSocket")?;

        debug!(status = %response.status(), "WebSocket upgrade accepted");

        let (write, read) = stream.split();
        Ok(Box::new(WsTransport {
            write,
            read,
            opened: false,
            closed: false,
        }))
    }
}

/// WebSocket transport
pub struct WsTransport {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    opened: bool,
    closed: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn next_event(&mut self) -> TransportEvent {
        if !self.opened {
            self.opened = true;
            return TransportEvent::Open;
        }
        if self.closed {
            return TransportEvent::Close(None);
        }

        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text.to_string()),
                Some(Ok(Message::Ping(data))) => {
                    trace!("WebSocket ping, sending pong");
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        self.closed = true;
                        return TransportEvent::Error(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    return TransportEvent::Close(frame.map(|f| f.to_string()));
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Binary(_))) => {
                    debug!("Received binary message (ignored)");
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return TransportEvent::Error(e.to_string());
                }
                None => {
                    self.closed = true;
                    return TransportEvent::Close(None);
                }
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        self.write
            .send(Message::Text(text.to_string().into()))
            .await
            .context("Failed to send frame")
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.write.close().await.context("Failed to close WebSocket")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// What scripted transports observed
    #[derive(Default)]
    pub struct Wire {
        pub sent: Mutex<Vec<String>>,
        pub closes: AtomicUsize,
    }

    impl Wire {
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    /// Transport replaying a fixed list of events, then idling forever
    pub struct ScriptedTransport {
        events: VecDeque<TransportEvent>,
        wire: Arc<Wire>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn next_event(&mut self) -> TransportEvent {
            match self.events.pop_front() {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }

        async fn send(&mut self, text: &str) -> Result<()> {
            self.wire.sent.lock().push(text.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.wire.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Connector handing out one scripted transport per attempt
    pub struct ScriptedConnector {
        scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
        pub urls: Mutex<Vec<String>>,
        pub times: Mutex<Vec<Instant>>,
        pub wire: Arc<Wire>,
    }

    impl ScriptedConnector {
        pub fn new(scripts: Vec<Vec<TransportEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                urls: Mutex::new(Vec::new()),
                times: Mutex::new(Vec::new()),
                wire: Arc::new(Wire::default()),
            }
        }

        pub fn attempts(&self) -> usize {
            self.urls.lock().len()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
            self.urls.lock().push(url.to_string());
            self.times.lock().push(Instant::now());

            let events = self.scripts.lock().pop_front().unwrap_or_default();
            Ok(Box::new(ScriptedTransport {
                events: events.into(),
                wire: self.wire.clone(),
            }))
        }
    }
}
