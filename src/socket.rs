//! WebSocket adapter
//!
//! A thin facade over one accepted WebSocket connection. The two pumps of
//! a connection share it: the outbound pump sends and closes, the inbound
//! pump receives. The adapter owns no tasks; the split halves live behind
//! async mutexes so both pumps can hold `&self`.
//!
//! Message reassembly is delegated to the websocket protocol layer, which
//! yields whole logical messages; `receive` returns them one at a time
//! and skips non-text traffic.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use crate::common::Io;
use crate::error::{Error, Result};

/// Facade over one server-side WebSocket connection.
pub struct SocketAdapter {
    sink: Mutex<SplitSink<WebSocketStream<Io>, Message>>,
    source: Mutex<SplitStream<WebSocketStream<Io>>>,
    closed: AtomicBool,
}

impl SocketAdapter {
    pub fn new(ws: WebSocketStream<Io>) -> Self {
        let (sink, source) = ws.split();
        Self {
            sink: Mutex::new(sink),
            source: Mutex::new(source),
            closed: AtomicBool::new(false),
        }
    }

    /// Send one text frame with end-of-message set.
    pub async fn send(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(|e| {
            self.closed.store(true, Ordering::SeqCst);
            Error::Protocol(format!("WebSocket send failed: {}", e))
        })
    }

    /// Receive one logical text message.
    ///
    /// Returns `None` once the peer has closed, the transport has failed,
    /// or the adapter was closed locally; callers treat it as EOF.
    /// Binary, ping and pong messages are skipped.
    pub async fn receive(&self) -> Option<String> {
        let mut source = self.source.lock().await;
        loop {
            if self.is_closed() {
                return None;
            }
            match source.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Close(frame))) => {
                    debug!("peer close frame: {:?}", frame);
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                Some(Ok(other)) => {
                    trace!("skipping non-text message: {:?}", other);
                    continue;
                }
                Some(Err(e)) => {
                    debug!("WebSocket receive failed: {}", e);
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                None => {
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }

    /// Initiate the close handshake with a normal-closure status.
    ///
    /// Idempotent: the second and later calls are no-ops.
    pub async fn close(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!("close handshake failed: {}", e);
        }
    }

    /// True after the peer closed, the transport failed, or `close` ran.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::IntoIo;
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// Adapter over one end of an in-memory duplex, plus a raw client
    /// websocket over the other end.
    async fn pair() -> (SocketAdapter, WebSocketStream<Io>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io.into_io(), Role::Server, None);
        let client = WebSocketStream::from_raw_socket(client_io.into_io(), Role::Client, None);
        let (server, client) = tokio::join!(server, client);
        (SocketAdapter::new(server), client)
    }

    #[tokio::test]
    async fn test_send_and_receive_roundtrip() {
        let (adapter, mut client) = pair().await;

        adapter.send("hello".to_string()).await.unwrap();
        match client.next().await.unwrap().unwrap() {
            Message::Text(t) => assert_eq!(t, "hello"),
            other => panic!("unexpected message: {:?}", other),
        }

        client.send(Message::Text("world".into())).await.unwrap();
        assert_eq!(adapter.receive().await.unwrap(), "world");
    }

    #[tokio::test]
    async fn test_receive_skips_non_text() {
        let (adapter, mut client) = pair().await;

        client.send(Message::Ping(vec![1])).await.unwrap();
        client.send(Message::Binary(vec![2, 3])).await.unwrap();
        client.send(Message::Text("after".into())).await.unwrap();

        assert_eq!(adapter.receive().await.unwrap(), "after");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (adapter, mut client) = pair().await;

        adapter.close("onCompleted").await;
        assert!(adapter.is_closed());
        adapter.close("onCompleted").await;

        // Exactly one close frame reaches the peer.
        match client.next().await.unwrap().unwrap() {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason, "onCompleted");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (adapter, _client) = pair().await;

        adapter.close("done").await;
        assert!(matches!(
            adapter.send("late".to_string()).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_peer_close_marks_closed() {
        let (adapter, mut client) = pair().await;

        client.close(None).await.unwrap();
        assert!(adapter.receive().await.is_none());
        assert!(adapter.is_closed());
    }
}
