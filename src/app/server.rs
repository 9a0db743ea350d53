//! Minimal HTTP/1.1 host
//!
//! A self-contained host for the middleware: a TCP accept loop with one
//! task per connection, a buffered request-head parser, the WebSocket
//! upgrade handshake, and a chunked response writer for the HTTP driver.
//! Unmatched paths go to a host-supplied fallback handler.
//!
//! ```text
//! TcpListener.accept() → parse head → Middleware.classify()
//!   WebSocket → 101 handshake → SocketAdapter → websocket::drive
//!   Http      → read body     → TcpResponseChannel → http::drive
//!   NotMatched → fallback handler
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::{IntoIo, Io};
use crate::driver::{http, websocket, ResponseChannel, SlotBacking};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::socket::SocketAdapter;

use super::middleware::{Dispatch, Middleware, RequestHead};

/// Upper bound on header lines per request.
const MAX_HEADERS: usize = 128;

/// Upper bound on a request body (4 MB).
const MAX_BODY: usize = 4 * 1024 * 1024;

/// Handler for paths the registry does not know.
pub type Fallback = Arc<dyn Fn(&RequestHead) -> (u16, String) + Send + Sync>;

/// The streaming host: accepts connections and hands each one to the
/// matching driver.
pub struct Server {
    middleware: Arc<Middleware>,
    backing: SlotBacking,
    fallback: Fallback,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            middleware: Arc::new(Middleware::new(registry)),
            backing: SlotBacking::default(),
            fallback: Arc::new(|_| (404, "not found".to_string())),
            cancel: CancellationToken::new(),
        }
    }

    /// Select the inbound slot backing.
    pub fn with_backing(mut self, backing: SlotBacking) -> Self {
        self.backing = backing;
        self
    }

    /// Install the next handler in the host chain.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&RequestHead) -> (u16, String) + Send + Sync + 'static,
    {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Token that stops the accept loop and cancels live connections.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind and serve until cancelled.
    pub async fn run(&self, listen: &str) -> Result<()> {
        let addr: SocketAddr = listen
            .parse()
            .map_err(|_| Error::Config(format!("Invalid listen address: {}", listen)))?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!(
            "Listening on {} ({} routes)",
            local,
            self.middleware.registry().len()
        );

        let mut conn_count: u64 = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutting down (handled {} connections)", conn_count);
                    break;
                }
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        conn_count += 1;
                        let conn_id = conn_count;
                        debug!("New connection #{} from {}", conn_id, peer);

                        let middleware = Arc::clone(&self.middleware);
                        let fallback = Arc::clone(&self.fallback);
                        let backing = self.backing;
                        let cancel = self.cancel.child_token();

                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, middleware, fallback, backing, cancel)
                                    .await
                            {
                                warn!("Connection #{} from {} error: {}", conn_id, peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
            }
        }
        Ok(())
    }
}

/// Parse, classify and drive one connection.
async fn handle_connection(
    stream: TcpStream,
    middleware: Arc<Middleware>,
    fallback: Fallback,
    backing: SlotBacking,
    cancel: CancellationToken,
) -> Result<()> {
    let mut reader = BufReader::new(stream);
    let head = read_head(&mut reader).await?;
    debug!("{} {}", head.method, head.target);

    match middleware.classify(&head) {
        Dispatch::NotMatched => {
            let (status, body) = fallback(&head);
            write_simple_response(&mut reader, status, &body).await
        }
        Dispatch::Http(route) => {
            let body = if route.has_body {
                Some(read_body(&mut reader, head.content_length()).await?)
            } else {
                None
            };
            let scalars = Middleware::bind_scalars(&head, body);

            let channel = Arc::new(TcpResponseChannel::new(reader.into_io()));
            http::drive(
                &route,
                scalars,
                Arc::clone(&channel) as Arc<dyn ResponseChannel>,
                cancel,
            )
            .await;
            channel.finish().await
        }
        Dispatch::WebSocket(route) => {
            let Some(key) = head.header("sec-websocket-key") else {
                return write_simple_response(&mut reader, 400, "missing websocket key").await;
            };
            let accept = derive_accept_key(key.as_bytes());
            let response = format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Connection: Upgrade\r\n\
                 Upgrade: websocket\r\n\
                 Sec-WebSocket-Accept: {}\r\n\r\n",
                accept
            );
            reader.write_all(response.as_bytes()).await?;
            reader.flush().await?;

            let ws =
                WebSocketStream::from_raw_socket(reader.into_io(), Role::Server, None).await;
            let scalars = Middleware::bind_scalars(&head, None);
            websocket::drive(
                &route,
                Arc::new(SocketAdapter::new(ws)),
                scalars,
                backing,
                cancel,
            )
            .await;
            Ok(())
        }
    }
}

/// Read the request line and headers. Header names are lowercased.
async fn read_head(reader: &mut BufReader<TcpStream>) -> Result<RequestHead> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.is_empty() {
        return Err(Error::ConnectionClosed);
    }

    let mut parts = line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(_version)) => {
            (method.to_string(), target.to_string())
        }
        _ => return Err(Error::Protocol(format!("malformed request line: {:?}", line))),
    };

    let mut headers = Vec::new();
    loop {
        if headers.len() > MAX_HEADERS {
            return Err(Error::Protocol("too many headers".into()));
        }
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    Ok(RequestHead {
        method,
        target,
        headers,
    })
}

/// Read `length` body bytes as UTF-8.
async fn read_body(reader: &mut BufReader<TcpStream>, length: usize) -> Result<String> {
    if length > MAX_BODY {
        return Err(Error::Protocol(format!("request body too large: {}", length)));
    }
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| Error::Decode(format!("request body: {}", e)))
}

async fn write_simple_response(
    reader: &mut BufReader<TcpStream>,
    status: u16,
    body: &str,
) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        reason(status),
        body.len(),
        body
    );
    reader.write_all(response.as_bytes()).await?;
    reader.flush().await?;
    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Chunked response writer over the raw connection.
///
/// `write_head` decides the framing: chunked `application/json` when a
/// body follows, a bare bodiless head otherwise. `finish` writes the
/// chunked terminator once the driver is done.
struct TcpResponseChannel {
    io: Mutex<Io>,
    chunked: AtomicBool,
}

impl TcpResponseChannel {
    fn new(io: Io) -> Self {
        Self {
            io: Mutex::new(io),
            chunked: AtomicBool::new(false),
        }
    }

    /// Terminate the chunked body, if one was started.
    async fn finish(&self) -> Result<()> {
        if self.chunked.load(Ordering::SeqCst) {
            let mut io = self.io.lock().await;
            io.write_all(b"0\r\n\r\n").await?;
            io.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseChannel for TcpResponseChannel {
    async fn write_head(&self, status: u16, has_body: bool) -> std::io::Result<()> {
        let head = if has_body {
            self.chunked.store(true, Ordering::SeqCst);
            format!(
                "HTTP/1.1 {} {}\r\n\
                 Content-Type: application/json\r\n\
                 Transfer-Encoding: chunked\r\n\
                 Connection: close\r\n\r\n",
                status,
                reason(status)
            )
        } else {
            format!(
                "HTTP/1.1 {} {}\r\nConnection: close\r\n\r\n",
                status,
                reason(status)
            )
        };
        self.io.lock().await.write_all(head.as_bytes()).await
    }

    async fn write_chunk(&self, data: Vec<u8>) -> std::io::Result<()> {
        // One buffer per chunk so size line, data and trailer leave in a
        // single write.
        let mut buf = BytesMut::with_capacity(data.len() + 16);
        buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
        buf.extend_from_slice(&data);
        buf.extend_from_slice(b"\r\n");
        self.io.lock().await.write_all(&buf).await
    }

    async fn flush(&self) -> std::io::Result<()> {
        self.io.lock().await.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{self, Flow};
    use crate::registry::{ControllerDescriptor, MethodDescriptor};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::protocol::Message;

    #[derive(Default)]
    struct Demo;

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::builder()
                .controller(
                    ControllerDescriptor::new("echo", Demo::default)
                        .route(
                            MethodDescriptor::new("go")
                                .text("msg")
                                .handler(|_, call| Ok(flow::once(call.text("msg")))),
                        )
                        .route(
                            MethodDescriptor::new("empty")
                                .handler(|_, _| Ok(flow::empty::<String>())),
                        )
                        .route(MethodDescriptor::new("boom").handler(|_, _| {
                            Err::<Flow<String>, _>(Error::Method("nope".into()))
                        }))
                        .route(
                            MethodDescriptor::new("create")
                                .body_json("item")
                                .plain_http()
                                .handler(|_, call| {
                                    let item: serde_json::Value = call.body()?;
                                    let name =
                                        item["name"].as_str().unwrap_or("").to_string();
                                    Ok(flow::once(name))
                                }),
                        ),
                )
                .build()
                .unwrap(),
        )
    }

    async fn start_server() -> (SocketAddr, CancellationToken) {
        let server = Server::new(registry());
        let cancel = server.cancellation();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            server.serve(listener).await.unwrap();
        });
        (addr, cancel)
    }

    async fn http_get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_http_echo_roundtrip() {
        let (addr, cancel) = start_server().await;

        let response = http_get(addr, "/echo/go?msg=hello").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Transfer-Encoding: chunked"));
        assert!(response.contains("\"hello\""));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_http_empty_is_204() {
        let (addr, cancel) = start_server().await;

        let response = http_get(addr, "/echo/empty").await;
        assert!(response.starts_with("HTTP/1.1 204 No Content"));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_http_error_is_500() {
        let (addr, cancel) = start_server().await;

        let response = http_get(addr, "/echo/boom").await;
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error"));
        assert!(response.contains("nope"));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_http_post_body_parameter() {
        let (addr, cancel) = start_server().await;

        let body = "{\"name\":\"widget\"}";
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST /echo/create HTTP/1.1\r\nHost: localhost\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("\"widget\""));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_unmatched_path_hits_fallback() {
        let (addr, cancel) = start_server().await;

        let response = http_get(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_websocket_echo_roundtrip() {
        let (addr, cancel) = start_server().await;

        let url = format!("ws://{}/echo/go?msg=hello", addr);
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        let mut frames = Vec::new();
        while let Some(message) = ws.next().await {
            match message.unwrap() {
                Message::Text(t) => frames.push(t),
                Message::Close(_) => break,
                _ => continue,
            }
        }
        assert_eq!(frames, vec!["n\"hello\"", "c"]);

        let _ = ws.send(Message::Close(None)).await;
        cancel.cancel();
    }
}
