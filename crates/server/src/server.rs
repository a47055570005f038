//! Upload server accept loop.
//!
//! Listens on a TCP port and serves one request per connection, each on its
//! own task with its own decoder, wrappers and metering log.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use upbench_protocol::constants::DEFAULT_PORT;

use crate::consume::Consumer;
use crate::http::{self, RequestHead, Response};
use crate::routes::Route;
use crate::{DRAIN_TIMEOUT, HEADER_TIMEOUT, READ_BUFFER_SIZE, ServerError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub listen: SocketAddr,
    /// Bound on waiting for a complete request head.
    pub header_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            header_timeout: HEADER_TIMEOUT,
        }
    }
}

/// The upload sink server.
pub struct UploadServer {
    config: ServerConfig,
    consumer: Consumer,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl UploadServer {
    pub fn new(config: ServerConfig, consumer: Consumer) -> Arc<Self> {
        Arc::new(Self {
            config,
            consumer,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`bind`](Self::bind).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops accepting connections. In-flight uploads run to completion.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(self.config.listen).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        info!(%local_addr, "upload server listening");
        Ok(listener)
    }

    /// Binds and serves until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until cancellation.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("upload server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);

        let head = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(self.config.header_timeout, http::read_head(&mut reader)) => {
                match result {
                    Ok(Ok(Some(head))) => head,
                    Ok(Ok(None)) => {
                        debug!(%peer_addr, "connection closed without a request");
                        return Ok(());
                    }
                    Ok(Err(e)) => return reject(&mut writer, e).await,
                    Err(_) => return reject(&mut writer, ServerError::Timeout).await,
                }
            }
        };
        debug!(%peer_addr, method = %head.method, path = %head.path, "request received");

        match self.dispatch(&head, &mut reader, &mut writer).await {
            Ok(body) => {
                http::write_response(&mut writer, &Response::ok(body)).await?;
                writer.shutdown().await?;
                info!(%peer_addr, path = %head.path, "upload complete");
                Ok(())
            }
            Err(e) => {
                warn!(%peer_addr, path = %head.path, status = e.status_code(), "request failed: {e}");
                let result = reject(&mut writer, e).await;
                // Let the client finish sending so it sees the response
                // instead of a reset.
                let _ = tokio::time::timeout(
                    DRAIN_TIMEOUT,
                    tokio::io::copy(&mut reader, &mut tokio::io::sink()),
                )
                .await;
                result
            }
        }
    }

    async fn dispatch(
        &self,
        head: &RequestHead,
        reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
    ) -> Result<String, ServerError> {
        let route = Route::resolve(head)?;
        if head.expects_continue() {
            http::write_continue(writer).await?;
        }
        let body = http::body_reader(head, reader)?;
        route.handle(body, &self.consumer).await
    }
}

/// Sends the error response and closes the write side.
async fn reject(writer: &mut OwnedWriteHalf, err: ServerError) -> Result<(), ServerError> {
    http::write_response(writer, &Response::error(&err)).await?;
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn start() -> (Arc<UploadServer>, SocketAddr) {
        let config = ServerConfig {
            listen: ([127, 0, 0, 1], 0).into(),
            header_timeout: Duration::from_secs(5),
        };
        let server = UploadServer::new(config, Consumer::discard());
        let listener = server.bind().await.unwrap();
        let addr = server.local_addr().await.unwrap();
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.serve(listener).await });
        (server, addr)
    }

    async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn single_part_upload_roundtrip() {
        let (server, addr) = start().await;
        let response = roundtrip(
            addr,
            b"POST /api/singlepart HTTP/1.1\r\nContent-Type: application/octet-stream\r\nContent-Length: 4\r\n\r\nabcd",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let expected = format!(
            "{{\"bytesReceived\":4,\"checksum\":{}}}",
            upbench_checksum::checksum_bytes(b"abcd")
        );
        assert_eq!(body, expected);
        server.shutdown();
    }

    #[tokio::test]
    async fn unknown_path_gets_404() {
        let (server, addr) = start().await;
        let response = roundtrip(addr, b"POST /nope HTTP/1.1\r\nContent-Length: 0\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
        assert!(response.contains("\"error\""));
        server.shutdown();
    }

    #[tokio::test]
    async fn expect_continue_is_answered() {
        let (server, addr) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /api/singlepart HTTP/1.1\r\nContent-Type: application/octet-stream\r\nContent-Length: 2\r\nExpect: 100-continue\r\n\r\n")
            .await
            .unwrap();

        let mut interim = [0u8; 25];
        stream.read_exact(&mut interim).await.unwrap();
        assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

        stream.write_all(b"hi").await.unwrap();
        let mut rest = String::new();
        stream.read_to_string(&mut rest).await.unwrap();
        assert!(rest.starts_with("HTTP/1.1 200 OK"));
        server.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_accept_loop() {
        let config = ServerConfig {
            listen: ([127, 0, 0, 1], 0).into(),
            header_timeout: Duration::from_secs(5),
        };
        let server = UploadServer::new(config, Consumer::discard());
        let listener = server.bind().await.unwrap();
        let runner = Arc::clone(&server);
        let task = tokio::spawn(async move { runner.serve(listener).await });

        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
