//! Async TCP transport using Tokio.
//!
//! Accepts TCP connections, parses HTTP/1.1 requests and hands them to a
//! [`Router`] (or any request handler). Supports HTTP/1.1 persistent
//! connections (keep-alive) out of the box.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Router;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Scheme given to requests that arrive in origin form.
const DEFAULT_SCHEME: &str = "http";

/// TCP front end for a [`Router`].
///
/// Requests arriving in origin form (`GET /path HTTP/1.1`) are tagged with the
/// `http` scheme before dispatch so scheme constraints can see it.
///
/// # Examples
///
/// ```rust,no_run
/// use reroute::{Router, Response, Server, StatusCode};
/// use reroute::context::Context;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::Ok).body("pong") })?;
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.serve(router).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Routes every request through `router` until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, router: Router) -> Result<(), ServerError> {
        let router = Arc::new(router);
        self.run(move |request| {
            let router = Arc::clone(&router);
            async move { router.route(request).await }
        })
        .await
    }

    /// Dispatches every request to `handler` until the listener fails.
    ///
    /// The handler is shared by all connection tasks, so it must be
    /// `Send + Sync + 'static`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(%peer, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                let mut conn = Connection::new(stream, peer);
                if let Err(e) = conn.serve(handler.as_ref()).await {
                    warn!(%peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

// What the read side produced for the next request on a connection.
enum Incoming {
    Request { request: Request, consumed: usize },
    Closed,
    Rejected(Response),
}

// One accepted TCP connection and its read buffer.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
        }
    }

    // Serves requests one after another until the peer goes away, asks to
    // close, or sends something we refuse.
    async fn serve<H, F>(&mut self, handler: &H) -> Result<(), std::io::Error>
    where
        H: Fn(Request) -> F,
        F: Future<Output = Response>,
    {
        loop {
            let (mut request, consumed) = match self.next_request().await? {
                Incoming::Request { request, consumed } => (request, consumed),
                Incoming::Closed => {
                    debug!(peer = %self.peer, "connection closed by peer");
                    return Ok(());
                }
                Incoming::Rejected(response) => {
                    self.send(response.keep_alive(false)).await?;
                    return Ok(());
                }
            };

            let keep_alive = request.is_keep_alive();
            if request.scheme().is_none() {
                request.set_scheme(DEFAULT_SCHEME);
            }

            debug!(
                peer = %self.peer,
                method = %request.method(),
                path = request.path(),
                "dispatching request"
            );

            let response = handler(request).await;
            self.send(response.keep_alive(keep_alive)).await?;
            self.buf.advance(consumed);

            if !keep_alive {
                debug!(peer = %self.peer, "Connection: close — shutting down");
                return Ok(());
            }
        }
    }

    // Reads until the buffer holds a complete request (headers plus
    // `Content-Length` bytes of body).
    async fn next_request(&mut self) -> Result<Incoming, std::io::Error> {
        loop {
            if !self.buf.is_empty() {
                match Request::parse(&self.buf) {
                    Ok((request, body_offset)) => {
                        let declared = request.content_length().unwrap_or(0);
                        let Some(consumed) = body_offset
                            .checked_add(declared)
                            .filter(|&total| total <= MAX_REQUEST_SIZE)
                        else {
                            warn!(
                                peer = %self.peer,
                                declared,
                                "declared body too large — sending 413"
                            );
                            return Ok(Incoming::Rejected(too_large()));
                        };
                        if self.buf.len() >= consumed {
                            return Ok(Incoming::Request { request, consumed });
                        }
                    }
                    Err(RequestError::Incomplete) => {}
                    Err(e) => {
                        warn!(peer = %self.peer, error = %e, "bad request — sending 400");
                        return Ok(Incoming::Rejected(
                            Response::new(StatusCode::BadRequest).body(format!("Bad Request: {e}")),
                        ));
                    }
                }
            }

            if self.buf.len() > MAX_REQUEST_SIZE {
                warn!(peer = %self.peer, "request too large — sending 413");
                return Ok(Incoming::Rejected(too_large()));
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Ok(Incoming::Closed);
            }
        }
    }

    async fn send(&mut self, response: Response) -> Result<(), std::io::Error> {
        self.stream.write_all(&response.into_bytes()).await?;
        self.stream.flush().await
    }
}

fn too_large() -> Response {
    Response::new(StatusCode::PayloadTooLarge).body("Request entity too large")
}
