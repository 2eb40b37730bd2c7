//! Built-in HTTP engine on axum.
//!
//! Every request is forwarded to the server context through
//! [`HandlerEvents::http_request`] and answered with whatever the claiming
//! observer sends on its [`Connection`]. Requests nobody answers get a 404.

use crate::config::{ServerConfig, origin_for};
use crate::error::ServerError;
use crate::handler::{HandlerEvents, ServerControl, ServerEngine};
use crate::request::{Connection, ConnectionId, ConnectionInfo, HttpRequest, Reply};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State, connect_info::Connected},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    serve::{IncomingStream, Listener},
};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Serves HTTP on the configured address with axum.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    config: ServerConfig,
}

impl HttpEngine {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}

impl ServerEngine for HttpEngine {
    fn create_server(&self, events: HandlerEvents) -> Box<dyn ServerControl> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run_server(self.config.clone(), events, shutdown_rx));
        Box::new(HttpControl {
            shutdown: Some(shutdown_tx),
        })
    }
}

struct HttpControl {
    shutdown: Option<oneshot::Sender<()>>,
}

impl ServerControl for HttpControl {
    fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            if shutdown.send(()).is_err() {
                warn!("http server already exited before shutdown");
            }
        }
    }
}

async fn run_server(config: ServerConfig, events: HandlerEvents, shutdown: oneshot::Receiver<()>) {
    let addr = config.socket_addr();
    let listener = match bind(addr, config.backlog) {
        Ok(listener) => listener,
        Err(source) => {
            events.start_failed(ServerError::Bind { addr, source });
            return;
        }
    };

    let local = listener.local_addr().unwrap_or(addr);
    let origin = origin_for(local);
    info!(%origin, backlog = config.backlog, "http server listening");

    let state = Arc::new(RouteState {
        origin: origin.clone(),
        events: events.clone(),
        max_body_bytes: config.max_body_bytes,
    });
    let app = Router::new().fallback(dispatch).with_state(state);

    let listener = TrackedListener {
        inner: listener,
        events: events.clone(),
        next_id: 0,
    };

    events.server_created(origin);

    let requested = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&requested);
    let signal = async move {
        if shutdown.await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    };

    if let Err(error) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<ConnectionInfo>(),
    )
    .with_graceful_shutdown(signal)
    .await
    {
        error!(%error, "http server terminated with an error");
    }

    events.server_destroyed();
    if requested.load(Ordering::SeqCst) {
        events.handler_deleted();
    }
}

fn bind(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

struct RouteState {
    origin: String,
    events: HandlerEvents,
    max_body_bytes: usize,
}

async fn dispatch(
    State(state): State<Arc<RouteState>>,
    ConnectInfo(info): ConnectInfo<ConnectionInfo>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());
    let url = format!("{}{}", state.origin, path);

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(error) => {
            warn!(%url, %error, "rejecting request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let request = HttpRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
    };

    if is_websocket_upgrade(&request) {
        state.events.websocket_request(info, &request);
        return StatusCode::NOT_IMPLEMENTED.into_response();
    }

    debug!(connection = info.id, url = %request.url, "dispatching request");
    let (connection, reply) = Connection::channel(info);
    state.events.http_request(request, connection);

    match reply.await {
        Ok(reply) => into_response(reply),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn is_websocket_upgrade(request: &HttpRequest) -> bool {
    request
        .header(header::UPGRADE.as_str())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

fn into_response(reply: Reply) -> Response {
    let Reply {
        response,
        body,
        close,
    } = reply;

    let mut builder = Response::builder()
        .status(response.status)
        .header(header::CONTENT_TYPE, response.mime_type.as_str());
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if close {
        builder = builder.header(header::CONNECTION, "close");
    }

    builder.body(Body::from(body)).unwrap_or_else(|error| {
        error!(%error, "invalid response from observer");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

/// Listener that numbers connections and reports their lifetime.
struct TrackedListener {
    inner: TcpListener,
    events: HandlerEvents,
    next_id: ConnectionId,
}

impl Listener for TrackedListener {
    type Io = TrackedStream;
    /// Connection id and peer address, also what `ConnectInfo` extracts.
    /// `local_addr` reports id 0.
    type Addr = ConnectionInfo;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, client_address)) => {
                    self.next_id += 1;
                    let info = ConnectionInfo {
                        id: self.next_id,
                        client_address,
                    };
                    self.events.client_connected(info);
                    let stream = TrackedStream {
                        inner: stream,
                        info,
                        events: self.events.clone(),
                    };
                    return (stream, info);
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(ConnectionInfo {
            id: 0,
            client_address: self.inner.local_addr()?,
        })
    }
}

impl Connected<IncomingStream<'_, TrackedListener>> for ConnectionInfo {
    fn connect_info(stream: IncomingStream<'_, TrackedListener>) -> Self {
        *stream.remote_addr()
    }
}

/// TCP stream that reports a disconnect when dropped.
struct TrackedStream {
    inner: TcpStream,
    info: ConnectionInfo,
    events: HandlerEvents,
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.events.client_disconnected(self.info);
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
