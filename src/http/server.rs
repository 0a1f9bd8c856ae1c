//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Wrap the caller's Axum Router with middleware (timeouts, tracing, request ID)
//! - Run the accept loop on a bound listener
//! - Serve each connection over HTTP/1.1 with read and idle timeouts
//! - Graceful and forced connection shutdown

use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::net::{Activity, ConnectionGuard, ConnectionState, Listener, ListenerError};

/// Per-connection timeouts taken from the resolved config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// Time allowed to receive request headers.
    pub read: Duration,
    /// Time allowed for the handler to produce a response.
    pub write: Duration,
    /// Time an idle keep-alive connection stays open.
    pub idle: Duration,
}

impl From<&Config> for ServerTimeouts {
    fn from(config: &Config) -> Self {
        Self {
            read: config.read_timeout,
            write: config.write_timeout,
            idle: config.idle_timeout,
        }
    }
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    timeouts: ServerTimeouts,
    connections: TaskTracker,
    close: CancellationToken,
    force: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server serving `router`.
    pub fn new(timeouts: ServerTimeouts, router: Router) -> Self {
        Self {
            router: Self::build_router(router, &timeouts),
            timeouts,
            connections: TaskTracker::new(),
            close: CancellationToken::new(),
            force: CancellationToken::new(),
        }
    }

    /// Wrap the router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(router: Router, timeouts: &ServerTimeouts) -> Router {
        router
            .layer(TimeoutLayer::new(timeouts.write))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Handle for shutting this server down from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            connections: self.connections.clone(),
            close: self.close.clone(),
            force: self.force.clone(),
        }
    }

    /// Accept connections until the handle stops accepting. The listening socket is closed
    /// when this returns.
    ///
    /// Returns an error if accepting fails. Connections already open keep running either way
    /// and are drained through the handle.
    pub async fn serve(self, listener: Listener) -> Result<(), ListenerError> {
        tracing::info!(
            address = %listener.local_addr(),
            read_timeout = ?self.timeouts.read,
            write_timeout = ?self.timeouts.write,
            idle_timeout = ?self.timeouts.idle,
            "HTTP server starting"
        );

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.close.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer, id) = match accepted {
                Ok(conn) => conn,
                Err(ListenerError::Accept(e)) if is_per_connection(&e) => {
                    tracing::warn!(error = %e, "Dropped connection during accept");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.connections.spawn(serve_connection(
                stream,
                peer,
                ConnectionGuard::open(id),
                self.router.clone(),
                self.timeouts,
                self.close.clone(),
                self.force.clone(),
            ));
        }

        tracing::info!("HTTP server stopped accepting connections");
        Ok(())
    }
}

/// Shuts a running [`HttpServer`] down.
#[derive(Clone)]
pub struct ServerHandle {
    connections: TaskTracker,
    close: CancellationToken,
    force: CancellationToken,
}

impl ServerHandle {
    /// Make the accept loop exit and ask open connections to close after their current
    /// request.
    pub fn stop_accepting(&self) {
        self.close.cancel();
    }

    /// Stop accepting, let every open connection finish its in-flight request, and wait for
    /// all of them to close.
    ///
    /// Connections accepted after this starts are not waited for, so callers that own the
    /// serve task should [`stop_accepting`](Self::stop_accepting) and join it first.
    pub async fn shutdown(&self) {
        self.close.cancel();
        self.connections.close();
        tracing::info!(
            open_connections = self.connections.len(),
            "Draining open connections"
        );
        self.connections.wait().await;
    }

    /// Drop every connection that is still open.
    pub fn force_close(&self) {
        self.force.cancel();
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }
}

/// Accept errors that concern one client rather than the listening socket.
fn is_per_connection(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
    )
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    router: Router,
    timeouts: ServerTimeouts,
    close: CancellationToken,
    force: CancellationToken,
) {
    let id = guard.id();
    let activity = Activity::new();
    let requests = activity.clone();

    let service = service_fn(move |request: Request<Incoming>| {
        let in_flight = requests.begin();
        let router = router.clone();
        async move {
            let response = router.oneshot(request).await;
            drop(in_flight);
            response
        }
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.read)
        .keep_alive(true);
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut state = ConnectionState::Active;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(connection = %id, peer_addr = %peer, error = %e, "Connection error");
                }
                break;
            }
            _ = close.cancelled(), if state == ConnectionState::Active => {
                // hyper closes an idle connection here and finishes a partly read request.
                state = ConnectionState::Draining;
                conn.as_mut().graceful_shutdown();
            }
            _ = activity.idle_for(timeouts.idle), if state == ConnectionState::Active => {
                tracing::debug!(connection = %id, peer_addr = %peer, "Closing idle connection");
                break;
            }
            _ = force.cancelled() => {
                tracing::warn!(
                    connection = %id,
                    peer_addr = %peer,
                    in_flight = activity.in_flight(),
                    "Forcing connection closed"
                );
                break;
            }
        }
    }

    state = ConnectionState::Closed;
    tracing::trace!(connection = %id, state = ?state, "Connection finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn timeouts() -> ServerTimeouts {
        ServerTimeouts {
            read: Duration::from_secs(5),
            write: Duration::from_secs(5),
            idle: Duration::from_secs(5),
        }
    }

    async fn get_raw(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_timeouts_from_config() {
        let config = Config::default();
        let t = ServerTimeouts::from(&config);
        assert_eq!(t.read, Duration::from_secs(15));
        assert_eq!(t.write, Duration::from_secs(15));
        assert_eq!(t.idle, Duration::from_secs(60));
    }

    #[test]
    fn test_per_connection_accept_errors() {
        use std::io::{Error, ErrorKind};
        assert!(is_per_connection(&Error::from(ErrorKind::ConnectionAborted)));
        assert!(is_per_connection(&Error::from(ErrorKind::ConnectionReset)));
        assert!(!is_per_connection(&Error::from(ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_serves_router_and_sets_request_id() {
        let router = Router::new().route("/hello", get(|| async { "hello" }));
        let server = HttpServer::new(timeouts(), router);
        let handle = server.handle();
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let task = tokio::spawn(server.serve(listener));

        let response = get_raw(addr, "/hello").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.to_ascii_lowercase().contains("x-request-id"));
        assert!(response.ends_with("hello"));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("idle server drains at once");
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_request() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "done"
            }),
        );
        let server = HttpServer::new(timeouts(), router);
        let handle = server.handle();
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        tokio::spawn(server.serve(listener));

        let request = tokio::spawn(async move { get_raw(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.open_connections(), 1);

        handle.shutdown().await;
        let response = request.await.unwrap();
        assert!(response.ends_with("done"), "{response}");
        assert_eq!(handle.open_connections(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_finishes_partly_received_request() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let server = HttpServer::new(timeouts(), router);
        let handle = server.handle();
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        tokio::spawn(server.serve(listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: test\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let drain = handle.clone();
        let draining = tokio::spawn(async move { drain.shutdown().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        stream.write_all(b"\r\n").await.unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut response))
            .await
            .expect("connection closes after the response")
            .unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("pong"), "{response}");

        tokio::time::timeout(Duration::from_secs(1), draining)
            .await
            .expect("drain completes once the request is answered")
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_timeout_answers_408() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                "late"
            }),
        );
        let server = HttpServer::new(
            ServerTimeouts {
                write: Duration::from_millis(100),
                ..timeouts()
            },
            router,
        );
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        tokio::spawn(server.serve(listener));

        let started = std::time::Instant::now();
        let response = get_raw(addr, "/slow").await;
        assert!(response.starts_with("HTTP/1.1 408"), "{response}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_read_timeout_closes_slow_header() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let server = HttpServer::new(
            ServerTimeouts {
                read: Duration::from_millis(100),
                ..timeouts()
            },
            router,
        );
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        tokio::spawn(server.serve(listener));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let mut response = Vec::new();
        let closed =
            tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response)).await;
        assert!(closed.is_ok(), "header read timeout should close the connection");
        assert!(!String::from_utf8_lossy(&response).contains("200"));
    }

    #[tokio::test]
    async fn test_force_close_drops_connections() {
        let router = Router::new().route(
            "/stuck",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "never"
            }),
        );
        let server = HttpServer::new(timeouts(), router);
        let handle = server.handle();
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        tokio::spawn(server.serve(listener));

        let _request = tokio::spawn(async move { get_raw(addr, "/stuck").await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let drain = handle.clone();
        let draining = tokio::spawn(async move { drain.shutdown().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!draining.is_finished());

        handle.force_close();
        tokio::time::timeout(Duration::from_secs(1), draining)
            .await
            .expect("forced close ends the drain")
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let router = Router::new().route("/", get(|| async { "ok" }));
        let server = HttpServer::new(
            ServerTimeouts {
                idle: Duration::from_millis(100),
                ..timeouts()
            },
            router,
        );
        let handle = server.handle();
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        tokio::spawn(server.serve(listener));

        let _client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.open_connections(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.open_connections(), 0);
    }
}
