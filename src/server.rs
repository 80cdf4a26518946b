//! The scrape endpoint: `GET /metrics` rendering a registry in the text
//! exposition format.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{mpsc, Arc},
};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::{error::Result, exposition, registry::Registry};

pub const METRICS_PATH: &str = "/metrics";

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let body = exposition::encode(&registry.gather());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
        body,
    )
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(registry)
}

/// Serve the scrape endpoint on an already bound listener until the
/// listener fails.
pub async fn serve(listener: tokio::net::TcpListener, registry: Arc<Registry>) -> std::io::Result<()> {
    axum::serve(listener, router(registry)).await
}

/// Bind the scrape port on all interfaces, IPv6 included when the host has
/// it. Done synchronously so a busy port is reported to the caller instead of
/// inside the background thread.
pub fn bind(port: u16) -> Result<std::net::TcpListener> {
    let listener = match std::net::TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)) {
        Ok(listener) => listener,
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => return Err(e.into()),
        Err(e) => {
            tracing::debug!(message = "ipv6 bind failed, falling back to ipv4", port = port, error = %e);
            std::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?
        }
    };
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Serve `registry` on `listener` from a dedicated thread with its own
/// single-threaded runtime. Returns once the listener is registered with that
/// runtime, so any setup failure is returned here. The thread is never joined
/// and runs until the process exits.
pub fn spawn(listener: std::net::TcpListener, registry: Arc<Registry>) -> Result<SocketAddr> {
    let addr = listener.local_addr()?;
    let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);
    std::thread::Builder::new()
        .name("nano-metrics-exposition".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                tracing::info!(message = "serving metrics", addr = %addr, path = METRICS_PATH);
                if let Err(e) = serve(listener, registry).await {
                    tracing::error!(message = "exposition endpoint stopped", error = %e);
                }
            });
        })?;

    match ready_rx.recv() {
        Ok(ready) => ready?,
        Err(_) => {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "exposition thread exited during startup",
            )
            .into())
        }
    }
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{GaugeVec, Opts};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::io::{Read, Write};
    use tower::ServiceExt;

    fn registry_with_gauge() -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        let gauge = GaugeVec::new(Opts::new("up", "whether we are up"), vec![]).unwrap();
        gauge.with_label_values(&[]).unwrap().set(1.0);
        registry.register(Arc::new(gauge)).unwrap();
        registry
    }

    #[tokio::test]
    async fn scrape_returns_text_format() {
        let response = router(registry_with_gauge())
            .oneshot(Request::builder().uri(METRICS_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            exposition::CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("# TYPE up gauge\nup 1\n"));
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let response = router(registry_with_gauge())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn busy_port_is_an_error() {
        let first = bind(0).unwrap();
        let port = first.local_addr().unwrap().port();
        assert!(matches!(bind(port), Err(crate::Error::Io(e)) if e.kind() == io::ErrorKind::AddrInUse));
    }

    #[test]
    fn listens_on_ipv4_loopback() {
        let listener = bind(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    }

    #[test]
    fn spawn_serves_once_it_returns() {
        let addr = spawn(bind(0).unwrap(), registry_with_gauge()).unwrap();
        let mut stream = std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, addr.port())).unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("up 1\n"));
    }
}
