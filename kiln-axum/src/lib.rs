//! HTTP front end for the kiln engine.
//!
//! `POST /api/render` takes `{"template": "...", "data": "<json text>"}` and
//! answers `{"rendered": "..."}` with 200, or `{"error": "...", ...}` with
//! 400 for bad input and template failures and 500 for internal faults.
//! Renders run on tokio's blocking pool.
//!
//! ```no_run
//! # async fn demo() -> Result<(), kiln_axum::ServeError> {
//! let engine = std::sync::Arc::new(kiln::Engine::new());
//! kiln_axum::serve("127.0.0.1:3000".parse().unwrap(), engine).await
//! # }
//! ```

mod extract;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use kiln::{Engine, RenderError, RenderResponse};
use thiserror::Error;

pub use extract::{BodyRejection, RenderBody, RenderReply};

/// Failure to run the HTTP server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// The render endpoint and a health check, sharing `engine`.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/render", post(render))
        .route("/healthz", get(healthz))
        .with_state(engine)
        .layer(middleware::from_fn(log_requests))
}

async fn render(State(engine): State<Arc<Engine>>, RenderBody(body): RenderBody) -> RenderReply {
    let response = tokio::task::spawn_blocking(move || engine.handle(&body))
        .await
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, "render task failed");
            RenderResponse::from(Err(RenderError::internal(err.to_string())))
        });
    RenderReply(response)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    if status >= 500 {
        tracing::error!("{} {} {} {:.1}ms", method, status, path, latency_ms);
    } else if status >= 400 {
        tracing::warn!("{} {} {} {:.1}ms", method, status, path, latency_ms);
    } else {
        tracing::info!("{} {} {} {:.1}ms", method, status, path, latency_ms);
    }
    response
}

/// Serve [`router`] on `addr` until ctrl-c.
pub async fn serve(addr: SocketAddr, engine: Arc<Engine>) -> Result<(), ServeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "serving /api/render");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                // no signal handler; run until the process is killed
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
