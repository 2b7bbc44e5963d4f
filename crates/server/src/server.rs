use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use std::{
    any::Any,
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use tower_http::catch_panic::CatchPanicLayer;

use crate::{ServerError, health, transfers, wallets};
use engine::Engine;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    /// Requests running longer are aborted. Dropping an engine call rolls
    /// back its unit of work.
    pub request_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub options: ServerOptions,
}

/// Log every request and enforce the request timeout.
async fn trace_and_limit(
    State(state): State<ServerState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response =
        match tokio::time::timeout(state.options.request_timeout, next.run(request)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(%method, %path, "request timed out");
                ServerError::Timeout.into_response()
            }
        };

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    response
}

/// Answer a panicking handler with a JSON 500 instead of a dropped
/// connection.
fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("handler panicked: {message}");
    ServerError::Panic.into_response()
}

/// Build the HTTP router around `engine`.
pub fn app(engine: Arc<Engine>, options: ServerOptions) -> Router {
    let state = ServerState { engine, options };

    Router::new()
        .route("/api/send", post(transfers::send))
        .route("/api/transactions", get(transfers::list))
        .route("/api/wallet/{id}/balance", get(wallets::balance))
        .route("/api/health", get(health::get))
        .layer(CatchPanicLayer::custom(recover_panic))
        .layer(middleware::from_fn_with_state(state.clone(), trace_and_limit))
        .with_state(state)
}

pub async fn run(engine: Engine, addr: SocketAddr, options: ServerOptions) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, listener, options, shutdown_signal()).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
    options: ServerOptions,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(Arc::new(engine), options))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

pub fn spawn_with_listener(
    engine: Engine,
    listener: tokio::net::TcpListener,
    options: ServerOptions,
) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) =
            run_with_listener(engine, listener, options, std::future::pending()).await
        {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
