use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers, relay::Relay};

pub use crate::handlers::AppState;

pub struct RelayServer {
    addr: SocketAddr,
    app: Router,
    relay: Arc<Relay>,
}

pub fn build_app(cfg: &AppConfig, relay: Arc<Relay>) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/stats", get(handlers::stats))
        .route("/metrics", get(handlers::metrics))
        .route("/refresh", post(handlers::enqueue_refresh))
        .route("/refresh/status", get(handlers::refresh_status))
        .route("/cache/stats/reset", post(handlers::reset_stats))
        .route("/cache/{resource_type}/{id}", delete(handlers::invalidate))
        .with_state(AppState { relay })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::debug!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    config: AppConfig,
    addr: Option<SocketAddr>,
    relay: Option<Arc<Relay>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            addr: None,
            relay: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    #[must_use]
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Use a prebuilt relay instead of building one from the config.
    #[must_use]
    pub fn with_relay(mut self, relay: Arc<Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub async fn build(self) -> anyhow::Result<RelayServer> {
        let relay = match self.relay {
            Some(relay) => relay,
            None => Arc::new(Relay::from_config(&self.config).await?),
        };
        let app = build_app(&self.config, Arc::clone(&relay));
        Ok(RelayServer {
            addr: self.addr.unwrap_or_else(|| self.config.addr()),
            app,
            relay,
        })
    }
}

impl RelayServer {
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Starts the relay, serves HTTP until Ctrl+C, then stops the relay.
    pub async fn run(self) -> anyhow::Result<()> {
        self.relay.start().await?;

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.relay.stop().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
