//! Gateway HTTP server.
//!
//! Assembles the protected speech routes behind the authentication
//! middleware, the unauthenticated pairing/admin bootstrap routes, the CORS
//! layer for the desktop client, and a periodic sweep of stale pairing
//! codes. Channels define routes; a single `start()` binds the listener and
//! spawns the server task.

pub mod middleware;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::post,
    Router,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ServerError;
use crate::speech::{Synthesizer, Transcriber};
use crate::trust::authenticator::{
    RequestAuthenticator, HEADER_BODY_SHA256, HEADER_DEVICE_ID, HEADER_NONCE, HEADER_SIGNATURE,
    HEADER_TIMESTAMP,
};
use crate::trust::pairing::PairingCoordinator;

/// How often stale pairing codes are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: RequestAuthenticator,
    pub pairing: PairingCoordinator,
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub max_body_bytes: usize,
}

/// Build the full route table with CORS and tracing applied.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Result<Router, ServerError> {
    let cors = cors_layer(allowed_origins)?;

    let protected = Router::new()
        .route("/stt", post(routes::speech_to_text))
        .route("/tts", post(routes::text_to_speech))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let bootstrap = Router::new()
        .route("/pair/request", post(routes::pair_request))
        .route("/pair/confirm", post(routes::pair_confirm))
        .route("/admin/devices/revoke", post(routes::revoke_device));

    Ok(Router::new()
        .merge(protected)
        .merge(bootstrap)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ServerError> {
    let mut origins = Vec::with_capacity(allowed_origins.len());
    for origin in allowed_origins {
        let value = origin
            .parse::<HeaderValue>()
            .map_err(|_| ServerError::InvalidOrigin {
                origin: origin.clone(),
            })?;
        origins.push(value);
    }

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(HEADER_DEVICE_ID),
            HeaderName::from_static(HEADER_TIMESTAMP),
            HeaderName::from_static(HEADER_NONCE),
            HeaderName::from_static(HEADER_BODY_SHA256),
            HeaderName::from_static(HEADER_SIGNATURE),
        ]))
}

/// The gateway server plus its background pairing-code sweep.
pub struct GatewayServer {
    addr: SocketAddr,
    app: Router,
    pairing: PairingCoordinator,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    sweep_handle: Option<JoinHandle<()>>,
}

impl GatewayServer {
    pub fn new(addr: SocketAddr, app: Router, pairing: PairingCoordinator) -> Self {
        Self {
            addr,
            app,
            pairing,
            local_addr: None,
            shutdown_tx: None,
            handle: None,
            sweep_handle: None,
        }
    }

    /// Bind the listener and spawn the server and sweep tasks.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                addr: self.addr.to_string(),
                reason: e.to_string(),
            })?;
        self.local_addr = listener.local_addr().ok();

        tracing::info!("Gateway listening on {}", self.addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = self.app.clone();
        let handle = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Gateway shutting down");
                })
                .await
            {
                tracing::error!("Gateway server error: {}", e);
            }
        });
        self.handle = Some(handle);

        let pairing = self.pairing.clone();
        self.sweep_handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = pairing.sweep_expired().await;
                if removed > 0 {
                    tracing::debug!(removed, "swept expired pairing codes");
                }
            }
        }));

        Ok(())
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(sweep) = self.sweep_handle.take() {
            sweep.abort();
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
