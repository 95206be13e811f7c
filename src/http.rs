//! HTTP server part of the sync server

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Result;
use axum::{
    Json, Router,
    extract::ConnectInfo,
    handler::Handler,
    http::Method,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, task::JoinSet};
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Level, info, span, warn};

mod books;
mod card;
mod error;
mod extract;
mod rate_limiting;
mod sync;
mod users;

use crate::state::AppState;

pub use self::error::{AppError, AppResult};
pub use self::extract::{AUTH_KEY_HEADER, AUTH_USER_HEADER, AuthUser};

/// Config for the HTTP server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    /// Port to bind to
    pub port: u16,
    /// Optionally set a custom bind address (will use 0.0.0.0 if unset)
    pub bind_addr: Option<IpAddr>,
}

/// The HTTP server part of the sync server
pub struct HttpServer {
    tasks: JoinSet<std::io::Result<()>>,
    addr: SocketAddr,
}

impl HttpServer {
    /// Spawn the server
    pub async fn spawn(config: HttpConfig, state: AppState) -> Result<HttpServer> {
        let app = create_app(state);

        let bind_addr = SocketAddr::new(
            config.bind_addr.unwrap_or(Ipv4Addr::UNSPECIFIED.into()),
            config.port,
        );
        let listener = TcpListener::bind(bind_addr).await?.into_std()?;
        let addr = listener.local_addr()?;
        let fut = axum_server::from_tcp(listener)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>());
        info!("HTTP server listening on {bind_addr}");

        let mut tasks = JoinSet::new();
        tasks.spawn(fut);

        Ok(HttpServer { tasks, addr })
    }

    /// Get the bound address of the HTTP socket.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shutdown the server and wait for all tasks to complete.
    pub async fn shutdown(mut self) -> Result<()> {
        self.tasks.abort_all();
        self.run_until_done().await?;
        Ok(())
    }

    /// Wait for all tasks to complete.
    ///
    /// Runs forever unless tasks fail.
    pub async fn run_until_done(mut self) -> Result<()> {
        let mut final_res: anyhow::Result<()> = Ok(());
        while let Some(res) = self.tasks.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Err(err) if err.is_cancelled() => {}
                Ok(Err(err)) => {
                    warn!(?err, "task failed");
                    final_res = Err(anyhow::Error::from(err));
                }
                Err(err) => {
                    warn!(?err, "task panicked");
                    final_res = Err(err.into());
                }
            }
        }
        final_res
    }
}

pub(crate) fn create_app(state: AppState) -> Router {
    // configure cors middleware
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        // allow requests from any origin
        .allow_origin(cors::Any);

    // configure tracing middleware
    let trace = TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
        let conn_info = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .expect("connectinfo extension to be present");
        let span = span!(
        Level::DEBUG,
            "http_request",
            method = ?request.method(),
            uri = ?request.uri(),
            src = %conn_info.0,
            );
        span
    });

    // configure rate limiting middleware
    let rate_limit = rate_limiting::create();

    // configure routes
    //
    // only user creation gets a rate limit
    let router = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/healthcheck", get(|| async { Json(json!({ "state": "OK" })) }))
        .route("/users/create", post(users::create.layer(rate_limit)))
        .route("/users/auth", get(users::auth))
        .route("/syncs/progress", put(sync::update))
        .route("/syncs/progress/{document}", get(sync::get))
        .route("/documents/link", post(books::create_links))
        .route("/documents/links", get(books::list_links))
        .route("/documents/link/{hash}", delete(books::delete_link))
        .route("/books", get(books::list))
        .route("/books/label", put(books::set_label))
        .route("/books/label/{hash}", delete(books::delete_label))
        .route("/card/{username}", get(card::get))
        .with_state(state);

    // configure app
    router.layer(cors).layer(trace)
}
