//! The main server which combines the HTTP server with the store.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    auth::AuthGate,
    canonical::Resolver,
    config::Config,
    http::HttpServer,
    state::AppState,
    store::{EntityStore, open_store},
};

/// Spawn the server and run until the `Ctrl-C` signal is received, then shutdown.
pub async fn run_with_config_until_ctrl_c(config: Config) -> Result<()> {
    let store = open_store(&config.storage)?;
    let server = Server::spawn(config, store).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutdown");
    server.shutdown().await?;
    Ok(())
}

/// The reading-progress sync server.
pub struct Server {
    http_server: HttpServer,
}

impl Server {
    /// Spawn the server over an already-opened store.
    pub async fn spawn(config: Config, store: Arc<dyn EntityStore>) -> Result<Self> {
        let state = AppState {
            resolver: Resolver::new(store.clone()),
            auth: AuthGate::new(store.clone(), config.auth.password_salt),
            store,
        };
        let http_server = HttpServer::spawn(config.http, state).await?;
        Ok(Self { http_server })
    }

    /// Cancel the server tasks and wait for all tasks to complete.
    pub async fn shutdown(self) -> Result<()> {
        self.http_server.shutdown().await?;
        Ok(())
    }

    /// Wait for all tasks to complete.
    ///
    /// This will run forever unless all tasks close with an error.
    pub async fn run_until_error(self) -> Result<()> {
        self.http_server.run_until_done().await
    }

    /// Spawn a server on a random localhost port, suitable for testing.
    ///
    /// Returns the server handle and the base `Url` of the HTTP server.
    #[cfg(test)]
    pub async fn spawn_for_tests(store: Arc<dyn EntityStore>) -> Result<(Self, url::Url)> {
        use std::net::{IpAddr, Ipv4Addr};

        let mut config = Config::default();
        config.http.port = 0;
        config.http.bind_addr = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
        config.auth.password_salt = "test-salt".to_string();

        let server = Self::spawn(config, store).await?;
        let addr = server.http_server.addr();
        let url = format!("http://{addr}").parse()?;
        Ok((server, url))
    }
}
