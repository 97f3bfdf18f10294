//! Gazette - newsletter assistant server
//!
//! Serves the JSON API the web UI talks to. All mail work happens in the
//! `mail` crate; this binary only wires configuration, logging and HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use log::{error, info, warn};
use mail::{GmailCredentials, NewsletterService, ServiceConfig};

mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cfg = ServiceConfig::from_env()?;
    let service = match NewsletterService::from_config(&cfg) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to start newsletter service: {:#}", e);
            if let Some(path) = GmailCredentials::default_credentials_path() {
                warn!(
                    "To configure Gmail access, either:\n\
                     1. Place your Google OAuth credentials at: {}\n\
                     2. Or set environment variables: GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
                    path.display()
                );
            }
            return Err(e);
        }
    };

    if cfg.summarizer.api_key.is_none() {
        warn!("OPENAI_API_KEY not set, summaries will report an error");
    }

    let addr: SocketAddr = cfg
        .bind
        .parse()
        .with_context(|| format!("Invalid GAZETTE_BIND address: {}", cfg.bind))?;

    let api = routes::api(service, &cfg.allowed_origins);
    let (addr, server) = warp::serve(api)
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Gazette listening on http://{}", addr);
    server.await;
    info!("Shut down");
    Ok(())
}
