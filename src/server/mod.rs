pub mod api;
pub mod auth;

use crate::agent::MentorAgent;
use crate::cli::Args;
use self::api::{ build_router, AppState };
use log::{ info, warn };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<MentorAgent>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<MentorAgent>, args: Args) -> Self {
        Self { addr, agent, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let state = AppState::new(
            Arc::clone(&self.agent),
            self.args.server_api_key.clone(),
            self.args.rate_limit_per_second
        );
        if state.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            info!("Request signing required ({} / {})", auth::TS_HEADER, auth::SIGN_HEADER);
        }
        let app = build_router(state);

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                let _ = rustls::crypto::ring::default_provider().install_default();
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_path,
                    key_path
                ).await?;

                info!("Starting HTTPS API server on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            (enable_tls, _, _) => {
                if enable_tls {
                    warn!("ENABLE_TLS set without TLS_CERT_PATH and TLS_KEY_PATH; serving plain HTTP");
                }
                let listener = tokio::net::TcpListener::bind(addr).await?;
                info!("Starting HTTP API server on: http://{}", addr);
                axum::serve(listener, app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
