//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! TrustEdge SCEP Server — thin entry point for the axum HTTP service.
//!
//! All protocol logic lives in `trustedge_scep`. This binary is responsible
//! only for: CLI parsing, env config loading, CA backend construction,
//! server binding, and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use trustedge_scep::http::{create_router, AppState, Config, SCEP_PATH};
use trustedge_scep_server::ca::MemoryCa;

/// TrustEdge SCEP Server — SCEP enrolment endpoint with an in-memory demo CA.
#[derive(Parser)]
#[command(
    name = "trustedge-scep-server",
    version = env!("CARGO_PKG_VERSION"),
    about = "TrustEdge SCEP Server — privacy and trust at the edge"
)]
struct Cli {
    /// Listen port (overrides SCEP_PORT; default 8080)
    #[arg(long)]
    port: Option<u16>,

    /// PKCS#8 PEM file with the CA private key; omit for an ephemeral CA
    #[arg(long, requires = "ca_cert")]
    ca_key: Option<PathBuf>,

    /// PEM file with the CA certificate
    #[arg(long, requires = "ca_key")]
    ca_cert: Option<PathBuf>,

    /// Subject for the ephemeral CA certificate
    #[arg(long, default_value = "CN=TrustEdge SCEP CA")]
    ca_subject: String,

    /// Challenge password enrolments must present
    #[arg(long, default_value = "password")]
    challenge: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let port = cli.port.unwrap_or(config.port);

    let backend = match (&cli.ca_key, &cli.ca_cert) {
        (Some(key_path), Some(cert_path)) => {
            tracing::info!(key = %key_path.display(), cert = %cert_path.display(), "loading CA identity");
            MemoryCa::from_pem_files(key_path, cert_path, &cli.challenge)?
        }
        _ => {
            tracing::info!(subject = %cli.ca_subject, "generating ephemeral CA identity");
            MemoryCa::generate(&cli.ca_subject, &cli.challenge)?
        }
    };

    tracing::info!(
        "trustedge-scep-server v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Port: {}", port);
    tracing::info!("Routes: ANY {}, GET /healthz", SCEP_PATH);
    if config.skip_signing_time_check {
        tracing::warn!("signingTime validation disabled via SCEP_SKIP_SIGNING_TIME_CHECK");
    }

    let state = AppState::new(Arc::new(backend));
    let state = if config.skip_signing_time_check {
        state.without_signing_time_check()
    } else {
        state
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("Listening on 0.0.0.0:{port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
