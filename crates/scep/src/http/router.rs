//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Axum router composition for the SCEP service.
//!
//! Routes:
//!   ANY   /scep/pkiclient.exe  — SCEP dispatcher (method policy per operation)
//!   GET   /healthz             — health check
//!
//! The SCEP path accepts every method so the dispatcher can answer 405 with
//! the correct `Allow` header per operation; method policy is not expressible
//! at the route level because it depends on the `operation` query parameter.

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use super::{
    handlers::{health_handler, scep_handler},
    state::AppState,
};

/// The single SCEP endpoint path (Cisco pkiclient.exe convention).
pub const SCEP_PATH: &str = "/scep/pkiclient.exe";

/// Compose the axum router for the SCEP service.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(SCEP_PATH, any(scep_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
