//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! HTTP layer for the SCEP service: request dispatch, method policy, and
//! response framing over axum.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;

pub use config::Config;
pub use router::{create_router, SCEP_PATH};
pub use state::AppState;
