//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Service configuration loaded from environment variables.

use std::env;

/// Runtime configuration for the SCEP HTTP service.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Set via SCEP_SKIP_SIGNING_TIME_CHECK=1 for clients with broken clocks.
    pub skip_signing_time_check: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("SCEP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let skip_signing_time_check = env::var("SCEP_SKIP_SIGNING_TIME_CHECK")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Config {
            port,
            skip_signing_time_check,
        }
    }
}
