//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Shared application state for the SCEP HTTP layer.

use crate::backend::CaBackend;
use crate::envelope::ContentAlgorithm;
use std::sync::Arc;

/// State handed to every request handler.
///
/// The CA backend is the only shared resource; everything else is
/// per-request. Cloning is cheap (one `Arc` bump).
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn CaBackend>,
    /// Content-encryption algorithm for CertRep envelopes.
    pub algorithm: ContentAlgorithm,
    /// Validate client signingTime against the signer certificate window.
    pub check_signing_time: bool,
}

impl AppState {
    pub fn new(backend: Arc<dyn CaBackend>) -> Self {
        Self {
            backend,
            algorithm: ContentAlgorithm::DesEde3Cbc,
            check_signing_time: true,
        }
    }

    pub fn with_algorithm(mut self, algorithm: ContentAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn without_signing_time_check(mut self) -> Self {
        self.check_signing_time = false;
        self
    }
}
