//! Common test utilities for integration tests
//!
//! Provides shared initialization code, including rustls crypto provider setup.

use std::sync::Once;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // The pact mock server may already have installed a provider
        if rustls::crypto::CryptoProvider::get_default().is_some() {
            return;
        }
        // Same provider as the operator binary
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Base URL of a pact mock server without the trailing slash
pub fn base_url(url: impl std::fmt::Display) -> String {
    url.to_string().trim_end_matches('/').to_string()
}
