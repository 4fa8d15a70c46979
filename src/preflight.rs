//! Pre-Flight Verifier: a submitted link must be live at submission time.
//!
//! Any status outside 200–399, any transport error or a timeout yields
//! `false`, which keeps the job in `awarded` and discards the deliverable so
//! it is regenerated and re-hosted next cycle.

use std::time::Duration;

use reqwest::Client;

pub struct PreflightVerifier {
    client: Client,
}

impl Default for PreflightVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PreflightVerifier {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Lightweight existence check. 200–399 covers redirects to canonical
    /// content; everything else is an unreachable deliverable.
    pub async fn verify(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => (200..400).contains(&response.status().as_u16()),
            Err(_) => false,
        }
    }
}
