//! Hosting collaborator: publishes the artifact bundle as a public gist.
//!
//! Hosting failure yields no deliverable at all, never a fallback to a
//! non-public location, because an unreachable delivery is equivalent to no
//! delivery.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value, json};
use thiserror::Error;

use super::files::GeneratedFile;

const GIST_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("hosting API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("hosting response had no URL")]
    MissingUrl,
}

/// The hosting seam: `publish(files, summary) -> url`.
pub trait ArtifactHost {
    async fn publish(
        &self,
        files: &[GeneratedFile],
        summary: &str,
    ) -> Result<String, PublishError>;
}

/// Publishes bundles as public GitHub gists.
pub struct GistHost {
    token: String,
    client: Client,
    base_url: String,
}

impl GistHost {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, GIST_API_URL.to_string())
    }

    /// Create a host pointing at a custom base URL (useful for testing).
    pub fn with_base_url(token: String, base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");
        Self {
            token,
            client,
            base_url,
        }
    }
}

impl ArtifactHost for GistHost {
    async fn publish(
        &self,
        files: &[GeneratedFile],
        summary: &str,
    ) -> Result<String, PublishError> {
        let mut gist_files = Map::new();
        gist_files.insert("SUMMARY.md".to_string(), json!({ "content": summary }));
        for file in files {
            // Gists have no directories; flatten the path.
            let name = file.path.replace('/', "__");
            let content = if file.content.is_empty() {
                "\n"
            } else {
                file.content.as_str()
            };
            gist_files.insert(name, json!({ "content": content }));
        }

        let body = json!({
            "description": "gigbot deliverable",
            "public": true,
            "files": Value::Object(gist_files),
        });

        let response = self
            .client
            .post(format!("{}/gists", self.base_url))
            .header("authorization", format!("Bearer {}", self.token))
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "gigbot")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(PublishError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        body.get("html_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(PublishError::MissingUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn publish_returns_html_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gists"))
            .and(header("authorization", "Bearer gh-tok"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "abc",
                "html_url": "https://gist.github.com/u/abc"
            })))
            .mount(&server)
            .await;

        let host = GistHost::with_base_url("gh-tok".into(), server.uri());
        let files = vec![GeneratedFile::new("src/index.js", "console.log(1);")];
        let url = host.publish(&files, "# Summary").await.unwrap();
        assert_eq!(url, "https://gist.github.com/u/abc");
    }

    #[tokio::test]
    async fn publish_maps_api_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let host = GistHost::with_base_url("bad".into(), server.uri());
        let err = host.publish(&[], "s").await.unwrap_err();
        match err {
            PublishError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad credentials");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn publish_rejects_missing_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "x"})))
            .mount(&server)
            .await;

        let host = GistHost::with_base_url("tok".into(), server.uri());
        let err = host.publish(&[], "s").await.unwrap_err();
        assert!(matches!(err, PublishError::MissingUrl));
    }
}
