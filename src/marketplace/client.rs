use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;
use thiserror::Error;

use super::types::{AssignmentMessage, Bid, Job, JobDetail};

/// Errors at the connection level (timeout, DNS, reset). Non-2xx responses
/// are never an error here; callers branch on [`ApiResponse::status`].
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned status {status} for {path}")]
    Api { status: u16, path: String },

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// A marketplace response: status code plus parsed JSON body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Thin request/response wrapper over the marketplace HTTP API.
///
/// The only I/O boundary to the marketplace. Carries no business logic; every
/// lifecycle decision is made by the caller from status codes and bodies.
pub struct MarketplaceClient {
    token: String,
    client: Client,
    base_url: String,
}

impl MarketplaceClient {
    /// Create a client pointing at a custom base URL (also used by tests).
    pub fn new(token: String, base_url: String) -> Self {
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

    /// Perform one request. Never fails on a non-2xx status; only transport
    /// failures produce an `Err`, and those are for the caller's retry policy.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, MarketError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self
            .client
            .request(method, &url)
            .header("authorization", format!("Bearer {}", self.token));
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(ApiResponse { status, body })
    }

    /// Jobs currently open for bidding.
    pub async fn list_open_jobs(&self) -> Result<Vec<Job>, MarketError> {
        let resp = self.request(Method::GET, "/jobs?status=open", None).await?;
        if !resp.is_success() {
            return Err(MarketError::Api {
                status: resp.status,
                path: "/jobs".into(),
            });
        }
        parse_list(&resp.body, "jobs")
    }

    /// All of this agent's bids.
    pub async fn list_my_bids(&self) -> Result<Vec<Bid>, MarketError> {
        let resp = self.request(Method::GET, "/bids/mine", None).await?;
        if !resp.is_success() {
            return Err(MarketError::Api {
                status: resp.status,
                path: "/bids/mine".into(),
            });
        }
        parse_list(&resp.body, "bids")
    }

    /// Place a bid. Returns the raw status so the caller can apply its own
    /// conflict policy (409 means a bid already exists server-side).
    pub async fn place_bid(
        &self,
        job_id: &str,
        amount: f64,
        eta_seconds: u64,
        proposal: &str,
    ) -> Result<u16, MarketError> {
        let body = serde_json::json!({
            "amount": amount,
            "etaSeconds": eta_seconds,
            "proposal": proposal,
        });
        let resp = self
            .request(Method::POST, &format!("/jobs/{job_id}/bids"), Some(&body))
            .await?;
        Ok(resp.status)
    }

    /// Full job detail, including this agent's assignments.
    pub async fn get_job_detail(&self, job_id: &str) -> Result<JobDetail, MarketError> {
        let path = format!("/jobs/{job_id}");
        let resp = self.request(Method::GET, &path, None).await?;
        if !resp.is_success() {
            return Err(MarketError::Api {
                status: resp.status,
                path,
            });
        }
        // Some deployments wrap the detail in a {"job": {...}} envelope.
        let value = match &resp.body {
            Value::Object(map) if map.contains_key("job") => map.get("job").cloned().unwrap(),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| MarketError::Shape(e.to_string()))
    }

    /// Post a message on an assignment thread.
    pub async fn send_assignment_message(
        &self,
        assignment_id: &str,
        body: &str,
    ) -> Result<u16, MarketError> {
        let payload = serde_json::json!({ "body": body });
        let resp = self
            .request(
                Method::POST,
                &format!("/assignments/{assignment_id}/messages"),
                Some(&payload),
            )
            .await?;
        Ok(resp.status)
    }

    /// Messages on an assignment thread, oldest first.
    pub async fn get_assignment_messages(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<AssignmentMessage>, MarketError> {
        let path = format!("/assignments/{assignment_id}/messages");
        let resp = self.request(Method::GET, &path, None).await?;
        if !resp.is_success() {
            return Err(MarketError::Api {
                status: resp.status,
                path,
            });
        }
        parse_list(&resp.body, "messages")
    }

    /// Submit a deliverable URL + content hash. Returns the raw status; the
    /// caller treats 409 as success-equivalent (already submitted).
    pub async fn submit_deliverable(
        &self,
        job_id: &str,
        url: &str,
        content_hash: &str,
    ) -> Result<u16, MarketError> {
        let body = serde_json::json!({
            "url": url,
            "contentHash": content_hash,
        });
        let resp = self
            .request(Method::POST, &format!("/jobs/{job_id}/submit"), Some(&body))
            .await?;
        Ok(resp.status)
    }
}

/// The marketplace sometimes returns a bare array and sometimes a wrapped
/// object (`{"jobs": [...]}`). Normalize here, once, never downstream.
fn parse_list<T: serde::de::DeserializeOwned>(
    body: &Value,
    wrapper_key: &str,
) -> Result<Vec<T>, MarketError> {
    let items = match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get(wrapper_key)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                MarketError::Shape(format!("expected array or {{\"{wrapper_key}\": [...]}}"))
            })?,
        Value::Null => Vec::new(),
        other => {
            return Err(MarketError::Shape(format!(
                "expected list, got {other}"
            )));
        }
    };
    items
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| MarketError::Shape(e.to_string())))
        .collect()
}
