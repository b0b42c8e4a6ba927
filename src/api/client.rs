//! HTTP client with auth header injection and field-agent client type header.
//!
//! All requests include `X-Client-Type: field-agent` so the backend applies
//! its mobile submission rules (deduplication by `clientSubmissionId`).

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use tokio::sync::RwLock;

pub const CLIENT_TYPE: &str = "field-agent";

/// HTTP client wrapper for monitoring API communication.
///
/// Manages base URL and access token. The request timeout here is the only
/// timeout applied to a submission POST.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client with the given base URL.
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store the access token for authenticated requests.
    pub async fn set_access_token(&self, token: String) {
        let mut guard = self.access_token.write().await;
        *guard = Some(token);
    }

    /// Clear the access token (used on logout).
    pub async fn clear_access_token(&self) {
        let mut guard = self.access_token.write().await;
        *guard = None;
    }

    /// Send an authenticated POST request with a JSON body to a relative API path.
    pub async fn authenticated_post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.access_token.read().await.clone();

        let mut builder = self
            .client
            .post(&url)
            .header("X-Client-Type", CLIENT_TYPE)
            .json(body);

        if let Some(ref t) = token {
            builder = builder.bearer_auth(t);
        }

        builder.send().await
    }
}
