//! `SubmissionClient` over HTTP.

use serde_json::Value;

use super::client::ApiClient;
use super::types::SubmitResponse;
use crate::error::ClientError;
use crate::sync::SubmissionClient;

/// Longest slice of a non-JSON error body kept as the failure message.
const MAX_ERROR_BODY: usize = 200;

impl SubmissionClient for ApiClient {
    async fn post_submission(
        &self,
        endpoint: &str,
        payload: &Value,
    ) -> Result<SubmitResponse, ClientError> {
        let response = self.authenticated_post(endpoint, payload).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        log::debug!("POST {} -> {}", endpoint, status);
        interpret_response(status, &body)
    }
}

/// Map an HTTP status and body onto the submission envelope.
///
/// A non-2xx answer that still carries the envelope is returned as a
/// rejection with the server's message; anything else non-2xx is
/// `ClientError::Rejected`.
pub fn interpret_response(status: u16, body: &str) -> Result<SubmitResponse, ClientError> {
    let envelope = serde_json::from_str::<SubmitResponse>(body);

    if (200..300).contains(&status) {
        return envelope.map_err(|e| ClientError::Decode(e.to_string()));
    }

    match envelope {
        Ok(mut envelope) => {
            envelope.success = false;
            Ok(envelope)
        }
        Err(_) => Err(ClientError::Rejected {
            status,
            message: body.trim().chars().take(MAX_ERROR_BODY).collect(),
        }),
    }
}
