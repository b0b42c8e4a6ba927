//! Request and response types for the monitoring API.
//!
//! All structs use camelCase serialization to match the API's JSON format.

use serde::{Deserialize, Serialize};

/// Envelope returned by every `/monitoring/*` submission endpoint.
///
/// A missing `success` field reads as `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<SubmitData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitData {
    /// Server-side id of the accepted submission.
    #[serde(default)]
    pub submission_id: Option<String>,
}

impl SubmitResponse {
    pub fn accepted(submission_id: Option<&str>) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(SubmitData {
                submission_id: submission_id.map(str::to_string),
            }),
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn submission_id(&self) -> Option<&str> {
        self.data.as_ref()?.submission_id.as_deref()
    }
}
