use serde::{Deserialize, Serialize};

/// Request body for PATCH /v4/sessions/{sessionId}.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default)]
    pub resuming: Option<bool>,
    #[serde(default)]
    pub resume_key: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Response from PATCH /v4/sessions/{sessionId}.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub resuming: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_key: Option<String>,
    pub timeout: u64,
}
