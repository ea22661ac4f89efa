use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transport-independent view of an inbound webhook call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Value,
}

impl WebhookRequest {
    pub fn post(body: Value) -> Self {
        Self {
            method: "POST".to_string(),
            body,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: Value,
}

impl WebhookResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: serde_json::json!({ "error": "agent not found" }),
        }
    }

    pub fn conflict() -> Self {
        Self {
            status: 409,
            body: serde_json::json!({ "error": "agent is already running" }),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            status: 405,
            body: serde_json::json!({ "error": "agent does not accept webhooks" }),
        }
    }
}
