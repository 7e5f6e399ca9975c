use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChatNameRequest {
    pub new_name: Option<String>,
    pub int_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub token: String,
    pub ip: String,
}

// -- Raw queries --

/// `params` is an array for positional placeholders, an object for named
/// placeholders, or a single scalar bound to the first placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub stmt: String,
    #[serde(default)]
    pub params: Value,
}

/// One result row of `exec`, keyed by column name.
pub type Row = serde_json::Map<String, Value>;
