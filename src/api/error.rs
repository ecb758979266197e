use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Status {status}: {}", .message.as_deref().unwrap_or("no details"))]
    RequestError { status: u16, message: Option<String> },
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ApiError {
    /// Human readable message supplied by the server, if it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::RequestError { message, .. } => message.as_deref(),
            ApiError::NotFound(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Pulls the error text out of a JSON error body. Understands `detail`
/// (plain string or a list of `{msg}` objects), `message` and `error`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(detail) = value.get("detail") {
        if let Some(text) = detail.as_str() {
            return Some(text.to_string());
        }
        if let Some(items) = detail.as_array() {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if !messages.is_empty() {
                return Some(messages.join("; "));
            }
        }
    }

    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
