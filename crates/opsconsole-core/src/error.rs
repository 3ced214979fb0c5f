use reqwest::StatusCode;
use thiserror::Error;

/// Failure modes of a console API call.
///
/// `Unauthorized` is kept apart from the rest so callers can stay quiet about
/// it: the client has already redirected to the login page by the time it is
/// returned.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session expired, sign in again")]
    Unauthorized,
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("response was not valid JSON: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// The `error` field of a JSON error body, e.g. a 400 `{"error": "..."}`.
    pub fn server_message(&self) -> Option<String> {
        match self {
            ClientError::Http { body, .. } => serde_json::from_str::<serde_json::Value>(body)
                .ok()?
                .get("error")?
                .as_str()
                .map(str::to_string),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_comes_from_json_error_bodies() {
        let err = ClientError::Http {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error":"No pending actions"}"#.to_string(),
        };
        assert_eq!(err.server_message().as_deref(), Some("No pending actions"));

        let err = ClientError::Http {
            status: StatusCode::BAD_GATEWAY,
            body: "<html>".to_string(),
        };
        assert_eq!(err.server_message(), None);
        assert_eq!(ClientError::Unauthorized.server_message(), None);
    }
}
