use thiserror::Error;

use super::graphql::GraphQlErrorBody;

/// Raw failure produced by the transport and credential layers.
///
/// Nothing outside `auth::error` inspects these; they are turned into an
/// `AuthError` where they cross the exchanger/validator boundary.
#[derive(Error, Debug)]
pub enum Failure {
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Canceled")]
    Canceled,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("GraphQL request failed with status {status}")]
    GraphQl { status: u16, body: GraphQlErrorBody },

    #[error("{0}")]
    Protocol(String),

    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Failure::Timeout
        } else {
            Failure::Network(err)
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl Failure {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        Failure::Http {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Failure::Protocol(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Failure::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_short_body() {
        let failure = Failure::from_status(reqwest::StatusCode::UNAUTHORIZED, "Bad credentials");
        match failure {
            Failure::Http { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Bad credentials");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = "x".repeat(2000);
        let Failure::Http { body, .. } =
            Failure::from_status(reqwest::StatusCode::BAD_GATEWAY, &body)
        else {
            panic!("expected Http failure");
        };
        assert!(body.starts_with(&"x".repeat(500)));
        assert!(body.ends_with("(truncated, 2000 total bytes)"));
    }
}
