//! Normalization of every failure that crosses the auth boundary.
//!
//! `AuthError` values can only be built through [`normalize`] and
//! [`normalize_value`]; callers inspect them but never assemble them.

use serde_json::Value;
use thiserror::Error;

use crate::api::graphql::GraphQlErrorBody;
use crate::api::Failure;

const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";
const TIMEOUT_MESSAGE: &str = "Timeout";
const CANCELED_MESSAGE: &str = "Canceled";

/// GraphQL `extensions.code` the backend uses for a dead app token
const UNAUTHENTICATED_CODE: &str = "unauthenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Http,
    Protocol,
    GraphQl,
    Validation,
    Storage,
    UserCanceled,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Network => "NetworkError",
            ErrorKind::Http => "HttpError",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::GraphQl => "GraphQLError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::UserCanceled => "UserCanceled",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unknown => "Error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct AuthError {
    kind: ErrorKind,
    name: String,
    message: String,
    status: Option<u16>,
    response: Option<GraphQlErrorBody>,
}

impl AuthError {
    fn plain(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            message: message.into(),
            status: None,
            response: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn response(&self) -> Option<&GraphQlErrorBody> {
        self.response.as_ref()
    }

    /// True when any reported GraphQL error is tagged `unauthenticated`.
    pub fn is_unauthenticated(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|body| body.has_code(UNAUTHENTICATED_CODE))
    }

    /// 401s and unauthenticated GraphQL errors invalidate the session.
    pub fn requires_logout(&self) -> bool {
        self.status == Some(401) || self.is_unauthenticated()
    }

    /// Timeouts and user cancellations never reach a dialog or crash report.
    pub fn is_silent(&self) -> bool {
        matches!(self.kind, ErrorKind::UserCanceled | ErrorKind::Timeout)
            || self.message == TIMEOUT_MESSAGE
            || self.message == CANCELED_MESSAGE
    }
}

/// Convert a typed transport/credential failure into an `AuthError`.
pub fn normalize(failure: Failure) -> AuthError {
    match failure {
        Failure::GraphQl { status, body } => {
            let message = body
                .first_message()
                .unwrap_or("GraphQL request failed")
                .to_string();
            AuthError {
                kind: ErrorKind::GraphQl,
                name: ErrorKind::GraphQl.name().to_string(),
                message,
                status: Some(status),
                response: Some(body),
            }
        }
        Failure::Http { status, body } => {
            let message = if body.is_empty() {
                format!("Request failed with status {}", status)
            } else {
                body
            };
            AuthError {
                status: Some(status),
                ..AuthError::plain(ErrorKind::Http, message)
            }
        }
        Failure::Network(err) => AuthError::plain(ErrorKind::Network, err.to_string()),
        Failure::Timeout => AuthError::plain(ErrorKind::Timeout, TIMEOUT_MESSAGE),
        Failure::Canceled => AuthError::plain(ErrorKind::UserCanceled, CANCELED_MESSAGE),
        Failure::Protocol(message) => AuthError::plain(ErrorKind::Protocol, message),
        Failure::Validation(message) => AuthError::plain(ErrorKind::Validation, message),
        Failure::Storage(message) => AuthError::plain(ErrorKind::Storage, message),
    }
}

/// Convert an arbitrary JSON value into an `AuthError`.
///
/// Recognizes `{response: {status: <number>, data: {errors: [..non-empty..]}}}`;
/// anything else keeps only a name and message.
pub fn normalize_value(value: &Value) -> AuthError {
    if let Some(err) = graphql_shaped(value) {
        return err;
    }

    let Some(object) = value.as_object() else {
        return AuthError::plain(ErrorKind::Unknown, UNKNOWN_ERROR_MESSAGE);
    };

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty());
    let Some(message) = message else {
        return AuthError::plain(ErrorKind::Unknown, UNKNOWN_ERROR_MESSAGE);
    };

    let kind = match message {
        TIMEOUT_MESSAGE => ErrorKind::Timeout,
        CANCELED_MESSAGE => ErrorKind::UserCanceled,
        _ => ErrorKind::Unknown,
    };
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(kind.name());

    AuthError {
        name: name.to_string(),
        ..AuthError::plain(kind, message)
    }
}

fn graphql_shaped(value: &Value) -> Option<AuthError> {
    let response = value.get("response")?;
    let status = response.get("status")?.as_u64()?;
    let data = response.get("data")?;
    let has_errors = data
        .get("errors")
        .and_then(Value::as_array)
        .is_some_and(|errors| !errors.is_empty());
    if !has_errors {
        return None;
    }

    let body: GraphQlErrorBody = serde_json::from_value(data.clone()).ok()?;
    let status = u16::try_from(status).ok()?;
    Some(normalize(Failure::GraphQl { status, body }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_graphql_shape_round_trips_status_and_errors() {
        let value = json!({
            "response": {
                "status": 400,
                "data": {"errors": [
                    {"message": "Token expired", "extensions": {"code": "UNAUTHENTICATED"}},
                    {"message": "second"}
                ]}
            }
        });
        let err = normalize_value(&value);
        assert_eq!(err.kind(), ErrorKind::GraphQl);
        assert_eq!(err.status(), Some(400));
        let body = err.response().expect("response kept");
        assert_eq!(body.errors.len(), 2);
        assert_eq!(body.errors[0].message, "Token expired");
        assert_eq!(body.errors[1].message, "second");
        assert_eq!(err.message(), "Token expired");
        assert!(err.is_unauthenticated());
        assert!(err.requires_logout());
    }

    #[test]
    fn test_empty_errors_array_is_not_graphql_shaped() {
        let value = json!({
            "message": "boom",
            "response": {"status": 500, "data": {"errors": []}}
        });
        let err = normalize_value(&value);
        assert_eq!(err.status(), None);
        assert!(err.response().is_none());
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_non_numeric_status_is_not_graphql_shaped() {
        let value = json!({
            "message": "weird",
            "response": {"status": "400", "data": {"errors": [{"message": "x"}]}}
        });
        assert_eq!(normalize_value(&value).status(), None);
    }

    #[test]
    fn test_plain_error_copies_name_and_message() {
        let err = normalize_value(&json!({"name": "TypeError", "message": "Failed to fetch"}));
        assert_eq!(err.name(), "TypeError");
        assert_eq!(err.message(), "Failed to fetch");
        assert_eq!(err.status(), None);
        assert!(err.response().is_none());
    }

    #[test]
    fn test_non_error_values_become_unknown() {
        for value in [json!(null), json!(42), json!("oops"), json!({}), json!([1, 2])] {
            let err = normalize_value(&value);
            assert_eq!(err.kind(), ErrorKind::Unknown);
            assert_eq!(err.message(), "Unknown error");
            assert_eq!(err.status(), None);
        }
    }

    #[test]
    fn test_timeout_and_cancel_are_silent() {
        assert!(normalize(Failure::Timeout).is_silent());
        assert!(normalize(Failure::Canceled).is_silent());
        assert!(normalize_value(&json!({"message": "Timeout"})).is_silent());
        assert!(!normalize(Failure::protocol("bad")).is_silent());
    }

    #[test]
    fn test_http_failure_keeps_status_but_no_response() {
        let err = normalize(Failure::Http {
            status: 401,
            body: "Bad credentials".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.status(), Some(401));
        assert!(err.response().is_none());
        assert!(err.requires_logout());

        let forbidden = normalize(Failure::Http {
            status: 403,
            body: String::new(),
        });
        assert!(!forbidden.requires_logout());
        assert_eq!(forbidden.message(), "Request failed with status 403");
    }

    #[test]
    fn test_typed_failures_never_set_status() {
        for failure in [
            Failure::protocol("missing appToken"),
            Failure::validation("wrong scope"),
            Failure::Storage("keychain locked".to_string()),
        ] {
            let err = normalize(failure);
            assert_eq!(err.status(), None);
            assert!(err.response().is_none());
        }
    }
}
