//! Client for the backend GraphQL session service.

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::Failure;

const LOGIN_QUERY: &str = r#"query auth {
  login {
    appToken
    user {
      _id
      columns
      subscriptions
      github {
        app { scope token tokenType createdAt login }
        oauth { scope token tokenType createdAt login }
        personal { scope token tokenType createdAt login }
        installations { id nodeId accountLogin }
        user { id nodeId login name avatarUrl createdAt updatedAt }
      }
      plan {
        id source label amount currency interval trialPeriodDays trialEndAt cancelAt
        featureFlags {
          columnsLimit enableFilters enableSync enablePrivateRepositories
          enablePushNotifications enableDesktopPushNotifications
        }
      }
      createdAt
      updatedAt
      lastLoginAt
    }
  }
}"#;

const LOGIN_WITH_PAT_MUTATION: &str = r#"mutation loginWithPersonalAccessToken($token: String!) {
  loginWithPersonalAccessToken(token: $token) {
    appToken
  }
}"#;

const DELETE_ACCOUNT_MUTATION: &str = r#"mutation deleteAccount {
  deleteAccount
}"#;

/// Client name sent with every backend request
const CLIENT_NAME: &str = "hubkeeper";

/// A single entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<GraphQlErrorExtensions>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphQlErrorExtensions {
    pub code: Option<String>,
}

/// The error part of a GraphQL response envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphQlErrorBody {
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlErrorBody {
    pub fn first_message(&self) -> Option<&str> {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .find(|m| !m.is_empty())
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| {
            e.extensions
                .as_ref()
                .and_then(|ext| ext.code.as_deref())
                .is_some_and(|c| c.eq_ignore_ascii_case(code))
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

/// Unvalidated payload of the `login` query; the exchanger checks it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub app_token: Option<String>,
    pub user: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    login: Option<LoginPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginWithPatData {
    login_with_personal_access_token: Option<LoginPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAccountData {
    delete_account: Option<bool>,
}

/// Headers attached to every backend request; carries the app token when one is known.
pub fn default_headers(app_token: Option<&str>) -> Result<header::HeaderMap, Failure> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    headers.insert("x-client-name", header::HeaderValue::from_static(CLIENT_NAME));
    headers.insert(
        "x-client-version",
        header::HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    if let Some(token) = app_token {
        let value = header::HeaderValue::from_str(&format!("bearer {}", token))
            .map_err(|_| Failure::protocol("App token contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Client for the backend GraphQL endpoint.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct GraphQlClient {
    client: Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Fetch the app token and full user record for `app_token`.
    pub async fn login(&self, app_token: &str) -> Result<LoginPayload, Failure> {
        let data: LoginData = self.request(LOGIN_QUERY, json!({}), Some(app_token)).await?;
        data.login
            .ok_or_else(|| Failure::protocol("Invalid response: missing login payload"))
    }

    /// Trade a validated personal access token for an app token.
    pub async fn login_with_personal_access_token(&self, token: &str) -> Result<String, Failure> {
        let data: LoginWithPatData = self
            .request(LOGIN_WITH_PAT_MUTATION, json!({ "token": token }), None)
            .await?;
        data.login_with_personal_access_token
            .and_then(|payload| payload.app_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Failure::protocol("Invalid response: missing appToken"))
    }

    pub async fn delete_account(&self, app_token: &str) -> Result<(), Failure> {
        let data: DeleteAccountData = self
            .request(DELETE_ACCOUNT_MUTATION, json!({}), Some(app_token))
            .await?;
        match data.delete_account {
            Some(true) => Ok(()),
            _ => Err(Failure::protocol("Failed to delete account")),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        app_token: Option<&str>,
    ) -> Result<T, Failure> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(default_headers(app_token)?)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), bytes = text.len(), "GraphQL response received");

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(Failure::from_status(status, &text)),
            Err(e) => return Err(Failure::protocol(format!("Invalid response from server: {}", e))),
        };

        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            return Err(Failure::GraphQl {
                status: status.as_u16(),
                body: GraphQlErrorBody { errors },
            });
        }

        if !status.is_success() {
            return Err(Failure::from_status(status, &text));
        }

        let data = envelope
            .data
            .ok_or_else(|| Failure::protocol("Invalid response from server: missing data"))?;
        serde_json::from_value(data)
            .map_err(|e| Failure::protocol(format!("Invalid response from server: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client_for(server: &Server) -> GraphQlClient {
        GraphQlClient::new(Client::new(), format!("{}/graphql", server.url()))
    }

    #[test]
    fn test_default_headers_with_and_without_token() {
        let anonymous = default_headers(None).expect("headers");
        assert!(anonymous.get(header::AUTHORIZATION).is_none());

        let authed = default_headers(Some("abc")).expect("headers");
        assert_eq!(
            authed.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("bearer abc")
        );
        assert!(default_headers(Some("bad\ntoken")).is_err());
    }

    #[test]
    fn test_has_code_is_case_insensitive() {
        let body: GraphQlErrorBody = serde_json::from_str(
            r#"{"errors": [{"message": "nope", "extensions": {"code": "UNAUTHENTICATED"}}]}"#,
        )
        .expect("parse body");
        assert!(body.has_code("unauthenticated"));
        assert!(!body.has_code("forbidden"));
    }

    #[tokio::test]
    async fn test_errors_array_becomes_graphql_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(401)
            .with_body(r#"{"data": null, "errors": [{"message": "Invalid token", "extensions": {"code": "UNAUTHENTICATED"}}]}"#)
            .create_async()
            .await;

        let err = client_for(&server).login("stale").await.expect_err("should fail");
        match err {
            Failure::GraphQl { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body.errors.len(), 1);
                assert_eq!(body.errors[0].message, "Invalid token");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_becomes_http_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let err = client_for(&server).login("t").await.expect_err("should fail");
        assert!(matches!(err, Failure::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_login_with_pat_sends_token_variable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_body(mockito::Matcher::PartialJson(json!({"variables": {"token": "ghp_abc"}})))
            .with_status(200)
            .with_body(r#"{"data": {"loginWithPersonalAccessToken": {"appToken": "app-123"}}}"#)
            .create_async()
            .await;

        let app_token = client_for(&server)
            .login_with_personal_access_token("ghp_abc")
            .await
            .expect("app token");
        assert_eq!(app_token, "app-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_account_requires_confirmation() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .match_header("authorization", "bearer app-1")
            .with_status(200)
            .with_body(r#"{"data": {"deleteAccount": false}}"#)
            .create_async()
            .await;

        let err = client_for(&server).delete_account("app-1").await.expect_err("not confirmed");
        assert!(matches!(err, Failure::Protocol(_)));
    }
}
