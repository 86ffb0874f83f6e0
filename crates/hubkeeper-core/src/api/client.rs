//! Client for the GitHub REST identity endpoint.
//!
//! Used both to sign in straight against GitHub and to validate personal
//! access tokens before they are adopted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::GitHubAccount;

use super::Failure;

/// Response header listing the scopes granted to the token
const OAUTH_SCOPES_HEADER: &str = "x-oauth-scopes";

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Option<Value>,
    login: Option<String>,
    name: Option<String>,
    node_id: Option<String>,
    avatar_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

/// The account a token belongs to, with the scopes it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub account: GitHubAccount,
    pub scopes: BTreeSet<String>,
}

/// Parse an `x-oauth-scopes` header value into a set.
///
/// Entries are comma-separated; surrounding whitespace and empty entries are dropped.
pub fn parse_scopes(header: &str) -> BTreeSet<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// GitHub API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Create a new GitHubClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, Failure> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(GITHUB_ACCEPT));
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("token {}", token))
                    .map_err(|_| Failure::validation("Token contains invalid characters"))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, Failure> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Failure::from_status(status, &body))
        }
    }

    /// `GET /user` for the client's token.
    pub async fn fetch_authenticated_user(&self) -> Result<AuthenticatedUser, Failure> {
        let url = format!("{}/user", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        let scopes = response
            .headers()
            .get(OAUTH_SCOPES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_scopes)
            .unwrap_or_default();

        let body: UserResponse = response
            .json()
            .await
            .map_err(|_| Failure::protocol("Invalid response from GitHub API"))?;

        let id = body.id.as_ref().and_then(Value::as_i64);
        let login = body.login.filter(|l| !l.is_empty());
        let (Some(id), Some(login)) = (id, login) else {
            return Err(Failure::protocol("Invalid response from GitHub API"));
        };

        debug!(github_id = id, scopes = scopes.len(), "Fetched authenticated GitHub user");

        Ok(AuthenticatedUser {
            account: GitHubAccount {
                id,
                node_id: body.node_id.unwrap_or_default(),
                login,
                name: body.name,
                avatar_url: body.avatar_url.unwrap_or_default(),
                created_at: body.created_at,
                updated_at: body.updated_at,
            },
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_parse_scopes() {
        assert_eq!(
            parse_scopes("repo, read:org ,user"),
            BTreeSet::from(["repo".to_string(), "read:org".to_string(), "user".to_string()])
        );
        assert!(parse_scopes("").is_empty());
        assert!(parse_scopes(" , ,").is_empty());
        assert_eq!(parse_scopes("repo,,repo").len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_authenticated_user_uses_token_scheme() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/user")
            .match_header("authorization", "token ghp_abc")
            .with_status(200)
            .with_header("x-oauth-scopes", "repo, notifications")
            .with_body(r#"{"id": 583231, "login": "octocat", "node_id": "MDQ6VXNlcjU4MzIzMQ==", "name": "The Octocat", "avatar_url": "https://a/u/1", "created_at": "2011-01-25T18:44:36Z", "updated_at": "2024-01-01T00:00:00Z"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url()).with_token("ghp_abc");
        let user = client.fetch_authenticated_user().await.expect("user");
        assert_eq!(user.account.id, 583231);
        assert_eq!(user.account.login, "octocat");
        assert!(user.scopes.contains("repo"));
        assert!(user.scopes.contains("notifications"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_authenticated_user_rejects_incomplete_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(r#"{"id": "583231", "login": "octocat"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url()).with_token("t");
        let err = client.fetch_authenticated_user().await.expect_err("non numeric id");
        assert_eq!(err.to_string(), "Invalid response from GitHub API");
    }

    #[tokio::test]
    async fn test_fetch_authenticated_user_maps_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url()).with_token("t");
        let err = client.fetch_authenticated_user().await.expect_err("401");
        assert!(matches!(err, Failure::Http { status: 401, .. }));
    }
}
