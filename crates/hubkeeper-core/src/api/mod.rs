//! HTTP clients for the two authentication backends.
//!
//! - `GitHubClient`: the GitHub REST identity endpoint (`GET /user`)
//! - `GraphQlClient`: the backend session service (`login`,
//!   `loginWithPersonalAccessToken`, `deleteAccount`)
//!
//! Both return the raw `Failure` type; normalization happens in `auth`.

pub mod cache;
pub mod client;
pub mod error;
pub mod graphql;

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

pub use cache::ClientCache;
pub use client::{parse_scopes, AuthenticatedUser, GitHubClient};
pub use error::Failure;
pub use graphql::{GraphQlClient, GraphQlError, GraphQlErrorBody};

const USER_AGENT: &str = concat!("hubkeeper/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client used by every backend client.
pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}
