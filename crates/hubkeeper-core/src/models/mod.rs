//! Data models for the authenticated session.
//!
//! This module contains the data structures shared by the exchanger, the
//! personal-token controller and the session keeper:
//!
//! - `Session`, `User`: the authenticated user record and its app token
//! - `GitHubIdentity`, `GitHubAccount`, `GitHubCredential`: linked GitHub data
//! - `Plan`, `FeatureFlags`: subscription state, including trial boundaries

pub mod github;
pub mod plan;
pub mod user;

pub use github::{GitHubAccount, GitHubCredential, GitHubIdentity, Installation};
pub use plan::{FeatureFlags, Plan};
pub use user::{AppToken, Session, User};
