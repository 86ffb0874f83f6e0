//! Authentication and session lifecycle.
//!
//! This module provides:
//! - `SessionExchanger` / `LoginRequests`: app token to `Session`, latest request wins
//! - `PersonalTokenController`: validate, adopt and revoke a GitHub personal access token
//! - `SessionKeeper`: keeps a logged-in session fresh in the background
//! - `AuthError`: the one error shape every auth failure is normalized into
//! - `TokenVault` / `SessionFile`: local persistence of the PAT and the session

pub mod credentials;
pub mod error;
pub mod exchange;
pub mod keeper;
pub mod session;
pub mod validator;

pub use credentials::{KeyringVault, MemoryVault, TokenVault};
pub use error::{normalize, normalize_value, AuthError, ErrorKind};
pub use exchange::{LoginRequests, SessionExchanger};
pub use keeper::{decide, Decision, KeeperInput, RefreshReason, SessionKeeper};
pub use session::SessionFile;
pub use validator::{PatLoadingState, PersonalTokenController};
