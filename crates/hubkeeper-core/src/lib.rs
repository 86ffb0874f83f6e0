//! hubkeeper core library.
//!
//! Authentication and session lifecycle for a GitHub-backed client:
//! exchanging an app token for a session, validating personal access tokens,
//! keeping a session fresh in the background, and the side effects that
//! follow login, logout and account deletion.
//!
//! Hosts own the `Store`, start a `Reactor` and a `SessionKeeper` on a tokio
//! runtime, and plug their own crash reporting, analytics and dialogs in
//! through the traits in `collaborators`.

pub mod api;
pub mod auth;
pub mod collaborators;
pub mod config;
pub mod models;
pub mod reactor;
pub mod store;
pub mod utils;

pub use auth::{AuthError, ErrorKind};
pub use config::{AuthMode, Config};
pub use reactor::{Reactor, ReactorDeps};
pub use store::{AppState, Event, Store};
