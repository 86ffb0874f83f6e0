use crate::auth::AuthError;
use crate::models::{AppToken, GitHubCredential, Session, User};

use super::state::ThemePreferences;

/// Everything that can happen to the session, as seen by the store.
#[derive(Debug, Clone)]
pub enum Event {
    /// Ask for a (re)login with the given app token
    LoginRequest { app_token: AppToken },
    LoginSuccess {
        app_token: AppToken,
        user: Box<User>,
        /// Value of the login-success counter after this event was reduced.
        /// Stamped by `Store::dispatch`; whatever the caller sets is overwritten.
        login_count: u64,
    },
    LoginFailure(AuthError),
    Logout,
    DeleteAccountRequest,
    DeleteAccountSuccess,
    DeleteAccountFailure(AuthError),
    /// Persisted state was loaded after a restart
    Rehydrate { session: Option<Box<Session>> },
    UserDataUpdate(ThemePreferences),
    /// Swap the locally held personal token (or drop it with `None`)
    PersonalTokenReplaced(Option<GitHubCredential>),
    CleanupArchivedItems,
}

impl Event {
    pub fn login_success(app_token: AppToken, user: User) -> Self {
        Event::LoginSuccess {
            app_token,
            user: Box::new(user),
            login_count: 0,
        }
    }

    /// Stable event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::LoginRequest { .. } => "login-request",
            Event::LoginSuccess { .. } => "login-success",
            Event::LoginFailure(_) => "login-failure",
            Event::Logout => "logout",
            Event::DeleteAccountRequest => "delete-account-request",
            Event::DeleteAccountSuccess => "delete-account-success",
            Event::DeleteAccountFailure(_) => "delete-account-failure",
            Event::Rehydrate { .. } => "rehydrate",
            Event::UserDataUpdate(_) => "user-data-update",
            Event::PersonalTokenReplaced(_) => "personal-token-replaced",
            Event::CleanupArchivedItems => "cleanup-archived-items",
        }
    }
}
