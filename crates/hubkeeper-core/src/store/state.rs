use crate::auth::AuthError;
use crate::models::{AppToken, GitHubAccount, Plan, User};

use super::Event;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub app_token: Option<AppToken>,
    pub user: Option<User>,
    pub is_logging_in: bool,
    pub is_deleting_account: bool,
    pub error: Option<AuthError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounters {
    pub login_success: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemePreferences {
    pub theme_id: Option<String>,
    pub preferred_dark_theme_id: Option<String>,
    pub preferred_light_theme_id: Option<String>,
}

/// Immutable snapshot of everything the auth subsystem reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub auth: AuthState,
    pub counters: EventCounters,
    pub theme: ThemePreferences,
}

impl AppState {
    /// Produce the state that follows `event`.
    pub fn reduce(&self, event: &Event) -> AppState {
        let mut next = self.clone();
        match event {
            Event::LoginRequest { .. } => {
                next.auth.is_logging_in = true;
                next.auth.error = None;
            }
            Event::LoginSuccess { app_token, user, .. } => {
                next.auth.app_token = Some(app_token.clone());
                next.auth.user = Some(user.as_ref().clone());
                next.auth.is_logging_in = false;
                next.auth.error = None;
                next.counters.login_success += 1;
            }
            Event::LoginFailure(error) => {
                next.auth.is_logging_in = false;
                next.auth.error = Some(error.clone());
            }
            Event::Logout | Event::DeleteAccountSuccess => {
                next.auth = AuthState::default();
            }
            Event::DeleteAccountRequest => {
                next.auth.is_deleting_account = true;
            }
            Event::DeleteAccountFailure(error) => {
                next.auth.is_deleting_account = false;
                next.auth.error = Some(error.clone());
            }
            Event::Rehydrate { session } => {
                if let Some(session) = session {
                    next.auth.app_token = Some(session.app_token.clone());
                    next.auth.user = Some(session.user.clone());
                }
            }
            Event::UserDataUpdate(theme) => {
                next.theme = theme.clone();
            }
            Event::PersonalTokenReplaced(credential) => {
                if let Some(user) = next.auth.user.as_mut() {
                    user.github_identity.personal = credential.clone();
                }
            }
            Event::CleanupArchivedItems => {}
        }
        next
    }

    pub fn app_token(&self) -> Option<&AppToken> {
        self.auth.app_token.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.auth.app_token.is_some() && self.auth.user.is_some()
    }

    pub fn current_user(&self) -> Option<&User> {
        self.auth.user.as_ref()
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.current_user().and_then(|u| u.plan.as_ref())
    }

    pub fn current_github_user(&self) -> Option<&GitHubAccount> {
        self.current_user().map(User::github_account)
    }

    pub fn event_counters(&self) -> EventCounters {
        self.counters
    }
}
