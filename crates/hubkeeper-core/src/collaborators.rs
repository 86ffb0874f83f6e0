//! Interfaces to the parts of the application this crate does not own.
//!
//! Crash reporting, analytics, dialogs, the review prompt, the page/host
//! reload and the clock are all injected so hosts and tests can swap them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::auth::AuthError;
use crate::store::AppState;

pub trait CrashReporter: Send + Sync {
    fn notify(&self, error: &AuthError, context: Option<&str>);
    fn set_user(&self, id: Option<&str>, label: Option<&str>);
}

pub trait Analytics: Send + Sync {
    fn track_event(&self, category: &str, action: &str, label: Option<&str>, value: Option<i64>);
    fn set_user(&self, id: Option<&str>);
    fn set_dimensions(&self, dimensions: &Dimensions);
}

/// Removes OAuth redirect parameters from whatever the host navigates.
pub trait QueryParamCleaner: Send + Sync {
    fn clear_oauth_params(&self);
}

/// Blocking, user-facing error dialog
pub trait ErrorPresenter: Send + Sync {
    fn show_error(&self, title: &str, message: &str);
}

pub trait ReviewPrompt: Send + Sync {
    fn request_review(&self);
}

/// The environment the session runs in.
pub trait Host: Send + Sync {
    /// Whether a full reload of the environment is possible (e.g. a web page).
    fn can_reload(&self) -> bool;
    fn reload(&self);
}

/// Source of "now" and of timed suspension for the session keeper.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Identity and dimension metadata forwarded to analytics and crash reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub user_id: Option<String>,
    pub github_login: Option<String>,
    pub theme_id: Option<String>,
    pub preferred_dark_theme_id: Option<String>,
    pub preferred_light_theme_id: Option<String>,
    pub plan_amount: Option<i64>,
}

impl Dimensions {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            user_id: state.current_user().map(|u| u.id.clone()),
            github_login: state.current_github_user().map(|g| g.login.clone()),
            theme_id: state.theme.theme_id.clone(),
            preferred_dark_theme_id: state.theme.preferred_dark_theme_id.clone(),
            preferred_light_theme_id: state.theme.preferred_light_theme_id.clone(),
            plan_amount: state.current_plan().map(|p| p.amount),
        }
    }
}

/// Collaborator that does nothing; for hosts without a given sink.
pub struct Noop;

impl CrashReporter for Noop {
    fn notify(&self, _error: &AuthError, _context: Option<&str>) {}
    fn set_user(&self, _id: Option<&str>, _label: Option<&str>) {}
}

impl Analytics for Noop {
    fn track_event(&self, _category: &str, _action: &str, _label: Option<&str>, _value: Option<i64>) {}
    fn set_user(&self, _id: Option<&str>) {}
    fn set_dimensions(&self, _dimensions: &Dimensions) {}
}

impl QueryParamCleaner for Noop {
    fn clear_oauth_params(&self) {}
}

impl ErrorPresenter for Noop {
    fn show_error(&self, _title: &str, _message: &str) {}
}

impl ReviewPrompt for Noop {
    fn request_review(&self) {}
}

impl Host for Noop {
    fn can_reload(&self) -> bool {
        false
    }

    fn reload(&self) {}
}

/// The bundle of sinks shared by the exchanger, the token controller and the reactor.
#[derive(Clone)]
pub struct Collaborators {
    pub crash: Arc<dyn CrashReporter>,
    pub analytics: Arc<dyn Analytics>,
    pub query_params: Arc<dyn QueryParamCleaner>,
    pub presenter: Arc<dyn ErrorPresenter>,
    pub review: Arc<dyn ReviewPrompt>,
}

impl Collaborators {
    pub fn noop() -> Self {
        Self {
            crash: Arc::new(Noop),
            analytics: Arc::new(Noop),
            query_params: Arc::new(Noop),
            presenter: Arc::new(Noop),
            review: Arc::new(Noop),
        }
    }

    /// Crash-report a failure and show it to the user.
    ///
    /// Timeouts and cancellations are swallowed.
    pub fn report(&self, error: &AuthError, context: &str, title: &str) {
        if error.is_silent() {
            return;
        }
        warn!(kind = error.name(), status = ?error.status(), context, "Auth operation failed");
        self.crash.notify(error, Some(context));
        self.presenter.show_error(title, error.message());
    }
}
