//! Terminal implementations of the core collaborator traits.

use std::sync::Arc;

use hubkeeper_core::collaborators::{
    Analytics, Collaborators, CrashReporter, Dimensions, ErrorPresenter, Noop, ReviewPrompt,
};
use hubkeeper_core::AuthError;
use tracing::{debug, error};

/// Crash reports go to the log; there is no remote collector in a terminal.
pub struct LogCrashReporter;

impl CrashReporter for LogCrashReporter {
    fn notify(&self, err: &AuthError, context: Option<&str>) {
        error!(
            kind = err.name(),
            status = ?err.status(),
            context = context.unwrap_or("-"),
            message = err.message(),
            "Auth failure"
        );
    }

    fn set_user(&self, id: Option<&str>, label: Option<&str>) {
        debug!(?id, ?label, "Crash reporter user set");
    }
}

pub struct LogAnalytics;

impl Analytics for LogAnalytics {
    fn track_event(&self, category: &str, action: &str, label: Option<&str>, value: Option<i64>) {
        debug!(category, action, ?label, ?value, "Analytics event");
    }

    fn set_user(&self, id: Option<&str>) {
        debug!(?id, "Analytics user set");
    }

    fn set_dimensions(&self, dimensions: &Dimensions) {
        debug!(?dimensions, "Analytics dimensions set");
    }
}

pub struct ConsolePresenter;

impl ErrorPresenter for ConsolePresenter {
    fn show_error(&self, title: &str, message: &str) {
        eprintln!("{}: {}", title, message);
    }
}

pub struct ConsoleReviewPrompt;

impl ReviewPrompt for ConsoleReviewPrompt {
    fn request_review(&self) {
        eprintln!("Enjoying hubkeeper? A star on the repository helps a lot.");
    }
}

pub fn collaborators() -> Collaborators {
    Collaborators {
        crash: Arc::new(LogCrashReporter),
        analytics: Arc::new(LogAnalytics),
        // A terminal has no URL to clean up
        query_params: Arc::new(Noop),
        presenter: Arc::new(ConsolePresenter),
        review: Arc::new(ConsoleReviewPrompt),
    }
}
