//! Background session keeper.
//!
//! Waits for a first successful login, then loops forever deciding between
//! a full reload, a silent re-login, or a sleep until the next decision
//! point. The decision itself is the pure [`decide`] function; the loop only
//! reads store snapshots and dispatches `login-request` events.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::{Clock, Host};
use crate::store::{AppState, Event, Store};

/// Sessions older than this are refreshed by reloading the whole environment
const RELOAD_AFTER_HOURS: i64 = 48;

/// Sessions older than this get a silent re-login
const RELOGIN_AFTER_HOURS: i64 = 12;

/// How long after a trial ends it still counts as "just expired"
const TRIAL_EXPIRED_WINDOW_MINUTES: i64 = 5;

/// Pause after re-logging in for an expired trial
const TRIAL_EXPIRED_PAUSE: StdDuration = StdDuration::from_secs(60);

/// Trial boundaries closer than this are slept to exactly
const TRIAL_LOOKAHEAD_MINUTES: i64 = 60;

/// Wake up this far past a trial boundary so the backend sees it as passed
const TRIAL_BOUNDARY_MARGIN_MS: i64 = 100;

const DEFAULT_PAUSE: StdDuration = StdDuration::from_secs(60 * 60);

/// Everything one keeper decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeeperInput {
    pub now: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub can_reload: bool,
    /// Trial expiry the keeper already re-logged in for
    pub handled_trial_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    StaleSession,
    TrialExpired(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reload the environment; the keeper stops afterwards
    Reload,
    /// Emit a `login-request`, then sleep
    Refresh { reason: RefreshReason, sleep: StdDuration },
    Sleep(StdDuration),
}

/// Pick the keeper's next move. Rules are checked in order; a stale
/// session wins over a just-expired trial.
pub fn decide(input: &KeeperInput) -> Decision {
    let elapsed = input.now - input.last_login_at;

    if input.can_reload && elapsed > Duration::hours(RELOAD_AFTER_HOURS) {
        return Decision::Reload;
    }

    if elapsed > Duration::hours(RELOGIN_AFTER_HOURS) {
        return Decision::Refresh {
            reason: RefreshReason::StaleSession,
            sleep: idle_pause(input.now, input.trial_end_at),
        };
    }

    if let Some(trial_end) = input.trial_end_at {
        let just_expired = trial_end <= input.now
            && input.now - trial_end < Duration::minutes(TRIAL_EXPIRED_WINDOW_MINUTES);
        if just_expired && input.handled_trial_end != Some(trial_end) {
            return Decision::Refresh {
                reason: RefreshReason::TrialExpired(trial_end),
                sleep: TRIAL_EXPIRED_PAUSE,
            };
        }
    }

    Decision::Sleep(idle_pause(input.now, input.trial_end_at))
}

fn idle_pause(now: DateTime<Utc>, trial_end_at: Option<DateTime<Utc>>) -> StdDuration {
    match trial_end_at {
        Some(trial_end)
            if trial_end > now && trial_end - now < Duration::minutes(TRIAL_LOOKAHEAD_MINUTES) =>
        {
            (trial_end - now + Duration::milliseconds(TRIAL_BOUNDARY_MARGIN_MS))
                .to_std()
                .unwrap_or(DEFAULT_PAUSE)
        }
        _ => DEFAULT_PAUSE,
    }
}

pub struct SessionKeeper {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    host: Arc<dyn Host>,
}

impl SessionKeeper {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, host: Arc<dyn Host>) -> Self {
        Self { store, clock, host }
    }

    /// Run the keeper on its own task. Abort the handle to stop it.
    ///
    /// Subscribes before spawning so a login dispatched right after this
    /// call is not missed.
    pub fn spawn(self) -> JoinHandle<()> {
        let events = self.store.events();
        let changes = self.store.subscribe();
        tokio::spawn(self.keep_alive(events, changes))
    }

    /// Returns only after a reload or when the store shuts down.
    pub async fn run(self) {
        let events = self.store.events();
        let changes = self.store.subscribe();
        self.keep_alive(events, changes).await;
    }

    async fn keep_alive(
        self,
        mut events: broadcast::Receiver<Event>,
        mut changes: watch::Receiver<Arc<AppState>>,
    ) {
        if self.store.snapshot().event_counters().login_success == 0
            && !wait_for_login(&self.store, &mut events).await
        {
            return;
        }
        info!("Session keeper started");

        let mut handled_trial_end = None;
        loop {
            let snapshot = changes.borrow_and_update().clone();

            let (Some(app_token), Some(user)) = (snapshot.app_token(), snapshot.current_user())
            else {
                debug!("No active session, waiting for login");
                events = events.resubscribe();
                if self.store.snapshot().is_logged_in() {
                    continue;
                }
                if !wait_for_login(&self.store, &mut events).await {
                    return;
                }
                continue;
            };

            let Some(last_login_at) = user.last_login_at else {
                // Transient post-login state; re-evaluate on the next store change.
                if changes.changed().await.is_err() {
                    return;
                }
                continue;
            };

            let input = KeeperInput {
                now: self.clock.now(),
                last_login_at,
                trial_end_at: user.plan.as_ref().and_then(|p| p.trial_end_at),
                can_reload: self.host.can_reload(),
                handled_trial_end,
            };

            match decide(&input) {
                Decision::Reload => {
                    info!("Session is older than {}h, reloading", RELOAD_AFTER_HOURS);
                    self.host.reload();
                    return;
                }
                Decision::Refresh { reason, sleep } => {
                    if let RefreshReason::TrialExpired(trial_end) = reason {
                        handled_trial_end = Some(trial_end);
                    }
                    info!(?reason, "Refreshing session");
                    self.store.dispatch(Event::LoginRequest {
                        app_token: app_token.clone(),
                    });
                    self.clock.sleep(sleep).await;
                }
                Decision::Sleep(pause) => {
                    debug!(secs = pause.as_secs(), "Session keeper sleeping");
                    self.clock.sleep(pause).await;
                }
            }
        }
    }
}

/// Wait for the next `login-success`. Returns false once the store is gone.
async fn wait_for_login(store: &Store, events: &mut broadcast::Receiver<Event>) -> bool {
    loop {
        match events.recv().await {
            Ok(Event::LoginSuccess { .. }) => return true,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Session keeper lagged behind events");
                if store.snapshot().is_logged_in() {
                    return true;
                }
            }
            Err(RecvError::Closed) => return false,
        }
    }
}
