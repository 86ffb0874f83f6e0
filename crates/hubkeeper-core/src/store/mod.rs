//! Single-writer store for the session state.
//!
//! `Store::dispatch` is the only way state changes: it reduces the event into
//! a new immutable snapshot and then broadcasts the event to every reaction.
//! Readers either take a `snapshot()` or `subscribe()` to changes.

pub mod events;
pub mod state;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::debug;

pub use events::Event;
pub use state::{AppState, AuthState, EventCounters, ThemePreferences};

/// Buffer size for the event broadcast channel.
/// Reactions drain quickly; 64 leaves room for bursts around login/logout.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct Store {
    state: watch::Sender<Arc<AppState>>,
    events: broadcast::Sender<Event>,
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        let (state, _) = watch::channel(Arc::new(initial));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { state, events }
    }

    pub fn snapshot(&self) -> Arc<AppState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Reduce `event` and broadcast it. Both happen under the state lock,
    /// so subscribers see events in the order they were reduced.
    pub fn dispatch(&self, mut event: Event) {
        debug!(event = event.name(), "Dispatching event");
        self.state.send_modify(|state| {
            let next = state.reduce(&event);
            if let Event::LoginSuccess { login_count, .. } = &mut event {
                *login_count = next.counters.login_success;
            }
            *state = Arc::new(next);
            // No subscribers is fine: nothing is listening yet.
            let _ = self.events.send(event);
        });
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}
