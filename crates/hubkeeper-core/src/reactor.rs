//! Side effects triggered by store events.
//!
//! A router task fans each broadcast event out to the reactions that care
//! about it. Every reaction owns a queue and a worker, so a slow
//! `deleteAccount` call never holds up a logout.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ClientCache, Failure, GraphQlClient};
use crate::auth::{normalize, LoginRequests};
use crate::collaborators::{Collaborators, Dimensions};
use crate::store::{Event, Store};

/// Every Nth successful login asks for a store review
const REVIEW_PROMPT_EVERY: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Reaction {
    Rehydrate,
    LoginRequest,
    LoginSuccess,
    LoginFailure,
    Logout,
    Identity,
    DeleteAccountRequest,
    DeleteAccountSuccess,
    DeleteAccountFailure,
}

impl Reaction {
    const ALL: [Reaction; 9] = [
        Reaction::Rehydrate,
        Reaction::LoginRequest,
        Reaction::LoginSuccess,
        Reaction::LoginFailure,
        Reaction::Logout,
        Reaction::Identity,
        Reaction::DeleteAccountRequest,
        Reaction::DeleteAccountSuccess,
        Reaction::DeleteAccountFailure,
    ];

    fn triggered_by(event: &Event) -> &'static [Reaction] {
        match event {
            Event::Rehydrate { .. } => &[Reaction::Rehydrate, Reaction::Identity],
            Event::LoginRequest { .. } => &[Reaction::LoginRequest],
            Event::LoginSuccess { .. } => &[Reaction::LoginSuccess, Reaction::Identity],
            Event::LoginFailure(_) => &[Reaction::LoginFailure],
            Event::Logout => &[Reaction::Logout, Reaction::Identity],
            Event::UserDataUpdate(_) => &[Reaction::Identity],
            Event::DeleteAccountRequest => &[Reaction::DeleteAccountRequest],
            Event::DeleteAccountSuccess => &[Reaction::DeleteAccountSuccess],
            Event::DeleteAccountFailure(_) => &[Reaction::DeleteAccountFailure],
            Event::PersonalTokenReplaced(_) | Event::CleanupArchivedItems => &[],
        }
    }
}

/// What the reactions need to do their work.
pub struct ReactorDeps {
    pub store: Arc<Store>,
    pub clients: Arc<ClientCache>,
    pub graphql: GraphQlClient,
    pub login_requests: Arc<LoginRequests>,
    pub collaborators: Collaborators,
    /// Development builds never show the review prompt
    pub is_development: bool,
}

pub struct Reactor {
    router: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    login_requests: Arc<LoginRequests>,
}

impl Reactor {
    /// Subscribe to the store and start the router and one worker per reaction.
    pub fn spawn(deps: ReactorDeps) -> Self {
        let deps = Arc::new(deps);
        let events = deps.store.events();

        let mut queues = HashMap::new();
        let mut workers = Vec::with_capacity(Reaction::ALL.len());
        for reaction in Reaction::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.insert(reaction, tx);
            workers.push(tokio::spawn(work(reaction, rx, Arc::clone(&deps))));
        }

        let router = tokio::spawn(route(events, queues, Arc::clone(&deps.store)));
        Self {
            router,
            workers,
            login_requests: Arc::clone(&deps.login_requests),
        }
    }

    /// Stop routing, let the workers drain what is already queued, and
    /// abandon any login still in flight.
    pub async fn shutdown(self) {
        self.router.abort();
        let _ = self.router.await;
        self.login_requests.cancel();
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!(error = %e, "Reaction worker panicked");
                }
            }
        }
        debug!("Reactor stopped");
    }
}

async fn route(
    mut events: broadcast::Receiver<Event>,
    queues: HashMap<Reaction, mpsc::UnboundedSender<Event>>,
    store: Arc<Store>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, logged_in = store.snapshot().is_logged_in(), "Reactor lagged behind events");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        for reaction in Reaction::triggered_by(&event) {
            if let Some(queue) = queues.get(reaction) {
                let _ = queue.send(event.clone());
            }
        }
    }
}

async fn work(reaction: Reaction, mut queue: mpsc::UnboundedReceiver<Event>, deps: Arc<ReactorDeps>) {
    while let Some(event) = queue.recv().await {
        debug!(?reaction, event = event.name(), "Reacting");
        react(reaction, event, &deps).await;
    }
}

async fn react(reaction: Reaction, event: Event, deps: &ReactorDeps) {
    let store = &deps.store;
    let collaborators = &deps.collaborators;

    match (reaction, event) {
        (Reaction::Rehydrate, Event::Rehydrate { session: Some(session) }) => {
            store.dispatch(Event::LoginRequest {
                app_token: session.app_token,
            });
        }
        (Reaction::LoginRequest, Event::LoginRequest { app_token }) => {
            deps.login_requests.submit(app_token);
        }
        (Reaction::LoginSuccess, Event::LoginSuccess { login_count: count, .. }) => {
            collaborators.query_params.clear_oauth_params();

            if !deps.is_development && count > 0 && count % REVIEW_PROMPT_EVERY == 0 {
                info!(count, "Requesting store review");
                collaborators.review.request_review();
            }

            store.dispatch(Event::CleanupArchivedItems);
        }
        (Reaction::LoginFailure, Event::LoginFailure(error)) => {
            if error.requires_logout() {
                info!(status = ?error.status(), "Session rejected, logging out");
                store.dispatch(Event::Logout);
            }
        }
        (Reaction::Logout, Event::Logout) => {
            deps.clients.clear_all();
            collaborators.query_params.clear_oauth_params();
        }
        (Reaction::Identity, _) => {
            let state = store.snapshot();
            let dimensions = Dimensions::from_state(&state);
            collaborators.analytics.set_user(dimensions.user_id.as_deref());
            collaborators.analytics.set_dimensions(&dimensions);
            collaborators
                .crash
                .set_user(dimensions.user_id.as_deref(), dimensions.github_login.as_deref());
        }
        (Reaction::DeleteAccountRequest, Event::DeleteAccountRequest) => {
            let result = match store.snapshot().app_token() {
                Some(app_token) => deps.graphql.delete_account(app_token.as_str()).await,
                None => Err(Failure::validation("Not logged in")),
            };
            match result {
                Ok(()) => {
                    info!("Account deleted");
                    store.dispatch(Event::DeleteAccountSuccess);
                }
                Err(failure) => store.dispatch(Event::DeleteAccountFailure(normalize(failure))),
            }
        }
        (Reaction::DeleteAccountSuccess, Event::DeleteAccountSuccess) => {
            store.dispatch(Event::Logout);
        }
        (Reaction::DeleteAccountFailure, Event::DeleteAccountFailure(error)) => {
            collaborators.report(&error, "delete-account", "Failed to delete account");
        }
        _ => {}
    }
}
