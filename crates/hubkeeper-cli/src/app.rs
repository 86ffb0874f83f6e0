//! Wiring of the core components for one CLI invocation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use hubkeeper_core::api::{http_client, ClientCache, GitHubClient, GraphQlClient};
use hubkeeper_core::auth::{
    AuthError, KeyringVault, LoginRequests, PersonalTokenController, SessionExchanger, SessionFile,
    SessionKeeper, TokenVault,
};
use hubkeeper_core::collaborators::{Collaborators, Noop, SystemClock};
use hubkeeper_core::models::Session;
use hubkeeper_core::{AppState, Config, Event, Reactor, ReactorDeps, Store};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::host;

/// How long a one-shot command waits for the outcome of a login or deletion
const OUTCOME_TIMEOUT: Duration = Duration::from_secs(60);

pub struct App {
    pub config: Config,
    pub store: Arc<Store>,
    clients: Arc<ClientCache>,
    graphql: GraphQlClient,
    login_requests: Arc<LoginRequests>,
    collaborators: Collaborators,
    session_file: Arc<SessionFile>,
    vault: Arc<dyn TokenVault>,
}

impl App {
    /// Build the components. The store starts from the persisted session, if any,
    /// without emitting `rehydrate`.
    pub fn new(config: Config) -> Result<Self> {
        let session_file = Arc::new(SessionFile::new(config.cache_dir()?));
        let initial = match load_session(&session_file) {
            Some(session) => AppState::default().reduce(&Event::Rehydrate {
                session: Some(Box::new(session)),
            }),
            None => AppState::default(),
        };

        let http = http_client(config.request_timeout())?;
        let clients = Arc::new(ClientCache::new(GitHubClient::new(
            http.clone(),
            config.github_api_base_url.clone(),
        )));
        let graphql = GraphQlClient::new(http, config.graphql_url.clone());
        let store = Arc::new(Store::new(initial));
        let collaborators = host::collaborators();

        let exchanger = SessionExchanger::new(
            &config,
            graphql.clone(),
            Arc::clone(&clients),
            Arc::new(SystemClock),
        );
        let login_requests = Arc::new(LoginRequests::new(
            Arc::new(exchanger),
            Arc::clone(&store),
            collaborators.clone(),
        ));

        Ok(Self {
            config,
            store,
            clients,
            graphql,
            login_requests,
            collaborators,
            session_file,
            vault: Arc::new(KeyringVault::new()),
        })
    }

    /// The session currently held by the store.
    pub fn session(&self) -> Option<Session> {
        let state = self.store.snapshot();
        match (state.app_token(), state.current_user()) {
            (Some(app_token), Some(user)) => Some(Session {
                app_token: app_token.clone(),
                user: user.clone(),
            }),
            _ => None,
        }
    }

    pub fn start_reactor(&self) -> Reactor {
        Reactor::spawn(ReactorDeps {
            store: Arc::clone(&self.store),
            clients: Arc::clone(&self.clients),
            graphql: self.graphql.clone(),
            login_requests: Arc::clone(&self.login_requests),
            collaborators: self.collaborators.clone(),
            is_development: self.config.is_development,
        })
    }

    pub fn start_keeper(&self) -> JoinHandle<()> {
        SessionKeeper::new(Arc::clone(&self.store), Arc::new(SystemClock), Arc::new(Noop)).spawn()
    }

    /// Save the session on every login and drop it on logout.
    pub fn start_persistence(&self) -> JoinHandle<()> {
        let mut events = self.store.events();
        let session_file = Arc::clone(&self.session_file);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(Event::LoginSuccess { app_token, user, .. }) => {
                        let session = Session {
                            app_token,
                            user: *user,
                        };
                        match session_file.save(&session) {
                            Ok(()) => debug!("Session saved"),
                            Err(e) => warn!(error = %e, "Failed to save session"),
                        }
                    }
                    Ok(Event::Logout) => {
                        if let Err(e) = session_file.clear() {
                            warn!(error = %e, "Failed to clear session");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Persistence lagged behind events"),
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }

    pub fn token_controller(&self) -> PersonalTokenController {
        PersonalTokenController::new(
            self.config.auth_mode,
            Arc::clone(&self.store),
            Arc::clone(&self.clients),
            self.graphql.clone(),
            Arc::clone(&self.vault),
            Arc::new(SystemClock),
            self.collaborators.clone(),
        )
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        self.session_file.save(session)
    }

    pub fn clear_session(&self) -> Result<()> {
        self.session_file.clear()
    }
}

fn load_session(session_file: &SessionFile) -> Option<Session> {
    match session_file.load() {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable session file");
            None
        }
    }
}

/// Wait for the first event `outcome` maps to `Some`.
pub async fn wait_for<T>(
    events: &mut broadcast::Receiver<Event>,
    outcome: impl Fn(Event) -> Option<T>,
) -> Result<T> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(result) = outcome(event) {
                        return Ok(result);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err(anyhow!("Event stream closed")),
            }
        }
    };
    tokio::time::timeout(OUTCOME_TIMEOUT, wait)
        .await
        .map_err(|_| anyhow!("Timed out after {}s", OUTCOME_TIMEOUT.as_secs()))?
}

/// Login outcome as seen on the event stream
pub fn login_outcome(event: Event) -> Option<Result<Session, AuthError>> {
    match event {
        Event::LoginSuccess { app_token, user, .. } => Some(Ok(Session {
            app_token,
            user: *user,
        })),
        Event::LoginFailure(err) => Some(Err(err)),
        _ => None,
    }
}

/// Account deletion outcome as seen on the event stream
pub fn delete_outcome(event: Event) -> Option<Result<(), AuthError>> {
    match event {
        Event::DeleteAccountSuccess => Some(Ok(())),
        Event::DeleteAccountFailure(err) => Some(Err(err)),
        _ => None,
    }
}
