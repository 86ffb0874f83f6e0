//! The login round trip: app token in, session out.
//!
//! `SessionExchanger` performs one exchange. `LoginRequests` drives it from
//! `login-request` events with latest-wins semantics: every request bumps a
//! generation counter and aborts the previous in-flight exchange, and a
//! finished exchange is only applied while its generation is still current.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::graphql::LoginPayload;
use crate::api::{ClientCache, Failure, GraphQlClient};
use crate::collaborators::{Clock, Collaborators};
use crate::config::{AuthMode, Config};
use crate::models::{AppToken, GitHubCredential, GitHubIdentity, Plan, Session, User};
use crate::store::{Event, Store};

use super::error::{normalize, AuthError};

pub struct SessionExchanger {
    mode: AuthMode,
    unlimited_columns: bool,
    graphql: GraphQlClient,
    clients: Arc<ClientCache>,
    clock: Arc<dyn Clock>,
}

impl SessionExchanger {
    pub fn new(
        config: &Config,
        graphql: GraphQlClient,
        clients: Arc<ClientCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mode: config.auth_mode,
            unlimited_columns: config.unlimited_columns,
            graphql,
            clients,
            clock,
        }
    }

    /// Exchange `app_token` for a fully populated session.
    pub async fn exchange(&self, app_token: &AppToken) -> Result<Session, AuthError> {
        let result = match self.mode {
            AuthMode::Direct => self.exchange_direct(app_token).await,
            AuthMode::Backend => self.exchange_backend(app_token).await,
        };
        result.map_err(normalize)
    }

    async fn exchange_direct(&self, app_token: &AppToken) -> Result<Session, Failure> {
        let github = self
            .clients
            .get_or_create(app_token.as_str())
            .fetch_authenticated_user()
            .await?;
        let now = self.clock.now();

        let personal = GitHubCredential {
            token: app_token.as_str().to_string(),
            scope: github.scopes,
            token_type: "bearer".to_string(),
            created_at: now,
            login: Some(github.account.login.clone()),
        };

        let user = User {
            id: github.account.id.to_string(),
            created_at: github.account.created_at,
            updated_at: github.account.updated_at,
            github_identity: GitHubIdentity {
                personal: Some(personal),
                oauth: None,
                app: None,
                installations: Vec::new(),
                user: github.account,
            },
            plan: Some(Plan::free(self.unlimited_columns)),
            last_login_at: Some(now),
            columns: None,
            subscriptions: None,
        };

        Ok(Session {
            app_token: app_token.clone(),
            user,
        })
    }

    async fn exchange_backend(&self, app_token: &AppToken) -> Result<Session, Failure> {
        let payload = self.graphql.login(app_token.as_str()).await?;
        session_from_payload(payload)
    }
}

/// Check a `login` payload for the fields a session cannot live without.
fn session_from_payload(payload: LoginPayload) -> Result<Session, Failure> {
    let app_token = payload
        .app_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Failure::protocol("Invalid response: missing appToken"))?;
    let user = payload
        .user
        .ok_or_else(|| Failure::protocol("Invalid response: missing user"))?;

    let has_github_id = user
        .pointer("/github/user/id")
        .is_some_and(|id| !id.is_null());
    if !has_github_id {
        return Err(Failure::protocol("Invalid response: missing user.github.user.id"));
    }

    let user: User = serde_json::from_value(user)
        .map_err(|e| Failure::protocol(format!("Invalid response: malformed user ({})", e)))?;

    Ok(Session {
        app_token: AppToken::new(app_token),
        user,
    })
}

/// Runs exchanges for `login-request` events, honoring only the newest one.
pub struct LoginRequests {
    exchanger: Arc<SessionExchanger>,
    store: Arc<Store>,
    collaborators: Collaborators,
    generation: Arc<Mutex<u64>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl LoginRequests {
    pub fn new(exchanger: Arc<SessionExchanger>, store: Arc<Store>, collaborators: Collaborators) -> Self {
        Self {
            exchanger,
            store,
            collaborators,
            generation: Arc::new(Mutex::new(0)),
            in_flight: Mutex::new(None),
        }
    }

    /// Start an exchange for `app_token`, abandoning any exchange still running.
    pub fn submit(&self, app_token: AppToken) {
        let generation = bump(&self.generation);
        let latest = Arc::clone(&self.generation);
        let exchanger = Arc::clone(&self.exchanger);
        let store = Arc::clone(&self.store);
        let collaborators = self.collaborators.clone();

        let task = tokio::spawn(async move {
            let outcome = exchanger.exchange(&app_token).await;
            apply_outcome(&latest, generation, &store, &collaborators, outcome);
        });

        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Abort the exchange still in flight, if any.
    pub fn cancel(&self) {
        bump(&self.generation);
        if let Some(task) = self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

fn bump(generation: &Mutex<u64>) -> u64 {
    let mut current = generation.lock().unwrap_or_else(|e| e.into_inner());
    *current += 1;
    *current
}

/// Dispatch the result of exchange number `generation` unless a newer request
/// exists. The check and the dispatch both run under the generation lock.
/// Returns whether the result was applied.
fn apply_outcome(
    latest: &Mutex<u64>,
    generation: u64,
    store: &Store,
    collaborators: &Collaborators,
    outcome: Result<Session, AuthError>,
) -> bool {
    let current = latest.lock().unwrap_or_else(|e| e.into_inner());
    if *current != generation {
        debug!(generation, latest = *current, "Discarding superseded login result");
        return false;
    }
    match outcome {
        Ok(session) => {
            info!(user_id = %session.user.id, "Login succeeded");
            store.dispatch(Event::login_success(session.app_token, session.user));
        }
        Err(error) => {
            warn!(kind = error.name(), status = ?error.status(), "Login failed");
            if !error.is_silent() {
                collaborators.crash.notify(&error, Some("login"));
            }
            store.dispatch(Event::LoginFailure(error));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GitHubClient;
    use crate::auth::ErrorKind;
    use crate::collaborators::SystemClock;
    use mockito::{Matcher, Server};
    use reqwest::Client;
    use std::time::Duration;
    use tokio::sync::broadcast;

    const USER_JSON: &str = r#"{
        "_id": "u-42",
        "github": {
            "personal": null,
            "user": {"id": 583231, "nodeId": "MDQ6VXNlcjU4MzIzMQ==", "login": "octocat", "avatarUrl": ""}
        },
        "plan": {"amount": 900, "trialEndAt": null},
        "lastLoginAt": "2024-03-10T08:00:00Z"
    }"#;

    fn exchanger(server: &Server, mode: AuthMode) -> SessionExchanger {
        let config = Config {
            auth_mode: mode,
            github_api_base_url: server.url(),
            graphql_url: format!("{}/graphql", server.url()),
            ..Config::default()
        };
        let clients = Arc::new(ClientCache::new(GitHubClient::new(
            Client::new(),
            config.github_api_base_url.clone(),
        )));
        SessionExchanger::new(
            &config,
            GraphQlClient::new(Client::new(), config.graphql_url.clone()),
            clients,
            Arc::new(SystemClock),
        )
    }

    async fn mock_login(server: &mut Server, status: usize, body: String) -> mockito::Mock {
        server
            .mock("POST", "/graphql")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_backend_exchange_returns_exact_values() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_header("authorization", "bearer app-old")
            .match_body(Matcher::Regex("login".to_string()))
            .with_status(200)
            .with_body(format!(r#"{{"data": {{"login": {{"appToken": "app-new", "user": {}}}}}}}"#, USER_JSON))
            .create_async()
            .await;

        let session = exchanger(&server, AuthMode::Backend)
            .exchange(&AppToken::new("app-old"))
            .await
            .expect("session");
        assert_eq!(session.app_token.as_str(), "app-new");
        assert_eq!(session.user.id, "u-42");
        assert_eq!(session.user.github_account().id, 583231);
        assert_eq!(session.user.plan.as_ref().map(|p| p.amount), Some(900));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_backend_exchange_missing_app_token_is_protocol_error() {
        let mut server = Server::new_async().await;
        mock_login(
            &mut server,
            200,
            format!(r#"{{"data": {{"login": {{"appToken": "", "user": {}}}}}}}"#, USER_JSON),
        )
        .await;

        let err = exchanger(&server, AuthMode::Backend)
            .exchange(&AppToken::new("t"))
            .await
            .expect_err("missing token");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_backend_exchange_missing_github_id_is_protocol_error() {
        let mut server = Server::new_async().await;
        mock_login(
            &mut server,
            200,
            r#"{"data": {"login": {"appToken": "app", "user": {"_id": "u", "github": {"user": {"login": "octocat"}}}}}}"#.to_string(),
        )
        .await;

        let err = exchanger(&server, AuthMode::Backend)
            .exchange(&AppToken::new("t"))
            .await
            .expect_err("missing id");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.message().contains("user.github.user.id"));
    }

    #[tokio::test]
    async fn test_backend_exchange_graphql_errors_keep_status_and_list() {
        for status in [200, 400, 500] {
            let mut server = Server::new_async().await;
            mock_login(
                &mut server,
                status,
                r#"{"data": null, "errors": [{"message": "Plan lookup failed"}, {"message": "second"}]}"#.to_string(),
            )
            .await;

            let err = exchanger(&server, AuthMode::Backend)
                .exchange(&AppToken::new("t"))
                .await
                .expect_err("graphql errors");
            assert_eq!(err.kind(), ErrorKind::GraphQl);
            assert_eq!(err.status(), Some(status as u16));
            let messages: Vec<&str> = err
                .response()
                .expect("response")
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect();
            assert_eq!(messages, vec!["Plan lookup failed", "second"]);
        }
    }

    #[tokio::test]
    async fn test_direct_exchange_synthesizes_free_user() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user")
            .match_header("authorization", "token ghp_direct")
            .with_status(200)
            .with_header("x-oauth-scopes", "repo, read:user")
            .with_body(r#"{"id": 1, "login": "monalisa", "node_id": "MDQ6VXNlcjE="}"#)
            .create_async()
            .await;

        let before = chrono::Utc::now();
        let session = exchanger(&server, AuthMode::Direct)
            .exchange(&AppToken::new("ghp_direct"))
            .await
            .expect("session");

        assert_eq!(session.app_token.as_str(), "ghp_direct");
        let user = &session.user;
        assert_eq!(user.github_account().login, "monalisa");
        assert!(user.last_login_at.is_some_and(|at| at >= before));
        assert_eq!(user.plan, Some(Plan::free(false)));
        let personal = user.github_identity.personal.as_ref().expect("personal credential");
        assert!(personal.has_scope("repo"));
        assert_eq!(personal.login.as_deref(), Some("monalisa"));
    }

    #[tokio::test]
    async fn test_login_requests_dispatch_success() {
        let mut server = Server::new_async().await;
        mock_login(
            &mut server,
            200,
            format!(r#"{{"data": {{"login": {{"appToken": "app-new", "user": {}}}}}}}"#, USER_JSON),
        )
        .await;

        let store = Arc::new(Store::default());
        let mut events = store.events();
        let requests = LoginRequests::new(
            Arc::new(exchanger(&server, AuthMode::Backend)),
            Arc::clone(&store),
            Collaborators::noop(),
        );
        requests.submit(AppToken::new("app-old"));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.name(), "login-success");
        assert!(store.snapshot().is_logged_in());
    }

    #[tokio::test]
    async fn test_login_requests_latest_wins() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, 401, r#"{"errors": [{"message": "bad"}]}"#.to_string()).await;

        let store = Arc::new(Store::default());
        let mut events = store.events();
        let requests = LoginRequests::new(
            Arc::new(exchanger(&server, AuthMode::Backend)),
            Arc::clone(&store),
            Collaborators::noop(),
        );
        requests.submit(AppToken::new("first"));
        requests.submit(AppToken::new("second"));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event in time")
            .expect("event");
        assert_eq!(event.name(), "login-failure");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[test]
    fn test_superseded_outcome_is_not_applied() {
        let store = Store::default();
        let mut events = store.events();
        let latest = Mutex::new(2);
        let stale = Err(normalize(Failure::Http {
            status: 401,
            body: String::new(),
        }));

        assert!(!apply_outcome(&latest, 1, &store, &Collaborators::noop(), stale));
        assert!(events.try_recv().is_err());
        assert_eq!(store.snapshot().auth.error, None);

        let current = Err(normalize(Failure::protocol("bad payload")));
        assert!(apply_outcome(&latest, 2, &store, &Collaborators::noop(), current));
        assert_eq!(events.try_recv().map(|e| e.name()).ok(), Some("login-failure"));
    }

    #[test]
    fn test_cancel_supersedes_pending_generation() {
        let store = Arc::new(Store::default());
        let requests = LoginRequests::new(
            Arc::new(SessionExchanger::new(
                &Config::default(),
                GraphQlClient::new(Client::new(), "http://127.0.0.1:9/graphql"),
                Arc::new(ClientCache::new(GitHubClient::new(Client::new(), "http://127.0.0.1:9"))),
                Arc::new(SystemClock),
            )),
            Arc::clone(&store),
            Collaborators::noop(),
        );
        let pending = bump(&requests.generation);
        requests.cancel();

        let outcome = Err(normalize(Failure::Timeout));
        let applied = apply_outcome(&requests.generation, pending, &store, &Collaborators::noop(), outcome);
        assert!(!applied);
        assert!(store.events().try_recv().is_err());
    }
}
