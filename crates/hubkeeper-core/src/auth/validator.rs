//! Adding and removing a personal access token.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::api::{ClientCache, Failure, GraphQlClient};
use crate::collaborators::{Clock, Collaborators};
use crate::config::AuthMode;
use crate::models::{AppToken, GitHubAccount, GitHubCredential};
use crate::store::{Event, Store};

use super::credentials::TokenVault;
use super::error::{normalize, AuthError};

/// Scope required to read private repositories
const REPO_SCOPE: &str = "repo";

/// What the personal-token controller is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatLoadingState {
    Removing,
    Adding,
    #[default]
    None,
}

/// Resets the loading state however the operation ends, including when the
/// future is dropped mid-flight.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<PatLoadingState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(PatLoadingState::None);
    }
}

pub struct PersonalTokenController {
    mode: AuthMode,
    store: Arc<Store>,
    clients: Arc<ClientCache>,
    graphql: GraphQlClient,
    vault: Arc<dyn TokenVault>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    loading: watch::Sender<PatLoadingState>,
}

impl PersonalTokenController {
    pub fn new(
        mode: AuthMode,
        store: Arc<Store>,
        clients: Arc<ClientCache>,
        graphql: GraphQlClient,
        vault: Arc<dyn TokenVault>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Self {
        let (loading, _) = watch::channel(PatLoadingState::None);
        Self {
            mode,
            store,
            clients,
            graphql,
            vault,
            clock,
            collaborators,
            loading,
        }
    }

    pub fn loading_state(&self) -> PatLoadingState {
        *self.loading.borrow()
    }

    fn begin(&self, state: PatLoadingState) -> LoadingGuard<'_> {
        self.loading.send_replace(state);
        LoadingGuard {
            state: &self.loading,
        }
    }

    /// Validate `token` against GitHub and, if acceptable, sign in with it.
    pub async fn validate_and_adopt(&self, token: &str) -> Result<(), AuthError> {
        let _guard = self.begin(PatLoadingState::Adding);
        self.adopt(token.trim()).await.map_err(|failure| {
            let error = normalize(failure);
            self.collaborators
                .report(&error, "personal-access-token", "Failed to add personal access token");
            error
        })
    }

    async fn adopt(&self, token: &str) -> Result<(), Failure> {
        if token.is_empty() {
            return Err(Failure::validation("Personal access token is empty"));
        }

        // Rejected tokens must not linger in the shared cache.
        let github = self.clients.detached(token).fetch_authenticated_user().await?;

        if let Some(current) = self.store.snapshot().current_github_user() {
            check_same_account(current, &github.account)?;
        }
        check_repo_scope(&github.scopes)?;

        match self.mode {
            AuthMode::Direct => {
                self.vault
                    .store(token)
                    .map_err(|e| Failure::Storage(format!("{:#}", e)))?;
                let credential = GitHubCredential {
                    token: token.to_string(),
                    scope: github.scopes,
                    token_type: "bearer".to_string(),
                    created_at: self.clock.now(),
                    login: Some(github.account.login.clone()),
                };
                self.store.dispatch(Event::PersonalTokenReplaced(Some(credential)));
                self.store.dispatch(Event::LoginRequest {
                    app_token: AppToken::new(token),
                });
            }
            AuthMode::Backend => {
                let app_token = self.graphql.login_with_personal_access_token(token).await?;
                self.store.dispatch(Event::LoginRequest {
                    app_token: AppToken::new(app_token),
                });
            }
        }

        info!(login = %github.account.login, "Personal access token adopted");
        Ok(())
    }

    /// Forget the locally stored personal access token.
    pub fn revoke(&self) -> Result<(), AuthError> {
        let _guard = self.begin(PatLoadingState::Removing);
        if let Err(e) = self.vault.delete() {
            let error = normalize(Failure::Storage(format!("{:#}", e)));
            self.collaborators
                .report(&error, "personal-access-token", "Failed to remove personal access token");
            return Err(error);
        }
        self.store.dispatch(Event::PersonalTokenReplaced(None));
        info!("Personal access token removed");
        Ok(())
    }
}

fn check_same_account(current: &GitHubAccount, candidate: &GitHubAccount) -> Result<(), Failure> {
    if current.id == candidate.id {
        return Ok(());
    }
    let message = if current.login != candidate.login {
        format!(
            "This token belongs to @{}, but you are logged in as @{}. \
             Generate a token from the same GitHub account.",
            candidate.login, current.login
        )
    } else {
        format!(
            "This token belongs to GitHub user #{}, but you are logged in as user #{}. \
             Generate a token from the same GitHub account.",
            candidate.id, current.id
        )
    };
    Err(Failure::validation(message))
}

fn check_repo_scope(scopes: &std::collections::BTreeSet<String>) -> Result<(), Failure> {
    if scopes.is_empty() || scopes.contains(REPO_SCOPE) {
        return Ok(());
    }
    Err(Failure::validation(format!(
        "This token is missing the \"{}\" scope, so private repositories cannot be accessed. \
         Generate a new token with the \"{}\" scope. Your token stays stored locally on this device.",
        REPO_SCOPE, REPO_SCOPE
    )))
}
