use std::collections::HashMap;
use std::sync::Mutex;

use super::GitHubClient;

/// Per-token GitHub clients sharing one connection pool.
pub struct ClientCache {
    base: GitHubClient,
    clients: Mutex<HashMap<String, GitHubClient>>,
}

impl ClientCache {
    pub fn new(base: GitHubClient) -> Self {
        Self {
            base,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, token: &str) -> GitHubClient {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(token.to_string())
            .or_insert_with(|| self.base.with_token(token))
            .clone()
    }

    /// A client for `token` that is not kept in the cache.
    pub fn detached(&self, token: &str) -> GitHubClient {
        self.base.with_token(token)
    }

    pub fn clear_all(&self) {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
