use std::sync::Mutex;

use url::Url;

use crate::collaborators::QueryParamCleaner;

/// Query keys the OAuth redirect appends to the app URL
const OAUTH_QUERY_KEYS: &[&str] = &[
    "oauth",
    "code",
    "state",
    "app_token",
    "github_token",
    "github_scope",
    "github_token_type",
    "installation_id",
    "setup_action",
];

/// Remove OAuth redirect parameters from `url`, keeping everything else.
pub fn strip_oauth_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !OAUTH_QUERY_KEYS.iter().any(|k| key == *k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned
}

/// A host location whose OAuth parameters can be cleared in place.
pub struct NavigableLocation {
    current: Mutex<Url>,
}

impl NavigableLocation {
    pub fn new(url: Url) -> Self {
        Self {
            current: Mutex::new(url),
        }
    }

    pub fn current(&self) -> Url {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl QueryParamCleaner for NavigableLocation {
    fn clear_oauth_params(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = strip_oauth_params(&current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid url")
    }

    #[test]
    fn test_strip_keeps_unrelated_params() {
        let cleaned = strip_oauth_params(&url(
            "https://app.example.com/?oauth=true&github_token=abc&tab=inbox&state=xyz",
        ));
        assert_eq!(cleaned.as_str(), "https://app.example.com/?tab=inbox");
    }

    #[test]
    fn test_strip_drops_query_when_nothing_left() {
        let cleaned = strip_oauth_params(&url("https://app.example.com/callback?code=1&installation_id=9"));
        assert_eq!(cleaned.as_str(), "https://app.example.com/callback");
    }

    #[test]
    fn test_navigable_location_cleans_in_place() {
        let location = NavigableLocation::new(url("hubkeeper://login?app_token=t&x=1"));
        location.clear_oauth_params();
        assert_eq!(location.current().query(), Some("x=1"));
    }
}
