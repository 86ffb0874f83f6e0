use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::models::Session;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// On-disk copy of the last good session, used to rehydrate after a restart.
pub struct SessionFile {
    cache_dir: PathBuf,
}

impl SessionFile {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Load the persisted session, if one exists
    pub fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session: Session =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    /// Save session to disk
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, contents)?;
        restrict_permissions(&path)?;
        Ok(())
    }

    /// Remove the persisted session
    pub fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict session file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppToken, GitHubAccount, GitHubIdentity, User};

    fn session() -> Session {
        Session {
            app_token: AppToken::new("app"),
            user: User {
                id: "u1".to_string(),
                github_identity: GitHubIdentity {
                    personal: None,
                    oauth: None,
                    app: None,
                    installations: vec![],
                    user: GitHubAccount {
                        id: 7,
                        node_id: "n".to_string(),
                        login: "hubot".to_string(),
                        name: None,
                        avatar_url: String::new(),
                        created_at: None,
                        updated_at: None,
                    },
                },
                plan: None,
                created_at: None,
                updated_at: None,
                last_login_at: None,
                columns: None,
                subscriptions: None,
            },
        }
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = SessionFile::new(dir.path().join("nested"));
        assert!(file.load().expect("load missing").is_none());

        file.save(&session()).expect("save");
        let loaded = file.load().expect("load").expect("session present");
        assert_eq!(loaded, session());

        file.clear().expect("clear");
        assert!(file.load().expect("load cleared").is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").expect("write");
        assert!(SessionFile::new(dir.path().to_path_buf()).load().is_err());
    }
}
