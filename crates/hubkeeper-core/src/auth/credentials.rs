use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "hubkeeper";

/// Keychain account under which the personal access token is kept
const PERSONAL_TOKEN_ACCOUNT: &str = "github-personal-access-token";

/// Local storage for the personal access token. The token never leaves the device.
pub trait TokenVault: Send + Sync {
    fn store(&self, token: &str) -> Result<()>;
    fn load(&self) -> Result<Option<String>>;
    fn delete(&self) -> Result<()>;
}

/// Token vault backed by the OS keychain.
pub struct KeyringVault {
    account: String,
}

impl KeyringVault {
    pub fn new() -> Self {
        Self::with_account(PERSONAL_TOKEN_ACCOUNT)
    }

    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenVault for KeyringVault {
    fn store(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn delete(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

/// In-process vault for hosts without a keychain.
#[derive(Default)]
pub struct MemoryVault {
    token: Mutex<Option<String>>,
}

impl TokenVault for MemoryVault {
    fn store(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn delete(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
