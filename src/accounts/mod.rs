pub mod storage;

pub use storage::{Account, AccountStore};

use anyhow::{Context, Result, bail};
use std::sync::Arc;

use crate::client::MessagingClient;
use crate::client::telegram::{TelegramClient, TelegramConfig};

/// Account names double as session names in logs.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("account name must not be empty");
    }
    if name.chars().any(char::is_whitespace) {
        bail!("account name must not contain whitespace: {name:?}");
    }
    Ok(())
}

/// Register (or re-key) an account.
///
/// Shared by `chorus account add` and anything else that provisions accounts.
pub fn add(db_path: &str, name: &str, token: &str) -> Result<()> {
    validate_name(name)?;
    let token = token.trim();
    if token.is_empty() {
        bail!("token must not be empty");
    }
    let store = AccountStore::open(db_path).context("failed to open account store")?;
    store
        .add(name, token)
        .context("failed to save account")?;
    Ok(())
}

/// Unregister an account. Returns false if it was not registered.
pub fn remove(db_path: &str, name: &str) -> Result<bool> {
    let store = AccountStore::open(db_path).context("failed to open account store")?;
    store.remove(name).context("failed to remove account")
}

/// One unopened session per account, in registration order.
pub fn sessions(accounts: &[Account], config: &TelegramConfig) -> Vec<Arc<dyn MessagingClient>> {
    accounts
        .iter()
        .map(|account| {
            Arc::new(TelegramClient::new(&account.name, &account.token, config))
                as Arc<dyn MessagingClient>
        })
        .collect()
}
