use std::fmt;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;

/// A registered bot account.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub token: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Manages account registrations in SQLite.
///
/// Accounts come back in the order they were first added; re-adding an
/// existing name replaces its token but keeps its place.
pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    /// Open or create the accounts table in the given database path.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open account database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                name     TEXT NOT NULL UNIQUE,
                token    TEXT NOT NULL,
                added_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .context("failed to create accounts table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("account store lock poisoned"))
    }

    /// Register an account (upsert).
    pub fn add(&self, name: &str, token: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (name, token) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET token = excluded.token",
            [name, token],
        )?;
        Ok(())
    }

    /// Remove an account. Returns false if it was not registered.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM accounts WHERE name = ?1", [name])?;
        Ok(removed > 0)
    }

    pub fn get(&self, name: &str) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, token FROM accounts WHERE name = ?1")?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => Ok(Some(Account {
                name: row.get(0)?,
                token: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    /// All accounts in registration order.
    pub fn list(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, token FROM accounts ORDER BY id ASC")?;
        let accounts = stmt
            .query_map([], |row| {
                Ok(Account {
                    name: row.get(0)?,
                    token: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }
}
