use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use super::error::{EngageError, EngageResult};
use super::executor::ActionKind;
use super::item::ItemId;

// Concurrent runs share one ledger file; writers wait instead of failing.
const LEDGER_PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;
";

const LEDGER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS replies (
    account TEXT NOT NULL,
    item_id TEXT NOT NULL,
    reply_text TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (account, item_id)
);
CREATE INDEX IF NOT EXISTS idx_replies_created ON replies(account, created_at DESC);
CREATE TABLE IF NOT EXISTS failures (
    account TEXT NOT NULL,
    item_id TEXT NOT NULL,
    action TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_failures_created ON failures(account, created_at DESC);
";

/// Answers "has this account already replied to this item". A miss means
/// "not yet acted", never an error.
#[async_trait]
pub trait PriorActionCache: Send + Sync {
    async fn has_prior_action(&self, account: &str, item: &ItemId) -> EngageResult<bool>;

    async fn record_action(&self, account: &str, item: &ItemId, text: &str) -> EngageResult<()>;

    async fn record_failure(
        &self,
        _account: &str,
        _item: &ItemId,
        _action: ActionKind,
        _reason: &str,
    ) -> EngageResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryActionCache {
    entries: Mutex<HashSet<(String, ItemId)>>,
}

impl MemoryActionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I>(account: &str, items: I) -> Self
    where
        I: IntoIterator<Item = ItemId>,
    {
        let entries = items
            .into_iter()
            .map(|item| (account.to_string(), item))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl PriorActionCache for MemoryActionCache {
    async fn has_prior_action(&self, account: &str, item: &ItemId) -> EngageResult<bool> {
        let guard = self.entries.lock().await;
        Ok(guard.contains(&(account.to_string(), item.clone())))
    }

    async fn record_action(&self, account: &str, item: &ItemId, _text: &str) -> EngageResult<()> {
        let mut guard = self.entries.lock().await;
        guard.insert((account.to_string(), item.clone()));
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("failed to prepare ledger directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("ledger task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<LedgerError> for EngageError {
    fn from(err: LedgerError) -> Self {
        EngageError::Cache(err.to_string())
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub account: String,
    pub item_id: String,
    pub reply_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerCounts {
    pub replies: u64,
    pub failures: u64,
}

/// SQLite-backed prior-action cache. Each call opens its own connection, so
/// clones can be shared freely between concurrent runs.
#[derive(Debug, Clone)]
pub struct SqliteActionLedger {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteActionLedger {
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let ledger = Self {
            path,
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        ledger.initialize()?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> LedgerResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            LedgerError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        conn.execute_batch(LEDGER_PRAGMAS).map_err(|source| LedgerError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    fn initialize(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(())
    }

    pub fn has_reply(&self, account: &str, item: &str) -> LedgerResult<bool> {
        let conn = self.connect()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM replies WHERE account = ?1 AND item_id = ?2",
                params![account, item],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_reply(&self, account: &str, item: &str, text: &str) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO replies (account, item_id, reply_text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![account, item, text, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn insert_failure(
        &self,
        account: &str,
        item: &str,
        action: &str,
        reason: &str,
    ) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO failures (account, item_id, action, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![account, item, action, reason, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn recent(&self, account: Option<&str>, limit: usize) -> LedgerResult<Vec<LedgerEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT account, item_id, reply_text, created_at FROM replies
             WHERE (?1 IS NULL OR account = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![account, limit as i64], |row| {
            let created: i64 = row.get(3)?;
            Ok(LedgerEntry {
                account: row.get(0)?,
                item_id: row.get(1)?,
                reply_text: row.get(2)?,
                created_at: Utc
                    .timestamp_opt(created, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn counts(&self, account: Option<&str>) -> LedgerResult<LedgerCounts> {
        let conn = self.connect()?;
        let replies: i64 = conn.query_row(
            "SELECT COUNT(*) FROM replies WHERE (?1 IS NULL OR account = ?1)",
            params![account],
            |row| row.get(0),
        )?;
        let failures: i64 = conn.query_row(
            "SELECT COUNT(*) FROM failures WHERE (?1 IS NULL OR account = ?1)",
            params![account],
            |row| row.get(0),
        )?;
        Ok(LedgerCounts {
            replies: replies.max(0) as u64,
            failures: failures.max(0) as u64,
        })
    }
}

#[async_trait]
impl PriorActionCache for SqliteActionLedger {
    async fn has_prior_action(&self, account: &str, item: &ItemId) -> EngageResult<bool> {
        let ledger = self.clone();
        let account = account.to_string();
        let item = item.to_string();
        let found = tokio::task::spawn_blocking(move || ledger.has_reply(&account, &item))
            .await
            .map_err(LedgerError::from)??;
        Ok(found)
    }

    async fn record_action(&self, account: &str, item: &ItemId, text: &str) -> EngageResult<()> {
        let ledger = self.clone();
        let account = account.to_string();
        let item = item.to_string();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || ledger.insert_reply(&account, &item, &text))
            .await
            .map_err(LedgerError::from)??;
        Ok(())
    }

    async fn record_failure(
        &self,
        account: &str,
        item: &ItemId,
        action: ActionKind,
        reason: &str,
    ) -> EngageResult<()> {
        let ledger = self.clone();
        let account = account.to_string();
        let item = item.to_string();
        let reason = reason.to_string();
        tokio::task::spawn_blocking(move || {
            ledger.insert_failure(&account, &item, action.as_str(), &reason)
        })
        .await
        .map_err(LedgerError::from)??;
        Ok(())
    }
}
