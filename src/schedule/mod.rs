//! Durable store of scheduled emails, backed by SQLite.
//!
//! All access goes through one async mutex. Single queries ([`ScheduleStore::insert`],
//! [`ScheduleStore::list_by_chat`]) take it for their own duration; the worker
//! takes it once via [`ScheduleStore::lock`] and holds the returned
//! [`ScheduleGuard`] across a whole scan-deliver-mark cycle, so nobody reads a
//! row halfway through that cycle.

pub mod time;
pub mod worker;

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::compose::{EmailSession, SendTime};
use crate::mail::{Draft, StoredAttachment};

/// Schema for the `scheduled_emails` table. Safe to apply repeatedly.
pub const MIGRATION: &str = include_str!("../../migrations/001_scheduled_emails.sql");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the schedule store.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An unknown status value was read from the database.
    #[error("invalid status value: {0:?}")]
    InvalidStatus(String),

    /// The attachment list could not be encoded or decoded.
    #[error("invalid attachment list: {0}")]
    Attachments(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Delivery status. Moves from pending to sent only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    /// Waiting for its due time.
    Pending,
    /// Delivery was attempted.
    Sent,
}

impl EmailStatus {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, ScheduleError> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            other => Err(ScheduleError::InvalidStatus(other.to_owned())),
        }
    }
}

/// A scheduled email that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScheduledEmail {
    /// Originating chat.
    pub chat_id: i64,
    /// Raw comma-separated recipients.
    pub recipients: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// Files to attach.
    pub attachments: Vec<StoredAttachment>,
    /// Due time exactly as the user typed it.
    pub send_at: String,
}

impl NewScheduledEmail {
    /// Freeze a session whose send decision is a time. Returns `None` for
    /// an immediate-send session, which is never persisted.
    pub fn from_session(session: EmailSession) -> Option<Self> {
        let SendTime::At(send_at) = session.schedule else {
            return None;
        };
        Some(Self {
            chat_id: session.chat_id,
            recipients: session.to,
            subject: session.subject,
            body: session.body,
            attachments: session.attachment.into_iter().collect(),
            send_at,
        })
    }
}

/// A stored scheduled email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEmail {
    /// Row id, assigned on insert.
    pub id: i64,
    /// Originating chat.
    pub chat_id: i64,
    /// Raw comma-separated recipients.
    pub recipients: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
    /// Files to attach.
    pub attachments: Vec<StoredAttachment>,
    /// Due time exactly as the user typed it.
    pub send_at: String,
    /// Delivery status.
    pub status: EmailStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl ScheduledEmail {
    /// The deliverable content of this row.
    pub fn draft(&self) -> Draft {
        Draft {
            recipients: self.recipients.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

type Row = (i64, i64, String, String, String, String, String, String, String);

const SELECT_COLUMNS: &str = "SELECT id, chat_id, recipients, subject, body, attachments_json, \
     send_at, status, created_at FROM scheduled_emails";

fn from_row(row: Row) -> Result<ScheduledEmail, ScheduleError> {
    let (id, chat_id, recipients, subject, body, attachments_json, send_at, status, created_at) =
        row;
    Ok(ScheduledEmail {
        id,
        chat_id,
        recipients,
        subject,
        body,
        attachments: serde_json::from_str(&attachments_json)?,
        send_at,
        status: EmailStatus::parse(&status)?,
        created_at,
    })
}

/// Decode rows one by one. Rows that cannot be decoded are logged and
/// skipped so one corrupt record never hides the others.
fn decode_rows(rows: Vec<Row>) -> Vec<ScheduledEmail> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.0;
            match from_row(row) {
                Ok(email) => Some(email),
                Err(e) => {
                    warn!(id, error = %e, "skipping undecodable scheduled email");
                    None
                }
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pool setup
// ---------------------------------------------------------------------------

/// Open (creating if missing) the SQLite database and apply the schema.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn open_pool(path: &Path) -> Result<SqlitePool, ScheduleError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    migrate(&pool).await?;
    info!(path = %path.display(), "schedule database ready");
    Ok(pool)
}

/// Apply the schema to an existing pool.
///
/// # Errors
///
/// Returns an error if the SQL fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), ScheduleError> {
    sqlx::raw_sql(MIGRATION).execute(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Scheduled-send store with a single mutual-exclusion boundary.
pub struct ScheduleStore {
    pool: SqlitePool,
    gate: Mutex<()>,
}

impl std::fmt::Debug for ScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleStore").finish_non_exhaustive()
    }
}

impl ScheduleStore {
    /// Wrap a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            gate: Mutex::new(()),
        }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a new scheduled email as `pending`. `send_at` is stored
    /// verbatim and never validated here.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be written.
    pub async fn insert(&self, email: NewScheduledEmail) -> Result<i64, ScheduleError> {
        let attachments_json = serde_json::to_string(&email.attachments)?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let _guard = self.gate.lock().await;
        let result = sqlx::query(
            "INSERT INTO scheduled_emails \
             (chat_id, recipients, subject, body, attachments_json, send_at, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(email.chat_id)
        .bind(&email.recipients)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(&attachments_json)
        .bind(&email.send_at)
        .bind(EmailStatus::Pending.as_str())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(scheduled_id = id, chat_id = email.chat_id, "scheduled email stored");
        Ok(id)
    }

    /// Up to `limit` rows for one chat, newest first. Undecodable rows are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_by_chat(
        &self,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<ScheduledEmail>, ScheduleError> {
        let _guard = self.gate.lock().await;
        let rows: Vec<Row> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE chat_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
        ))
        .bind(chat_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(decode_rows(rows))
    }

    /// Take the store lock for a multi-step cycle.
    pub async fn lock(&self) -> ScheduleGuard<'_> {
        ScheduleGuard {
            pool: &self.pool,
            _guard: self.gate.lock().await,
        }
    }
}

/// Exclusive access to the store for the lifetime of the guard.
pub struct ScheduleGuard<'a> {
    pool: &'a SqlitePool,
    _guard: MutexGuard<'a, ()>,
}

impl ScheduleGuard<'_> {
    /// All `pending` rows, oldest first. Undecodable rows are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_pending(&self) -> Result<Vec<ScheduledEmail>, ScheduleError> {
        let rows: Vec<Row> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY id ASC"
        ))
        .bind(EmailStatus::Pending.as_str())
        .fetch_all(self.pool)
        .await?;
        Ok(decode_rows(rows))
    }

    /// Flip a row to `sent`. Rows already sent are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_sent(&self, id: i64) -> Result<(), ScheduleError> {
        sqlx::query("UPDATE scheduled_emails SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(EmailStatus::Sent.as_str())
            .bind(id)
            .bind(EmailStatus::Pending.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
