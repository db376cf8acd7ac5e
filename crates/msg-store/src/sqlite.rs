use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msg_common::{History, Message, MessageStatus, MessageType, MessagingError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::repository::DeliveryRepository;

const MESSAGE_COLUMNS: &str = "delivery_id, message_id, batch_id, party_id, municipality_id, \
     message_type, original_message_type, status, content, origin, issuer, created_at";

const HISTORY_COLUMNS: &str = "delivery_id, message_id, batch_id, municipality_id, \
     message_type, original_message_type, status, content, origin, issuer, created_at";

pub struct SqliteDeliveryRepository {
    pool: SqlitePool,
}

impl SqliteDeliveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message (
                delivery_id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                party_id TEXT,
                municipality_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                original_message_type TEXT NOT NULL,
                status TEXT NOT NULL,
                content TEXT NOT NULL,
                origin TEXT,
                issuer TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_message_status ON message(status);

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                delivery_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                municipality_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                original_message_type TEXT NOT NULL,
                status TEXT NOT NULL,
                content TEXT NOT NULL,
                origin TEXT,
                issuer TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_message_id ON history(message_id);
            CREATE INDEX IF NOT EXISTS idx_history_delivery_id ON history(delivery_id);
            CREATE INDEX IF NOT EXISTS idx_history_batch_id ON history(batch_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("SQLite delivery schema ready");
        Ok(())
    }

    async fn insert_message(tx: &mut Transaction<'_, Sqlite>, message: &Message) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO message ({MESSAGE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&message.delivery_id)
        .bind(&message.message_id)
        .bind(&message.batch_id)
        .bind(&message.party_id)
        .bind(&message.municipality_id)
        .bind(message.message_type.as_str())
        .bind(message.original_message_type.as_str())
        .bind(message.status.as_str())
        .bind(&message.content)
        .bind(&message.origin)
        .bind(&message.issuer)
        .bind(message.created_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_history(tx: &mut Transaction<'_, Sqlite>, history: &History) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO history ({HISTORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&history.delivery_id)
        .bind(&history.message_id)
        .bind(&history.batch_id)
        .bind(&history.municipality_id)
        .bind(history.message_type.as_str())
        .bind(history.original_message_type.as_str())
        .bind(history.status.as_str())
        .bind(&history.content)
        .bind(&history.origin)
        .bind(&history.issuer)
        .bind(history.created_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete_in(tx: &mut Transaction<'_, Sqlite>, delivery_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM message WHERE delivery_id = ?")
            .bind(delivery_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn history_where(&self, column: &str, value: &str) -> Result<Vec<History>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history WHERE {column} = ? ORDER BY created_at, id"
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    /// Decode a message row, failing it terminally when its stored values
    /// no longer parse. Returns `None` for a row that was failed.
    async fn decode_or_fail(&self, row: &SqliteRow) -> Result<Option<Message>> {
        let err = match message_from_row(row) {
            Ok(message) => return Ok(Some(message)),
            Err(err) if err.is_corrupt() => err,
            Err(err) => return Err(err),
        };

        let history = failed_history_from_raw(row)?;
        error!(
            delivery_id = %history.delivery_id,
            message_id = %history.message_id,
            error = %err,
            "Unreadable message row, recording it as FAILED"
        );

        let mut tx = self.pool.begin().await?;
        if Self::delete_in(&mut tx, &history.delivery_id).await? {
            Self::insert_history(&mut tx, &history).await?;
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(None)
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(StoreError::InvalidTimestamp(millis))
}

fn corrupt(delivery_id: &str) -> impl FnOnce(MessagingError) -> StoreError + '_ {
    move |source| StoreError::CorruptRow {
        delivery_id: delivery_id.to_string(),
        source,
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let delivery_id: String = row.try_get("delivery_id")?;
    let message_type: String = row.try_get("message_type")?;
    let original_message_type: String = row.try_get("original_message_type")?;
    let status: String = row.try_get("status")?;

    Ok(Message {
        message_type: message_type.parse().map_err(corrupt(&delivery_id))?,
        original_message_type: original_message_type.parse().map_err(corrupt(&delivery_id))?,
        status: status.parse::<MessageStatus>().map_err(corrupt(&delivery_id))?,
        message_id: row.try_get("message_id")?,
        batch_id: row.try_get("batch_id")?,
        party_id: row.try_get("party_id")?,
        municipality_id: row.try_get("municipality_id")?,
        content: row.try_get("content")?,
        origin: row.try_get("origin")?,
        issuer: row.try_get("issuer")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        delivery_id,
    })
}

/// FAILED record built from whatever columns of a corrupt row still read.
/// Unknown channel names fall back to `MESSAGE`.
fn failed_history_from_raw(row: &SqliteRow) -> Result<History> {
    let raw_type = |column: &str| -> Option<MessageType> {
        row.try_get::<String, _>(column).ok()?.parse().ok()
    };
    let message_type = raw_type("message_type").unwrap_or(MessageType::Message);

    Ok(History {
        delivery_id: row.try_get("delivery_id")?,
        message_id: row.try_get("message_id")?,
        batch_id: row.try_get("batch_id")?,
        municipality_id: row.try_get("municipality_id")?,
        message_type,
        original_message_type: raw_type("original_message_type").unwrap_or(message_type),
        status: MessageStatus::Failed,
        content: row.try_get("content")?,
        origin: row.try_get("origin")?,
        issuer: row.try_get("issuer")?,
        created_at: Utc::now(),
    })
}

fn history_from_row(row: &SqliteRow) -> Result<History> {
    let delivery_id: String = row.try_get("delivery_id")?;
    let message_type: String = row.try_get("message_type")?;
    let original_message_type: String = row.try_get("original_message_type")?;
    let status: String = row.try_get("status")?;

    Ok(History {
        message_type: message_type.parse().map_err(corrupt(&delivery_id))?,
        original_message_type: original_message_type.parse().map_err(corrupt(&delivery_id))?,
        status: status.parse::<MessageStatus>().map_err(corrupt(&delivery_id))?,
        message_id: row.try_get("message_id")?,
        batch_id: row.try_get("batch_id")?,
        municipality_id: row.try_get("municipality_id")?,
        content: row.try_get("content")?,
        origin: row.try_get("origin")?,
        issuer: row.try_get("issuer")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        delivery_id,
    })
}

#[async_trait]
impl DeliveryRepository for SqliteDeliveryRepository {
    async fn save(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_message(&mut tx, message).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_delivery_id(&self, delivery_id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM message WHERE delivery_id = ?"))
            .bind(delivery_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.decode_or_fail(&row).await,
            None => Ok(None),
        }
    }

    async fn find_all_pending(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM message WHERE status = ? ORDER BY created_at"
        ))
        .bind(MessageStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.decode_or_fail(row).await {
                Ok(Some(message)) => pending.push(message),
                Ok(None) => {}
                Err(e) => error!(error = %e, "Skipping pending row that could not be read"),
            }
        }
        Ok(pending)
    }

    async fn delete_by_delivery_id(&self, delivery_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = Self::delete_in(&mut tx, delivery_id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    async fn complete(&self, delivery_id: &str, history: History) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if !Self::delete_in(&mut tx, delivery_id).await? {
            tx.rollback().await?;
            debug!(delivery_id = %delivery_id, "Row already gone, terminal write skipped");
            return Ok(false);
        }
        Self::insert_history(&mut tx, &history).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn hand_over(
        &self,
        delivery_id: &str,
        successors: Vec<Message>,
        histories: Vec<History>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if !Self::delete_in(&mut tx, delivery_id).await? {
            tx.rollback().await?;
            debug!(delivery_id = %delivery_id, "Row already gone, hand-over skipped");
            return Ok(false);
        }
        for successor in &successors {
            Self::insert_message(&mut tx, successor).await?;
        }
        for history in &histories {
            Self::insert_history(&mut tx, history).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn append_history(&self, history: History) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_history(&mut tx, &history).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_history_by_message_id(&self, message_id: &str) -> Result<Vec<History>> {
        self.history_where("message_id", message_id).await
    }

    async fn find_history_by_delivery_id(&self, delivery_id: &str) -> Result<Vec<History>> {
        self.history_where("delivery_id", delivery_id).await
    }

    async fn find_history_by_batch_id(&self, batch_id: &str) -> Result<Vec<History>> {
        self.history_where("batch_id", batch_id).await
    }
}
