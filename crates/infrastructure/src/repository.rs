use std::sync::Arc;

use application::{MessageStore, UserDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    MessageContent, MessageId, MessageRecord, NewMessage, RepositoryError, Timestamp, UserId,
    UserProfile,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

const MESSAGE_COLUMNS: &str =
    "id, seq, sender_id, receiver_id, content, message_type, file_url, read_at, created_at";

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    seq: i64,
    sender_id: String,
    receiver_id: String,
    content: String,
    message_type: String,
    file_url: Option<String>,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = RepositoryError;

    fn try_from(value: MessageRow) -> Result<Self, Self::Error> {
        let sender_id = UserId::parse(value.sender_id).map_err(|err| invalid_data(err.to_string()))?;
        let receiver_id =
            UserId::parse(value.receiver_id).map_err(|err| invalid_data(err.to_string()))?;
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let message_type = value
            .message_type
            .parse()
            .map_err(|err: domain::DomainError| invalid_data(err.to_string()))?;

        Ok(MessageRecord {
            id: MessageId::from(value.id),
            sender_id,
            receiver_id,
            content,
            message_type,
            file_url: value.file_url,
            read_at: value.read_at,
            created_at: value.created_at,
            sequence: value.seq,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    username: String,
    avatar: String,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = RepositoryError;

    fn try_from(value: ProfileRow) -> Result<Self, Self::Error> {
        let id = UserId::parse(value.id).map_err(|err| invalid_data(err.to_string()))?;
        Ok(UserProfile::new(id, value.username, value.avatar))
    }
}

fn into_records(rows: Vec<MessageRow>) -> Result<Vec<MessageRecord>, RepositoryError> {
    rows.into_iter().map(MessageRecord::try_from).collect()
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, message: NewMessage) -> Result<MessageRecord, RepositoryError> {
        let sql = format!(
            "INSERT INTO messages (id, sender_id, receiver_id, content, message_type, file_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(message.sender_id.as_str())
            .bind(message.receiver_id.as_str())
            .bind(message.content.as_str())
            .bind(message.message_type.as_str())
            .bind(message.file_url.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        MessageRecord::try_from(row)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<MessageRecord>, RepositoryError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.map(MessageRecord::try_from).transpose()
    }

    async fn find_between(
        &self,
        user_id: &UserId,
        counterpart_id: &UserId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) \
                OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at DESC, seq DESC \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(user_id.as_str())
            .bind(counterpart_id.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        into_records(rows)
    }

    async fn mark_read(
        &self,
        id: MessageId,
        reader_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<MessageRecord>, RepositoryError> {
        // 单条条件更新，并发的重复标记只有一个能命中
        let sql = format!(
            "UPDATE messages SET read_at = $3 \
             WHERE id = $1 AND receiver_id = $2 AND read_at IS NULL \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::from(id))
            .bind(reader_id.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.map(MessageRecord::try_from).transpose()
    }

    async fn latest_per_counterpart(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM ( \
                 SELECT DISTINCT ON (counterpart) {MESSAGE_COLUMNS} FROM ( \
                     SELECT *, CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS counterpart \
                     FROM messages \
                     WHERE sender_id = $1 OR receiver_id = $1 \
                 ) involved \
                 ORDER BY counterpart, created_at DESC, seq DESC \
             ) latest \
             ORDER BY created_at DESC, seq DESC"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        into_records(rows)
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();
        let rows = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, username, avatar
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter().map(UserProfile::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub message_store: Arc<PgMessageStore>,
    pub user_directory: Arc<PgUserDirectory>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            message_store: Arc::new(PgMessageStore::new(pool.clone())),
            user_directory: Arc::new(PgUserDirectory::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
