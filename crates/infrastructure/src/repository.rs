use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    HistoryLimit, Message, MessageContent, MessageId, MessageRepository, MessageStatus,
    PresenceStatus, RepositoryError, RepositoryResult, StatusRepository, Timestamp, UserId,
    UserStatus,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    content: String,
    sent_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let sender_id =
            UserId::parse(value.sender_id).map_err(|err| invalid_data(err.to_string()))?;
        let receiver_id =
            UserId::parse(value.receiver_id).map_err(|err| invalid_data(err.to_string()))?;
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let status = value
            .status
            .parse::<MessageStatus>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message {
            id: Some(MessageId::new(value.id)),
            sender_id,
            receiver_id,
            content,
            timestamp: value.sent_at,
            status,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatusRecord {
    user_id: i64,
    status: String,
    last_seen: DateTime<Utc>,
}

impl TryFrom<StatusRecord> for UserStatus {
    type Error = RepositoryError;

    fn try_from(value: StatusRecord) -> Result<Self, Self::Error> {
        let user_id = UserId::parse(value.user_id).map_err(|err| invalid_data(err.to_string()))?;
        let status = value
            .status
            .parse::<PresenceStatus>()
            .map_err(|err| invalid_data(err.to_string()))?;
        Ok(UserStatus::new(user_id, status, value.last_seen))
    }
}

fn into_messages(records: Vec<MessageRecord>) -> RepositoryResult<Vec<Message>> {
    records.into_iter().map(Message::try_from).collect()
}

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, sent_at, status";

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: &Message) -> RepositoryResult<MessageId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO messages (sender_id, receiver_id, content, sent_at, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(message.sender_id.value())
        .bind(message.receiver_id.value())
        .bind(message.content.as_str())
        .bind(message.timestamp)
        .bind(message.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(MessageId::new(id))
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn conversation(
        &self,
        a: UserId,
        b: UserId,
        limit: HistoryLimit,
    ) -> RepositoryResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY sent_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(a.value())
        .bind(b.value())
        .bind(i64::from(limit.value()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        into_messages(records)
    }

    async fn user_messages(
        &self,
        user: UserId,
        limit: HistoryLimit,
    ) -> RepositoryResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE sender_id = $1 OR receiver_id = $1
            ORDER BY sent_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(user.value())
        .bind(i64::from(limit.value()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        into_messages(records)
    }

    async fn undelivered(&self, receiver: UserId) -> RepositoryResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE receiver_id = $1 AND status = 'sent'
            ORDER BY sent_at ASC, id ASC
            "#
        ))
        .bind(receiver.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        into_messages(records)
    }

    async fn mark_delivered(&self, id: MessageId) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET status = 'delivered' WHERE id = $1 AND status = 'sent'",
        )
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_delivered_for_receiver(&self, receiver: UserId) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET status = 'delivered' WHERE receiver_id = $1 AND status = 'sent'",
        )
        .bind(receiver.value())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn mark_read(&self, sender: UserId, receiver: UserId) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET status = 'read'
            WHERE sender_id = $1 AND receiver_id = $2 AND status = 'delivered'
            "#,
        )
        .bind(sender.value())
        .bind(receiver.value())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgStatusRepository {
    pool: PgPool,
}

impl PgStatusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusRepository for PgStatusRepository {
    async fn upsert(&self, status: &UserStatus) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_status (user_id, status, last_seen)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET status = EXCLUDED.status, last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(status.user_id.value())
        .bind(status.status.as_str())
        .bind(status.last_seen)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn find(&self, user: UserId) -> RepositoryResult<Option<UserStatus>> {
        let record = sqlx::query_as::<_, StatusRecord>(
            "SELECT user_id, status, last_seen FROM user_status WHERE user_id = $1",
        )
        .bind(user.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(UserStatus::try_from).transpose()
    }

    async fn list(&self) -> RepositoryResult<Vec<UserStatus>> {
        let records = sqlx::query_as::<_, StatusRecord>(
            "SELECT user_id, status, last_seen FROM user_status ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(UserStatus::try_from).collect()
    }

    async fn mark_all_offline(&self, at: Timestamp) -> RepositoryResult<u64> {
        let result = sqlx::query(
            "UPDATE user_status SET status = 'offline', last_seen = $1 WHERE status = 'online'",
        )
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
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
