use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatMessage, MessageId, MessageType, NewMessage, RepositoryError, RoomName, UserRef,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use application::{MessageRepository, UserDirectory};

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

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
    sender_username: String,
    receiver_id: Option<i64>,
    receiver_username: Option<String>,
    message: Option<String>,
    image_content: Option<String>,
    message_type: String,
    room_name: String,
    is_dm: bool,
    is_read: bool,
    timestamp: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let message_type = match value.message_type.as_str() {
            "text" => MessageType::Text,
            "image" => MessageType::Image,
            other => return Err(invalid_data(format!("unknown message type: {other}"))),
        };
        let room_name =
            RoomName::parse(value.room_name).map_err(|err| invalid_data(err.to_string()))?;
        let receiver = match (value.receiver_id, value.receiver_username) {
            (Some(id), Some(username)) => Some(UserRef::new(id, username)),
            (None, None) => None,
            _ => return Err(invalid_data("receiver columns are inconsistent")),
        };

        Ok(ChatMessage {
            id: MessageId(value.id),
            sender: UserRef::new(value.sender_id, value.sender_username),
            receiver,
            message: value.message,
            image_content: value.image_content,
            message_type,
            room_name,
            is_dm: value.is_dm,
            is_read: value.is_read,
            timestamp: value.timestamp,
        })
    }
}

/// PostgreSQL 消息仓储
///
/// `chat_messages.id` 是 BIGSERIAL，写入顺序就是房间内的排序权威。
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
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, RepositoryError> {
        let message_type = match message.message_type {
            MessageType::Text => "text",
            MessageType::Image => "image",
        };

        #[derive(FromRow)]
        struct InsertedRow {
            id: i64,
            is_read: bool,
            timestamp: DateTime<Utc>,
        }

        let inserted = sqlx::query_as::<_, InsertedRow>(
            r#"INSERT INTO chat_messages
                   (sender_id, receiver_id, message, image_content, message_type, room_name, is_dm)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, is_read, timestamp"#,
        )
        .bind(message.sender.id)
        .bind(message.receiver.as_ref().map(|r| r.id))
        .bind(&message.message)
        .bind(&message.image_content)
        .bind(message_type)
        .bind(message.room_name.as_str())
        .bind(message.is_dm)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ChatMessage {
            id: MessageId(inserted.id),
            sender: message.sender,
            receiver: message.receiver,
            message: message.message,
            image_content: message.image_content,
            message_type: message.message_type,
            room_name: message.room_name,
            is_dm: message.is_dm,
            is_read: inserted.is_read,
            timestamp: inserted.timestamp,
        })
    }

    async fn list_recent(
        &self,
        room: &RoomName,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"SELECT m.id, m.sender_id, s.username AS sender_username,
                      m.receiver_id, r.username AS receiver_username,
                      m.message, m.image_content, m.message_type, m.room_name,
                      m.is_dm, m.is_read, m.timestamp
               FROM chat_messages m
               JOIN users s ON s.id = m.sender_id
               LEFT JOIN users r ON r.id = m.receiver_id
               WHERE m.room_name = $1
               ORDER BY m.id DESC
               LIMIT $2"#,
        )
        .bind(room.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn mark_read(
        &self,
        ids: &[MessageId],
        reader_id: i64,
    ) -> Result<Vec<MessageId>, RepositoryError> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"UPDATE chat_messages
               SET is_read = TRUE
               WHERE id = ANY($1) AND receiver_id = $2 AND is_read = FALSE
               RETURNING id"#,
        )
        .bind(&raw_ids)
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().map(|(id,)| MessageId(id)).collect())
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
}

impl From<UserRecord> for UserRef {
    fn from(value: UserRecord) -> Self {
        UserRef::new(value.id, value.username)
    }
}

/// PostgreSQL 用户目录，只读。
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
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRef>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(UserRef::from))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRef>, RepositoryError> {
        let record =
            sqlx::query_as::<_, UserRecord>("SELECT id, username FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(record.map(UserRef::from))
    }

    async fn find_by_usernames(
        &self,
        usernames: &[String],
    ) -> Result<Vec<UserRef>, RepositoryError> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        // 单次批量查询，不按用户回表
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username FROM users WHERE username = ANY($1)",
        )
        .bind(usernames)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(UserRef::from).collect())
    }
}
