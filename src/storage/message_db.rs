use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, Result as SqlResult, params};
use uuid::Uuid;

use crate::common::{ChatMessage, ContentKind, MessageId, MessageRow, NewMessageRow};
use crate::error::{ChatError, ChatResult};
use crate::network::{LocalRelay, MessageStore};

/// `messages` table in SQLite, mirroring the backend's schema. Inserts are
/// published on the relay the way the hosted changefeed would.
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
    relay: LocalRelay,
}

impl SqliteMessageStore {
    /// Open (or create) the store at a custom path
    pub fn with_path<P: AsRef<Path>>(path: P, relay: LocalRelay) -> SqlResult<Self> {
        Self::init(Connection::open(path)?, relay)
    }

    pub fn in_memory(relay: LocalRelay) -> SqlResult<Self> {
        Self::init(Connection::open_in_memory()?, relay)
    }

    fn init(conn: Connection, relay: LocalRelay) -> SqlResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            relay,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_rows(&self) -> SqlResult<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_name, type, content, file_name, created_at
             FROM messages
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MessageRow {
                    id: MessageId::new(row.get::<_, String>(0)?),
                    user_name: row.get(1)?,
                    kind: ContentKind::from_name(&row.get::<_, String>(2)?),
                    content: row.get(3)?,
                    file_name: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    fn insert_row(&self, row: NewMessageRow) -> SqlResult<MessageRow> {
        let stored = MessageRow {
            id: MessageId::new(Uuid::new_v4().to_string()),
            user_name: row.user_name.to_string(),
            kind: row.kind,
            content: row.content,
            file_name: row.file_name,
            created_at: Utc::now(),
        };

        self.lock().execute(
            "INSERT INTO messages (id, user_name, type, content, file_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id.as_str(),
                stored.user_name,
                stored.kind.as_str(),
                stored.content,
                stored.file_name,
                stored.created_at
            ],
        )?;

        Ok(stored)
    }

    /// Get message count
    pub fn count(&self) -> SqlResult<usize> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn init_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'text',
            content TEXT NOT NULL,
            file_name TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at)",
        [],
    )?;

    Ok(())
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn read_all(&self) -> ChatResult<Vec<MessageRow>> {
        self.read_rows()
            .map_err(|err| ChatError::FetchFailed(err.to_string()))
    }

    async fn insert(&self, row: NewMessageRow) -> ChatResult<MessageRow> {
        let stored = self
            .insert_row(row)
            .map_err(|err| ChatError::SendFailed(err.to_string()))?;

        match ChatMessage::try_from(stored.clone()) {
            Ok(message) => self.relay.publish_insert(message),
            Err(err) => log::warn!("Not publishing inserted row: {err}"),
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Identity, RealtimeEvent};
    use crate::network::RealtimeTransport;

    #[tokio::test]
    async fn rows_come_back_in_insert_order_with_server_fields() {
        let store = SqliteMessageStore::in_memory(LocalRelay::new()).unwrap();

        let first = store
            .insert(NewMessageRow::text(Identity::Leo, "hi"))
            .await
            .unwrap();
        let second = store
            .insert(NewMessageRow::attachment(
                Identity::Janice,
                ContentKind::Audio,
                "file:///tmp/voice.ogg".into(),
                "voice.ogg".into(),
            ))
            .await
            .unwrap();

        let rows = store.read_all().await.unwrap();
        assert_eq!(rows, vec![first, second]);
        assert_eq!(rows[1].file_name.as_deref(), Some("voice.ogg"));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_is_published_on_the_relay() {
        let relay = LocalRelay::new();
        let mut transport = relay.transport();
        let mut events = transport.subscribe(Identity::Janice).await.unwrap();
        let store = SqliteMessageStore::in_memory(relay).unwrap();

        let stored = store
            .insert(NewMessageRow::text(Identity::Leo, "ping"))
            .await
            .unwrap();

        loop {
            match events.recv().await {
                Some(RealtimeEvent::MessageCreated(message)) => {
                    assert_eq!(message.id, stored.id);
                    break;
                }
                Some(RealtimeEvent::PresenceSync(_)) => continue,
                None => panic!("relay closed"),
            }
        }
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let store = SqliteMessageStore::with_path(&path, LocalRelay::new()).unwrap();
        store
            .insert_row(NewMessageRow::text(Identity::Leo, "kept"))
            .unwrap();
        drop(store);

        let reopened = SqliteMessageStore::with_path(&path, LocalRelay::new()).unwrap();
        let rows = reopened.read_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "kept");
    }
}
