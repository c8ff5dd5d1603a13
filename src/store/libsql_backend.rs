//! libSQL backend: async `MessageStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::pipeline::types::CanonicalMessage;
use crate::store::migrations;
use crate::store::traits::{InsertOutcome, MessageStore, StoredMessage};

/// libSQL message store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let store = Self::from_database(db)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a StoredMessage. Column order matches `MESSAGE_COLUMNS`.
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let timestamp: String = row.get(11)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        wa_id: row.get(1)?,
        sender_name: row.get(2).ok(),
        message_id: row.get(3)?,
        message_type: row.get(4)?,
        message_body: row.get(5).ok(),
        media_id: row.get(6).ok(),
        mime_type: row.get(7).ok(),
        filename: row.get(8).ok(),
        links: row.get(9)?,
        headers: row.get(10)?,
        timestamp: parse_datetime(&timestamp),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const MESSAGE_COLUMNS: &str = "id, wa_id, sender_name, message_id, message_type, message_body, media_id, mime_type, filename, links, headers, timestamp";

#[async_trait]
impl MessageStore for LibSqlStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    async fn insert_message(
        &self,
        message: &CanonicalMessage,
    ) -> Result<InsertOutcome, DatabaseError> {
        let headers = if message.raw_headers.is_empty() {
            "{}"
        } else {
            message.raw_headers.as_str()
        };

        // Ignored rows return nothing from RETURNING.
        let mut rows = self
            .conn
            .query(
                "INSERT OR IGNORE INTO whatsapp_messages (wa_id, sender_name, message_id,
                    message_type, message_body, media_id, mime_type, filename, links,
                    headers, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 RETURNING id",
                params![
                    message.wa_id.as_str(),
                    opt_text(message.sender_name.as_deref()),
                    message.message_id.as_str(),
                    message.message_type.as_str(),
                    opt_text(message.body.as_deref()),
                    opt_text(message.media_id.as_deref()),
                    opt_text(message.mime_type.as_deref()),
                    opt_text(message.filename.as_deref()),
                    message.links_joined(),
                    headers,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        match row {
            Some(row) => {
                let id: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                debug!(id, message_id = %message.message_id, "Message inserted into DB");
                Ok(InsertOutcome::Inserted(id))
            }
            None => {
                debug!(message_id = %message.message_id, "Duplicate message ignored");
                Ok(InsertOutcome::Duplicate)
            }
        }
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM whatsapp_messages WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let msg = row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn list_messages(&self) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM whatsapp_messages ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?
        {
            match row_to_message(&row) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    tracing::warn!("Skipping message row: {e}");
                }
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::MessageType;

    async fn test_db() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    fn make_message(id: &str) -> CanonicalMessage {
        CanonicalMessage {
            wa_id: "15551234567".into(),
            sender_name: Some("Alice".into()),
            message_id: id.into(),
            message_type: MessageType::Text,
            body: Some("see https://example.com".into()),
            media_id: None,
            mime_type: None,
            filename: None,
            links: vec!["https://example.com".into()],
            raw_headers: r#"{"user-agent":"test"}"#.into(),
        }
    }

    #[tokio::test]
    async fn insert_and_get() {
        let db = test_db().await;
        let outcome = db.insert_message(&make_message("wamid.1")).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));

        let stored = db.get_message("wamid.1").await.unwrap().unwrap();
        assert_eq!(stored.wa_id, "15551234567");
        assert_eq!(stored.sender_name.as_deref(), Some("Alice"));
        assert_eq!(stored.message_type, "text");
        assert_eq!(stored.message_body.as_deref(), Some("see https://example.com"));
        assert_eq!(stored.links, "https://example.com");
        assert_eq!(stored.headers, r#"{"user-agent":"test"}"#);
        assert!(stored.media_id.is_none());
        assert!(stored.timestamp > DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn get_not_found() {
        let db = test_db().await;
        assert!(db.get_message("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_message_id_is_ignored() {
        let db = test_db().await;
        let first = db.insert_message(&make_message("wamid.dup")).await.unwrap();
        let mut second_msg = make_message("wamid.dup");
        second_msg.body = Some("changed".into());
        let second = db.insert_message(&second_msg).await.unwrap();

        assert!(matches!(first, InsertOutcome::Inserted(_)));
        assert_eq!(second, InsertOutcome::Duplicate);

        let all = db.list_messages().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message_body.as_deref(), Some("see https://example.com"));
    }

    #[tokio::test]
    async fn list_in_insertion_order() {
        let db = test_db().await;
        for id in ["a", "b", "c"] {
            db.insert_message(&make_message(id)).await.unwrap();
        }
        let ids: Vec<String> = db
            .list_messages()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn media_fields_and_empty_headers() {
        let db = test_db().await;
        let msg = CanonicalMessage {
            message_type: MessageType::Document,
            body: Some("document received".into()),
            media_id: Some("doc-1".into()),
            mime_type: Some("application/pdf".into()),
            filename: Some("report.pdf".into()),
            links: vec![],
            raw_headers: String::new(),
            ..make_message("wamid.doc")
        };
        db.insert_message(&msg).await.unwrap();

        let stored = db.get_message("wamid.doc").await.unwrap().unwrap();
        assert_eq!(stored.message_type, "document");
        assert_eq!(stored.filename.as_deref(), Some("report.pdf"));
        assert_eq!(stored.links, "");
        assert_eq!(stored.headers, "{}");
    }

    #[tokio::test]
    async fn local_file_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("whatsapp.db");

        {
            let db = LibSqlStore::new_local(&path).await.unwrap();
            db.insert_message(&make_message("persist")).await.unwrap();
        }

        let db = LibSqlStore::new_local(&path).await.unwrap();
        assert!(db.get_message("persist").await.unwrap().is_some());
        assert_eq!(
            db.insert_message(&make_message("persist")).await.unwrap(),
            InsertOutcome::Duplicate
        );
    }
}
