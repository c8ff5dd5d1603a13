//! Schema setup for the libSQL backend.
//!
//! The applied schema version lives in SQLite's `user_version` pragma, so an
//! existing database is only touched when it is behind `SCHEMA_VERSION`.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

/// Version written to `user_version` once `SCHEMA` has been applied.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS whatsapp_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        wa_id TEXT NOT NULL,
        sender_name TEXT,
        message_id TEXT NOT NULL UNIQUE,
        message_type TEXT NOT NULL,
        message_body TEXT,
        media_id TEXT,
        mime_type TEXT,
        filename TEXT,
        links TEXT NOT NULL DEFAULT '',
        headers TEXT NOT NULL DEFAULT '{}',
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_whatsapp_messages_wa_id ON whatsapp_messages(wa_id);
"#;

/// Bring the schema up to `SCHEMA_VERSION`.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn).await?;
    if applied >= SCHEMA_VERSION {
        debug!(version = applied, "Schema up to date");
        return Ok(());
    }

    info!(from = applied, to = SCHEMA_VERSION, "Applying schema");
    conn.execute_batch(&format!("{SCHEMA}\nPRAGMA user_version = {SCHEMA_VERSION};"))
        .await
        .map_err(|e| DatabaseError::Migration(format!("schema V{SCHEMA_VERSION}: {e}")))?;
    Ok(())
}

/// Value of `PRAGMA user_version`; 0 for a fresh database.
pub async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("PRAGMA user_version", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("user_version: {e}")))?;

    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("user_version: {e}")))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| DatabaseError::Migration(format!("user_version: {e}"))),
        None => Ok(0),
    }
}
