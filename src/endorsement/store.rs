/// Pending endorsement store - log entries waiting for an operator
use crate::{
    did::{LogEntry, Parameters},
    error::{WebvhError, WebvhResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Log entry stored for manual endorsement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEndorsement {
    pub entry_id: String,
    pub connection_id: String,
    pub document: LogEntry,
    pub parameters: Parameters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed store, unique on (entry id, connection id)
#[derive(Clone)]
pub struct EndorsementStore {
    db: SqlitePool,
}

impl EndorsementStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Save a log entry received on `connection_id`
    ///
    /// Saving the same entry again on the same connection replaces the
    /// stored document and parameters.
    pub async fn save(
        &self,
        document: &LogEntry,
        connection_id: &str,
        parameters: &Parameters,
    ) -> WebvhResult<()> {
        let now = Utc::now().to_rfc3339();
        let document_json = serde_json::to_string(document)?;
        let parameters_json = serde_json::to_string(parameters)?;

        sqlx::query(
            r#"
            INSERT INTO pending_endorsement (entry_id, connection_id, document, parameters, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(entry_id, connection_id) DO UPDATE SET
                document = excluded.document,
                parameters = excluded.parameters,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&document.id)
        .bind(connection_id)
        .bind(&document_json)
        .bind(&parameters_json)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Get the pending entry for an identifier on a connection
    pub async fn get(
        &self,
        entry_id: &str,
        connection_id: &str,
    ) -> WebvhResult<Option<PendingEndorsement>> {
        let row = sqlx::query(
            r#"
            SELECT entry_id, connection_id, document, parameters, created_at, updated_at
            FROM pending_endorsement
            WHERE entry_id = ?1 AND connection_id = ?2
            "#,
        )
        .bind(entry_id)
        .bind(connection_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| parse_row(&row)).transpose()
    }

    /// All pending entries for an identifier, across connections
    pub async fn find_by_identifier(&self, entry_id: &str) -> WebvhResult<Vec<PendingEndorsement>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, connection_id, document, parameters, created_at, updated_at
            FROM pending_endorsement
            WHERE entry_id = ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(entry_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_row).collect()
    }

    /// List all pending entries, oldest first
    pub async fn list(&self) -> WebvhResult<Vec<PendingEndorsement>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, connection_id, document, parameters, created_at, updated_at
            FROM pending_endorsement
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_row).collect()
    }

    /// Remove a pending entry; returns whether it existed
    pub async fn remove(&self, entry_id: &str, connection_id: &str) -> WebvhResult<bool> {
        let result = sqlx::query(
            "DELETE FROM pending_endorsement WHERE entry_id = ?1 AND connection_id = ?2",
        )
        .bind(entry_id)
        .bind(connection_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_row(row: &SqliteRow) -> WebvhResult<PendingEndorsement> {
    let document: String = row.try_get("document")?;
    let parameters: String = row.try_get("parameters")?;

    Ok(PendingEndorsement {
        entry_id: row.try_get("entry_id")?,
        connection_id: row.try_get("connection_id")?,
        document: serde_json::from_str(&document)?,
        parameters: serde_json::from_str(&parameters)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn parse_timestamp(s: &str) -> WebvhResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WebvhError::Internal(format!("Invalid timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    async fn create_test_store() -> EndorsementStore {
        EndorsementStore::new(db::create_memory_pool().await.unwrap())
    }

    fn entry(id: &str, note: &str) -> LogEntry {
        LogEntry::from_value(json!({
            "id": id,
            "note": note,
            "proof": [{
                "type": "DataIntegrityProof",
                "proofPurpose": "assertionMethod",
                "verificationMethod": "did:key:z6Mk#z6Mk",
                "domain": "example.com"
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = create_test_store().await;
        let mut parameters = Parameters::new();
        parameters.insert("portable".to_string(), json!(true));

        let document = entry("did:web:example.com:prod:1", "first");
        store.save(&document, "conn-1", &parameters).await.unwrap();

        let record = store
            .get("did:web:example.com:prod:1", "conn-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.document, document);
        assert_eq!(record.parameters, parameters);
        assert_eq!(record.connection_id, "conn-1");

        assert!(store.get("did:web:example.com:prod:1", "conn-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_twice_overwrites() {
        let store = create_test_store().await;
        let id = "did:web:example.com:prod:1";

        store.save(&entry(id, "first"), "conn-1", &Parameters::new()).await.unwrap();
        let first = store.get(id, "conn-1").await.unwrap().unwrap();

        store.save(&entry(id, "second"), "conn-1", &Parameters::new()).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].document.rest["note"], "second");
        assert_eq!(all[0].created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_same_identifier_on_two_connections() {
        let store = create_test_store().await;
        let id = "did:web:example.com:prod:1";

        store.save(&entry(id, "a"), "conn-1", &Parameters::new()).await.unwrap();
        store.save(&entry(id, "b"), "conn-2", &Parameters::new()).await.unwrap();

        assert_eq!(store.find_by_identifier(id).await.unwrap().len(), 2);

        assert!(store.remove(id, "conn-1").await.unwrap());
        assert!(!store.remove(id, "conn-1").await.unwrap());

        let remaining = store.find_by_identifier(id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].connection_id, "conn-2");
    }
}
