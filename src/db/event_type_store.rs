use sqlx::SqlitePool;

use crate::models::EventType;

/// Store for the small event-types reference table.
#[derive(Clone)]
pub struct EventTypeStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct EventTypeRow {
    id: i64,
    name: String,
    description: String,
}

impl EventTypeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, event_type: &EventType) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO event_types (id, name, description) VALUES (?, ?, ?)")
            .bind(event_type.id)
            .bind(&event_type.name)
            .bind(&event_type.description)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_many(&self, event_types: &[EventType]) -> Result<(), sqlx::Error> {
        for event_type in event_types {
            self.upsert(event_type).await?;
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<EventType>, sqlx::Error> {
        let row: Option<EventTypeRow> = sqlx::query_as("SELECT * FROM event_types WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| EventType::new(r.id, r.name, r.description)))
    }

    pub async fn list(&self) -> Result<Vec<EventType>, sqlx::Error> {
        let rows: Vec<EventTypeRow> = sqlx::query_as("SELECT * FROM event_types ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| EventType::new(r.id, r.name, r.description))
            .collect())
    }

    /// Makes sure a type row exists for the given id so event inserts
    /// referencing it satisfy the foreign key. Unknown ids get a
    /// placeholder record; a later type-list fetch overwrites it.
    pub async fn ensure_exists(&self, type_id: i64) -> Result<(), sqlx::Error> {
        let placeholder = EventType::placeholder(type_id);
        sqlx::query("INSERT OR IGNORE INTO event_types (id, name, description) VALUES (?, ?, ?)")
            .bind(placeholder.id)
            .bind(&placeholder.name)
            .bind(&placeholder.description)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
