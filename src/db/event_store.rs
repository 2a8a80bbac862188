use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::watch;

use crate::models::{Event, EventDraft, EventImage};

/// Keyed store for cached event records.
///
/// Mutations notify watchers registered through [`EventStore::watch`],
/// which then read a fresh full snapshot.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
    changes: Arc<watch::Sender<u64>>,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    title: String,
    description: String,
    event_type_id: i64,
    start_date: String,
    location: String,
    created_at: String,
    updated_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct EventImageRow {
    id: i64,
    event_id: i64,
    original_name: String,
    filename: String,
    file_path: String,
    file_size: i64,
    uploaded_at: String,
    url: String,
}

impl EventImageRow {
    fn into_model(self) -> EventImage {
        EventImage {
            id: self.id,
            event_id: self.event_id,
            original_name: self.original_name,
            filename: self.filename,
            file_path: self.file_path,
            file_size: self.file_size,
            uploaded_at: self.uploaded_at,
            url: self.url,
        }
    }
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            pool,
            changes: Arc::new(changes),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Registers a watcher. The handle yields a new full snapshot each
    /// time the store changes; dropping it (or calling `unsubscribe`)
    /// ends the subscription.
    pub fn watch(&self) -> EventsWatch {
        EventsWatch {
            rx: self.changes.subscribe(),
            store: self.clone(),
        }
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    /// Inserts or replaces an event under its existing id, images included.
    pub async fn upsert(&self, event: &Event) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO events (id, title, description, event_type_id, start_date, location, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_type_id)
        .bind(&event.start_date)
        .bind(&event.location)
        .bind(&event.created_at)
        .bind(&event.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM event_images WHERE event_id = ?")
            .bind(event.id)
            .execute(&mut *tx)
            .await?;

        for image in &event.images {
            insert_image(&mut tx, event.id, image).await?;
        }

        tx.commit().await?;
        self.notify_changed();
        Ok(())
    }

    pub async fn upsert_many(&self, events: &[Event]) -> Result<(), sqlx::Error> {
        for event in events {
            self.upsert(event).await?;
        }
        Ok(())
    }

    /// Inserts a new event with a store-assigned id (server side).
    pub async fn insert_new(
        &self,
        draft: &EventDraft,
        created_at: &str,
    ) -> Result<Event, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (title, description, event_type_id, start_date, location, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.event_type_id)
        .bind(&draft.start_date)
        .bind(&draft.location)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.notify_changed();

        self.get_by_id(id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Replaces the mutable fields of an existing event, leaving its
    /// cached image list untouched.
    pub async fn update_fields(
        &self,
        id: i64,
        draft: &EventDraft,
        updated_at: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE events
            SET title = ?, description = ?, event_type_id = ?, start_date = ?, location = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.event_type_id)
        .bind(&draft.start_date)
        .bind(&draft.location)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.notify_changed();
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Event>, sqlx::Error> {
        let row: Option<EventRow> = sqlx::query_as("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.hydrate_event(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Lists cached events, newest first, optionally filtered by a
    /// keyword (matched against title, description and location) and an
    /// event type.
    pub async fn list(
        &self,
        keyword: Option<&str>,
        type_id: Option<i64>,
    ) -> Result<Vec<Event>, sqlx::Error> {
        let rows: Vec<EventRow> = match (keyword, type_id) {
            (Some(keyword), Some(type_id)) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM events
                    WHERE (title LIKE '%' || ? || '%'
                        OR description LIKE '%' || ? || '%'
                        OR location LIKE '%' || ? || '%')
                    AND event_type_id = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(keyword)
                .bind(keyword)
                .bind(keyword)
                .bind(type_id)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(keyword), None) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM events
                    WHERE title LIKE '%' || ? || '%'
                        OR description LIKE '%' || ? || '%'
                        OR location LIKE '%' || ? || '%'
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(keyword)
                .bind(keyword)
                .bind(keyword)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(type_id)) => {
                sqlx::query_as(
                    "SELECT * FROM events WHERE event_type_id = ? ORDER BY created_at DESC",
                )
                .bind(type_id)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query_as("SELECT * FROM events ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(self.hydrate_event(row).await?);
        }
        Ok(events)
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<(), sqlx::Error> {
        // CASCADE removes the event's images
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.notify_changed();
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM events").execute(&self.pool).await?;
        self.notify_changed();
        Ok(())
    }

    /// Appends image records to an event's list.
    pub async fn append_images(
        &self,
        event_id: i64,
        images: &[EventImage],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for image in images {
            insert_image(&mut tx, event_id, image).await?;
        }
        tx.commit().await?;
        self.notify_changed();
        Ok(())
    }

    /// Inserts a single image with a store-assigned id (server side).
    pub async fn add_image(&self, image: &EventImage) -> Result<EventImage, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_images (event_id, original_name, filename, file_path, file_size, uploaded_at, url)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(image.event_id)
        .bind(&image.original_name)
        .bind(&image.filename)
        .bind(&image.file_path)
        .bind(image.file_size)
        .bind(&image.uploaded_at)
        .bind(&image.url)
        .execute(&self.pool)
        .await?;

        self.notify_changed();
        Ok(EventImage {
            id: result.last_insert_rowid(),
            ..image.clone()
        })
    }

    pub async fn count_images(&self, event_id: i64) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM event_images WHERE event_id = ?")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn hydrate_event(&self, row: EventRow) -> Result<Event, sqlx::Error> {
        let images: Vec<EventImageRow> =
            sqlx::query_as("SELECT * FROM event_images WHERE event_id = ? ORDER BY id")
                .bind(row.id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Event {
            id: row.id,
            title: row.title,
            description: row.description,
            event_type_id: row.event_type_id,
            start_date: row.start_date,
            location: row.location,
            created_at: row.created_at,
            updated_at: row.updated_at,
            images: images.into_iter().map(EventImageRow::into_model).collect(),
        })
    }
}

async fn insert_image(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    event_id: i64,
    image: &EventImage,
) -> Result<(), sqlx::Error> {
    // Server-assigned ids are kept; id 0 means "not assigned yet"
    let id = (image.id > 0).then_some(image.id);
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO event_images (id, event_id, original_name, filename, file_path, file_size, uploaded_at, url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(event_id)
    .bind(&image.original_name)
    .bind(&image.filename)
    .bind(&image.file_path)
    .bind(image.file_size)
    .bind(&image.uploaded_at)
    .bind(&image.url)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Subscription handle returned by [`EventStore::watch`].
pub struct EventsWatch {
    rx: watch::Receiver<u64>,
    store: EventStore,
}

impl EventsWatch {
    /// Waits for the next store change and returns a fresh snapshot of
    /// all cached events. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Result<Vec<Event>, sqlx::Error>> {
        if self.rx.changed().await.is_err() {
            return None;
        }
        Some(self.store.list(None, None).await)
    }

    /// Current snapshot without waiting for a change.
    pub async fn snapshot(&self) -> Result<Vec<Event>, sqlx::Error> {
        self.store.list(None, None).await
    }

    /// Explicit disposal; dropping the handle has the same effect.
    pub fn unsubscribe(self) {}
}
