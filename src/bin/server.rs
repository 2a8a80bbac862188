//! Todoevent development server
//!
//! Implements the event API the CLI syncs against: envelope-wrapped
//! JSON over sqlite, with image uploads stored on disk.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TODOEVENT_PORT`: Port to listen on (default: 5000)
//! - `TODOEVENT_DATA_DIR`: Directory for the database and uploaded
//!   images (default: ~/.local/share/todoevent-server)
//!
//! # Endpoints
//!
//! - `GET /`: Service info
//! - `GET /event-types`: List event types
//! - `GET /events?q=&typeId=`: List events with optional filters
//! - `POST /events`: Create an event
//! - `GET /events/{id}`: Get one event
//! - `PUT /events/{id}`: Replace an event's fields
//! - `DELETE /events/{id}`: Delete an event
//! - `POST /events/{id}/images`: Upload images (multipart field "images")
//! - `GET /uploads/{file}`: Serve uploaded images

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todoevent::api::types::{
    CreateEventRequest, EventListData, EventPayload, EventTypePayload, ImageUploadData,
};
use todoevent::db::{init_db, EventStore, EventTypeStore};
use todoevent::models::{
    EventDraft, EventImage, EventType, ALLOWED_IMAGE_EXTENSIONS, MAX_IMAGES_PER_EVENT,
    MAX_IMAGE_BYTES,
};

/// Timestamp format used in stored records.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// ============================================================================
// Configuration
// ============================================================================

struct Config {
    port: u16,
    data_dir: PathBuf,
}

impl Config {
    fn from_env() -> Self {
        let port = std::env::var("TODOEVENT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);

        let data_dir = std::env::var("TODOEVENT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("todoevent-server")
            });

        Self { port, data_dir }
    }
}

// ============================================================================
// State and envelope responses
// ============================================================================

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    store: EventStore,
    types: EventTypeStore,
    uploads_dir: PathBuf,
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: Option<T>,
    message: String,
}

fn ok<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    reply(StatusCode::OK, Some(data), message)
}

fn created<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    reply(StatusCode::CREATED, Some(data), message)
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    reply::<serde_json::Value>(status, None, message)
}

fn reply<T: Serialize>(status: StatusCode, data: Option<T>, message: impl Into<String>) -> Response {
    (
        status,
        Json(Envelope {
            success: status.is_success(),
            data,
            message: message.into(),
        }),
    )
        .into_response()
}

fn db_error(e: sqlx::Error) -> Response {
    tracing::error!("Database error: {}", e);
    fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
}

async fn home() -> Response {
    ok(
        ServiceInfo {
            service: "todoevent-server",
            version: env!("CARGO_PKG_VERSION"),
        },
        "Event API is running",
    )
}

async fn list_event_types(State(state): State<AppState>) -> Response {
    match state.types.list().await {
        Ok(types) => {
            let payloads: Vec<EventTypePayload> =
                types.iter().map(EventTypePayload::from).collect();
            ok(payloads, "Event types retrieved")
        }
        Err(e) => db_error(e),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
    #[serde(rename = "typeId")]
    type_id: Option<i64>,
}

async fn list_events(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    match state.store.list(query.q.as_deref(), query.type_id).await {
        Ok(events) => {
            let payloads: Vec<EventPayload> = events.iter().map(EventPayload::from).collect();
            let total = payloads.len() as i64;
            ok(
                EventListData {
                    events: payloads,
                    total,
                },
                "Events retrieved",
            )
        }
        Err(e) => db_error(e),
    }
}

async fn get_event(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.get_by_id(id).await {
        Ok(Some(event)) => ok(EventPayload::from(&event), "Event retrieved"),
        Ok(None) => fail(StatusCode::NOT_FOUND, format!("Event not found: {}", id)),
        Err(e) => db_error(e),
    }
}

/// Validates a create/update body; returns the draft or an error reply.
async fn validate_body(
    state: &AppState,
    body: &CreateEventRequest,
) -> Result<EventDraft, Response> {
    if body.title.trim().is_empty()
        || body.title.chars().count() > 255
        || body.description.trim().is_empty()
        || body.start_date.trim().is_empty()
        || body.location.trim().is_empty()
    {
        return Err(fail(
            StatusCode::BAD_REQUEST,
            "title (max 255 chars), description, startDate and location are required",
        ));
    }

    match state.types.get_by_id(body.type_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(fail(
                StatusCode::BAD_REQUEST,
                format!("Unknown event type: {}", body.type_id),
            ))
        }
        Err(e) => return Err(db_error(e)),
    }

    Ok(EventDraft {
        title: body.title.clone(),
        description: body.description.clone(),
        event_type_id: body.type_id,
        start_date: body.start_date.clone(),
        location: body.location.clone(),
    })
}

async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<CreateEventRequest>,
) -> Response {
    let draft = match validate_body(&state, &body).await {
        Ok(draft) => draft,
        Err(response) => return response,
    };

    match state.store.insert_new(&draft, &now_timestamp()).await {
        Ok(event) => created(EventPayload::from(&event), "Event created"),
        Err(e) => db_error(e),
    }
}

async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<CreateEventRequest>,
) -> Response {
    match state.store.get_by_id(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return fail(StatusCode::NOT_FOUND, format!("Event not found: {}", id)),
        Err(e) => return db_error(e),
    }

    let draft = match validate_body(&state, &body).await {
        Ok(draft) => draft,
        Err(response) => return response,
    };

    if let Err(e) = state
        .store
        .update_fields(id, &draft, Some(&now_timestamp()))
        .await
    {
        return db_error(e);
    }

    match state.store.get_by_id(id).await {
        Ok(Some(event)) => ok(EventPayload::from(&event), "Event updated"),
        Ok(None) => fail(StatusCode::NOT_FOUND, format!("Event not found: {}", id)),
        Err(e) => db_error(e),
    }
}

async fn delete_event(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.get_by_id(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return fail(StatusCode::NOT_FOUND, format!("Event not found: {}", id)),
        Err(e) => return db_error(e),
    }

    match state.store.delete_by_id(id).await {
        Ok(()) => ok(serde_json::json!({ "deletedId": id }), "Event deleted"),
        Err(e) => db_error(e),
    }
}

async fn upload_images(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    mut multipart: Multipart,
) -> Response {
    match state.store.get_by_id(event_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return fail(
                StatusCode::NOT_FOUND,
                format!("Event not found: {}", event_id),
            )
        }
        Err(e) => return db_error(e),
    }

    // Collect the files first so validation failures upload nothing
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return fail(StatusCode::BAD_REQUEST, format!("Invalid multipart: {}", e)),
        };
        if field.name() != Some("images") {
            continue;
        }
        let name = field.file_name().unwrap_or("unknown").to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return fail(StatusCode::BAD_REQUEST, format!("Invalid file: {}", e)),
        };

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if !ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return fail(
                StatusCode::BAD_REQUEST,
                format!(
                    "Invalid file type: {}. Allowed types: {}",
                    name,
                    ALLOWED_IMAGE_EXTENSIONS.join(", ")
                ),
            );
        }
        if data.len() as u64 > MAX_IMAGE_BYTES {
            return fail(
                StatusCode::BAD_REQUEST,
                format!(
                    "File too large: {}. Maximum size is {}MB",
                    name,
                    MAX_IMAGE_BYTES / (1024 * 1024)
                ),
            );
        }
        files.push((name, data.to_vec()));
    }

    if files.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "No files selected");
    }

    let current = match state.store.count_images(event_id).await {
        Ok(count) => count as usize,
        Err(e) => return db_error(e),
    };
    if current + files.len() > MAX_IMAGES_PER_EVENT {
        return fail(
            StatusCode::BAD_REQUEST,
            format!(
                "Cannot upload {} images. Event already has {} images. Maximum allowed is {}.",
                files.len(),
                current,
                MAX_IMAGES_PER_EVENT
            ),
        );
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for (original_name, data) in files {
        let extension = original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        let stored_name = format!("{}.{}", uuid::Uuid::new_v4().simple(), extension);
        let disk_path = state.uploads_dir.join(&stored_name);

        if let Err(e) = tokio::fs::write(&disk_path, &data).await {
            tracing::error!("Failed to store upload {}: {}", disk_path.display(), e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload");
        }

        let image = EventImage {
            id: 0,
            event_id,
            original_name,
            filename: stored_name.clone(),
            file_path: format!("uploads/{}", stored_name),
            file_size: data.len() as i64,
            uploaded_at: now_timestamp(),
            url: format!("/uploads/{}", stored_name),
        };
        match state.store.add_image(&image).await {
            Ok(stored) => uploaded.push(stored),
            Err(e) => return db_error(e),
        }
    }

    let total = match state.store.count_images(event_id).await {
        Ok(count) => count,
        Err(e) => return db_error(e),
    };

    let count = uploaded.len();
    created(
        ImageUploadData {
            event_id,
            uploaded_images: uploaded
                .iter()
                .map(todoevent::api::types::EventImagePayload::from)
                .collect(),
            total_images: total,
        },
        format!("Uploaded {} image(s)", count),
    )
}

// ============================================================================
// Seeding and main
// ============================================================================

/// Seeds the type table on first start so events can be created
/// immediately against a fresh database.
async fn seed_event_types(types: &EventTypeStore) -> Result<(), sqlx::Error> {
    if !types.list().await?.is_empty() {
        return Ok(());
    }

    let initial = [
        EventType::new(1, "Meeting", "Recurring and one-off meetings"),
        EventType::new(2, "Workshop", "Hands-on sessions"),
        EventType::new(3, "Seminar", "Talks and presentations"),
        EventType::new(4, "Conference", "Multi-day gatherings"),
    ];
    types.upsert_many(&initial).await?;
    tracing::info!("Seeded {} event types", initial.len());
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todoevent_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let uploads_dir = config.data_dir.join("uploads");
    if let Err(e) = std::fs::create_dir_all(&uploads_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data directory: {}", config.data_dir.display());

    let pool = match init_db(&config.data_dir.join("server.db")).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let store = EventStore::new(pool.clone());
    let types = EventTypeStore::new(pool);
    if let Err(e) = seed_event_types(&types).await {
        tracing::error!("Failed to seed event types: {}", e);
        std::process::exit(1);
    }

    let state = AppState {
        store,
        types,
        uploads_dir: uploads_dir.clone(),
    };

    let app = Router::new()
        .route("/", get(home))
        .route("/event-types", get(list_event_types))
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/{id}/images", post(upload_images))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .with_state(state)
        .layer(DefaultBodyLimit::max(
            (MAX_IMAGES_PER_EVENT + 1) * MAX_IMAGE_BYTES as usize,
        ))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
