use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lifecycle::{FailureKind, ObjectId, StorageClass, StoreError};
use serde::{Deserialize, Serialize};

use crate::GatewayState;

/// Multipart field the upload form posts the file under.
pub const FILE_FIELD: &str = "File";

const UPLOADED: &str = "File Uploaded Successfully";
const NO_FILE: &str = "File Not Found";

/// One row of the object listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub tier: StorageClass,
    pub size: Option<u64>,
    pub url: Option<String>,
}

/// Qualify an uploaded file name with a `MMddyyyyHHmmss` timestamp between
/// its stem and extension, so repeated uploads of the same file never
/// overwrite each other: `report.pdf` becomes `report03052024140709.pdf`.
pub fn timestamped_name(original: &str, now: DateTime<Utc>) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let path = std::path::Path::new(base);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(base);
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!("{stem}{}{extension}", now.format("%m%d%Y%H%M%S"))
}

fn store_error_response(error: &StoreError) -> Response {
    let status = match error.kind() {
        FailureKind::ObjectNotFound => StatusCode::NOT_FOUND,
        FailureKind::PermissionDenied => StatusCode::FORBIDDEN,
        FailureKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, error.to_string()).into_response()
}

/// Pull the uploaded file out of the form: the `File` field when present,
/// otherwise the first field that carries a file name.
async fn read_file_field(
    multipart: &mut Multipart,
) -> Result<Option<(String, Bytes)>, axum::extract::multipart::MultipartError> {
    let mut fallback = None;

    while let Some(field) = multipart.next_field().await? {
        let is_file_field = field.name() == Some(FILE_FIELD);
        let file_name = field.file_name().map(str::to_string);

        if is_file_field {
            let data = field.bytes().await?;
            let name = file_name.unwrap_or_else(|| "upload".to_string());
            return Ok(Some((name, data)));
        }

        if fallback.is_none() {
            if let Some(name) = file_name {
                fallback = Some((name, field.bytes().await?));
            }
        }
    }

    Ok(fallback)
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// POST /upload
///
/// Store the posted file under a timestamp-qualified name.
#[tracing::instrument(skip_all)]
pub async fn upload(State(state): State<GatewayState>, mut multipart: Multipart) -> Response {
    let (original, data) = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            tracing::debug!("Upload request carried no file");
            return (StatusCode::BAD_REQUEST, NO_FILE).into_response();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed upload request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let id = ObjectId::new(state.container.as_str(), timestamped_name(&original, Utc::now()));
    let size = data.len();

    match state.store.upload(&id, data).await {
        Ok(()) => {
            tracing::info!(object = %id, original = %original, size, "Stored upload");
            (StatusCode::OK, UPLOADED).into_response()
        }
        Err(e) => {
            tracing::error!(object = %id, error = %e, "Upload failed");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// GET /objects
///
/// List the container newest first.
#[tracing::instrument(skip_all)]
pub async fn list_objects(State(state): State<GatewayState>) -> Response {
    let objects = match state.store.list(&state.container).await {
        Ok(objects) => objects,
        Err(e) => {
            tracing::error!(container = %state.container, error = %e, "Listing failed");
            return store_error_response(&e);
        }
    };

    let mut entries: Vec<ObjectEntry> = objects
        .into_iter()
        .map(|object| ObjectEntry {
            url: state.object_url(&object.id.name),
            name: object.id.name,
            last_modified: object.last_modified,
            tier: object.class,
            size: object.size,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.name.cmp(&b.name))
    });

    Json(entries).into_response()
}

/// GET /objects/{name}
#[tracing::instrument(skip_all)]
pub async fn download(State(state): State<GatewayState>, Path(name): Path<String>) -> Response {
    let id = ObjectId::new(state.container.as_str(), name);
    match state.store.download(&id).await {
        Ok(data) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", id.name),
                ),
            ],
            data,
        )
            .into_response(),
        Err(e) => {
            if e.kind() != FailureKind::ObjectNotFound {
                tracing::error!(object = %id, error = %e, "Download failed");
            }
            store_error_response(&e)
        }
    }
}
