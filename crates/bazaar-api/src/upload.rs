use axum::{
    Json,
    extract::{FromRequest, Multipart, Request, State},
    http::header,
};
use bytes::Bytes;
use tracing::{error, info, warn};
use uuid::Uuid;

use bazaar_types::api::UploadResponse;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::storage::BlobStore;

/// An image part that passed filtering and is waiting to be stored.
struct PendingImage {
    file_name: String,
    content_type: String,
    data: Bytes,
}

/// POST /upload: stores every `image/*` part of a multipart form and returns
/// the public URLs.
///
/// The batch is all-or-nothing: every part is read before anything is
/// written, and if one write fails the objects already written by this
/// request are removed again.
pub async fn upload_images(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("multipart/form-data"));
    if !is_multipart {
        return Err(ApiError::UnsupportedMediaType(
            "Invalid Content-Type. Expected multipart/form-data.".into(),
        ));
    }

    let mut multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let mut pending = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))?
    {
        let Some(file_name) = field.file_name().filter(|n| !n.trim().is_empty()).map(str::to_string)
        else {
            warn!(field = ?field.name(), "Skipping part without a file name");
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            warn!(file = %file_name, content_type = %content_type, "Skipping non-image file");
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
        pending.push(PendingImage {
            file_name,
            content_type,
            data,
        });
    }

    if pending.is_empty() {
        return Err(ApiError::invalid("No valid image files received."));
    }

    let stored = store_all(&state.blobs, pending, |image| {
        object_name(&image.file_name, &image.content_type)
    })
    .await?;
    let urls = stored.iter().map(|object| state.blobs.public_url(object)).collect();

    Ok(Json(UploadResponse { urls }))
}

/// Writes every image under the name `name_for` picks, in order. If one
/// write fails, the objects already written are discarded before the error
/// is returned.
async fn store_all(
    blobs: &BlobStore,
    images: Vec<PendingImage>,
    mut name_for: impl FnMut(&PendingImage) -> String,
) -> Result<Vec<String>, ApiError> {
    let mut stored: Vec<String> = Vec::with_capacity(images.len());
    for image in &images {
        let object = name_for(image);
        if let Err(e) = blobs.put_new(&object, &image.data[..]).await {
            error!(file = %image.file_name, object = %object, "Upload failed: {:#}", e);
            blobs.discard(&stored).await;
            return Err(ApiError::Storage(format!("Failed to upload {}.", image.file_name)));
        }
        info!(file = %image.file_name, object = %object, size = image.data.len(), "Stored image");
        stored.push(object);
    }
    Ok(stored)
}

/// Fresh object name: a random UUID plus an extension from the original file
/// name, or from the image subtype when the name has none.
fn object_name(file_name: &str, content_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| is_clean_extension(ext));
    let from_type = content_type
        .strip_prefix("image/")
        .map(|sub| sub.split(['+', ';']).next().unwrap_or_default().trim())
        .filter(|ext| is_clean_extension(ext));

    match from_name.or(from_type) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_ascii_lowercase()),
        None => Uuid::new_v4().to_string(),
    }
}

fn is_clean_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_extension_from_file_name() {
        let name = object_name("Holiday Photo.JPG", "image/jpeg");
        assert!(name.ends_with(".jpg"));
        let (stem, _) = name.rsplit_once('.').unwrap();
        assert!(stem.parse::<Uuid>().is_ok());
    }

    #[test]
    fn falls_back_to_content_subtype() {
        assert!(object_name("scan", "image/png").ends_with(".png"));
        assert!(object_name("logo", "image/svg+xml").ends_with(".svg"));
    }

    #[test]
    fn drops_suspicious_extensions() {
        let name = object_name("evil.png/../x", "image/");
        assert!(name.parse::<Uuid>().is_ok());
    }

    #[test]
    fn names_are_unique() {
        assert_ne!(object_name("a.png", "image/png"), object_name("a.png", "image/png"));
    }

    fn image(file_name: &str) -> PendingImage {
        PendingImage {
            file_name: file_name.into(),
            content_type: "image/png".into(),
            data: Bytes::from_static(b"\x89PNG"),
        }
    }

    async fn bucket() -> (tempfile::TempDir, BlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStore::new(dir.path().join("bucket"), "http://cdn.test").await.unwrap();
        (dir, blobs)
    }

    fn objects_in(blobs: &BlobStore) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(blobs.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn stores_every_image_in_order() {
        let (_dir, blobs) = bucket().await;
        let stored = store_all(&blobs, vec![image("front.png"), image("back.png")], |image| {
            format!("copy-of-{}", image.file_name)
        })
        .await
        .unwrap();
        assert_eq!(stored, ["copy-of-front.png", "copy-of-back.png"]);
        assert_eq!(objects_in(&blobs), ["copy-of-back.png", "copy-of-front.png"]);
    }

    #[tokio::test]
    async fn later_failure_discards_earlier_objects() {
        let (_dir, blobs) = bucket().await;
        // Every part maps to one name, so the second write collides after the
        // first has landed.
        let images = vec![image("front.png"), image("back.png"), image("side.png")];
        let err = store_all(&blobs, images, |_| "listing.png".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Storage(_)));
        assert_eq!(err.to_string(), "Failed to upload back.png.");
        assert!(objects_in(&blobs).is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_objects_from_other_requests() {
        let (_dir, blobs) = bucket().await;
        blobs.put_new("taken.png", &b"earlier upload"[..]).await.unwrap();

        let mut names = ["fresh.png", "taken.png"].into_iter();
        let err = store_all(&blobs, vec![image("a.png"), image("b.png")], |_| {
            names.next().unwrap().to_string()
        })
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Failed to upload b.png.");
        assert_eq!(objects_in(&blobs), ["taken.png"]);
        assert_eq!(std::fs::read(blobs.object_path("taken.png")).unwrap(), b"earlier upload");
    }
}
