use crate::AppState;
use crate::api::models::blobs::{BlobNameQuery, ImageResponse};
use crate::errors::{Error, Result};
use crate::media;
use crate::upload::{self, UploadEntry, UploadOutcome};
use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// Accept a multipart batch of image files and store each under a fresh
/// blob name.
///
/// Replies 200 when a thumbnail container is configured to pick the images
/// up, 202 when storage succeeded but no thumbnail pipeline is configured,
/// 415 for non-image content, and 400 for anything else.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<StatusCode> {
    let mut entries = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("failed to parse multipart data: {e}"),
    })? {
        // Only file parts join the batch; plain form fields are ignored.
        let Some(filename) = field.file_name().map(|name| name.to_string()) else {
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_string();
        let content = field.bytes().await.map_err(|e| Error::BadRequest {
            message: format!("failed to read file {filename}: {e}"),
        })?;

        entries.push(UploadEntry {
            filename,
            content_type,
            content,
        });
    }

    match upload::evaluate(&entries, state.storage.as_ref(), &state.config.storage).await? {
        UploadOutcome::Complete => Ok(StatusCode::OK),
        UploadOutcome::AcceptedWithoutThumbnails => Ok(StatusCode::ACCEPTED),
    }
}

/// List every blob in the image container, with each blob's content
/// downloaded and inlined into the response.
pub async fn list_all(State(state): State<AppState>) -> Result<Json<Vec<ImageResponse>>> {
    let blobs = state.storage.list_blobs().await?;

    let mut images = Vec::with_capacity(blobs.len());
    for blob in blobs {
        let content = state.storage.download(&blob.name).await?;
        images.push(ImageResponse {
            name: blob.name,
            uri: blob.uri,
            bytes: content.to_vec(),
        });
    }

    Ok(Json(images))
}

/// Delete the named blob. Replies 400 when the blob does not exist.
pub async fn delete_blob(State(state): State<AppState>, Query(query): Query<BlobNameQuery>) -> Result<StatusCode> {
    let name = require_blob_name(query)?;

    if !state.storage.exists(&name).await? {
        return Err(Error::BadRequest {
            message: format!("blob {name} does not exist"),
        });
    }

    state.storage.delete(&name).await?;
    tracing::info!(blob_name = %name, "deleted blob");
    Ok(StatusCode::OK)
}

/// Stream the named blob back to the caller, with a content type guessed
/// from the blob-name extension.
pub async fn get_blob(State(state): State<AppState>, Query(query): Query<BlobNameQuery>) -> Result<Response> {
    let name = require_blob_name(query)?;

    if !state.storage.exists(&name).await? {
        return Err(Error::BadRequest {
            message: format!("blob {name} does not exist"),
        });
    }

    let content = state.storage.download(&name).await?;
    let content_type = media::content_type_for(&name);

    Ok(([(header::CONTENT_TYPE, content_type.to_string())], content).into_response())
}

fn require_blob_name(query: BlobNameQuery) -> Result<String> {
    query
        .blob_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::bad_request("missing blobName query parameter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config};
    use axum_test::multipart::{MultipartForm, Part};

    // Minimal valid JPEG header padded to 10 bytes
    const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn jpeg_form() -> MultipartForm {
        MultipartForm::new().add_part(
            "files",
            Part::bytes(JPEG_BYTES).file_name("photo.jpg").mime_type("image/jpeg"),
        )
    }

    #[test_log::test(tokio::test)]
    async fn upload_without_thumbnail_container_is_accepted() {
        let server = create_test_app(create_test_config());

        let response = server.post("/Blob/Upload").multipart(jpeg_form()).await;
        response.assert_status(StatusCode::ACCEPTED);
    }

    #[test_log::test(tokio::test)]
    async fn upload_with_thumbnail_container_is_ok() {
        let mut config = create_test_config();
        config.storage.thumbnail_container = "thumbnails".to_string();
        let server = create_test_app(config);

        let response = server.post("/Blob/Upload").multipart(jpeg_form()).await;
        response.assert_status(StatusCode::OK);
    }

    #[test_log::test(tokio::test)]
    async fn uploading_a_text_file_is_unsupported_media() {
        let server = create_test_app(create_test_config());

        let form = MultipartForm::new().add_part(
            "files",
            Part::bytes(b"just words".as_slice())
                .file_name("notes.txt")
                .mime_type("text/plain"),
        );
        let response = server.post("/Blob/Upload").multipart(form).await;
        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test_log::test(tokio::test)]
    async fn empty_upload_is_a_bad_request() {
        let server = create_test_app(create_test_config());

        let response = server.post("/Blob/Upload").multipart(MultipartForm::new()).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("no files received"));
    }

    #[test_log::test(tokio::test)]
    async fn upload_without_credentials_reports_configuration() {
        let mut config = create_test_config();
        config.storage.account_key = String::new();
        let server = create_test_app(config);

        let response = server.post("/Blob/Upload").multipart(jpeg_form()).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("not configured"));
    }

    #[test_log::test(tokio::test)]
    async fn list_all_inlines_blob_bytes() {
        let server = create_test_app(create_test_config());

        server.post("/Blob/Upload").multipart(jpeg_form()).await.assert_status(StatusCode::ACCEPTED);

        let response = server.post("/Blob/ListAll").await;
        response.assert_status(StatusCode::OK);

        let images: Vec<ImageResponse> = response.json();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].bytes, JPEG_BYTES);
        assert!(images[0].name.ends_with(".jpg"));
        assert!(images[0].uri.ends_with(&images[0].name));
    }

    #[test_log::test(tokio::test)]
    async fn list_all_is_empty_for_a_fresh_container() {
        let server = create_test_app(create_test_config());

        let response = server.post("/Blob/ListAll").await;
        response.assert_status(StatusCode::OK);
        let images: Vec<ImageResponse> = response.json();
        assert!(images.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn delete_requires_an_existing_blob() {
        let server = create_test_app(create_test_config());

        let missing = server.put("/Blob/DeleteFromAzure").add_query_param("blobName", "NOPE.png").await;
        missing.assert_status(StatusCode::BAD_REQUEST);

        let unnamed = server.put("/Blob/DeleteFromAzure").await;
        unnamed.assert_status(StatusCode::BAD_REQUEST);
        assert!(unnamed.text().contains("blobName"));
    }

    #[test_log::test(tokio::test)]
    async fn delete_removes_an_uploaded_blob() {
        let server = create_test_app(create_test_config());

        server.post("/Blob/Upload").multipart(jpeg_form()).await.assert_status(StatusCode::ACCEPTED);
        let images: Vec<ImageResponse> = server.post("/Blob/ListAll").await.json();
        let name = images[0].name.clone();

        let response = server.put("/Blob/DeleteFromAzure").add_query_param("blobName", &name).await;
        response.assert_status(StatusCode::OK);

        let images: Vec<ImageResponse> = server.post("/Blob/ListAll").await.json();
        assert!(images.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn get_blob_streams_content_with_a_guessed_type() {
        let server = create_test_app(create_test_config());

        server.post("/Blob/Upload").multipart(jpeg_form()).await.assert_status(StatusCode::ACCEPTED);
        let images: Vec<ImageResponse> = server.post("/Blob/ListAll").await.json();
        let name = images[0].name.clone();

        let response = server.post("/Blob/GetBlob").add_query_param("blobName", &name).await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.as_bytes().as_ref(), JPEG_BYTES);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
            "image/jpeg"
        );
    }

    #[test_log::test(tokio::test)]
    async fn get_blob_for_a_missing_name_is_a_bad_request() {
        let server = create_test_app(create_test_config());

        let response = server.post("/Blob/GetBlob").add_query_param("blobName", "MISSING.jpg").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
