//! Upload policy: batch validation, image gating, and outcome selection.
//!
//! One call evaluates a whole multipart batch. Configuration problems and
//! non-image content reject the batch before anything is stored; accepted
//! entries are forwarded one by one under fresh collision-resistant blob
//! names. The outcome distinguishes a fully processed upload from one that
//! still awaits thumbnail generation.

use std::path::Path;

use bytes::Bytes;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::errors::{Error, Result};
use crate::media;
use crate::storage::BlobStorage;

/// One file from the multipart body.
#[derive(Debug, Clone)]
pub struct UploadEntry {
    /// Filename as declared by the client
    pub filename: String,
    /// Content type as declared by the client
    pub content_type: String,
    pub content: Bytes,
}

/// How a successfully evaluated batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Blobs stored and the thumbnail pipeline is configured to pick them up
    Complete,
    /// Blobs stored, but no thumbnail container is configured
    AcceptedWithoutThumbnails,
}

/// Evaluate an upload batch against the storage configuration and forward
/// acceptable entries to the storage collaborator.
///
/// Checks run in order, first failure wins: non-empty batch, account
/// credentials present, image container configured. Every entry must
/// classify as an image before any entry is uploaded, so a rejected batch
/// stores nothing. Zero-length entries are skipped without error; if the
/// batch ends with nothing stored it is rejected outright.
///
/// Entries already forwarded are not deleted when a later storage call
/// fails; the error surfaces to the caller with partial state in place.
pub async fn evaluate(
    entries: &[UploadEntry],
    storage: &dyn BlobStorage,
    config: &StorageConfig,
) -> Result<UploadOutcome> {
    if entries.is_empty() {
        return Err(Error::EmptyBatch);
    }
    if !config.has_credentials() {
        return Err(Error::MissingCredentials);
    }
    if config.image_container.is_empty() {
        return Err(Error::MissingContainer);
    }

    for entry in entries {
        if !media::is_image(&entry.content_type, &entry.filename, &entry.content) {
            return Err(Error::UnsupportedMedia {
                filename: entry.filename.clone(),
            });
        }
    }

    let mut stored = 0usize;
    for entry in entries {
        if entry.content.is_empty() {
            tracing::debug!(filename = %entry.filename, "skipping zero-length upload entry");
            continue;
        }

        let blob_name = blob_name_for(&entry.filename);
        storage.upload(&blob_name, entry.content.clone()).await?;
        tracing::info!(
            filename = %entry.filename,
            blob_name = %blob_name,
            bytes = entry.content.len(),
            "stored uploaded image"
        );
        stored += 1;
    }

    if stored == 0 {
        return Err(Error::Rejected);
    }

    if config.thumbnails_enabled() {
        Ok(UploadOutcome::Complete)
    } else {
        Ok(UploadOutcome::AcceptedWithoutThumbnails)
    }
}

/// Fresh blob name: a random 128-bit token as 32 uppercase hex characters,
/// keeping the original file extension so serving can infer a content type.
fn blob_name_for(filename: &str) -> String {
    let token = Uuid::new_v4().simple().to_string().to_uppercase();
    match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    }
}
