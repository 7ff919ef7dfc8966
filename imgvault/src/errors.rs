use crate::storage::StorageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload call arrived with no files in the multipart body
    #[error("no files received from the upload")]
    EmptyBatch,

    /// Storage account name or key is not configured
    #[error("storage account name and key are not configured")]
    MissingCredentials,

    /// No primary image container name is configured
    #[error("no image container is configured for the storage account")]
    MissingContainer,

    /// A file in the batch is not an image
    #[error("{filename} is not an image")]
    UnsupportedMedia { filename: String },

    /// The batch produced no stored blobs
    #[error("upload failed")]
    Rejected,

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Storage collaborator error, carrying the backend's message
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::UnsupportedMedia { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            // Every other failure, storage errors included, surfaces as a
            // 400 with a message.
            Error::EmptyBatch
            | Error::MissingCredentials
            | Error::MissingContainer
            | Error::Rejected
            | Error::BadRequest { .. }
            | Error::Storage(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message returned to the caller.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full details before the response is shaped for the caller
        match &self {
            Error::Storage(StorageError::Backend { .. }) => {
                tracing::error!("Storage backend error: {:#}", self);
            }
            Error::Storage(StorageError::NotFound { .. }) => {
                tracing::debug!("Blob not found: {}", self);
            }
            Error::MissingCredentials | Error::MissingContainer => {
                tracing::warn!("Storage configuration error: {}", self);
            }
            Error::EmptyBatch | Error::UnsupportedMedia { .. } | Error::Rejected | Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_image_content_maps_to_415() {
        let err = Error::UnsupportedMedia {
            filename: "notes.txt".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(err.user_message().contains("notes.txt"));
    }

    #[test]
    fn validation_and_storage_errors_map_to_400() {
        for err in [
            Error::EmptyBatch,
            Error::MissingCredentials,
            Error::MissingContainer,
            Error::Rejected,
            Error::bad_request("missing blobName query parameter"),
            Error::Storage(StorageError::backend("connection refused")),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn storage_errors_carry_the_backend_message() {
        let err = Error::Storage(StorageError::backend("azure upload: HTTP 403 - key mismatch"));
        assert_eq!(err.user_message(), "azure upload: HTTP 403 - key mismatch");
    }
}
