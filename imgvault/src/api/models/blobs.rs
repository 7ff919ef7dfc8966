use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

/// A stored image with its content inlined, one element of the ListAll
/// response array.
#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    /// Blob name inside the image container
    pub name: String,
    /// Access URI of the blob
    pub uri: String,
    /// Raw image content, base64-encoded in JSON
    #[serde_as(as = "Base64")]
    pub bytes: Vec<u8>,
}

/// Query parameters naming a single blob (`?blobName=...`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobNameQuery {
    pub blob_name: Option<String>,
}
