//! Azure Blob Storage backend.
//!
//! Talks to the Azure Blob REST API directly over `reqwest` using Shared
//! Key authorization. Credentials come from the storage configuration:
//! explicit `account_name`/`account_key` fields take precedence, otherwise
//! the `connection_string` is parsed for `AccountName=`/`AccountKey=`
//! segments. A `blob_endpoint` override points the backend at Azurite or
//! any other emulator.

use crate::config::StorageConfig;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use sha2::Sha256;
use tracing::info;

use super::{BlobEntry, BlobStorage, Result, StorageError};

/// Blob service REST API version sent with every request.
const AZURE_API_VERSION: &str = "2023-11-03";

/// Percent-encoding set for blob names in URLs. Azure expects `/` left
/// unencoded inside blob paths.
const BLOB_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha256 = Hmac<Sha256>;

/// Backend that forwards blob operations to one Azure Blob Storage
/// container.
pub struct AzureBlobStorage {
    client: reqwest::Client,
    account: String,
    container: String,
    key_bytes: Vec<u8>,
    base_url: String,
}

impl AzureBlobStorage {
    /// Build a backend from the storage configuration.
    ///
    /// Fails when no account name/key can be resolved from either the
    /// explicit fields or the connection string, or when the key is not
    /// valid base64.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let parsed = parse_connection_string(&config.connection_string);

        let account = if config.account_name.is_empty() {
            parsed.account_name.clone().unwrap_or_default()
        } else {
            config.account_name.clone()
        };
        let key = if config.account_key.is_empty() {
            parsed.account_key.clone().unwrap_or_default()
        } else {
            config.account_key.clone()
        };

        if account.is_empty() || key.is_empty() {
            return Err(StorageError::backend(
                "azure storage account name and key are not configured; set storage.account_name \
                 and storage.account_key or provide a connection string",
            ));
        }

        let key_bytes = BASE64_STANDARD
            .decode(&key)
            .map_err(|e| StorageError::backend(format!("invalid azure account key (not valid base64): {e}")))?;

        let base_url = match &config.blob_endpoint {
            Some(endpoint) => endpoint.as_str().trim_end_matches('/').to_string(),
            None => match parsed.blob_endpoint {
                Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
                None => format!("https://{account}.blob.core.windows.net"),
            },
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| StorageError::backend(format!("failed to create HTTP client: {e}")))?;

        info!(account = %account, container = %config.image_container, endpoint = %base_url, "azure blob storage backend initialized");

        Ok(Self {
            client,
            account,
            container: config.image_container.clone(),
            key_bytes,
            base_url,
        })
    }

    /// Public URI of a blob, also used as the request URL.
    fn blob_url(&self, name: &str) -> String {
        let encoded = percent_encoding::utf8_percent_encode(name, BLOB_ENCODE_SET);
        format!("{}/{}/{}", self.base_url, self.container, encoded)
    }

    /// Current UTC time in the RFC 1123 form Azure expects in `x-ms-date`.
    fn rfc1123_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Shared Key authorization header for a blob-level request.
    ///
    /// String-to-sign layout (Blob service):
    ///
    /// ```text
    /// VERB\n
    /// Content-Encoding\nContent-Language\nContent-Length\nContent-MD5\nContent-Type\n
    /// Date\nIf-Modified-Since\nIf-Match\nIf-None-Match\nIf-Unmodified-Since\nRange\n
    /// CanonicalizedHeaders\nCanonicalizedResource
    /// ```
    fn sign_request(
        &self,
        method: &str,
        blob_name: &str,
        content_length: Option<usize>,
        content_type: &str,
        date: &str,
        extra_ms_headers: &[(&str, &str)],
        query_params: &[(&str, &str)],
    ) -> Result<String> {
        // Content-Length signs as empty for zero or absent bodies.
        let content_length = match content_length {
            Some(0) | None => String::new(),
            Some(len) => len.to_string(),
        };

        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), date.to_string()),
            ("x-ms-version".to_string(), AZURE_API_VERSION.to_string()),
        ];
        for (k, v) in extra_ms_headers {
            ms_headers.push((k.to_lowercase(), (*v).to_string()));
        }
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
        let canonicalized_headers = ms_headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("\n");

        // The canonicalized resource uses the un-encoded blob name, plus
        // query parameters sorted by key.
        let mut canonicalized_resource = if blob_name.is_empty() {
            format!("/{}/{}", self.account, self.container)
        } else {
            format!("/{}/{}/{}", self.account, self.container, blob_name)
        };
        let mut sorted_params = query_params.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(b.0));
        for (k, v) in &sorted_params {
            canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }

        let string_to_sign = format!(
            "{method}\n\n\n{content_length}\n\n{content_type}\n\n\n\n\n\n\n{canonicalized_headers}\n{canonicalized_resource}"
        );

        let mut mac = HmacSha256::new_from_slice(&self.key_bytes)
            .map_err(|e| StorageError::backend(format!("HMAC key error: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    fn http_error(context: &str, status: StatusCode, body: &str) -> StorageError {
        StorageError::backend(format!("azure {context}: HTTP {status} - {body}"))
    }
}

#[async_trait::async_trait]
impl BlobStorage for AzureBlobStorage {
    async fn exists(&self, name: &str) -> Result<bool> {
        let date = Self::rfc1123_date();
        let auth = self.sign_request("HEAD", name, None, "", &date, &[], &[])?;

        let resp = self
            .client
            .head(self.blob_url(name))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| StorageError::backend(format!("azure existence check failed: {e}")))?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Self::http_error("exists", status, "")),
        }
    }

    async fn upload(&self, name: &str, content: Bytes) -> Result<()> {
        let date = Self::rfc1123_date();
        let content_type = "application/octet-stream";
        let auth = self.sign_request(
            "PUT",
            name,
            Some(content.len()),
            content_type,
            &date,
            &[("x-ms-blob-type", "BlockBlob")],
            &[],
        )?;

        let resp = self
            .client
            .put(self.blob_url(name))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type)
            .header("Authorization", auth)
            .body(content)
            .send()
            .await
            .map_err(|e| StorageError::backend(format!("azure upload request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::http_error("upload", status, &body));
        }
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        let date = Self::rfc1123_date();
        let auth = self.sign_request("GET", name, None, "", &date, &[], &[])?;

        let resp = self
            .client
            .get(self.blob_url(name))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| StorageError::backend(format!("azure download request failed: {e}")))?;

        match resp.status() {
            status if status.is_success() => resp
                .bytes()
                .await
                .map_err(|e| StorageError::backend(format!("azure download body read failed: {e}"))),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound { name: name.to_string() }),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Self::http_error("download", status, &body))
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let date = Self::rfc1123_date();
        let auth = self.sign_request("DELETE", name, None, "", &date, &[], &[])?;

        let resp = self
            .client
            .delete(self.blob_url(name))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| StorageError::backend(format!("azure delete request failed: {e}")))?;

        // Deleting an absent blob is fine.
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::http_error("delete", status, &body));
        }
        Ok(())
    }

    async fn list_blobs(&self) -> Result<Vec<BlobEntry>> {
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!("{}/{}?restype=container&comp=list", self.base_url, self.container);
            let mut query_params: Vec<(&str, &str)> = vec![("comp", "list"), ("restype", "container")];
            if let Some(m) = marker.as_deref() {
                url.push_str(&format!("&marker={}", percent_encoding::utf8_percent_encode(m, BLOB_ENCODE_SET)));
                query_params.push(("marker", m));
            }

            let date = Self::rfc1123_date();
            // Container-level operation: the blob name is empty.
            let auth = self.sign_request("GET", "", None, "", &date, &[], &query_params)?;

            let resp = self
                .client
                .get(&url)
                .header("x-ms-date", &date)
                .header("x-ms-version", AZURE_API_VERSION)
                .header("Authorization", auth)
                .send()
                .await
                .map_err(|e| StorageError::backend(format!("azure list request failed: {e}")))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(Self::http_error("list", status, &body));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| StorageError::backend(format!("azure list body read failed: {e}")))?;

            for name in scan_blob_names(&body) {
                let uri = self.blob_url(&name);
                entries.push(BlobEntry { name, uri });
            }

            match scan_next_marker(&body) {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        Ok(entries)
    }
}

/// Fields recognized in an Azure storage connection string.
#[derive(Debug, Default, PartialEq, Eq)]
struct ConnectionString {
    account_name: Option<String>,
    account_key: Option<String>,
    blob_endpoint: Option<String>,
}

/// Split a `Key=Value;Key=Value` connection string into the fields the
/// backend cares about. Unknown segments are ignored.
fn parse_connection_string(raw: &str) -> ConnectionString {
    let mut parsed = ConnectionString::default();
    for segment in raw.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        // split_once keeps '=' padding inside base64 AccountKey values intact
        match key.trim() {
            "AccountName" => parsed.account_name = Some(value.to_string()),
            "AccountKey" => parsed.account_key = Some(value.to_string()),
            "BlobEndpoint" => parsed.blob_endpoint = Some(value.to_string()),
            _ => {}
        }
    }
    parsed
}

/// Pull every `<Blob><Name>...</Name></Blob>` out of a List Blobs response.
///
/// The enumeration XML is flat and machine-generated; plain scanning keeps
/// an XML parser off the dependency tree.
fn scan_blob_names(body: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut search_from = 0;
    while let Some(blob_start) = body[search_from..].find("<Blob>") {
        let blob_start = search_from + blob_start;
        let Some(blob_len) = body[blob_start..].find("</Blob>") else {
            break;
        };
        let blob_xml = &body[blob_start..blob_start + blob_len];
        if let Some(name_start) = blob_xml.find("<Name>") {
            let name_start = name_start + "<Name>".len();
            if let Some(name_len) = blob_xml[name_start..].find("</Name>") {
                names.push(blob_xml[name_start..name_start + name_len].to_string());
            }
        }
        search_from = blob_start + blob_len;
    }
    names
}

/// Extract a non-empty `<NextMarker>` from a List Blobs response page.
fn scan_next_marker(body: &str) -> Option<String> {
    let start = body.find("<NextMarker>")? + "<NextMarker>".len();
    let len = body[start..].find("</NextMarker>")?;
    let marker = &body[start..start + len];
    (!marker.is_empty()).then(|| marker.to_string())
}
