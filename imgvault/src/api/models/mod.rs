//! API request and response data models.
//!
//! - [`blobs`]: stored-image responses and blob-name query parameters

pub mod blobs;
