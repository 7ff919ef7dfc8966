//! HTTP request handlers.
//!
//! - [`blobs`]: image upload, container listing, single-blob fetch and delete
//!
//! Handlers return [`crate::errors::Error`], which converts to the
//! appropriate HTTP status code and message.

pub mod blobs;
