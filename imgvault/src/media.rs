//! Image classification for uploaded files.
//!
//! A file counts as an image when any of three signals says so: the
//! declared content type, the filename extension, or the leading bytes of
//! the content itself. Browsers routinely send `application/octet-stream`
//! for drag-and-dropped files, so no single signal is trusted alone.

use mime_guess::mime;

/// Magic numbers for the image formats the service accepts.
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF87A_MAGIC: &[u8] = b"GIF87a";
const GIF89A_MAGIC: &[u8] = b"GIF89a";
const BMP_MAGIC: &[u8] = b"BM";

/// Classify an upload entry as image or not.
pub fn is_image(content_type: &str, filename: &str, content: &[u8]) -> bool {
    declares_image_type(content_type) || has_image_extension(filename) || has_image_signature(content)
}

fn declares_image_type(content_type: &str) -> bool {
    content_type
        .parse::<mime::Mime>()
        .is_ok_and(|m| m.type_() == mime::IMAGE)
}

fn has_image_extension(filename: &str) -> bool {
    mime_guess::from_path(filename)
        .first()
        .is_some_and(|m| m.type_() == mime::IMAGE)
}

fn has_image_signature(content: &[u8]) -> bool {
    content.starts_with(PNG_MAGIC)
        || content.starts_with(JPEG_MAGIC)
        || content.starts_with(GIF87A_MAGIC)
        || content.starts_with(GIF89A_MAGIC)
        || content.starts_with(BMP_MAGIC)
        // RIFF....WEBP
        || (content.len() >= 12 && content.starts_with(b"RIFF") && &content[8..12] == b"WEBP")
}

/// Content type for serving a stored blob, guessed from its name.
pub fn content_type_for(blob_name: &str) -> mime::Mime {
    mime_guess::from_path(blob_name).first_or_octet_stream()
}
