use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::types::{Message, MessagePayload, MessageStatus};

/// Size cap for general file attachments.
pub const MAX_FILE_SIZE_BYTES: u64 = 20 * 1024 * 1024;
/// Tighter size cap applied to images.
pub const MAX_IMAGE_SIZE_BYTES: u64 = 2 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "3gp"];
const BLOCKED_EXTENSIONS: &[&str] = &["exe", "bat", "cmd", "apk"];

/// A file picked for upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentSource {
    /// Local URI of the picked file.
    pub uri: String,
    /// File name, extension included.
    pub name: String,
    /// MIME type as reported by the picker.
    pub mime_type: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Why an attachment was rejected before any message was created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("file type '{0}' is not supported")]
    UnsupportedType(String),
    #[error("attachment size is required and cannot be zero")]
    EmptySize,
    #[error("attachment of {size_bytes} bytes exceeds the {limit_bytes} byte limit")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },
}

/// Lowercased extension of a file name, when it has one.
pub fn file_extension(name: &str) -> Option<String> {
    let (_, extension) = name.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

pub fn is_image_file(name: &str) -> bool {
    file_extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_video_file(name: &str) -> bool {
    file_extension(name).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Gate a picked file before the optimistic message is created: blocked
/// extensions and zero sizes are rejected outright, images get the tighter
/// cap, everything else the general one.
pub fn validate(source: &AttachmentSource) -> Result<(), AttachmentError> {
    if let Some(extension) = file_extension(&source.name)
        && BLOCKED_EXTENSIONS.contains(&extension.as_str())
    {
        return Err(AttachmentError::UnsupportedType(extension));
    }
    if source.size_bytes == 0 {
        return Err(AttachmentError::EmptySize);
    }
    let limit_bytes = if is_image_file(&source.name) {
        MAX_IMAGE_SIZE_BYTES
    } else {
        MAX_FILE_SIZE_BYTES
    };
    if source.size_bytes > limit_bytes {
        return Err(AttachmentError::TooLarge {
            size_bytes: source.size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// Build the optimistic record shown while the upload is in flight.
pub fn pending_upload_message(
    room_id: u64,
    sender: impl Into<String>,
    local_id: impl Into<String>,
    timestamp_ms: u64,
    source: &AttachmentSource,
) -> Message {
    let extension = file_extension(&source.name).unwrap_or_default();
    Message {
        local_id: Some(local_id.into()),
        server_id: None,
        room_id,
        sender: sender.into(),
        timestamp_ms,
        status: MessageStatus::Sending,
        payload: MessagePayload::PendingUpload {
            body: format!("File attachment {extension}"),
            file_uri: source.uri.clone(),
        },
    }
}

/// Payload for the final custom message once the upload produced a URL.
/// Images and videos are discriminated as `image`; everything else carries
/// its MIME type.
pub fn uploaded_payload(source: &AttachmentSource, url: &str) -> MessagePayload {
    let kind = if is_image_file(&source.name) || is_video_file(&source.name) {
        "image".to_owned()
    } else {
        source.mime_type.clone()
    };
    let extension = file_extension(&source.name).unwrap_or_default();
    MessagePayload::Custom {
        body: format!("File attachment {extension}"),
        kind,
        content: json!({
            "url": url,
            "file_name": source.name,
            "caption": "",
        }),
    }
}
