use std::path::Path;

use chrono::Utc;

use crate::common::{ChatMessage, ContentKind, Identity, NewMessageRow};
use crate::error::{ChatError, ChatResult};
use crate::network::Backend;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Media kind by MIME prefix.
pub fn classify(mime_type: &str) -> ContentKind {
    if mime_type.starts_with("image/") {
        ContentKind::Image
    } else if mime_type.starts_with("video/") {
        ContentKind::Video
    } else if mime_type.starts_with("audio/") {
        ContentKind::Audio
    } else {
        ContentKind::File
    }
}

/// MIME type from the file extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        Some("heic") => "image/heic",
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg" | "oga") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => FALLBACK_MIME,
    }
}

/// Storage key: per-identity folder, original name plus upload time so two
/// uploads of the same file never collide.
pub fn object_path(me: Identity, file_name: &str, uploaded_at_ms: i64) -> String {
    format!("{me}/{file_name}_{uploaded_at_ms}")
}

/// A local file read into memory, ready to upload.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn read(path: &Path) -> ChatResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ChatError::UploadFailed(format!("{} is not a file", path.display())))?
            .to_string();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ChatError::UploadFailed(format!("cannot read {}: {err}", path.display())))?;

        Ok(Self {
            file_name,
            mime_type: guess_mime(path),
            bytes,
        })
    }

    pub fn kind(&self) -> ContentKind {
        classify(self.mime_type)
    }
}

/// Stores the bytes, then records a message pointing at them. Nothing is
/// inserted when the store rejects the object.
pub async fn upload(backend: &Backend, me: Identity, attachment: Attachment) -> ChatResult<ChatMessage> {
    let kind = attachment.kind();
    let path = object_path(me, &attachment.file_name, Utc::now().timestamp_millis());
    let size = attachment.bytes.len();

    backend
        .objects
        .put(&path, attachment.bytes, attachment.mime_type)
        .await?;
    let url = backend.objects.public_url(&path)?;
    log::info!("Stored {size} bytes at {path}");

    let row = NewMessageRow::attachment(me, kind, url, attachment.file_name);
    let stored = backend
        .messages
        .insert(row)
        .await
        .map_err(|err| ChatError::UploadFailed(err.to_string()))?;

    ChatMessage::try_from(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_prefix() {
        assert_eq!(classify("image/png"), ContentKind::Image);
        assert_eq!(classify("video/mp4"), ContentKind::Video);
        assert_eq!(classify("audio/ogg"), ContentKind::Audio);
        assert_eq!(classify("application/pdf"), ContentKind::File);
        assert_eq!(classify(""), ContentKind::File);
        assert_eq!(classify("imagery/png"), ContentKind::File);
    }

    #[test]
    fn guess_mime_uses_extension() {
        assert_eq!(guess_mime(Path::new("/tmp/Cat.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(guess_mime(Path::new("voice.m4a")), "audio/mp4");
        assert_eq!(guess_mime(Path::new("notes")), FALLBACK_MIME);
    }

    #[test]
    fn object_path_is_keyed_by_identity_and_time() {
        assert_eq!(
            object_path(Identity::Janice, "report.pdf", 1_700_000_000_123),
            "Janice/report.pdf_1700000000123"
        );
    }
}
