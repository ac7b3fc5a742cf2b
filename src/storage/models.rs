use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a completed upload stays retrievable.
pub const RETENTION_HOURS: i64 = 24;

pub fn retention() -> Duration {
    Duration::hours(RETENTION_HOURS)
}

/// Classification of a file derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Audio,
    Binary,
    Document,
    Image,
    Video,
}

impl FileType {
    /// Derive a file type classification from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Self {
        let primary = mime_type.split('/').next().unwrap_or("");
        match primary {
            "audio" => FileType::Audio,
            "image" => FileType::Image,
            "video" => FileType::Video,
            "text" => FileType::Document,
            "application" => match mime_type.split('/').nth(1).unwrap_or("") {
                "pdf" | "msword" | "rtf" => FileType::Document,
                _ => FileType::Binary,
            },
            _ => FileType::Binary,
        }
    }

    /// Whether browsers can render this type inline.
    pub fn is_previewable(&self) -> bool {
        matches!(self, FileType::Image | FileType::Video)
    }
}

/// Metadata for one completed, live upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub original_name: String,
    /// Sniffed from the assembled bytes, not taken from the client.
    pub mime_type: String,
    pub byte_size: u64,
    pub human_size: String,
    pub upload_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    /// Client-declared extension including the leading dot, lowercased.
    pub extension: String,
}

impl FileRecord {
    pub fn new(
        id: String,
        original_name: String,
        mime_type: String,
        byte_size: u64,
        extension: String,
        upload_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            original_name,
            mime_type,
            byte_size,
            human_size: human_size(byte_size),
            upload_time,
            expiry_time: upload_time + retention(),
            extension,
        }
    }

    /// Key of the backing object in the object root.
    pub fn object_key(&self) -> String {
        object_key(&self.id, &self.extension)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_time
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_mime(&self.mime_type)
    }

    /// Relative link under which the file is shared.
    pub fn share_link(&self) -> String {
        format!("/files/{}", self.object_key())
    }
}

pub fn object_key(id: &str, extension: &str) -> String {
    format!("{id}{extension}")
}

pub fn human_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL)
}
