use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::identity::Identity;
use crate::error::ChatError;

/// Server-assigned message id. The backend may hand out numbers or strings;
/// either way the value is only compared, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(number) => MessageId(number.to_string()),
            RawId::Text(text) => MessageId(text),
        })
    }
}

/// Value of the persisted `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    /// Also catches kinds this client does not know; they render as a download link.
    #[serde(other)]
    File,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::File => "file",
        }
    }

    /// Column value to kind; unknown names fall back to `File`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "text" => ContentKind::Text,
            "image" => ContentKind::Image,
            "video" => ContentKind::Video,
            "audio" => ContentKind::Audio,
            _ => ContentKind::File,
        }
    }
}

/// Message body, one variant per kind with the fields that kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Image { url: String, file_name: Option<String> },
    Video { url: String, file_name: Option<String> },
    Audio { url: String, file_name: Option<String> },
    File { url: String, file_name: Option<String> },
}

impl MessageContent {
    pub fn from_parts(kind: ContentKind, content: String, file_name: Option<String>) -> Self {
        match kind {
            ContentKind::Text => MessageContent::Text(content),
            ContentKind::Image => MessageContent::Image {
                url: content,
                file_name,
            },
            ContentKind::Video => MessageContent::Video {
                url: content,
                file_name,
            },
            ContentKind::Audio => MessageContent::Audio {
                url: content,
                file_name,
            },
            ContentKind::File => MessageContent::File {
                url: content,
                file_name,
            },
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            MessageContent::Text(_) => ContentKind::Text,
            MessageContent::Image { .. } => ContentKind::Image,
            MessageContent::Video { .. } => ContentKind::Video,
            MessageContent::Audio { .. } => ContentKind::Audio,
            MessageContent::File { .. } => ContentKind::File,
        }
    }

    /// Text body or attachment URL.
    pub fn payload(&self) -> &str {
        match self {
            MessageContent::Text(body) => body,
            MessageContent::Image { url, .. }
            | MessageContent::Video { url, .. }
            | MessageContent::Audio { url, .. }
            | MessageContent::File { url, .. } => url,
        }
    }

    /// URL to draw in place, for images only.
    pub fn inline_image(&self) -> Option<&str> {
        match self {
            MessageContent::Image { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            MessageContent::Text(_) => None,
            MessageContent::Image { file_name, .. }
            | MessageContent::Video { file_name, .. }
            | MessageContent::Audio { file_name, .. }
            | MessageContent::File { file_name, .. } => file_name.as_deref(),
        }
    }
}

/// Domain model đại diện một tin nhắn chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub author: Identity,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let author = row.user_name.parse::<Identity>().map_err(|_| {
            ChatError::MalformedRow(format!(
                "message {} has unknown author `{}`",
                row.id, row.user_name
            ))
        })?;

        Ok(ChatMessage {
            id: row.id,
            author,
            content: MessageContent::from_parts(row.kind, row.content, row.file_name),
            created_at: row.created_at,
        })
    }
}

/// Row of the `messages` table as the backend stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub user_name: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub content: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessageRow {
    pub user_name: Identity,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl NewMessageRow {
    pub fn text(author: Identity, content: impl Into<String>) -> Self {
        Self {
            user_name: author,
            kind: ContentKind::Text,
            content: content.into(),
            file_name: None,
        }
    }

    pub fn attachment(author: Identity, kind: ContentKind, url: String, file_name: String) -> Self {
        Self {
            user_name: author,
            kind,
            content: url,
            file_name: Some(file_name),
        }
    }
}

/// Accepts RFC 3339 timestamps and offset-less ones (read as UTC).
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Identities with an active session on the presence channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet(BTreeSet<Identity>);

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from raw presence keys, ignoring keys that are not identities.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|key| key.as_ref().parse::<Identity>().ok())
            .collect()
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.0.contains(&identity)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Identity> for PresenceSet {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_parses_backend_json() {
        let json = r#"{
            "id": 42,
            "user_name": "Janice",
            "type": "image",
            "content": "https://cdn.example/Janice/cat.png_1700000000000",
            "file_name": "cat.png",
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        }"#;
        let row: MessageRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.id, MessageId::new("42"));

        let message = ChatMessage::try_from(row).unwrap();
        assert_eq!(message.author, Identity::Janice);
        assert_eq!(message.content.kind(), ContentKind::Image);
        assert_eq!(message.content.file_name(), Some("cat.png"));
    }

    #[test]
    fn unknown_kind_and_naive_timestamp_are_tolerated() {
        let json = r#"{
            "id": "a1",
            "user_name": "Leo",
            "type": "sticker",
            "content": "https://cdn.example/x",
            "created_at": "2024-05-01T10:00:00"
        }"#;
        let row: MessageRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.kind, ContentKind::File);
        assert_eq!(row.file_name, None);
        assert_eq!(row.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn row_with_unknown_author_is_malformed() {
        let row = MessageRow {
            id: MessageId::new("1"),
            user_name: "Mallory".into(),
            kind: ContentKind::Text,
            content: "hello".into(),
            file_name: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            ChatMessage::try_from(row),
            Err(ChatError::MalformedRow(_))
        ));
    }

    #[test]
    fn insert_payload_matches_table_columns() {
        let text = serde_json::to_value(NewMessageRow::text(Identity::Leo, "hi")).unwrap();
        assert_eq!(
            text,
            serde_json::json!({"user_name": "Leo", "type": "text", "content": "hi"})
        );

        let file = serde_json::to_value(NewMessageRow::attachment(
            Identity::Janice,
            ContentKind::File,
            "https://cdn.example/doc".into(),
            "doc.pdf".into(),
        ))
        .unwrap();
        assert_eq!(file["file_name"], "doc.pdf");
        assert_eq!(file["type"], "file");
    }

    #[test]
    fn presence_set_ignores_unknown_keys() {
        let set = PresenceSet::from_keys(["Janice", "ghost", "leo"]);
        assert!(set.contains(Identity::Janice));
        assert!(!set.contains(Identity::Leo));
    }

    #[test]
    fn only_images_are_drawn_inline() {
        let image = MessageContent::from_parts(
            ContentKind::Image,
            "https://cdn.example/Leo/cat.png_1".into(),
            Some("cat.png".into()),
        );
        assert_eq!(image.inline_image(), Some("https://cdn.example/Leo/cat.png_1"));

        let video = MessageContent::from_parts(ContentKind::Video, "https://cdn.example/v.mp4".into(), None);
        assert_eq!(video.inline_image(), None);
        assert_eq!(MessageContent::Text("hi".into()).inline_image(), None);
    }
}
