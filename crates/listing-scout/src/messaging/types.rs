use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

/// A photo with every resolution the platform keeps for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub file_unique_id: String,
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

impl Photo {
    /// Size with the most pixels.
    pub fn largest(&self) -> Option<&PhotoSize> {
        self.sizes
            .iter()
            .max_by_key(|s| u64::from(s.width) * u64::from(s.height))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub reply_to: Option<i64>,
    #[serde(default)]
    pub media_group_id: Option<String>,
    #[serde(default)]
    pub photo: Option<Photo>,
}

impl Message {
    /// Non-blank caption, if any.
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Caption or plain text, whichever is present.
    pub fn body(&self) -> Option<&str> {
        self.caption()
            .or_else(|| self.text.as_deref().filter(|t| !t.trim().is_empty()))
    }

    /// A reply, or a body carrying an `@handle`.
    pub fn is_mention(&self) -> bool {
        self.reply_to.is_some() || self.body().is_some_and(|b| RE_HANDLE.is_match(b))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub members_count: Option<i64>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub photo: Option<Photo>,
}

impl ChatInfo {
    /// Reference used when talking to the gateway about this chat.
    pub fn chat_ref(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub chat: ChatInfo,
    #[serde(default)]
    pub unread_mentions_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(caption: Option<&str>, text: Option<&str>, reply_to: Option<i64>) -> Message {
        Message {
            id: 1,
            date: Utc::now(),
            caption: caption.map(str::to_string),
            text: text.map(str::to_string),
            sender: None,
            reply_to,
            media_group_id: None,
            photo: None,
        }
    }

    #[test]
    fn test_largest_photo_size() {
        let photo = Photo {
            file_unique_id: "u".into(),
            sizes: vec![
                PhotoSize { file_id: "s".into(), width: 90, height: 90 },
                PhotoSize { file_id: "x".into(), width: 1280, height: 720 },
                PhotoSize { file_id: "m".into(), width: 800, height: 800 },
            ],
        };
        assert_eq!(photo.largest().unwrap().file_id, "x");
        assert!(Photo { file_unique_id: "e".into(), sizes: vec![] }.largest().is_none());
    }

    #[test]
    fn test_body_prefers_caption() {
        assert_eq!(message(Some("cap"), Some("txt"), None).body(), Some("cap"));
        assert_eq!(message(Some("  "), Some("txt"), None).body(), Some("txt"));
        assert_eq!(message(None, None, None).body(), None);
    }

    #[test]
    fn test_mention_detection() {
        assert!(message(None, Some("hey @laptop_shop, still available?"), None).is_mention());
        assert!(message(None, Some("no handle here"), Some(40)).is_mention());
        assert!(!message(Some("plain caption"), None, None).is_mention());
        assert!(!message(None, Some("mail me at shop @ gmail"), None).is_mention());
    }

    #[test]
    fn test_message_deserializes_with_defaults() {
        let json = r#"{ "id": 10, "date": "2026-02-01T10:00:00Z", "caption": "HP" }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, 10);
        assert_eq!(msg.caption(), Some("HP"));
        assert!(msg.photo.is_none());
    }
}
