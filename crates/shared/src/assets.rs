//! Media assets (portraits and sound effects) owned by a character.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

/// Prefix used for character-specific asset tags (`char_happy`)
pub const CHARACTER_TAG_PREFIX: &str = "char_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Image,
    Audio,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(AssetKind::Image),
            "audio" => Some(AssetKind::Audio),
            _ => None,
        }
    }

    /// Guess the kind from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => Some(AssetKind::Image),
            "mp3" | "wav" | "ogg" | "flac" => Some(AssetKind::Audio),
            _ => None,
        }
    }

    /// Implicit tag every asset of this kind should carry
    pub fn implicit_tag(&self) -> &'static str {
        match self {
            AssetKind::Image => "avatar",
            AssetKind::Audio => "audio",
        }
    }
}

/// A binary media blob tagged with labels and scoped to one character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub character_id: String,
    pub name: String,
    pub kind: AssetKind,
    pub tags: BTreeSet<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        character_id: impl Into<String>,
        name: impl Into<String>,
        kind: AssetKind,
        tags: impl IntoIterator<Item = String>,
        data: Vec<u8>,
    ) -> Self {
        let mut tags: BTreeSet<String> = tags
            .into_iter()
            .map(|t| normalize_tag(&t))
            .filter(|t| !t.is_empty())
            .collect();
        tags.insert(kind.implicit_tag().to_string());
        Self {
            id: Uuid::new_v4().to_string(),
            character_id: character_id.into(),
            name: name.into(),
            kind,
            tags,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn has_all_tags<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter().all(|t| self.tags.contains(t))
    }
}

/// Tags are stored trimmed and lowercase
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Parse a user-entered, comma separated tag list
pub fn parse_tag_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(normalize_tag)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_asset_gets_implicit_tag() {
        let asset = Asset::new(
            "c1",
            "smile.png",
            AssetKind::Image,
            vec![" Char_Happy ".to_string(), "".to_string()],
            vec![1, 2, 3],
        );
        assert!(asset.tags.contains("char_happy"));
        assert!(asset.tags.contains("avatar"));
        assert_eq!(asset.tags.len(), 2);
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(AssetKind::from_path(Path::new("a/b.PNG")), Some(AssetKind::Image));
        assert_eq!(AssetKind::from_path(Path::new("laugh.ogg")), Some(AssetKind::Audio));
        assert_eq!(AssetKind::from_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn tag_list_parsing() {
        assert_eq!(
            parse_tag_list("happy, Char_Wink,,  "),
            vec!["happy".to_string(), "char_wink".to_string()]
        );
    }
}
