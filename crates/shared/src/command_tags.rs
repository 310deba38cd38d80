//! Inline command tags embedded in model replies.
//!
//! A reply looks like `<visible text><separator><command block>`, where the
//! command block holds zero or more `[value]` or `[command:value,value]`
//! groups. Tags are also recognised anywhere in the visible text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const DEFAULT_COMMAND: &str = "avatar";

/// A command tag parsed out of model text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTag {
    /// Command name, `"avatar"` when the tag omits it
    pub command: String,
    /// Comma separated values, trimmed, empties dropped
    pub raw_values: Vec<String>,
    /// Exact matched substring, used as the dedupe key
    pub full_match_text: String,
}

/// What a tag asks the UI to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagAction {
    Avatar,
    Audio,
    Unsupported(String),
}

impl TagAction {
    pub fn from_command(command: &str) -> Self {
        match command.to_ascii_lowercase().as_str() {
            "avatar" => TagAction::Avatar,
            "audio" | "sfx" => TagAction::Audio,
            other => TagAction::Unsupported(other.to_string()),
        }
    }

    /// Tag implicitly added to every asset search for this action
    pub fn implicit_tag(&self) -> Option<&'static str> {
        match self {
            TagAction::Avatar => Some("avatar"),
            TagAction::Audio => Some("audio"),
            TagAction::Unsupported(_) => None,
        }
    }
}

impl CommandTag {
    pub fn action(&self) -> TagAction {
        TagAction::from_command(&self.command)
    }
}

/// Bracket pair used to delimit tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSyntax {
    pub open: char,
    pub close: char,
}

impl Default for TagSyntax {
    fn default() -> Self {
        Self {
            open: '[',
            close: ']',
        }
    }
}

impl TagSyntax {
    /// Build from the configured start/end symbols, first character of each.
    pub fn from_symbols(start: &str, end: &str) -> Self {
        let default = Self::default();
        let open = start.trim().chars().next().unwrap_or(default.open);
        let close = end.trim().chars().next().unwrap_or(default.close);
        if open == close {
            return default;
        }
        Self { open, close }
    }

    pub fn from_settings(settings: &crate::settings::AppSettings) -> Self {
        Self::from_symbols(
            &settings.triggers.symbol_start,
            &settings.triggers.symbol_end,
        )
    }

    /// Regex matching one tag; group 1 is the optional command, group 2 the values
    pub fn pattern(&self) -> Regex {
        let open = regex::escape(&self.open.to_string());
        let close = regex::escape(&self.close.to_string());
        let pattern = format!(r"{open}(?:(\w+):)?([^:{close}]+?){close}");
        // Both brackets are escaped, the pattern is always valid.
        Regex::new(&pattern).unwrap_or_else(|_| default_pattern())
    }

    /// Wrap a tag body in this syntax's brackets
    pub fn wrap(&self, body: &str) -> String {
        format!("{}{}{}", self.open, body, self.close)
    }
}

fn default_pattern() -> Regex {
    Regex::new(r"\[(?:(\w+):)?([^:\]]+?)\]").expect("static tag pattern")
}

/// Scan the whole text for command tags, left to right.
pub fn scan(text: &str, syntax: &TagSyntax) -> Vec<CommandTag> {
    scan_with(text, &syntax.pattern())
}

/// Scan with a prebuilt pattern (see [`TagSyntax::pattern`]).
pub fn scan_with(text: &str, pattern: &Regex) -> Vec<CommandTag> {
    find_tags(text, pattern)
        .into_iter()
        .map(|(_, tag)| tag)
        .collect()
}

/// Accepted tags with their byte ranges in `text`. Matches with no
/// non-empty value are skipped, so highlighting and dispatch agree.
pub fn find_tags(text: &str, pattern: &Regex) -> Vec<(Range<usize>, CommandTag)> {
    pattern
        .captures_iter(text)
        .filter_map(|cap| {
            let full = cap.get(0)?;
            let command = cap
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| DEFAULT_COMMAND.to_string());
            let raw_values: Vec<String> = cap
                .get(2)?
                .as_str()
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if raw_values.is_empty() {
                return None;
            }
            let tag = CommandTag {
                command,
                raw_values,
                full_match_text: full.as_str().to_string(),
            };
            Some((full.range(), tag))
        })
        .collect()
}

/// Split a reply into the visible part and the command block after the separator.
pub fn split_reply<'a>(text: &'a str, separator: &str) -> (&'a str, Option<&'a str>) {
    if separator.is_empty() {
        return (text, None);
    }
    match text.rfind(separator) {
        Some(idx) => (
            text[..idx].trim_end(),
            Some(text[idx + separator.len()..].trim()),
        ),
        None => (text, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<CommandTag> {
        scan(text, &TagSyntax::default())
    }

    #[test]
    fn bare_value_defaults_to_avatar() {
        let found = tags("[x]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].command, "avatar");
        assert_eq!(found[0].raw_values, vec!["x".to_string()]);
        assert_eq!(found[0].full_match_text, "[x]");
    }

    #[test]
    fn command_values_are_trimmed() {
        let found = tags("[cmd:a, b]");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].command, "cmd");
        assert_eq!(found[0].raw_values, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_tokens_are_dropped() {
        let found = tags("[audio: a,, ,b ,]");
        assert_eq!(found[0].raw_values, vec!["a".to_string(), "b".to_string()]);

        assert!(tags("[ , ]").is_empty());
    }

    #[test]
    fn scans_multiple_tags_in_order() {
        let found = tags("He said [happy] and then [audio:laugh]");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].command, "avatar");
        assert_eq!(found[0].raw_values, vec!["happy".to_string()]);
        assert_eq!(found[1].command, "audio");
        assert_eq!(found[1].raw_values, vec!["laugh".to_string()]);
    }

    #[test]
    fn malformed_tags_are_ignored() {
        assert!(tags("unbalanced [happy").is_empty());
        assert!(tags("[:happy]").is_empty());
        assert!(tags("[]").is_empty());
        assert!(tags("no tags here").is_empty());
    }

    #[test]
    fn partial_stream_prefix_has_no_tag_until_closed() {
        let text = "Hello [avatar:sm";
        assert!(tags(text).is_empty());
        assert_eq!(tags(&format!("{text}ile]")).len(), 1);
    }

    #[test]
    fn custom_brackets() {
        let syntax = TagSyntax::from_symbols("{", "}");
        let found = scan("hi {sfx:boom} [ignored]", &syntax);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].command, "sfx");
        assert_eq!(found[0].full_match_text, "{sfx:boom}");
        assert_eq!(found[0].action(), TagAction::Audio);
    }

    #[test]
    fn identical_symbols_fall_back_to_default() {
        assert_eq!(TagSyntax::from_symbols("|", "|"), TagSyntax::default());
        assert_eq!(TagSyntax::from_symbols("", ""), TagSyntax::default());
    }

    #[test]
    fn split_reply_on_separator() {
        let (visible, block) = split_reply("Hi there!\n---\n[happy][audio:giggle]", "---");
        assert_eq!(visible, "Hi there!");
        assert_eq!(block, Some("[happy][audio:giggle]"));

        let (visible, block) = split_reply("No commands", "---");
        assert_eq!(visible, "No commands");
        assert!(block.is_none());
    }

    #[test]
    fn find_tags_reports_ranges_of_accepted_tags_only() {
        let text = "a [ , ] b [happy] c";
        let found = find_tags(text, &TagSyntax::default().pattern());
        assert_eq!(found.len(), 1);
        let (range, tag) = &found[0];
        assert_eq!(&text[range.clone()], "[happy]");
        assert_eq!(tag.raw_values, vec!["happy".to_string()]);
    }

    #[test]
    fn action_mapping() {
        assert_eq!(TagAction::from_command("AVATAR"), TagAction::Avatar);
        assert_eq!(TagAction::from_command("sfx"), TagAction::Audio);
        assert_eq!(TagAction::Audio.implicit_tag(), Some("audio"));
        assert_eq!(
            TagAction::from_command("mood"),
            TagAction::Unsupported("mood".into())
        );
    }
}
