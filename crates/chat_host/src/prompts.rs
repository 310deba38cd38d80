//! System prompt assembly for personality chats.

use shared::assets::CHARACTER_TAG_PREFIX;
use shared::command_tags::TagSyntax;
use shared::records::Personality;
use shared::settings::AppSettings;
use std::collections::BTreeSet;

/// Tags the model may use, with the character prefix stripped.
///
/// The implicit `avatar`/`audio` tags are left out since the dispatcher adds them.
pub fn available_tags(cache: &BTreeSet<String>) -> Vec<String> {
    cache
        .iter()
        .filter_map(|tag| tag.strip_prefix(CHARACTER_TAG_PREFIX))
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Full system prompt for a conversation with `personality`
pub fn get_system_prompt(
    personality: &Personality,
    settings: &AppSettings,
    character_tags: &BTreeSet<String>,
) -> String {
    let mut prompt = format!(
        r#"# {name}

## Who You Are
You are {name}. {description}
You are talking with {user}."#,
        name = personality.name.trim(),
        description = personality.description.trim(),
        user = settings.user_name.trim(),
    );

    if !personality.prompt.trim().is_empty() {
        prompt.push_str("\n\n## Instructions\n");
        prompt.push_str(personality.prompt.trim());
    }

    let examples: Vec<&str> = personality
        .tone_examples
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect();
    if !examples.is_empty() {
        prompt.push_str("\n\n## How You Talk\nMatch the voice of these lines:\n");
        for example in examples {
            prompt.push_str(&format!("- \"{example}\"\n"));
        }
        // Drop the trailing newline so sections join evenly
        prompt.pop();
    }

    if personality.roleplay {
        prompt.push_str(
            "\n\n## Roleplay\nStay in character at all times. Describe actions in *italics* and never mention being an AI.",
        );
    }

    prompt.push_str("\n\n");
    prompt.push_str(&get_trigger_instructions(settings, character_tags));
    prompt
}

/// How to emit command tags after the separator
pub fn get_trigger_instructions(settings: &AppSettings, character_tags: &BTreeSet<String>) -> String {
    let syntax = TagSyntax::from_settings(settings);
    let separator = &settings.triggers.separator;
    let tags = available_tags(character_tags);
    let tag_list = if tags.is_empty() {
        "(none yet, skip the command block)".to_string()
    } else {
        tags.join(", ")
    };

    format!(
        r#"## Expressions
After your reply, write a line containing only `{separator}` followed by command tags.
- {avatar} changes your portrait to match your mood.
- {audio} plays a sound effect.
- Several values can be combined: {combined}
Only use these values: {tag_list}
Never explain the tags and never put them before the `{separator}` line."#,
        avatar = syntax.wrap("value"),
        audio = syntax.wrap("audio:value"),
        combined = syntax.wrap("avatar:value, value"),
    )
}
