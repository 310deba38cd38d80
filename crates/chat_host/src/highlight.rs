//! Markdown to HTML with command tags highlighted.

use pulldown_cmark::{html, Event, Options, Parser};
use regex::Regex;
use shared::command_tags::{find_tags, TagSyntax};

pub const TAG_CLASS: &str = "command-tag";

const SPAN_OPEN: &str = "<span class=\"command-tag\">";
const SPAN_CLOSE: &str = "</span>";

/// Characters with a meaning in markdown, escaped inside tag spans
const MARKDOWN_PUNCTUATION: &[char] = &[
    '\\', '`', '*', '_', '{', '}', '[', ']', '(', ')', '#', '+', '-', '.', '!', '|', '~', '<',
    '>', '&',
];

/// Render message text to HTML. Tags become `<span class="command-tag">`.
pub fn render_text_content(text: &str, syntax: &TagSyntax) -> String {
    render_text_content_with(text, &syntax.pattern())
}

/// Same as [`render_text_content`] with a prebuilt tag pattern.
pub fn render_text_content_with(text: &str, pattern: &Regex) -> String {
    let marked = mark_tags_with(text, pattern);

    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    // Only our own span markers pass through as HTML; anything else the
    // model wrote is shown as text.
    let events = Parser::new_ext(&marked, options).map(|event| match event {
        Event::InlineHtml(tag) if tag.as_ref() == SPAN_OPEN || tag.as_ref() == SPAN_CLOSE => {
            Event::InlineHtml(tag)
        }
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(marked.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// Wrap every tag in a highlight span with its punctuation escaped
pub fn mark_tags(text: &str, syntax: &TagSyntax) -> String {
    mark_tags_with(text, &syntax.pattern())
}

pub fn mark_tags_with(text: &str, pattern: &Regex) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut last = 0;
    for (range, _) in find_tags(text, pattern) {
        out.push_str(&text[last..range.start]);
        out.push_str(SPAN_OPEN);
        out.push_str(&escape_markdown(&text[range.clone()]));
        out.push_str(SPAN_CLOSE);
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if MARKDOWN_PUNCTUATION.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(text: &str) -> String {
        render_text_content(text, &TagSyntax::default())
    }

    #[test]
    fn wraps_tag_in_span() {
        assert_eq!(
            render("Hi [happy]"),
            "<p>Hi <span class=\"command-tag\">[happy]</span></p>\n"
        );
    }

    #[test]
    fn tag_contents_are_not_markdown() {
        let html = render("[audio:big_bad_wolf]");
        assert!(html.contains("<span class=\"command-tag\">[audio:big_bad_wolf]</span>"));
        assert!(!html.contains("<em>"));
    }

    #[test]
    fn markdown_outside_tags_still_renders() {
        let html = render("**Bold** move [wink]");
        assert!(html.contains("<strong>Bold</strong>"));
        assert!(html.contains("<span class=\"command-tag\">[wink]</span>"));
    }

    #[test]
    fn text_without_tags_is_plain_markdown() {
        assert_eq!(render("just text"), "<p>just text</p>\n");
        assert!(!render("[broken").contains(TAG_CLASS));
    }

    #[test]
    fn custom_brackets_are_highlighted() {
        let syntax = TagSyntax::from_symbols("{", "}");
        let html = render_text_content("ok {sfx:boom} [plain]", &syntax);
        assert!(html.contains("<span class=\"command-tag\">{sfx:boom}</span>"));
        assert!(!html.contains("<span class=\"command-tag\">[plain]"));
    }

    #[test]
    fn raw_html_from_model_is_escaped() {
        let html = render("<b>hi</b> [happy]");
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("<span class=\"command-tag\">[happy]</span>"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let text = "One [a] two [cmd:b, c] three";
        assert_eq!(render(text), render(text));
    }

    #[test]
    fn valueless_brackets_are_not_highlighted() {
        let html = render("a [ , ] b [happy]");
        assert!(!html.contains("<span class=\"command-tag\">[ , ]"));
        assert!(html.contains("[ , ]"));
        assert_eq!(html.matches(TAG_CLASS).count(), 1);
        assert_eq!(mark_tags("[ , ]", &TagSyntax::default()), "[ , ]");
    }

    #[test]
    fn prebuilt_pattern_renders_the_same() {
        let syntax = TagSyntax::from_symbols("{", "}");
        let pattern = syntax.pattern();
        let text = "ok {sfx:boom} **now**";
        assert_eq!(
            render_text_content_with(text, &pattern),
            render_text_content(text, &syntax)
        );
    }

    #[test]
    fn mark_tags_escapes_punctuation() {
        assert_eq!(
            mark_tags("x [char_a]", &TagSyntax::default()),
            "x <span class=\"command-tag\">\\[char\\_a\\]</span>"
        );
    }
}
