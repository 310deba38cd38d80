//! Lightweight markdown renderer for chat bubbles, with command tags
//! drawn as highlighted chips.
//!
//! Handles the subset of markdown models actually produce:
//! - `# Heading` through `### Heading`
//! - `**bold**`, `` `inline code` ``, `[text](url)` links
//! - `- bullet` and `* bullet` list items
//! - command tags such as `[avatar:happy]` in the configured brackets

use eframe::egui;
use regex::Regex;
use shared::command_tags::find_tags;

pub const TAG_COLOR: egui::Color32 = egui::Color32::from_rgb(176, 79, 208);

const BASE_SIZE: f32 = 14.0;

/// Render message text into an egui region.
pub fn render_markdown(ui: &mut egui::Ui, text: &str, base_color: egui::Color32, tags: &Regex) {
    let style = InlineStyle::new(base_color);

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            ui.add_space(6.0);
            continue;
        }

        if let Some((level, rest)) = heading(trimmed) {
            let size = match level {
                1 => 18.0,
                2 => 16.0,
                _ => 15.0,
            };
            ui.add_space(4.0);
            ui.label(egui::RichText::new(rest).strong().size(size).color(base_color));
            ui.add_space(2.0);
            continue;
        }

        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));
        ui.horizontal_wrapped(|ui| {
            ui.spacing_mut().item_spacing.x = 0.0;
            if let Some(rest) = bullet {
                ui.label(egui::RichText::new("  •  ").size(BASE_SIZE).color(base_color));
                render_inline(ui, rest, &style, tags);
            } else {
                render_inline(ui, trimmed, &style, tags);
            }
        });
    }
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    line[hashes..].strip_prefix(' ').map(|rest| (hashes, rest))
}

struct InlineStyle {
    base: egui::Color32,
    link: egui::Color32,
    code_bg: egui::Color32,
}

impl InlineStyle {
    fn new(base: egui::Color32) -> Self {
        let code_bg = if base.r() > 128 {
            egui::Color32::from_rgb(60, 60, 70)
        } else {
            egui::Color32::from_rgb(230, 232, 236)
        };
        Self {
            base,
            link: egui::Color32::from_rgb(100, 170, 240),
            code_bg,
        }
    }

    fn plain(&self, ui: &mut egui::Ui, text: &str) {
        if !text.is_empty() {
            ui.label(egui::RichText::new(text).size(BASE_SIZE).color(self.base));
        }
    }
}

fn render_inline(ui: &mut egui::Ui, text: &str, style: &InlineStyle, tags: &Regex) {
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some(marker) = find_next_marker(remaining, tags) else {
            style.plain(ui, remaining);
            break;
        };
        style.plain(ui, &remaining[..marker.start]);

        match marker.kind {
            MarkerKind::Tag => {
                egui::Frame::none()
                    .fill(TAG_COLOR.linear_multiply(0.18))
                    .rounding(egui::Rounding::same(3.0))
                    .inner_margin(egui::Margin::symmetric(3.0, 0.0))
                    .show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(&remaining[marker.start..marker.end])
                                .size(BASE_SIZE - 1.0)
                                .monospace()
                                .color(TAG_COLOR),
                        );
                    });
            }
            MarkerKind::Bold => {
                ui.label(
                    egui::RichText::new(&remaining[marker.start + 2..marker.end - 2])
                        .size(BASE_SIZE)
                        .strong()
                        .color(style.base),
                );
            }
            MarkerKind::Code => {
                egui::Frame::none()
                    .fill(style.code_bg)
                    .rounding(egui::Rounding::same(3.0))
                    .inner_margin(egui::Margin::symmetric(4.0, 1.0))
                    .show(ui, |ui| {
                        ui.label(
                            egui::RichText::new(&remaining[marker.start + 1..marker.end - 1])
                                .size(BASE_SIZE)
                                .monospace()
                                .color(style.base),
                        );
                    });
            }
            MarkerKind::Link { label_end } => {
                let label = &remaining[marker.start + 1..label_end];
                let url = &remaining[label_end + 2..marker.end - 1];
                ui.add(egui::Hyperlink::from_label_and_url(
                    egui::RichText::new(label)
                        .size(BASE_SIZE)
                        .color(style.link)
                        .underline(),
                    url,
                ))
                .on_hover_text(url);
            }
        }
        remaining = &remaining[marker.end..];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Tag,
    Bold,
    Code,
    /// `label_end` is the index of the `]` closing the label
    Link { label_end: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    start: usize,
    end: usize,
    kind: MarkerKind,
}

/// Earliest complete inline span. Tags win ties with links.
fn find_next_marker(text: &str, tags: &Regex) -> Option<Marker> {
    let mut candidates: Vec<Marker> = Vec::new();

    if let Some((range, _)) = find_tags(text, tags).into_iter().next() {
        candidates.push(Marker {
            start: range.start,
            end: range.end,
            kind: MarkerKind::Tag,
        });
    }
    if let Some(start) = text.find("**") {
        if let Some(len) = text[start + 2..].find("**") {
            candidates.push(Marker {
                start,
                end: start + 2 + len + 2,
                kind: MarkerKind::Bold,
            });
        }
    }
    if let Some(start) = text.find('`') {
        if let Some(len) = text[start + 1..].find('`') {
            candidates.push(Marker {
                start,
                end: start + 1 + len + 1,
                kind: MarkerKind::Code,
            });
        }
    }
    if let Some(start) = text.find('[') {
        if let Some(rel) = text[start..].find("](") {
            let label_end = start + rel;
            if let Some(close) = text[label_end + 2..].find(')') {
                candidates.push(Marker {
                    start,
                    end: label_end + 2 + close + 1,
                    kind: MarkerKind::Link { label_end },
                });
            }
        }
    }

    candidates.into_iter().min_by_key(|m| {
        let rank = match m.kind {
            MarkerKind::Tag => 0,
            _ => 1,
        };
        (m.start, rank)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::command_tags::TagSyntax;

    fn next(text: &str) -> Option<Marker> {
        find_next_marker(text, &TagSyntax::default().pattern())
    }

    #[test]
    fn finds_tag() {
        let m = next("hello [avatar:happy] there").unwrap();
        assert_eq!(m.kind, MarkerKind::Tag);
        assert_eq!(&"hello [avatar:happy] there"[m.start..m.end], "[avatar:happy]");
    }

    #[test]
    fn tag_shaped_link_label_renders_as_tag() {
        let m = next("see [docs](https://example.com)").unwrap();
        assert_eq!(m.kind, MarkerKind::Tag);
        assert_eq!((m.start, m.end), (4, 10));
    }

    #[test]
    fn link_with_non_tag_label() {
        let text = "see [a:b:c](https://example.com)";
        let m = next(text).unwrap();
        assert!(matches!(m.kind, MarkerKind::Link { .. }));
        assert_eq!(&text[m.start..m.end], "[a:b:c](https://example.com)");
    }

    #[test]
    fn valueless_brackets_are_not_a_chip() {
        let text = "a [ , ] b [happy]";
        let m = next(text).unwrap();
        assert_eq!(m.kind, MarkerKind::Tag);
        assert_eq!(&text[m.start..m.end], "[happy]");
    }

    #[test]
    fn earliest_marker_wins() {
        let m = next("**bold** then [happy]").unwrap();
        assert_eq!(m.kind, MarkerKind::Bold);
        assert_eq!((m.start, m.end), (0, 8));

        let m = next("`code` **b**").unwrap();
        assert_eq!(m.kind, MarkerKind::Code);
    }

    #[test]
    fn unclosed_markers_are_plain_text() {
        assert!(next("**open and `tick").is_none());
    }

    #[test]
    fn headings() {
        assert_eq!(heading("## Title"), Some((2, "Title")));
        assert_eq!(heading("#hashtag"), None);
        assert_eq!(heading("#### Deep"), None);
    }
}
