//! Markdown rendering
//!
//! Articles are written in Markdown and stored together with their HTML.
//! Raw HTML in the source is escaped rather than passed through.

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self { options }
    }

    /// Render Markdown to HTML.
    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });

        let mut output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut output, parser);
        output
    }

    /// Text content with formatting stripped; block boundaries become spaces.
    pub fn plain_text(&self, markdown: &str) -> String {
        let mut text = String::new();
        for event in Parser::new_ext(markdown, self.options) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => text.push(' '),
                Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                    text.push(' ')
                }
                Event::Start(Tag::CodeBlock(_)) => text.push(' '),
                _ => {}
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// First `max_chars` characters of the plain text, cut at a word
    /// boundary when possible.
    pub fn excerpt(&self, markdown: &str, max_chars: usize) -> String {
        let text = self.plain_text(markdown);
        if text.chars().count() <= max_chars {
            return text;
        }

        let cut: String = text.chars().take(max_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(pos) if pos > max_chars / 2 => &cut[..pos],
            _ => cut.as_str(),
        };
        format!("{}...", trimmed.trim_end_matches(|c: char| c.is_ascii_punctuation()))
    }
}
