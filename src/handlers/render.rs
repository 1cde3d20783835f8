use pulldown_cmark::{Event, Options, Parser, Tag};

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn is_safe_link(dest: &str) -> bool {
    let lowered = dest.trim().to_ascii_lowercase();
    lowered.starts_with("https://") || lowered.starts_with("http://")
}

fn ensure_line_start(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn collapse_blank_lines(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut newlines = 0;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        collapsed.push(ch);
    }
    collapsed
}

/// Renders model markdown into the HTML subset Telegram accepts.
///
/// Every piece of text coming from the model is escaped, raw HTML included.
/// The only tags in the output are the ones emitted here.
pub fn markdown_to_telegram_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::with_capacity(markdown.len() + 64);
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut open_links: Vec<bool> = Vec::new();

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading(..) => {
                    ensure_line_start(&mut out);
                    out.push_str("<b>");
                }
                Tag::BlockQuote => {
                    ensure_line_start(&mut out);
                    out.push_str("<blockquote>");
                }
                Tag::CodeBlock(_) => {
                    ensure_line_start(&mut out);
                    out.push_str("<pre>");
                }
                Tag::List(start) => {
                    ensure_line_start(&mut out);
                    lists.push(start);
                }
                Tag::Item => {
                    ensure_line_start(&mut out);
                    out.push_str(&"   ".repeat(lists.len().saturating_sub(1)));
                    match lists.last_mut() {
                        Some(Some(number)) => {
                            out.push_str(&format!("{number}. "));
                            *number += 1;
                        }
                        _ => out.push_str("• "),
                    }
                }
                Tag::Emphasis => out.push_str("<i>"),
                Tag::Strong => out.push_str("<b>"),
                Tag::Strikethrough => out.push_str("<s>"),
                Tag::Link(_, dest, _) => {
                    let safe = is_safe_link(&dest);
                    if safe {
                        out.push_str(&format!("<a href=\"{}\">", escape_html(dest.trim())));
                    }
                    open_links.push(safe);
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                Tag::Paragraph => {
                    if lists.is_empty() {
                        out.push_str("\n\n");
                    } else {
                        out.push('\n');
                    }
                }
                Tag::Heading(..) => out.push_str("</b>\n\n"),
                Tag::BlockQuote => {
                    let trimmed_len = out.trim_end().len();
                    out.truncate(trimmed_len);
                    out.push_str("</blockquote>\n\n");
                }
                Tag::CodeBlock(_) => {
                    let trimmed_len = out.trim_end().len();
                    out.truncate(trimmed_len);
                    out.push_str("</pre>\n\n");
                }
                Tag::List(_) => {
                    lists.pop();
                    ensure_line_start(&mut out);
                    if lists.is_empty() {
                        out.push('\n');
                    }
                }
                Tag::Item => ensure_line_start(&mut out),
                Tag::Emphasis => out.push_str("</i>"),
                Tag::Strong => out.push_str("</b>"),
                Tag::Strikethrough => out.push_str("</s>"),
                Tag::Link(..) => {
                    if open_links.pop() == Some(true) {
                        out.push_str("</a>");
                    }
                }
                _ => {}
            },
            Event::Text(text) => out.push_str(&escape_html(&text)),
            Event::Code(code) => {
                out.push_str("<code>");
                out.push_str(&escape_html(&code));
                out.push_str("</code>");
            }
            Event::Html(html) => out.push_str(&escape_html(&html)),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Rule => {
                ensure_line_start(&mut out);
                out.push_str("──────────\n\n");
            }
            Event::TaskListMarker(checked) => out.push_str(if checked { "☑ " } else { "☐ " }),
            _ => {}
        }
    }

    collapse_blank_lines(out.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_inline_emphasis() {
        assert_eq!(
            markdown_to_telegram_html("A **bold** and *soft* ~~old~~ look with `denim`"),
            "A <b>bold</b> and <i>soft</i> <s>old</s> look with <code>denim</code>"
        );
    }

    #[test]
    fn headings_become_bold_lines() {
        assert_eq!(
            markdown_to_telegram_html("## Style Genre\nStreetwear"),
            "<b>Style Genre</b>\n\nStreetwear"
        );
    }

    #[test]
    fn numbered_and_bulleted_lists() {
        assert_eq!(
            markdown_to_telegram_html("1. Jacket\n2. Boots"),
            "1. Jacket\n2. Boots"
        );
        assert_eq!(
            markdown_to_telegram_html("- Belt\n- Scarf"),
            "• Belt\n• Scarf"
        );
    }

    #[test]
    fn nested_lists_are_indented() {
        let html = markdown_to_telegram_html("1. Tops\n   - Linen shirt\n2. Shoes");
        assert!(html.contains("1. Tops\n   • Linen shirt\n2. Shoes"), "{html}");
    }

    #[test]
    fn raw_html_from_the_model_is_escaped() {
        let html = markdown_to_telegram_html("Nice fit <script>alert(1)</script> & more");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp; more"));
    }

    #[test]
    fn only_http_links_keep_their_anchor() {
        assert_eq!(
            markdown_to_telegram_html("[Shop](https://example.com/a?b=1&c=2)"),
            "<a href=\"https://example.com/a?b=1&amp;c=2\">Shop</a>"
        );
        assert_eq!(
            markdown_to_telegram_html("[Click](javascript:alert(1))"),
            "Click"
        );
    }

    #[test]
    fn paragraphs_are_separated_by_one_blank_line() {
        assert_eq!(
            markdown_to_telegram_html("First.\n\n\n\nSecond."),
            "First.\n\nSecond."
        );
    }

    #[test]
    fn code_blocks_use_pre() {
        assert_eq!(
            markdown_to_telegram_html("```\n<tag>\n```"),
            "<pre>&lt;tag&gt;</pre>"
        );
    }
}
