//! Plain-text alternatives derived from HTML bodies

use lol_html::{RewriteStrSettings, doc_comments, element, html_content::ContentType, rewrite_str};
use tracing::warn;

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "section",
    "article", "header", "footer", "ul", "ol",
];

/// Render `html` as readable plain text.
///
/// Scripts, styles and the document head are dropped, block elements start
/// a new line, links keep their target in parentheses and whitespace is
/// collapsed. Input that cannot be parsed is returned with its whitespace
/// collapsed.
pub fn html_to_text(html: &str) -> String {
    let stripped = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                let tag = el.tag_name().to_ascii_lowercase();
                match tag.as_str() {
                    "script" | "style" | "head" | "title" => {
                        el.remove();
                        return Ok(());
                    }
                    "br" => {
                        el.replace("\n", ContentType::Text);
                        return Ok(());
                    }
                    "a" => {
                        if let Some(href) = el.get_attribute("href")
                            && !href.starts_with('#')
                            && !href.starts_with("mailto:")
                        {
                            el.after(&format!(" ({href})"), ContentType::Html);
                        }
                    }
                    "img" => {
                        if let Some(alt) = el.get_attribute("alt")
                            && !alt.is_empty()
                        {
                            el.replace(&alt, ContentType::Html);
                            return Ok(());
                        }
                    }
                    tag if BLOCK_ELEMENTS.contains(&tag) => {
                        el.before("\n", ContentType::Text);
                        el.after("\n", ContentType::Text);
                    }
                    _ => {}
                }
                el.remove_and_keep_content();
                Ok(())
            })],
            document_content_handlers: vec![doc_comments!(|comment| {
                comment.remove();
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    );

    let text = match stripped {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Could not parse HTML body, collapsing raw markup");
            html.to_string()
        }
    };

    normalise_whitespace(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).replace('\u{a0}', " ")
}

/// Collapse runs of spaces within lines and runs of blank lines.
fn normalise_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank = false;

    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank = !lines.is_empty();
            continue;
        }
        if blank {
            lines.push(String::new());
            blank = false;
        }
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_paragraphs_become_lines() {
        let html = "<html><head><title>T</title><style>p{color:red}</style></head>\
                    <body><p>Hello <b>World</b></p><p>Second</p></body></html>";
        assert_eq!(html_to_text(html), "Hello World\n\nSecond");
    }

    #[test]
    fn test_links_keep_their_target() {
        let html = r#"<p>Visit <a href="https://x.com/a?b=1&amp;c=2">our site</a></p>"#;
        assert_eq!(html_to_text(html), "Visit our site (https://x.com/a?b=1&c=2)");
    }

    #[test]
    fn test_scripts_and_comments_are_dropped() {
        let html = "<div>Keep<script>alert(1)</script><!-- hidden --></div>";
        assert_eq!(html_to_text(html), "Keep");
    }

    #[test]
    fn test_line_breaks_and_entities() {
        let html = "Line one<br>Line&nbsp;two &amp; three";
        assert_eq!(html_to_text(html), "Line one\nLine two & three");
    }

    #[test]
    fn test_numeric_references() {
        let html = r#"<p>Fish &#38; chips &#x2014; <a href="https://x.com/?a=1&#x26;b=2">menu</a></p>"#;
        assert_eq!(
            html_to_text(html),
            "Fish & chips \u{2014} menu (https://x.com/?a=1&b=2)"
        );
    }

    #[test]
    fn test_plain_input() {
        assert_eq!(html_to_text("  just   text  "), "just text");
        assert_eq!(html_to_text(""), "");
    }
}
