//! Plain-text extraction from HTML pages.
//!
//! Produces the title and the visible text of a page. Text nodes are trimmed
//! and joined with single spaces; text under non-rendered elements is dropped.

use scraper::{ElementRef, Html, Node};

/// Elements whose text content is never rendered.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Title and body text extracted from an HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlText {
    /// Trimmed text of the first `<title>`, if present and non-empty.
    pub title: Option<String>,
    pub text: String,
}

/// Parses `raw` as HTML and extracts its title and visible text.
///
/// html5ever recovers from any malformed input, so this never fails.
pub fn extract_html(raw: &str) -> HtmlText {
    let document = Html::parse_document(raw);

    let title = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "title")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut parts: Vec<&str> = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(el) => HIDDEN_ELEMENTS.contains(&el.name()),
            _ => false,
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    HtmlText {
        title,
        text: parts.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_text() {
        let html = "<html><head><title> Fruit </title></head>\
                    <body><h1>Bananas</h1>\n<p>are  <b>yellow</b></p></body></html>";
        let out = extract_html(html);
        assert_eq!(out.title.as_deref(), Some("Fruit"));
        assert_eq!(out.text, "Fruit Bananas are yellow");
    }

    #[test]
    fn empty_title_is_none() {
        let out = extract_html("<html><head><title>   </title></head><body>x</body></html>");
        assert_eq!(out.title, None);
        assert_eq!(out.text, "x");
    }

    #[test]
    fn missing_title_is_none() {
        let out = extract_html("<p>just a fragment</p>");
        assert_eq!(out.title, None);
        assert_eq!(out.text, "just a fragment");
    }

    #[test]
    fn script_and_style_are_not_text() {
        let html = "<html><head><style>body { color: red }</style>\
                    <script>var apple = 1;</script></head>\
                    <body>visible<noscript>enable js</noscript> words</body></html>";
        let out = extract_html(html);
        assert_eq!(out.text, "visible words");
    }

    #[test]
    fn comments_are_dropped() {
        let out = extract_html("<body>a<!-- hidden note -->b</body>");
        assert_eq!(out.text, "a b");
    }
}
