use std::fs;
use std::path::Path;

use scraper::{Html, Node, Selector};

use super::Document;
use crate::error::{Error, Result};

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Load an HTML page as a single document of its visible body text.
pub(super) fn load(path: &Path) -> Result<Vec<Document>> {
    let data = fs::read(path)?;
    let html = String::from_utf8_lossy(&data);
    let content = extract_text(&html).map_err(|e| Error::load(path, e))?;
    Ok(vec![Document::new(content, path)])
}

/// Visible text nodes of `<body>`, one trimmed line per node.
fn extract_text(html: &str) -> std::result::Result<String, String> {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").map_err(|e| format!("{e:?}"))?;

    let mut lines: Vec<&str> = Vec::new();
    if let Some(body) = document.select(&body_selector).next() {
        for node in body.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };

            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
            });
            if hidden {
                continue;
            }

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed);
            }
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_visible_text() {
        let html = r#"<html><head><title>Ignored</title><style>p { color: red; }</style></head>
            <body>
              <h1>Code of Criminal Procedure</h1>
              <script>var x = 1;</script>
              <p>Section 154: Information in cognizable cases.</p>
            </body></html>"#;

        let text = extract_text(html).unwrap();
        assert_eq!(
            text,
            "Code of Criminal Procedure\nSection 154: Information in cognizable cases."
        );
    }

    #[test]
    fn test_load_html_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("page.htm");
        fs::write(&path, "<p>Article 21</p>").unwrap();

        let docs = load(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Article 21");
    }
}
