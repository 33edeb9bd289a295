use std::path::Path;

use tracing::debug;

use super::Document;
use crate::error::{Error, Result};

/// Load a PDF as one document per page.
///
/// Pages are numbered from 0 in the `page` metadata entry. A page whose text
/// cannot be decoded still yields a document (with empty content) so page
/// numbering stays aligned with the file.
pub(super) fn load(path: &Path) -> Result<Vec<Document>> {
    let pdf = lopdf::Document::load(path).map_err(|e| Error::load(path, e))?;

    let pages = pdf.get_pages();
    let total_pages = pages.len();
    let mut docs = Vec::with_capacity(total_pages);

    for (index, page_number) in pages.keys().enumerate() {
        let text = match pdf.extract_text(&[*page_number]) {
            Ok(text) => clean_text(&text),
            Err(e) => {
                debug!("No text on page {page_number} of {}: {e}", path.display());
                String::new()
            }
        };

        docs.push(
            Document::new(text, path)
                .with_meta("page", index)
                .with_meta("total_pages", total_pages),
        );
    }

    Ok(docs)
}

fn clean_text(text: &str) -> String {
    text.replace('\0', "")
        .replace("\r\n", "\n")
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_load_pdf_pages() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("act.pdf");
        write_pdf(&path, &["Section one", "Section two"]);

        let docs = load(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].content.contains("Section one"));
        assert!(docs[1].content.contains("Section two"));
        assert_eq!(docs[0].metadata["page"], 0);
        assert_eq!(docs[1].metadata["page"], 1);
        assert_eq!(docs[1].metadata["total_pages"], 2);
    }

    #[test]
    fn test_load_corrupt_pdf() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        assert!(matches!(load(&path), Err(Error::Load { .. })));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("a\r\nb\0c \n"), "a\nbc");
    }
}
