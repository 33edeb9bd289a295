use std::fs;
use std::path::Path;

use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, TableCellContent, TableChild,
    TableRowChild,
};

use super::Document;
use crate::error::{Error, Result};

/// Load a Word document as a single document.
///
/// Each non-empty paragraph (body or table cell) becomes one block; blocks
/// are separated by a blank line.
pub(super) fn load(path: &Path) -> Result<Vec<Document>> {
    let data = fs::read(path)?;
    let docx = docx_rs::read_docx(&data).map_err(|e| Error::load(path, e))?;

    let mut blocks: Vec<String> = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => push_block(&mut blocks, paragraph_text(p)),
            DocumentChild::Table(table) => {
                for row in &table.rows {
                    let TableChild::TableRow(row) = row;
                    for cell in &row.cells {
                        let TableRowChild::TableCell(cell) = cell;
                        for content in &cell.children {
                            if let TableCellContent::Paragraph(p) = content {
                                push_block(&mut blocks, paragraph_text(p));
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(vec![Document::new(blocks.join("\n\n"), path)])
}

fn push_block(blocks: &mut Vec<String>, text: String) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_string());
    }
}

fn paragraph_text(p: &Paragraph) -> String {
    let mut out = String::new();
    collect_children(&p.children, &mut out);
    out
}

fn collect_children(children: &[ParagraphChild], out: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for rc in &run.children {
                    match rc {
                        RunChild::Text(t) => out.push_str(&t.text),
                        RunChild::Tab(_) => out.push('\t'),
                        RunChild::Break(_) => out.push('\n'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => collect_children(&link.children, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Run, Table, TableCell, TableRow};

    #[test]
    fn test_load_docx_paragraphs_and_tables() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("judgment.docx");
        let file = fs::File::create(&path).unwrap();

        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("IN THE HIGH COURT")))
            .add_paragraph(Paragraph::new())
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("Bail is "))
                    .add_run(Run::new().add_text("granted.")),
            )
            .add_table(Table::new(vec![TableRow::new(vec![
                TableCell::new()
                    .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Appellant"))),
            ])]))
            .build()
            .pack(file)
            .unwrap();

        let docs = load(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].content,
            "IN THE HIGH COURT\n\nBail is granted.\n\nAppellant"
        );
    }

    #[test]
    fn test_load_docx_rejects_garbage() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("fake.docx");
        fs::write(&path, "plain text pretending to be docx").unwrap();

        assert!(matches!(load(&path), Err(Error::Load { .. })));
    }
}
