/// System prompt and refusal templates, plus context assembly for `ask`.
use crate::store::QueryMatch;

/// Placeholder replaced by the retrieved context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

pub const SYSTEM_TEMPLATE: &str = include_str!("assets/system_prompt.txt");
pub const REFUSAL_TEMPLATE: &str = include_str!("assets/refusal.txt");

/// What to hand the language model (or print) for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<'a> {
    /// Rendered system prompt for a legal query.
    Prompt(String),
    /// Fixed refusal for anything else.
    Refusal(&'a str),
}

/// Substitute `context` for the single placeholder.
pub fn render(template: &str, context: &str) -> String {
    template.replacen(CONTEXT_PLACEHOLDER, context, 1)
}

/// Conversation history first, then numbered retrieved passages.
///
/// Matches without stored text are skipped.
pub fn build_context(history: &[String], matches: &[QueryMatch]) -> String {
    let mut sections = Vec::new();

    let history: Vec<&str> = history
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if !history.is_empty() {
        sections.push(format!("Conversation history:\n{}", history.join("\n")));
    }

    let passages: Vec<String> = matches
        .iter()
        .filter_map(|m| m.text().map(|text| (m, text.trim())))
        .enumerate()
        .map(|(i, (m, text))| match m.metadata.get("source").and_then(|s| s.as_str()) {
            Some(source) => format!("[{}] ({source})\n{text}", i + 1),
            None => format!("[{}]\n{text}", i + 1),
        })
        .collect();
    if !passages.is_empty() {
        sections.push(format!("Relevant documents:\n{}", passages.join("\n\n")));
    }

    sections.join("\n\n")
}
