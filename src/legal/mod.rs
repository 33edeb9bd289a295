//! Legal assistant profile: query classification and prompt selection.
//!
//! A [`LegalProfile`] bundles the keyword and phrase lists with the system
//! prompt and refusal templates. It is built once at startup, from the
//! built-in defaults or a JSON override, and passed to whoever needs it.

pub mod classifier;
pub mod prompt;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use classifier::QueryKind;
pub use prompt::{Response, build_context};

fn default_keywords() -> Vec<String> {
    classifier::DEFAULT_KEYWORDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_phrases() -> Vec<String> {
    classifier::DEFAULT_PHRASES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_system_template() -> String {
    prompt::SYSTEM_TEMPLATE.trim().to_string()
}

fn default_refusal() -> String {
    prompt::REFUSAL_TEMPLATE.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalProfile {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    #[serde(default = "default_phrases")]
    pub phrases: Vec<String>,

    #[serde(default = "default_system_template")]
    pub system_template: String,

    #[serde(default = "default_refusal")]
    pub refusal: String,
}

impl Default for LegalProfile {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            phrases: default_phrases(),
            system_template: default_system_template(),
            refusal: default_refusal(),
        }
    }
}

impl LegalProfile {
    /// Read a JSON override; fields left out keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile: {}", path.display()))?;
        let mut profile: Self = serde_json::from_str(&content)
            .with_context(|| format!("invalid profile JSON: {}", path.display()))?;

        for list in [&mut profile.keywords, &mut profile.phrases] {
            for entry in list.iter_mut() {
                *entry = entry.to_lowercase();
            }
        }
        profile.validate()?;

        info!(
            "Loaded legal profile from {} ({} keywords, {} phrases)",
            path.display(),
            profile.keywords.len(),
            profile.phrases.len()
        );
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        let placeholders = self
            .system_template
            .matches(prompt::CONTEXT_PLACEHOLDER)
            .count();
        anyhow::ensure!(
            placeholders == 1,
            "system template must contain exactly one {} placeholder, found {placeholders}",
            prompt::CONTEXT_PLACEHOLDER
        );
        anyhow::ensure!(
            !self.refusal.trim().is_empty(),
            "refusal message must not be empty"
        );
        Ok(())
    }

    pub fn is_legal_query(&self, query: &str) -> bool {
        classifier::is_legal_query(query, &self.keywords, &self.phrases)
    }

    pub fn classify(&self, query: &str) -> QueryKind {
        classifier::classify(query, &self.keywords, &self.phrases)
    }

    pub fn render_system_prompt(&self, context: &str) -> String {
        prompt::render(&self.system_template, context)
    }

    pub fn refusal_message(&self) -> &str {
        &self.refusal
    }

    /// Prompt for legal queries, refusal otherwise.
    ///
    /// `context` only runs for legal queries, so retrieval is skipped for
    /// anything that gets the refusal.
    pub fn respond<F, E>(&self, query: &str, context: F) -> std::result::Result<Response<'_>, E>
    where
        F: FnOnce() -> std::result::Result<String, E>,
    {
        Ok(match self.classify(query) {
            QueryKind::Legal => Response::Prompt(self.render_system_prompt(&context()?)),
            QueryKind::NonLegal => Response::Refusal(self.refusal_message()),
        })
    }
}
