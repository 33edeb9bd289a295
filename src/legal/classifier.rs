/// Keyword heuristic deciding whether a query is a legal question.
///
/// Matching is plain substring search on the lowercased query, so short
/// keywords also hit inside longer words ("act" in "contact"). That
/// precision/recall trade-off is kept as is.
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_KEYWORDS: &[&str] = &[
    // Statutes and codes
    "ipc",
    "crpc",
    "cpc",
    "constitution",
    "act",
    "section",
    "article",
    "rule",
    "regulation",
    "code",
    "law",
    "statute",
    "provision",
    "clause",
    "schedule",
    // Concepts
    "murder",
    "theft",
    "robbery",
    "fraud",
    "cheating",
    "criminal",
    "civil",
    "contract",
    "tort",
    "negligence",
    "defamation",
    "assault",
    "battery",
    "trespass",
    "nuisance",
    "breach",
    "violation",
    "offence",
    "offense",
    "crime",
    "penalty",
    "punishment",
    "fine",
    "imprisonment",
    "bail",
    "custody",
    "arrest",
    "detention",
    // Processes
    "trial",
    "hearing",
    "judgment",
    "order",
    "decree",
    "injunction",
    "stay",
    "appeal",
    "revision",
    "petition",
    "writ",
    "notice",
    "summons",
    "warrant",
    "fir",
    "chargesheet",
    "complaint",
    "plaint",
    "suit",
    "case",
    "litigation",
    // Entities and roles
    "court",
    "judge",
    "magistrate",
    "lawyer",
    "advocate",
    "attorney",
    "counsel",
    "police",
    "prosecutor",
    "plaintiff",
    "defendant",
    "accused",
    "witness",
    // Rights and remedies
    "rights",
    "fundamental rights",
    "legal rights",
    "remedy",
    "compensation",
    "damages",
    "restitution",
    "relief",
    "jurisdiction",
    "procedure",
    "evidence",
    "testimony",
    "cross-examination",
    "examination-in-chief",
];

/// Multi-word patterns checked after the keywords.
pub const DEFAULT_PHRASES: &[&str] = &[
    "what is the law",
    "legal procedure",
    "court process",
    "file a case",
    "legal action",
    "sue someone",
    "legal advice",
    "constitutional",
    "judicial",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Legal,
    NonLegal,
}

impl QueryKind {
    pub fn is_legal(self) -> bool {
        self == Self::Legal
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legal => f.write_str("legal"),
            Self::NonLegal => f.write_str("non-legal"),
        }
    }
}

/// True when any keyword, then any phrase, occurs in the lowercased query.
pub fn is_legal_query<K, P>(query: &str, keywords: &[K], phrases: &[P]) -> bool
where
    K: AsRef<str>,
    P: AsRef<str>,
{
    let query = query.to_lowercase();
    keywords.iter().any(|k| query.contains(k.as_ref()))
        || phrases.iter().any(|p| query.contains(p.as_ref()))
}

pub fn classify<K, P>(query: &str, keywords: &[K], phrases: &[P]) -> QueryKind
where
    K: AsRef<str>,
    P: AsRef<str>,
{
    if is_legal_query(query, keywords, phrases) {
        QueryKind::Legal
    } else {
        QueryKind::NonLegal
    }
}
