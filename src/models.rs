//! Core data models.
//!
//! Documents are built fresh from the corpus directory on every request and
//! never cached; citations and overviews are derived from them per query.

use serde::Serialize;

/// A page from the corpus, ready for scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name, unique within the corpus directory.
    pub name: String,
    /// `<title>` for HTML, first short line for text, else the file name.
    pub title: String,
    /// Plain-text body used for scoring and as prompt source material.
    pub text: String,
    /// Relative URL the page is served under.
    pub href: String,
}

/// A numbered source reference. `index` matches the `[n]` markers in the overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    #[serde(rename = "idx")]
    pub index: usize,
    pub title: String,
    pub href: String,
}

/// Generated overview text and the sources it was built from, in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub text: String,
    pub citations: Vec<Citation>,
}
