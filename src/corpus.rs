//! Corpus loader.
//!
//! Reads the top level of the corpus directory into [`Document`]s. Supported
//! extensions are `html`, `htm`, `txt` and `md`. Files that can't be read or
//! aren't valid UTF-8 are skipped; a missing directory is an empty corpus.
//!
//! Results come back in directory listing order, which differs between
//! platforms. The ranker's stable sort keeps that order for equal scores.

use anyhow::Result;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::extract::extract_html;
use crate::models::Document;

/// First lines at least this many characters long are not used as titles.
const MAX_TEXT_TITLE_CHARS: usize = 120;

/// Why a corpus file was left out.
#[derive(Debug, Error)]
pub enum DocumentReadError {
    #[error("failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} is not valid UTF-8")]
    Decode { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Html,
    Text,
}

/// Loads every supported file in `config.dir`.
///
/// Only errors walking the directory itself are returned; per-file failures
/// are logged at debug level and the file is skipped.
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<Document>> {
    let root = &config.dir;
    if !root.exists() {
        tracing::debug!(dir = %root.display(), "corpus directory does not exist");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    let walker = WalkDir::new(root).min_depth(1).max_depth(1).follow_links(true);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // A dangling link below the root is just another unreadable file.
            Err(e) if e.depth() > 0 => {
                tracing::debug!(error = %e, "skipping corpus entry");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(kind) = page_kind(&name) else {
            continue;
        };

        match read_document(entry.path(), &name, kind, &config.url_prefix) {
            Ok(doc) => documents.push(doc),
            Err(e) => tracing::debug!(error = %e, "skipping corpus file"),
        }
    }

    Ok(documents)
}

fn page_kind(name: &str) -> Option<PageKind> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => Some(PageKind::Html),
        "txt" | "md" => Some(PageKind::Text),
        _ => None,
    }
}

fn read_document(
    path: &Path,
    name: &str,
    kind: PageKind,
    url_prefix: &str,
) -> Result<Document, DocumentReadError> {
    let bytes = std::fs::read(path).map_err(|source| DocumentReadError::Io {
        name: name.to_string(),
        source,
    })?;
    let raw = String::from_utf8(bytes).map_err(|_| DocumentReadError::Decode {
        name: name.to_string(),
    })?;

    let (title, text) = match kind {
        PageKind::Html => {
            let page = extract_html(&raw);
            (page.title.unwrap_or_else(|| name.to_string()), page.text)
        }
        PageKind::Text => (text_title(&raw).unwrap_or_else(|| name.to_string()), raw),
    };

    Ok(Document {
        name: name.to_string(),
        title,
        text,
        href: format!("{}/{}", url_prefix.trim_end_matches('/'), name),
    })
}

/// Any character that ends a line: `\n`, `\r`, vertical tab, form feed,
/// the information separators and the Unicode line/paragraph separators.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\u{1c}'..='\u{1e}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// First line of the trimmed content, if it is short enough to be a title.
fn text_title(raw: &str) -> Option<String> {
    let content = raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, '\u{1c}'..='\u{1f}'));
    if content.is_empty() {
        return None;
    }
    let first = content.split(is_line_break).next()?;
    if first.chars().count() < MAX_TEXT_TITLE_CHARS {
        Some(first.trim().to_string())
    } else {
        None
    }
}
