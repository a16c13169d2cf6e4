//! Overview generation.
//!
//! Pipeline for one query:
//!
//! ```text
//! documents ──▶ rank (stable, by score) ──▶ top K ──▶ numbered sources
//!                                                        │
//!        Overview ◀── ensure [n] marker ◀── backend ◀── prompt
//! ```
//!
//! Any [`GenerationError`] degrades to [`OVERVIEW_ERROR_TEXT`] with no
//! citations. Nothing is retried and nothing is kept between calls.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::OverviewConfig;
use crate::generation::{GenerationBackend, GenerationError};
use crate::models::{Citation, Document, Overview};
use crate::score::{query_terms, score_terms};

/// Text shown in place of the overview when generation fails.
pub const OVERVIEW_ERROR_TEXT: &str = "Error generating AI Overview";

/// Appended to truncated source bodies.
pub const ELLIPSIS: char = '…';

const INSTRUCTIONS: &str = "
You are generating a concise 'AI Overview' for a search results page.
Use ONLY the provided sources. Do not invent facts or use outside knowledge.
Write 3–6 sentences max. For each factual sentence, append inline citation(s)
like [1] or [2][5]. Avoid markdown headings, bullet lists, disclaimers.
End with the overview only.
";

static CITATION_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("citation pattern is valid"));

/// Returns up to `limit` documents ordered by descending score. Documents
/// with equal scores keep their input order.
pub fn rank_documents<'a>(documents: &'a [Document], query: &str, limit: usize) -> Vec<&'a Document> {
    let terms = query_terms(query);
    let mut scored: Vec<(usize, &Document)> = documents
        .iter()
        .map(|d| (score_terms(&d.text, &terms), d))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, d)| d).collect()
}

/// Collapses whitespace runs to single spaces, trims, and cuts the result to
/// `limit` characters followed by [`ELLIPSIS`] when it is longer.
pub fn truncate(text: &str, limit: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match normalized.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut out = normalized[..cut].to_string();
            out.push(ELLIPSIS);
            out
        }
        None => normalized,
    }
}

/// Numbered source blocks and their citations, for documents already ranked.
pub fn build_sources(ranked: &[&Document], char_limit: usize) -> (Vec<String>, Vec<Citation>) {
    let mut blocks = Vec::with_capacity(ranked.len());
    let mut citations = Vec::with_capacity(ranked.len());

    for (i, doc) in ranked.iter().enumerate() {
        let index = i + 1;
        let title = [doc.title.as_str(), doc.name.as_str()]
            .into_iter()
            .find(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Source {}", index));
        let href = if doc.href.is_empty() {
            doc.name.clone()
        } else {
            doc.href.clone()
        };

        blocks.push(format!("[{}] {}\n{}", index, title, truncate(&doc.text, char_limit)));
        citations.push(Citation { index, title, href });
    }

    (blocks, citations)
}

/// The full prompt sent to the model.
pub fn build_prompt(query: &str, source_blocks: &[String]) -> String {
    format!(
        "QUERY:\n{}\n\nSOURCES:\n{}\n\nINSTRUCTIONS:\n{}\n",
        query,
        source_blocks.join("\n\n"),
        INSTRUCTIONS
    )
}

/// Trims `text` and appends ` [1]` unless it already has a `[n]` marker.
pub fn ensure_citation(text: &str) -> String {
    let mut out = text.trim().to_string();
    if !CITATION_MARKER_RE.is_match(&out) {
        out.push_str(" [1]");
    }
    out
}

/// Runs the pipeline, returning the backend error instead of degrading.
pub async fn try_generate_overview(
    query: &str,
    documents: &[Document],
    backend: &dyn GenerationBackend,
    config: &OverviewConfig,
) -> Result<Overview, GenerationError> {
    let ranked = rank_documents(documents, query, config.max_sources);
    let (blocks, citations) = build_sources(&ranked, config.source_char_limit);
    let prompt = build_prompt(query, &blocks);

    tracing::debug!(
        backend = backend.name(),
        sources = citations.len(),
        prompt_chars = prompt.len(),
        "requesting overview"
    );

    let raw = backend.generate(&prompt).await?;
    Ok(Overview {
        text: ensure_citation(&raw),
        citations,
    })
}

/// Generates the overview for `query`, degrading to [`OVERVIEW_ERROR_TEXT`]
/// with no citations when the backend fails.
pub async fn generate_overview(
    query: &str,
    documents: &[Document],
    backend: &dyn GenerationBackend,
    config: &OverviewConfig,
) -> Overview {
    match try_generate_overview(query, documents, backend, config).await {
        Ok(overview) => overview,
        Err(e) => {
            tracing::warn!(backend = backend.name(), error = %e, "overview generation failed");
            Overview {
                text: OVERVIEW_ERROR_TEXT.to_string(),
                citations: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed reply and remembers the prompt it was given.
    struct ScriptedBackend {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|_| GenerationError::MalformedResponse("scripted failure".to_string()))
        }
    }

    fn doc(name: &str, title: &str, text: &str) -> Document {
        Document {
            name: name.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            href: format!("/local/{}", name),
        }
    }

    fn fruit_corpus() -> Vec<Document> {
        vec![
            doc("text.html", "Fruit", "banana banana"),
            doc("text.txt", "apple banana apple", "apple banana apple"),
        ]
    }

    #[test]
    fn ranks_by_score_descending() {
        let docs = fruit_corpus();
        let ranked = rank_documents(&docs, "apple", 8);
        let names: Vec<&str> = ranked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["text.txt", "text.html"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let docs = vec![
            doc("c.txt", "c", "zzz"),
            doc("a.txt", "a", "yyy"),
            doc("b.txt", "b", "xxx"),
        ];
        let ranked = rank_documents(&docs, "a is to", 8);
        let names: Vec<&str> = ranked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["c.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn rank_limits_to_k() {
        let docs: Vec<Document> = (0..12)
            .map(|i| doc(&format!("{}.txt", i), "t", &"word ".repeat(i)))
            .collect();
        let ranked = rank_documents(&docs, "word", 8);
        assert_eq!(ranked.len(), 8);
        assert_eq!(ranked[0].name, "11.txt");
        assert_eq!(ranked[7].name, "4.txt");
    }

    #[test]
    fn truncate_long_text() {
        let text = "a".repeat(5000);
        let out = truncate(&text, 3000);
        assert_eq!(out.chars().count(), 3001);
        assert!(out.ends_with(ELLIPSIS));
        assert_eq!(out.trim_end_matches(ELLIPSIS).len(), 3000);
    }

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate("0123456789", 3000), "0123456789");
    }

    #[test]
    fn truncate_exact_limit_unchanged() {
        let text = "b".repeat(3000);
        assert_eq!(truncate(&text, 3000), text);
    }

    #[test]
    fn truncate_normalizes_whitespace() {
        assert_eq!(truncate("  one\n\n two\t three  ", 3000), "one two three");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        let out = truncate("ééééé", 3);
        assert_eq!(out, "ééé…");
    }

    #[test]
    fn ensure_citation_appends_once() {
        assert_eq!(ensure_citation("No markers here."), "No markers here. [1]");
        assert_eq!(ensure_citation("  padded  "), "padded [1]");
        assert_eq!(ensure_citation(""), " [1]");
    }

    #[test]
    fn ensure_citation_keeps_cited_text() {
        assert_eq!(ensure_citation("Cited [2][5]."), "Cited [2][5].");
        assert_eq!(ensure_citation("Out of range [42]"), "Out of range [42]");
    }

    #[test]
    fn ensure_citation_ignores_non_numeric_brackets() {
        assert_eq!(ensure_citation("See [a] and []"), "See [a] and [] [1]");
    }

    #[test]
    fn sources_fall_back_to_name_then_index() {
        let untitled = doc("page.md", "", "body");
        let anonymous = Document {
            name: String::new(),
            title: String::new(),
            text: "body".to_string(),
            href: String::new(),
        };
        let (blocks, citations) = build_sources(&[&untitled, &anonymous], 3000);
        assert_eq!(citations[0].title, "page.md");
        assert_eq!(citations[1].title, "Source 2");
        assert_eq!(citations[1].href, "");
        assert_eq!(blocks[0], "[1] page.md\nbody");
    }

    #[test]
    fn prompt_layout() {
        let docs = fruit_corpus();
        let ranked = rank_documents(&docs, "apple", 8);
        let (blocks, _) = build_sources(&ranked, 3000);
        let prompt = build_prompt("apple", &blocks);

        assert!(prompt.starts_with("QUERY:\napple\n\nSOURCES:\n[1] apple banana apple\n"));
        assert!(prompt.contains("\n\n[2] Fruit\nbanana banana\n\nINSTRUCTIONS:\n"));
        assert!(prompt.contains("Use ONLY the provided sources."));
        assert!(prompt.contains("like [1] or [2][5]"));
        assert!(prompt.ends_with("End with the overview only.\n\n"));
    }

    #[tokio::test]
    async fn end_to_end_fruit_corpus() {
        let docs = vec![
            doc("text.txt", "apple banana apple", "apple banana apple"),
            doc("text.html", "Fruit", "banana banana"),
        ];
        let backend = ScriptedBackend::replying("Apples appear twice [1].");
        let overview =
            generate_overview("apple", &docs, &backend, &OverviewConfig::default()).await;

        assert_eq!(overview.text, "Apples appear twice [1].");
        assert_eq!(
            overview.citations,
            vec![
                Citation {
                    index: 1,
                    title: "apple banana apple".to_string(),
                    href: "/local/text.txt".to_string(),
                },
                Citation {
                    index: 2,
                    title: "Fruit".to_string(),
                    href: "/local/text.html".to_string(),
                },
            ]
        );
        assert!(backend.last_prompt().contains("[1] apple banana apple"));
    }

    #[tokio::test]
    async fn uncited_reply_gets_marker() {
        let backend = ScriptedBackend::replying("Plain answer without sources.\n");
        let overview =
            generate_overview("apple", &fruit_corpus(), &backend, &OverviewConfig::default())
                .await;
        assert_eq!(overview.text, "Plain answer without sources. [1]");
        assert_eq!(overview.citations.len(), 2);
    }

    #[tokio::test]
    async fn backend_failure_degrades() {
        let backend = ScriptedBackend::failing();
        let overview =
            generate_overview("apple", &fruit_corpus(), &backend, &OverviewConfig::default())
                .await;
        assert_eq!(overview.text, OVERVIEW_ERROR_TEXT);
        assert!(overview.citations.is_empty());
    }

    #[tokio::test]
    async fn try_generate_surfaces_error() {
        let backend = ScriptedBackend::failing();
        let result =
            try_generate_overview("apple", &fruit_corpus(), &backend, &OverviewConfig::default())
                .await;
        assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn empty_corpus_still_calls_backend() {
        let backend = ScriptedBackend::replying("Nothing found.");
        let overview = generate_overview("apple", &[], &backend, &OverviewConfig::default()).await;
        assert_eq!(overview.text, "Nothing found. [1]");
        assert!(overview.citations.is_empty());
        assert!(backend.last_prompt().contains("SOURCES:\n\n\nINSTRUCTIONS:"));
    }

    #[tokio::test]
    async fn source_limit_comes_from_config() {
        let docs = vec![doc("long.txt", "Long", &"apple ".repeat(100))];
        let backend = ScriptedBackend::replying("ok [1]");
        let config = OverviewConfig {
            max_sources: 8,
            source_char_limit: 10,
        };
        generate_overview("apple", &docs, &backend, &config).await;
        assert!(backend.last_prompt().contains("[1] Long\napple appl…\n"));
    }
}
