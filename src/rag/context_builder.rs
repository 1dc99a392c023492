//! RAG Context Builder.
//!
//! Serializes snippets into the context block sent with the question:
//! one `[Source i: title (type)]` header per snippet followed by its text,
//! blocks joined by a `---` separator line. The output depends only on the
//! snippet list, so a generated answer can be traced back to the exact
//! context it was given.

use serde::Serialize;

use super::snippets::Snippet;

pub const BLOCK_SEPARATOR: &str = "\n---\n";

/// What the pipeline reports back as "sources used".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub title: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// Build the context string from snippets, 1-based source numbering.
pub fn compose(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| {
            format!(
                "[Source {}: {} ({})]\n{}\n",
                i + 1,
                snippet.source_title,
                snippet.source_type,
                snippet.text
            )
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// Sources in the order they appear in the composed context.
pub fn sources(snippets: &[Snippet]) -> Vec<SourceRef> {
    snippets
        .iter()
        .map(|s| SourceRef {
            title: s.source_title.clone(),
            content_type: s.source_type.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_snippet(title: &str, kind: &str, text: &str) -> Snippet {
        Snippet {
            source_title: title.to_string(),
            source_type: kind.to_string(),
            text: text.to_string(),
            relevance: 0.8,
        }
    }

    #[test]
    fn test_compose_format() {
        let snippets = vec![
            make_snippet("Finding Purpose", "Article", "Purpose begins with..."),
            make_snippet("Calling", "Video", "A calling is..."),
        ];
        let context = compose(&snippets);
        assert_eq!(
            context,
            "[Source 1: Finding Purpose (Article)]\nPurpose begins with...\n\n---\n[Source 2: Calling (Video)]\nA calling is...\n"
        );
    }

    #[test]
    fn test_compose_is_deterministic() {
        let snippets = vec![
            make_snippet("A", "Article", "alpha"),
            make_snippet("B", "Book", "beta"),
        ];
        let first = compose(&snippets);
        let second = compose(&snippets);
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_compose_empty() {
        assert_eq!(compose(&[]), "");
    }

    #[test]
    fn test_sources_follow_context_order() {
        let snippets = vec![
            make_snippet("A", "Article", "alpha"),
            make_snippet("B", "Book", "beta"),
        ];
        let refs = sources(&snippets);
        assert_eq!(refs[0].title, "A");
        assert_eq!(refs[1].content_type, "Book");
    }
}
