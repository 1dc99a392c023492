//! Projects search results into length-bounded snippets for prompting.

use serde::Serialize;

use crate::search::SearchResult;

/// A bounded excerpt of one search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub source_title: String,
    pub source_type: String,
    pub text: String,
    pub relevance: f64,
}

/// Takes the first `max_snippets` results as given (ranking is the search
/// client's job) and cuts each text to `max_chars_per_snippet` characters.
/// The cut is a plain character slice and may land mid-word.
pub fn extract(results: &[SearchResult], max_snippets: usize, max_chars_per_snippet: usize) -> Vec<Snippet> {
    results
        .iter()
        .take(max_snippets)
        .map(|result| Snippet {
            source_title: result.title.clone(),
            source_type: result.content_type.clone(),
            text: truncate_chars(&result.snippet_text, max_chars_per_snippet),
            relevance: result.certainty,
        })
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(i: usize, text: String) -> SearchResult {
        SearchResult {
            id: format!("id-{}", i),
            title: format!("Title {}", i),
            content_type: "Article".to_string(),
            authors: vec![],
            snippet_text: text,
            certainty: 1.0 - i as f64 / 10.0,
        }
    }

    #[test]
    fn bounds_count_and_length_in_order() {
        let results: Vec<SearchResult> = (0..8).map(|i| result(i, "x".repeat(500))).collect();
        let snippets = extract(&results, 5, 350);
        assert_eq!(snippets.len(), 5);
        for (i, snippet) in snippets.iter().enumerate() {
            assert_eq!(snippet.text.chars().count(), 350);
            assert_eq!(snippet.source_title, format!("Title {}", i));
        }
    }

    #[test]
    fn short_text_untouched_and_empty_allowed() {
        let results = vec![result(0, "short".to_string()), result(1, String::new())];
        let snippets = extract(&results, 5, 350);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].text, "short");
        assert_eq!(snippets[1].text, "");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let results = vec![result(0, "äöü€abc".to_string())];
        let snippets = extract(&results, 1, 4);
        assert_eq!(snippets[0].text, "äöü€");
    }

    #[test]
    fn truncation_may_cut_mid_word() {
        let results = vec![result(0, "understanding purpose".to_string())];
        assert_eq!(extract(&results, 1, 5)[0].text, "under");
    }

    #[test]
    fn zero_snippets_requested() {
        let results = vec![result(0, "text".to_string())];
        assert!(extract(&results, 0, 10).is_empty());
    }
}
