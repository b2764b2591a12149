//! Page Selector
//!
//! Picks the pages a task should look at. Selection is a pure function of the
//! task, the in-scope document metadata and the pages chosen by the previous
//! iteration, so identical inputs always yield identical pages.
//!
//! Signals, strongest first:
//! 1. key-term overlap with the page's cached summary
//! 2. key-term overlap with the document name and summary, at half weight,
//!    for pages without a summary of their own
//! 3. a small bonus for pages the previous iteration already looked at

use crate::conductor::types::{PageRef, Task};
use sdk::Document;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// Pages must score strictly above this to be ranked
pub const RELEVANCE_FLOOR: f64 = 0.0;

/// Added to pages selected in the previous iteration
pub const PRIOR_PAGE_BONUS: f64 = 0.1;

/// Weight of document-level matches for pages without a summary
const DOCUMENT_MATCH_WEIGHT: f64 = 0.5;

const MIN_TERM_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "all", "also", "and", "any", "are", "been", "being", "but", "can", "could", "did",
    "does", "each", "extract", "find", "for", "from", "get", "had", "has", "have", "her", "his",
    "how", "into", "its", "locate", "not", "our", "out", "retrieve", "should", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "those", "was", "were",
    "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would", "you",
    "your",
];

/// Lowercase alphanumeric words of `text` usable as search terms
///
/// Words shorter than three characters and stop-words are dropped.
/// Duplicates collapse, first occurrence order is kept.
pub fn key_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .filter(|w| w.len() >= MIN_TERM_LEN && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Fraction of `terms` present in `text`
pub fn term_coverage(terms: &[String], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let words: HashSet<String> = tokenize(text).collect();
    let hits = terms.iter().filter(|t| words.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

struct Candidate {
    page: PageRef,
    score: f64,
    doc_position: usize,
}

/// Choose at most `max_pages` pages for `task`
///
/// Candidates come from the hinted document when it is in scope and has
/// pages, otherwise from every document in `documents`. The result is in reading order and is
/// never empty while a candidate document has pages.
pub fn select_pages(
    task: &Task,
    documents: &[Document],
    max_pages: usize,
    prior_pages: &[PageRef],
) -> Vec<PageRef> {
    let cap = max_pages.max(1);
    let candidates: Vec<&Document> = match task
        .document_hint
        .as_deref()
        .and_then(|hint| documents.iter().find(|d| d.id == hint))
        .filter(|doc| !doc.pages.is_empty())
    {
        Some(doc) => vec![doc],
        None => documents.iter().collect(),
    };

    let terms = key_terms(&format!("{} {}", task.label, task.description));
    let prior: HashSet<&PageRef> = prior_pages.iter().collect();

    let mut scored: Vec<Candidate> = Vec::new();
    for (doc_position, doc) in candidates.iter().enumerate() {
        let doc_text = format!("{} {}", doc.name, doc.summary.as_deref().unwrap_or_default());
        let doc_score = DOCUMENT_MATCH_WEIGHT * term_coverage(&terms, &doc_text);

        for page in &doc.pages {
            let page_ref = PageRef::new(&doc.id, page.index);
            let mut score = match page.summary.as_deref() {
                Some(summary) => term_coverage(&terms, summary),
                None => doc_score,
            };
            if prior.contains(&page_ref) {
                score += PRIOR_PAGE_BONUS;
            }
            if score > RELEVANCE_FLOOR {
                scored.push(Candidate {
                    page: page_ref,
                    score,
                    doc_position,
                });
            }
        }
    }

    if scored.is_empty() {
        let fallback = fallback_pages(&candidates, cap);
        tracing::debug!(
            "No page scored for task '{}', falling back to {} leading pages",
            task.label,
            fallback.len()
        );
        return fallback;
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.doc_position.cmp(&b.doc_position))
            .then(a.page.page.cmp(&b.page.page))
    });

    let mut seen = BTreeSet::new();
    let mut chosen: Vec<(usize, PageRef)> = Vec::with_capacity(cap);
    for candidate in scored {
        if chosen.len() >= cap {
            break;
        }
        if seen.insert(candidate.page.clone()) {
            chosen.push((candidate.doc_position, candidate.page));
        }
    }

    // Reading order: document position, then page index
    chosen.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.page.cmp(&b.1.page)));
    chosen.into_iter().map(|(_, page)| page).collect()
}

/// First `cap` pages of the first candidate document that has any
fn fallback_pages(candidates: &[&Document], cap: usize) -> Vec<PageRef> {
    candidates
        .iter()
        .find(|d| !d.pages.is_empty())
        .map(|doc| {
            let mut indices: Vec<u32> = doc.pages.iter().map(|p| p.index).collect();
            indices.sort_unstable();
            indices.dedup();
            indices
                .into_iter()
                .take(cap)
                .map(|i| PageRef::new(&doc.id, i))
                .collect()
        })
        .unwrap_or_default()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::conductor::types::TaskKind;
    use proptest::prelude::*;
    use sdk::Page;

    fn documents(page_counts: &[u32], summaries: &[String]) -> Vec<Document> {
        page_counts
            .iter()
            .enumerate()
            .map(|(d, &count)| {
                let pages = (1..=count)
                    .map(|i| {
                        let page = Page::new(i, format!("{}_{}", d, i));
                        match summaries.get((d + i as usize) % summaries.len().max(1)) {
                            Some(s) if i % 2 == 0 => page.with_summary(s.clone()),
                            _ => page,
                        }
                    })
                    .collect();
                Document::new(format!("doc_{}", d), format!("Document {}", d), pages)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn selection_is_subset_capped_and_nonempty(
            page_counts in proptest::collection::vec(0u32..15, 1..4),
            summaries in proptest::collection::vec("[a-z ]{0,30}", 0..5),
            description in "[a-z ]{0,40}",
            hint in proptest::option::of(0usize..5),
            max_pages in 1usize..8,
        ) {
            let docs = documents(&page_counts, &summaries);
            let mut t = Task::new("t", "task", description, TaskKind::Generic);
            if let Some(h) = hint {
                t = t.with_document_hint(format!("doc_{}", h));
            }
            let pages = select_pages(&t, &docs, max_pages, &[]);

            prop_assert!(pages.len() <= max_pages);
            for p in &pages {
                let doc = docs.iter().find(|d| d.id == p.document_id);
                prop_assert!(doc.map(|d| d.has_page(p.page)).unwrap_or(false));
            }

            let unique: BTreeSet<_> = pages.iter().collect();
            prop_assert_eq!(unique.len(), pages.len());

            let any_pages = docs.iter().any(|d| !d.pages.is_empty());
            prop_assert_eq!(!pages.is_empty(), any_pages);

            // deterministic
            prop_assert_eq!(select_pages(&t, &docs, max_pages, &[]), pages);
        }
    }
}
