//! Document Stores
//!
//! `DocumentStore` implementations the engine ships with. Ingestion
//! (PDF decoding, rasterization) happens elsewhere; these stores only read
//! documents that already exist as page images.

pub mod directory;
pub mod memory;

pub use directory::DirectoryDocumentStore;
pub use memory::InMemoryDocumentStore;

use sdk::errors::DociaError;
use sdk::Document;

/// Pick documents by id, keeping the order of `ids`
///
/// Repeated ids are returned once. `None` returns every document.
pub(crate) fn select_documents(
    all: &[Document],
    ids: Option<&[String]>,
) -> Result<Vec<Document>, DociaError> {
    let Some(ids) = ids else {
        return Ok(all.to_vec());
    };

    let mut selected: Vec<Document> = Vec::with_capacity(ids.len());
    for id in ids {
        if selected.iter().any(|d| &d.id == id) {
            continue;
        }
        let doc = all
            .iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| DociaError::DocumentNotFound(id.clone()))?;
        selected.push(doc.clone());
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::Page;

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a", "A", vec![Page::new(1, "a1.png")]),
            Document::new("b", "B", vec![Page::new(1, "b1.png")]),
        ]
    }

    #[test]
    fn test_select_all_and_by_id() {
        assert_eq!(select_documents(&docs(), None).unwrap().len(), 2);

        let ids = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let picked = select_documents(&docs(), Some(&ids)).unwrap();
        let order: Vec<&str> = picked.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_unknown_id_fails() {
        let ids = vec!["zzz".to_string()];
        let err = select_documents(&docs(), Some(&ids)).unwrap_err();
        assert!(matches!(err, DociaError::DocumentNotFound(id) if id == "zzz"));
    }
}
