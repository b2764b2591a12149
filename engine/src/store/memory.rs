//! In-memory document store

use super::select_documents;
use async_trait::async_trait;
use sdk::errors::DociaError;
use sdk::{Document, DocumentStore, ImageHandle};
use std::collections::HashMap;
use std::path::PathBuf;

/// Documents and page images held in memory
///
/// Pages without a registered image resolve from their `image_ref`: a URL
/// when it looks like one, a file path otherwise.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Vec<Document>,
    images: HashMap<(String, u32), ImageHandle>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. A document with the same id is replaced.
    pub fn with_document(mut self, document: Document) -> Self {
        self.insert(document);
        self
    }

    /// Register the image of one page
    pub fn with_page_image(
        mut self,
        document_id: impl Into<String>,
        page: u32,
        image: ImageHandle,
    ) -> Self {
        self.images.insert((document_id.into(), page), image);
        self
    }

    pub fn insert(&mut self, document: Document) {
        match self.documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => self.documents.push(document),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_documents(&self, ids: Option<&[String]>) -> Result<Vec<Document>, DociaError> {
        select_documents(&self.documents, ids)
    }

    async fn get_page_image(
        &self,
        document_id: &str,
        page: u32,
    ) -> Result<ImageHandle, DociaError> {
        let document = self
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .ok_or_else(|| DociaError::DocumentNotFound(document_id.to_string()))?;
        let entry = document
            .page(page)
            .ok_or_else(|| DociaError::PageNotFound {
                document_id: document_id.to_string(),
                page,
            })?;

        if let Some(image) = self.images.get(&(document_id.to_string(), page)) {
            return Ok(image.clone());
        }
        if entry.image_ref.starts_with("http://") || entry.image_ref.starts_with("https://") {
            Ok(ImageHandle::Url(entry.image_ref.clone()))
        } else {
            Ok(ImageHandle::Path(PathBuf::from(&entry.image_ref)))
        }
    }
}
