//! Document store trait
//!
//! Ingestion and storage layout live outside the engine. The engine reads
//! document metadata and resolves page images through this trait only.

use crate::document::{Document, ImageHandle};
use crate::errors::DociaError;
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch documents by id, or every document when `ids` is `None`
    ///
    /// Unknown ids fail with `DociaError::DocumentNotFound`. The returned
    /// order follows `ids` when given.
    async fn get_documents(&self, ids: Option<&[String]>) -> Result<Vec<Document>, DociaError>;

    /// Resolve the image of one page
    async fn get_page_image(&self, document_id: &str, page: u32)
        -> Result<ImageHandle, DociaError>;
}
