//! Directory-backed document store
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   annual-report/          document id
//!     document.json         optional manifest
//!     page-001.png
//!     page-002.png
//!   invoice/
//!     scan.jpg
//! ```
//!
//! Pages are the image files of a document directory, sorted by the number
//! in their file name and then by name, and numbered from 1.
//!
//! Loaded documents are cached. `get_documents` always rereads the
//! directories it returns; page lookups reuse the cached listing.

use super::select_documents;
use async_trait::async_trait;
use sdk::errors::DociaError;
use sdk::{Document, DocumentFormat, DocumentStore, ImageHandle, Page};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Optional per-document manifest file
pub const MANIFEST_FILE: &str = "document.json";

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    name: Option<String>,
    summary: Option<String>,
    format: Option<DocumentFormat>,
    #[serde(default)]
    page_summaries: BTreeMap<u32, String>,
}

/// Read-only store over a directory of pre-rasterized documents
#[derive(Debug, Clone)]
pub struct DirectoryDocumentStore {
    root: PathBuf,
    cache: Arc<RwLock<HashMap<String, Document>>>,
}

impl DirectoryDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a document, rejecting ids that would escape the root
    async fn document_dir(&self, id: &str) -> Result<PathBuf, DociaError> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains('/')
            && !id.contains('\\');
        let dir = self.root.join(id);
        if valid && is_dir(&dir).await {
            Ok(dir)
        } else {
            Err(DociaError::DocumentNotFound(id.to_string()))
        }
    }

    /// Load a document from disk and refresh its cache entry
    async fn refresh(&self, id: &str, dir: &Path) -> Result<Document, DociaError> {
        let document = self.load_document(id, dir).await?;
        self.cache
            .write()
            .await
            .insert(id.to_string(), document.clone());
        Ok(document)
    }

    /// Cached document, loaded from disk on first use
    async fn cached(&self, id: &str) -> Result<Document, DociaError> {
        if let Some(document) = self.cache.read().await.get(id) {
            return Ok(document.clone());
        }
        let dir = self.document_dir(id).await?;
        self.refresh(id, &dir).await
    }

    async fn load_document(&self, id: &str, dir: &Path) -> Result<Document, DociaError> {
        let manifest = read_manifest(dir).await?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_image(&path) {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    files.push(name.to_string());
                }
            }
        }
        files.sort_by_key(|name| page_sort_key(name));

        let pages = files
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let index = i as u32 + 1;
                let page = Page::new(index, name);
                match manifest.page_summaries.get(&index) {
                    Some(summary) => page.with_summary(summary.clone()),
                    None => page,
                }
            })
            .collect::<Vec<_>>();

        let mut document = Document::new(
            id,
            manifest.name.clone().unwrap_or_else(|| id.to_string()),
            pages,
        )
        .with_format(manifest.format.unwrap_or_default());
        if let Some(summary) = manifest.summary {
            document = document.with_summary(summary);
        }
        debug!("Loaded document {} ({} pages)", id, document.page_count());
        Ok(document)
    }

    /// Every document directory with at least one page, sorted by id
    async fn scan(&self) -> Result<Vec<Document>, DociaError> {
        if !is_dir(&self.root).await {
            warn!("Documents directory {} does not exist", self.root.display());
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(id) = path.file_name().and_then(|s| s.to_str()) {
                if !id.starts_with('.') {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            let dir = self.root.join(&id);
            let document = self.refresh(&id, &dir).await?;
            if document.page_count() > 0 {
                documents.push(document);
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for DirectoryDocumentStore {
    async fn get_documents(&self, ids: Option<&[String]>) -> Result<Vec<Document>, DociaError> {
        match ids {
            None => self.scan().await,
            Some(ids) => {
                let mut documents = Vec::with_capacity(ids.len());
                for id in ids {
                    let dir = self.document_dir(id).await?;
                    documents.push(self.refresh(id, &dir).await?);
                }
                select_documents(&documents, Some(ids))
            }
        }
    }

    async fn get_page_image(
        &self,
        document_id: &str,
        page: u32,
    ) -> Result<ImageHandle, DociaError> {
        let document = self.cached(document_id).await?;
        let entry = document
            .page(page)
            .ok_or_else(|| DociaError::PageNotFound {
                document_id: document_id.to_string(),
                page,
            })?;
        Ok(ImageHandle::Path(
            self.root.join(document_id).join(&entry.image_ref),
        ))
    }
}

async fn read_manifest(dir: &Path) -> Result<Manifest, DociaError> {
    let path = dir.join(MANIFEST_FILE);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Manifest::default()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&contents).map_err(|e| {
        DociaError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {}", path.display(), e),
        ))
    })
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Last run of digits in the file stem, so `page-10` sorts after `page-9`
fn page_sort_key(name: &str) -> (u64, String) {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (digits.parse().unwrap_or(u64::MAX), name.to_string())
}
