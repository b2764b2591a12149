//! Document and page types
//!
//! Documents are owned by an external document store and are immutable once
//! ingested. The engine only reads their metadata and asks the store to
//! resolve page images.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Source format of an ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Image,
    #[default]
    Other,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => write!(f, "pdf"),
            DocumentFormat::Image => write!(f, "image"),
            DocumentFormat::Other => write!(f, "other"),
        }
    }
}

/// A single rasterized page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based position within the document
    pub index: u32,

    /// Opaque image reference, resolved by the document store
    pub image_ref: String,

    /// Cached textual summary of the page, if the store has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Page {
    pub fn new(index: u32, image_ref: impl Into<String>) -> Self {
        Self {
            index,
            image_ref: image_ref.into(),
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// A multi-page document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub pages: Vec<Page>,
    #[serde(default)]
    pub format: DocumentFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pages,
            format: DocumentFormat::default(),
            summary: None,
        }
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Total pages in the document
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up a page by its 1-based index
    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.index == index)
    }

    pub fn has_page(&self, index: u32) -> bool {
        self.page(index).is_some()
    }
}

/// A resolved page image, ready to hand to a vision model
#[derive(Debug, Clone, PartialEq)]
pub enum ImageHandle {
    /// Image file on local disk
    Path(PathBuf),
    /// Encoded image bytes held in memory
    Bytes {
        media_type: String,
        data: Arc<Vec<u8>>,
    },
    /// Remote image the provider can fetch itself
    Url(String),
}

impl ImageHandle {
    pub fn bytes(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        ImageHandle::Bytes {
            media_type: media_type.into(),
            data: Arc::new(data),
        }
    }
}
