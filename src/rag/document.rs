//! Source document loading.
//!
//! PDFs go through `pdf-extract`, which separates pages with form feeds.
//! Anything else is read as UTF-8 text and split on form feeds the same way.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::core::errors::RagError;

/// Separator placed between pages when the document is flattened to text.
pub const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct Document {
    pub source: PathBuf,
    pub pages: Vec<String>,
}

impl Document {
    pub fn from_pages(source: impl Into<PathBuf>, pages: Vec<String>) -> Self {
        Self {
            source: source.into(),
            pages,
        }
    }

    /// Full text: pages joined by [`PAGE_SEPARATOR`].
    pub fn text(&self) -> String {
        self.pages.join(PAGE_SEPARATOR)
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|page| page.trim().is_empty())
    }

    /// Character offset at which each page starts within [`Document::text`].
    pub fn page_offsets(&self) -> Vec<usize> {
        let separator_len = PAGE_SEPARATOR.chars().count();
        let mut offsets = Vec::with_capacity(self.pages.len());
        let mut offset = 0;
        for page in &self.pages {
            offsets.push(offset);
            offset += page.chars().count() + separator_len;
        }
        offsets
    }
}

pub fn load_document(path: &Path) -> Result<Document, RagError> {
    if !path.exists() {
        return Err(RagError::DocumentLoad(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let bytes = fs::read(path)
        .map_err(|e| RagError::DocumentLoad(format!("{}: {}", path.display(), e)))?;

    let text = if is_pdf(path, &bytes) {
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| RagError::DocumentLoad(format!("{}: {}", path.display(), e)))?
    } else {
        String::from_utf8(bytes).map_err(|_| {
            RagError::DocumentLoad(format!("{}: not valid UTF-8 text", path.display()))
        })?
    };

    let pages: Vec<String> = text
        .split('\x0C')
        .map(|page| page.trim_end().to_string())
        .collect();
    let document = Document::from_pages(path, pages);

    if document.is_blank() {
        return Err(RagError::DocumentEmpty(path.display().to_string()));
    }

    tracing::info!(
        "Loaded {} ({} pages)",
        path.display(),
        document.pages.len()
    );
    Ok(document)
}

fn is_pdf(path: &Path, bytes: &[u8]) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    by_extension || bytes.starts_with(b"%PDF")
}

/// Hex SHA-256 of the file at `path`, used to notice a changed source.
pub fn file_sha256(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    Some(hex::encode(Sha256::digest(&bytes)))
}
