use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    walker::{self, DiscoveredFile, FileKind},
};

/// Raw text of one loaded document, e.g. a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    /// Where the text came from, e.g. `guide.pdf#page=3`.
    pub origin: String,
}

impl Document {
    pub fn new(content: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: origin.into(),
        }
    }
}

/// Supplies the ordered documents for one ingestion run.
pub trait DocumentSource {
    fn load(&self) -> Result<Vec<Document>>;
}

impl DocumentSource for Vec<Document> {
    fn load(&self) -> Result<Vec<Document>> {
        Ok(self.clone())
    }
}

/// Loads every supported file under a directory.
///
/// PDFs contribute one document per page, text and markdown files one
/// document each. Order follows the sorted relative paths, then page order.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentSource for DirectoryLoader {
    fn load(&self) -> Result<Vec<Document>> {
        tracing::info!(root = %self.root.display(), "loading documents");

        let files = walker::discover_files(&self.root).map_err(|e| Error::Load {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;

        // Read files in parallel; collect keeps the walk order.
        let per_file: Vec<Vec<Document>> = files
            .par_iter()
            .map(load_file)
            .collect::<Result<_>>()?;
        let documents: Vec<Document> = per_file.into_iter().flatten().collect();

        tracing::info!(
            files = files.len(),
            documents = documents.len(),
            "documents loaded"
        );
        Ok(documents)
    }
}

fn load_file(file: &DiscoveredFile) -> Result<Vec<Document>> {
    let label = file.relative_path.to_string_lossy();
    match file.kind {
        FileKind::Text => {
            let content =
                std::fs::read_to_string(&file.absolute_path).map_err(|e| {
                    Error::Load {
                        path: file.absolute_path.clone(),
                        reason: e.to_string(),
                    }
                })?;
            Ok(vec![Document::new(content, label)])
        }
        FileKind::Pdf => {
            let pages = extract_pdf_pages(&file.absolute_path)?;
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    Document::new(text, format!("{label}#page={}", i + 1))
                })
                .collect())
        }
    }
}

fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let mut pdf = pdf_oxide::PdfDocument::open(path)
        .map_err(|e| pdf_error(path, e))?;
    let page_count = pdf.page_count().map_err(|e| pdf_error(path, e))?;

    let mut pages = Vec::with_capacity(page_count);
    for page in 0..page_count {
        pages.push(pdf.extract_text(page).map_err(|e| pdf_error(path, e))?);
    }
    Ok(pages)
}

fn pdf_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
