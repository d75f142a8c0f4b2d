//! Document loading from a directory of PDFs.
//!
//! [`PdfDirectory`] walks the configured root, extracts text from every file
//! matching `**/*.pdf`, and returns one [`Document`] per readable file. The
//! [`DocumentSource`] trait is the seam the service rebuilds from, so other
//! sources (or fixed corpora in tests) can stand in for the filesystem.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::{Error, Result};
use crate::extract::{extract_text, MIME_PDF};
use crate::models::Document;

/// Produces the full corpus for one index build.
///
/// Called from a blocking thread; implementations may do synchronous I/O.
pub trait DocumentSource: Send + Sync {
    /// Human-readable location, used in logs and error messages.
    fn describe(&self) -> String;

    /// Load every document, sorted by source identifier.
    fn load(&self) -> Result<Vec<Document>>;
}

/// A directory tree of PDF files.
#[derive(Debug, Clone)]
pub struct PdfDirectory {
    root: PathBuf,
    exclude_globs: Vec<String>,
    follow_symlinks: bool,
}

impl PdfDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    pub fn from_config(config: &DocumentsConfig) -> Self {
        Self {
            root: config.root.clone(),
            exclude_globs: config.exclude_globs.clone(),
            follow_symlinks: config.follow_symlinks,
        }
    }
}

impl DocumentSource for PdfDirectory {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn load(&self) -> Result<Vec<Document>> {
        let root = &self.root;
        if !root.is_dir() {
            return Err(Error::Documents(format!(
                "document directory does not exist: {}",
                root.display()
            )));
        }

        let include_set = build_globset(&["**/*.pdf".to_string()])?;
        let exclude_set = build_globset(&self.exclude_globs)?;

        let mut documents = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(root).follow_links(self.follow_symlinks) {
            let entry = entry.map_err(|e| Error::Documents(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let source = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&source) || !include_set.is_match(&source) {
                continue;
            }

            match read_pdf(path, &source) {
                Ok(text) if text.trim().is_empty() => {
                    tracing::warn!(%source, "no extractable text, skipping");
                    skipped += 1;
                }
                Ok(text) => documents.push(Document::new(source, text)),
                Err(err) => {
                    tracing::warn!(%source, error = %err, "skipping unreadable PDF");
                    skipped += 1;
                }
            }
        }

        documents.sort_by(|a, b| a.source.cmp(&b.source));
        tracing::info!(
            root = %root.display(),
            documents = documents.len(),
            skipped,
            "loaded documents"
        );
        Ok(documents)
    }
}

/// Load all PDFs described by `config`.
pub fn load_documents(config: &DocumentsConfig) -> Result<Vec<Document>> {
    PdfDirectory::from_config(config).load()
}

fn read_pdf(path: &Path, source: &str) -> Result<String> {
    let bytes = std::fs::read(path)?;
    extract_text(&bytes, MIME_PDF).map_err(|e| Error::Extract {
        path: source.to_string(),
        message: e.to_string(),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_root_is_documents_error() {
        let dir = TempDir::new().unwrap();
        let source = PdfDirectory::new(dir.path().join("nope"));
        let err = source.load().unwrap_err();
        assert!(matches!(err, Error::Documents(_)));
    }

    #[test]
    fn non_pdf_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain text").unwrap();
        std::fs::write(dir.path().join("readme.md"), "# hi").unwrap();
        let docs = PdfDirectory::new(dir.path()).load().unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn corrupt_pdf_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.pdf"), b"%PDF-1.4 garbage").unwrap();
        let docs = PdfDirectory::new(dir.path()).load().unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn pdf_glob_is_case_insensitive() {
        let set = build_globset(&["**/*.pdf".to_string()]).unwrap();
        assert!(set.is_match("handbook/Rules.PDF"));
        assert!(set.is_match("a.pdf"));
        assert!(!set.is_match("a.pdfx"));
    }

    #[test]
    fn exclude_globs_apply_to_relative_paths() {
        let set = build_globset(&["drafts/**".to_string()]).unwrap();
        assert!(set.is_match("drafts/old.pdf"));
        assert!(!set.is_match("final/new.pdf"));
    }

    #[test]
    fn invalid_glob_is_config_error() {
        let err = build_globset(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
