//! Document Sources
//!
//! Reads raw schema documents from a directory tree or a `.tar.gz` bundle with
//! the same layout. Files are read in file-name order so a reload of unchanged
//! documents yields the same snapshot.

use crate::error::{RegistryError, Result};
use crate::registry::document::DocumentFormat;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Namespace for tables that merge data across platforms
pub const CONSOLIDATED: &str = "consolidated";

/// One unparsed schema document.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub namespace: String,
    pub origin: String,
    pub format: DocumentFormat,
    pub content: String,
}

impl RawDocument {
    pub fn yaml(namespace: &str, origin: &str, content: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            origin: origin.to_string(),
            format: DocumentFormat::Yaml,
            content: content.to_string(),
        }
    }
}

/// A document that never made it into a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    pub origin: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct SourceContents {
    pub documents: Vec<RawDocument>,
    pub unreadable: Vec<SkippedDocument>,
}

impl SourceContents {
    /// SHA256 over every document's origin and bytes, in read order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for doc in &self.documents {
            hasher.update(doc.origin.as_bytes());
            hasher.update([0u8]);
            hasher.update(doc.content.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Where schema documents are loaded from.
///
/// Layout for both directories and archives:
/// ```text
/// {root}/
///   ├── shopify/orders.yaml
///   ├── amazon/orders.yaml
///   └── consolidated/orders.yaml
/// ```
/// An archive may wrap the tree in a top-level `schemas/` directory.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Directory(PathBuf),
    Archive(PathBuf),
    Inline(Vec<RawDocument>),
}

impl DocumentSource {
    pub fn read_documents(&self, platforms: &[String]) -> Result<SourceContents> {
        match self {
            DocumentSource::Directory(root) => read_tree(root, platforms),
            DocumentSource::Archive(path) => read_archive(path, platforms),
            DocumentSource::Inline(documents) => Ok(SourceContents {
                documents: documents.clone(),
                unreadable: Vec::new(),
            }),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DocumentSource::Directory(root) => format!("directory {}", root.display()),
            DocumentSource::Archive(path) => format!("archive {}", path.display()),
            DocumentSource::Inline(docs) => format!("{} inline documents", docs.len()),
        }
    }
}

fn read_tree(root: &Path, platforms: &[String]) -> Result<SourceContents> {
    if !root.is_dir() {
        return Err(RegistryError::SourceUnreadable {
            cause: format!("schema directory {} does not exist", root.display()),
        });
    }

    let mut contents = SourceContents::default();

    let namespaces = platforms
        .iter()
        .map(String::as_str)
        .filter(|p| *p != CONSOLIDATED)
        .chain(std::iter::once(CONSOLIDATED));

    for namespace in namespaces {
        let dir = root.join(namespace);
        if !dir.is_dir() {
            debug!("No schema directory for namespace '{}'", namespace);
            continue;
        }

        for path in list_document_files(&dir)? {
            let origin = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .display()
                .to_string();

            let Some(format) = DocumentFormat::from_path(&path) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(content) => contents.documents.push(RawDocument {
                    namespace: namespace.to_string(),
                    origin,
                    format,
                    content,
                }),
                Err(e) => {
                    warn!("Failed to read schema document {}: {}", origin, e);
                    contents.unreadable.push(SkippedDocument {
                        origin,
                        reason: format!("unreadable: {}", e),
                    });
                }
            }
        }
    }

    info!(
        "Read {} schema documents from {}",
        contents.documents.len(),
        root.display()
    );

    Ok(contents)
}

fn list_document_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for entry in fs::read_dir(dir).map_err(|e| RegistryError::SourceUnreadable {
        cause: format!("Failed to read directory {:?}: {}", dir, e),
    })? {
        let entry = entry.map_err(|e| RegistryError::SourceUnreadable {
            cause: format!("Failed to read directory entry: {}", e),
        })?;

        let path = entry.path();
        if path.is_file() && DocumentFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| {
        a.file_name()
            .unwrap_or_default()
            .cmp(b.file_name().unwrap_or_default())
    });

    Ok(files)
}

fn read_archive(path: &Path, platforms: &[String]) -> Result<SourceContents> {
    let data = fs::read(path).map_err(|e| RegistryError::SourceUnreadable {
        cause: format!("Failed to read archive {}: {}", path.display(), e),
    })?;

    let temp_dir = TempDir::new().map_err(|e| RegistryError::SourceUnreadable {
        cause: format!("Failed to create temp directory: {}", e),
    })?;

    let mut archive = Archive::new(GzDecoder::new(data.as_slice()));
    archive
        .unpack(temp_dir.path())
        .map_err(|e| RegistryError::SourceUnreadable {
            cause: format!("Failed to extract {}: {}", path.display(), e),
        })?;

    debug!("Extracted schema archive {} to {:?}", path.display(), temp_dir.path());

    let nested = temp_dir.path().join("schemas");
    let root = if nested.is_dir() {
        nested
    } else {
        temp_dir.path().to_path_buf()
    };

    // temp_dir lives until the tree has been read
    read_tree(&root, platforms)
}
