use crate::traits::DocumentSource;
use crate::{IngestError, IngestionOptions, SourceDocument};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const URL_HEADER: &str = "URL:";

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Matching files in sorted order, plus entries the walk could not read.
#[derive(Debug, Default)]
pub struct DiscoveredFiles {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<SkippedDocument>,
}

pub fn discover_documents(folder: &Path, extensions: &[String], excluded: &[String]) -> DiscoveredFiles {
    let mut discovered = DiscoveredFiles::default();

    for item in WalkDir::new(folder)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
    {
        let entry = match item {
            Ok(entry) => entry,
            Err(error) => {
                discovered.unreadable.push(SkippedDocument {
                    path: error.path().unwrap_or(folder).to_path_buf(),
                    reason: error.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let is_excluded = entry
            .file_name()
            .to_str()
            .is_some_and(|name| excluded.iter().any(|skip| skip == name));
        if is_excluded {
            continue;
        }

        let has_extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)));

        if has_extension {
            discovered.files.push(entry.path().to_path_buf());
        }
    }

    discovered.files.sort_unstable();
    discovered
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Splits a leading `URL: <url>` line off scraped page text.
pub fn split_url_header(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim_start_matches('\u{feff}');
    let (first_line, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));

    match first_line.trim().strip_prefix(URL_HEADER) {
        Some(url) if !url.trim().is_empty() => {
            (Some(url.trim().to_string()), rest.trim_start().to_string())
        }
        _ => (None, trimmed.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<SourceDocument>,
    pub skipped_files: Vec<SkippedDocument>,
}

pub fn load_documents_best_effort(
    folder: &Path,
    options: &IngestionOptions,
    excluded: &[String],
) -> Result<IngestionReport, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::FolderNotFound(folder.display().to_string()));
    }

    let discovered = discover_documents(folder, &options.extensions, excluded);
    let mut documents = Vec::new();
    let mut skipped_files = discovered.unreadable;

    for path in discovered.files {
        let bytes = fs::read(&path)?;
        let checksum = digest_bytes(&bytes);

        let raw = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(error) => {
                skipped_files.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let (source_url, text) = split_url_header(&raw);
        if text.trim().is_empty() {
            skipped_files.push(SkippedDocument {
                path,
                reason: "document has no text".to_string(),
            });
            continue;
        }

        documents.push(build_source_document(folder, &path, source_url, text, checksum)?);
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}

fn build_source_document(
    folder: &Path,
    path: &Path,
    source_url: Option<String>,
    text: String,
    checksum: String,
) -> Result<SourceDocument, IngestError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::InvalidArgument(format!("path missing filename: {}", path.display()))
        })?
        .to_string();

    let relative_path = path
        .strip_prefix(folder)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");

    Ok(SourceDocument {
        document_id: digest_bytes(relative_path.as_bytes()),
        file_name,
        relative_path,
        source_url,
        checksum,
        loaded_at: Utc::now(),
        text,
    })
}

/// Reads every readable document of a corpus folder from disk.
#[derive(Debug, Clone, Default)]
pub struct FolderSource {
    options: IngestionOptions,
    excluded: Vec<String>,
}

impl FolderSource {
    pub fn new(options: IngestionOptions) -> Self {
        Self {
            options,
            excluded: Vec::new(),
        }
    }

    pub fn excluding(mut self, file_name: impl Into<String>) -> Self {
        self.excluded.push(file_name.into());
        self
    }
}

impl DocumentSource for FolderSource {
    fn load(&self, folder: &Path) -> Result<Vec<SourceDocument>, IngestError> {
        let report = load_documents_best_effort(folder, &self.options, &self.excluded)?;

        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
        }

        if report.documents.is_empty() {
            return Err(IngestError::EmptyCorpus(folder.display().to_string()));
        }

        debug!(
            folder = %folder.display(),
            documents = report.documents.len(),
            skipped = report.skipped_files.len(),
            "loaded corpus documents"
        );
        Ok(report.documents)
    }
}
