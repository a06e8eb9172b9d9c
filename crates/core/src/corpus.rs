use crate::ingest::digest_bytes;
use crate::traits::PageFetcher;
use crate::IngestError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

pub const LOCATION_FILE_NAME: &str = "location_data.json";

/// Metadata written next to the scraped pages of one location folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationData {
    #[serde(rename = "locationName")]
    pub location_name: String,
    #[serde(rename = "folderUUID")]
    pub folder_uuid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrapeStatus {
    Saved,
    AlreadyExists,
    NoContent,
}

impl std::fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Saved => "Saved",
            Self::AlreadyExists => "Already exists",
            Self::NoContent => "No content",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeOutcome {
    pub url: String,
    pub file: Option<PathBuf>,
    pub status: ScrapeStatus,
}

pub fn parse_folder_id(value: &str) -> Result<Uuid, IngestError> {
    Uuid::parse_str(value.trim())
        .map_err(|err| IngestError::InvalidArgument(format!("folder id {value:?}: {err}")))
}

/// Path of a folder under `data_root`, whether or not it exists yet.
pub fn folder_path(data_root: &Path, folder_id: &str) -> Result<PathBuf, IngestError> {
    let id = parse_folder_id(folder_id)?;
    Ok(data_root.join(id.hyphenated().to_string()))
}

pub fn resolve_folder(data_root: &Path, folder_id: &str) -> Result<PathBuf, IngestError> {
    let path = folder_path(data_root, folder_id)?;
    if !path.is_dir() {
        return Err(IngestError::FolderNotFound(path.display().to_string()));
    }
    Ok(path)
}

pub fn create_location_folder(
    data_root: &Path,
    folder_id: &str,
    location_name: &str,
) -> Result<PathBuf, IngestError> {
    if location_name.trim().is_empty() {
        return Err(IngestError::InvalidArgument(
            "location name must not be empty".to_string(),
        ));
    }

    let path = folder_path(data_root, folder_id)?;
    std::fs::create_dir_all(&path)?;

    let data = LocationData {
        location_name: location_name.trim().to_string(),
        folder_uuid: parse_folder_id(folder_id)?.hyphenated().to_string(),
    };
    std::fs::write(
        path.join(LOCATION_FILE_NAME),
        serde_json::to_vec_pretty(&data)?,
    )?;

    info!(folder = %path.display(), location = %data.location_name, "location folder created");
    Ok(path)
}

pub fn read_location(folder: &Path) -> Result<LocationData, IngestError> {
    let bytes = std::fs::read(folder.join(LOCATION_FILE_NAME))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Stable file name for a scraped page.
pub fn page_file_name(url: &str) -> String {
    format!("{}.txt", digest_bytes(url.as_bytes()))
}

/// Fetches every URL not already stored in `folder` and saves its text as
/// `URL: <url>` followed by a blank line and the page text.
pub async fn save_scraped_pages(
    folder: &Path,
    urls: &[String],
    fetcher: &dyn PageFetcher,
) -> Result<Vec<ScrapeOutcome>, IngestError> {
    tokio::fs::create_dir_all(folder).await?;
    let mut outcomes = Vec::with_capacity(urls.len());

    for raw in urls {
        let url = Url::parse(raw.trim())?.to_string();
        let path = folder.join(page_file_name(&url));

        if tokio::fs::try_exists(&path).await? {
            debug!(%url, "page already stored");
            outcomes.push(ScrapeOutcome {
                url,
                file: Some(path),
                status: ScrapeStatus::AlreadyExists,
            });
            continue;
        }

        let outcome = match fetcher.fetch_text(&url).await? {
            Some(text) if !text.trim().is_empty() => {
                tokio::fs::write(&path, format!("URL: {url}\n\n{}", text.trim())).await?;
                ScrapeOutcome {
                    url,
                    file: Some(path),
                    status: ScrapeStatus::Saved,
                }
            }
            _ => ScrapeOutcome {
                url,
                file: None,
                status: ScrapeStatus::NoContent,
            },
        };
        debug!(url = %outcome.url, status = %outcome.status, "page processed");
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

/// Downloads pages over HTTP and keeps paragraph and heading text.
pub struct HttpPageFetcher {
    client: Client,
    blocks: Regex,
    tags: Regex,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            client: Client::new(),
            blocks: Regex::new(r"(?is)<(?:p|h1|h2)(?:\s[^>]*)?>(.*?)</(?:p|h1|h2)\s*>")?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    pub fn extract_text(&self, html: &str) -> String {
        self.blocks
            .captures_iter(html)
            .filter_map(|captures| captures.get(1))
            .map(|inner| {
                let stripped = self.tags.replace_all(inner.as_str(), " ");
                decode_entities(&stripped)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<Option<String>, IngestError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(IngestError::FetchFailed(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let text = self.extract_text(&html);
        Ok((!text.is_empty()).then_some(text))
    }
}
