use crate::error::IngestError;
use crate::models::{IngestionOptions, Node, SourceDocument};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            min_chars: value.min_chunk_chars,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(normalize_whitespace(&current.join(" ")));
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        paragraphs.push(normalize_whitespace(&current.join(" ")));
    }

    paragraphs
}

pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> Vec<String> {
    let mut packed = Vec::new();
    let mut current = String::new();

    for paragraph in split_paragraphs(text) {
        if current.is_empty() {
            current = paragraph;
            continue;
        }

        if char_len(&current) + char_len(&paragraph) + 2 <= config.max_chars {
            current.push_str("\n\n");
            current.push_str(&paragraph);
        } else {
            packed.push(std::mem::take(&mut current));
            current = paragraph;
        }
    }
    if !current.is_empty() {
        packed.push(current);
    }

    let mut chunks = packed
        .iter()
        .filter(|chunk| char_len(chunk) >= config.min_chars)
        .cloned()
        .collect::<Vec<_>>();

    // a short page is still worth one node
    if chunks.is_empty() && !packed.is_empty() {
        chunks.push(packed.join("\n\n"));
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut with_overlap = Vec::new();
    for chunk in chunks {
        if char_len(&chunk) <= config.max_chars {
            with_overlap.push(chunk);
            continue;
        }

        let chars: Vec<char> = chunk.chars().collect();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + config.max_chars).min(chars.len());
            with_overlap.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    with_overlap
}

pub fn build_nodes(
    document: &SourceDocument,
    options: &IngestionOptions,
) -> Result<Vec<Node>, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;

    let reference = document.reference();
    let nodes = chunk_by_paragraph(&document.text, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let chunk_index = index as u64;
            Node {
                node_id: make_node_id(&document.document_id, chunk_index, &text),
                text,
                document: reference.clone(),
                chunk_index,
            }
        })
        .collect();

    Ok(nodes)
}

fn make_node_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
