use crate::index::DocumentStore;
use crate::models::KeywordOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Lowercased word tokens minus stop words, most frequent first; equal
/// counts keep first-occurrence order.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for (position, token) in lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() > 1 && !is_stop_word(token))
        .enumerate()
    {
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(_, (left_count, left_first)), (_, (right_count, right_first))| {
        right_count
            .cmp(left_count)
            .then_with(|| left_first.cmp(right_first))
    });

    ranked
        .into_iter()
        .take(max_keywords)
        .map(|(token, _)| token.to_string())
        .collect()
}

/// Keyword to node-id table built from each node's top keywords.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordTable {
    table: BTreeMap<String, BTreeSet<String>>,
}

impl KeywordTable {
    pub fn build(store: &DocumentStore, options: KeywordOptions) -> Self {
        let mut table: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for node in store.iter() {
            for keyword in extract_keywords(&node.text, options.max_keywords_per_chunk) {
                table
                    .entry(keyword)
                    .or_default()
                    .insert(node.node_id.clone());
            }
        }

        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.table.contains_key(keyword)
    }

    /// Every node matching at least one keyword, with its match count,
    /// ordered by count descending then node id.
    pub fn query(&self, keywords: &[String]) -> Vec<(&str, usize)> {
        let mut matches: BTreeMap<&str, usize> = BTreeMap::new();

        for keyword in keywords.iter().collect::<BTreeSet<_>>() {
            if let Some(node_ids) = self.table.get(keyword.as_str()) {
                for node_id in node_ids {
                    *matches.entry(node_id.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked = matches.into_iter().collect::<Vec<_>>();
        ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(right.0)));
        ranked
    }
}
