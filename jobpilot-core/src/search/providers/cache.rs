use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::model::dedupe_key;
use crate::search::normalizer::RawJob;

use super::{JobProvider, ProviderResult, SearchQuery};

/// Rows pushed by an external crawler, kept in arrival order.
#[derive(Debug)]
pub struct CacheProvider {
    entries: Mutex<VecDeque<RawJob>>,
    capacity: usize,
}

impl CacheProvider {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Adds rows not already cached; evicts the oldest past capacity.
    /// Returns how many rows were new.
    pub fn ingest(&self, rows: Vec<RawJob>) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut known: HashSet<String> = entries.iter().map(row_key).collect();
        let mut added = 0;
        for mut row in rows {
            if !known.insert(row_key(&row)) {
                continue;
            }
            if row.provider.is_empty() {
                row.provider = "cache".to_string();
            }
            entries.push_back(row);
            added += 1;
        }
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        debug!(added, cached = entries.len(), "crawler batch ingested");
        added
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn row_key(row: &RawJob) -> String {
    dedupe_key(&row.link, &row.id, &row.title, &row.company)
}

fn matches(row: &RawJob, keywords: &[String], location: Option<&str>) -> bool {
    let keyword_hit = keywords.is_empty() || {
        let haystack = format!("{} {}", row.title, row.company).to_lowercase();
        keywords
            .iter()
            .any(|keyword| haystack.contains(&keyword.to_lowercase()))
    };
    let location_hit = match location {
        Some(wanted) if !row.location.is_empty() => row.location.contains(wanted),
        _ => true,
    };
    keyword_hit && location_hit
}

#[async_trait]
impl JobProvider for CacheProvider {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let scan = query.limit.saturating_mul(5).max(20);
        Ok(entries
            .iter()
            .rev()
            .filter(|row| matches(row, &query.keywords, query.location.as_deref()))
            .take(scan)
            .cloned()
            .collect())
    }
}
