use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::model::{dedupe_key, JobPosting, PostingKind};

use super::platform::{is_actionable_link, is_search_entry_link, platform_from_link};

const LINK_KEYS: [&str; 7] = [
    "link",
    "url",
    "job_url",
    "detail_url",
    "apply_url",
    "jobLink",
    "jobUrl",
];
const TITLE_KEYS: [&str; 5] = ["title", "job_title", "name", "position", "jobName"];
const COMPANY_KEYS: [&str; 4] = ["company", "company_name", "employer", "brandName"];
const LOCATION_KEYS: [&str; 4] = ["location", "city", "region", "work_city"];
const SALARY_KEYS: [&str; 4] = ["salary", "salary_range", "pay", "salaryRange"];
const PLATFORM_KEYS: [&str; 4] = ["platform", "source", "site", "origin"];
const UPDATED_KEYS: [&str; 4] = ["updated", "updated_at", "publish_time", "published_at"];
const ID_KEYS: [&str; 3] = ["id", "job_id", "jobId"];

const PLACEHOLDER_COMPANIES: [&str; 4] = ["示例公司", "测试公司", "demo", "placeholder"];
const DEFAULT_TITLE: &str = "招聘岗位";

/// A provider row before normalization. Every field may be blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawJob {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub platform: String,
    pub provider: String,
    pub link: String,
    pub updated: Option<String>,
}

impl RawJob {
    /// Reads a heterogeneous JSON row, trying each known alias per field.
    pub fn from_value(row: &Value, provider: &str) -> Option<Self> {
        let object = row.as_object()?;
        let field = |keys: &[&str]| -> String {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .filter_map(scalar_text)
                .find(|value| !value.is_empty())
                .unwrap_or_default()
        };
        let updated = field(&UPDATED_KEYS);
        Some(Self {
            id: field(&ID_KEYS),
            title: field(&TITLE_KEYS),
            company: field(&COMPANY_KEYS),
            location: field(&LOCATION_KEYS),
            salary: field(&SALARY_KEYS),
            platform: field(&PLATFORM_KEYS),
            provider: provider.to_string(),
            link: field(&LINK_KEYS),
            updated: (!updated.is_empty()).then_some(updated),
        })
    }

    fn is_placeholder(&self) -> bool {
        let id = self.id.trim().to_ascii_lowercase();
        if id.starts_with("seed") || id.starts_with("demo") {
            return true;
        }
        if self.link.to_ascii_lowercase().contains("/job_detail/seed") {
            return true;
        }
        let company = self.company.trim().to_lowercase();
        PLACEHOLDER_COMPANIES.iter().any(|name| company == *name)
    }

    fn classify(&self) -> PostingKind {
        if self.provider == "cn_portal"
            || self.title.contains("搜索入口")
            || is_search_entry_link(&self.link)
        {
            PostingKind::SearchEntry
        } else {
            PostingKind::RealPosting
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Which classifications survive normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPolicy {
    RealOnly,
    AllowSearchEntries,
}

/// Turns provider rows into postings. Pure; holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobNormalizer;

impl JobNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, raw: Vec<RawJob>, limit: usize) -> Vec<JobPosting> {
        self.normalize_with(raw, limit, EntryPolicy::RealOnly)
    }

    pub fn normalize_with(
        &self,
        raw: Vec<RawJob>,
        limit: usize,
        policy: EntryPolicy,
    ) -> Vec<JobPosting> {
        let mut seen = HashSet::new();
        let mut postings = Vec::new();
        for entry in raw {
            if postings.len() >= limit {
                break;
            }
            if !is_actionable_link(&entry.link) {
                trace!(link = %entry.link, "dropping entry without absolute link");
                continue;
            }
            if entry.is_placeholder() {
                trace!(id = %entry.id, "dropping placeholder entry");
                continue;
            }
            let kind = entry.classify();
            if kind == PostingKind::SearchEntry && policy == EntryPolicy::RealOnly {
                trace!(link = %entry.link, "dropping search-entry page");
                continue;
            }
            let key = dedupe_key(&entry.link, &entry.id, &entry.title, &entry.company);
            if !seen.insert(key) {
                continue;
            }
            postings.push(into_posting(entry, kind));
        }
        postings
    }
}

fn into_posting(entry: RawJob, kind: PostingKind) -> JobPosting {
    let link = entry.link.trim().to_string();
    let id = if entry.id.trim().is_empty() {
        format!("{}_{}", provider_tag(&entry.provider), stable_hash(&link))
    } else {
        entry.id.trim().to_string()
    };
    let title = if entry.title.trim().is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        entry.title.trim().to_string()
    };
    let platform = if entry.platform.trim().is_empty() {
        platform_from_link(&link)
    } else {
        entry.platform.trim().to_string()
    };
    JobPosting {
        id,
        title,
        company: entry.company.trim().to_string(),
        location: entry.location.trim().to_string(),
        salary: entry.salary.trim().to_string(),
        platform,
        provider: entry.provider,
        link,
        updated_at: entry.updated,
        kind,
    }
}

fn provider_tag(provider: &str) -> &str {
    if provider.is_empty() {
        "job"
    } else {
        provider
    }
}

/// First 16 hex chars of sha256 over the lowercased input.
pub fn stable_hash(value: &str) -> String {
    let digest = Sha256::digest(value.to_lowercase().as_bytes());
    hex::encode(digest)[..16].to_string()
}
