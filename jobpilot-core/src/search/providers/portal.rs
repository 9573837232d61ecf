use async_trait::async_trait;
use url::form_urlencoded::byte_serialize;

use crate::search::normalizer::{stable_hash, RawJob};

use super::{JobProvider, ProviderResult, ProviderTier, SearchQuery};

const MAX_ENTRIES: usize = 5;

/// Board search URL prefixes; the encoded query is appended.
const PORTALS: [(&str, &str); 5] = [
    ("Boss直聘", "https://www.zhipin.com/web/geek/job?query="),
    ("猎聘", "https://www.liepin.com/zhaopin/?key="),
    ("智联招聘", "https://sou.zhaopin.com/?kw="),
    ("前程无忧", "https://we.51job.com/pc/search?keyword="),
    ("拉勾", "https://www.lagou.com/wn/jobs?kd="),
];

/// Last-resort tier: one search page per board for the user to open
/// manually. Never produces real postings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalEntryProvider;

impl PortalEntryProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn entries(&self, query: &SearchQuery) -> Vec<RawJob> {
        let text = query.joined(3, "Python");
        let encoded: String = byte_serialize(text.as_bytes()).collect();
        let location = query.location_or_empty();
        let encoded_location: String = byte_serialize(location.as_bytes()).collect();
        PORTALS
            .iter()
            .take(query.limit.clamp(1, MAX_ENTRIES))
            .map(|(platform, prefix)| {
                let mut link = format!("{prefix}{encoded}");
                if prefix.starts_with("https://sou.zhaopin.com") && !location.is_empty() {
                    link.push_str(&format!("&jl={encoded_location}"));
                }
                RawJob {
                    id: format!("cn_portal_{}", stable_hash(&link)),
                    title: format!("{text} - {platform}搜索入口"),
                    company: (*platform).to_string(),
                    location: location.to_string(),
                    platform: (*platform).to_string(),
                    provider: "cn_portal".to_string(),
                    link,
                    ..Default::default()
                }
            })
            .collect()
    }
}

#[async_trait]
impl JobProvider for PortalEntryProvider {
    fn name(&self) -> &'static str {
        "cn_portal"
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::SearchEntries
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        Ok(self.entries(query))
    }
}
