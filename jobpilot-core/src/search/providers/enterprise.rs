use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::EnterpriseApiSection;
use crate::search::normalizer::RawJob;

use super::{classify_status, JobProvider, ProviderError, ProviderResult, SearchQuery};

const ROW_KEYS: [&str; 5] = ["jobs", "results", "items", "list", "data"];
const NESTED_ROW_KEYS: [&str; 4] = ["jobs", "results", "items", "list"];

/// Config-driven paid data source with a stable JSON contract.
#[derive(Debug, Clone)]
pub struct EnterpriseApiProvider {
    client: Client,
    config: EnterpriseApiSection,
}

impl EnterpriseApiProvider {
    pub fn new(client: Client, config: EnterpriseApiSection) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> Option<&str> {
        self.config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    fn auth_value(&self) -> Option<String> {
        let key = self.config.key.as_deref()?.trim();
        if key.is_empty() {
            return None;
        }
        let scheme = self.config.auth_scheme.trim();
        Some(if scheme.is_empty() {
            key.to_string()
        } else {
            format!("{scheme} {key}")
        })
    }
}

/// Finds the row list in a top-level array or under a known key, allowing
/// one level of nesting (`{"data": {"items": [...]}}`).
pub(crate) fn extract_rows(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(rows) => objects(rows),
        Value::Object(map) => {
            for key in ROW_KEYS {
                match map.get(key) {
                    Some(Value::Array(rows)) => return objects(rows),
                    Some(Value::Object(inner)) => {
                        for nested in NESTED_ROW_KEYS {
                            if let Some(Value::Array(rows)) = inner.get(nested) {
                                return objects(rows);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn objects(rows: &[Value]) -> Vec<&Value> {
    rows.iter().filter(|row| row.is_object()).collect()
}

#[async_trait]
impl JobProvider for EnterpriseApiProvider {
    fn name(&self) -> &'static str {
        "enterprise_api"
    }

    async fn search(&self, query: &SearchQuery) -> ProviderResult<Vec<RawJob>> {
        let url = self
            .endpoint()
            .ok_or(ProviderError::MissingCredentials("enterprise_api"))?;
        let search_text = query.joined(5, "Python");
        let limit = query.limit.clamp(1, 50);

        let request = if self.config.method.eq_ignore_ascii_case("POST") {
            self.client.post(url).json(&json!({
                "query": search_text,
                "keywords": query.keywords,
                "location": query.location_or_empty(),
                "limit": limit,
            }))
        } else {
            self.client.get(url).query(&[
                ("query", search_text.clone()),
                ("keywords", query.keywords.join(",")),
                ("location", query.location_or_empty().to_string()),
                ("limit", limit.to_string()),
            ])
        };
        let mut request = request
            .timeout(Duration::from_secs(self.config.timeout_seconds.max(1)))
            .header(reqwest::header::USER_AGENT, "jobpilot/0.1");
        if let Some(value) = self.auth_value() {
            request = request.header(self.config.auth_header.as_str(), value);
        }

        let response = request.send().await?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let data: Value =
            serde_json::from_slice(&body).map_err(|err| ProviderError::Parse(err.to_string()))?;

        let rows: Vec<RawJob> = extract_rows(&data)
            .into_iter()
            .filter_map(|row| RawJob::from_value(row, self.name()))
            .filter(|row| !row.link.is_empty())
            .map(|mut row| {
                if row.location.is_empty() {
                    row.location = query.location_or_empty().to_string();
                }
                row
            })
            .take(limit)
            .collect();
        debug!(rows = rows.len(), "enterprise api answered");
        Ok(rows)
    }
}
