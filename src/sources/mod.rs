pub mod google;
pub mod linkedin;

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::record::{Record, Source};

pub use google::GoogleJobs;
pub use linkedin::LinkedInJobs;

static RELATIVE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(minute|hour|day|week|month|year)s?\s+ago").unwrap()
});

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// One search: query text, location, remote flag and result cap.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub location: String,
    pub remote_only: bool,
    pub max_results: usize,
}

/// A search backend translating a query into canonical records.
#[async_trait]
pub trait JobSource: Send + Sync {
    fn source(&self) -> Source;

    /// Result cap this adapter should use given the configured maximum.
    fn result_cap(&self, max_results: usize) -> usize {
        max_results
    }

    async fn try_search(&self, request: &SearchRequest) -> Result<Vec<Record>, SourceError>;

    /// Search with the adapter's fallback applied: a missing credential or
    /// any provider failure yields an empty list.
    async fn search(&self, request: &SearchRequest) -> Vec<Record> {
        match self.try_search(request).await {
            Ok(records) => records,
            Err(SourceError::Disabled) => {
                debug!(source = %self.source(), "search skipped, no credential");
                Vec::new()
            }
            Err(e) => {
                warn!(source = %self.source(), query = %request.query, error = %e, "search failed");
                Vec::new()
            }
        }
    }
}

/// HTTP access to the search aggregator shared by both adapters.
#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SearchClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(SearchClient {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        })
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// GET the aggregator with `params` plus the credential.
    async fn get_json(&self, params: &[(&str, String)]) -> Result<serde_json::Value, SourceError> {
        if !self.enabled() {
            return Err(SourceError::Disabled);
        }
        let response = self
            .http
            .get(&self.base_url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Dedup key: SHA-256 of the URL (or `title-company-location` when the URL
/// is empty), first 32 lower-case hex characters.
pub fn hash_id(url: &str, title: &str, company: &str, location: &str) -> String {
    let key = if url.is_empty() {
        format!("{}-{}-{}", title, company, location)
    } else {
        url.to_string()
    };
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(32);
    hex
}

/// Normalize a provider date to a UTC ISO-8601 string, or "" when it
/// cannot be understood.
pub fn normalize_date(raw: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return String::new();
    };
    if let Some(parsed) = parse_absolute(raw) {
        return parsed.format(ISO_FORMAT).to_string();
    }
    parse_relative(raw, now)
        .map(|t| t.format(ISO_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_absolute(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_relative(raw: &str, now: DateTime<Utc>) -> Option<NaiveDateTime> {
    let caps = RELATIVE_DATE_RE.captures(raw)?;
    let n: i64 = caps[1].parse().ok()?;
    let unit_secs: i64 = match caps[2].to_lowercase().as_str() {
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 7 * 86_400,
        "month" => 30 * 86_400,
        "year" => 365 * 86_400,
        _ => return None,
    };
    let delta = chrono::Duration::try_seconds(n.checked_mul(unit_secs)?)?;
    now.checked_sub_signed(delta).map(|t| t.naive_utc())
}

/// Trimmed owned copy of an optional provider string.
fn clean(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}
