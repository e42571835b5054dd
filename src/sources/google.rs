use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{clean, hash_id, normalize_date, JobSource, SearchClient, SearchRequest};
use crate::error::SourceError;
use crate::record::{Record, Source};

/// Snippets from this engine are capped before they enter the pipeline.
const SNIPPET_MAX_CHARS: usize = 2000;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GoogleJobsResponse {
    jobs_results: Option<Vec<GoogleJob>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GoogleJob {
    title: Option<String>,
    company_name: Option<String>,
    location: Option<String>,
    via: Option<String>,
    link: Option<String>,
    related_links: Option<Vec<Link>>,
    apply_options: Option<Vec<Link>>,
    description: Option<String>,
    detected_extensions: Option<DetectedExtensions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Link {
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DetectedExtensions {
    posted_at: Option<String>,
    salary: Option<String>,
}

/// Google Jobs engine of the search aggregator (`search_jobs`).
pub struct GoogleJobs {
    client: SearchClient,
}

impl GoogleJobs {
    pub fn new(client: SearchClient) -> Self {
        GoogleJobs { client }
    }
}

#[async_trait]
impl JobSource for GoogleJobs {
    fn source(&self) -> Source {
        Source::SearchJobs
    }

    async fn try_search(&self, request: &SearchRequest) -> Result<Vec<Record>, SourceError> {
        let query = if request.remote_only {
            format!("{} remote", request.query)
        } else {
            request.query.clone()
        };
        let params = [
            ("engine", "google_jobs".to_string()),
            ("q", query),
            ("hl", "en".to_string()),
            ("chips", "date_posted:week".to_string()),
            ("location", request.location.clone()),
        ];
        let body = self.client.get_json(&params).await?;
        map_results(body, request.max_results)
    }
}

fn map_results(body: serde_json::Value, max_results: usize) -> Result<Vec<Record>, SourceError> {
    let response: GoogleJobsResponse = serde_json::from_value(body)?;
    let now = Utc::now();

    let records = response
        .jobs_results
        .unwrap_or_default()
        .into_iter()
        .take(max_results)
        .map(|job| {
            let title = clean(job.title.as_deref());
            let company = clean(job.company_name.as_deref());
            let location = clean(job.location.as_deref());
            let url = resolve_url(&job);
            let extensions = job.detected_extensions.unwrap_or_default();

            let mut record = Record::new(
                hash_id(&url, &title, &company, &location),
                title,
                company,
                url,
                Source::SearchJobs,
            );
            record.location = location;
            record.via = clean(job.via.as_deref());
            record.description = job
                .description
                .unwrap_or_default()
                .chars()
                .take(SNIPPET_MAX_CHARS)
                .collect();
            record.posted_at = normalize_date(extensions.posted_at.as_deref(), now);
            record.salary = extensions.salary.unwrap_or_default();
            record
        })
        .collect();
    Ok(records)
}

/// Direct link, then the first related link, then the first apply option.
fn resolve_url(job: &GoogleJob) -> String {
    let first = |links: &Option<Vec<Link>>| {
        links
            .as_deref()
            .and_then(|l| l.first())
            .and_then(|l| l.link.clone())
    };
    job.link
        .clone()
        .filter(|l| !l.is_empty())
        .or_else(|| first(&job.related_links).filter(|l| !l.is_empty()))
        .or_else(|| first(&job.apply_options))
        .unwrap_or_default()
}
