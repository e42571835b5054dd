use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{clean, hash_id, normalize_date, JobSource, SearchClient, SearchRequest};
use crate::error::SourceError;
use crate::record::{Record, Source};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinkedInResponse {
    jobs: Option<Vec<LinkedInJob>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LinkedInJob {
    title: Option<String>,
    company: Option<Company>,
    location: Option<String>,
    link: Option<String>,
    listed_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Company {
    name: Option<String>,
}

/// LinkedIn Jobs engine of the search aggregator (`search_linkedin`).
pub struct LinkedInJobs {
    client: SearchClient,
}

impl LinkedInJobs {
    pub fn new(client: SearchClient) -> Self {
        LinkedInJobs { client }
    }
}

/// Request parameters; `remote` is only sent when remote-only is on.
fn query_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("engine", "linkedin_jobs".to_string()),
        ("keywords", request.query.clone()),
        ("location", request.location.clone()),
    ];
    if request.remote_only {
        params.push(("remote", "true".to_string()));
    }
    params
}

#[async_trait]
impl JobSource for LinkedInJobs {
    fn source(&self) -> Source {
        Source::SearchLinkedin
    }

    fn result_cap(&self, max_results: usize) -> usize {
        max_results / 2
    }

    async fn try_search(&self, request: &SearchRequest) -> Result<Vec<Record>, SourceError> {
        let body = self.client.get_json(&query_params(request)).await?;
        map_results(body, request.max_results)
    }
}

fn map_results(body: serde_json::Value, max_results: usize) -> Result<Vec<Record>, SourceError> {
    let response: LinkedInResponse = serde_json::from_value(body)?;
    let now = Utc::now();

    let records = response
        .jobs
        .unwrap_or_default()
        .into_iter()
        .take(max_results)
        .map(|job| {
            let title = clean(job.title.as_deref());
            let company = clean(job.company.and_then(|c| c.name).as_deref());
            let location = clean(job.location.as_deref());
            let url = job.link.unwrap_or_default();

            let mut record = Record::new(
                hash_id(&url, &title, &company, &location),
                title,
                company,
                url,
                Source::SearchLinkedin,
            );
            record.location = location;
            record.via = "LinkedIn".to_string();
            record.posted_at = normalize_date(job.listed_at.as_deref(), now);
            record
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn request(remote_only: bool) -> SearchRequest {
        SearchRequest {
            query: "VP Analytics".into(),
            location: "Illinois".into(),
            remote_only,
            max_results: 5,
        }
    }

    #[test]
    fn remote_param_only_when_requested() {
        let off = query_params(&request(false));
        assert!(off.iter().all(|(k, _)| *k != "remote"));
        let on = query_params(&request(true));
        assert!(on.contains(&("remote", "true".to_string())));
        assert!(on.contains(&("keywords", "VP Analytics".to_string())));
    }

    #[test]
    fn half_the_configured_cap() {
        let client = SearchClient::new("", "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let adapter = LinkedInJobs::new(client);
        assert_eq!(adapter.result_cap(50), 25);
        assert_eq!(adapter.result_cap(1), 0);
    }

    #[test]
    fn maps_provider_fields() {
        let body = json!({ "jobs": [{
            "title": "Head of Data Platform",
            "company": { "name": " Initech " },
            "location": "Remote",
            "link": "https://www.linkedin.com/jobs/view/1",
            "listed_at": "2024-02-10"
        }]});
        let r = &map_results(body, 5).unwrap()[0];
        assert_eq!(r.company, "Initech");
        assert_eq!(r.via, "LinkedIn");
        assert_eq!(r.source, Source::SearchLinkedin);
        assert_eq!(r.posted_at, "2024-02-10T00:00:00");
        assert_eq!(r.description, "");
        assert_eq!(r.salary, "");
    }

    #[test]
    fn composite_id_without_link() {
        let body = json!({ "jobs": [{ "title": "Lead Analyst", "company": { "name": "Acme" }, "location": "Remote" }]});
        let r = &map_results(body, 5).unwrap()[0];
        assert_eq!(r.url, "");
        assert_eq!(r.id, hash_id("", "Lead Analyst", "Acme", "Remote"));
    }

    #[test]
    fn null_jobs_is_empty() {
        assert!(map_results(json!({ "jobs": null }), 5).unwrap().is_empty());
        let body = json!({ "jobs": [{ "title": "Head of Data", "company": null, "link": null }]});
        let r = &map_results(body, 5).unwrap()[0];
        assert_eq!(r.company, "");
        assert_eq!(r.url, "");
    }

    #[tokio::test]
    async fn server_error_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search.json")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let url = format!("{}/search.json", server.url());
        let client = SearchClient::new("key", &url, Duration::from_secs(5)).unwrap();
        let adapter = LinkedInJobs::new(client);
        assert!(adapter.search(&request(false)).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/search.json")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let url = format!("{}/search.json", server.url());
        let client = SearchClient::new("key", &url, Duration::from_secs(5)).unwrap();
        let adapter = LinkedInJobs::new(client);
        assert!(matches!(
            adapter.try_search(&request(false)).await,
            Err(SourceError::Parse(_))
        ));
        assert!(adapter.search(&request(false)).await.is_empty());
    }
}
