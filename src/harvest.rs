use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assessment::AssessmentDetector;
use crate::config::Settings;
use crate::db::Store;
use crate::enrich::{ContentEnricher, MAX_TEXT_CHARS};
use crate::export;
use crate::record::Record;
use crate::scorer::LlmScorer;
use crate::sources::{GoogleJobs, JobSource, LinkedInJobs, SearchClient, SearchRequest};

const SNIPPET_SEPARATOR: &str = "\n\n---\nSERP snippet:\n";

const SENIOR_MARKERS: &[&str] = &["chief", "vp", "director", "head", "lead", "principal"];
const JUNIOR_MARKERS: &[&str] = &["intern", "junior", "entry"];

const MAX_SCORE: f64 = 100.0;

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(rename = "inserted")]
    pub inserted_count: usize,
    #[serde(rename = "csv")]
    pub export_path: Option<PathBuf>,
    #[serde(skip)]
    pub new_records: Vec<Record>,
}

/// Owns every pipeline component for the lifetime of the process.
pub struct Harvester {
    settings: Settings,
    store: Arc<Store>,
    sources: Vec<Box<dyn JobSource>>,
    enricher: ContentEnricher,
    detector: AssessmentDetector,
    scorer: LlmScorer,
}

impl Harvester {
    pub fn new(
        settings: Settings,
        store: Arc<Store>,
        sources: Vec<Box<dyn JobSource>>,
        enricher: ContentEnricher,
        scorer: LlmScorer,
    ) -> Self {
        let detector = AssessmentDetector::new(settings.assessment_terms.as_slice());
        Harvester {
            settings,
            store,
            sources,
            enricher,
            detector,
            scorer,
        }
    }

    /// Wire the production adapters, enricher and scorer from settings.
    pub fn from_settings(settings: Settings, store: Arc<Store>) -> anyhow::Result<Self> {
        let client = SearchClient::new(
            &settings.serpapi_key,
            &settings.serpapi_base_url,
            settings.http_timeout,
        )?;
        if !client.enabled() {
            warn!("SERPAPI_KEY not set, searches will return nothing");
        }
        let sources: Vec<Box<dyn JobSource>> = vec![
            Box::new(GoogleJobs::new(client.clone())),
            Box::new(LinkedInJobs::new(client)),
        ];
        let enricher = ContentEnricher::new(
            settings.enable_follow_link,
            settings.http_timeout,
            settings.max_html_chars,
        )?;
        let scorer = LlmScorer::from_settings(&settings)?;
        if !scorer.enabled() {
            info!("No LLM credential, postings will be stored unscored");
        }
        Ok(Self::new(settings, store, sources, enricher, scorer))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// One query per title, with every extra keyword appended.
    pub fn queries(&self) -> Vec<String> {
        let extras = self.settings.query_keywords.join(" ");
        self.settings
            .query_titles
            .iter()
            .map(|title| format!("{} {}", title, extras).trim().to_string())
            .collect()
    }

    fn locations(&self) -> Vec<String> {
        if self.settings.locations.is_empty() {
            vec!["Remote".to_string()]
        } else {
            self.settings.locations.clone()
        }
    }

    pub async fn run_once(&self) -> RunSummary {
        self.run_once_with_progress(&ProgressBar::hidden()).await
    }

    /// Search every (location, query) pair, process each senior posting and
    /// export what was newly stored. Never fails; each stage degrades.
    pub async fn run_once_with_progress(&self, pb: &ProgressBar) -> RunSummary {
        let locations = self.locations();
        let queries = self.queries();
        pb.set_length((locations.len() * queries.len()) as u64);

        let mut new_records = Vec::new();
        for location in &locations {
            for query in &queries {
                info!(query = %query, location = %location, remote_only = self.settings.remote_only, "Searching");
                for source in &self.sources {
                    let request = SearchRequest {
                        query: query.clone(),
                        location: location.clone(),
                        remote_only: self.settings.remote_only,
                        max_results: source.result_cap(self.settings.max_results),
                    };
                    for record in source.search(&request).await {
                        if !is_senior(&record.title) {
                            continue;
                        }
                        if let Some(mut record) = self.process(record).await {
                            match self.store.upsert(&mut record) {
                                Ok(true) => new_records.push(record),
                                Ok(false) => {}
                                Err(e) => warn!(id = %record.id, error = %e, "store insert failed"),
                            }
                        }
                    }
                }
                pb.inc(1);
            }
        }
        pb.finish_and_clear();

        let export_path = match export::export_csv(&new_records, &self.settings.output_dir, Utc::now()) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "export failed");
                None
            }
        };

        info!(inserted = new_records.len(), "Run finished");
        RunSummary {
            inserted_count: new_records.len(),
            export_path,
            new_records,
        }
    }

    /// Enrich, detect, filter, score and boost one posting. `None` when the
    /// assessment filter drops it.
    async fn process(&self, mut record: Record) -> Option<Record> {
        let page_text = self.enricher.fetch(&record.url).await;
        if !page_text.is_empty() {
            record.description = format!("{}{}{}", page_text, SNIPPET_SEPARATOR, record.description)
                .chars()
                .take(MAX_TEXT_CHARS)
                .collect();
        }

        let assessment = self.detector.detect(&record.description);
        record.assessment_flag = assessment.flagged;
        record.assessment_terms = assessment.terms;
        if self.settings.enable_assessment_filter && !record.assessment_flag {
            debug!(id = %record.id, "dropped, no assessment mention");
            return None;
        }

        let mut record = self.scorer.score(record).await;
        if self.settings.enable_assessment_boost && record.assessment_flag {
            record.llm_score = Some(apply_boost(record.llm_score, self.settings.assessment_score_boost));
        }
        Some(record)
    }
}

/// Title names a senior role and no junior one.
pub fn is_senior(title: &str) -> bool {
    let title = title.to_lowercase();
    SENIOR_MARKERS.iter().any(|m| title.contains(m))
        && !JUNIOR_MARKERS.iter().any(|m| title.contains(m))
}

/// An unscored record counts as 0 before the boost.
pub fn apply_boost(score: Option<f64>, boost: f64) -> f64 {
    (score.unwrap_or(0.0) + boost).min(MAX_SCORE)
}
