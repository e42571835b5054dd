use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// Status used when no closed status set is configured.
pub const FALLBACK_STATUS: &str = "harvested";

const DEFAULT_SEARCH_URL: &str = "https://serpapi.com/search.json";

const DEFAULT_QUERY_TITLES: &[&str] = &[
    "Chief Data Officer",
    "VP Data Science",
    "VP Analytics",
    "Head of Data",
    "Director Analytics",
    "Director Marketing Analytics",
];

const DEFAULT_LOCATIONS: &[&str] = &["Remote", "Chicago, IL, USA", "Illinois"];

pub const DEFAULT_ASSESSMENT_TERMS: &[&str] = &[
    "assessment",
    "aptitude",
    "cognitive",
    "reasoning test",
    "case study",
    "business case",
    "analytical exercise",
    "situational judgment",
    "evaluation",
    "challenge",
];

const DEFAULT_SCHEDULE_CRONS: &[&str] = &["40 7 * * *"];

const DEFAULT_STATUS_CHOICES: &[&str] = &[
    "harvested",
    "researching",
    "applied",
    "interviewing",
    "offer",
    "rejected",
    "archived",
];

static LIST_SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[;,\n]+").unwrap());

/// Split a delimiter-separated option on commas, semicolons or newlines,
/// trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    LIST_SEPARATOR_RE
        .split(raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_or_default(raw: Option<String>, default: &[&str]) -> Vec<String> {
    match raw {
        Some(value) => split_list(&value),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Environment as collected by `config`; keys arrive lower-cased.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    serpapi_key: String,
    serpapi_base_url: String,
    query_titles: Option<String>,
    query_keywords: Option<String>,
    locations: Option<String>,
    remote_only: bool,
    max_results: usize,
    enable_assessment_filter: bool,
    enable_assessment_boost: bool,
    assessment_terms: Option<String>,
    assessment_score_boost: f64,
    enable_follow_link: bool,
    http_timeout_secs: u64,
    max_html_chars: usize,
    openai_api_key: String,
    openrouter_api_key: String,
    llm_base_url: String,
    llm_model: String,
    output_dir: PathBuf,
    db_path: PathBuf,
    tz: String,
    schedule_crons: Option<String>,
    job_status_choices: Option<String>,
    bind_addr: String,
}

impl Default for RawSettings {
    fn default() -> Self {
        RawSettings {
            serpapi_key: String::new(),
            serpapi_base_url: DEFAULT_SEARCH_URL.to_string(),
            query_titles: None,
            query_keywords: None,
            locations: None,
            remote_only: false,
            max_results: 50,
            enable_assessment_filter: false,
            enable_assessment_boost: true,
            assessment_terms: None,
            assessment_score_boost: 15.0,
            enable_follow_link: true,
            http_timeout_secs: 18,
            max_html_chars: 120_000,
            openai_api_key: String::new(),
            openrouter_api_key: String::new(),
            llm_base_url: String::new(),
            llm_model: "gpt-4o-mini".to_string(),
            output_dir: PathBuf::from("output"),
            db_path: PathBuf::from("data/jobs.db"),
            tz: "America/Chicago".to_string(),
            schedule_crons: None,
            job_status_choices: None,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Immutable runtime configuration, validated once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub serpapi_key: String,
    pub serpapi_base_url: String,
    pub query_titles: Vec<String>,
    pub query_keywords: Vec<String>,
    pub locations: Vec<String>,
    pub remote_only: bool,
    pub max_results: usize,
    pub enable_assessment_filter: bool,
    pub enable_assessment_boost: bool,
    pub assessment_terms: Vec<String>,
    pub assessment_score_boost: f64,
    pub enable_follow_link: bool,
    pub http_timeout: Duration,
    pub max_html_chars: usize,
    pub openai_api_key: String,
    pub openrouter_api_key: String,
    pub llm_base_url: Option<String>,
    pub llm_model: String,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    pub timezone: Tz,
    pub schedule_crons: Vec<String>,
    pub job_status_choices: Vec<String>,
    pub bind_addr: String,
}

impl Settings {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load(None)
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: config::Map<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<config::Map<String, String>>) -> Result<Self, ConfigError> {
        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default().source(vars))
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let timezone: Tz = raw
            .tz
            .trim()
            .parse()
            .map_err(|_| ConfigError::Timezone(raw.tz.clone()))?;

        let llm_base_url = Some(raw.llm_base_url.trim().to_string()).filter(|u| !u.is_empty());

        Ok(Settings {
            serpapi_key: raw.serpapi_key.trim().to_string(),
            serpapi_base_url: raw.serpapi_base_url,
            query_titles: list_or_default(raw.query_titles, DEFAULT_QUERY_TITLES),
            query_keywords: list_or_default(raw.query_keywords, &[]),
            locations: list_or_default(raw.locations, DEFAULT_LOCATIONS),
            remote_only: raw.remote_only,
            max_results: raw.max_results,
            enable_assessment_filter: raw.enable_assessment_filter,
            enable_assessment_boost: raw.enable_assessment_boost,
            assessment_terms: list_or_default(raw.assessment_terms, DEFAULT_ASSESSMENT_TERMS),
            assessment_score_boost: raw.assessment_score_boost,
            enable_follow_link: raw.enable_follow_link,
            http_timeout: Duration::from_secs(raw.http_timeout_secs),
            max_html_chars: raw.max_html_chars,
            openai_api_key: raw.openai_api_key.trim().to_string(),
            openrouter_api_key: raw.openrouter_api_key.trim().to_string(),
            llm_base_url,
            llm_model: raw.llm_model,
            output_dir: raw.output_dir,
            db_path: raw.db_path,
            timezone,
            schedule_crons: list_or_default(raw.schedule_crons, DEFAULT_SCHEDULE_CRONS),
            job_status_choices: list_or_default(raw.job_status_choices, DEFAULT_STATUS_CHOICES)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
            bind_addr: raw.bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn split_on_all_separators() {
        let items = split_list(" a , b;c\n\n d ;; ");
        assert_eq!(items, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn split_empty() {
        assert!(split_list("").is_empty());
        assert!(split_list(" ; , \n").is_empty());
    }

    #[test]
    fn defaults_without_env() {
        let s = Settings::from_vars(vars(&[])).unwrap();
        assert_eq!(s.max_results, 50);
        assert!(s.enable_assessment_boost);
        assert!(!s.enable_assessment_filter);
        assert_eq!(s.assessment_score_boost, 15.0);
        assert_eq!(s.http_timeout, Duration::from_secs(18));
        assert_eq!(s.locations.len(), 3);
        assert_eq!(s.assessment_terms.len(), 10);
        assert_eq!(s.job_status_choices[0], "harvested");
        assert_eq!(s.timezone, chrono_tz::America::Chicago);
        assert!(s.llm_base_url.is_none());
    }

    #[test]
    fn env_values_override_defaults() {
        let s = Settings::from_vars(vars(&[
            ("SERPAPI_KEY", " key "),
            ("QUERY_TITLES", "Head of Data;VP Analytics"),
            ("REMOTE_ONLY", "true"),
            ("MAX_RESULTS", "10"),
            ("ASSESSMENT_SCORE_BOOST", "7.5"),
            ("JOB_STATUS_CHOICES", "New, Applied ,Closed"),
            ("TZ", "Europe/Berlin"),
        ]))
        .unwrap();
        assert_eq!(s.serpapi_key, "key");
        assert_eq!(s.query_titles, vec!["Head of Data", "VP Analytics"]);
        assert!(s.remote_only);
        assert_eq!(s.max_results, 10);
        assert_eq!(s.assessment_score_boost, 7.5);
        assert_eq!(s.job_status_choices, vec!["new", "applied", "closed"]);
        assert_eq!(s.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn empty_status_set_falls_back() {
        let s = Settings::from_vars(vars(&[("JOB_STATUS_CHOICES", "")])).unwrap();
        assert!(s.job_status_choices.is_empty());
    }

    #[test]
    fn bad_timezone_rejected() {
        let err = Settings::from_vars(vars(&[("TZ", "Mars/Olympus")])).unwrap_err();
        assert!(matches!(err, ConfigError::Timezone(_)));
    }
}
