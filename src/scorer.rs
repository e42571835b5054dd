use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ScoreError;
use crate::llm::{ChatClient, ChatRequest, Message, OPENAI_BASE_URL, OPENROUTER_BASE_URL};
use crate::record::Record;

pub const MAX_BLURB_CHARS: usize = 220;

const PROMPT_HEADER: &str = "You are evaluating a job for a senior data/analytics leader with this background:
- 17+ years leading data science, analytics, marketing analytics (CDP, identity graph), cloud platforms, BI.
- Seeks roles like CDO, VP/Director of Data/Analytics, Head of Data, Data Strategy/Transformation.
Job (JSON):
";

const PROMPT_FOOTER: &str = "
Return JSON with:
- score: 0-100 strategic fit
- blurb: a single sentence for a \"Why I'm a fit\" field (<=220 chars, no names)
";

/// Fit score and rationale parsed from the model's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub score: f64,
    pub blurb: String,
}

impl Score {
    /// Sets both fields together so a record is never half-scored.
    pub fn apply(self, mut record: Record) -> Record {
        record.llm_score = Some(self.score);
        record.llm_blurb = Some(self.blurb);
        record
    }
}

/// Language-model relevance scoring; a no-op without a credential.
pub struct LlmScorer {
    client: Option<ChatClient>,
    model: String,
}

impl LlmScorer {
    pub fn from_settings(settings: &Settings) -> Result<Self, ScoreError> {
        let credential = if !settings.openai_api_key.is_empty() {
            Some((settings.openai_api_key.as_str(), OPENAI_BASE_URL))
        } else if !settings.openrouter_api_key.is_empty() {
            Some((settings.openrouter_api_key.as_str(), OPENROUTER_BASE_URL))
        } else {
            None
        };

        let client = match credential {
            Some((key, default_url)) => {
                let base_url = settings.llm_base_url.as_deref().unwrap_or(default_url);
                let client = ChatClient::new(key, base_url, settings.http_timeout)?;
                info!(model = %settings.llm_model, base_url = client.base_url(), "LLM scoring enabled");
                Some(client)
            }
            None => None,
        };

        Ok(LlmScorer {
            client,
            model: settings.llm_model.clone(),
        })
    }

    pub fn disabled() -> Self {
        LlmScorer {
            client: None,
            model: String::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Score a record, returning it untouched when scoring is disabled or
    /// fails for any reason.
    pub async fn score(&self, record: Record) -> Record {
        match self.try_score(&record).await {
            Ok(score) => score.apply(record),
            Err(ScoreError::Disabled) => record,
            Err(e) => {
                warn!(id = %record.id, error = %e, "scoring failed, keeping record unscored");
                record
            }
        }
    }

    pub async fn try_score(&self, record: &Record) -> Result<Score, ScoreError> {
        let client = self.client.as_ref().ok_or(ScoreError::Disabled)?;
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(build_prompt(record)?)],
            temperature: Some(0.2),
            max_tokens: Some(200),
        };
        let reply = client.complete(&request).await?;
        parse_score(&reply)
    }
}

fn build_prompt(record: &Record) -> Result<String, ScoreError> {
    let job = serde_json::to_string(&record.to_map()).map_err(|e| ScoreError::Parse(e.to_string()))?;
    Ok(format!("{}{}{}", PROMPT_HEADER, job, PROMPT_FOOTER))
}

/// Parse the reply strictly as a JSON object. A missing `score` counts as
/// 0 and a missing `blurb` as empty; anything else malformed is an error.
pub fn parse_score(reply: &str) -> Result<Score, ScoreError> {
    let value: Value =
        serde_json::from_str(reply.trim()).map_err(|e| ScoreError::Parse(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ScoreError::Parse("reply is not a JSON object".into()))?;

    let score = match object.get("score") {
        None => 0.0,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ScoreError::Parse("score out of range".into()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ScoreError::Parse(format!("score '{}' is not numeric", s)))?,
        Some(other) => return Err(ScoreError::Parse(format!("score has type {}", type_name(other)))),
    };
    if !score.is_finite() {
        return Err(ScoreError::Parse("score is not finite".into()));
    }

    let blurb = match object.get("blurb") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Ok(Score {
        score,
        blurb: blurb.chars().take(MAX_BLURB_CHARS).collect(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
