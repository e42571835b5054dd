use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};

use crate::config::FALLBACK_STATUS;
use crate::error::RecordError;

/// Which search adapter produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    SearchJobs,
    SearchLinkedin,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::SearchJobs => "search_jobs",
            Source::SearchLinkedin => "search_linkedin",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search_jobs" | "google_jobs" => Ok(Source::SearchJobs),
            "search_linkedin" | "linkedin" => Ok(Source::SearchLinkedin),
            other => Err(RecordError::UnknownSource(other.to_string())),
        }
    }
}

/// A primitive value in the flat record mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<SqlValue> for Field {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Field::Null,
            SqlValue::Integer(i) => Field::Integer(i),
            SqlValue::Real(f) => Field::Real(f),
            SqlValue::Text(s) => Field::Text(s),
            SqlValue::Blob(b) => Field::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

impl ToSql for Field {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Field::Null => ToSqlOutput::Owned(SqlValue::Null),
            Field::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Field::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Field::Text(s) => ToSqlOutput::Borrowed(s.as_str().into()),
        })
    }
}

pub type FieldMap = BTreeMap<String, Field>;

/// One normalized job posting.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub via: String,
    pub url: String,
    pub source: Source,
    pub posted_at: String,
    pub description: String,
    pub salary: String,
    pub llm_score: Option<f64>,
    pub llm_blurb: Option<String>,
    pub assessment_flag: bool,
    pub assessment_terms: String,
    pub status: String,
    pub notes: String,
    pub created_at: Option<String>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        url: impl Into<String>,
        source: Source,
    ) -> Self {
        Record {
            id: id.into(),
            title: title.into(),
            company: company.into(),
            location: String::new(),
            via: String::new(),
            url: url.into(),
            source,
            posted_at: String::new(),
            description: String::new(),
            salary: String::new(),
            llm_score: None,
            llm_blurb: None,
            assessment_flag: false,
            assessment_terms: String::new(),
            status: FALLBACK_STATUS.to_string(),
            notes: String::new(),
            created_at: None,
        }
    }

    pub fn to_map(&self) -> FieldMap {
        let text = |s: &str| Field::Text(s.to_string());
        let mut map = FieldMap::new();
        map.insert("id".into(), text(&self.id));
        map.insert("title".into(), text(&self.title));
        map.insert("company".into(), text(&self.company));
        map.insert("location".into(), text(&self.location));
        map.insert("via".into(), text(&self.via));
        map.insert("url".into(), text(&self.url));
        map.insert("source".into(), text(self.source.as_str()));
        map.insert("posted_at".into(), text(&self.posted_at));
        map.insert("description".into(), text(&self.description));
        map.insert("salary".into(), text(&self.salary));
        map.insert(
            "llm_score".into(),
            self.llm_score.map(Field::Real).unwrap_or(Field::Null),
        );
        map.insert(
            "llm_blurb".into(),
            self.llm_blurb.as_deref().map(text).unwrap_or(Field::Null),
        );
        map.insert(
            "assessment_flag".into(),
            Field::Integer(i64::from(self.assessment_flag)),
        );
        map.insert("assessment_terms".into(), text(&self.assessment_terms));
        map.insert("status".into(), text(&self.status));
        map.insert("notes".into(), text(&self.notes));
        map.insert(
            "created_at".into(),
            self.created_at.as_deref().map(text).unwrap_or(Field::Null),
        );
        map
    }

    /// Rebuild a record from a flat mapping. Only `id`, `url`, `title`,
    /// `company` and `source` are required; anything else missing or null
    /// takes its default.
    pub fn from_map(map: &FieldMap) -> Result<Self, RecordError> {
        let required = |key: &'static str| -> Result<String, RecordError> {
            opt_text(map, key)?.ok_or(RecordError::MissingField(key))
        };
        let text = |key: &'static str| -> Result<String, RecordError> {
            Ok(opt_text(map, key)?.unwrap_or_default())
        };

        let source: Source = required("source")?.parse()?;
        let mut record = Record::new(
            required("id")?,
            required("title")?,
            required("company")?,
            required("url")?,
            source,
        );
        record.location = text("location")?;
        record.via = text("via")?;
        record.posted_at = text("posted_at")?;
        record.description = text("description")?;
        record.salary = text("salary")?;
        record.llm_score = opt_real(map, "llm_score")?;
        record.llm_blurb = opt_text(map, "llm_blurb")?;
        record.assessment_flag = opt_int(map, "assessment_flag")?.unwrap_or(0) != 0;
        record.assessment_terms = text("assessment_terms")?;
        if let Some(status) = opt_text(map, "status")? {
            record.status = status;
        }
        record.notes = text("notes")?;
        record.created_at = opt_text(map, "created_at")?;
        Ok(record)
    }
}

fn opt_text(map: &FieldMap, key: &'static str) -> Result<Option<String>, RecordError> {
    match map.get(key) {
        None | Some(Field::Null) => Ok(None),
        Some(Field::Text(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RecordError::WrongType {
            field: key,
            expected: "text",
        }),
    }
}

fn opt_real(map: &FieldMap, key: &'static str) -> Result<Option<f64>, RecordError> {
    match map.get(key) {
        None | Some(Field::Null) => Ok(None),
        Some(Field::Real(f)) => Ok(Some(*f)),
        Some(Field::Integer(i)) => Ok(Some(*i as f64)),
        Some(_) => Err(RecordError::WrongType {
            field: key,
            expected: "number",
        }),
    }
}

fn opt_int(map: &FieldMap, key: &'static str) -> Result<Option<i64>, RecordError> {
    match map.get(key) {
        None | Some(Field::Null) => Ok(None),
        Some(Field::Integer(i)) => Ok(Some(*i)),
        Some(_) => Err(RecordError::WrongType {
            field: key,
            expected: "integer",
        }),
    }
}
