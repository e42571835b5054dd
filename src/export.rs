use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::record::Record;

const MAX_NAME_ATTEMPTS: usize = 1000;

pub const COLUMNS: &[&str] = &[
    "title",
    "company",
    "location",
    "url",
    "source",
    "via",
    "posted_at",
    "salary",
    "llm_score",
    "llm_blurb",
    "assessment_flag",
    "assessment_terms",
    "status",
    "notes",
    "description",
];

/// Write one CSV row per record into `outdir`. No file is produced for an
/// empty slice.
pub fn export_csv(
    records: &[Record],
    outdir: &Path,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<PathBuf>> {
    if records.is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("creating output dir {}", outdir.display()))?;

    let (path, file) = create_export_file(outdir, &now.format("%Y%m%d_%H%M%S").to_string())?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(COLUMNS)?;
    for r in records {
        let score = r.llm_score.map(|s| s.to_string()).unwrap_or_default();
        let flag = if r.assessment_flag { "1" } else { "0" };
        writer.write_record([
            r.title.as_str(),
            r.company.as_str(),
            r.location.as_str(),
            r.url.as_str(),
            r.source.as_str(),
            r.via.as_str(),
            r.posted_at.as_str(),
            r.salary.as_str(),
            score.as_str(),
            r.llm_blurb.as_deref().unwrap_or(""),
            flag,
            r.assessment_terms.as_str(),
            r.status.as_str(),
            r.notes.as_str(),
            r.description.as_str(),
        ])?;
    }
    writer.flush()?;

    info!("Exported {} records to {}", records.len(), path.display());
    Ok(Some(path))
}

/// Claim `jobs_<stamp>.csv`, or `jobs_<stamp>_N.csv` when an export from the
/// same second already exists. Existing files are never truncated.
fn create_export_file(outdir: &Path, stamp: &str) -> anyhow::Result<(PathBuf, File)> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let name = if n == 0 {
            format!("jobs_{}.csv", stamp)
        } else {
            format!("jobs_{}_{}.csv", stamp, n)
        };
        let path = outdir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("creating {}", path.display())),
        }
    }
    anyhow::bail!("no free export file name for stamp {} in {}", stamp, outdir.display())
}
