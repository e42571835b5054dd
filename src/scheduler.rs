use std::sync::Arc;

use anyhow::Context;
use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::harvest::Harvester;

/// Accept classic 5-field crontab lines by prepending a seconds field.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.split_whitespace().collect::<Vec<_>>().join(" ");
    if expr.split(' ').count() == 5 {
        format!("0 {}", expr)
    } else {
        expr
    }
}

/// Fire a harvest run on every cron expression, evaluated in `tz`.
/// Runs are not serialized against each other.
pub async fn start_scheduler(
    harvester: Arc<Harvester>,
    crons: &[String],
    tz: Tz,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    for cron in crons {
        let schedule = normalize_cron(cron);
        let harvester = Arc::clone(&harvester);
        let job = Job::new_async_tz(schedule.as_str(), tz, move |_uuid, _lock| {
            let harvester = Arc::clone(&harvester);
            Box::pin(async move {
                info!("Scheduled run starting");
                let summary = harvester.run_once().await;
                info!(inserted = summary.inserted_count, "Scheduled run done");
            })
        })
        .with_context(|| format!("invalid cron expression '{}'", cron))?;
        scheduler.add(job).await?;
        info!(cron = %schedule, timezone = %tz, "Scheduled harvest");
    }

    scheduler.start().await?;
    Ok(scheduler)
}
