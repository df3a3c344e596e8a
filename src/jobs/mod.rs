//! Background job scheduling

pub mod meta_refresh;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::refresh::RefreshCycle;

/// Initialize and start the job scheduler
pub async fn start_scheduler(cycle: RefreshCycle, cron: &str) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Metadata refresh, once per minute by default
    let running = Arc::new(Mutex::new(()));
    let refresh_job = Job::new_async(cron, move |_uuid, _l| {
        let cycle = cycle.clone();
        let running = running.clone();
        Box::pin(async move {
            meta_refresh::run_refresh_cycle(&cycle, &running).await;
        })
    })?;
    scheduler.add(refresh_job).await?;

    scheduler.start().await?;

    info!(cron = %cron, "Job scheduler started");
    Ok(scheduler)
}
