//! Background job scheduling and workers

pub mod executor;
pub mod registry;
pub mod scan;

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::media::{LibraryManager, MediaReconciler};

pub use registry::ScheduleRegistry;

/// Shared state handed to every background job
pub struct JobContext {
    pub db: Database,
    pub reconciler: Arc<MediaReconciler>,
    pub library: Arc<dyn LibraryManager>,
    pub config: Arc<Config>,
    /// Identifies this process as a lease owner
    pub owner_id: String,
    pub lease_ttl: Duration,
}

impl JobContext {
    pub fn new(
        db: Database,
        reconciler: Arc<MediaReconciler>,
        library: Arc<dyn LibraryManager>,
        config: Arc<Config>,
    ) -> Self {
        let lease_ttl = Duration::from_secs(config.lease_ttl_secs);
        Self {
            db,
            reconciler,
            library,
            config,
            owner_id: format!("custodian-{}", Uuid::new_v4()),
            lease_ttl,
        }
    }
}

/// Initialize and start the job scheduler
pub async fn start_scheduler(
    ctx: Arc<JobContext>,
    registry: Arc<ScheduleRegistry>,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Register per-rule scan jobs before the sync cadence takes over
    registry.sync(&scheduler, &ctx).await?;

    // Rule schedule sync - every 2 minutes, picks up created/edited/deleted rules
    let sync_registry = registry.clone();
    let sync_ctx = ctx.clone();
    let sync_scheduler = scheduler.clone();
    let sync_job = Job::new_async("0 */2 * * * *", move |_uuid, _l| {
        let registry = sync_registry.clone();
        let ctx = sync_ctx.clone();
        let scheduler = sync_scheduler.clone();
        Box::pin(async move {
            if let Err(e) = registry.sync(&scheduler, &ctx).await {
                tracing::error!("Schedule sync error: {}", e);
            }
        })
    })?;
    scheduler.add(sync_job).await?;

    // Action executor pass on its own cadence
    let exec_ctx = ctx.clone();
    let exec_job = Job::new_async(ctx.config.executor_cron.as_str(), move |_uuid, _l| {
        let ctx = exec_ctx.clone();
        Box::pin(async move {
            info!("Running action executor pass");
            if let Err(e) = executor::run_action_pass(&ctx).await {
                tracing::error!("Action executor error: {}", e);
            }
        })
    })?;
    scheduler.add(exec_job).await?;

    scheduler.start().await?;
    info!("Job scheduler started");

    Ok(scheduler)
}
