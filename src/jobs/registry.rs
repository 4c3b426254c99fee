//! Per-rule schedule registry
//!
//! Rules carry their own cron expression, so scan jobs cannot be declared up
//! front: this registry tracks which rule is bound to which scheduler job and
//! reconciles that map against the rules table. Schedule changes converge
//! within one sync interval rather than instantly.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::RuleRecord;

use super::{scan, JobContext};

#[derive(Debug, Clone)]
struct ScheduleEntry {
    job_id: Uuid,
    rule_name: String,
    cron: String,
}

/// One row of the schedule listing
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSchedule {
    pub rule_id: Uuid,
    pub rule_name: String,
    /// Always true today: disabled rules are deregistered at sync time
    pub enabled: bool,
    pub cron: String,
    /// Next fire time, if the scheduler still knows the job
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Maps rule ids to their registered scan jobs
#[derive(Default)]
pub struct ScheduleRegistry {
    entries: RwLock<HashMap<Uuid, ScheduleEntry>>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the scheduler in line with the rules table.
    ///
    /// Disabled and deleted rules lose their jobs, cron edits reschedule, and
    /// newly enabled rules get a job. A rule with an unparseable cron is
    /// skipped with a warning instead of failing the whole sync.
    pub async fn sync(&self, scheduler: &JobScheduler, ctx: &Arc<JobContext>) -> Result<()> {
        let rules = ctx.db.rules().list().await?;

        let stale: Vec<(Uuid, Uuid)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(rule_id, entry)| {
                    match rules.iter().find(|r| r.id == **rule_id) {
                        Some(rule) => !rule.enabled || cron_for(rule, ctx) != entry.cron,
                        None => true,
                    }
                })
                .map(|(rule_id, entry)| (*rule_id, entry.job_id))
                .collect()
        };
        for (rule_id, job_id) in stale {
            if let Err(e) = scheduler.remove(&job_id).await {
                warn!(rule = %rule_id, error = %e, "Failed to deregister scan job");
            }
            self.entries.write().remove(&rule_id);
            info!(rule = %rule_id, "Deregistered scan schedule");
        }

        for rule in rules.iter().filter(|r| r.enabled) {
            if self.entries.read().contains_key(&rule.id) {
                continue;
            }
            let cron = cron_for(rule, ctx);
            match register(scheduler, ctx, rule.id, &cron).await {
                Ok(job_id) => {
                    info!(rule = %rule.name, cron = %cron, "Registered scan schedule");
                    self.entries.write().insert(
                        rule.id,
                        ScheduleEntry {
                            job_id,
                            rule_name: rule.name.clone(),
                            cron,
                        },
                    );
                }
                Err(e) => {
                    warn!(rule = %rule.name, cron = %cron, error = %e, "Invalid scan schedule");
                }
            }
        }

        Ok(())
    }

    /// Snapshot the registered schedules with their next fire times
    pub async fn list_active(&self, scheduler: &JobScheduler) -> Vec<ActiveSchedule> {
        let snapshot: Vec<(Uuid, ScheduleEntry)> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect();

        // next_tick_for_job wants &mut; the handle is a cheap clone
        let mut scheduler = scheduler.clone();
        let mut out = Vec::with_capacity(snapshot.len());
        for (rule_id, entry) in snapshot {
            let next_run_at = scheduler
                .next_tick_for_job(entry.job_id)
                .await
                .ok()
                .flatten();
            out.push(ActiveSchedule {
                rule_id,
                rule_name: entry.rule_name,
                enabled: true,
                cron: entry.cron,
                next_run_at,
            });
        }
        out.sort_by(|a, b| a.rule_name.cmp(&b.rule_name));
        out
    }
}

/// Effective cron for a rule: its own, or the instance-wide default
fn cron_for(rule: &RuleRecord, ctx: &JobContext) -> String {
    rule.schedule
        .clone()
        .unwrap_or_else(|| ctx.config.scan_default_cron.clone())
}

async fn register(
    scheduler: &JobScheduler,
    ctx: &Arc<JobContext>,
    rule_id: Uuid,
    cron: &str,
) -> Result<Uuid> {
    let job_ctx = ctx.clone();
    let job = Job::new_async(cron, move |_uuid, _l| {
        let ctx = job_ctx.clone();
        Box::pin(async move {
            if let Err(e) = scan::run_scan(&ctx, rule_id).await {
                tracing::error!(rule = %rule_id, "Scan error: {}", e);
            }
        })
    })?;
    let job_id = scheduler.add(job).await?;
    Ok(job_id)
}
