//! Scan orchestration
//!
//! One scan runs one rule over the full reconciled item set: every item is
//! evaluated, matches are flagged as candidates, and the outcome is recorded
//! on the scan row. A single bad item never aborts a scan; only a total
//! reconciliation failure or the rule being disabled mid-run does.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{leases::scan_lease_name, CreateCandidate, RuleRecord, ScanCounts};
use crate::rules::evaluate;

use super::JobContext;

/// How many items are evaluated between enabled-flag checks and lease renewals
const BATCH_SIZE: usize = 250;

/// Why a scan ended in the failed state
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("reconciliation failed: {0}")]
    Reconciliation(#[source] anyhow::Error),
    #[error("rule disabled mid-run")]
    DisabledMidRun,
    #[error("rule is not runnable: {0}")]
    InvalidRule(String),
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

/// Run one scheduled scan of a rule, if this replica wins the rule's lease.
///
/// Never two overlapping scans of the same rule: the lease covers both this
/// process and other replicas.
pub async fn run_scan(ctx: &JobContext, rule_id: Uuid) -> Result<()> {
    let rules = ctx.db.rules();
    let Some(rule) = rules.get(rule_id).await? else {
        info!(rule = %rule_id, "Rule vanished before its scan fired, skipping");
        return Ok(());
    };
    if !rule.enabled {
        return Ok(());
    }

    let leases = ctx.db.leases();
    let lease = scan_lease_name(rule_id);
    if !leases.acquire(&lease, &ctx.owner_id, ctx.lease_ttl).await? {
        info!(rule = %rule.name, "Scan already in flight, skipping");
        return Ok(());
    }

    // Everything that can fail while the lease is held goes through here so
    // no error path leaves the rule locked until TTL expiry
    let outcome = scan_and_record(ctx, &rule).await;
    leases.release(&lease, &ctx.owner_id).await?;
    outcome
}

async fn scan_and_record(ctx: &JobContext, rule: &RuleRecord) -> Result<()> {
    let scans = ctx.db.scans();
    let scan = scans.create(rule.id).await?;
    let mut counts = ScanCounts::default();

    match execute(ctx, rule, scan.id, &mut counts).await {
        Ok(()) => {
            scans.complete(scan.id, counts).await?;
            ctx.db.rules().touch_last_run(rule.id, Utc::now()).await?;
            info!(
                rule = %rule.name,
                evaluated = counts.evaluated,
                matched = counts.matched,
                errored = counts.errored,
                "Scan completed"
            );
        }
        Err(e) => {
            scans.fail(scan.id, &e.to_string(), counts).await?;
            warn!(rule = %rule.name, error = %e, "Scan failed");
        }
    }

    Ok(())
}

async fn execute(
    ctx: &JobContext,
    rule: &RuleRecord,
    scan_id: Uuid,
    counts: &mut ScanCounts,
) -> Result<(), ScanError> {
    let scans = ctx.db.scans();
    scans.mark_running(scan_id).await?;

    let kind = rule
        .kind()
        .map_err(|e| ScanError::InvalidRule(e.to_string()))?;
    let criteria = rule.criteria.0.clone();

    let items = ctx
        .reconciler
        .reconcile(kind, None)
        .await
        .map_err(ScanError::Reconciliation)?;

    // The rule may have been disabled while we were talking to the sources
    ensure_enabled(ctx, rule.id).await?;

    let candidates = ctx.db.candidates();
    let leases = ctx.db.leases();
    let lease = scan_lease_name(rule.id);
    // One reference instant for the whole scan keeps evaluation consistent
    let now = Utc::now();

    for batch in items.chunks(BATCH_SIZE) {
        for item in batch {
            counts.evaluated += 1;
            if !evaluate(&criteria, item, now) {
                continue;
            }
            counts.matched += 1;

            let created = candidates
                .flag(CreateCandidate {
                    scan_id,
                    rule_id: rule.id,
                    media_kind: item.identity.kind,
                    title: item.identity.title.clone(),
                    year: item.identity.year,
                    servarr_id: item.identity.servarr_id,
                    external_catalog_id: item.identity.external_catalog_id,
                })
                .await;
            match created {
                Ok(true) => {
                    info!(rule = %rule.name, title = %item.identity.title, "Flagged candidate");
                }
                // Already flagged (or already reviewed); leave it alone
                Ok(false) => {}
                Err(e) => {
                    counts.errored += 1;
                    warn!(
                        title = %item.identity.title,
                        error = %e,
                        "Failed to flag candidate, continuing scan"
                    );
                }
            }
        }

        leases.renew(&lease, &ctx.owner_id, ctx.lease_ttl).await?;
        ensure_enabled(ctx, rule.id).await?;
    }

    Ok(())
}

/// Abort cleanly when the rule was disabled or deleted while running
async fn ensure_enabled(ctx: &JobContext, rule_id: Uuid) -> Result<(), ScanError> {
    let still_enabled = ctx
        .db
        .rules()
        .get(rule_id)
        .await?
        .map(|r| r.enabled)
        .unwrap_or(false);
    if still_enabled {
        Ok(())
    } else {
        Err(ScanError::DisabledMidRun)
    }
}
