//! Deferred action execution
//!
//! A periodic singleton pass that carries out each rule's configured action on
//! candidates whose review state and action delay allow it. One failed item is
//! logged and left in place for the next pass; the pass itself keeps going.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::db::{CandidateRecord, ReviewStatus, RuleAction, RuleRecord, ACTION_EXECUTOR_LEASE};
use crate::media::MediaKind;

use super::JobContext;

/// Has the rule's grace period since flagging passed?
///
/// No delay configured means the action may run immediately.
pub fn delay_elapsed(
    flagged_at: DateTime<Utc>,
    delay_days: Option<i64>,
    now: DateTime<Utc>,
) -> bool {
    let delay = Duration::days(delay_days.unwrap_or(0));
    now.signed_duration_since(flagged_at) >= delay
}

/// Run one executor pass, if this replica wins the singleton lease.
pub async fn run_action_pass(ctx: &JobContext) -> Result<()> {
    let leases = ctx.db.leases();
    if !leases
        .acquire(ACTION_EXECUTOR_LEASE, &ctx.owner_id, ctx.lease_ttl)
        .await?
    {
        return Ok(());
    }

    let outcome = execute_pass(ctx).await;
    leases.release(ACTION_EXECUTOR_LEASE, &ctx.owner_id).await?;
    outcome
}

async fn execute_pass(ctx: &JobContext) -> Result<()> {
    let now = Utc::now();

    for rule in ctx.db.rules().list_enabled().await? {
        let action = match rule.rule_action() {
            Ok(action) => action,
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "Skipping rule with unknown action");
                continue;
            }
        };
        if !action.is_actionable() {
            continue;
        }
        if let Err(e) = execute_rule(ctx, &rule, action, now).await {
            warn!(rule = %rule.name, error = %e, "Executor pass failed for rule");
        }
    }

    Ok(())
}

async fn execute_rule(
    ctx: &JobContext,
    rule: &RuleRecord,
    action: RuleAction,
    now: DateTime<Utc>,
) -> Result<()> {
    let kind = rule.kind()?;
    let cutoff = now - Duration::days(rule.action_delay_days.unwrap_or(0));

    // auto_delete skips review entirely, so pending candidates are in scope too
    let statuses: &[ReviewStatus] = if action == RuleAction::AutoDelete {
        &[ReviewStatus::Approved, ReviewStatus::Pending]
    } else {
        &[ReviewStatus::Approved]
    };

    let candidates = ctx.db.candidates();
    for &status in statuses {
        for candidate in candidates
            .eligible_for_action(rule.id, status, cutoff)
            .await?
        {
            match apply_action(ctx, action, kind, &candidate).await {
                Ok(()) => {
                    // CAS guard: a concurrent review flip means someone else
                    // decided; leave the row as they set it
                    let moved = candidates
                        .transition(candidate.id, status, ReviewStatus::Deleted)
                        .await?;
                    info!(
                        rule = %rule.name,
                        title = %candidate.title,
                        action = %action,
                        recorded = moved,
                        "Action executed"
                    );
                }
                Err(e) => {
                    warn!(
                        rule = %rule.name,
                        title = %candidate.title,
                        error = %e,
                        "Action failed, candidate left for next pass"
                    );
                }
            }
        }
    }

    Ok(())
}

async fn apply_action(
    ctx: &JobContext,
    action: RuleAction,
    kind: MediaKind,
    candidate: &CandidateRecord,
) -> Result<()> {
    let id = candidate.servarr_id;
    match action {
        RuleAction::AutoDelete => ctx.library.delete_file(kind, id).await,
        RuleAction::UnmonitorAndDelete => {
            ctx.library.set_monitored(kind, id, false).await?;
            ctx.library.delete_file(kind, id).await
        }
        RuleAction::UnmonitorAndKeep => ctx.library.set_monitored(kind, id, false).await,
        RuleAction::FlagForReview | RuleAction::NoOp => Ok(()),
    }
}
