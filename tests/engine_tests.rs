//! End-to-end tests over an in-memory database: rule storage, the candidate
//! review state machine, lease arbitration, and the scan/executor jobs wired
//! to a mock library manager.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use pretty_assertions::assert_eq;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use custodian::config::Config;
use custodian::db::{
    scan_lease_name, CandidateFilter, CreateCandidate, CreateRule, Database, ReviewStatus,
    RuleAction, ScanStatus, UpdateRule,
};
use custodian::jobs::{executor, scan, JobContext};
use custodian::media::{
    LibraryItem, LibraryManager, MediaKind, MediaReconciler, ReconcilerConfig,
};
use custodian::rules::{BoolOp, Condition, CriteriaNode, CriteriaValue, Group, Operator};

/// In-memory database; a single connection so every handle sees the same data
async fn test_db() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Database::new(pool);
    db.migrate().await.unwrap();
    db
}

fn monitored_equals(value: bool) -> Group {
    Group::new(
        BoolOp::And,
        vec![CriteriaNode::Condition(Condition::new(
            "monitored",
            Operator::Equals,
            CriteriaValue::Bool(value),
        ))],
    )
}

fn movie_rule(name: &str, action: RuleAction) -> CreateRule {
    CreateRule {
        name: name.to_string(),
        enabled: true,
        media_kind: MediaKind::Movie,
        criteria: monitored_equals(false),
        action,
        action_delay_days: None,
        schedule: None,
        library_instance: None,
    }
}

struct MockLibrary {
    items: Vec<LibraryItem>,
    unreachable: bool,
    deleted: Mutex<Vec<i64>>,
    unmonitored: Mutex<Vec<i64>>,
}

impl MockLibrary {
    fn new(items: Vec<LibraryItem>) -> Self {
        Self {
            items,
            unreachable: false,
            deleted: Mutex::new(Vec::new()),
            unmonitored: Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl LibraryManager for MockLibrary {
    async fn list_items(&self, _kind: MediaKind) -> Result<Vec<LibraryItem>> {
        if self.unreachable {
            anyhow::bail!("connection refused");
        }
        Ok(self.items.clone())
    }

    async fn delete_file(&self, _kind: MediaKind, id: i64) -> Result<()> {
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }

    async fn set_monitored(&self, _kind: MediaKind, id: i64, monitored: bool) -> Result<()> {
        if !monitored {
            self.unmonitored.lock().unwrap().push(id);
        }
        Ok(())
    }
}

fn library_item(id: i64, title: &str, monitored: bool) -> LibraryItem {
    LibraryItem {
        id,
        title: title.to_string(),
        year: Some(2020),
        external_catalog_id: Some(id * 100),
        monitored,
        has_file: true,
        file_size_bytes: Some(4_000_000_000),
        quality_profile: Some("HD-1080p".to_string()),
        tags: vec![],
        added_at: Some(Utc::now() - chrono::Duration::days(400)),
        season_count: None,
    }
}

fn test_config() -> Config {
    Config {
        port: 0,
        database_path: ":memory:".to_string(),
        radarr_url: None,
        radarr_api_key: None,
        sonarr_url: None,
        sonarr_api_key: None,
        tautulli_url: None,
        tautulli_api_key: None,
        plex_url: None,
        plex_token: None,
        overseerr_url: None,
        overseerr_api_key: None,
        qbittorrent_url: None,
        qbittorrent_username: None,
        qbittorrent_password: None,
        scan_concurrency: 2,
        source_timeout_secs: 1,
        scan_default_cron: "0 0 3 * * *".to_string(),
        executor_cron: "0 */15 * * * *".to_string(),
        lease_ttl_secs: 60,
    }
}

fn job_context(db: Database, library: Arc<MockLibrary>) -> JobContext {
    let config = Arc::new(test_config());
    let reconciler = Arc::new(MediaReconciler::new(
        library.clone(),
        ReconcilerConfig {
            concurrency: config.scan_concurrency,
            source_timeout: Duration::from_secs(config.source_timeout_secs),
        },
    ));
    JobContext::new(db, reconciler, library, config)
}

#[tokio::test]
async fn rule_crud_roundtrip() {
    let db = test_db().await;
    let rules = db.rules();

    let created = rules
        .create(movie_rule("Unwatched movies", RuleAction::FlagForReview))
        .await
        .unwrap();
    assert_eq!(created.name, "Unwatched movies");
    assert!(created.enabled);
    assert_eq!(created.criteria.0.children.len(), 1);

    let fetched = rules.get(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, created.name);
    assert_eq!(fetched.kind().unwrap(), MediaKind::Movie);

    let updated = rules
        .update(
            created.id,
            UpdateRule {
                name: Some("Stale movies".to_string()),
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Stale movies");
    assert!(!updated.enabled);
    assert!(updated.updated_at >= created.updated_at);

    assert!(rules.list_enabled().await.unwrap().is_empty());
    assert_eq!(rules.list().await.unwrap().len(), 1);

    assert!(rules.delete(created.id).await.unwrap());
    assert!(rules.get(created.id).await.unwrap().is_none());
    assert!(!rules.delete(created.id).await.unwrap());
}

#[tokio::test]
async fn flagging_is_idempotent_per_rule_and_item() {
    let db = test_db().await;
    let rule = db
        .rules()
        .create(movie_rule("r", RuleAction::FlagForReview))
        .await
        .unwrap();
    let scan = db.scans().create(rule.id).await.unwrap();
    let candidates = db.candidates();

    let data = CreateCandidate {
        scan_id: scan.id,
        rule_id: rule.id,
        media_kind: MediaKind::Movie,
        title: "Old Movie".to_string(),
        year: Some(2001),
        servarr_id: 7,
        external_catalog_id: Some(700),
    };
    assert!(candidates.flag(data.clone()).await.unwrap());
    assert!(!candidates.flag(data).await.unwrap());

    let listed = candidates.list(&CandidateFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status().unwrap(), ReviewStatus::Pending);
}

#[tokio::test]
async fn review_transitions_are_guarded() {
    let db = test_db().await;
    let rule = db
        .rules()
        .create(movie_rule("r", RuleAction::FlagForReview))
        .await
        .unwrap();
    let scan = db.scans().create(rule.id).await.unwrap();
    let candidates = db.candidates();

    candidates
        .flag(CreateCandidate {
            scan_id: scan.id,
            rule_id: rule.id,
            media_kind: MediaKind::Movie,
            title: "Old Movie".to_string(),
            year: Some(2001),
            servarr_id: 7,
            external_catalog_id: None,
        })
        .await
        .unwrap();
    let id = candidates.list(&CandidateFilter::default()).await.unwrap()[0].id;

    assert!(candidates.approve(id).await.unwrap());
    // A second reviewer's contradictory decision loses
    assert!(!candidates.reject(id).await.unwrap());
    let current = candidates.get(id).await.unwrap().unwrap();
    assert_eq!(current.status().unwrap(), ReviewStatus::Approved);
    assert!(current.reviewed_at.is_some());

    // Reset only applies to rejected candidates
    assert!(!candidates.reset(id).await.unwrap());
    assert!(candidates.transition(id, ReviewStatus::Approved, ReviewStatus::Pending).await.unwrap());
    assert!(candidates.reject(id).await.unwrap());
    assert!(candidates.reset(id).await.unwrap());
    assert_eq!(
        candidates.get(id).await.unwrap().unwrap().status().unwrap(),
        ReviewStatus::Pending
    );
}

#[tokio::test]
async fn leases_arbitrate_between_owners() {
    let db = test_db().await;
    let leases = db.leases();
    let name = scan_lease_name(Uuid::new_v4());
    let ttl = Duration::from_secs(60);

    assert!(leases.acquire(&name, "a", ttl).await.unwrap());
    assert!(!leases.acquire(&name, "b", ttl).await.unwrap());
    // The holder cannot re-acquire its own unexpired lease either; renewal
    // is the only way to extend a claim
    assert!(!leases.acquire(&name, "a", ttl).await.unwrap());
    assert!(leases.renew(&name, "a", ttl).await.unwrap());
    assert!(!leases.renew(&name, "b", ttl).await.unwrap());

    leases.release(&name, "b").await.unwrap();
    assert!(leases.get(&name).await.unwrap().is_some());
    leases.release(&name, "a").await.unwrap();
    assert!(leases.get(&name).await.unwrap().is_none());

    // An expired lease is stolen
    assert!(leases.acquire(&name, "b", Duration::ZERO).await.unwrap());
    assert!(leases.acquire(&name, "c", ttl).await.unwrap());
}

#[tokio::test]
async fn scan_flags_matching_items_and_records_counts() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::new(vec![
        library_item(1, "Keep Me", true),
        library_item(2, "Drop Me", false),
        library_item(3, "Drop Me Too", false),
    ]));
    let ctx = job_context(db.clone(), library);

    let rule = db
        .rules()
        .create(movie_rule("Unmonitored movies", RuleAction::FlagForReview))
        .await
        .unwrap();
    scan::run_scan(&ctx, rule.id).await.unwrap();

    let scans = db.scans().list_for_rule(rule.id, 10).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].scan_status().unwrap(), ScanStatus::Completed);
    assert_eq!(scans[0].evaluated, 3);
    assert_eq!(scans[0].matched, 2);
    assert_eq!(scans[0].errored, 0);
    assert!(scans[0].finished_at.is_some());

    let flagged = db.candidates().list(&CandidateFilter::default()).await.unwrap();
    assert_eq!(flagged.len(), 2);

    // Scan lease was released on completion
    assert!(db
        .leases()
        .get(&scan_lease_name(rule.id))
        .await
        .unwrap()
        .is_none());

    // Re-running flags nothing new
    scan::run_scan(&ctx, rule.id).await.unwrap();
    let flagged = db.candidates().list(&CandidateFilter::default()).await.unwrap();
    assert_eq!(flagged.len(), 2);
    assert_eq!(db.scans().list_for_rule(rule.id, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn second_fire_of_a_running_rule_is_skipped() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::new(vec![library_item(1, "Movie", false)]));
    let ctx = job_context(db.clone(), library);
    let rule = db
        .rules()
        .create(movie_rule("Guarded", RuleAction::FlagForReview))
        .await
        .unwrap();

    // The first run is mid-flight and holds the rule's lease
    let lease = scan_lease_name(rule.id);
    let leases = db.leases();
    assert!(leases
        .acquire(&lease, &ctx.owner_id, Duration::from_secs(600))
        .await
        .unwrap());

    // Cron fires again on the same replica; no second scan may start
    scan::run_scan(&ctx, rule.id).await.unwrap();
    assert!(db.scans().list_for_rule(rule.id, 10).await.unwrap().is_empty());
    assert!(db.candidates().list(&CandidateFilter::default()).await.unwrap().is_empty());

    // The in-flight run still holds its guard
    let held = leases.get(&lease).await.unwrap().unwrap();
    assert_eq!(held.owner, ctx.owner_id);
}

#[tokio::test]
async fn failed_scan_still_releases_its_lease() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::unreachable());
    let ctx = job_context(db.clone(), library);
    let rule = db
        .rules()
        .create(movie_rule("Flaky upstream", RuleAction::FlagForReview))
        .await
        .unwrap();

    scan::run_scan(&ctx, rule.id).await.unwrap();

    let scans = db.scans().list_for_rule(rule.id, 10).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].scan_status().unwrap(), ScanStatus::Failed);
    assert!(db
        .leases()
        .get(&scan_lease_name(rule.id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn disabled_rule_does_not_scan() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::new(vec![library_item(1, "Movie", false)]));
    let ctx = job_context(db.clone(), library);

    let mut rule = movie_rule("Disabled", RuleAction::FlagForReview);
    rule.enabled = false;
    let rule = db.rules().create(rule).await.unwrap();

    scan::run_scan(&ctx, rule.id).await.unwrap();
    assert!(db.scans().list_for_rule(rule.id, 10).await.unwrap().is_empty());
    assert!(db.candidates().list(&CandidateFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn executor_runs_approved_candidates_only() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::new(vec![
        library_item(1, "Approved", false),
        library_item(2, "Still Pending", false),
    ]));
    let ctx = job_context(db.clone(), library.clone());

    let rule = db
        .rules()
        .create(movie_rule("Cleanup", RuleAction::UnmonitorAndDelete))
        .await
        .unwrap();
    scan::run_scan(&ctx, rule.id).await.unwrap();

    let candidates = db.candidates();
    let flagged = candidates.list(&CandidateFilter::default()).await.unwrap();
    let approved = flagged.iter().find(|c| c.servarr_id == 1).unwrap();
    assert!(candidates.approve(approved.id).await.unwrap());

    executor::run_action_pass(&ctx).await.unwrap();

    assert_eq!(*library.unmonitored.lock().unwrap(), vec![1]);
    assert_eq!(*library.deleted.lock().unwrap(), vec![1]);

    let after = candidates.get(approved.id).await.unwrap().unwrap();
    assert_eq!(after.status().unwrap(), ReviewStatus::Deleted);
    let pending = flagged.iter().find(|c| c.servarr_id == 2).unwrap();
    assert_eq!(
        candidates.get(pending.id).await.unwrap().unwrap().status().unwrap(),
        ReviewStatus::Pending
    );
}

#[tokio::test]
async fn executor_honors_action_delay() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::new(vec![library_item(1, "Fresh", false)]));
    let ctx = job_context(db.clone(), library.clone());

    let mut rule = movie_rule("Delayed cleanup", RuleAction::UnmonitorAndKeep);
    rule.action_delay_days = Some(7);
    let rule = db.rules().create(rule).await.unwrap();
    scan::run_scan(&ctx, rule.id).await.unwrap();

    let candidates = db.candidates();
    let id = candidates.list(&CandidateFilter::default()).await.unwrap()[0].id;
    assert!(candidates.approve(id).await.unwrap());

    // Flagged just now, so a 7 day delay holds the action back
    executor::run_action_pass(&ctx).await.unwrap();
    assert!(library.unmonitored.lock().unwrap().is_empty());
    assert_eq!(
        candidates.get(id).await.unwrap().unwrap().status().unwrap(),
        ReviewStatus::Approved
    );
}

#[tokio::test]
async fn auto_delete_acts_on_pending_candidates() {
    let db = test_db().await;
    let library = Arc::new(MockLibrary::new(vec![library_item(9, "Doomed", false)]));
    let ctx = job_context(db.clone(), library.clone());

    let rule = db
        .rules()
        .create(movie_rule("Hard cleanup", RuleAction::AutoDelete))
        .await
        .unwrap();
    scan::run_scan(&ctx, rule.id).await.unwrap();
    executor::run_action_pass(&ctx).await.unwrap();

    assert_eq!(*library.deleted.lock().unwrap(), vec![9]);
    let after = db.candidates().list(&CandidateFilter::default()).await.unwrap();
    assert_eq!(after[0].status().unwrap(), ReviewStatus::Deleted);
}

#[tokio::test]
async fn file_backed_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custodian.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::connect(path).await.unwrap();
        db.migrate().await.unwrap();
        db.rules()
            .create(movie_rule("persisted", RuleAction::NoOp))
            .await
            .unwrap();
    }

    let db = Database::connect(path).await.unwrap();
    db.migrate().await.unwrap();
    let rules = db.rules().list().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "persisted");
    assert_matches!(rules[0].rule_action().unwrap(), RuleAction::NoOp);
}

#[tokio::test]
async fn scan_history_is_newest_first_and_limited() {
    let db = test_db().await;
    let rule = db
        .rules()
        .create(movie_rule("r", RuleAction::FlagForReview))
        .await
        .unwrap();
    let scans = db.scans();

    let first = scans.create(rule.id).await.unwrap();
    scans.mark_running(first.id).await.unwrap();
    scans.fail(first.id, "library manager unreachable", Default::default())
        .await
        .unwrap();
    let second = scans.create(rule.id).await.unwrap();
    scans.mark_running(second.id).await.unwrap();
    scans.complete(second.id, Default::default()).await.unwrap();

    let history = scans.list_for_rule(rule.id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[0].scan_status().unwrap(), ScanStatus::Completed);
    assert_eq!(history[1].scan_status().unwrap(), ScanStatus::Failed);
    assert_eq!(
        history[1].failure_reason.as_deref(),
        Some("library manager unreachable")
    );

    assert_eq!(scans.list_for_rule(rule.id, 1).await.unwrap().len(), 1);
}
