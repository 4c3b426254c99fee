//! Rule database repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::media::MediaKind;
use crate::rules::Group;

/// What the action executor does with a rule's candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Stop at candidate creation, await human review
    FlagForReview,
    /// Delete without a review step once the delay elapses
    AutoDelete,
    UnmonitorAndDelete,
    UnmonitorAndKeep,
    NoOp,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleAction::FlagForReview => "flag_for_review",
            RuleAction::AutoDelete => "auto_delete",
            RuleAction::UnmonitorAndDelete => "unmonitor_and_delete",
            RuleAction::UnmonitorAndKeep => "unmonitor_and_keep",
            RuleAction::NoOp => "no_op",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RuleAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flag_for_review" => Ok(RuleAction::FlagForReview),
            "auto_delete" => Ok(RuleAction::AutoDelete),
            "unmonitor_and_delete" => Ok(RuleAction::UnmonitorAndDelete),
            "unmonitor_and_keep" => Ok(RuleAction::UnmonitorAndKeep),
            "no_op" => Ok(RuleAction::NoOp),
            _ => Err(anyhow::anyhow!("Unknown rule action: {}", s)),
        }
    }
}

impl RuleAction {
    /// Whether the executor has anything to do for this action
    pub fn is_actionable(&self) -> bool {
        !matches!(self, RuleAction::FlagForReview | RuleAction::NoOp)
    }
}

/// Rule record from database
#[derive(Debug, Clone, FromRow)]
pub struct RuleRecord {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub media_kind: String,
    pub criteria: sqlx::types::Json<Group>,
    pub action: String,
    pub action_delay_days: Option<i64>,
    pub schedule: Option<String>,
    pub library_instance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl RuleRecord {
    pub fn kind(&self) -> Result<MediaKind> {
        self.media_kind.parse()
    }

    pub fn rule_action(&self) -> Result<RuleAction> {
        self.action.parse()
    }
}

/// Data for creating a new rule
#[derive(Debug, Clone)]
pub struct CreateRule {
    pub name: String,
    pub enabled: bool,
    pub media_kind: MediaKind,
    pub criteria: Group,
    pub action: RuleAction,
    pub action_delay_days: Option<i64>,
    pub schedule: Option<String>,
    pub library_instance: Option<String>,
}

/// Data for updating a rule; unset fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct UpdateRule {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub criteria: Option<Group>,
    pub action: Option<RuleAction>,
    pub action_delay_days: Option<i64>,
    pub schedule: Option<String>,
    pub library_instance: Option<String>,
}

const RULE_COLUMNS: &str = "id, name, enabled, media_kind, criteria, action, action_delay_days, \
                            schedule, library_instance, created_at, updated_at, last_run_at";

/// Rules database repository
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: CreateRule) -> Result<RuleRecord> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, RuleRecord>(&format!(
            r#"
            INSERT INTO rules (
                id, name, enabled, media_kind, criteria, action,
                action_delay_days, schedule, library_instance, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&data.name)
        .bind(data.enabled)
        .bind(data.media_kind.to_string())
        .bind(sqlx::types::Json(&data.criteria))
        .bind(data.action.to_string())
        .bind(data.action_delay_days)
        .bind(&data.schedule)
        .bind(&data.library_instance)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<RuleRecord>> {
        let record = sqlx::query_as::<_, RuleRecord>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<RuleRecord>> {
        let records = sqlx::query_as::<_, RuleRecord>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn list_enabled(&self) -> Result<Vec<RuleRecord>> {
        let records = sqlx::query_as::<_, RuleRecord>(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE enabled = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn update(&self, id: Uuid, data: UpdateRule) -> Result<RuleRecord> {
        // Build dynamic update query
        let mut set_clauses = Vec::new();
        let mut param_idx = 2; // $1 is the ID

        if data.name.is_some() {
            set_clauses.push(format!("name = ${}", param_idx));
            param_idx += 1;
        }
        if data.enabled.is_some() {
            set_clauses.push(format!("enabled = ${}", param_idx));
            param_idx += 1;
        }
        if data.criteria.is_some() {
            set_clauses.push(format!("criteria = ${}", param_idx));
            param_idx += 1;
        }
        if data.action.is_some() {
            set_clauses.push(format!("action = ${}", param_idx));
            param_idx += 1;
        }
        if data.action_delay_days.is_some() {
            set_clauses.push(format!("action_delay_days = ${}", param_idx));
            param_idx += 1;
        }
        if data.schedule.is_some() {
            set_clauses.push(format!("schedule = ${}", param_idx));
            param_idx += 1;
        }
        if data.library_instance.is_some() {
            set_clauses.push(format!("library_instance = ${}", param_idx));
            param_idx += 1;
        }

        if set_clauses.is_empty() {
            return self
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Rule not found"));
        }

        set_clauses.push(format!("updated_at = ${}", param_idx));

        let query = format!(
            "UPDATE rules SET {} WHERE id = $1 RETURNING {RULE_COLUMNS}",
            set_clauses.join(", ")
        );

        let mut query_builder = sqlx::query_as::<_, RuleRecord>(&query).bind(id);

        if let Some(ref name) = data.name {
            query_builder = query_builder.bind(name);
        }
        if let Some(enabled) = data.enabled {
            query_builder = query_builder.bind(enabled);
        }
        if let Some(ref criteria) = data.criteria {
            query_builder = query_builder.bind(sqlx::types::Json(criteria));
        }
        if let Some(action) = data.action {
            query_builder = query_builder.bind(action.to_string());
        }
        if let Some(delay) = data.action_delay_days {
            query_builder = query_builder.bind(delay);
        }
        if let Some(ref schedule) = data.schedule {
            query_builder = query_builder.bind(schedule);
        }
        if let Some(ref instance) = data.library_instance {
            query_builder = query_builder.bind(instance);
        }
        query_builder = query_builder.bind(Utc::now());

        let record = query_builder.fetch_one(&self.pool).await?;

        Ok(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Engine bookkeeping: record when a scan of this rule last ran
    pub async fn touch_last_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE rules SET last_run_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
