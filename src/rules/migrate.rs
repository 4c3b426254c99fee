//! Legacy rule migration
//!
//! One-way, deterministic conversion from the flat legacy rule shape into a
//! criteria tree: one condition per populated legacy field, combined under the
//! legacy operator (AND when unset). Size thresholds are normalized to bytes
//! on the way through. An empty legacy rule yields a single
//! `never_watched equals true` condition so the result is never an invalid
//! empty tree.

use serde::Deserialize;

use super::criteria::{BoolOp, Condition, CriteriaNode, CriteriaValue, Group, Operator, Unit};

/// A magnitude with its unit, as the legacy shape stored thresholds
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ValueWithUnit {
    pub value: f64,
    pub unit: Unit,
}

/// The flat legacy rule shape
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LegacyRule {
    pub operator: Option<BoolOp>,
    pub never_watched: Option<bool>,
    pub last_watched_before: Option<ValueWithUnit>,
    pub max_play_count: Option<f64>,
    pub min_file_size: Option<ValueWithUnit>,
    pub tags: Vec<String>,
    /// Legacy library scoping. Accepted but not carried into the tree: no
    /// criteria field exists for it, and a rule already scopes its scans to
    /// one library instance.
    pub library_ids: Vec<i64>,
}

/// Convert a legacy rule into a criteria tree
pub fn migrate(legacy: &LegacyRule) -> Group {
    let mut children = Vec::new();

    if let Some(flag) = legacy.never_watched {
        children.push(CriteriaNode::Condition(Condition::new(
            "never_watched",
            Operator::Equals,
            CriteriaValue::Bool(flag),
        )));
    }

    if let Some(before) = legacy.last_watched_before {
        children.push(CriteriaNode::Condition(
            Condition::new(
                "last_watched_at",
                Operator::OlderThan,
                CriteriaValue::Number(before.value),
            )
            .with_unit(if before.unit.is_time() {
                before.unit
            } else {
                Unit::Days
            }),
        ));
    }

    if let Some(max) = legacy.max_play_count {
        children.push(CriteriaNode::Condition(Condition::new(
            "play_count",
            Operator::LessThanOrEqual,
            CriteriaValue::Number(max),
        )));
    }

    if let Some(min) = legacy.min_file_size {
        // Normalize to bytes so the migrated condition carries no unit
        let bytes = min.value * if min.unit.is_size() { min.unit.bytes() } else { 1.0 };
        children.push(CriteriaNode::Condition(
            Condition::new(
                "file_size_bytes",
                Operator::GreaterThanOrEqual,
                CriteriaValue::Number(bytes),
            )
            .with_unit(Unit::Bytes),
        ));
    }

    if !legacy.tags.is_empty() {
        children.push(CriteriaNode::Condition(Condition::new(
            "tags",
            Operator::ContainsAny,
            CriteriaValue::TextList(legacy.tags.clone()),
        )));
    }

    if children.is_empty() {
        children.push(CriteriaNode::Condition(Condition::new(
            "never_watched",
            Operator::Equals,
            CriteriaValue::Bool(true),
        )));
    }

    Group::new(legacy.operator.unwrap_or(BoolOp::And), children)
}
