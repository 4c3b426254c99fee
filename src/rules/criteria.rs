//! Criteria tree types
//!
//! A rule's match logic is a recursive boolean expression: a `Group` (AND/OR
//! over one or more children) whose leaves are `Condition`s (field, operator,
//! value, optional unit). The tree root is always a Group. Implemented as a
//! tagged sum type so the validator and evaluator share one traversal shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Boolean combinator for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
}

/// Comparison operator applied by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Date field is further in the past than `value` of `unit`
    OlderThan,
    /// Date field is more recent than `value` of `unit`
    NewerThan,
    In,
    Contains,
    ContainsAny,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::LessThan => "less_than",
            Operator::LessThanOrEqual => "less_than_or_equal",
            Operator::GreaterThan => "greater_than",
            Operator::GreaterThanOrEqual => "greater_than_or_equal",
            Operator::OlderThan => "older_than",
            Operator::NewerThan => "newer_than",
            Operator::In => "in",
            Operator::Contains => "contains",
            Operator::ContainsAny => "contains_any",
        };
        write!(f, "{}", s)
    }
}

/// Unit attached to a condition value, for time and size fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
}

impl Unit {
    pub fn is_time(&self) -> bool {
        matches!(self, Unit::Seconds | Unit::Minutes | Unit::Hours | Unit::Days)
    }

    pub fn is_size(&self) -> bool {
        !self.is_time()
    }

    /// Seconds per unit; zero for size units
    pub fn seconds(&self) -> f64 {
        match self {
            Unit::Seconds => 1.0,
            Unit::Minutes => 60.0,
            Unit::Hours => 3_600.0,
            Unit::Days => 86_400.0,
            _ => 0.0,
        }
    }

    /// Bytes per unit (1024-based); zero for time units
    pub fn bytes(&self) -> f64 {
        match self {
            Unit::Bytes => 1.0,
            Unit::Kilobytes => 1_024.0,
            Unit::Megabytes => 1_048_576.0,
            Unit::Gigabytes => 1_073_741_824.0,
            _ => 0.0,
        }
    }
}

/// A condition's comparison value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriteriaValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    NumberList(Vec<f64>),
    TextList(Vec<String>),
}

/// Leaf node: one field comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub field: String,
    pub operator: Operator,
    pub value: CriteriaValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: CriteriaValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            field: field.to_string(),
            operator,
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Interior node: AND/OR over one or more children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub operator: BoolOp,
    pub children: Vec<CriteriaNode>,
}

impl Group {
    pub fn new(operator: BoolOp, children: Vec<CriteriaNode>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operator,
            children,
        }
    }
}

/// One node of a criteria tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriteriaNode {
    Condition(Condition),
    Group(Group),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tree_round_trips_through_json() {
        let tree = Group::new(
            BoolOp::And,
            vec![
                CriteriaNode::Condition(
                    Condition::new(
                        "last_watched_at",
                        Operator::OlderThan,
                        CriteriaValue::Number(90.0),
                    )
                    .with_unit(Unit::Days),
                ),
                CriteriaNode::Group(Group::new(
                    BoolOp::Or,
                    vec![CriteriaNode::Condition(Condition::new(
                        "play_count",
                        Operator::Equals,
                        CriteriaValue::Number(0.0),
                    ))],
                )),
            ],
        );

        let json = serde_json::to_string(&tree).unwrap();
        let back: Group = serde_json::from_str(&json).unwrap();
        assert_eq!(back.children.len(), 2);
        assert_eq!(back.operator, BoolOp::And);
        match &back.children[0] {
            CriteriaNode::Condition(c) => {
                assert_eq!(c.operator, Operator::OlderThan);
                assert_eq!(c.unit, Some(Unit::Days));
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }

    #[test]
    fn test_deserializes_without_ids() {
        let json = r#"{
            "operator": "and",
            "children": [
                {"kind": "condition", "field": "never_watched", "operator": "equals", "value": true}
            ]
        }"#;
        let tree: Group = serde_json::from_str(json).unwrap();
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn test_value_variants_deserialize() {
        assert_eq!(
            serde_json::from_str::<CriteriaValue>("null").unwrap(),
            CriteriaValue::Null
        );
        assert_eq!(
            serde_json::from_str::<CriteriaValue>("true").unwrap(),
            CriteriaValue::Bool(true)
        );
        assert_eq!(
            serde_json::from_str::<CriteriaValue>("4.5").unwrap(),
            CriteriaValue::Number(4.5)
        );
        assert_eq!(
            serde_json::from_str::<CriteriaValue>(r#"["a","b"]"#).unwrap(),
            CriteriaValue::TextList(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            serde_json::from_str::<CriteriaValue>("[1,2]").unwrap(),
            CriteriaValue::NumberList(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(Unit::Days.seconds(), 86_400.0);
        assert_eq!(Unit::Gigabytes.bytes(), 1_073_741_824.0);
        assert!(Unit::Days.is_time());
        assert!(Unit::Megabytes.is_size());
    }
}
