//! Rule evaluation
//!
//! `evaluate` walks a criteria tree against one unified item: pure, no I/O,
//! total. AND groups short-circuit on the first false child, OR groups on the
//! first true child, children in declaration order.
//!
//! Null policy: a null/absent field value satisfies only `equals null` (and
//! `not_equals` a non-null value). Every ordered comparison, date comparison,
//! `in`, `contains` and `contains_any` evaluates to false against null, so a
//! missing facet can never push an item toward deletion.

use chrono::{DateTime, Duration, Utc};

use crate::media::{FieldValue, UnifiedMediaItem};

use super::criteria::{Condition, CriteriaNode, CriteriaValue, Group, Operator, Unit};

/// Evaluate a criteria tree against one item at a fixed instant.
///
/// `now` is passed in rather than read from the clock so a whole scan shares
/// one reference instant and tests are deterministic.
pub fn evaluate(root: &Group, item: &UnifiedMediaItem, now: DateTime<Utc>) -> bool {
    eval_group(root, item, now)
}

fn eval_group(group: &Group, item: &UnifiedMediaItem, now: DateTime<Utc>) -> bool {
    use super::criteria::BoolOp;

    match group.operator {
        BoolOp::And => group.children.iter().all(|c| eval_node(c, item, now)),
        BoolOp::Or => group.children.iter().any(|c| eval_node(c, item, now)),
    }
}

fn eval_node(node: &CriteriaNode, item: &UnifiedMediaItem, now: DateTime<Utc>) -> bool {
    match node {
        CriteriaNode::Group(g) => eval_group(g, item, now),
        CriteriaNode::Condition(c) => eval_condition(c, item, now),
    }
}

fn eval_condition(cond: &Condition, item: &UnifiedMediaItem, now: DateTime<Utc>) -> bool {
    let actual = item.field(&cond.field);

    match cond.operator {
        Operator::Equals => equals(&actual, &cond.value, cond.unit),
        Operator::NotEquals => !equals(&actual, &cond.value, cond.unit),
        Operator::LessThan => compare(&actual, cond).map(|o| o.is_lt()).unwrap_or(false),
        Operator::LessThanOrEqual => compare(&actual, cond).map(|o| o.is_le()).unwrap_or(false),
        Operator::GreaterThan => compare(&actual, cond).map(|o| o.is_gt()).unwrap_or(false),
        Operator::GreaterThanOrEqual => {
            compare(&actual, cond).map(|o| o.is_ge()).unwrap_or(false)
        }
        Operator::OlderThan => age_exceeds(&actual, cond, now).unwrap_or(false),
        Operator::NewerThan => age_exceeds(&actual, cond, now).map(|b| !b).unwrap_or(false),
        Operator::In => is_member(&actual, &cond.value),
        Operator::Contains => contains(&actual, &cond.value),
        Operator::ContainsAny => contains_any(&actual, &cond.value),
    }
}

fn text_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn equals(actual: &FieldValue, expected: &CriteriaValue, unit: Option<Unit>) -> bool {
    match (actual, expected) {
        (FieldValue::Null, CriteriaValue::Null) => true,
        (FieldValue::Bool(a), CriteriaValue::Bool(b)) => a == b,
        (FieldValue::Number(a), CriteriaValue::Number(b)) => *a == scale(*b, unit),
        (FieldValue::Text(a), CriteriaValue::Text(b)) => text_eq(a, b),
        _ => false,
    }
}

/// Scale a condition value by its size unit, when one is attached
fn scale(value: f64, unit: Option<Unit>) -> f64 {
    match unit {
        Some(u) if u.is_size() => value * u.bytes(),
        _ => value,
    }
}

fn compare(actual: &FieldValue, cond: &Condition) -> Option<std::cmp::Ordering> {
    let (FieldValue::Number(a), CriteriaValue::Number(b)) = (actual, &cond.value) else {
        return None;
    };
    a.partial_cmp(&scale(*b, cond.unit))
}

/// True when `now - actual` exceeds the condition's duration. None for null
/// or non-date actuals, which the caller maps to false either way.
fn age_exceeds(actual: &FieldValue, cond: &Condition, now: DateTime<Utc>) -> Option<bool> {
    let FieldValue::Date(at) = actual else {
        return None;
    };
    let CriteriaValue::Number(value) = cond.value else {
        return None;
    };
    let unit = cond.unit.unwrap_or(Unit::Days);
    let threshold = Duration::seconds((value * unit.seconds()) as i64);
    Some(now.signed_duration_since(*at) > threshold)
}

fn is_member(actual: &FieldValue, expected: &CriteriaValue) -> bool {
    match (actual, expected) {
        (FieldValue::Text(a), CriteriaValue::TextList(list)) => {
            list.iter().any(|v| text_eq(a, v))
        }
        (FieldValue::Number(a), CriteriaValue::NumberList(list)) => list.contains(a),
        _ => false,
    }
}

fn contains(actual: &FieldValue, expected: &CriteriaValue) -> bool {
    let CriteriaValue::Text(needle) = expected else {
        return false;
    };
    match actual {
        FieldValue::Text(haystack) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        FieldValue::TextList(list) => list.iter().any(|v| text_eq(v, needle)),
        _ => false,
    }
}

fn contains_any(actual: &FieldValue, expected: &CriteriaValue) -> bool {
    let (FieldValue::TextList(have), CriteriaValue::TextList(want)) = (actual, expected) else {
        return false;
    };
    have.iter().any(|h| want.iter().any(|w| text_eq(h, w)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{
        LibraryFacet, MediaIdentity, MediaKind, ServerFacet, UnifiedMediaItem, WatchFacet,
    };
    use crate::rules::criteria::BoolOp;

    fn item() -> UnifiedMediaItem {
        let mut item = UnifiedMediaItem::new(MediaIdentity {
            kind: MediaKind::Movie,
            title: "The Matrix".to_string(),
            year: Some(1999),
            servarr_id: 42,
            external_catalog_id: Some(603),
        });
        item.library = Some(LibraryFacet {
            monitored: true,
            has_file: true,
            file_size_bytes: Some(8 * 1_073_741_824),
            quality_profile: Some("HD-1080p".to_string()),
            tags: vec!["action".to_string(), "scifi".to_string()],
            added_at: Some(Utc::now() - Duration::days(400)),
            season_count: None,
        });
        item
    }

    fn cond(field: &str, op: Operator, value: CriteriaValue) -> CriteriaNode {
        CriteriaNode::Condition(Condition::new(field, op, value))
    }

    /// A condition that matches the fixture item
    fn truthy() -> CriteriaNode {
        cond("monitored", Operator::Equals, CriteriaValue::Bool(true))
    }

    /// A condition that does not
    fn falsy() -> CriteriaNode {
        cond("monitored", Operator::Equals, CriteriaValue::Bool(false))
    }

    #[test]
    fn test_and_or_truth_tables() {
        let now = Utc::now();
        let item = item();
        let evals = |op, children| evaluate(&Group::new(op, children), &item, now);

        assert!(evals(BoolOp::And, vec![truthy(), truthy()]));
        assert!(!evals(BoolOp::And, vec![truthy(), falsy()]));
        assert!(!evals(BoolOp::Or, vec![falsy(), falsy()]));
        assert!(evals(BoolOp::Or, vec![falsy(), truthy()]));
    }

    #[test]
    fn test_nested_groups() {
        let tree = Group::new(
            BoolOp::And,
            vec![
                truthy(),
                CriteriaNode::Group(Group::new(BoolOp::Or, vec![falsy(), truthy()])),
            ],
        );
        assert!(evaluate(&tree, &item(), Utc::now()));
    }

    #[test]
    fn test_text_equals_case_insensitive() {
        let tree = Group::new(
            BoolOp::And,
            vec![cond(
                "quality_profile",
                Operator::Equals,
                CriteriaValue::Text("hd-1080p".to_string()),
            )],
        );
        assert!(evaluate(&tree, &item(), Utc::now()));
    }

    #[test]
    fn test_size_unit_scaling() {
        // 8 GiB on disk: > 5 gigabytes matches, > 10 gigabytes does not
        let gt = |n: f64| {
            CriteriaNode::Condition(
                Condition::new(
                    "file_size_bytes",
                    Operator::GreaterThan,
                    CriteriaValue::Number(n),
                )
                .with_unit(Unit::Gigabytes),
            )
        };
        assert!(evaluate(
            &Group::new(BoolOp::And, vec![gt(5.0)]),
            &item(),
            Utc::now()
        ));
        assert!(!evaluate(
            &Group::new(BoolOp::And, vec![gt(10.0)]),
            &item(),
            Utc::now()
        ));
    }

    #[test]
    fn test_older_than_and_newer_than() {
        let now = Utc::now();
        let mut item = item();
        item.watch = Some(WatchFacet {
            play_count: 1,
            last_watched_at: Some(now - Duration::days(120)),
            ..Default::default()
        });

        let aged = |op, days: f64| {
            Group::new(
                BoolOp::And,
                vec![CriteriaNode::Condition(
                    Condition::new("last_watched_at", op, CriteriaValue::Number(days))
                        .with_unit(Unit::Days),
                )],
            )
        };

        assert!(evaluate(&aged(Operator::OlderThan, 90.0), &item, now));
        assert!(!evaluate(&aged(Operator::OlderThan, 180.0), &item, now));
        assert!(evaluate(&aged(Operator::NewerThan, 180.0), &item, now));
    }

    #[test]
    fn test_null_policy_scenario() {
        // lastWatchedAt olderThan 90 days AND playCount equals 0, against an
        // item with lastWatchedAt = null and playCount = 0: the null date
        // fails older_than, so the whole rule is false. Age-based rules do
        // not match never-watched items; the never_watched field exists for
        // that intent.
        let now = Utc::now();
        let mut item = item();
        item.watch = Some(WatchFacet {
            play_count: 0,
            last_watched_at: None,
            ..Default::default()
        });

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
                cond("play_count", Operator::Equals, CriteriaValue::Number(0.0)),
            ],
        );

        assert!(!evaluate(&tree, &item, now));

        // The second conjunct alone does hold
        let just_plays = Group::new(
            BoolOp::And,
            vec![cond("play_count", Operator::Equals, CriteriaValue::Number(0.0))],
        );
        assert!(evaluate(&just_plays, &item, now));
    }

    #[test]
    fn test_null_satisfies_equals_null() {
        let tree = Group::new(
            BoolOp::And,
            vec![cond("last_watched_at", Operator::Equals, CriteriaValue::Null)],
        );
        assert!(evaluate(&tree, &item(), Utc::now()));
    }

    #[test]
    fn test_null_fails_ordered_comparisons() {
        // No watch facet: play_count resolves to null
        let item = item();
        for op in [
            Operator::LessThan,
            Operator::LessThanOrEqual,
            Operator::GreaterThan,
            Operator::GreaterThanOrEqual,
        ] {
            let tree = Group::new(
                BoolOp::And,
                vec![cond("play_count", op, CriteriaValue::Number(100.0))],
            );
            assert!(!evaluate(&tree, &item, Utc::now()), "{:?}", op);
        }
    }

    #[test]
    fn test_never_watched_condition() {
        let now = Utc::now();
        let mut fresh = item();
        fresh.watch = Some(WatchFacet::default());
        let tree = Group::new(
            BoolOp::And,
            vec![cond("never_watched", Operator::Equals, CriteriaValue::Bool(true))],
        );
        assert!(evaluate(&tree, &fresh, now));

        let mut seen = item();
        seen.server = Some(ServerFacet {
            view_count: 4,
            ..Default::default()
        });
        assert!(!evaluate(&tree, &seen, now));
    }

    #[test]
    fn test_in_and_contains_operators() {
        let now = Utc::now();
        let item = item();

        let year_in = Group::new(
            BoolOp::And,
            vec![cond(
                "year",
                Operator::In,
                CriteriaValue::NumberList(vec![1999.0, 2003.0]),
            )],
        );
        assert!(evaluate(&year_in, &item, now));

        let title_contains = Group::new(
            BoolOp::And,
            vec![cond(
                "title",
                Operator::Contains,
                CriteriaValue::Text("matrix".to_string()),
            )],
        );
        assert!(evaluate(&title_contains, &item, now));

        let tags_any = Group::new(
            BoolOp::And,
            vec![cond(
                "tags",
                Operator::ContainsAny,
                CriteriaValue::TextList(vec!["SCIFI".to_string(), "drama".to_string()]),
            )],
        );
        assert!(evaluate(&tags_any, &item, now));

        let tags_none = Group::new(
            BoolOp::And,
            vec![cond(
                "tags",
                Operator::ContainsAny,
                CriteriaValue::TextList(vec!["drama".to_string()]),
            )],
        );
        assert!(!evaluate(&tags_none, &item, now));
    }
}
