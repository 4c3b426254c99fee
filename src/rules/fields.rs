//! Field registry
//!
//! Static catalog of every attribute a condition may evaluate: its value
//! type, the operators allowed on it, the media kinds it applies to and the
//! unit domain (time/size) when one applies. Kept data-driven so adding a
//! field never touches the evaluator.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::media::MediaKind;

use super::criteria::Operator;

/// Declared type of a field's values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Number,
    Boolean,
    Date,
    TextList,
}

/// Unit family a field's conditions may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitDomain {
    Time,
    Size,
}

/// One registry entry
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub key: &'static str,
    pub value_type: ValueType,
    pub operators: &'static [Operator],
    pub kinds: &'static [MediaKind],
    pub unit: Option<UnitDomain>,
}

impl FieldDef {
    pub fn allows_operator(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }

    pub fn applies_to(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }
}

const BOTH: &[MediaKind] = &[MediaKind::Movie, MediaKind::Series];

const TEXT_OPS: &[Operator] = &[
    Operator::Equals,
    Operator::NotEquals,
    Operator::Contains,
    Operator::In,
];

const NUMBER_OPS: &[Operator] = &[
    Operator::Equals,
    Operator::NotEquals,
    Operator::LessThan,
    Operator::LessThanOrEqual,
    Operator::GreaterThan,
    Operator::GreaterThanOrEqual,
    Operator::In,
];

const SIZE_OPS: &[Operator] = &[
    Operator::Equals,
    Operator::LessThan,
    Operator::LessThanOrEqual,
    Operator::GreaterThan,
    Operator::GreaterThanOrEqual,
];

const DATE_OPS: &[Operator] = &[Operator::OlderThan, Operator::NewerThan, Operator::Equals];

const BOOL_OPS: &[Operator] = &[Operator::Equals, Operator::NotEquals];

const LIST_OPS: &[Operator] = &[Operator::Contains, Operator::ContainsAny];

macro_rules! field {
    ($key:literal, $vt:ident, $ops:expr, $kinds:expr, $unit:expr) => {
        FieldDef {
            key: $key,
            value_type: ValueType::$vt,
            operators: $ops,
            kinds: $kinds,
            unit: $unit,
        }
    };
}

static DEFS: &[FieldDef] = &[
    // Identity
    field!("title", Text, TEXT_OPS, BOTH, None),
    field!("year", Number, NUMBER_OPS, BOTH, None),
    field!("added_at", Date, DATE_OPS, BOTH, Some(UnitDomain::Time)),
    // Library manager facet
    field!("monitored", Boolean, BOOL_OPS, BOTH, None),
    field!("has_file", Boolean, BOOL_OPS, BOTH, None),
    field!("file_size_bytes", Number, SIZE_OPS, BOTH, Some(UnitDomain::Size)),
    field!("quality_profile", Text, TEXT_OPS, BOTH, None),
    field!("tags", TextList, LIST_OPS, BOTH, None),
    field!("season_count", Number, NUMBER_OPS, &[MediaKind::Series], None),
    // Watch-history facet
    field!("play_count", Number, NUMBER_OPS, BOTH, None),
    field!("last_watched_at", Date, DATE_OPS, BOTH, Some(UnitDomain::Time)),
    field!("never_watched", Boolean, &[Operator::Equals], BOTH, None),
    field!("codec", Text, TEXT_OPS, BOTH, None),
    field!("resolution", Text, TEXT_OPS, BOTH, None),
    // Media-server facet
    field!("view_count", Number, NUMBER_OPS, BOTH, None),
    field!("last_viewed_at", Date, DATE_OPS, BOTH, Some(UnitDomain::Time)),
    field!("rating", Number, NUMBER_OPS, BOTH, None),
    field!("collections", TextList, LIST_OPS, BOTH, None),
    // Request-broker facet
    field!("request_status", Text, TEXT_OPS, BOTH, None),
    field!("has_request", Boolean, BOOL_OPS, BOTH, None),
    field!("requested_by", Text, TEXT_OPS, BOTH, None),
    field!("requested_at", Date, DATE_OPS, BOTH, Some(UnitDomain::Time)),
    // Download-manager facet
    field!("downloading", Boolean, BOOL_OPS, BOTH, None),
];

static REGISTRY: Lazy<HashMap<&'static str, &'static FieldDef>> =
    Lazy::new(|| DEFS.iter().map(|def| (def.key, def)).collect());

/// Look up a field definition by key
pub fn lookup(key: &str) -> Option<&'static FieldDef> {
    REGISTRY.get(key).copied()
}

/// All registered fields, for the rule-authoring surface
pub fn all() -> impl Iterator<Item = &'static FieldDef> {
    DEFS.iter()
}
