//! Criteria validation
//!
//! Walks a criteria tree against the field registry and a target media kind,
//! collecting every problem with a path identifier instead of stopping at the
//! first. User-input problems never return `Err`; the report carries them.

use crate::media::MediaKind;

use super::criteria::{Condition, CriteriaNode, CriteriaValue, Group, Operator};
use super::fields::{self, FieldDef, UnitDomain, ValueType};

/// One problem found in a criteria tree
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationError {
    /// Path of the offending node, e.g. `root.children[1]`
    pub path: String,
    pub message: String,
}

/// Outcome of validating a whole tree
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Validate a criteria tree for a target media kind
pub fn validate(root: &Group, kind: MediaKind) -> ValidationReport {
    let mut errors = Vec::new();
    visit_group(root, kind, "root", &mut errors);
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn visit_group(group: &Group, kind: MediaKind, path: &str, errors: &mut Vec<ValidationError>) {
    if group.children.is_empty() {
        errors.push(ValidationError {
            path: path.to_string(),
            message: "group must contain at least one condition or group".to_string(),
        });
    }

    for (idx, child) in group.children.iter().enumerate() {
        let child_path = format!("{}.children[{}]", path, idx);
        match child {
            CriteriaNode::Group(g) => visit_group(g, kind, &child_path, errors),
            CriteriaNode::Condition(c) => visit_condition(c, kind, &child_path, errors),
        }
    }
}

fn visit_condition(cond: &Condition, kind: MediaKind, path: &str, errors: &mut Vec<ValidationError>) {
    let Some(def) = fields::lookup(&cond.field) else {
        errors.push(ValidationError {
            path: path.to_string(),
            message: format!("unknown field '{}'", cond.field),
        });
        return;
    };

    if !def.applies_to(kind) {
        errors.push(ValidationError {
            path: path.to_string(),
            message: format!("field '{}' does not apply to {}", cond.field, kind),
        });
    }

    if !def.allows_operator(cond.operator) {
        errors.push(ValidationError {
            path: path.to_string(),
            message: format!(
                "operator '{}' is not allowed on field '{}'",
                cond.operator, cond.field
            ),
        });
        return;
    }

    if let Err(message) = check_value(def, cond) {
        errors.push(ValidationError {
            path: path.to_string(),
            message,
        });
    }
}

/// Check that a condition's value (and unit) fit the field's declared type
/// under the chosen operator.
fn check_value(def: &FieldDef, cond: &Condition) -> Result<(), String> {
    if let Some(unit) = cond.unit {
        match def.unit {
            Some(UnitDomain::Time) if !unit.is_time() => {
                return Err(format!("field '{}' takes a time unit", def.key));
            }
            Some(UnitDomain::Size) if !unit.is_size() => {
                return Err(format!("field '{}' takes a size unit", def.key));
            }
            None => {
                return Err(format!("field '{}' does not take a unit", def.key));
            }
            _ => {}
        }
    }

    match cond.operator {
        Operator::In => match (def.value_type, &cond.value) {
            (ValueType::Text, CriteriaValue::TextList(_)) => Ok(()),
            (ValueType::Number, CriteriaValue::NumberList(_)) => Ok(()),
            _ => Err(format!(
                "operator 'in' on field '{}' requires a list of {}",
                def.key,
                type_name(def.value_type)
            )),
        },
        Operator::ContainsAny => match &cond.value {
            CriteriaValue::TextList(_) => Ok(()),
            _ => Err(format!(
                "operator 'contains_any' on field '{}' requires a list of text values",
                def.key
            )),
        },
        Operator::Contains => match &cond.value {
            CriteriaValue::Text(_) => Ok(()),
            _ => Err(format!(
                "operator 'contains' on field '{}' requires a text value",
                def.key
            )),
        },
        Operator::OlderThan | Operator::NewerThan => match &cond.value {
            CriteriaValue::Number(_) => Ok(()),
            _ => Err(format!(
                "operator '{}' on field '{}' requires a number of time units",
                cond.operator, def.key
            )),
        },
        Operator::Equals | Operator::NotEquals => match (def.value_type, &cond.value) {
            (ValueType::Boolean, CriteriaValue::Bool(_)) => Ok(()),
            (ValueType::Number, CriteriaValue::Number(_)) => Ok(()),
            (ValueType::Text, CriteriaValue::Text(_)) => Ok(()),
            // Dates only support explicit null checks through equals
            (ValueType::Date, CriteriaValue::Null) => Ok(()),
            (_, CriteriaValue::Null) => Ok(()),
            _ => Err(format!(
                "value does not match field '{}' ({})",
                def.key,
                type_name(def.value_type)
            )),
        },
        Operator::LessThan
        | Operator::LessThanOrEqual
        | Operator::GreaterThan
        | Operator::GreaterThanOrEqual => match &cond.value {
            CriteriaValue::Number(_) => Ok(()),
            _ => Err(format!(
                "operator '{}' on field '{}' requires a number",
                cond.operator, def.key
            )),
        },
    }
}

fn type_name(vt: ValueType) -> &'static str {
    match vt {
        ValueType::Text => "text",
        ValueType::Number => "number",
        ValueType::Boolean => "boolean",
        ValueType::Date => "date",
        ValueType::TextList => "text list",
    }
}
