//! The rule engine: field registry, criteria trees, validation, evaluation
//! and legacy migration. Everything here is pure; persistence lives in
//! `crate::db` and side effects in `crate::jobs`.

pub mod criteria;
pub mod evaluator;
pub mod fields;
pub mod migrate;
pub mod validator;

pub use criteria::{BoolOp, Condition, CriteriaNode, CriteriaValue, Group, Operator, Unit};
pub use evaluator::evaluate;
pub use fields::{FieldDef, UnitDomain, ValueType};
pub use migrate::{migrate, LegacyRule, ValueWithUnit};
pub use validator::{validate, ValidationError, ValidationReport};
