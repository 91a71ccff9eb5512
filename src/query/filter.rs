//! Metadata filter predicates
//!
//! Filters are a typed expression tree evaluated against a record's
//! metadata mapping. A filter is validated up front so a malformed
//! predicate is rejected before any mutation or scan begins.

use serde::{Deserialize, Serialize};

use crate::types::{Metadata, MetadataValue};
use crate::{Error, Result};

/// Filter expression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filter {
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Condition(FilterCondition),
}

/// Leaf predicate against a single metadata field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOp,
    pub value: MetadataValue,
}

/// Filter operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl Filter {
    /// Validate the filter shape without evaluating it.
    ///
    /// Comparison operators require a numeric operand; membership
    /// operators require an array operand.
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::And { filters } | Filter::Or { filters } => {
                for filter in filters {
                    filter.validate()?;
                }
                Ok(())
            }
            Filter::Condition(cond) => cond.validate(),
        }
    }

    /// Evaluate the filter against a record's metadata. Records without
    /// metadata evaluate against an empty mapping.
    pub fn matches(&self, metadata: Option<&Metadata>) -> bool {
        match self {
            Filter::And { filters } => filters.iter().all(|f| f.matches(metadata)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(metadata)),
            Filter::Condition(cond) => cond.matches(metadata),
        }
    }
}

impl FilterCondition {
    fn validate(&self) -> Result<()> {
        if self.field.is_empty() {
            return Err(Error::InvalidFilter("empty field name".to_string()));
        }

        match self.op {
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => match self.value {
                MetadataValue::Integer(_) | MetadataValue::Float(_) => Ok(()),
                _ => Err(Error::InvalidFilter(format!(
                    "comparison on field '{}' requires a numeric operand",
                    self.field
                ))),
            },
            FilterOp::In | FilterOp::Nin => match self.value {
                MetadataValue::StringArray(_) => Ok(()),
                _ => Err(Error::InvalidFilter(format!(
                    "membership test on field '{}' requires an array operand",
                    self.field
                ))),
            },
            FilterOp::Eq | FilterOp::Ne => Ok(()),
        }
    }

    fn matches(&self, metadata: Option<&Metadata>) -> bool {
        let field_value = metadata.and_then(|m| m.get(&self.field));

        match self.op {
            // A missing key never matches an equality/comparison/membership
            // predicate; the negated forms hold vacuously.
            FilterOp::Eq => field_value.is_some_and(|v| values_equal(v, &self.value)),
            FilterOp::Ne => field_value.map_or(true, |v| !values_equal(v, &self.value)),
            FilterOp::Gt => compare(field_value, &self.value, |a, b| a > b),
            FilterOp::Gte => compare(field_value, &self.value, |a, b| a >= b),
            FilterOp::Lt => compare(field_value, &self.value, |a, b| a < b),
            FilterOp::Lte => compare(field_value, &self.value, |a, b| a <= b),
            FilterOp::In => field_value.is_some_and(|v| set_contains(&self.value, v)),
            FilterOp::Nin => field_value.map_or(true, |v| !set_contains(&self.value, v)),
        }
    }
}

fn values_equal(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (a, b) {
        (MetadataValue::String(a), MetadataValue::String(b)) => a == b,
        (MetadataValue::Integer(a), MetadataValue::Integer(b)) => a == b,
        (MetadataValue::Float(a), MetadataValue::Float(b)) => (a - b).abs() < f64::EPSILON,
        (MetadataValue::Integer(a), MetadataValue::Float(b))
        | (MetadataValue::Float(b), MetadataValue::Integer(a)) => {
            (*a as f64 - b).abs() < f64::EPSILON
        }
        (MetadataValue::Boolean(a), MetadataValue::Boolean(b)) => a == b,
        (MetadataValue::StringArray(a), MetadataValue::StringArray(b)) => a == b,
        _ => false,
    }
}

fn compare<F>(field_value: Option<&MetadataValue>, operand: &MetadataValue, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    let Some(field_value) = field_value else {
        return false;
    };

    let lhs = match field_value {
        MetadataValue::Integer(v) => *v as f64,
        MetadataValue::Float(v) => *v,
        _ => return false,
    };
    let rhs = match operand {
        MetadataValue::Integer(v) => *v as f64,
        MetadataValue::Float(v) => *v,
        _ => return false,
    };

    cmp(lhs, rhs)
}

fn set_contains(operand: &MetadataValue, field_value: &MetadataValue) -> bool {
    let MetadataValue::StringArray(set) = operand else {
        return false;
    };
    match field_value {
        MetadataValue::String(s) => set.contains(s),
        // An array-valued field is a member when any element is.
        MetadataValue::StringArray(values) => values.iter().any(|v| set.contains(v)),
        _ => false,
    }
}
