//! Filter DSL compiler
//!
//! Callers express query conditions with a compact nested-list syntax:
//!
//! - `["name", "is", "Layout"]` - a single condition
//! - `[["name", "is", "Layout"], ["status", "is", "wtg"]]` - implicit `and`
//! - `["or", ["name", "is", "Layout"], ["status", "is", "wtg"]]` - explicit operator
//!
//! [`compile`] turns that syntax into a [`FilterNode`] tree, which serializes to
//! the `{"operator", "conditions"}` shape the server consumes.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ApiError, Result};

/// Boolean operator joining the children of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    /// Recognize a leading operator token
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "and" => Some(Operator::And),
            "or" => Some(Operator::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

/// Relation between a field and its values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Is,
    IsNot,
    LessThan,
    GreaterThan,
    Contains,
    Excludes,
    In,
    StartsWith,
    EndsWith,
}

impl RelationKind {
    pub const ALL: [RelationKind; 9] = [
        RelationKind::Is,
        RelationKind::IsNot,
        RelationKind::LessThan,
        RelationKind::GreaterThan,
        RelationKind::Contains,
        RelationKind::Excludes,
        RelationKind::In,
        RelationKind::StartsWith,
        RelationKind::EndsWith,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Is => "is",
            RelationKind::IsNot => "is_not",
            RelationKind::LessThan => "less_than",
            RelationKind::GreaterThan => "greater_than",
            RelationKind::Contains => "contains",
            RelationKind::Excludes => "excludes",
            RelationKind::In => "in",
            RelationKind::StartsWith => "starts_with",
            RelationKind::EndsWith => "ends_with",
        }
    }
}

impl FromStr for RelationKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        RelationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ApiError::MalformedFilter(format!("unknown relation '{}'", s)))
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// One condition; `values` is never empty
    Leaf {
        field: String,
        relation: RelationKind,
        values: Vec<Value>,
    },
    /// Operator applied to ordered children
    Group {
        operator: Operator,
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    /// Canonical JSON form of this tree
    pub fn to_value(&self) -> Value {
        match self {
            FilterNode::Leaf {
                field,
                relation,
                values,
            } => serde_json::json!({
                "path": field,
                "relation": relation.as_str(),
                "values": values,
            }),
            FilterNode::Group { operator, children } => serde_json::json!({
                "operator": operator.as_str(),
                "conditions": children.iter().map(FilterNode::to_value).collect::<Vec<_>>(),
            }),
        }
    }
}

impl Serialize for FilterNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FilterNode::Leaf {
                field,
                relation,
                values,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("path", field)?;
                map.serialize_entry("relation", relation)?;
                map.serialize_entry("values", values)?;
                map.end()
            }
            FilterNode::Group { operator, children } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("operator", operator)?;
                map.serialize_entry("conditions", children)?;
                map.end()
            }
        }
    }
}

/// Compile a filter expression into a condition tree.
///
/// The top-level result is always a [`FilterNode::Group`]. A leading `"or"` /
/// `"and"` string is always read as an operator, so a field literally named
/// `or` or `and` cannot be the first element of a bare triple.
pub fn compile(expr: &Value) -> Result<FilterNode> {
    compile_expr(expr, true)
}

fn compile_expr(expr: &Value, outermost: bool) -> Result<FilterNode> {
    let items = expr
        .as_array()
        .ok_or_else(|| ApiError::MalformedFilter(format!("{} is not a list", expr)))?;
    if items.is_empty() {
        return Err(ApiError::MalformedFilter("empty filter expression".to_string()));
    }

    let (operator, rest) = match items[0].as_str().and_then(Operator::from_token) {
        Some(operator) => (operator, &items[1..]),
        None => (Operator::And, &items[..]),
    };

    // Nested form wins whenever every remaining element is a sub-expression
    if rest.iter().all(Value::is_array) {
        let children = rest
            .iter()
            .map(|child| compile_expr(child, false))
            .collect::<Result<Vec<_>>>()?;
        return Ok(FilterNode::Group { operator, children });
    }

    // Fall back to the un-stripped expression as a single condition
    let leaf = compile_leaf(items)?;
    if outermost {
        Ok(FilterNode::Group {
            operator,
            children: vec![leaf],
        })
    } else {
        Ok(leaf)
    }
}

fn compile_leaf(items: &[Value]) -> Result<FilterNode> {
    let [field, relation, value] = items else {
        return Err(ApiError::MalformedFilter(format!(
            "{} does not conform to [field, relation, values]",
            Value::Array(items.to_vec())
        )));
    };

    let field = field
        .as_str()
        .ok_or_else(|| ApiError::MalformedFilter(format!("field {} is not a string", field)))?;
    let relation = match relation.as_str() {
        Some("") | None => {
            return Err(ApiError::MalformedFilter(format!(
                "{} is not a valid relation",
                relation
            )))
        }
        Some(relation) => relation.parse::<RelationKind>()?,
    };
    let values = match value {
        Value::Array(values) => values.clone(),
        scalar => vec![scalar.clone()],
    };
    if values.is_empty() {
        return Err(ApiError::MalformedFilter(format!(
            "condition on '{}' has no values",
            field
        )));
    }

    Ok(FilterNode::Leaf {
        field: field.to_string(),
        relation,
        values,
    })
}
