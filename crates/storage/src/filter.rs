//! Metadata filter expressions applied to vector searches.
//!
//! Filters arrive as a flat `field → value(s)` map and are compiled into a
//! small expression tree over a fixed set of chunk fields. The tree renders
//! to a readable string for logs, evaluates against in-memory chunks, and
//! compiles to a parameterized SQL predicate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ccba_core::Chunk;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("unknown filter field: {0}")]
    UnknownField(String),

    #[error("filter on {0} has no values")]
    EmptyValues(String),
}

/// Chunk fields that may appear in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    DocumentId,
    DocumentName,
    DocumentCode,
    DocumentType,
    Chapter,
    Article,
    Clause,
    Level,
}

impl FilterField {
    pub const ALL: [FilterField; 8] = [
        FilterField::DocumentId,
        FilterField::DocumentName,
        FilterField::DocumentCode,
        FilterField::DocumentType,
        FilterField::Chapter,
        FilterField::Article,
        FilterField::Clause,
        FilterField::Level,
    ];

    /// Column / field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::DocumentId => "document_id",
            FilterField::DocumentName => "document_name",
            FilterField::DocumentCode => "document_code",
            FilterField::DocumentType => "document_type",
            FilterField::Chapter => "chapter",
            FilterField::Article => "article",
            FilterField::Clause => "clause",
            FilterField::Level => "level",
        }
    }

    pub fn parse(name: &str) -> Result<Self, FilterError> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == name)
            .ok_or_else(|| FilterError::UnknownField(name.to_string()))
    }

    fn value_of<'a>(&self, chunk: &'a Chunk) -> Option<&'a str> {
        match self {
            FilterField::DocumentId => Some(&chunk.document_id),
            FilterField::DocumentName => Some(&chunk.document_name),
            FilterField::DocumentCode => chunk.document_code.as_deref(),
            FilterField::DocumentType => chunk.document_type.as_deref(),
            FilterField::Chapter => chunk.chapter.as_deref(),
            FilterField::Article => chunk.article.as_deref(),
            FilterField::Clause => chunk.clause.as_deref(),
            FilterField::Level => Some(chunk.level.as_str()),
        }
    }
}

/// A filter value as supplied by callers: a single string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::One(v.to_string())
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(v: Vec<String>) -> Self {
        FilterValue::Many(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Eq { field: FilterField, value: String },
    In { field: FilterField, values: Vec<String> },
    And(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Compile a filter map. An empty map yields `None`; several entries are
    /// and-ed together in key order.
    pub fn from_map(filters: &BTreeMap<String, FilterValue>) -> Result<Option<Self>, FilterError> {
        let mut terms = Vec::with_capacity(filters.len());
        for (name, value) in filters {
            let field = FilterField::parse(name)?;
            let term = match value {
                FilterValue::One(v) => FilterExpr::Eq { field, value: v.clone() },
                FilterValue::Many(vs) if vs.is_empty() => {
                    return Err(FilterError::EmptyValues(name.clone()))
                }
                FilterValue::Many(vs) => FilterExpr::In { field, values: vs.clone() },
            };
            terms.push(term);
        }
        Ok(match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(FilterExpr::And(terms)),
        })
    }

    /// Evaluate against a chunk. Missing optional fields never match.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        match self {
            FilterExpr::Eq { field, value } => field.value_of(chunk) == Some(value.as_str()),
            FilterExpr::In { field, values } => field
                .value_of(chunk)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
            FilterExpr::And(terms) => terms.iter().all(|t| t.matches(chunk)),
        }
    }

    /// Render as a SQL predicate with `$n` placeholders starting at
    /// `first_param`. Values to bind are appended to `params` in order.
    pub fn to_sql(&self, first_param: usize, params: &mut Vec<String>) -> String {
        match self {
            FilterExpr::Eq { field, value } => {
                params.push(value.clone());
                format!("{} = ${}", field.as_str(), first_param + params.len() - 1)
            }
            FilterExpr::In { field, values } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        format!("${}", first_param + params.len() - 1)
                    })
                    .collect();
                format!("{} IN ({})", field.as_str(), placeholders.join(", "))
            }
            FilterExpr::And(terms) => {
                let parts: Vec<String> = terms
                    .iter()
                    .map(|t| format!("({})", t.to_sql(first_param, params)))
                    .collect();
                parts.join(" AND ")
            }
        }
    }
}

fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Eq { field, value } => write!(f, "{} == {}", field.as_str(), quoted(value)),
            FilterExpr::In { field, values } => {
                let list: Vec<String> = values.iter().map(|v| quoted(v)).collect();
                write!(f, "{} in [{}]", field.as_str(), list.join(","))
            }
            FilterExpr::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" and ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
        }
    }
}
