//! Compiles predicates into SQL violation conditions.
//!
//! The generated condition is true exactly for the rows that violate the
//! predicate. Column names are quoted and literals escaped through
//! [`SqlSecurity`]; nothing from configuration reaches SQL verbatim.

use super::rules::{Literal, PatternMode, Predicate};
use crate::error::{PipelineError, Result};
use crate::security::SqlSecurity;
use arrow::datatypes::DataType;

/// Broad type family of a column, as far as predicates care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeFamily {
    Numeric,
    Text,
    Boolean,
    Other,
}

impl TypeFamily {
    pub(crate) fn of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => TypeFamily::Numeric,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => TypeFamily::Text,
            DataType::Boolean => TypeFamily::Boolean,
            _ => TypeFamily::Other,
        }
    }
}

/// Builds the violation condition for `predicate` over `column`.
pub(crate) fn violation_condition(
    rule: &str,
    column: &str,
    data_type: &DataType,
    predicate: &Predicate,
) -> Result<String> {
    let col = SqlSecurity::escape_identifier(column)
        .map_err(|e| PipelineError::validation_setup(rule, e.to_string()))?;
    let family = TypeFamily::of(data_type);
    let mismatch = |expected: &str| {
        Err(PipelineError::validation_setup(
            rule,
            format!("{} needs a {expected} column, '{column}' is {data_type}", predicate.kind_name()),
        ))
    };

    let condition = match predicate {
        Predicate::NotNull => format!("{col} IS NULL"),

        Predicate::Range {
            min,
            max,
            inclusive,
        } => {
            if family != TypeFamily::Numeric {
                return mismatch("numeric");
            }
            let (lower_op, upper_op) = if *inclusive { (">=", "<=") } else { (">", "<") };
            let bounds = [
                min.map(|v| format!("{col} {lower_op} {}", float_literal(v))),
                max.map(|v| format!("{col} {upper_op} {}", float_literal(v))),
            ];
            let holds = bounds.into_iter().flatten().collect::<Vec<_>>().join(" AND ");
            format!("{col} IS NOT NULL AND NOT ({holds})")
        }

        Predicate::Pattern { pattern, mode } => {
            let escaped = SqlSecurity::validate_regex_pattern(pattern)
                .map_err(|e| PipelineError::validation_setup(rule, e.to_string()))?;
            let anchored = match mode {
                PatternMode::Full => format!("^(?:{escaped})$"),
                PatternMode::Match => format!("^(?:{escaped})"),
                PatternMode::Contains => escaped,
            };
            let text = if family == TypeFamily::Text {
                col.clone()
            } else {
                format!("CAST({col} AS VARCHAR)")
            };
            format!("{col} IS NOT NULL AND NOT ({text} ~ '{anchored}')")
        }

        Predicate::InSet { values } => {
            let (subject, literals) = match family {
                TypeFamily::Numeric => {
                    let literals = values
                        .iter()
                        .map(|v| match v {
                            Literal::Integer(i) => Ok(i.to_string()),
                            Literal::Float(x) => Ok(float_literal(*x)),
                            other => Err(PipelineError::validation_setup(
                                rule,
                                format!("value '{other}' is not numeric but '{column}' is {data_type}"),
                            )),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    (col.clone(), literals)
                }
                TypeFamily::Boolean => {
                    let literals = values
                        .iter()
                        .map(|v| match v {
                            Literal::Bool(b) => Ok(b.to_string()),
                            other => Err(PipelineError::validation_setup(
                                rule,
                                format!("value '{other}' is not a boolean but '{column}' is"),
                            )),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    (col.clone(), literals)
                }
                TypeFamily::Text | TypeFamily::Other => {
                    let literals = values
                        .iter()
                        .map(|v| SqlSecurity::escape_literal(&v.to_string()))
                        .collect::<Result<Vec<_>>>()
                        .map_err(|e| PipelineError::validation_setup(rule, e.to_string()))?;
                    let subject = if family == TypeFamily::Text {
                        col.clone()
                    } else {
                        format!("CAST({col} AS VARCHAR)")
                    };
                    (subject, literals)
                }
            };
            format!("{col} IS NOT NULL AND {subject} NOT IN ({})", literals.join(", "))
        }

        Predicate::Length { min, max } => {
            if family != TypeFamily::Text {
                return mismatch("text");
            }
            let bounds = [
                min.map(|v| format!("character_length({col}) >= {v}")),
                max.map(|v| format!("character_length({col}) <= {v}")),
            ];
            let holds = bounds.into_iter().flatten().collect::<Vec<_>>().join(" AND ");
            format!("{col} IS NOT NULL AND NOT ({holds})")
        }
    };

    Ok(condition)
}

/// Renders a finite float as a SQL numeric literal.
fn float_literal(value: f64) -> String {
    let rendered = value.to_string();
    if rendered.contains('.') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}
