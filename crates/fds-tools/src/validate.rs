//! Argument validation against an operation's parameter schema.
//!
//! Applied before every invocation. A rejected argument set never reaches
//! the network; the issues are fed back to the model as a correction.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::types::{Operation, ParamType};

/// The tenant parameter is injected by the orchestrator after validation and
/// is never part of an operation's declared schema.
pub const TENANT_PARAM: &str = "tenant_id";

/// Date pairs whose values must be ordered `start <= end` when both present.
const DATE_PAIRS: &[(&str, &str)] = &[
    ("startDate", "endDate"),
    ("startDate1", "endDate1"),
    ("startDate2", "endDate2"),
];

/// Validate an argument set against an operation's schema.
///
/// Collects every issue rather than stopping at the first, so a single
/// correction round can fix them all.
pub fn validate(op: &Operation, args: &Map<String, Value>) -> Result<(), ToolError> {
    let mut issues = Vec::new();

    // Unknown parameters are rejected outright.
    for key in args.keys() {
        if key != TENANT_PARAM && op.param(key).is_none() {
            issues.push(format!("unknown parameter '{}'", key));
        }
    }

    // Required parameters must be present.
    for param in &op.params {
        if param.required && !args.contains_key(param.name) {
            issues.push(format!("missing required parameter '{}'", param.name));
        }
    }

    // Type and constraint checks on supplied values.
    for param in &op.params {
        let Some(value) = args.get(param.name) else {
            continue;
        };
        match &param.ty {
            ParamType::Date => {
                if parse_date(value).is_none() {
                    issues.push(format!(
                        "parameter '{}' must be a date in YYYY-MM-DD format",
                        param.name
                    ));
                }
            }
            ParamType::Integer { min, max } => match value.as_i64() {
                Some(n) if n >= *min && n <= *max => {}
                Some(n) => issues.push(format!(
                    "parameter '{}' must be between {} and {}, got {}",
                    param.name, min, max, n
                )),
                None => issues.push(format!("parameter '{}' must be an integer", param.name)),
            },
            ParamType::Boolean => {
                if !value.is_boolean() {
                    issues.push(format!("parameter '{}' must be a boolean", param.name));
                }
            }
            ParamType::Text => match value.as_str() {
                Some(s) if !s.trim().is_empty() => {}
                Some(_) => {
                    issues.push(format!("parameter '{}' must not be empty", param.name))
                }
                None => issues.push(format!("parameter '{}' must be a string", param.name)),
            },
            ParamType::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                _ => issues.push(format!(
                    "parameter '{}' must be one of: {}",
                    param.name,
                    allowed.join(", ")
                )),
            },
        }
    }

    // Date range ordering.
    for (start, end) in DATE_PAIRS {
        if let (Some(s), Some(e)) = (
            args.get(*start).and_then(parse_date_opt),
            args.get(*end).and_then(parse_date_opt),
        ) {
            if s > e {
                issues.push(format!("'{}' must not be after '{}'", start, end));
            }
        }
    }

    // Mutually exclusive parameters.
    for [a, b] in op.exclusive {
        if args.contains_key(*a) && args.contains_key(*b) {
            issues.push(format!("'{}' and '{}' cannot be combined", a, b));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(issues))
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn parse_date_opt(value: &Value) -> Option<NaiveDate> {
    parse_date(value)
}
