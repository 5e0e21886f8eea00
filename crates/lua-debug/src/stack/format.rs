//! Scalar value formatting for `variables` responses.

use crate::runtime::RuntimeValue;

pub(crate) const UNEVALUATED: &str = "[unevaluated]";

/// Display string and type name of a non-table value. Functions, userdata and
/// coroutines have neither.
pub(crate) fn describe_scalar(value: &RuntimeValue) -> (String, Option<&'static str>) {
    match value {
        RuntimeValue::Nil => ("nil".to_string(), Some("nil")),
        RuntimeValue::Boolean(true) => ("True".to_string(), Some("boolean")),
        RuntimeValue::Boolean(false) => ("False".to_string(), Some("boolean")),
        RuntimeValue::Integer(value) => (value.to_string(), Some("number")),
        RuntimeValue::Number(value) => (format_number(*value), Some("number")),
        RuntimeValue::String(value) => (value.clone(), Some("string")),
        RuntimeValue::Table
        | RuntimeValue::Function
        | RuntimeValue::Userdata
        | RuntimeValue::Thread => (String::new(), None),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        value.to_string()
    }
}
