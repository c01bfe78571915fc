use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::catalog::{FilterDefinition, ParameterDefinition, ParameterKind};

/// Scalar value held for one filter parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Name to value mapping for the currently selected filter.
pub type ParameterValues = BTreeMap<String, ParameterValue>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter '{name}' is not declared by filter '{filter}'")]
    Undeclared { filter: String, name: String },
    #[error("parameter '{name}' expects {expected}, got '{found}'")]
    Coercion {
        name: String,
        expected: &'static str,
        found: String,
    },
}

/// Seeds one entry per declared parameter from its default.
pub fn select(filter: &FilterDefinition) -> ParameterValues {
    filter
        .parameters
        .iter()
        .map(|param| (param.name.clone(), param.default.clone()))
        .collect()
}

/// Replaces a single entry. Constraint checks belong to the presentation layer.
pub fn update(
    mut values: ParameterValues,
    name: &str,
    new_value: impl Into<ParameterValue>,
) -> ParameterValues {
    values.insert(name.to_string(), new_value.into());
    values
}

/// Coerces every provided value to the type declared by `filter`.
pub fn coerce_for_filter(
    filter: &FilterDefinition,
    values: &ParameterValues,
) -> Result<ParameterValues, ParameterError> {
    let mut out = ParameterValues::new();
    for (name, value) in values {
        let Some(definition) = filter.parameter(name) else {
            return Err(ParameterError::Undeclared {
                filter: filter.name.clone(),
                name: name.clone(),
            });
        };
        out.insert(name.clone(), coerce_value(definition, value)?);
    }
    Ok(out)
}

pub fn coerce_value(
    definition: &ParameterDefinition,
    value: &ParameterValue,
) -> Result<ParameterValue, ParameterError> {
    let fail = |expected: &'static str| ParameterError::Coercion {
        name: definition.name.clone(),
        expected,
        found: value.to_string(),
    };

    match definition.kind {
        ParameterKind::Int => match value {
            ParameterValue::Int(v) => Ok(ParameterValue::Int(*v)),
            ParameterValue::Float(v) => whole_int(*v)
                .map(ParameterValue::Int)
                .ok_or_else(|| fail("an integer")),
            ParameterValue::Text(raw) => {
                let raw = raw.trim();
                raw.parse::<i64>()
                    .ok()
                    .or_else(|| raw.parse::<f64>().ok().and_then(whole_int))
                    .map(ParameterValue::Int)
                    .ok_or_else(|| fail("an integer"))
            }
        },
        ParameterKind::Float => {
            let parsed = match value {
                ParameterValue::Int(v) => *v as f64,
                ParameterValue::Float(v) => *v,
                ParameterValue::Text(raw) => {
                    raw.trim().parse::<f64>().map_err(|_| fail("a number"))?
                }
            };
            if !parsed.is_finite() {
                return Err(fail("a finite number"));
            }
            Ok(ParameterValue::Float(parsed))
        }
        ParameterKind::Select | ParameterKind::String => match value {
            ParameterValue::Text(v) => Ok(ParameterValue::Text(v.clone())),
            ParameterValue::Int(v) => Ok(ParameterValue::Text(v.to_string())),
            ParameterValue::Float(v) if v.is_finite() => Ok(ParameterValue::Text(v.to_string())),
            ParameterValue::Float(_) => Err(fail("a string")),
        },
    }
}

/// `value` as an `i64` when it is whole and representable without clamping.
fn whole_int(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn blur_filter() -> FilterDefinition {
        serde_json::from_value(json!({
            "name": "gaussian_blur",
            "display_name": "Gaussian Blur",
            "parameters": [
                {"name": "kernel_size", "type": "int", "default": 3, "min": 1, "max": 31, "step": 2},
                {"name": "sigma", "type": "float", "default": 0.0, "min": 0.0, "max": 10.0, "step": 0.1},
                {"name": "border", "type": "select", "default": "reflect", "options": ["reflect", "constant"]}
            ]
        }))
        .expect("filter fixture should parse")
    }

    #[test]
    fn select_seeds_declared_defaults() {
        let values = select(&blur_filter());
        assert_eq!(values.len(), 3);
        assert_eq!(values["kernel_size"], ParameterValue::Int(3));
        assert_eq!(values["sigma"], ParameterValue::Float(0.0));
        assert_eq!(values["border"], ParameterValue::from("reflect"));
    }

    #[test]
    fn update_replaces_only_the_named_entry() {
        let values = update(select(&blur_filter()), "kernel_size", 7);
        assert_eq!(values["kernel_size"], ParameterValue::Int(7));
        assert_eq!(values["border"], ParameterValue::from("reflect"));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn coercion_accepts_numeric_strings_and_whole_floats() {
        let filter = blur_filter();
        let mut values = ParameterValues::new();
        values.insert(String::from("kernel_size"), ParameterValue::from(" 5 "));
        values.insert(String::from("sigma"), ParameterValue::Int(2));
        values.insert(String::from("border"), ParameterValue::Int(1));

        let coerced = coerce_for_filter(&filter, &values).expect("values should coerce");
        assert_eq!(coerced["kernel_size"], ParameterValue::Int(5));
        assert_eq!(coerced["sigma"], ParameterValue::Float(2.0));
        assert_eq!(coerced["border"], ParameterValue::from("1"));

        let whole = coerce_value(&filter.parameters[0], &ParameterValue::Float(9.0))
            .expect("whole float should coerce");
        assert_eq!(whole, ParameterValue::Int(9));

        let decimal_text = coerce_value(&filter.parameters[0], &ParameterValue::from("5.0"))
            .expect("whole decimal text should coerce");
        assert_eq!(decimal_text, ParameterValue::Int(5));
    }

    #[test]
    fn coercion_rejects_fractional_ints_nan_and_unknown_names() {
        let filter = blur_filter();
        let err = coerce_value(&filter.parameters[0], &ParameterValue::Float(2.5))
            .expect_err("fractional int should fail");
        assert!(matches!(err, ParameterError::Coercion { ref name, .. } if name == "kernel_size"));

        for out_of_range in [1e30, -1e30, 9_223_372_036_854_775_808.0] {
            let err = coerce_value(&filter.parameters[0], &ParameterValue::Float(out_of_range))
                .expect_err("out-of-range whole float should fail");
            assert!(matches!(err, ParameterError::Coercion { expected: "an integer", .. }));
        }
        let err = coerce_value(&filter.parameters[0], &ParameterValue::from("1e30"))
            .expect_err("out-of-range text should fail");
        assert!(matches!(err, ParameterError::Coercion { expected: "an integer", .. }));
        let err = coerce_value(&filter.parameters[0], &ParameterValue::from("5.5"))
            .expect_err("fractional text should fail");
        assert!(matches!(err, ParameterError::Coercion { .. }));

        let err = coerce_value(&filter.parameters[1], &ParameterValue::from("abc"))
            .expect_err("text float should fail");
        assert!(matches!(err, ParameterError::Coercion { expected: "a number", .. }));

        let err = coerce_value(&filter.parameters[1], &ParameterValue::Float(f64::NAN))
            .expect_err("nan should fail");
        assert!(matches!(err, ParameterError::Coercion { .. }));

        let mut values = ParameterValues::new();
        values.insert(String::from("radius"), ParameterValue::Int(1));
        let err = coerce_for_filter(&filter, &values).expect_err("undeclared should fail");
        assert_eq!(
            err,
            ParameterError::Undeclared {
                filter: String::from("gaussian_blur"),
                name: String::from("radius"),
            }
        );
    }

    #[test]
    fn values_serialize_as_a_flat_json_object() {
        let values = update(ParameterValues::new(), "kernel_size", 5);
        let values = update(values, "mode", "fast");
        assert_eq!(
            serde_json::to_value(&values).expect("values should serialize"),
            json!({"kernel_size": 5, "mode": "fast"})
        );
    }
}
