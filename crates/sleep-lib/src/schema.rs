//! Feature schema and observation types
//!
//! The schema is the fixed, ordered set of input fields the classifier is
//! trained on. Every table and every observation is checked against it
//! before any numeric work happens.

use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the label column in the training data
pub const TARGET_COLUMN: &str = "sleep_disorder";

/// Kind of an input field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Numeric => write!(f, "numeric"),
            FeatureKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// A single named field of the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FieldSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
        }
    }
}

/// Ordered set of input fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    /// Build a schema; it needs at least one field and field names must be unique
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(ClassifierError::SchemaMismatch(
                "schema must declare at least one field".to_string(),
            ));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(ClassifierError::SchemaMismatch(format!(
                    "duplicate field `{}`",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// The sleep health and lifestyle schema served in production
    pub fn sleep_health() -> Self {
        Self {
            fields: vec![
                FieldSpec::categorical("gender"),
                FieldSpec::numeric("age"),
                FieldSpec::categorical("occupation"),
                FieldSpec::numeric("sleep_duration"),
                FieldSpec::numeric("quality_of_sleep"),
                FieldSpec::numeric("physical_activity_level"),
                FieldSpec::numeric("stress_level"),
                FieldSpec::categorical("bmi_category"),
                FieldSpec::numeric("heart_rate"),
                FieldSpec::numeric("daily_steps"),
                FieldSpec::numeric("systolic_blood_pressure"),
                FieldSpec::numeric("diastolic_blood_pressure"),
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Numeric fields in schema order
    pub fn numeric_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.kind == FeatureKind::Numeric)
    }

    /// Categorical fields in schema order
    pub fn categorical_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| f.kind == FeatureKind::Categorical)
    }

    /// Check that an observation carries every field with the declared kind.
    ///
    /// Extra fields are ignored here; the transport layer decides whether
    /// to reject them.
    pub fn validate(&self, observation: &Observation) -> Result<()> {
        for field in &self.fields {
            let value = observation.get(&field.name).ok_or_else(|| {
                ClassifierError::InvalidInput(format!("missing field `{}`", field.name))
            })?;

            match (field.kind, value) {
                (FeatureKind::Numeric, FeatureValue::Numeric(v)) if !v.is_finite() => {
                    return Err(ClassifierError::InvalidInput(format!(
                        "field `{}` must be a finite number",
                        field.name
                    )));
                }
                (FeatureKind::Numeric, FeatureValue::Numeric(_))
                | (FeatureKind::Categorical, FeatureValue::Categorical(_)) => {}
                (expected, actual) => {
                    return Err(ClassifierError::InvalidInput(format!(
                        "field `{}` expects a {} value, got {}",
                        field.name,
                        expected,
                        actual.kind()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A raw feature value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Numeric(_) => FeatureKind::Numeric,
            FeatureValue::Categorical(_) => FeatureKind::Categorical,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Numeric(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Numeric(v as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Categorical(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Categorical(v)
    }
}

/// One record of feature values describing a single person
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation {
    values: BTreeMap<String, FeatureValue>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build an observation from a JSON object.
    ///
    /// Numbers become numeric values and strings categorical ones. Any other
    /// JSON type is rejected rather than coerced.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            ClassifierError::InvalidInput("observation must be a JSON object".to_string())
        })?;

        let mut observation = Observation::new();
        for (name, v) in map {
            let feature = match v {
                serde_json::Value::Number(n) => n
                    .as_f64()
                    .map(FeatureValue::Numeric)
                    .ok_or_else(|| {
                        ClassifierError::InvalidInput(format!("field `{}` is not a valid number", name))
                    })?,
                serde_json::Value::String(s) => FeatureValue::Categorical(s.clone()),
                other => {
                    return Err(ClassifierError::InvalidInput(format!(
                        "field `{}` has unsupported value {}",
                        name, other
                    )))
                }
            };
            observation.values.insert(name.clone(), feature);
        }
        Ok(observation)
    }

    /// The reference person used by the manual test client and smoke tests
    pub fn sample() -> Self {
        Observation::new()
            .with("age", 32_i64)
            .with("bmi_category", "normal")
            .with("daily_steps", 5000_i64)
            .with("diastolic_blood_pressure", 80_i64)
            .with("gender", "male")
            .with("heart_rate", 72_i64)
            .with("occupation", "doctor")
            .with("physical_activity_level", 30_i64)
            .with("quality_of_sleep", 6_i64)
            .with("sleep_duration", 6.0)
            .with("stress_level", 8_i64)
            .with("systolic_blood_pressure", 125_i64)
    }
}
