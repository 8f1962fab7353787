//! Tabular data: columnar feature tables and labeled datasets
//!
//! Training data arrives as CSV with one column per schema field plus the
//! `sleep_disorder` target. Any other column (such as a leading row index) is
//! ignored. Values are parsed according to the declared field kind; a value
//! that does not parse is a schema mismatch, never a silent coercion.

use crate::error::{ClassifierError, Result};
use crate::labels::{INSOMNIA, NO_DISORDER, SLEEP_APNEA};
use crate::schema::{FeatureKind, FeatureSchema, FeatureValue, Observation, TARGET_COLUMN};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Values of one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            ColumnData::Numeric(_) => FeatureKind::Numeric,
            ColumnData::Categorical(_) => FeatureKind::Categorical,
        }
    }

    fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values.into_iter().map(Into::into).collect()),
        }
    }
}

/// Columnar table of raw feature values
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table; all columns must have the same length and unique names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        for (i, column) in columns.iter().enumerate() {
            if column.data.len() != n_rows {
                return Err(ClassifierError::SchemaMismatch(format!(
                    "column `{}` has {} rows, expected {}",
                    column.name,
                    column.data.len(),
                    n_rows
                )));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ClassifierError::SchemaMismatch(format!(
                    "duplicate column `{}`",
                    column.name
                )));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Build a table in schema order from observations.
    ///
    /// Each observation is validated first, so a missing or mistyped field
    /// fails with `InvalidInput` before any column is assembled.
    pub fn from_observations(schema: &FeatureSchema, observations: &[Observation]) -> Result<Self> {
        for observation in observations {
            schema.validate(observation)?;
        }

        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let data = match field.kind {
                    FeatureKind::Numeric => ColumnData::Numeric(
                        observations
                            .iter()
                            .map(|o| match o.get(&field.name) {
                                Some(FeatureValue::Numeric(v)) => *v,
                                _ => unreachable!("validated above"),
                            })
                            .collect(),
                    ),
                    FeatureKind::Categorical => ColumnData::Categorical(
                        observations
                            .iter()
                            .map(|o| match o.get(&field.name) {
                                Some(FeatureValue::Categorical(v)) => v.clone(),
                                _ => unreachable!("validated above"),
                            })
                            .collect(),
                    ),
                };
                Column {
                    name: field.name.clone(),
                    data,
                }
            })
            .collect();

        Table::new(columns)
    }

    /// One-row table for a single observation
    pub fn from_observation(schema: &FeatureSchema, observation: &Observation) -> Result<Self> {
        Self::from_observations(schema, std::slice::from_ref(observation))
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column lookup that enforces the schema's declared kind
    pub fn column_of_kind(&self, name: &str, kind: FeatureKind) -> Result<&ColumnData> {
        let column = self.column(name).ok_or_else(|| {
            ClassifierError::SchemaMismatch(format!("table is missing field `{}`", name))
        })?;
        if column.data.kind() != kind {
            return Err(ClassifierError::SchemaMismatch(format!(
                "field `{}` is {}, schema declares {}",
                name,
                column.data.kind(),
                kind
            )));
        }
        Ok(&column.data)
    }

    /// Rows at the given positions, in the given order
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
            n_rows: indices.len(),
        }
    }
}

/// Feature table plus one class name per row
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    features: Table,
    labels: Vec<String>,
}

impl LabeledDataset {
    pub fn new(features: Table, labels: Vec<String>) -> Result<Self> {
        if features.n_rows() != labels.len() {
            return Err(ClassifierError::SchemaMismatch(format!(
                "{} feature rows but {} labels",
                features.n_rows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Load a labeled CSV file
    pub fn from_csv_path(path: impl AsRef<Path>, schema: &FeatureSchema) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            ClassifierError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open {}: {}", path.display(), e),
            ))
        })?;
        let dataset = Self::from_csv_reader(file, schema)?;
        debug!(path = %path.display(), rows = dataset.len(), "Loaded training data");
        Ok(dataset)
    }

    /// Parse labeled CSV from any reader
    pub fn from_csv_reader<R: Read>(reader: R, schema: &FeatureSchema) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();

        let position = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                ClassifierError::SchemaMismatch(format!("CSV is missing column `{}`", name))
            })
        };

        let field_positions = schema
            .fields()
            .iter()
            .map(|f| position(&f.name))
            .collect::<Result<Vec<_>>>()?;
        let target_position = position(TARGET_COLUMN)?;

        let mut data: Vec<ColumnData> = schema
            .fields()
            .iter()
            .map(|f| match f.kind {
                FeatureKind::Numeric => ColumnData::Numeric(Vec::new()),
                FeatureKind::Categorical => ColumnData::Categorical(Vec::new()),
            })
            .collect();
        let mut labels = Vec::new();

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = row_idx + 2;

            for ((field, &pos), column) in schema.fields().iter().zip(&field_positions).zip(&mut data) {
                let raw = record.get(pos).unwrap_or_default();
                match column {
                    ColumnData::Numeric(values) => {
                        let value = raw
                            .parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| {
                                ClassifierError::SchemaMismatch(format!(
                                    "line {}: field `{}` expects a finite numeric value, got `{}`",
                                    line, field.name, raw
                                ))
                            })?;
                        values.push(value);
                    }
                    ColumnData::Categorical(values) => values.push(raw.to_string()),
                }
            }

            labels.push(record.get(target_position).unwrap_or_default().to_string());
        }

        let columns = schema
            .fields()
            .iter()
            .zip(data)
            .map(|(f, data)| Column {
                name: f.name.clone(),
                data,
            })
            .collect();

        Self::new(Table::new(columns)?, labels)
    }

    /// Write the dataset as CSV in schema column order plus the target
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = self.features.columns().iter().map(|c| c.name.as_str()).collect();
        header.push(TARGET_COLUMN);
        writer.write_record(&header)?;

        for (row, label) in self.labels.iter().enumerate() {
            let mut record: Vec<String> = self
                .features
                .columns()
                .iter()
                .map(|c| match &c.data {
                    ColumnData::Numeric(v) => v[row].to_string(),
                    ColumnData::Categorical(v) => v[row].clone(),
                })
                .collect();
            record.push(label.clone());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_csv(std::fs::File::create(path)?)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> &Table {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn take(&self, indices: &[usize]) -> LabeledDataset {
        LabeledDataset {
            features: self.features.take(indices),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }

    /// Number of rows per class name
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

const OCCUPATIONS: &[&str] = &[
    "doctor",
    "nurse",
    "engineer",
    "lawyer",
    "teacher",
    "accountant",
    "salesperson",
];

/// Deterministic synthetic data shaped like the sleep health survey.
///
/// Class shares follow the survey (roughly 58% no disorder, 21% apnea, 21%
/// insomnia) and every feature is shifted per class, so the classes are
/// learnable but overlap.
pub fn synthetic_dataset(n_rows: usize, seed: u64) -> LabeledDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let schema = FeatureSchema::sleep_health();

    let mut observations = Vec::with_capacity(n_rows);
    let mut labels = Vec::with_capacity(n_rows);

    for _ in 0..n_rows {
        let u: f64 = rng.gen();
        let class = if u < 0.58 {
            NO_DISORDER
        } else if u < 0.79 {
            SLEEP_APNEA
        } else {
            INSOMNIA
        };

        // (age, sleep, quality, activity, stress, heart, steps, systolic, diastolic)
        let centers: [f64; 9] = match class {
            NO_DISORDER => [38.0, 7.3, 7.6, 57.0, 5.0, 69.0, 6850.0, 124.0, 80.0],
            SLEEP_APNEA => [50.0, 6.8, 6.8, 70.0, 5.7, 73.0, 7600.0, 137.0, 91.0],
            _ => [44.0, 6.4, 6.5, 46.0, 5.9, 70.0, 5900.0, 132.0, 87.0],
        };
        let spreads: [f64; 9] = [6.0, 0.5, 0.8, 12.0, 1.5, 3.0, 900.0, 5.0, 4.0];
        let mut draw = |i: usize| centers[i] + spreads[i] * standard_normal(&mut rng);

        let age = draw(0).round().clamp(27.0, 59.0);
        let sleep_duration = (draw(1) * 10.0).round() / 10.0;
        let quality = draw(2).round().clamp(4.0, 9.0);
        let activity = draw(3).round().clamp(30.0, 90.0);
        let stress = draw(4).round().clamp(3.0, 8.0);
        let heart_rate = draw(5).round();
        let steps = (draw(6) / 100.0).round() * 100.0;
        let systolic = draw(7).round();
        let diastolic = draw(8).round();

        let gender = if rng.gen_bool(0.5) { "male" } else { "female" };
        let occupation = match class {
            NO_DISORDER if rng.gen_bool(0.6) => ["doctor", "engineer", "lawyer", "accountant"][rng.gen_range(0..4)],
            SLEEP_APNEA if rng.gen_bool(0.6) => "nurse",
            INSOMNIA if rng.gen_bool(0.6) => ["salesperson", "teacher"][rng.gen_range(0..2)],
            _ => OCCUPATIONS[rng.gen_range(0..OCCUPATIONS.len())],
        };
        let bmi = match class {
            NO_DISORDER if rng.gen_bool(0.8) => "normal",
            _ if rng.gen_bool(0.7) => "overweight",
            _ if rng.gen_bool(0.5) => "obese",
            _ => "normal",
        };

        observations.push(
            Observation::new()
                .with("gender", gender)
                .with("age", age)
                .with("occupation", occupation)
                .with("sleep_duration", sleep_duration)
                .with("quality_of_sleep", quality)
                .with("physical_activity_level", activity)
                .with("stress_level", stress)
                .with("bmi_category", bmi)
                .with("heart_rate", heart_rate)
                .with("daily_steps", steps)
                .with("systolic_blood_pressure", systolic)
                .with("diastolic_blood_pressure", diastolic),
        );
        labels.push(class.to_string());
    }

    let features = Table::from_observations(&schema, &observations)
        .expect("synthetic observations match the sleep health schema");
    LabeledDataset {
        features,
        labels,
    }
}

/// Box-Muller standard normal draw
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
