//! Manual test client for `POST /predict`

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_class, color_probability, print_json, print_table, OutputFormat};

/// Row for the probability table
#[derive(Tabled)]
struct ProbabilityRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// The reference observation sent when no input file is given
pub fn sample_observation() -> serde_json::Value {
    serde_json::json!({
        "age": 32,
        "bmi_category": "normal",
        "daily_steps": 5000,
        "diastolic_blood_pressure": 80,
        "gender": "male",
        "heart_rate": 72,
        "occupation": "doctor",
        "physical_activity_level": 30,
        "quality_of_sleep": 6,
        "sleep_duration": 6.0,
        "stress_level": 8,
        "systolic_blood_pressure": 125
    })
}

/// Read an observation from a JSON file holding one object
pub fn load_observation(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;

    if !value.is_object() {
        anyhow::bail!("{} must contain a JSON object of field values", path.display());
    }
    Ok(value)
}

/// Send one observation and print the prediction
pub async fn predict(client: &ApiClient, input: Option<&Path>, format: OutputFormat) -> Result<()> {
    let observation = match input {
        Some(path) => load_observation(path)?,
        None => sample_observation(),
    };

    let prediction = client.predict(&observation).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            println!(
                "{} {} ({})",
                "Predicted:".bold(),
                color_class(&prediction.predicted_class),
                color_probability(prediction.confidence())
            );
            println!();

            let mut probabilities: Vec<(&String, &f64)> =
                prediction.class_probabilities.iter().collect();
            probabilities.sort_by(|a, b| b.1.total_cmp(a.1));

            let rows = probabilities
                .into_iter()
                .map(|(class, &p)| ProbabilityRow {
                    class: class.clone(),
                    probability: color_probability(p),
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sample_has_every_field() {
        let sample = sample_observation();
        let schema = sleep_lib::FeatureSchema::sleep_health();
        let object = sample.as_object().unwrap();

        assert_eq!(object.len(), schema.len());
        for name in schema.names() {
            assert!(object.contains_key(name), "sample is missing {}", name);
        }
    }

    #[test]
    fn test_load_observation_requires_object() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(load_observation(file.path()).is_err());

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"age": 40}}"#).unwrap();
        assert_eq!(load_observation(file.path()).unwrap()["age"], 40);
    }
}
