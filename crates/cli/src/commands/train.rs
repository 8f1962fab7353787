//! Offline training command

use anyhow::{Context, Result};
use colored::Colorize;
use sleep_lib::{SelectionPolicy, Trainer, TrainingConfig};
use std::path::PathBuf;
use tabled::Tabled;

use crate::output::{format_score, print_info, print_json, print_success, print_table, OutputFormat};

/// Flag overrides applied on top of the `SLEEP_TRAIN_*` configuration
#[derive(Debug, Clone, Default)]
pub struct TrainOverrides {
    pub data_path: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub seed: Option<u64>,
    pub selection: Option<SelectionPolicy>,
}

impl TrainOverrides {
    pub fn apply(self, mut config: TrainingConfig) -> TrainingConfig {
        if let Some(data_path) = self.data_path {
            config.data_path = data_path;
        }
        if let Some(model_dir) = self.model_dir {
            config.model_dir = model_dir;
        }
        if let Some(seed) = self.seed {
            config.random_seed = seed;
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
        config
    }
}

/// Row for the candidate summary table
#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "Variant")]
    variant: String,
    #[tabled(rename = "Val Acc")]
    validation_accuracy: String,
    #[tabled(rename = "Val F1")]
    validation_f1: String,
    #[tabled(rename = "Test Acc")]
    test_accuracy: String,
    #[tabled(rename = "Test F1")]
    test_f1: String,
    #[tabled(rename = "Test Log Loss")]
    test_log_loss: String,
    #[tabled(rename = "Deployed")]
    deployed: String,
}

/// Train every candidate family and write the artifact set
pub fn run_training(overrides: TrainOverrides, format: OutputFormat) -> Result<()> {
    let config = TrainingConfig::from_env().context("Failed to load training configuration")?;
    let config = overrides.apply(config);

    if let OutputFormat::Table = format {
        print_info(&format!(
            "Training on {} (seed {}, selection {})",
            config.data_path.display(),
            config.random_seed,
            config.selection
        ));
    }

    let report = Trainer::new(config).run().context("Training failed")?;
    let manifest = &report.manifest;

    match format {
        OutputFormat::Json => print_json(manifest)?,
        OutputFormat::Table => {
            println!(
                "Split: {} train / {} validation / {} test",
                manifest.split.train, manifest.split.validation, manifest.split.test
            );
            println!();

            let rows = manifest
                .candidates
                .iter()
                .map(|c| CandidateRow {
                    variant: c.kind.to_string(),
                    validation_accuracy: format_score(c.validation.accuracy),
                    validation_f1: format_score(c.validation.macro_f1),
                    test_accuracy: format_score(c.test.accuracy),
                    test_f1: format_score(c.test.macro_f1),
                    test_log_loss: format_score(c.test.log_loss),
                    deployed: if c.kind == manifest.deployed_variant {
                        "✓".green().to_string()
                    } else {
                        String::new()
                    },
                })
                .collect();
            print_table(rows);

            print_success(&format!(
                "Deployed {} to {}",
                manifest.deployed_variant,
                report.model_dir.display()
            ));
        }
    }

    Ok(())
}
