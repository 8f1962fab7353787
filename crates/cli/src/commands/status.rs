//! Service health and model information

use anyhow::Result;
use colored::Colorize;

use crate::client::ApiClient;
use crate::output::{color_status, format_score, print_json, print_warning, OutputFormat};

/// Show liveness and readiness of the service
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(40));
            println!("Liveness:   {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Readiness:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:     {}", reason);
            }
        }
    }

    Ok(())
}

/// Show the served model and its recorded metrics
pub async fn show_model(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.model().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("{}", "Served Model".bold());
            println!("{}", "=".repeat(50));
            println!("Variant:            {}", info.variant.to_string().cyan());
            if info.variant != info.deployed_variant {
                print_warning(&format!(
                    "Overrides the deployed variant {}",
                    info.deployed_variant
                ));
            }
            println!("Trained At:         {}", info.trained_at);
            println!("Classes:            {}", info.classes.join(", "));
            println!(
                "Split:              {} / {} / {}",
                info.split.train, info.split.validation, info.split.test
            );
            println!();

            println!("{}", "Metrics".bold());
            println!("{}", "-".repeat(50));
            if let Some(validation) = info.validation {
                println!(
                    "Validation:         acc {}  f1 {}",
                    format_score(validation.accuracy),
                    format_score(validation.macro_f1)
                );
            }
            if let Some(test) = info.test {
                println!(
                    "Test:               acc {}  f1 {}",
                    format_score(test.accuracy),
                    format_score(test.macro_f1)
                );
            }
            println!();

            println!("{}", "Traffic".bold());
            println!("{}", "-".repeat(50));
            println!("Served:             {}", info.stats.predictions_served);
            println!("Failed:             {}", info.stats.predictions_failed);
            println!("Unseen Categories:  {}", info.stats.unseen_categories);
        }
    }

    Ok(())
}
