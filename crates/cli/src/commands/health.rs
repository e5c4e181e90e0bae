//! Service health

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, OutputFormat};

pub async fn run(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summary = client.summary().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "summary": summary,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(40));
            println!("Status:        {}", color_status(&summary.status));
            println!("API version:   {}", summary.api_version);
            match &summary.model_version {
                Some(version) => println!("Model:         {}", version.cyan()),
                None => println!("Model:         {}", "not loaded".red()),
            }
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Readiness:     {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:        {}", reason);
            }
        }
    }

    Ok(())
}
