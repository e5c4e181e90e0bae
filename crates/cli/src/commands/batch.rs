//! Batch scoring against the API

use anyhow::Result;
use std::path::Path;

use super::read_applications;
use crate::client::ApiClient;
use crate::output::{print_batch, print_info, print_json, OutputFormat};

pub async fn run(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let applications = read_applications(file)?;
    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "Submitting {} applications from {}",
            applications.len(),
            file.display()
        ));
    }

    let response = client.predict_batch(&applications).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_batch(&response.results, &response.model_version),
    }

    Ok(())
}
