//! Offline model artifact commands

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use risk_lib::artifact::compute_checksum;
use risk_lib::contract::{BatchItem, CreditApplication, ErrorResponse};
use risk_lib::{load_model, LoadedModel, ModelSlot, PredictionService, ServiceConfig};
use serde::Serialize;
use std::path::Path;

use super::read_applications;
use crate::output::{print_batch, print_json, OutputFormat};

/// What `inspect` reports about an artifact
#[derive(Debug, Serialize)]
struct ArtifactInfo {
    path: String,
    sha256: String,
    model_version: String,
    kind: String,
    feature_names: Option<Vec<String>>,
    loaded_at: String,
}

impl ArtifactInfo {
    fn new(path: &Path, bytes: &[u8], model: &LoadedModel) -> Self {
        let schema = model.schema();
        Self {
            path: path.display().to_string(),
            sha256: compute_checksum(bytes),
            model_version: model.model_version().to_string(),
            kind: model.kind().to_string(),
            feature_names: schema.is_declared().then(|| schema.names().to_vec()),
            loaded_at: DateTime::<Utc>::from_timestamp(model.loaded_at(), 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScoreReport {
    model_version: String,
    results: Vec<BatchItem>,
}

fn load(artifact: &Path) -> Result<LoadedModel> {
    load_model(artifact).with_context(|| format!("Failed to load model from {}", artifact.display()))
}

/// Load an artifact and describe it
pub fn inspect(artifact: &Path, format: OutputFormat) -> Result<()> {
    let bytes = std::fs::read(artifact)
        .with_context(|| format!("Failed to read {}", artifact.display()))?;
    let model = load(artifact)?;
    let info = ArtifactInfo::new(artifact, &bytes, &model);

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("{}", "Model Artifact".bold());
            println!("{}", "=".repeat(60));
            println!("Path:       {}", info.path);
            println!("SHA-256:    {}", info.sha256);
            println!("Version:    {}", info.model_version.cyan());
            println!("Kind:       {}", info.kind);
            match &info.feature_names {
                Some(names) => {
                    println!("Features:   {}", names.len());
                    for (i, name) in names.iter().enumerate() {
                        println!("  {:>3}  {}", i, name);
                    }
                }
                None => println!("Features:   {}", "undeclared (passed through in record order)".yellow()),
            }
        }
    }

    Ok(())
}

/// Score applications in-process with the same pipeline the server runs
pub fn score(artifact: &Path, file: &Path, format: OutputFormat) -> Result<()> {
    let model = load(artifact)?;
    let model_version = model.model_version().to_string();
    let service = PredictionService::new(ModelSlot::loaded(model), ServiceConfig::default());

    let values = read_applications(file)?;
    service.admit_batch(values.len())?;

    let results: Vec<BatchItem> = values
        .iter()
        .enumerate()
        .map(|(index, value)| match CreditApplication::from_value(value) {
            Ok(application) => BatchItem::from_outcome(index, service.predict(&application)),
            Err(errors) => BatchItem::from_error(index, ErrorResponse::validation(&errors)),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&ScoreReport {
            model_version,
            results,
        })?,
        OutputFormat::Table => print_batch(&results, &model_version),
    }

    Ok(())
}
