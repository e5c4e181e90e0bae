//! Single application scoring against the API

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use risk_lib::contract::CreditApplication;

use crate::client::ApiClient;
use crate::output::{color_label, format_probability, print_json, OutputFormat};

/// Application fields, named as in the API
#[derive(Debug, Args)]
pub struct ApplicationArgs {
    /// Annual income in USD
    #[arg(long)]
    pub income: f64,

    /// Total debt in USD
    #[arg(long)]
    pub debt: f64,

    /// Credit score (300-850)
    #[arg(long)]
    pub credit_score: i64,

    /// Years of employment
    #[arg(long)]
    pub employment_length: f64,

    /// Requested loan amount in USD
    #[arg(long)]
    pub loan_amount: f64,

    /// Loan term in months
    #[arg(long)]
    pub loan_term: i64,
}

impl From<ApplicationArgs> for CreditApplication {
    fn from(args: ApplicationArgs) -> Self {
        CreditApplication::new(
            args.income,
            args.debt,
            args.credit_score,
            args.employment_length,
            args.loan_amount,
            args.loan_term,
        )
    }
}

/// Bounds are checked by the server so its messages are shown unchanged
pub async fn run(client: &ApiClient, args: ApplicationArgs, format: OutputFormat) -> Result<()> {
    let application = CreditApplication::from(args);
    let response = client.predict(&application).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let p = response.prediction;
            println!("{}", "Credit Risk Prediction".bold());
            println!("{}", "=".repeat(40));
            println!("Risk:                 {}", color_label(p.prediction));
            println!("P(default):           {}", format_probability(p.probability_default));
            println!("P(non-default):       {}", format_probability(p.probability_non_default));
            println!("Model version:        {}", response.model_version.cyan());
        }
    }

    Ok(())
}
