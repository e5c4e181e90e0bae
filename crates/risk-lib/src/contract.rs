//! Request/response contract for the prediction API
//!
//! Owns the externally visible schema: field names, numeric bounds and type
//! coercion for applications, plus the success, validation-error and
//! server-error response shapes. Everything here runs before inference.

use crate::error::ServiceError;
use crate::models::FeatureRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Required application fields, in the order the record presents them
pub const APPLICATION_FIELDS: [&str; 6] = [
    "income",
    "debt",
    "credit_score",
    "employment_length",
    "loan_amount",
    "loan_term",
];

/// Lowest accepted credit score
pub const MIN_CREDIT_SCORE: i64 = 300;

/// Highest accepted credit score
pub const MAX_CREDIT_SCORE: i64 = 850;

/// A loan application as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditApplication {
    /// Annual income in USD
    pub income: f64,
    /// Total debt in USD
    pub debt: f64,
    /// Credit score (300-850)
    pub credit_score: i64,
    /// Years of employment
    pub employment_length: f64,
    /// Requested loan amount in USD
    pub loan_amount: f64,
    /// Loan term in months
    pub loan_term: i64,
    /// Additional numeric features for models that declare them
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl CreditApplication {
    pub fn new(
        income: f64,
        debt: f64,
        credit_score: i64,
        employment_length: f64,
        loan_amount: f64,
        loan_term: i64,
    ) -> Self {
        Self {
            income,
            debt,
            credit_score,
            employment_length,
            loan_amount,
            loan_term,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Coerce an untyped JSON body into an application.
    ///
    /// Collects every field-level problem rather than stopping at the first.
    /// Numeric extra fields are kept; non-numeric extras are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ValidationErrors> {
        let Some(object) = value.as_object() else {
            return Err(ValidationErrors::single("body", "must be a JSON object"));
        };

        let mut violations = Vec::new();
        let income = read_number(object, "income", &mut violations);
        let debt = read_number(object, "debt", &mut violations);
        let credit_score = read_integer(object, "credit_score", &mut violations);
        let employment_length = read_number(object, "employment_length", &mut violations);
        let loan_amount = read_number(object, "loan_amount", &mut violations);
        let loan_term = read_integer(object, "loan_term", &mut violations);

        let extra: BTreeMap<String, f64> = object
            .iter()
            .filter(|(name, _)| !APPLICATION_FIELDS.contains(&name.as_str()))
            .filter_map(|(name, v)| v.as_f64().map(|x| (name.clone(), x)))
            .collect();

        match (income, debt, credit_score, employment_length, loan_amount, loan_term) {
            (Some(income), Some(debt), Some(credit_score), Some(employment_length), Some(loan_amount), Some(loan_term))
                if violations.is_empty() =>
            {
                Ok(Self {
                    income,
                    debt,
                    credit_score,
                    employment_length,
                    loan_amount,
                    loan_term,
                    extra,
                })
            }
            _ => Err(ValidationErrors(violations)),
        }
    }

    /// Check the numeric bounds of every field
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut violations = Vec::new();

        for (field, value) in self.core_fields() {
            if !value.is_finite() {
                violations.push(FieldViolation::new(field, "must be a finite number"));
                continue;
            }
            let bound = bound_for(field);
            if !bound.accepts(value) {
                violations.push(FieldViolation::new(field, bound.describe()));
            }
        }

        for (field, value) in &self.extra {
            if !value.is_finite() {
                violations.push(FieldViolation::new(field.clone(), "must be a finite number"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(violations))
        }
    }

    /// Named values: the six application fields, then extras by name
    pub fn to_record(&self) -> FeatureRecord {
        self.core_fields()
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .chain(self.extra.iter().map(|(n, v)| (n.clone(), *v)))
            .collect()
    }

    /// Named values of the six application fields only.
    ///
    /// Used when the model declares no schema, so extras never widen the row.
    pub fn contract_record(&self) -> FeatureRecord {
        self.core_fields()
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect()
    }

    fn core_fields(&self) -> [(&'static str, f64); 6] {
        [
            ("income", self.income),
            ("debt", self.debt),
            ("credit_score", self.credit_score as f64),
            ("employment_length", self.employment_length),
            ("loan_amount", self.loan_amount),
            ("loan_term", self.loan_term as f64),
        ]
    }
}

/// Numeric constraint on a single field
#[derive(Debug, Clone, Copy)]
enum Bound {
    GreaterThan(f64),
    AtLeast(f64),
    Between(f64, f64),
}

impl Bound {
    fn accepts(&self, value: f64) -> bool {
        match *self {
            Bound::GreaterThan(min) => value > min,
            Bound::AtLeast(min) => value >= min,
            Bound::Between(lo, hi) => (lo..=hi).contains(&value),
        }
    }

    fn describe(&self) -> String {
        match *self {
            Bound::GreaterThan(min) => format!("must be greater than {}", min),
            Bound::AtLeast(min) => format!("must be greater than or equal to {}", min),
            Bound::Between(lo, hi) => format!("must be between {} and {}", lo, hi),
        }
    }
}

fn bound_for(field: &str) -> Bound {
    match field {
        "debt" | "employment_length" => Bound::AtLeast(0.0),
        "credit_score" => Bound::Between(MIN_CREDIT_SCORE as f64, MAX_CREDIT_SCORE as f64),
        // income, loan_amount, loan_term
        _ => Bound::GreaterThan(0.0),
    }
}

fn read_number(object: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) -> Option<f64> {
    match object.get(field) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(field, "field required"));
            None
        }
        Some(value) => match value.as_f64() {
            Some(x) => Some(x),
            None => {
                violations.push(FieldViolation::new(field, "must be a number"));
                None
            }
        },
    }
}

fn read_integer(object: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) -> Option<i64> {
    let value = read_number(object, field, violations)?;
    if let Some(i) = object.get(field).and_then(Value::as_i64) {
        return Some(i);
    }
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        violations.push(FieldViolation::new(field, "must be an integer"));
        None
    }
}

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub issue: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            issue: issue.into(),
        }
    }
}

/// All field-level failures for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldViolation>);

impl ValidationErrors {
    pub fn single(field: impl Into<String>, issue: impl Into<String>) -> Self {
        Self(vec![FieldViolation::new(field, issue)])
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.field.as_str()).collect()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.iter().any(|v| v.field == field)
    }
}

impl From<Vec<FieldViolation>> for ValidationErrors {
    fn from(violations: Vec<FieldViolation>) -> Self {
        Self(violations)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| format!("{}: {}", v.field, v.issue))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Binary risk outcome. Class 1 is the default (high-risk) class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskLabel {
    NonDefault,
    Default,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::NonDefault => "non_default",
            RiskLabel::Default => "default",
        }
    }
}

impl From<RiskLabel> for u8 {
    fn from(label: RiskLabel) -> u8 {
        match label {
            RiskLabel::NonDefault => 0,
            RiskLabel::Default => 1,
        }
    }
}

impl TryFrom<u8> for RiskLabel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RiskLabel::NonDefault),
            1 => Ok(RiskLabel::Default),
            other => Err(format!("risk label must be 0 or 1, got {}", other)),
        }
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 1 for high risk, 0 for low risk
    pub prediction: RiskLabel,
    /// Probability of default (class 1)
    pub probability_default: f64,
    /// Probability of non-default (class 0)
    pub probability_non_default: f64,
}

/// Successful single prediction response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub prediction: PredictionResult,
    pub model_version: String,
}

impl PredictionResponse {
    pub fn new(prediction: PredictionResult, model_version: impl Into<String>) -> Self {
        Self {
            success: true,
            prediction,
            model_version: model_version.into(),
        }
    }
}

/// Batch prediction request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictionRequest {
    pub applications: Vec<Value>,
}

/// Per-item outcome within a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl BatchItem {
    pub fn from_outcome(index: usize, outcome: Result<PredictionResult, ServiceError>) -> Self {
        match outcome {
            Ok(prediction) => Self {
                index,
                success: true,
                prediction: Some(prediction),
                error: None,
                details: None,
            },
            Err(e) => Self::from_error(index, ErrorResponse::from_service_error(&e)),
        }
    }

    pub fn from_error(index: usize, error: ErrorResponse) -> Self {
        Self {
            index,
            success: false,
            prediction: None,
            error: Some(error.error),
            details: error.details,
        }
    }
}

/// Batch prediction response, results in request order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictionResponse {
    pub success: bool,
    pub model_version: String,
    pub results: Vec<BatchItem>,
}

/// Error response body for both validation and server errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            error: error.into(),
            details,
        }
    }

    pub fn validation(errors: &ValidationErrors) -> Self {
        Self::new("Validation error", Some(json!({ "errors": errors })))
    }

    /// Build the caller-facing body. Server-side causes are never included.
    pub fn from_service_error(error: &ServiceError) -> Self {
        match error {
            ServiceError::InvalidInput(errors) => Self::validation(errors),
            ServiceError::ModelUnavailable => Self::new(
                "Model not loaded",
                Some(json!({ "info": "The prediction model is not available" })),
            ),
            ServiceError::Timeout(_) => Self::new("Prediction timed out", None),
            ServiceError::InferenceFailed(_) | ServiceError::WorkerFailed(_) => {
                Self::new("Prediction failed", None)
            }
        }
    }
}

/// Root endpoint summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: String,
    pub model_loaded: bool,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}
