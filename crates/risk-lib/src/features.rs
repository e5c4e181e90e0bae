//! Feature alignment for ML inference
//!
//! Reconciles a named input record with the ordered feature schema a trained
//! classifier expects. Classifiers read rows positionally, so the output order
//! is exactly the schema order.

use crate::error::ModelContractViolation;
use crate::models::FeatureRecord;
use std::collections::HashSet;

/// Value substituted for a schema feature the record does not carry
pub const MISSING_FEATURE_DEFAULT: f64 = 0.0;

/// Ordered feature names declared by a loaded model.
///
/// An empty schema is the undeclared schema: alignment is skipped and the
/// record passes through in its natural order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn declared(names: Vec<String>) -> Result<Self, ModelContractViolation> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ModelContractViolation::new(format!(
                    "duplicate feature name '{}' in schema",
                    name
                )));
            }
        }
        Ok(Self { names })
    }

    pub fn undeclared() -> Self {
        Self { names: Vec::new() }
    }

    pub fn is_declared(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Positional feature values ready for a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFeatureRow(Vec<f64>);

impl AlignedFeatureRow {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(width: usize) -> Self {
        Self(vec![MISSING_FEATURE_DEFAULT; width])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// What alignment did to a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    /// Schema features absent from the record, filled with the default
    pub filled: Vec<String>,
    /// Record fields not named by the schema
    pub dropped: Vec<String>,
    /// The schema was undeclared and the record passed through unchanged
    pub passthrough: bool,
}

impl AlignmentReport {
    pub fn is_exact(&self) -> bool {
        self.filled.is_empty() && self.dropped.is_empty()
    }
}

/// Align a record to a schema
pub fn align(record: &FeatureRecord, schema: &FeatureSchema) -> AlignedFeatureRow {
    if !schema.is_declared() {
        return AlignedFeatureRow(record.iter().map(|(_, v)| v).collect());
    }

    AlignedFeatureRow(
        schema
            .names()
            .iter()
            .map(|name| record.get(name).unwrap_or(MISSING_FEATURE_DEFAULT))
            .collect(),
    )
}

/// Align a record and describe which features were filled or dropped
pub fn align_with_report(
    record: &FeatureRecord,
    schema: &FeatureSchema,
) -> (AlignedFeatureRow, AlignmentReport) {
    let row = align(record, schema);

    if !schema.is_declared() {
        let report = AlignmentReport {
            passthrough: true,
            ..AlignmentReport::default()
        };
        return (row, report);
    }

    let filled = schema
        .names()
        .iter()
        .filter(|name| !record.contains(name))
        .cloned()
        .collect();
    let declared: HashSet<&str> = schema.names().iter().map(String::as_str).collect();
    let dropped = record
        .names()
        .filter(|name| !declared.contains(name))
        .map(str::to_string)
        .collect();

    (
        row,
        AlignmentReport {
            filled,
            dropped,
            passthrough: false,
        },
    )
}
