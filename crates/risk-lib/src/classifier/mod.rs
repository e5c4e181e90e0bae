//! Binary classifier capability and output interpretation
//!
//! Every concrete model is adapted to [`BinaryClassifier`]. The adapter fixes
//! the class-order convention for the two-column probability output:
//! column 0 is P(non-default), column 1 is P(default). Trained artifacts must
//! be produced with that class order; it is checked, never inferred.

mod forest;
mod logistic;
mod onnx;

pub use forest::{DecisionTree, RandomForestClassifier};
pub use logistic::LogisticRegressionClassifier;
pub use onnx::{OnnxClassifier, OnnxOutputs};

use crate::contract::{PredictionResult, RiskLabel};
use crate::error::{AdapterError, ClassifierError, ModelContractViolation};
use crate::features::{AlignedFeatureRow, FeatureSchema};

/// Tolerance on P(class 0) + P(class 1) == 1
pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// Number of probability columns a binary classifier must produce
pub const NUM_CLASSES: usize = 2;

/// A fitted binary classifier.
///
/// Both operations must be free of side effects so a single instance can be
/// shared by any number of concurrent requests.
pub trait BinaryClassifier: Send + Sync {
    /// Class label per row
    fn predict(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<i64>, ClassifierError>;

    /// Class probabilities per row, `[p_class0, p_class1]`
    fn predict_proba(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<Vec<f64>>, ClassifierError>;

    /// Labels and probabilities together.
    ///
    /// Backends that produce both from one evaluation override this.
    fn predict_with_proba(
        &self,
        rows: &[AlignedFeatureRow],
    ) -> Result<(Vec<i64>, Vec<Vec<f64>>), ClassifierError> {
        Ok((self.predict(rows)?, self.predict_proba(rows)?))
    }
}

/// Wraps a classifier together with the feature schema it was trained on
pub struct ClassifierAdapter {
    classifier: Box<dyn BinaryClassifier>,
    schema: FeatureSchema,
}

impl ClassifierAdapter {
    pub fn new(classifier: Box<dyn BinaryClassifier>, schema: FeatureSchema) -> Self {
        Self { classifier, schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Probe the classifier with an all-default row of the schema width.
    ///
    /// Skipped when no schema is declared, since the input width is unknown.
    pub fn verify(&self) -> Result<(), AdapterError> {
        if !self.schema.is_declared() {
            return Ok(());
        }
        self.predict_one(&AlignedFeatureRow::zeros(self.schema.len()))
            .map(|_| ())
    }

    pub fn predict_one(&self, row: &AlignedFeatureRow) -> Result<PredictionResult, AdapterError> {
        let mut results = self.predict_batch(std::slice::from_ref(row))?;
        results
            .pop()
            .ok_or_else(|| ModelContractViolation::new("classifier returned no output").into())
    }

    /// Predict every row; `output[i]` corresponds to `rows[i]`
    pub fn predict_batch(
        &self,
        rows: &[AlignedFeatureRow],
    ) -> Result<Vec<PredictionResult>, AdapterError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let (labels, probabilities) = self.classifier.predict_with_proba(rows)?;

        if labels.len() != rows.len() || probabilities.len() != rows.len() {
            return Err(ModelContractViolation::new(format!(
                "classifier returned {} labels and {} probability rows for {} input rows",
                labels.len(),
                probabilities.len(),
                rows.len()
            ))
            .into());
        }

        labels
            .into_iter()
            .zip(probabilities.iter())
            .map(|(label, proba)| interpret(label, proba).map_err(AdapterError::from))
            .collect()
    }
}

/// Map one classifier output row onto a prediction result
fn interpret(label: i64, proba: &[f64]) -> Result<PredictionResult, ModelContractViolation> {
    if proba.len() != NUM_CLASSES {
        return Err(ModelContractViolation::new(format!(
            "probability output has {} columns, expected {}",
            proba.len(),
            NUM_CLASSES
        )));
    }

    let probability_non_default = proba[0];
    let probability_default = proba[1];

    for p in [probability_non_default, probability_default] {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ModelContractViolation::new(format!(
                "probability {} is outside [0, 1]",
                p
            )));
        }
    }

    let total = probability_non_default + probability_default;
    if (total - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        return Err(ModelContractViolation::new(format!(
            "class probabilities sum to {}, expected 1",
            total
        )));
    }

    let prediction = match label {
        0 => RiskLabel::NonDefault,
        1 => RiskLabel::Default,
        other => {
            return Err(ModelContractViolation::new(format!(
                "classifier predicted label {}, expected 0 or 1",
                other
            )))
        }
    };

    Ok(PredictionResult {
        prediction,
        probability_default,
        probability_non_default,
    })
}

/// Check every row has the width the classifier was built for
pub(crate) fn check_width(rows: &[AlignedFeatureRow], expected: usize) -> Result<(), ClassifierError> {
    match rows.iter().find(|r| r.len() != expected) {
        Some(row) => Err(ClassifierError::DimensionMismatch {
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubClassifier;
    use super::*;

    fn adapter(stub: StubClassifier, names: &[&str]) -> ClassifierAdapter {
        let schema =
            FeatureSchema::declared(names.iter().map(|n| n.to_string()).collect()).unwrap();
        ClassifierAdapter::new(Box::new(stub), schema)
    }

    fn row(values: &[f64]) -> AlignedFeatureRow {
        AlignedFeatureRow::new(values.to_vec())
    }

    #[test]
    fn test_probability_columns_mapped_by_index() {
        let a = adapter(StubClassifier::fixed(0, vec![0.85, 0.15]), &["x"]);
        let result = a.predict_one(&row(&[1.0])).unwrap();

        assert_eq!(result.prediction, RiskLabel::NonDefault);
        assert_eq!(result.probability_default, 0.15);
        assert_eq!(result.probability_non_default, 0.85);
    }

    #[test]
    fn test_three_column_output_is_contract_violation() {
        let a = adapter(StubClassifier::fixed(0, vec![0.5, 0.3, 0.2]), &["x"]);
        let err = a.predict_one(&row(&[1.0])).unwrap_err();
        assert!(matches!(err, AdapterError::Contract(_)));
        assert!(a.verify().is_err());
    }

    #[test]
    fn test_unknown_label_is_contract_violation() {
        let a = adapter(StubClassifier::fixed(2, vec![0.5, 0.5]), &["x"]);
        assert!(matches!(
            a.predict_one(&row(&[1.0])),
            Err(AdapterError::Contract(_))
        ));
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let a = adapter(StubClassifier::fixed(0, vec![0.3, 0.3]), &["x"]);
        let err = a.predict_one(&row(&[1.0])).unwrap_err();
        assert!(err.to_string().contains("sum"));

        let close = adapter(StubClassifier::fixed(0, vec![0.6, 0.4 + 1e-9]), &["x"]);
        assert!(close.predict_one(&row(&[1.0])).is_ok());
    }

    #[test]
    fn test_negative_probability_rejected() {
        let a = adapter(StubClassifier::fixed(1, vec![-0.1, 1.1]), &["x"]);
        assert!(a.predict_one(&row(&[1.0])).is_err());
    }

    #[test]
    fn test_backend_failure_is_classifier_error() {
        let a = adapter(StubClassifier::failing(), &["x"]);
        assert!(matches!(
            a.predict_one(&row(&[1.0])),
            Err(AdapterError::Classifier(_))
        ));
    }

    #[test]
    fn test_batch_preserves_order() {
        let a = adapter(StubClassifier::echo(), &["x"]);
        let rows = vec![row(&[100.0]), row(&[900.0]), row(&[250.0])];
        let results = a.predict_batch(&rows).unwrap();

        assert_eq!(results.len(), 3);
        assert!((results[0].probability_default - 0.1).abs() < 1e-12);
        assert_eq!(results[1].prediction, RiskLabel::Default);
        assert!((results[2].probability_default - 0.25).abs() < 1e-12);
    }

    /// Only the combined path works, as with a single-pass backend
    struct SinglePass;

    impl BinaryClassifier for SinglePass {
        fn predict(&self, _: &[AlignedFeatureRow]) -> Result<Vec<i64>, ClassifierError> {
            Err(ClassifierError::Backend(anyhow::anyhow!("labels evaluated separately")))
        }

        fn predict_proba(&self, _: &[AlignedFeatureRow]) -> Result<Vec<Vec<f64>>, ClassifierError> {
            Err(ClassifierError::Backend(anyhow::anyhow!("probabilities evaluated separately")))
        }

        fn predict_with_proba(
            &self,
            rows: &[AlignedFeatureRow],
        ) -> Result<(Vec<i64>, Vec<Vec<f64>>), ClassifierError> {
            Ok((vec![1; rows.len()], vec![vec![0.25, 0.75]; rows.len()]))
        }
    }

    #[test]
    fn test_adapter_uses_combined_output() {
        let a = ClassifierAdapter::new(Box::new(SinglePass), FeatureSchema::undeclared());
        let result = a.predict_one(&row(&[1.0])).unwrap();
        assert_eq!(result.prediction, RiskLabel::Default);
        assert_eq!(result.probability_default, 0.75);
    }

    #[test]
    fn test_empty_batch() {
        let a = adapter(StubClassifier::failing(), &["x"]);
        assert!(a.predict_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_verify_skipped_without_schema() {
        let a = ClassifierAdapter::new(
            Box::new(StubClassifier::fixed(0, vec![0.2, 0.3, 0.5])),
            FeatureSchema::undeclared(),
        );
        assert!(a.verify().is_ok());
    }

    #[test]
    fn test_check_width() {
        let rows = vec![row(&[1.0, 2.0]), row(&[1.0])];
        assert!(matches!(
            check_width(&rows, 2),
            Err(ClassifierError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(check_width(&rows[..1], 2).is_ok());
    }
}
