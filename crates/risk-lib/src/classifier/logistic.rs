//! Logistic regression classifier

use super::{check_width, BinaryClassifier};
use crate::error::{ClassifierError, ModelContractViolation};
use crate::features::AlignedFeatureRow;

/// `P(default) = sigmoid(coefficients . x + intercept)`
#[derive(Debug, Clone)]
pub struct LogisticRegressionClassifier {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticRegressionClassifier {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Result<Self, ModelContractViolation> {
        if coefficients.is_empty() {
            return Err(ModelContractViolation::new("logistic regression has no coefficients"));
        }
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelContractViolation::new(
                "logistic regression weights must be finite",
            ));
        }
        Ok(Self {
            coefficients,
            intercept,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn p_default(&self, x: &[f64]) -> f64 {
        let z: f64 = self
            .coefficients
            .iter()
            .zip(x)
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }
}

fn sigmoid(z: f64) -> f64 {
    // Split by sign so exp never overflows
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl BinaryClassifier for LogisticRegressionClassifier {
    fn predict(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<i64>, ClassifierError> {
        check_width(rows, self.n_features())?;
        Ok(rows
            .iter()
            .map(|r| (self.p_default(r.as_slice()) > 0.5) as i64)
            .collect())
    }

    fn predict_proba(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<Vec<f64>>, ClassifierError> {
        check_width(rows, self.n_features())?;
        Ok(rows
            .iter()
            .map(|r| {
                let p1 = self.p_default(r.as_slice());
                vec![1.0 - p1, p1]
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f64]) -> AlignedFeatureRow {
        AlignedFeatureRow::new(values.to_vec())
    }

    #[test]
    fn test_zero_logit_is_even() {
        let model = LogisticRegressionClassifier::new(vec![1.0, -1.0], 0.0).unwrap();
        let proba = model.predict_proba(&[row(&[2.0, 2.0])]).unwrap();
        assert_eq!(proba[0], vec![0.5, 0.5]);
        assert_eq!(model.predict(&[row(&[2.0, 2.0])]).unwrap(), vec![0]);
    }

    #[test]
    fn test_sign_of_logit_decides_label() {
        let model = LogisticRegressionClassifier::new(vec![0.01], -7.0).unwrap();
        let labels = model.predict(&[row(&[600.0]), row(&[800.0])]).unwrap();
        assert_eq!(labels, vec![0, 1]);
    }

    #[test]
    fn test_extreme_logits_stay_finite() {
        let model = LogisticRegressionClassifier::new(vec![1.0], 0.0).unwrap();
        let proba = model.predict_proba(&[row(&[1e6]), row(&[-1e6])]).unwrap();
        assert_eq!(proba[0], vec![0.0, 1.0]);
        assert_eq!(proba[1], vec![1.0, 0.0]);
    }

    #[test]
    fn test_width_checked() {
        let model = LogisticRegressionClassifier::new(vec![1.0, 2.0, 3.0], 0.0).unwrap();
        assert!(model.predict_proba(&[row(&[1.0, 2.0])]).is_err());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(LogisticRegressionClassifier::new(vec![], 0.0).is_err());
        assert!(LogisticRegressionClassifier::new(vec![f64::NAN], 0.0).is_err());
    }
}
