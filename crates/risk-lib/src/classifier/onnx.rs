//! ONNX classifier inference using tract
//!
//! Runs a classifier exported to ONNX (for example with `zipmap` disabled)
//! that emits a label tensor and an `[N, 2]` probability tensor.

use super::{check_width, BinaryClassifier};
use crate::error::ClassifierError;
use crate::features::AlignedFeatureRow;
use anyhow::{anyhow, Context, Result};
use std::ops::Deref;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Positions of the label and probability outputs in the model graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnnxOutputs {
    pub label: usize,
    pub probabilities: usize,
}

impl Default for OnnxOutputs {
    fn default() -> Self {
        Self {
            label: 0,
            probabilities: 1,
        }
    }
}

/// ONNX-based classifier with a fixed `[1, n_features]` f32 input
pub struct OnnxClassifier {
    model: TractModel,
    n_features: usize,
    outputs: OnnxOutputs,
}

impl OnnxClassifier {
    /// Load and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8], n_features: usize, outputs: OnnxOutputs) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, n_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self {
            model,
            n_features,
            outputs,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn run_row(&self, row: &AlignedFeatureRow) -> Result<(i64, Vec<f64>)> {
        let start = Instant::now();

        let data: Vec<f32> = row.as_slice().iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.n_features), data)?.into();
        let result = self.model.run(tvec!(input.into()))?;
        let parsed = read_outputs(&result[..], self.outputs)?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(parsed)
    }
}

/// Pull the first label and its probability row out of the graph outputs
fn read_outputs<T: Deref<Target = Tensor>>(result: &[T], outputs: OnnxOutputs) -> Result<(i64, Vec<f64>)> {
    let label_output = result
        .get(outputs.label)
        .ok_or_else(|| anyhow!("Model has no output {}", outputs.label))?;
    let labels = label_output.cast_to::<i64>()?;
    let label = labels
        .as_slice::<i64>()?
        .first()
        .copied()
        .context("Label output is empty")?;

    let proba_output = result
        .get(outputs.probabilities)
        .ok_or_else(|| anyhow!("Model has no output {}", outputs.probabilities))?;
    let proba = proba_output.cast_to::<f32>()?;
    let values: Vec<f64> = proba.as_slice::<f32>()?.iter().map(|p| *p as f64).collect();

    Ok((label, values))
}

impl BinaryClassifier for OnnxClassifier {
    fn predict(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<i64>, ClassifierError> {
        Ok(self.predict_with_proba(rows)?.0)
    }

    fn predict_proba(&self, rows: &[AlignedFeatureRow]) -> Result<Vec<Vec<f64>>, ClassifierError> {
        Ok(self.predict_with_proba(rows)?.1)
    }

    fn predict_with_proba(
        &self,
        rows: &[AlignedFeatureRow],
    ) -> Result<(Vec<i64>, Vec<Vec<f64>>), ClassifierError> {
        check_width(rows, self.n_features)?;
        let mut labels = Vec::with_capacity(rows.len());
        let mut probabilities = Vec::with_capacity(rows.len());
        for row in rows {
            let (label, proba) = self.run_row(row).map_err(ClassifierError::Backend)?;
            labels.push(label);
            probabilities.push(proba);
        }
        Ok((labels, probabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = OnnxClassifier::from_bytes(b"definitely not protobuf", 6, OnnxOutputs::default());
        assert!(result.is_err());
    }

    /// Softmax over `[0, x0]`: P(default) is the sigmoid of the first feature
    const SIGMOID_MODEL: &[u8] = include_bytes!("testdata/sigmoid_two_features.onnx");

    fn row(values: &[f64]) -> AlignedFeatureRow {
        AlignedFeatureRow::new(values.to_vec())
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn test_runs_exported_model() {
        let model = OnnxClassifier::from_bytes(SIGMOID_MODEL, 2, OnnxOutputs::default()).unwrap();
        assert_eq!(model.n_features(), 2);

        let (labels, proba) = model
            .predict_with_proba(&[row(&[2.0, 5.0]), row(&[-2.0, 5.0])])
            .unwrap();

        assert_eq!(labels, vec![1, 0]);
        assert!((proba[0][1] - sigmoid(2.0)).abs() < 1e-5);
        assert!((proba[1][1] - sigmoid(-2.0)).abs() < 1e-5);
        assert!((proba[0][0] + proba[0][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_exported_model_through_adapter() {
        let model = OnnxClassifier::from_bytes(SIGMOID_MODEL, 2, OnnxOutputs::default()).unwrap();
        let adapter = crate::classifier::ClassifierAdapter::new(
            Box::new(model),
            crate::features::FeatureSchema::undeclared(),
        );

        let result = adapter.predict_one(&row(&[-3.0, 0.0])).unwrap();
        assert_eq!(result.prediction, crate::contract::RiskLabel::NonDefault);
        assert!((result.probability_default - sigmoid(-3.0)).abs() < 1e-5);
    }

    #[test]
    fn test_exported_model_rejects_wrong_width() {
        let model = OnnxClassifier::from_bytes(SIGMOID_MODEL, 2, OnnxOutputs::default()).unwrap();
        assert!(matches!(
            model.predict(&[row(&[1.0, 2.0, 3.0])]),
            Err(ClassifierError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_read_outputs_casts_label_and_probabilities() {
        let label = tensor1(&[1i64]);
        let proba = tensor2(&[[0.25f32, 0.75]]);

        let (l, p) = read_outputs(&[&label, &proba], OnnxOutputs::default()).unwrap();
        assert_eq!(l, 1);
        assert_eq!(p, vec![0.25, 0.75]);

        let swapped = OnnxOutputs {
            label: 1,
            probabilities: 0,
        };
        let (l, p) = read_outputs(&[&proba, &label], swapped).unwrap();
        assert_eq!(l, 1);
        assert_eq!(p, vec![0.25, 0.75]);
    }

    #[test]
    fn test_read_outputs_missing_output() {
        let label = tensor1(&[0i64]);
        let err = read_outputs(&[&label], OnnxOutputs::default()).unwrap_err();
        assert!(err.to_string().contains("no output 1"));
    }

    #[test]
    fn test_read_outputs_empty_label() {
        let label = tensor1::<i64>(&[]);
        let proba = tensor2(&[[0.5f32, 0.5]]);
        assert!(read_outputs(&[&label, &proba], OnnxOutputs::default()).is_err());
    }

    #[test]
    fn test_default_output_positions() {
        let outputs = OnnxOutputs::default();
        assert_eq!(outputs.label, 0);
        assert_eq!(outputs.probabilities, 1);
    }
}
