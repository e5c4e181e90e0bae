//! Model artifact loading
//!
//! An artifact is a JSON manifest describing a fitted binary classifier and,
//! optionally, the ordered feature names it was trained on. Loading is
//! all-or-nothing: any failure leaves the model slot absent.

use crate::classifier::{
    BinaryClassifier, ClassifierAdapter, DecisionTree, LogisticRegressionClassifier,
    OnnxClassifier, OnnxOutputs, RandomForestClassifier,
};
use crate::error::{AdapterError, LoadError, ModelContractViolation};
use crate::features::FeatureSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Class order every artifact must be trained with
pub const EXPECTED_CLASS_LABELS: [i64; 2] = [0, 1];

fn default_model_version() -> String {
    "1.0.0".to_string()
}

/// Top-level artifact manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default = "default_model_version")]
    pub model_version: String,
    /// Ordered feature names the classifier was fitted on
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Class order of the probability columns; must be `[0, 1]` when present
    #[serde(default)]
    pub class_labels: Option<Vec<i64>>,
    pub classifier: ClassifierSpec,
}

/// Classifier description, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    RandomForest {
        #[serde(default)]
        n_features: Option<usize>,
        trees: Vec<DecisionTree>,
    },
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    Onnx {
        /// Model file, relative to the manifest directory
        path: PathBuf,
        /// Hex-encoded SHA-256 of the model file
        #[serde(default)]
        sha256: Option<String>,
        #[serde(default)]
        n_features: Option<usize>,
        #[serde(default)]
        label_output: Option<usize>,
        #[serde(default)]
        probability_output: Option<usize>,
    },
}

impl ClassifierSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierSpec::RandomForest { .. } => "random_forest",
            ClassifierSpec::LogisticRegression { .. } => "logistic_regression",
            ClassifierSpec::Onnx { .. } => "onnx",
        }
    }
}

/// A fitted classifier ready to serve, read-only after load
pub struct LoadedModel {
    adapter: ClassifierAdapter,
    model_version: String,
    kind: &'static str,
    source: PathBuf,
    loaded_at: i64,
}

impl LoadedModel {
    /// Assemble a model from parts, verifying the classifier contract
    pub fn new(
        classifier: Box<dyn BinaryClassifier>,
        schema: FeatureSchema,
        model_version: impl Into<String>,
        kind: &'static str,
        source: impl Into<PathBuf>,
    ) -> Result<Self, LoadError> {
        let adapter = ClassifierAdapter::new(classifier, schema);
        adapter.verify().map_err(|e| match e {
            AdapterError::Contract(v) => LoadError::Contract(v),
            AdapterError::Classifier(c) => LoadError::Contract(ModelContractViolation::new(
                format!("classifier rejected an all-default row: {}", c),
            )),
        })?;

        Ok(Self {
            adapter,
            model_version: model_version.into(),
            kind,
            source: source.into(),
            loaded_at: chrono::Utc::now().timestamp(),
        })
    }

    pub fn adapter(&self) -> &ClassifierAdapter {
        &self.adapter
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.adapter.schema()
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn loaded_at(&self) -> i64 {
        self.loaded_at
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_version", &self.model_version)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("features", &self.schema().names())
            .finish()
    }
}

/// Load an artifact manifest and build its classifier
pub fn load_model(path: &Path) -> Result<LoadedModel, LoadError> {
    let bytes = read_file(path)?;
    let manifest: ModelManifest = serde_json::from_slice(&bytes)?;
    debug!(
        path = %path.display(),
        kind = manifest.classifier.kind(),
        version = %manifest.model_version,
        "Parsed model manifest"
    );
    build_model(manifest, path)
}

/// Build a model from an already parsed manifest. Relative ONNX paths are
/// resolved against the directory of `manifest_path`.
pub fn build_model(manifest: ModelManifest, manifest_path: &Path) -> Result<LoadedModel, LoadError> {
    if let Some(labels) = &manifest.class_labels {
        if labels[..] != EXPECTED_CLASS_LABELS[..] {
            return Err(ModelContractViolation::new(format!(
                "class_labels must be {:?} (column 1 is the default class), got {:?}",
                EXPECTED_CLASS_LABELS, labels
            ))
            .into());
        }
    }

    let schema = match manifest.feature_names {
        Some(names) => FeatureSchema::declared(names)?,
        None => FeatureSchema::undeclared(),
    };
    let declared_width = schema.is_declared().then(|| schema.len());

    let kind = manifest.classifier.kind();
    let classifier: Box<dyn BinaryClassifier> = match manifest.classifier {
        ClassifierSpec::RandomForest { n_features, trees } => {
            let width = reconcile_width(n_features, declared_width)?;
            let forest = RandomForestClassifier::new(&trees, width)?;
            if let Some(expected) = declared_width {
                ensure_width(forest.n_features(), expected)?;
            }
            Box::new(forest)
        }
        ClassifierSpec::LogisticRegression {
            coefficients,
            intercept,
        } => {
            let model = LogisticRegressionClassifier::new(coefficients, intercept)?;
            if let Some(expected) = declared_width {
                ensure_width(model.n_features(), expected)?;
            }
            Box::new(model)
        }
        ClassifierSpec::Onnx {
            path,
            sha256,
            n_features,
            label_output,
            probability_output,
        } => {
            let model_path = resolve_relative(manifest_path, &path);
            let bytes = read_file(&model_path)?;
            if let Some(expected) = sha256 {
                verify_checksum(&model_path, &bytes, &expected)?;
            }
            let width = reconcile_width(n_features, declared_width)?.ok_or_else(|| {
                ModelContractViolation::new(
                    "onnx models need feature_names or n_features to fix the input width",
                )
            })?;
            let defaults = OnnxOutputs::default();
            let outputs = OnnxOutputs {
                label: label_output.unwrap_or(defaults.label),
                probabilities: probability_output.unwrap_or(defaults.probabilities),
            };
            let model = OnnxClassifier::from_bytes(&bytes, width, outputs).map_err(LoadError::Backend)?;
            Box::new(model)
        }
    };

    let model = LoadedModel::new(classifier, schema, manifest.model_version, kind, manifest_path)?;
    info!(
        path = %manifest_path.display(),
        kind = kind,
        version = %model.model_version(),
        features = model.schema().len(),
        "Model artifact loaded"
    );
    Ok(model)
}

fn reconcile_width(
    n_features: Option<usize>,
    declared: Option<usize>,
) -> Result<Option<usize>, ModelContractViolation> {
    match (n_features, declared) {
        (Some(n), Some(d)) if n != d => Err(ModelContractViolation::new(format!(
            "n_features is {} but {} feature names are declared",
            n, d
        ))),
        (Some(n), _) => Ok(Some(n)),
        (None, d) => Ok(d),
    }
}

fn ensure_width(actual: usize, declared: usize) -> Result<(), ModelContractViolation> {
    if actual == declared {
        Ok(())
    } else {
        Err(ModelContractViolation::new(format!(
            "classifier expects {} features but {} feature names are declared",
            actual, declared
        )))
    }
}

fn resolve_relative(manifest_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    manifest_path
        .parent()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Hex-encoded SHA-256 of `data`
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn verify_checksum(path: &Path, data: &[u8], expected: &str) -> Result<(), LoadError> {
    let actual = compute_checksum(data);
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(LoadError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    info!(path = %path.display(), checksum = %actual, "Model checksum validated");
    Ok(())
}

/// Process-wide model state: either a verified model or an explicit absence
#[derive(Debug, Clone)]
pub enum ModelSlot {
    Loaded(Arc<LoadedModel>),
    Absent { reason: String },
}

impl ModelSlot {
    /// Load the artifact at `path`, recording the failure instead of returning it
    pub fn load(path: &Path) -> Self {
        match load_model(path) {
            Ok(model) => ModelSlot::Loaded(Arc::new(model)),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load model");
                ModelSlot::Absent {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn loaded(model: LoadedModel) -> Self {
        ModelSlot::Loaded(Arc::new(model))
    }

    pub fn absent(reason: impl Into<String>) -> Self {
        ModelSlot::Absent {
            reason: reason.into(),
        }
    }

    pub fn get(&self) -> Option<&Arc<LoadedModel>> {
        match self {
            ModelSlot::Loaded(model) => Some(model),
            ModelSlot::Absent { .. } => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelSlot::Loaded(_))
    }

    pub fn model_version(&self) -> Option<&str> {
        self.get().map(|m| m.model_version())
    }

    pub fn absence_reason(&self) -> Option<&str> {
        match self {
            ModelSlot::Loaded(_) => None,
            ModelSlot::Absent { reason } => Some(reason),
        }
    }
}
