//! Prediction service
//!
//! Validates an application, aligns it to the loaded model's schema and asks
//! the classifier adapter for a result. The synchronous entry points are pure
//! with respect to the model; the async ones move inference onto the blocking
//! pool behind a concurrency limit and a deadline.

use crate::artifact::{LoadedModel, ModelSlot};
use crate::contract::{CreditApplication, PredictionResult, ValidationErrors};
use crate::error::ServiceError;
use crate::features::align_with_report;
use crate::observability::{RiskMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

/// Deadline for a single async prediction or batch, including queueing
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest batch accepted in one call
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Outcome of every item in a batch, in request order
pub type BatchOutcome = Vec<Result<PredictionResult, ServiceError>>;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub inference_timeout: Duration,
    pub max_batch_size: usize,
    /// Inferences allowed on the blocking pool at once
    pub max_concurrent_inferences: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_concurrent_inferences: available_cores(),
        }
    }
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Serves predictions from a model fixed at construction
pub struct PredictionService {
    slot: ModelSlot,
    config: ServiceConfig,
    permits: Arc<Semaphore>,
    metrics: RiskMetrics,
    logger: StructuredLogger,
}

impl PredictionService {
    pub fn new(slot: ModelSlot, config: ServiceConfig) -> Self {
        let metrics = RiskMetrics::new();
        match slot.get() {
            Some(model) => metrics.set_model(Some(model.model_version()), model.kind()),
            None => metrics.set_model(None, "none"),
        }

        let permits = Arc::new(Semaphore::new(config.max_concurrent_inferences.max(1)));
        Self {
            slot,
            config,
            permits,
            metrics,
            logger: StructuredLogger::new("prediction-service"),
        }
    }

    pub fn slot(&self) -> &ModelSlot {
        &self.slot
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_model_loaded(&self) -> bool {
        self.slot.is_loaded()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.slot.model_version()
    }

    /// Predict a single application.
    ///
    /// Checks run in a fixed order: model presence, field bounds, then
    /// alignment and inference.
    pub fn predict(&self, application: &CreditApplication) -> Result<PredictionResult, ServiceError> {
        let start = Instant::now();
        let outcome = self.predict_inner(application);
        self.record(&outcome, start);
        outcome
    }

    fn predict_inner(&self, application: &CreditApplication) -> Result<PredictionResult, ServiceError> {
        let model = self.slot.get().ok_or(ServiceError::ModelUnavailable)?;
        application.validate().map_err(ServiceError::InvalidInput)?;
        infer(model, application)
    }

    /// Predict every application independently.
    ///
    /// The outer error covers conditions that reject the whole call; item
    /// failures are reported in place.
    pub fn predict_batch(&self, applications: &[CreditApplication]) -> Result<BatchOutcome, ServiceError> {
        if let Err(e) = self.admit_batch(applications.len()) {
            self.metrics.inc_prediction_error(e.kind());
            return Err(e);
        }
        self.metrics.observe_batch_size(applications.len());

        Ok(applications.iter().map(|a| self.predict(a)).collect())
    }

    /// Reject a batch of `size` items before any item is looked at
    pub fn admit_batch(&self, size: usize) -> Result<(), ServiceError> {
        if !self.slot.is_loaded() {
            return Err(ServiceError::ModelUnavailable);
        }
        if size > self.config.max_batch_size {
            return Err(ServiceError::InvalidInput(ValidationErrors::single(
                "applications",
                format!(
                    "batch of {} exceeds the limit of {}",
                    size, self.config.max_batch_size
                ),
            )));
        }
        Ok(())
    }

    /// Run [`predict`](Self::predict) on the blocking pool
    pub async fn predict_async(
        self: &Arc<Self>,
        application: CreditApplication,
    ) -> Result<PredictionResult, ServiceError> {
        let service = Arc::clone(self);
        self.run_blocking(move || service.predict(&application)).await?
    }

    /// Run [`predict_batch`](Self::predict_batch) on the blocking pool under one deadline
    pub async fn predict_batch_async(
        self: &Arc<Self>,
        applications: Vec<CreditApplication>,
    ) -> Result<BatchOutcome, ServiceError> {
        let service = Arc::clone(self);
        self.run_blocking(move || service.predict_batch(&applications))
            .await?
    }

    /// Run `job` on the blocking pool once a permit is free.
    ///
    /// The permit moves into the job, so a job abandoned at the deadline
    /// still counts against the limit until it finishes.
    async fn run_blocking<T, F>(&self, job: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let deadline = self.config.inference_timeout;

        let run = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|e| ServiceError::WorkerFailed(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| ServiceError::WorkerFailed(e.to_string()))
        };

        let outcome = match tokio::time::timeout(deadline, run).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceError::Timeout(deadline)),
        };

        if let Err(e) = &outcome {
            self.metrics.inc_prediction_error(e.kind());
            self.logger.log_inference_failure(e.kind(), e);
        }
        outcome
    }

    fn record(&self, outcome: &Result<PredictionResult, ServiceError>, start: Instant) {
        let elapsed = start.elapsed();
        match outcome {
            Ok(result) => {
                self.metrics.observe_prediction_latency(elapsed.as_secs_f64());
                self.metrics.inc_prediction(result.prediction.as_str());
                self.logger.log_prediction(
                    result.prediction.as_str(),
                    result.probability_default,
                    self.slot.model_version().unwrap_or_default(),
                    elapsed.as_micros() as u64,
                );
            }
            Err(e) => {
                self.metrics.inc_prediction_error(e.kind());
                match e {
                    ServiceError::InvalidInput(errors) => {
                        debug!(fields = ?errors.fields(), "Rejected invalid application")
                    }
                    ServiceError::ModelUnavailable => debug!("Rejected prediction, no model"),
                    _ => self.logger.log_inference_failure(e.kind(), e),
                }
            }
        }
    }
}

fn infer(model: &LoadedModel, application: &CreditApplication) -> Result<PredictionResult, ServiceError> {
    let record = if model.schema().is_declared() {
        application.to_record()
    } else {
        application.contract_record()
    };
    let (row, report) = align_with_report(&record, model.schema());
    if !report.is_exact() && !report.passthrough {
        debug!(
            filled = ?report.filled,
            dropped = ?report.dropped,
            "Application aligned with defaults"
        );
    }

    model
        .adapter()
        .predict_one(&row)
        .map_err(ServiceError::InferenceFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::StubClassifier;
    use crate::classifier::{BinaryClassifier, LogisticRegressionClassifier};
    use crate::contract::RiskLabel;
    use crate::error::AdapterError;
    use crate::features::FeatureSchema;

    fn application(income: f64) -> CreditApplication {
        CreditApplication::new(income, 15000.0, 720, 5.0, 25000.0, 36)
    }

    fn service_with(classifier: impl BinaryClassifier + 'static, schema: FeatureSchema) -> PredictionService {
        service_with_config(classifier, schema, ServiceConfig::default())
    }

    fn service_with_config(
        classifier: impl BinaryClassifier + 'static,
        schema: FeatureSchema,
        config: ServiceConfig,
    ) -> PredictionService {
        let model = LoadedModel::new(Box::new(classifier), schema, "1.0.0", "stub", "memory").unwrap();
        PredictionService::new(ModelSlot::loaded(model), config)
    }

    fn six_features() -> FeatureSchema {
        FeatureSchema::declared(
            crate::contract::APPLICATION_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_predict_maps_columns_to_probabilities() {
        let service = service_with(StubClassifier::fixed(0, vec![0.85, 0.15]), six_features());

        let application = CreditApplication::new(75000.0, 15000.0, 720, 3.5, 25000.0, 36);
        let result = service.predict(&application).unwrap();
        assert_eq!(result.prediction, RiskLabel::NonDefault);
        assert_eq!(result.probability_default, 0.15);
        assert_eq!(result.probability_non_default, 0.85);
        assert_eq!(service.model_version(), Some("1.0.0"));
    }

    #[test]
    fn test_absent_model_checked_before_validation() {
        let service = PredictionService::new(ModelSlot::absent("missing"), ServiceConfig::default());
        assert!(!service.is_model_loaded());

        let mut invalid = application(75000.0);
        invalid.credit_score = 10;
        assert!(matches!(
            service.predict(&invalid),
            Err(ServiceError::ModelUnavailable)
        ));
    }

    #[test]
    fn test_credit_score_lower_bound() {
        let service = service_with(StubClassifier::fixed(0, vec![0.9, 0.1]), six_features());

        let mut app = application(75000.0);
        app.credit_score = 299;
        match service.predict(&app) {
            Err(ServiceError::InvalidInput(errors)) => assert!(errors.contains_field("credit_score")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        app.credit_score = 300;
        assert!(service.predict(&app).is_ok());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let service = service_with(StubClassifier::echo(), FeatureSchema::undeclared());

        for income in [1.0, 123.0, 499.0, 500.0, 501.0, 999.0, 5000.0] {
            let result = service.predict(&application(income)).unwrap();
            let total = result.probability_default + result.probability_non_default;
            assert!((total - 1.0).abs() < 1e-9);
            assert_eq!(
                result.prediction == RiskLabel::Default,
                result.probability_default > 0.5
            );
        }
    }

    #[test]
    fn test_declared_schema_reorders_features() {
        let schema = FeatureSchema::declared(vec![
            "credit_score".to_string(),
            "income".to_string(),
            "debt_to_income".to_string(),
        ])
        .unwrap();
        let service = service_with(StubClassifier::echo(), schema);

        // credit_score leads the aligned row, so the echo stub reads 720 / 1000
        let result = service.predict(&application(75000.0)).unwrap();
        assert_eq!(result.prediction, RiskLabel::Default);
        assert!((result.probability_default - 0.72).abs() < 1e-12);
    }

    #[test]
    fn test_undeclared_schema_ignores_extra_fields() {
        let logistic = LogisticRegressionClassifier::new(vec![0.0, 0.0, -0.01, 0.0, 0.0, 0.0], 6.5).unwrap();
        let service = service_with(logistic, FeatureSchema::undeclared());

        let plain = application(75000.0);
        let with_extra = plain.clone().with_extra("applicant_age", 40.0);

        let result = service.predict(&with_extra).unwrap();
        assert_eq!(result, service.predict(&plain).unwrap());
        assert_eq!(result.prediction, RiskLabel::NonDefault);
    }

    #[test]
    fn test_declared_schema_may_name_extra_fields() {
        let schema = FeatureSchema::declared(vec!["applicant_age".to_string()]).unwrap();
        let service = service_with(StubClassifier::echo(), schema);

        let result = service
            .predict(&application(75000.0).with_extra("applicant_age", 800.0))
            .unwrap();
        assert!((result.probability_default - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_classifier_failure_is_wrapped() {
        let service = service_with(StubClassifier::failing(), FeatureSchema::undeclared());

        let err = service.predict(&application(75000.0)).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InferenceFailed(AdapterError::Classifier(_))
        ));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_bad_probability_row_is_contract_violation() {
        let service = service_with(StubClassifier::fixed(1, vec![0.7, 0.7]), FeatureSchema::undeclared());

        let err = service.predict(&application(75000.0)).unwrap_err();
        assert_eq!(err.kind(), "model_contract_violation");
    }

    #[test]
    fn test_batch_isolates_invalid_items() {
        let service = service_with(StubClassifier::echo(), FeatureSchema::undeclared());

        let mut bad = application(300.0);
        bad.income = -1.0;
        let outcomes = service
            .predict_batch(&[application(200.0), bad, application(900.0)])
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_ref().unwrap().prediction, RiskLabel::NonDefault);
        assert!(matches!(outcomes[1], Err(ServiceError::InvalidInput(_))));
        assert_eq!(outcomes[2].as_ref().unwrap().prediction, RiskLabel::Default);
    }

    #[test]
    fn test_batch_matches_single_predictions_in_any_order() {
        let service = service_with(StubClassifier::echo(), FeatureSchema::undeclared());
        let incomes = [100.0, 700.0, 450.0, 980.0];

        let forward: Vec<CreditApplication> = incomes.iter().map(|i| application(*i)).collect();
        let reversed: Vec<CreditApplication> = forward.iter().rev().cloned().collect();

        let a = service.predict_batch(&forward).unwrap();
        let b = service.predict_batch(&reversed).unwrap();

        for (i, app) in forward.iter().enumerate() {
            let single = service.predict(app).unwrap();
            assert_eq!(a[i].as_ref().unwrap(), &single);
            assert_eq!(b[incomes.len() - 1 - i].as_ref().unwrap(), &single);
        }
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let config = ServiceConfig {
            max_batch_size: 2,
            ..ServiceConfig::default()
        };
        let service = service_with_config(StubClassifier::echo(), FeatureSchema::undeclared(), config);

        let apps = vec![application(1.0); 3];
        match service.predict_batch(&apps) {
            Err(ServiceError::InvalidInput(errors)) => assert!(errors.contains_field("applications")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_without_model_fails_whole_call() {
        let service = PredictionService::new(ModelSlot::absent("missing"), ServiceConfig::default());
        assert!(matches!(
            service.predict_batch(&[application(1.0)]),
            Err(ServiceError::ModelUnavailable)
        ));
    }

    #[test]
    fn test_empty_batch() {
        let service = service_with(StubClassifier::echo(), FeatureSchema::undeclared());
        assert!(service.predict_batch(&[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_predict_async_matches_sync() {
        let service = Arc::new(service_with(StubClassifier::echo(), FeatureSchema::undeclared()));

        let expected = service.predict(&application(650.0)).unwrap();
        let actual = service.predict_async(application(650.0)).await.unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_slow_inference_times_out() {
        let config = ServiceConfig {
            inference_timeout: Duration::from_millis(20),
            ..ServiceConfig::default()
        };
        let service = Arc::new(service_with_config(
            StubClassifier::slow(Duration::from_millis(300)),
            FeatureSchema::undeclared(),
            config,
        ));

        let err = service.predict_async(application(1.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(d) if d == Duration::from_millis(20)));
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn test_concurrent_predictions_share_model() {
        let config = ServiceConfig {
            max_concurrent_inferences: 2,
            ..ServiceConfig::default()
        };
        let service = Arc::new(service_with_config(
            StubClassifier::echo(),
            FeatureSchema::undeclared(),
            config,
        ));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.predict_async(application(i as f64 * 60.0 + 1.0)).await })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap().unwrap();
            let expected = ((i as f64 * 60.0 + 1.0) / 1000.0).clamp(0.0, 1.0);
            assert!((result.probability_default - expected).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_batch_async_preserves_order() {
        let service = Arc::new(service_with(StubClassifier::echo(), FeatureSchema::undeclared()));

        let outcomes = service
            .predict_batch_async(vec![application(900.0), application(100.0)])
            .await
            .unwrap();
        assert_eq!(outcomes[0].as_ref().unwrap().prediction, RiskLabel::Default);
        assert_eq!(outcomes[1].as_ref().unwrap().prediction, RiskLabel::NonDefault);
    }
}
