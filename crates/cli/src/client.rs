//! API client for communicating with the risk API

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use risk_lib::contract::{
    BatchPredictionResponse, CreditApplication, ErrorResponse, HealthSummary, PredictionResponse,
};
use risk_lib::ReadinessResponse;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

/// Failures talking to the API
#[derive(Debug, Error)]
pub enum ClientError {
    /// The API answered with an error body
    #[error("API error ({status}): {message}")]
    Api {
        status: StatusCode,
        message: String,
        details: Option<Value>,
    },

    #[error("failed to reach {url}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse response from {url}")]
    Decode {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid path: {0}")]
    Path(#[from] url::ParseError),
}

/// API client for the risk API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    pub async fn predict(&self, application: &CreditApplication) -> Result<PredictionResponse, ClientError> {
        self.post("predict", application).await
    }

    /// Items are sent untyped so the server reports malformed ones per item
    pub async fn predict_batch(&self, applications: &[Value]) -> Result<BatchPredictionResponse, ClientError> {
        self.post("predict/batch", &json!({ "applications": applications }))
            .await
    }

    pub async fn summary(&self) -> Result<HealthSummary, ClientError> {
        let url = self.base_url.join("")?;
        let response = self.send(self.client.get(url.clone()), &url).await?;
        decode(ensure_success(response).await?, &url).await
    }

    /// Readiness answers 503 with a body when not ready; both are results here
    pub async fn readiness(&self) -> Result<ReadinessResponse, ClientError> {
        let url = self.base_url.join("readyz")?;
        let response = self.send(self.client.get(url.clone()), &url).await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return decode(response, &url).await;
        }
        decode(ensure_success(response).await?, &url).await
    }

    /// Make a POST request with JSON body
    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.base_url.join(path)?;
        let response = self
            .send(self.client.post(url.clone()).json(body), &url)
            .await?;
        decode(ensure_success(response).await?, &url).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<Response, ClientError> {
        request.send().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response, url: &Url) -> Result<T, ClientError> {
    response.json().await.map_err(|source| ClientError::Decode {
        url: url.clone(),
        source,
    })
}

/// Turn a non-2xx response into [`ClientError::Api`], keeping the server's message
async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (message, details) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => (err.error, err.details),
        Err(_) if body.is_empty() => (status.to_string(), None),
        Err(_) => (body, None),
    };
    Err(ClientError::Api {
        status,
        message,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn application() -> CreditApplication {
        CreditApplication::new(75000.0, 15000.0, 720, 3.5, 25000.0, 36)
    }

    #[tokio::test]
    async fn test_predict_parses_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_body(Matcher::PartialJson(json!({ "credit_score": 720 })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "prediction": {
                        "prediction": 0,
                        "probability_default": 0.15,
                        "probability_non_default": 0.85
                    },
                    "model_version": "1.0.0"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client.predict(&application()).await.unwrap();

        assert!(response.success);
        assert_eq!(response.prediction.probability_default, 0.15);
        assert_eq!(response.model_version, "1.0.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_validation_error_keeps_details() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(400)
            .with_body(
                json!({
                    "success": false,
                    "error": "Validation error",
                    "details": { "errors": [{ "field": "credit_score", "issue": "must be between 300 and 850" }] }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        match client.predict(&application()).await {
            Err(ClientError::Api {
                status,
                message,
                details,
            }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Validation error");
                assert_eq!(details.unwrap()["errors"][0]["field"], "credit_score");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.summary().await.unwrap_err();
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_readiness_accepts_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_body(json!({ "ready": false, "reason": "unhealthy: model" }).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let readiness = client.readiness().await.unwrap();
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("unhealthy: model"));
    }

    #[tokio::test]
    async fn test_batch_wraps_applications() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict/batch")
            .match_body(Matcher::PartialJson(json!({ "applications": [{ "income": 1.0 }] })))
            .with_status(200)
            .with_body(json!({ "success": true, "model_version": "1.0.0", "results": [] }).to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client.predict_batch(&[json!({ "income": 1.0 })]).await.unwrap();
        assert!(response.results.is_empty());
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
