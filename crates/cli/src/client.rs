//! API client for communicating with the prediction service

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sleep_lib::{
    artifact::SplitSizes, training::EvaluationMetrics, InferenceStats, ModelKind, Prediction,
    ReadinessResponse,
};
use url::Url;

/// API client for the prediction service
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

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }

    /// Classify one observation given as a field -> value JSON object
    pub async fn predict(&self, observation: &serde_json::Value) -> Result<Prediction> {
        self.post("predict", observation).await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.get("health").await
    }

    /// Readiness, including the 503 body of a service that is not ready
    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        let url = self.base_url.join("readyz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        response.json().await.context("Failed to parse response")
    }

    pub async fn model(&self) -> Result<ModelInfo> {
        self.get("model").await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => anyhow::bail!("API error ({}): [{}] {}", status, err.code, err.error),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    response.json().await.context("Failed to parse response")
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub variant: ModelKind,
    pub deployed_variant: ModelKind,
    pub trained_at: String,
    pub classes: Vec<String>,
    pub split: SplitSizes,
    pub validation: Option<EvaluationMetrics>,
    pub test: Option<EvaluationMetrics>,
    pub stats: InferenceStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction_body() -> String {
        serde_json::json!({
            "predicted_class": "insomnia",
            "class_probabilities": {
                "insomnia": 0.7,
                "no_disorder": 0.2,
                "sleep_apnea": 0.1
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_predict_posts_observation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({ "heart_rate": 72 }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(prediction_body())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let prediction = client
            .predict(&serde_json::json!({ "heart_rate": 72 }))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(prediction.predicted_class, "insomnia");
        assert_eq!(prediction.class_probabilities.len(), 3);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Invalid input: missing field `heart_rate`","code":"invalid_input"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.predict(&serde_json::json!({})).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("422"));
        assert!(message.contains("invalid_input"));
        assert!(message.contains("heart_rate"));
    }

    #[tokio::test]
    async fn test_readiness_reads_503_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ready":false,"reason":"Model not loaded"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let readiness = client.readiness().await.unwrap();

        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Model not loaded"));
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert_eq!(client.health().await.unwrap().status, "ok");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
