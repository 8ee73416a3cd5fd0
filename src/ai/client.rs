//! HTTP client for an external AI content generator.
//!
//! Configuration comes from [`Config`](crate::config::Config):
//! - `DOCFLOW_AI_URL` - generation endpoint
//! - `DOCFLOW_AI_API_KEY` - bearer token (optional)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{GenerationRequest, GenerationResponse};
use crate::config::Config;
use crate::error::AiError;
use crate::gateway::AiContentSource;

#[derive(Debug, Clone)]
pub struct HttpContentSource {
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpContentSource {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            client: Client::new(),
        }
    }

    /// Build a client from configuration.
    pub fn from_config(config: &Config) -> Result<Self, AiError> {
        let url = config.ai_url.as_ref().ok_or(AiError::NotConfigured)?;
        Ok(Self::new(url.clone(), config.ai_api_key.clone()))
    }
}

#[async_trait]
impl AiContentSource for HttpContentSource {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, AiError> {
        tracing::debug!(
            "Requesting AI generation for {} ({} chars)",
            request.document_type,
            request.prompt.len()
        );

        let mut req = self.client.post(&self.url).json(&request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AiError::Upstream(format!("{status}: API key required or invalid")))
            }
            _ => Err(AiError::Upstream(format!("{status}: {body}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiAction;
    use crate::models::{DocumentContent, DocumentType};
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_generator(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/generate")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Add a design line".to_string(),
            document_type: DocumentType::Quotation,
            current_context: DocumentContent::default(),
            external_context: None,
        }
    }

    #[test]
    fn from_config_requires_an_endpoint() {
        let config = Config::default();
        assert!(matches!(
            HttpContentSource::from_config(&config),
            Err(AiError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn posts_the_request_with_bearer_auth() {
        let app = Router::new().route(
            "/generate",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer secret");
                assert_eq!(body["document_type"], "quotation");
                Json(json!({
                    "message": "Added it",
                    "action": "update_document",
                    "data": { "items": [{ "description": "Design", "quantity": 1, "unitPrice": 500 }] }
                }))
            }),
        );
        let url = spawn_generator(app).await;

        let source = HttpContentSource::new(url, Some("secret".to_string()));
        let response = source.generate(request()).await.unwrap();

        assert_eq!(response.action, AiAction::UpdateDocument);
        assert_eq!(response.message, "Added it");
        assert!(response.data.is_some());
    }

    #[tokio::test]
    async fn maps_error_statuses_to_upstream_errors() {
        let app = Router::new().route(
            "/generate",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "nope") }),
        );
        let url = spawn_generator(app).await;

        let source = HttpContentSource::new(url, None);
        let result = source.generate(request()).await;

        assert!(matches!(result, Err(AiError::Upstream(msg)) if msg.contains("API key")));
    }
}
