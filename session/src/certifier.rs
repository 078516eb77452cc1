use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SessionError;

/// Outbound trigger for the external certification process. One call per
/// contract per session; results are observed only through the
/// reconciliation poll, never through this call's response.
#[async_trait]
pub trait Certifier: Send + Sync {
    async fn trigger(&self, contract_id: Uuid) -> Result<(), SessionError>;
}

/// HTTP certifier: POST `{ "contract_id": ... }` to the certification
/// endpoint. The server processes clauses sequentially on its side.
pub struct HttpCertifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCertifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint from `REDLINE_CERTIFIER_URL`.
    pub fn from_env() -> Option<Self> {
        std::env::var("REDLINE_CERTIFIER_URL").ok().map(Self::new)
    }
}

#[async_trait]
impl Certifier for HttpCertifier {
    async fn trigger(&self, contract_id: Uuid) -> Result<(), SessionError> {
        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "contract_id": contract_id }))
            .send()
            .await
            .map_err(|e| SessionError::Certifier(e.to_string()))?;
        // Fire-and-forget: status code and body are not awaited on.
        Ok(())
    }
}
