//! Policy Loader
//!
//! The only I/O boundary: reads the matrix from the permissions endpoint and
//! writes full replacements back to it.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::defaults::DefaultPolicyProvider;
use super::error::{LoadError, PersistError};
use super::policy::PermissionMatrix;
use super::wire::{self, WirePayload};
use crate::engine::config::EndpointConfig;

/// Raw access to the remote policy document
#[async_trait]
pub trait PolicyTransport: Send + Sync {
    /// Fetch the raw response body
    async fn fetch(&self) -> Result<String, LoadError>;

    /// Replace the remote document wholesale
    async fn store(&self, payload: &WirePayload) -> Result<(), PersistError>;
}

/// `GET`/`POST` against `{base_url}{permissions_path}`
pub struct HttpPolicyTransport {
    url: String,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpPolicyTransport {
    pub fn new(config: &EndpointConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            url: config.permissions_url(),
            auth_token: config.auth_token.clone(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl PolicyTransport for HttpPolicyTransport {
    async fn fetch(&self) -> Result<String, LoadError> {
        let response = self
            .authorize(self.http_client.get(&self.url))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LoadError::Status(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }

    async fn store(&self, payload: &WirePayload) -> Result<(), PersistError> {
        let body = serde_json::to_vec(payload)?;
        let response = self
            .authorize(self.http_client.post(&self.url))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PersistError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// In-process policy document, for tests and embedding without a server
#[derive(Clone, Default)]
pub struct MemoryPolicyTransport {
    document: Arc<Mutex<String>>,
    offline: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
    stores: Arc<AtomicUsize>,
}

impl MemoryPolicyTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a raw JSON document
    pub fn with_document(body: &str) -> Self {
        let transport = Self::new();
        transport.set_document(body);
        transport
    }

    pub fn set_document(&self, body: &str) {
        let mut document = self.document.lock().unwrap_or_else(|p| p.into_inner());
        *document = body.to_string();
    }

    pub fn document(&self) -> String {
        self.document.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Simulate the endpoint being unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyTransport for MemoryPolicyTransport {
    async fn fetch(&self) -> Result<String, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(LoadError::Transport("endpoint offline".to_string()));
        }
        Ok(self.document())
    }

    async fn store(&self, payload: &WirePayload) -> Result<(), PersistError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PersistError::Transport("endpoint offline".to_string()));
        }
        let body = serde_json::to_string(payload)?;
        self.set_document(&body);
        self.stores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Result of a load; always carries a usable matrix
#[derive(Debug)]
pub struct LoadOutcome {
    pub matrix: PermissionMatrix,
    /// Set when `matrix` is the default fallback
    pub error: Option<LoadError>,
}

impl LoadOutcome {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Loads and persists the permission matrix through a transport
#[derive(Clone)]
pub struct PolicyLoader {
    transport: Arc<dyn PolicyTransport>,
}

impl PolicyLoader {
    pub fn new(transport: Arc<dyn PolicyTransport>) -> Self {
        Self { transport }
    }

    /// Loader over HTTP using the endpoint configuration
    pub fn from_config(config: &EndpointConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(Arc::new(HttpPolicyTransport::new(config)?)))
    }

    /// Fetch the matrix, returning the defaults on any failure
    pub async fn load(&self) -> LoadOutcome {
        match self.try_load().await {
            Ok(matrix) => {
                tracing::debug!("loaded permission matrix from endpoint");
                LoadOutcome {
                    matrix,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "permission load failed, using default policy");
                LoadOutcome {
                    matrix: DefaultPolicyProvider::defaults(),
                    error: Some(err),
                }
            }
        }
    }

    async fn try_load(&self) -> Result<PermissionMatrix, LoadError> {
        let body = self.transport.fetch().await?;
        wire::decode(&body)
    }

    /// Write the full matrix. Failures are returned, never swallowed.
    pub async fn persist(&self, matrix: &PermissionMatrix) -> Result<(), PersistError> {
        if matrix.is_empty() {
            return Err(PersistError::Validation(
                "refusing to write an empty permission matrix".to_string(),
            ));
        }

        let payload = wire::encode(matrix);
        match self.transport.store(&payload).await {
            Ok(()) => {
                tracing::info!(roles = payload.len(), "persisted permission matrix");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "permission persist failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rbac::policy::{Action, Role};

    fn loader_with(transport: &MemoryPolicyTransport) -> PolicyLoader {
        PolicyLoader::new(Arc::new(transport.clone()))
    }

    #[tokio::test]
    async fn test_persist_then_load_round_trip() {
        let transport = MemoryPolicyTransport::new();
        let loader = loader_with(&transport);

        let mut matrix = DefaultPolicyProvider::defaults();
        matrix.set(Role::Nurse, "patients", Action::Update, true);
        matrix.toggle_all(Role::Receptionist, "appointments", false);

        loader.persist(&matrix).await.unwrap();
        let outcome = loader.load().await;

        assert!(!outcome.is_fallback());
        assert!(outcome.matrix.equivalent(&matrix));
        assert_eq!(transport.store_count(), 1);
    }

    #[tokio::test]
    async fn test_mixed_case_module_round_trip() {
        let transport = MemoryPolicyTransport::new();
        let loader = loader_with(&transport);

        let mut matrix = DefaultPolicyProvider::defaults();
        matrix.set(Role::Nurse, "Patients", Action::Update, true);

        loader.persist(&matrix).await.unwrap();
        assert!(!transport.document().contains("Patients"));

        let outcome = loader.load().await;
        assert!(!outcome.is_fallback());
        assert!(outcome.matrix.equivalent(&matrix));
        assert!(outcome.matrix.allows(Role::Nurse, "patients", Action::Update));
    }

    #[tokio::test]
    async fn test_broken_entry_falls_back() {
        let transport = MemoryPolicyTransport::with_document(
            r#"{"nurse": [
                {"module": "vitals", "action": "read", "allowed": true},
                {"module": "patients", "action": "update", "allowed": "yes"}
            ]}"#,
        );
        let outcome = loader_with(&transport).load().await;
        assert!(matches!(outcome.error, Some(LoadError::Malformed(_))));
        assert_eq!(outcome.matrix, DefaultPolicyProvider::defaults());
    }

    #[tokio::test]
    async fn test_load_failure_returns_defaults() {
        let transport = MemoryPolicyTransport::with_document("{\"nurse\": []}");
        let loader = loader_with(&transport);

        let outcome = loader.load().await;
        assert!(matches!(outcome.error, Some(LoadError::Empty)));
        assert_eq!(outcome.matrix, DefaultPolicyProvider::defaults());

        transport.set_offline(true);
        let outcome = loader.load().await;
        assert!(matches!(outcome.error, Some(LoadError::Transport(_))));
        assert_eq!(outcome.matrix, DefaultPolicyProvider::defaults());
    }

    #[tokio::test]
    async fn test_persist_failure_is_surfaced() {
        let transport = MemoryPolicyTransport::new();
        transport.set_offline(true);
        let loader = loader_with(&transport);

        let result = loader.persist(&DefaultPolicyProvider::defaults()).await;
        assert!(matches!(result, Err(PersistError::Transport(_))));
        assert_eq!(transport.store_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_matrix_never_written() {
        let transport = MemoryPolicyTransport::new();
        let loader = loader_with(&transport);

        let result = loader.persist(&PermissionMatrix::new()).await;
        assert!(matches!(result, Err(PersistError::Validation(_))));
        assert_eq!(transport.store_count(), 0);
        assert!(transport.document().is_empty());
    }
}
