//! Remote API boundary.
//!
//! The sync dispatcher only knows [`RemoteApi`]. [`EndpointRegistry`] is the
//! usual implementation: it routes each operation by entity type to an
//! [`EntityEndpoint`] exposing create/update/delete, so new entity types are a
//! registration away and never need dispatcher changes.

mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Action, EntityType, FailureKind, Operation};

pub use http::{HttpConnectivityProbe, HttpEntityEndpoint};

/// Failure reported by the remote side for one operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: FailureKind,
    pub message: String,
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: classify_status(status),
            message: message.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }
}

/// Timeouts, throttling and server errors are worth retrying; any other
/// client error means the payload itself was rejected.
pub const fn classify_status(status: u16) -> FailureKind {
    match status {
        408 | 425 | 429 | 500..=599 => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

/// Applies one operation to the authoritative server
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn apply(&self, operation: &Operation) -> Result<(), RemoteError>;
}

/// Per-entity create/update/delete surface of the remote service
#[async_trait]
pub trait EntityEndpoint: Send + Sync {
    async fn create(&self, payload: &Value) -> Result<(), RemoteError>;
    async fn update(&self, payload: &Value) -> Result<(), RemoteError>;
    async fn delete(&self, payload: &Value) -> Result<(), RemoteError>;
}

/// Routes operations to the endpoint registered for their entity type
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<EntityType, Arc<dyn EntityEndpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `endpoint` for `entity_type`, replacing any previous one
    #[must_use]
    pub fn with_endpoint(
        mut self,
        entity_type: EntityType,
        endpoint: Arc<dyn EntityEndpoint>,
    ) -> Self {
        self.register(entity_type, endpoint);
        self
    }

    pub fn register(&mut self, entity_type: EntityType, endpoint: Arc<dyn EntityEndpoint>) {
        self.endpoints.insert(entity_type, endpoint);
    }

    pub fn supports(&self, entity_type: &EntityType) -> bool {
        self.endpoints.contains_key(entity_type)
    }

    /// Registered entity types, sorted by name
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self.endpoints.keys().cloned().collect();
        types.sort();
        types
    }
}

#[async_trait]
impl RemoteApi for EndpointRegistry {
    async fn apply(&self, operation: &Operation) -> Result<(), RemoteError> {
        let Some(endpoint) = self.endpoints.get(&operation.entity_type) else {
            return Err(RemoteError::permanent(format!(
                "no remote endpoint registered for entity type '{}'",
                operation.entity_type
            )));
        };

        match operation.action {
            Action::Create => endpoint.create(&operation.payload).await,
            Action::Update => endpoint.update(&operation.payload).await,
            Action::Delete => endpoint.delete(&operation.payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEndpoint {
        calls: Mutex<Vec<(Action, Value)>>,
    }

    #[async_trait]
    impl EntityEndpoint for RecordingEndpoint {
        async fn create(&self, payload: &Value) -> Result<(), RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push((Action::Create, payload.clone()));
            Ok(())
        }

        async fn update(&self, payload: &Value) -> Result<(), RemoteError> {
            self.calls
                .lock()
                .unwrap()
                .push((Action::Update, payload.clone()));
            Ok(())
        }

        async fn delete(&self, _payload: &Value) -> Result<(), RemoteError> {
            Err(RemoteError::from_status(409, "already deleted"))
        }
    }

    #[test]
    fn classify_status_splits_retryable_from_rejected() {
        assert_eq!(classify_status(500), FailureKind::Transient);
        assert_eq!(classify_status(503), FailureKind::Transient);
        assert_eq!(classify_status(408), FailureKind::Transient);
        assert_eq!(classify_status(429), FailureKind::Transient);
        assert_eq!(classify_status(400), FailureKind::Permanent);
        assert_eq!(classify_status(404), FailureKind::Permanent);
        assert_eq!(classify_status(422), FailureKind::Permanent);
    }

    #[tokio::test]
    async fn registry_routes_by_entity_and_action() {
        let inspections = Arc::new(RecordingEndpoint::default());
        let registry =
            EndpointRegistry::new().with_endpoint(EntityType::inspection(), inspections.clone());

        let create = Operation::new(
            EntityType::inspection(),
            Action::Create,
            json!({"title": "A"}),
            0,
        );
        let update = Operation::new(
            EntityType::inspection(),
            Action::Update,
            json!({"id": "1"}),
            0,
        );
        registry.apply(&create).await.unwrap();
        registry.apply(&update).await.unwrap();

        assert_eq!(
            *inspections.calls.lock().unwrap(),
            vec![
                (Action::Create, json!({"title": "A"})),
                (Action::Update, json!({"id": "1"})),
            ]
        );
    }

    #[tokio::test]
    async fn registry_propagates_endpoint_failures() {
        let registry = EndpointRegistry::new()
            .with_endpoint(EntityType::inspection(), Arc::new(RecordingEndpoint::default()));
        let delete = Operation::new(EntityType::inspection(), Action::Delete, json!({}), 0);

        let error = registry.apply(&delete).await.unwrap_err();
        assert!(error.is_permanent());
        assert_eq!(error.message, "already deleted");
    }

    #[tokio::test]
    async fn unknown_entity_type_is_a_permanent_failure() {
        let registry = EndpointRegistry::new()
            .with_endpoint(EntityType::inspection(), Arc::new(RecordingEndpoint::default()));
        let op = Operation::new(EntityType::template(), Action::Create, json!({}), 0);

        let error = registry.apply(&op).await.unwrap_err();
        assert!(error.is_permanent());
        assert!(error.message.contains("template"));
        assert!(registry.supports(&EntityType::inspection()));
        assert_eq!(registry.entity_types(), vec![EntityType::inspection()]);
    }
}
