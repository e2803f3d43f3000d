//! Backend capabilities injected into commands
//!
//! Commands never talk to a cluster directly. They ask their [`DepsFactory`]
//! for a [`ResourceClient`], which the binary backs with the file store
//! ([`crate::store`]) and tests back with [`NoopDepsFactory`].

use serde::{Deserialize, Serialize};

use crate::error::CtlError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountSpec {
    pub namespace: String,
    pub name: String,
    pub secrets: Vec<String>,
    pub image_pull_secrets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicAuthSecretSpec {
    pub namespace: String,
    pub name: String,
    pub server: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySpec {
    pub namespace: String,
    pub name: String,
    pub image: Option<String>,
    pub git_url: Option<String>,
    pub git_revision: Option<String>,
    pub service_account: Option<String>,
    /// `(key, value)` pairs in command-line order
    pub env: Vec<(String, String)>,
}

/// What a deploy produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub generation: u64,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub namespace: String,
    pub generation: u64,
    pub image: Option<String>,
    pub domain: String,
}

/// Where a service answers requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    /// Virtual host the ingress routes on
    pub host: String,
}

/// Resource operations against the orchestration API.
///
/// Deleting an absent resource returns an `ErrorKind::NotFound` error.
pub trait ResourceClient {
    fn create_service_account(&mut self, account: &ServiceAccountSpec) -> Result<(), CtlError>;
    fn create_basic_auth_secret(&mut self, secret: &BasicAuthSecretSpec) -> Result<(), CtlError>;
    fn deploy(&mut self, service: &DeploySpec) -> Result<DeployOutcome, CtlError>;
    fn delete_service(&mut self, namespace: &str, name: &str) -> Result<(), CtlError>;
    fn delete_secret(&mut self, namespace: &str, name: &str) -> Result<(), CtlError>;
    fn delete_service_account(&mut self, namespace: &str, name: &str) -> Result<(), CtlError>;
    fn list_services(&self, namespace: &str) -> Result<Vec<ServiceSummary>, CtlError>;
    fn service_endpoint(&self, namespace: &str, name: &str) -> Result<Endpoint, CtlError>;
}

/// Provides resource clients to commands
pub trait DepsFactory {
    fn resource_client(&self) -> Result<Box<dyn ResourceClient>, CtlError>;
}

/// Test-mode factory: every mutation succeeds and nothing is ever stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDepsFactory;

impl NoopDepsFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DepsFactory for NoopDepsFactory {
    fn resource_client(&self) -> Result<Box<dyn ResourceClient>, CtlError> {
        Ok(Box::new(NoopClient))
    }
}

struct NoopClient;

impl ResourceClient for NoopClient {
    fn create_service_account(&mut self, _account: &ServiceAccountSpec) -> Result<(), CtlError> {
        Ok(())
    }

    fn create_basic_auth_secret(&mut self, _secret: &BasicAuthSecretSpec) -> Result<(), CtlError> {
        Ok(())
    }

    fn deploy(&mut self, _service: &DeploySpec) -> Result<DeployOutcome, CtlError> {
        Ok(DeployOutcome { generation: 1, created: true })
    }

    fn delete_service(&mut self, _namespace: &str, _name: &str) -> Result<(), CtlError> {
        Ok(())
    }

    fn delete_secret(&mut self, _namespace: &str, _name: &str) -> Result<(), CtlError> {
        Ok(())
    }

    fn delete_service_account(&mut self, _namespace: &str, _name: &str) -> Result<(), CtlError> {
        Ok(())
    }

    fn list_services(&self, _namespace: &str) -> Result<Vec<ServiceSummary>, CtlError> {
        Ok(Vec::new())
    }

    fn service_endpoint(&self, _namespace: &str, name: &str) -> Result<Endpoint, CtlError> {
        Err(CtlError::not_found("service", name))
    }
}
