//! File-backed resource store
//!
//! Stands in for a live cluster: namespaces with their services, secrets and
//! service accounts are kept in one JSON document. Each client loads the
//! document once and writes it back atomically after every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::CliConfig;
use crate::deps::{
    BasicAuthSecretSpec, DeployOutcome, DeploySpec, DepsFactory, Endpoint, ResourceClient, ServiceAccountSpec,
    ServiceSummary,
};
use crate::error::{CtlError, ErrorKind};

/// Domain suffix services are routed under
pub const DOMAIN_SUFFIX: &str = "example.com";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceState {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRecord>,
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretRecord>,
    #[serde(default)]
    pub service_accounts: BTreeMap<String, ServiceAccountSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub generation: u64,
    pub spec: DeploySpec,
}

/// Credentials are reduced to what listing needs; the password is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub kind: String,
    pub server: String,
    pub username: String,
    pub has_password: bool,
}

#[derive(Debug, Clone)]
pub struct StoreDepsFactory {
    config: CliConfig,
}

impl StoreDepsFactory {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }
}

impl DepsFactory for StoreDepsFactory {
    fn resource_client(&self) -> Result<Box<dyn ResourceClient>, CtlError> {
        let doc = load(&self.config.state_path)?;
        Ok(Box::new(StoreClient {
            path: self.config.state_path.clone(),
            ingress_url: self.config.ingress_url.clone(),
            doc,
        }))
    }
}

pub fn load(path: &Path) -> Result<StoreDocument, CtlError> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| {
            CtlError::new(ErrorKind::Io, format!("corrupt state file {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
        Err(e) => Err(CtlError::new(ErrorKind::Io, format!("reading {}: {}", path.display(), e))),
    }
}

/// Write through a temp file in the same directory, then rename over the target.
pub fn save(path: &Path, doc: &StoreDocument) -> Result<(), CtlError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| CtlError::new(ErrorKind::Io, format!("encoding state: {}", e)))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(path)
        .map_err(|e| CtlError::new(ErrorKind::Io, format!("writing {}: {}", path.display(), e.error)))?;
    Ok(())
}

struct StoreClient {
    path: PathBuf,
    ingress_url: String,
    doc: StoreDocument,
}

impl StoreClient {
    fn namespace_mut(&mut self, namespace: &str) -> &mut NamespaceState {
        self.doc.namespaces.entry(namespace.to_string()).or_default()
    }

    fn namespace(&self, namespace: &str) -> Option<&NamespaceState> {
        self.doc.namespaces.get(namespace)
    }

    fn commit(&self) -> Result<(), CtlError> {
        save(&self.path, &self.doc)
    }
}

impl ResourceClient for StoreClient {
    fn create_service_account(&mut self, account: &ServiceAccountSpec) -> Result<(), CtlError> {
        let ns = self.namespace_mut(&account.namespace);
        if ns.service_accounts.contains_key(&account.name) {
            return Err(CtlError::backend(format!("service account '{}' already exists", account.name)));
        }
        ns.service_accounts.insert(account.name.clone(), account.clone());
        tracing::info!(namespace = %account.namespace, name = %account.name, "created service account");
        self.commit()
    }

    fn create_basic_auth_secret(&mut self, secret: &BasicAuthSecretSpec) -> Result<(), CtlError> {
        let ns = self.namespace_mut(&secret.namespace);
        if ns.secrets.contains_key(&secret.name) {
            return Err(CtlError::backend(format!("secret '{}' already exists", secret.name)));
        }
        ns.secrets.insert(
            secret.name.clone(),
            SecretRecord {
                kind: "basic-auth".into(),
                server: secret.server.clone(),
                username: secret.username.clone(),
                has_password: !secret.password.is_empty(),
            },
        );
        tracing::info!(namespace = %secret.namespace, name = %secret.name, "created basic auth secret");
        self.commit()
    }

    fn deploy(&mut self, service: &DeploySpec) -> Result<DeployOutcome, CtlError> {
        if let Some(ref account) = service.service_account {
            let known = self
                .namespace(&service.namespace)
                .is_some_and(|ns| ns.service_accounts.contains_key(account));
            if !known {
                return Err(CtlError::not_found("service account", account));
            }
        }

        let ns = self.namespace_mut(&service.namespace);
        let outcome = match ns.services.get_mut(&service.name) {
            Some(record) => {
                record.generation += 1;
                record.spec = service.clone();
                DeployOutcome { generation: record.generation, created: false }
            }
            None => {
                ns.services.insert(service.name.clone(), ServiceRecord { generation: 1, spec: service.clone() });
                DeployOutcome { generation: 1, created: true }
            }
        };
        tracing::info!(
            namespace = %service.namespace,
            name = %service.name,
            generation = outcome.generation,
            "deployed service"
        );
        self.commit()?;
        Ok(outcome)
    }

    fn delete_service(&mut self, namespace: &str, name: &str) -> Result<(), CtlError> {
        let removed = self.namespace_mut(namespace).services.remove(name);
        if removed.is_none() {
            return Err(CtlError::not_found("service", name));
        }
        self.commit()
    }

    fn delete_secret(&mut self, namespace: &str, name: &str) -> Result<(), CtlError> {
        let removed = self.namespace_mut(namespace).secrets.remove(name);
        if removed.is_none() {
            return Err(CtlError::not_found("secret", name));
        }
        self.commit()
    }

    fn delete_service_account(&mut self, namespace: &str, name: &str) -> Result<(), CtlError> {
        let removed = self.namespace_mut(namespace).service_accounts.remove(name);
        if removed.is_none() {
            return Err(CtlError::not_found("service account", name));
        }
        self.commit()
    }

    fn list_services(&self, namespace: &str) -> Result<Vec<ServiceSummary>, CtlError> {
        let Some(ns) = self.namespace(namespace) else {
            return Ok(Vec::new());
        };
        Ok(ns
            .services
            .iter()
            .map(|(name, record)| ServiceSummary {
                name: name.clone(),
                namespace: namespace.to_string(),
                generation: record.generation,
                image: record.spec.image.clone(),
                domain: service_host(namespace, name),
            })
            .collect())
    }

    fn service_endpoint(&self, namespace: &str, name: &str) -> Result<Endpoint, CtlError> {
        let exists = self.namespace(namespace).is_some_and(|ns| ns.services.contains_key(name));
        if !exists {
            return Err(CtlError::not_found("service", name));
        }
        Ok(Endpoint {
            url: format!("{}/", self.ingress_url),
            host: service_host(namespace, name),
        })
    }
}

fn service_host(namespace: &str, name: &str) -> String {
    format!("{}.{}.{}", name, namespace, DOMAIN_SUFFIX)
}
