//! k9rs kubehub: the cluster-facing collaborator of the resource registry.
//!
//! The registry only talks to a cluster through the [`Factory`] and
//! [`Connection`] traits defined here. [`KubeFactory`] implements them on top
//! of kube-rs; tests substitute in-memory fakes.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};

use k9rs_core::{Config, Gvr};

mod client;
mod discovery;
mod factory;

pub use client::KubeConnection;
pub use discovery::{CachedDiscovery, DiscoveryCache, DiscoverySnapshot};
pub use factory::KubeFactory;

/// Outcome of a preferred-resources query.
///
/// `error` is set when part of the discovery failed; `lists` then holds
/// whatever group-versions could still be fetched.
#[derive(Debug, Default)]
pub struct Preferred {
    pub lists: Vec<APIResourceList>,
    pub error: Option<anyhow::Error>,
}

/// Cached access to the cluster discovery endpoints.
#[async_trait::async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Preferred resources per served group-version.
    async fn server_preferred_resources(&self) -> Preferred;
}

/// A kubeconfig context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub name: String,
    pub namespace: Option<String>,
    pub current: bool,
}

/// Cluster connection state.
pub trait Connection: Send + Sync {
    /// Whether the API server answered the last connectivity probe.
    fn connection_ok(&self) -> bool;

    /// Discovery handle backed by the local discovery cache.
    fn cached_discovery(&self) -> Result<Arc<dyn DiscoveryClient>>;

    /// Contexts known to the active kubeconfig.
    fn contexts(&self) -> Result<Vec<ContextInfo>>;
}

/// Options for deleting an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub grace_period_seconds: Option<u32>,
    /// Orphan dependents instead of deleting them in the background.
    pub orphan: bool,
}

/// An active port-forward session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardSession {
    /// `namespace/pod` the session targets.
    pub path: String,
    pub container: String,
    pub local_port: u16,
    pub remote_port: u16,
}

impl ForwardSession {
    /// Session key, `namespace/pod|container|local:remote`.
    pub fn key(&self) -> String {
        format!("{}|{}|{}:{}", self.path, self.container, self.local_port, self.remote_port)
    }
}

/// Vulnerability summary for one container image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub image: String,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Entry point to the cluster for the registry and accessors.
#[async_trait::async_trait]
pub trait Factory: Send + Sync {
    /// Current connection, if a client could be built at all.
    fn client(&self) -> Option<Arc<dyn Connection>>;

    fn config(&self) -> &Config;

    /// List objects of a type. `ns` may be a namespace, [`k9rs_core::ALL_NAMESPACES`]
    /// or [`k9rs_core::CLUSTER_SCOPE`]; `selector` is a label selector.
    async fn list(&self, gvr: &Gvr, ns: &str, selector: &str) -> Result<Vec<DynamicObject>>;

    /// Fetch one object by `namespace/name` path.
    async fn get(&self, gvr: &Gvr, path: &str) -> Result<DynamicObject>;

    async fn delete(&self, gvr: &Gvr, path: &str, opts: &DeleteOptions) -> Result<()>;

    /// Set the replica count through the `scale` subresource.
    async fn scale(&self, gvr: &Gvr, path: &str, replicas: i32) -> Result<()>;

    fn port_forwards(&self) -> Vec<ForwardSession> {
        Vec::new()
    }

    /// Stop the session with the given key; false when unknown.
    fn stop_port_forward(&self, _key: &str) -> bool {
        false
    }

    fn image_scans(&self) -> Vec<ScanReport> {
        Vec::new()
    }
}

/// Returns the connection only when it reports a reachable cluster.
pub fn connected(f: &dyn Factory) -> Option<Arc<dyn Connection>> {
    f.client().filter(|c| c.connection_ok())
}
