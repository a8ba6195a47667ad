//! Instance accessor capabilities.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use kube::core::{ApiResource, DynamicObject};

use k9rs_core::{split_path, Gvr, ALL_NAMESPACES};
use k9rs_kubehub::{DeleteOptions, Factory};

/// Scope of a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub namespace: String,
    /// Parent object or location, e.g. the pod of a container listing.
    pub path: Option<String>,
    /// Label selector.
    pub labels: String,
}

impl ListOptions {
    pub fn namespace(ns: &str) -> Self {
        Self { namespace: ns.to_string(), ..Default::default() }
    }

    pub fn all() -> Self {
        Self::namespace(ALL_NAMESPACES)
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_labels(mut self, selector: &str) -> Self {
        self.labels = selector.to_string();
        self
    }

    pub(crate) fn require_path(&self, gvr: &Gvr) -> Result<&str> {
        self.path.as_deref().filter(|p| !p.is_empty()).ok_or_else(|| anyhow!("listing {gvr} requires a parent path"))
    }
}

/// Reads instances of one resource type.
#[async_trait::async_trait]
pub trait Accessor: Send + Sync {
    /// Bind the accessor to its factory and type. Called once by dispatch.
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr);

    fn gvr(&self) -> &Gvr;

    /// Name of the concrete accessor.
    fn kind(&self) -> &'static str;

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>>;

    /// Fetch one instance by `namespace/name` path.
    async fn get(&self, opts: &ListOptions, path: &str) -> Result<DynamicObject> {
        let (ns, name) = split_path(path);
        self.list(opts)
            .await?
            .into_iter()
            .find(|o| o.metadata.name.as_deref() == Some(name) && (ns.is_none() || o.metadata.namespace.as_deref() == ns))
            .ok_or_else(|| anyhow!("{} {path} not found", self.gvr()))
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        None
    }

    fn scalable(&self) -> Option<&dyn Scalable> {
        None
    }
}

/// Deletes instances.
#[async_trait::async_trait]
pub trait Nuker: Send + Sync {
    async fn delete(&self, path: &str, opts: &DeleteOptions) -> Result<()>;
}

/// Changes the replica count of instances.
#[async_trait::async_trait]
pub trait Scalable: Send + Sync {
    async fn scale(&self, path: &str, replicas: i32) -> Result<()>;
}

/// Factory and type binding shared by every accessor.
#[derive(Clone, Default)]
pub struct Base {
    factory: Option<Arc<dyn Factory>>,
    gvr: Gvr,
}

impl Base {
    pub fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.factory = Some(factory);
        self.gvr = gvr;
    }

    pub fn gvr(&self) -> &Gvr {
        &self.gvr
    }

    pub fn factory(&self) -> Result<&dyn Factory> {
        self.factory.as_deref().ok_or_else(|| anyhow!("accessor for {} is not initialized", self.gvr))
    }

    /// Build a row object typed with this accessor's identifier.
    pub fn row(&self, kind: &str, ns: Option<&str>, name: &str, data: serde_json::Value) -> DynamicObject {
        row(&self.gvr, kind, ns, name, data)
    }
}

/// Build a row object for a type that has no backing API.
pub fn row(gvr: &Gvr, kind: &str, ns: Option<&str>, name: &str, data: serde_json::Value) -> DynamicObject {
    let ar = ApiResource {
        group: gvr.group().to_string(),
        version: gvr.version().to_string(),
        api_version: gvr.gv(),
        kind: kind.to_string(),
        plural: gvr.resource().to_string(),
    };
    let obj = DynamicObject::new(name, &ar).data(data);
    match ns {
        Some(ns) => obj.within(ns),
        None => obj,
    }
}
