//! Accessors for built-in types that need more than the dynamic defaults.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use kube::core::DynamicObject;
use serde_json::{json, Value};
use tracing::{debug, warn};

use k9rs_core::{Gvr, CLUSTER_SCOPE};
use k9rs_kubehub::Factory;

use crate::accessor::{Accessor, Base, ListOptions, Nuker};
use crate::generic::Generic;

const REDACTED: &str = "***";

/// Kinds aggregated by the workloads view.
const WORKLOAD_GVRS: &[&str] = &[
    "apps/v1/deployments",
    "apps/v1/statefulsets",
    "apps/v1/daemonsets",
    "apps/v1/replicasets",
    "batch/v1/jobs",
    "batch/v1/cronjobs",
];

#[derive(Clone, Default)]
pub struct Pod {
    generic: Generic,
}

#[async_trait::async_trait]
impl Accessor for Pod {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.generic.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.generic.gvr()
    }

    fn kind(&self) -> &'static str {
        "Pod"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        self.generic.list(opts).await
    }

    async fn get(&self, opts: &ListOptions, path: &str) -> Result<DynamicObject> {
        self.generic.get(opts, path).await
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(&self.generic)
    }
}

/// Nodes are cluster-scoped and never deleted from here.
#[derive(Clone, Default)]
pub struct Node {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for Node {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Node"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        self.base.factory()?.list(self.gvr(), CLUSTER_SCOPE, &opts.labels).await
    }

    async fn get(&self, _opts: &ListOptions, path: &str) -> Result<DynamicObject> {
        self.base.factory()?.get(self.gvr(), path).await
    }
}

#[derive(Clone, Default)]
pub struct Namespace {
    generic: Generic,
}

#[async_trait::async_trait]
impl Accessor for Namespace {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.generic.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.generic.gvr()
    }

    fn kind(&self) -> &'static str {
        "Namespace"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let scoped = ListOptions { namespace: CLUSTER_SCOPE.to_string(), ..opts.clone() };
        self.generic.list(&scoped).await
    }

    async fn get(&self, opts: &ListOptions, path: &str) -> Result<DynamicObject> {
        self.generic.get(opts, path).await
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(&self.generic)
    }
}

/// Secrets are listed with their values masked.
#[derive(Clone, Default)]
pub struct Secret {
    generic: Generic,
}

#[async_trait::async_trait]
impl Accessor for Secret {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.generic.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.generic.gvr()
    }

    fn kind(&self) -> &'static str {
        "Secret"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let mut items = self.generic.list(opts).await?;
        items.iter_mut().for_each(redact);
        Ok(items)
    }

    async fn get(&self, opts: &ListOptions, path: &str) -> Result<DynamicObject> {
        self.generic.get(opts, path).await
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(&self.generic)
    }
}

fn redact(o: &mut DynamicObject) {
    for field in ["data", "stringData"] {
        if let Some(Value::Object(m)) = o.data.get_mut(field) {
            m.values_mut().for_each(|v| *v = Value::String(REDACTED.to_string()));
        }
    }
}

/// Every workload kind of a namespace in one listing.
#[derive(Clone, Default)]
pub struct Workload {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for Workload {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Workload"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let f = self.base.factory()?;
        let gvrs: Vec<Gvr> = WORKLOAD_GVRS.iter().map(|p| Gvr::new(p)).collect();
        let results = join_all(gvrs.iter().map(|g| f.list(g, &opts.namespace, &opts.labels))).await;
        let mut out = Vec::new();
        for (gvr, res) in gvrs.iter().zip(results) {
            match res {
                Ok(items) => out.extend(items),
                Err(e) => warn!(gvr = %gvr, error = %e, "workload listing failed; skipping"),
            }
        }
        debug!(ns = %opts.namespace, count = out.len(), "workloads listed");
        Ok(out)
    }
}

/// Containers of the pod at the parent path.
#[derive(Clone, Default)]
pub struct Container {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for Container {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Container"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let path = opts.require_path(self.gvr())?;
        let pod = self.base.factory()?.get(&Gvr::new("v1/pods"), path).await?;
        let ns = pod.metadata.namespace.clone();
        let spec = pod.data.get("spec").ok_or_else(|| anyhow!("pod {path} has no spec"))?;
        let status = pod.data.get("status");

        let mut rows = Vec::new();
        for (init, specs, statuses) in [
            (true, "initContainers", "initContainerStatuses"),
            (false, "containers", "containerStatuses"),
        ] {
            let Some(Value::Array(cc)) = spec.get(specs) else { continue };
            for c in cc {
                let Some(name) = c.get("name").and_then(Value::as_str) else { continue };
                let st = status
                    .and_then(|s| s.get(statuses))
                    .and_then(Value::as_array)
                    .and_then(|ss| ss.iter().find(|s| s.get("name").and_then(Value::as_str) == Some(name)));
                let data = json!({
                    "pod": path,
                    "image": c.get("image").cloned().unwrap_or(Value::Null),
                    "init": init,
                    "ready": st.and_then(|s| s.get("ready")).cloned().unwrap_or(Value::Bool(false)),
                    "restartCount": st.and_then(|s| s.get("restartCount")).cloned().unwrap_or(json!(0)),
                });
                rows.push(self.base.row("Container", ns.as_deref(), name, data));
            }
        }
        Ok(rows)
    }
}
