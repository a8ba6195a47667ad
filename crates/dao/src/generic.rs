//! Dynamic-object accessors used for cluster-served types.

use std::sync::Arc;

use anyhow::Result;
use kube::core::DynamicObject;
use tracing::debug;

use k9rs_core::Gvr;
use k9rs_kubehub::{DeleteOptions, Factory};

use crate::accessor::{Accessor, Base, ListOptions, Nuker, Scalable};

/// List, get and delete on dynamic objects.
#[derive(Clone, Default)]
pub struct Generic {
    base: Base,
}

impl Generic {
    pub(crate) fn base(&self) -> &Base {
        &self.base
    }
}

#[async_trait::async_trait]
impl Accessor for Generic {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Generic"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        self.base.factory()?.list(self.gvr(), &opts.namespace, &opts.labels).await
    }

    async fn get(&self, _opts: &ListOptions, path: &str) -> Result<DynamicObject> {
        self.base.factory()?.get(self.gvr(), path).await
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Nuker for Generic {
    async fn delete(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        debug!(gvr = %self.gvr(), path = %path, "delete");
        self.base.factory()?.delete(self.gvr(), path, opts).await
    }
}

/// [`Generic`] plus scaling; the fallback for types without a registered accessor.
#[derive(Clone, Default)]
pub struct Scaler {
    generic: Generic,
}

#[async_trait::async_trait]
impl Accessor for Scaler {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.generic.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.generic.gvr()
    }

    fn kind(&self) -> &'static str {
        "Scaler"
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

    fn scalable(&self) -> Option<&dyn Scalable> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Scalable for Scaler {
    /// Fails when the type does not serve a `scale` subresource.
    async fn scale(&self, path: &str, replicas: i32) -> Result<()> {
        self.generic.base().factory()?.scale(self.gvr(), path, replicas).await
    }
}
