//! In-memory cluster used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::core::DynamicObject;
use serde_json::{json, Value};

use k9rs_core::{split_path, Config, Gvr, ALL_NAMESPACES, CLUSTER_SCOPE};
use k9rs_kubehub::{
    Connection, ContextInfo, DeleteOptions, DiscoveryClient, Factory, ForwardSession, Preferred, ScanReport,
};

pub struct FakeDiscovery {
    lists: Vec<APIResourceList>,
    partial_error: Option<String>,
}

#[async_trait::async_trait]
impl DiscoveryClient for FakeDiscovery {
    async fn server_preferred_resources(&self) -> Preferred {
        Preferred { lists: self.lists.clone(), error: self.partial_error.as_ref().map(|e| anyhow!(e.clone())) }
    }
}

pub struct FakeConnection {
    ok: bool,
    discovery: Option<Arc<FakeDiscovery>>,
    contexts: Vec<ContextInfo>,
}

impl Connection for FakeConnection {
    fn connection_ok(&self) -> bool {
        self.ok
    }

    fn cached_discovery(&self) -> Result<Arc<dyn DiscoveryClient>> {
        match &self.discovery {
            Some(d) => {
                let handle: Arc<dyn DiscoveryClient> = d.clone();
                Ok(handle)
            }
            None => Err(anyhow!("discovery cache dir not writable")),
        }
    }

    fn contexts(&self) -> Result<Vec<ContextInfo>> {
        Ok(self.contexts.clone())
    }
}

/// Builder-style fake [`Factory`]. Records deletes and scales.
pub struct FakeFactory {
    conn: Option<Arc<FakeConnection>>,
    config: Config,
    objects: Mutex<BTreeMap<Gvr, Vec<DynamicObject>>>,
    failing: BTreeSet<Gvr>,
    deleted: Mutex<Vec<(Gvr, String)>>,
    scaled: Mutex<Vec<(Gvr, String, i32)>>,
    forwards: Mutex<Vec<ForwardSession>>,
    scans: Vec<ScanReport>,
}

impl FakeFactory {
    /// No client at all.
    pub fn offline() -> Self {
        Self {
            conn: None,
            config: Config::default(),
            objects: Mutex::new(BTreeMap::new()),
            failing: BTreeSet::new(),
            deleted: Mutex::new(Vec::new()),
            scaled: Mutex::new(Vec::new()),
            forwards: Mutex::new(Vec::new()),
            scans: Vec::new(),
        }
    }

    /// A client whose API server does not answer.
    pub fn unreachable() -> Self {
        let mut f = Self::offline();
        f.conn = Some(Arc::new(FakeConnection { ok: false, discovery: None, contexts: Vec::new() }));
        f
    }

    pub fn online(lists: Vec<APIResourceList>) -> Self {
        let mut f = Self::offline();
        f.conn = Some(Arc::new(FakeConnection {
            ok: true,
            discovery: Some(Arc::new(FakeDiscovery { lists, partial_error: None })),
            contexts: Vec::new(),
        }));
        f
    }

    /// Discovery answers with `lists` and reports a partial failure.
    pub fn partially_online(lists: Vec<APIResourceList>, err: &str) -> Self {
        let mut f = Self::offline();
        f.conn = Some(Arc::new(FakeConnection {
            ok: true,
            discovery: Some(Arc::new(FakeDiscovery { lists, partial_error: Some(err.to_string()) })),
            contexts: Vec::new(),
        }));
        f
    }

    /// Connected, but the discovery handle cannot be obtained.
    pub fn without_discovery() -> Self {
        let mut f = Self::offline();
        f.conn = Some(Arc::new(FakeConnection { ok: true, discovery: None, contexts: Vec::new() }));
        f
    }

    pub fn with_contexts(mut self, contexts: Vec<ContextInfo>) -> Self {
        self.conn = Some(Arc::new(FakeConnection { ok: true, discovery: None, contexts }));
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_objects(self, gvr: &str, objs: Vec<DynamicObject>) -> Self {
        if let Ok(mut m) = self.objects.lock() {
            m.entry(Gvr::new(gvr)).or_default().extend(objs);
        }
        self
    }

    pub fn failing_list(mut self, gvr: &str) -> Self {
        self.failing.insert(Gvr::new(gvr));
        self
    }

    pub fn with_forwards(self, ff: Vec<ForwardSession>) -> Self {
        if let Ok(mut m) = self.forwards.lock() {
            *m = ff;
        }
        self
    }

    pub fn with_scans(mut self, scans: Vec<ScanReport>) -> Self {
        self.scans = scans;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Factory> {
        Arc::new(self)
    }

    pub fn deleted(&self) -> Vec<(Gvr, String)> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn scaled(&self) -> Vec<(Gvr, String, i32)> {
        self.scaled.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

fn matches_selector(o: &DynamicObject, selector: &str) -> bool {
    let labels = o.metadata.labels.clone().unwrap_or_default();
    selector.split(',').filter(|s| !s.is_empty()).all(|term| match term.split_once('=') {
        Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
        None => labels.contains_key(term),
    })
}

#[async_trait::async_trait]
impl Factory for FakeFactory {
    fn client(&self) -> Option<Arc<dyn Connection>> {
        self.conn.clone().map(|c| c as Arc<dyn Connection>)
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn list(&self, gvr: &Gvr, ns: &str, selector: &str) -> Result<Vec<DynamicObject>> {
        if self.failing.contains(gvr) {
            return Err(anyhow!("listing {gvr}: forbidden"));
        }
        let objects = self.objects.lock().map_err(|_| anyhow!("poisoned"))?;
        Ok(objects
            .get(gvr)
            .map(|oo| {
                oo.iter()
                    .filter(|o| ns == ALL_NAMESPACES || ns == CLUSTER_SCOPE || o.metadata.namespace.as_deref() == Some(ns))
                    .filter(|o| matches_selector(o, selector))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, gvr: &Gvr, path: &str) -> Result<DynamicObject> {
        let (ns, name) = split_path(path);
        let objects = self.objects.lock().map_err(|_| anyhow!("poisoned"))?;
        objects
            .get(gvr)
            .and_then(|oo| {
                oo.iter().find(|o| o.metadata.name.as_deref() == Some(name) && o.metadata.namespace.as_deref() == ns)
            })
            .cloned()
            .ok_or_else(|| anyhow!("{gvr} {path} not found"))
    }

    async fn delete(&self, gvr: &Gvr, path: &str, _opts: &DeleteOptions) -> Result<()> {
        let (ns, name) = split_path(path);
        if let Ok(mut objects) = self.objects.lock() {
            if let Some(oo) = objects.get_mut(gvr) {
                oo.retain(|o| !(o.metadata.name.as_deref() == Some(name) && o.metadata.namespace.as_deref() == ns));
            }
        }
        self.deleted.lock().map_err(|_| anyhow!("poisoned"))?.push((gvr.clone(), path.to_string()));
        Ok(())
    }

    async fn scale(&self, gvr: &Gvr, path: &str, replicas: i32) -> Result<()> {
        self.scaled.lock().map_err(|_| anyhow!("poisoned"))?.push((gvr.clone(), path.to_string(), replicas));
        Ok(())
    }

    fn port_forwards(&self) -> Vec<ForwardSession> {
        self.forwards.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn stop_port_forward(&self, key: &str) -> bool {
        self.forwards
            .lock()
            .map(|mut ff| {
                let before = ff.len();
                ff.retain(|s| s.key() != key);
                ff.len() != before
            })
            .unwrap_or(false)
    }

    fn image_scans(&self) -> Vec<ScanReport> {
        self.scans.clone()
    }
}

/// Discovery list for one group-version: `(plural, kind, namespaced)`.
pub fn api_list(gv: &str, resources: &[(&str, &str, bool)]) -> APIResourceList {
    APIResourceList {
        group_version: gv.to_string(),
        resources: resources
            .iter()
            .map(|(name, kind, namespaced)| APIResource {
                name: name.to_string(),
                kind: kind.to_string(),
                namespaced: *namespaced,
                verbs: vec!["get".into(), "list".into(), "delete".into()],
                ..Default::default()
            })
            .collect(),
    }
}

/// A custom resource definition object as listed from the cluster.
pub fn crd(group: &str, plural: &str, kind: &str, versions: Value) -> DynamicObject {
    object(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": {"name": format!("{plural}.{group}")},
        "spec": {
            "group": group,
            "scope": "Namespaced",
            "names": {"kind": kind, "plural": plural, "singular": kind.to_lowercase()},
            "versions": versions,
        }
    }))
}

pub fn version(name: &str, served: bool, scale: bool) -> Value {
    let mut v = json!({"name": name, "served": served, "storage": served});
    if scale {
        v["subresources"] = json!({"scale": {"specReplicasPath": ".spec.replicas", "statusReplicasPath": ".status.replicas"}});
    }
    v
}

pub fn object(v: Value) -> DynamicObject {
    serde_json::from_value(v).expect("dynamic object")
}

pub fn namespaced(api_version: &str, kind: &str, ns: &str, name: &str, labels: &[(&str, &str)]) -> DynamicObject {
    let labels: BTreeMap<String, String> = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    object(json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"name": name, "namespace": ns, "labels": labels},
    }))
}
