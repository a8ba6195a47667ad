//! Helm releases, read from helm's own storage secrets.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use kube::core::DynamicObject;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::info;

use k9rs_core::{fqn, split_path, Gvr};
use k9rs_kubehub::{DeleteOptions, Factory};

use crate::accessor::{Accessor, Base, ListOptions, Nuker};

const STORAGE_SELECTOR: &str = "owner=helm";

static STORAGE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^sh\.helm\.release\.v1\.(.+)\.v(\d+)$").unwrap());

fn secrets() -> Gvr {
    Gvr::new("v1/secrets")
}

/// One stored revision of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Revision {
    namespace: String,
    release: String,
    revision: u32,
    status: String,
    secret: String,
}

impl Revision {
    /// Labels win over the storage name; the name is the fallback for
    /// secrets written without the release labels.
    fn from_secret(o: &DynamicObject) -> Option<Self> {
        let secret = o.metadata.name.clone()?;
        let labels = o.metadata.labels.as_ref();
        let label = |k: &str| labels.and_then(|l| l.get(k)).cloned();
        let caps = STORAGE_NAME.captures(&secret);
        let release = label("name").or_else(|| caps.as_ref().map(|c| c[1].to_string()))?;
        let revision = label("version")
            .or_else(|| caps.as_ref().map(|c| c[2].to_string()))
            .and_then(|v| v.parse().ok())?;
        Some(Self {
            namespace: o.metadata.namespace.clone().unwrap_or_default(),
            release,
            revision,
            status: label("status").unwrap_or_else(|| "unknown".to_string()),
            secret,
        })
    }

    fn data(&self) -> serde_json::Value {
        json!({
            "release": self.release,
            "revision": self.revision,
            "status": self.status,
            "secret": self.secret,
        })
    }
}

async fn revisions(f: &dyn Factory, ns: &str, selector: &str) -> Result<Vec<Revision>> {
    let items = f.list(&secrets(), ns, selector).await?;
    Ok(items.iter().filter_map(Revision::from_secret).collect())
}

fn release_selector(release: &str) -> String {
    format!("{STORAGE_SELECTOR},name={release}")
}

/// Installed releases, one row per release at its latest revision.
#[derive(Clone, Default)]
pub struct HelmChart {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for HelmChart {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "HelmChart"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let mut latest: BTreeMap<(String, String), Revision> = BTreeMap::new();
        for r in revisions(self.base.factory()?, &opts.namespace, STORAGE_SELECTOR).await? {
            let key = (r.namespace.clone(), r.release.clone());
            match latest.get(&key) {
                Some(cur) if cur.revision >= r.revision => {}
                _ => {
                    latest.insert(key, r);
                }
            }
        }
        Ok(latest.into_values().map(|r| self.base.row("Helm", Some(&r.namespace), &r.release, r.data())).collect())
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Nuker for HelmChart {
    /// Removes every stored revision of the release at `namespace/release`.
    async fn delete(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        let (ns, release) = split_path(path);
        let ns = ns.ok_or_else(|| anyhow!("helm release path {path:?} needs a namespace"))?;
        let f = self.base.factory()?;
        let revs = revisions(f, ns, &release_selector(release)).await?;
        if revs.is_empty() {
            return Err(anyhow!("helm release {path} not found"));
        }
        for r in &revs {
            f.delete(&secrets(), &fqn(ns, &r.secret), opts).await?;
        }
        info!(release = %path, revisions = revs.len(), "helm release uninstalled");
        Ok(())
    }
}

/// Revisions of the release at the parent path, newest first.
#[derive(Clone, Default)]
pub struct HelmHistory {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for HelmHistory {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "HelmHistory"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let path = opts.require_path(self.gvr())?;
        let (ns, release) = split_path(path);
        let ns = ns.unwrap_or(opts.namespace.as_str());
        let mut revs = revisions(self.base.factory()?, ns, &release_selector(release)).await?;
        revs.retain(|r| r.release == release);
        revs.sort_by(|a, b| b.revision.cmp(&a.revision));
        Ok(revs
            .iter()
            .map(|r| self.base.row("History", Some(&r.namespace), &format!("{}.v{}", r.release, r.revision), r.data()))
            .collect())
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Nuker for HelmHistory {
    /// Removes one stored revision, addressed as `namespace/release.vN`.
    async fn delete(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        let (ns, rev) = split_path(path);
        let ns = ns.ok_or_else(|| anyhow!("helm revision path {path:?} needs a namespace"))?;
        let (release, revision) = rev
            .rsplit_once(".v")
            .and_then(|(r, v)| Some((r, v.parse::<u32>().ok()?)))
            .ok_or_else(|| anyhow!("helm revision path {path:?} is not release.vN"))?;
        let f = self.base.factory()?;
        let found = revisions(f, ns, &release_selector(release))
            .await?
            .into_iter()
            .find(|r| r.release == release && r.revision == revision)
            .ok_or_else(|| anyhow!("helm revision {path} not found"))?;
        f.delete(&secrets(), &fqn(ns, &found.secret), opts).await
    }
}
