//! Discovery of served resource types, cached in memory and on disk.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use arc_swap::ArcSwapOption;
use futures::future::join_all;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::{
    core::{ApiResource, GroupVersion, GroupVersionKind},
    discovery::{oneshot, ApiCapabilities, ApiGroup, Scope},
    Client,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use k9rs_core::Gvr;

use crate::{DiscoveryClient, Preferred};

/// How long a pass with failed groups is served before discovery runs again.
const PARTIAL_TTL: Duration = Duration::from_secs(30);

/// One discovery pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    /// Unix seconds at fetch time.
    pub fetched_at: u64,
    pub lists: Vec<APIResourceList>,
    /// Types serving a `scale` subresource.
    #[serde(default)]
    pub scalable: Vec<Gvr>,
    /// Groups that could not be discovered, with their errors.
    #[serde(default)]
    pub failed: Vec<String>,
}

impl DiscoverySnapshot {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    fn error(&self) -> Option<anyhow::Error> {
        if !self.is_partial() {
            return None;
        }
        Some(anyhow!("unable to retrieve the complete list of server APIs: {}", self.failed.join("; ")))
    }

    fn find(&self, gvr: &Gvr) -> Option<&APIResource> {
        let gv = gvr.gv();
        self.lists
            .iter()
            .filter(|l| l.group_version == gv)
            .flat_map(|l| l.resources.iter())
            .find(|r| r.name == gvr.resource())
    }
}

/// Memory + disk cache for discovery snapshots with a freshness TTL.
///
/// Complete passes live for the configured TTL and are written to disk.
/// Partial passes stay in memory only, for at most [`PARTIAL_TTL`].
pub struct DiscoveryCache {
    file: PathBuf,
    ttl: Duration,
    partial_ttl: Duration,
    mem: ArcSwapOption<DiscoverySnapshot>,
    refresh: Mutex<()>,
}

impl DiscoveryCache {
    pub fn new(file: PathBuf, ttl: Duration) -> Self {
        Self { file, ttl, partial_ttl: PARTIAL_TTL.min(ttl), mem: ArcSwapOption::empty(), refresh: Mutex::new(()) }
    }

    /// Create the cache directory.
    pub fn ensure_dir(&self) -> Result<()> {
        if let Some(dir) = self.file.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating discovery cache dir {}", dir.display()))?;
        }
        Ok(())
    }

    /// Latest snapshot if still within its TTL, loading from disk when memory is cold.
    pub fn fresh(&self) -> Option<Arc<DiscoverySnapshot>> {
        let now = unix_now();
        if let Some(snap) = self.mem.load_full() {
            if self.is_fresh(&snap, now) {
                return Some(snap);
            }
        }
        let snap = self.read_disk()?;
        if !self.is_fresh(&snap, now) {
            return None;
        }
        let snap = Arc::new(snap);
        self.mem.store(Some(Arc::clone(&snap)));
        Some(snap)
    }

    pub fn store(&self, snap: DiscoverySnapshot) -> Arc<DiscoverySnapshot> {
        let snap = Arc::new(snap);
        self.mem.store(Some(Arc::clone(&snap)));
        if snap.is_partial() {
            debug!(failed = snap.failed.len(), "partial discovery kept in memory only");
            return snap;
        }
        match serde_json::to_vec(snap.as_ref()) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&self.file, bytes) {
                    warn!(file = %self.file.display(), error = %e, "discovery cache write failed");
                }
            }
            Err(e) => warn!(error = %e, "discovery cache encode failed"),
        }
        snap
    }

    pub fn invalidate(&self) {
        self.mem.store(None);
        let _ = std::fs::remove_file(&self.file);
    }

    /// Fresh snapshot, or the outcome of `fetch`. Concurrent callers on a
    /// cold cache wait for a single fetch.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Arc<DiscoverySnapshot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DiscoverySnapshot>,
    {
        if let Some(snap) = self.fresh() {
            return snap;
        }
        let _guard = self.refresh.lock().await;
        if let Some(snap) = self.fresh() {
            return snap;
        }
        self.store(fetch().await)
    }

    fn is_fresh(&self, snap: &DiscoverySnapshot, now: u64) -> bool {
        let ttl = if snap.is_partial() { self.partial_ttl } else { self.ttl };
        now.saturating_sub(snap.fetched_at) < ttl.as_secs()
    }

    fn read_disk(&self) -> Option<DiscoverySnapshot> {
        let bytes = std::fs::read(&self.file).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(snap) => Some(snap),
            Err(e) => {
                debug!(file = %self.file.display(), error = %e, "ignoring unreadable discovery cache");
                None
            }
        }
    }
}

/// Discovery handle reading through a [`DiscoveryCache`].
pub struct CachedDiscovery {
    client: Client,
    cache: DiscoveryCache,
}

impl CachedDiscovery {
    pub fn new(client: Client, cache: DiscoveryCache) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    async fn snapshot(&self) -> Arc<DiscoverySnapshot> {
        self.cache.get_or_fetch(|| fetch_all(&self.client)).await
    }

    /// Whether the type serves a `scale` subresource.
    pub async fn supports_scale(&self, gvr: &Gvr) -> bool {
        self.snapshot().await.scalable.contains(gvr)
    }

    /// Resolve a type to a kube `ApiResource` and its namespaced flag.
    pub async fn resolve(&self, gvr: &Gvr) -> Result<(ApiResource, bool)> {
        let snap = self.snapshot().await;
        if let Some(r) = snap.find(gvr) {
            let gvk = GroupVersionKind::gvk(gvr.group(), gvr.version(), &r.kind);
            return Ok((ApiResource::from_gvk_with_plural(&gvk, &r.name), r.namespaced));
        }
        // Non-preferred versions are not in the snapshot.
        let gv = GroupVersion::gv(gvr.group(), gvr.version());
        let group = oneshot::pinned_group(&self.client, &gv)
            .await
            .with_context(|| format!("discovering {}", gvr.gv()))?;
        group
            .versioned_resources(gvr.version())
            .into_iter()
            .find(|(ar, _)| ar.plural == gvr.resource())
            .map(|(ar, caps)| (ar, matches!(caps.scope, Scope::Namespaced)))
            .ok_or_else(|| anyhow!("resource {gvr} is not served by the cluster"))
    }
}

#[async_trait::async_trait]
impl DiscoveryClient for CachedDiscovery {
    async fn server_preferred_resources(&self) -> Preferred {
        let snap = self.snapshot().await;
        Preferred { lists: snap.lists.clone(), error: snap.error() }
    }
}

/// Discover every group independently; a failing group is recorded and skipped.
async fn fetch_all(client: &Client) -> DiscoverySnapshot {
    let started = Instant::now();
    let mut failed = Vec::new();
    let mut names = vec![ApiGroup::CORE_GROUP.to_string()];
    match client.list_api_groups().await {
        Ok(groups) => names.extend(groups.groups.into_iter().map(|g| g.name)),
        Err(e) => failed.push(format!("api groups: {e}")),
    }

    let groups = join_all(names.iter().map(|n| oneshot::group(client, n))).await;
    let mut lists = Vec::new();
    let mut scalable = Vec::new();
    for (name, res) in names.iter().zip(groups) {
        match res {
            Ok(group) => {
                let (mut gl, gs) = group_lists(group.recommended_resources());
                for list in &mut gl {
                    add_names(client, list).await;
                }
                lists.extend(gl);
                scalable.extend(gs);
            }
            Err(e) => {
                let name = if name.is_empty() { "core" } else { name.as_str() };
                failed.push(format!("{name}: {e}"));
            }
        }
    }
    info!(
        groups = names.len(),
        failed = failed.len(),
        took_ms = started.elapsed().as_millis() as u64,
        "discovery fetched"
    );
    DiscoverySnapshot { fetched_at: unix_now(), lists, scalable, failed }
}

/// Group the recommended resources of one API group by group-version and
/// collect the types serving `scale`.
fn group_lists(recommended: Vec<(ApiResource, ApiCapabilities)>) -> (Vec<APIResourceList>, Vec<Gvr>) {
    let mut lists: Vec<APIResourceList> = Vec::new();
    let mut scalable = Vec::new();
    for (ar, caps) in recommended {
        if caps.subresources.iter().any(|(sub, _)| sub.plural == "scale") {
            scalable.push(Gvr::from_gv_and_r(&ar.api_version, &ar.plural));
        }
        let res = APIResource {
            name: ar.plural.clone(),
            kind: ar.kind.clone(),
            namespaced: matches!(caps.scope, Scope::Namespaced),
            verbs: caps.operations.clone(),
            ..Default::default()
        };
        match lists.iter_mut().find(|l| l.group_version == ar.api_version) {
            Some(l) => l.resources.push(res),
            None => lists.push(APIResourceList { group_version: ar.api_version, resources: vec![res] }),
        }
    }
    (lists, scalable)
}

/// kube's `ApiResource` has no short, singular or category names; copy them
/// from the raw list of the same group-version.
async fn add_names(client: &Client, list: &mut APIResourceList) {
    let raw = if list.group_version.contains('/') {
        client.list_api_group_resources(&list.group_version).await
    } else {
        client.list_core_api_resources(&list.group_version).await
    };
    match raw {
        Ok(raw) => copy_names(list, &raw),
        Err(e) => debug!(gv = %list.group_version, error = %e, "resource names unavailable"),
    }
}

fn copy_names(list: &mut APIResourceList, raw: &APIResourceList) {
    for r in &mut list.resources {
        if let Some(src) = raw.resources.iter().find(|s| s.name == r.name) {
            r.singular_name = src.singular_name.clone();
            r.short_names = src.short_names.clone();
            r.categories = src.categories.clone();
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
