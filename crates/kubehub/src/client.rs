use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use kube::{api::Api, core::DynamicObject, Client};
use tracing::{info, warn};

use k9rs_core::{Config, Gvr, ALL_NAMESPACES, CLUSTER_SCOPE};

use crate::discovery::{CachedDiscovery, DiscoveryCache};
use crate::{Connection, ContextInfo, DiscoveryClient};

/// Live connection to one cluster.
pub struct KubeConnection {
    client: Client,
    ok: AtomicBool,
    discovery: Arc<CachedDiscovery>,
}

impl KubeConnection {
    /// Build a client from the inferred kube config and probe the API server.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let kcfg = kube::Config::infer().await.context("inferring kube config")?;
        let cache_file = cfg.discovery_cache_dir.join(cache_file_name(
            kcfg.cluster_url.host().unwrap_or("cluster"),
            kcfg.cluster_url.port_u16(),
        ));
        let client = Client::try_from(kcfg).context("building kube client")?;
        let cache = DiscoveryCache::new(cache_file, cfg.discovery_cache_ttl);
        let conn = Self {
            discovery: Arc::new(CachedDiscovery::new(client.clone(), cache)),
            client,
            ok: AtomicBool::new(false),
        };
        conn.check().await;
        Ok(conn)
    }

    /// Probe the API server and record the outcome.
    pub async fn check(&self) -> bool {
        let ok = match self.client.apiserver_version().await {
            Ok(v) => {
                info!(version = %v.git_version, "api server reachable");
                true
            }
            Err(e) => {
                warn!(error = %e, "api server unreachable");
                false
            }
        };
        self.ok.store(ok, Ordering::Relaxed);
        ok
    }

    pub fn discovery(&self) -> &CachedDiscovery {
        &self.discovery
    }

    /// Dynamic API for a type, scoped to `ns` when the type is namespaced.
    pub async fn dynamic_api(&self, gvr: &Gvr, ns: Option<&str>) -> Result<Api<DynamicObject>> {
        let (ar, namespaced) = self.discovery.resolve(gvr).await?;
        let api = match ns {
            Some(ns) if namespaced && ns != ALL_NAMESPACES && ns != CLUSTER_SCOPE => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        };
        Ok(api)
    }
}

impl Connection for KubeConnection {
    fn connection_ok(&self) -> bool {
        self.ok.load(Ordering::Relaxed)
    }

    fn cached_discovery(&self) -> Result<Arc<dyn DiscoveryClient>> {
        self.discovery.cache().ensure_dir()?;
        let handle: Arc<dyn DiscoveryClient> = self.discovery.clone();
        Ok(handle)
    }

    fn contexts(&self) -> Result<Vec<ContextInfo>> {
        let kc = kube::config::Kubeconfig::read().context("reading kubeconfig")?;
        let current = kc.current_context.clone().unwrap_or_default();
        Ok(kc
            .contexts
            .into_iter()
            .map(|c| ContextInfo {
                current: c.name == current,
                namespace: c.context.and_then(|ctx| ctx.namespace),
                name: c.name,
            })
            .collect())
    }
}

fn cache_file_name(host: &str, port: Option<u16>) -> String {
    let host: String = host.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' }).collect();
    match port {
        Some(p) => format!("{host}_{p}.json"),
        None => format!("{host}.json"),
    }
}
