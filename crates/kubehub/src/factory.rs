use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PropagationPolicy},
    core::DynamicObject,
};
use tracing::{debug, info, warn};

use k9rs_core::{split_path, Config, Gvr};

use crate::client::KubeConnection;
use crate::{Connection, DeleteOptions, Factory, ForwardSession, ScanReport};

/// [`Factory`] backed by a kube-rs client.
///
/// Port-forward sessions and scan reports are recorded here by the
/// subsystems that produce them; the factory only keeps the registry.
pub struct KubeFactory {
    conn: Option<Arc<KubeConnection>>,
    config: Config,
    forwards: Mutex<BTreeMap<String, ForwardSession>>,
    scans: Mutex<Vec<ScanReport>>,
}

impl KubeFactory {
    /// Connect to the current kube context. A failed connection is not an
    /// error: the factory then reports no client and callers degrade.
    pub async fn connect(config: Config) -> Self {
        let conn = match KubeConnection::connect(&config).await {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                warn!(error = %e, "no cluster connection");
                None
            }
        };
        Self::with_connection(conn, config)
    }

    pub fn with_connection(conn: Option<Arc<KubeConnection>>, config: Config) -> Self {
        Self { conn, config, forwards: Mutex::new(BTreeMap::new()), scans: Mutex::new(Vec::new()) }
    }

    /// Re-probe the API server; false when there is no client at all.
    pub async fn check_connection(&self) -> bool {
        match &self.conn {
            Some(c) => c.check().await,
            None => false,
        }
    }

    pub fn register_port_forward(&self, session: ForwardSession) {
        let key = session.key();
        info!(key = %key, "port-forward registered");
        if let Ok(mut ff) = self.forwards.lock() {
            ff.insert(key, session);
        }
    }

    pub fn record_scan(&self, report: ScanReport) {
        if let Ok(mut ss) = self.scans.lock() {
            ss.retain(|r| r.image != report.image);
            ss.push(report);
        }
    }

    fn connection(&self) -> Result<&KubeConnection> {
        match &self.conn {
            Some(c) if c.connection_ok() => Ok(c.as_ref()),
            Some(_) => Err(anyhow!("api server unreachable")),
            None => Err(anyhow!("no cluster connection")),
        }
    }
}

#[async_trait::async_trait]
impl Factory for KubeFactory {
    fn client(&self) -> Option<Arc<dyn Connection>> {
        self.conn.clone().map(|c| c as Arc<dyn Connection>)
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn list(&self, gvr: &Gvr, ns: &str, selector: &str) -> Result<Vec<DynamicObject>> {
        let api = self.connection()?.dynamic_api(gvr, Some(ns)).await?;
        let mut lp = ListParams::default();
        if !selector.is_empty() {
            lp = lp.labels(selector);
        }
        let list = api.list(&lp).await.with_context(|| format!("listing {gvr}"))?;
        debug!(gvr = %gvr, ns = %ns, count = list.items.len(), "listed");
        Ok(list.items)
    }

    async fn get(&self, gvr: &Gvr, path: &str) -> Result<DynamicObject> {
        let (ns, name) = split_path(path);
        let api = self.connection()?.dynamic_api(gvr, ns).await?;
        api.get(name).await.with_context(|| format!("getting {gvr} {path}"))
    }

    async fn delete(&self, gvr: &Gvr, path: &str, opts: &DeleteOptions) -> Result<()> {
        let (ns, name) = split_path(path);
        let api = self.connection()?.dynamic_api(gvr, ns).await?;
        let dp = DeleteParams {
            grace_period_seconds: opts.grace_period_seconds,
            propagation_policy: Some(if opts.orphan { PropagationPolicy::Orphan } else { PropagationPolicy::Background }),
            ..Default::default()
        };
        let _ = api.delete(name, &dp).await.with_context(|| format!("deleting {gvr} {path}"))?;
        info!(gvr = %gvr, path = %path, "deleted");
        Ok(())
    }

    async fn scale(&self, gvr: &Gvr, path: &str, replicas: i32) -> Result<()> {
        let conn = self.connection()?;
        if !conn.discovery().supports_scale(gvr).await {
            return Err(anyhow!("{gvr} does not serve a scale subresource"));
        }
        let (ns, name) = split_path(path);
        let api = conn.dynamic_api(gvr, ns).await?;
        let payload = serde_json::json!({"spec": {"replicas": replicas}});
        let _ = api
            .patch_scale(name, &PatchParams::default(), &Patch::Merge(&payload))
            .await
            .with_context(|| format!("scaling {gvr} {path}"))?;
        info!(gvr = %gvr, path = %path, replicas, "scaled");
        Ok(())
    }

    fn port_forwards(&self) -> Vec<ForwardSession> {
        self.forwards.lock().map(|ff| ff.values().cloned().collect()).unwrap_or_default()
    }

    fn stop_port_forward(&self, key: &str) -> bool {
        let removed = self.forwards.lock().map(|mut ff| ff.remove(key).is_some()).unwrap_or(false);
        if removed {
            info!(key = %key, "port-forward stopped");
        }
        removed
    }

    fn image_scans(&self) -> Vec<ScanReport> {
        self.scans.lock().map(|ss| ss.clone()).unwrap_or_default()
    }
}
