//! Accessors for tool-internal types. Rows are built locally, never fetched
//! from the API server.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use chrono::{DateTime, Utc};
use kube::core::DynamicObject;
use serde_json::json;
use tracing::{debug, info};

use k9rs_core::{split_path, Gvr, ALL_NAMESPACES};
use k9rs_kubehub::{DeleteOptions, Factory};

use crate::accessor::{Accessor, Base, ListOptions, Nuker};

/// Kubeconfig contexts.
#[derive(Clone, Default)]
pub struct Context {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for Context {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Context"
    }

    async fn list(&self, _opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let conn = self.base.factory()?.client().ok_or_else(|| anyhow!("no cluster client"))?;
        let rows = conn
            .contexts()?
            .into_iter()
            .map(|c| self.base.row("Contexts", None, &c.name, json!({"current": c.current, "namespace": c.namespace})))
            .collect();
        Ok(rows)
    }
}

/// Entries of the local directory at the parent path.
#[derive(Clone, Default)]
pub struct Dir {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for Dir {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Dir"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let dir = opts.require_path(self.gvr())?;
        read_dir_rows(&self.base, "Dir", Path::new(dir), true).await
    }
}

/// Saved screen dumps under the configured dump directory.
#[derive(Clone, Default)]
pub struct ScreenDump {
    base: Base,
}

impl ScreenDump {
    fn root(&self) -> Result<PathBuf> {
        Ok(self.base.factory()?.config().screen_dump_dir.clone())
    }
}

#[async_trait::async_trait]
impl Accessor for ScreenDump {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "ScreenDump"
    }

    async fn list(&self, _opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        read_dir_rows(&self.base, "ScreenDumps", &self.root()?, false).await
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Nuker for ScreenDump {
    async fn delete(&self, path: &str, _opts: &DeleteOptions) -> Result<()> {
        remove_file(&self.root()?, path).await
    }
}

/// Saved benchmark reports under the configured benchmark directory.
#[derive(Clone, Default)]
pub struct Benchmark {
    base: Base,
}

impl Benchmark {
    fn root(&self) -> Result<PathBuf> {
        Ok(self.base.factory()?.config().benchmark_dir.clone())
    }
}

#[async_trait::async_trait]
impl Accessor for Benchmark {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "Benchmark"
    }

    async fn list(&self, _opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        read_dir_rows(&self.base, "Benchmarks", &self.root()?, false).await
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Nuker for Benchmark {
    async fn delete(&self, path: &str, _opts: &DeleteOptions) -> Result<()> {
        remove_file(&self.root()?, path).await
    }
}

/// One row per entry of `dir`. A missing directory lists as empty unless
/// `must_exist` is set.
async fn read_dir_rows(base: &Base, kind: &str, dir: &Path, must_exist: bool) -> Result<Vec<DynamicObject>> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !must_exist => {
            debug!(dir = %dir.display(), "directory missing; nothing to list");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };
    let mut rows = Vec::new();
    while let Some(entry) = rd.next_entry().await.with_context(|| format!("reading {}", dir.display()))? {
        let md = entry.metadata().await?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified = md.modified().ok().map(|t| DateTime::<Utc>::from(t).to_rfc3339());
        rows.push(base.row(
            kind,
            None,
            &name,
            json!({
                "path": entry.path().display().to_string(),
                "dir": md.is_dir(),
                "size": md.len(),
                "modified": modified,
            }),
        ));
    }
    rows.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    Ok(rows)
}

/// Remove a file directly under `root`. Only bare file names are accepted.
async fn remove_file(root: &Path, path: &str) -> Result<()> {
    let (_, name) = split_path(path);
    let mut parts = Path::new(name).components();
    let name = match (parts.next(), parts.next()) {
        (Some(Component::Normal(n)), None) => n,
        _ => return Err(anyhow!("invalid file name {path:?}")),
    };
    let file = root.join(name);
    tokio::fs::remove_file(&file).await.with_context(|| format!("removing {}", file.display()))?;
    info!(file = %file.display(), "file removed");
    Ok(())
}

/// Active port-forward sessions.
#[derive(Clone, Default)]
pub struct PortForward {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for PortForward {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "PortForward"
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let rows = self
            .base
            .factory()?
            .port_forwards()
            .into_iter()
            .filter_map(|s| {
                let (ns, pod) = split_path(&s.path);
                if opts.namespace != ALL_NAMESPACES && ns != Some(opts.namespace.as_str()) {
                    return None;
                }
                let data = json!({
                    "key": s.key(),
                    "container": s.container,
                    "localPort": s.local_port,
                    "remotePort": s.remote_port,
                });
                Some(self.base.row("PortForwards", ns, pod, data))
            })
            .collect();
        Ok(rows)
    }

    fn nuker(&self) -> Option<&dyn Nuker> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Nuker for PortForward {
    /// `path` is either a session key or the `namespace/pod` the sessions target.
    async fn delete(&self, path: &str, _opts: &DeleteOptions) -> Result<()> {
        let f = self.base.factory()?;
        let keys: Vec<String> =
            f.port_forwards().into_iter().filter(|s| s.path == path || s.key() == path).map(|s| s.key()).collect();
        if keys.is_empty() {
            return Err(anyhow!("no port-forward matches {path}"));
        }
        for k in keys {
            f.stop_port_forward(&k);
        }
        Ok(())
    }
}

/// Image vulnerability scan summaries.
#[derive(Clone, Default)]
pub struct ImageScan {
    base: Base,
}

#[async_trait::async_trait]
impl Accessor for ImageScan {
    fn init(&mut self, factory: Arc<dyn Factory>, gvr: Gvr) {
        self.base.init(factory, gvr);
    }

    fn gvr(&self) -> &Gvr {
        self.base.gvr()
    }

    fn kind(&self) -> &'static str {
        "ImageScan"
    }

    async fn list(&self, _opts: &ListOptions) -> Result<Vec<DynamicObject>> {
        let rows = self
            .base
            .factory()?
            .image_scans()
            .into_iter()
            .map(|r| {
                let data = json!({"critical": r.critical, "high": r.high, "medium": r.medium, "low": r.low});
                self.base.row("Scans", None, &r.image, data)
            })
            .collect();
        Ok(rows)
    }
}
