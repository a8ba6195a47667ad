//! The resource type catalog and its refresh from a live cluster.

use std::time::Instant;

use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use metrics::{counter, gauge, histogram};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use k9rs_core::filters::{is_deprecated, is_standard_group};
use k9rs_core::{string_set, Gvr, ResourceMeta, CLUSTER_SCOPE, CRD_CAT, EVERYTHING, SCALE_CAT};
use k9rs_kubehub::{connected, Factory};

use crate::extract::{crd_from_object, has_scale, new_gvr_from_crd};
use crate::registry::SYNTHETICS;

/// Identifier under which custom resource definitions are listed.
pub const CRD_GVR: &str = "apiextensions.k8s.io/v1/customresourcedefinitions";

type ResourceMetas = FxHashMap<Gvr, ResourceMeta>;

#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("no resource meta defined for \"{0}\"")]
    NotFound(Gvr),
}

/// Thread-safe catalog of every known resource type.
///
/// Lookups take the shared lock; [`Meta::load_resources`] holds the
/// exclusive lock for the whole refresh, so readers never observe a
/// partially rebuilt catalog.
#[derive(Debug, Default)]
pub struct Meta {
    metas: RwLock<ResourceMetas>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a descriptor. No validation.
    pub async fn register_meta(&self, gvr: impl Into<Gvr>, meta: ResourceMeta) {
        self.metas.write().await.insert(gvr.into(), meta);
    }

    /// Every known identifier, sorted.
    pub async fn all_gvrs(&self) -> Vec<Gvr> {
        let mut gvrs: Vec<Gvr> = self.metas.read().await.keys().cloned().collect();
        gvrs.sort();
        gvrs
    }

    /// Identifier and namespaced flag of the type with the given group,
    /// version and kind. The smallest identifier wins when several match.
    pub async fn gvk2gvr(&self, group: &str, version: &str, kind: &str) -> Option<(Gvr, bool)> {
        self.metas
            .read()
            .await
            .iter()
            .filter(|(_, m)| m.group == group && m.version == version && m.kind == kind)
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(gvr, m)| (gvr.clone(), m.namespaced))
    }

    pub async fn meta_for(&self, gvr: &Gvr) -> Result<ResourceMeta, MetaError> {
        self.metas.read().await.get(gvr).cloned().ok_or_else(|| MetaError::NotFound(gvr.clone()))
    }

    pub async fn len(&self) -> usize {
        self.metas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metas.read().await.is_empty()
    }

    /// Rebuild the catalog: synthetic types, then preferred discovery, then
    /// scale detection from custom resource definitions.
    ///
    /// Without a reachable cluster the catalog ends up holding only the
    /// synthetic types and the call succeeds. Fails only when the discovery
    /// handle cannot be obtained.
    pub async fn load_resources(&self, f: &dyn Factory) -> Result<()> {
        let started = Instant::now();
        let mut metas = self.metas.write().await;
        metas.clear();
        register_synthetics(&mut metas);
        load_preferred(f, &mut metas).await?;
        load_crds(f, &mut metas).await;

        let ms = started.elapsed().as_secs_f64() * 1000.0;
        counter!("catalog_refresh_total", 1u64);
        histogram!("catalog_refresh_ms", ms);
        gauge!("catalog_entries", metas.len() as f64);
        info!(entries = metas.len(), took_ms = ms as u64, "resource catalog loaded");
        Ok(())
    }
}

fn register_synthetics(m: &mut ResourceMetas) {
    for s in SYNTHETICS {
        m.insert(s.gvr(), s.meta());
    }
}

/// Descriptor for one discovered resource of group-version `gv`.
///
/// Discovery categories are not carried over; the catalog only uses its own
/// classification.
pub fn meta_from_api_resource(gv: &str, res: &APIResource) -> (Gvr, ResourceMeta) {
    let gvr = Gvr::from_gv_and_r(gv, &res.name);
    let mut meta = ResourceMeta {
        name: res.name.clone(),
        kind: res.kind.clone(),
        singular_name: if res.singular_name.is_empty() { res.kind.to_lowercase() } else { res.singular_name.clone() },
        group: gvr.group().to_string(),
        version: gvr.version().to_string(),
        namespaced: res.namespaced,
        short_names: string_set(res.short_names.as_deref().unwrap_or_default()),
        verbs: string_set(&res.verbs),
        ..Default::default()
    };
    if !is_standard_group(gv) {
        meta.add_category(CRD_CAT);
    }
    (gvr, meta)
}

async fn load_preferred(f: &dyn Factory, m: &mut ResourceMetas) -> Result<()> {
    let Some(conn) = connected(f) else {
        warn!("no api server connection; catalog holds synthetic types only");
        return Ok(());
    };
    let dial = conn.cached_discovery().context("obtaining cached discovery")?;
    let preferred = dial.server_preferred_resources().await;
    if let Some(e) = &preferred.error {
        debug!(error = %e, "preferred resources only partially loaded");
    }
    for list in &preferred.lists {
        for res in &list.resources {
            let (gvr, meta) = meta_from_api_resource(&list.group_version, res);
            if is_deprecated(&gvr) {
                continue;
            }
            m.insert(gvr, meta);
        }
    }
    Ok(())
}

/// Flags discovered custom types whose served version has a scale
/// subresource. Never adds entries.
async fn load_crds(f: &dyn Factory, m: &mut ResourceMetas) {
    if connected(f).is_none() {
        return;
    }
    let objs = match f.list(&Gvr::new(CRD_GVR), CLUSTER_SCOPE, EVERYTHING).await {
        Ok(objs) => objs,
        Err(e) => {
            warn!(error = %e, "custom resource definitions failed to load");
            return;
        }
    };
    for o in &objs {
        let crd = match crd_from_object(o) {
            Ok(crd) => crd,
            Err(e) => {
                counter!("catalog_crd_conversion_errors_total", 1u64);
                error!(error = %e, "custom resource definition conversion failed");
                continue;
            }
        };
        let Some((gvr, version)) = new_gvr_from_crd(&crd) else { continue };
        if let Some(meta) = m.get_mut(&gvr) {
            if has_scale(&version) && meta.add_category(SCALE_CAT) {
                debug!(gvr = %gvr, "scale subresource detected");
            }
        }
    }
}
