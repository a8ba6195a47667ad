//! Synthetic type table and accessor dispatch.
//!
//! Synthetic types and their accessors are declared together in
//! [`SYNTHETICS`]; the dispatch map is derived from it and [`BUILTINS`], so
//! every synthetic identifier the catalog knows resolves to the accessor
//! registered next to it.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use tracing::debug;

use k9rs_core::{string_set, Gvr, ResourceMeta, HELM_CAT, K9S_CAT};
use k9rs_kubehub::Factory;

use crate::accessor::Accessor;
use crate::generic::{Generic, Scaler};
use crate::helm::{HelmChart, HelmHistory};
use crate::resources::{Container, Namespace, Node, Pod, Secret, Workload};
use crate::synthetic::{Benchmark, Context, Dir, ImageScan, PortForward, ScreenDump};

/// Builds a fresh, uninitialized accessor.
pub type AccessorCtor = fn() -> Box<dyn Accessor>;

fn ctor<A: Accessor + Default + 'static>() -> Box<dyn Accessor> {
    Box::new(A::default())
}

/// A tool-internal type: catalog descriptor plus optional accessor.
#[derive(Debug, Clone, Copy)]
pub struct Synthetic {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
    pub singular: &'static str,
    pub namespaced: bool,
    pub short_names: &'static [&'static str],
    pub verbs: &'static [&'static str],
    pub category: &'static str,
    pub accessor: Option<AccessorCtor>,
}

impl Synthetic {
    pub fn gvr(&self) -> Gvr {
        Gvr::new(self.id)
    }

    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            name: self.name.to_string(),
            kind: self.kind.to_string(),
            singular_name: self.singular.to_string(),
            namespaced: self.namespaced,
            short_names: string_set(self.short_names),
            verbs: string_set(self.verbs),
            categories: string_set(&[self.category]),
            ..Default::default()
        }
    }
}

const DELETE: &[&str] = &["delete"];
const NONE: &[&str] = &[];

const fn synthetic(
    id: &'static str,
    name: &'static str,
    kind: &'static str,
    singular: &'static str,
    namespaced: bool,
    short_names: &'static [&'static str],
    verbs: &'static [&'static str],
    category: &'static str,
    accessor: Option<AccessorCtor>,
) -> Synthetic {
    Synthetic { id, name, kind, singular, namespaced, short_names, verbs, category, accessor }
}

pub static SYNTHETICS: &[Synthetic] = &[
    synthetic("workloads", "workloads", "Workload", "workload", true, &["wk"], NONE, K9S_CAT, Some(ctor::<Workload>)),
    synthetic("pulses", "pulses", "Pulse", "pulses", false, &["hz", "pu"], NONE, K9S_CAT, None),
    synthetic("dir", "dir", "Dir", "dir", false, NONE, NONE, K9S_CAT, Some(ctor::<Dir>)),
    synthetic("xrays", "xray", "XRays", "xray", false, NONE, NONE, K9S_CAT, None),
    synthetic("references", "references", "References", "reference", false, NONE, NONE, K9S_CAT, None),
    synthetic("aliases", "aliases", "Aliases", "alias", false, NONE, NONE, K9S_CAT, None),
    synthetic("contexts", "contexts", "Contexts", "context", false, &["ctx"], NONE, K9S_CAT, Some(ctor::<Context>)),
    synthetic("screendumps", "screendumps", "ScreenDumps", "screendump", false, &["sd"], DELETE, K9S_CAT, Some(ctor::<ScreenDump>)),
    synthetic("benchmarks", "benchmarks", "Benchmarks", "benchmark", false, &["be"], DELETE, K9S_CAT, Some(ctor::<Benchmark>)),
    synthetic("portforwards", "portforwards", "PortForwards", "portforward", true, &["pf"], DELETE, K9S_CAT, Some(ctor::<PortForward>)),
    synthetic("containers", "containers", "Containers", "container", false, NONE, NONE, K9S_CAT, Some(ctor::<Container>)),
    synthetic("scans", "scans", "Scans", "scan", false, NONE, NONE, K9S_CAT, Some(ctor::<ImageScan>)),
    synthetic("rbac", "rbacs", "Rules", "", false, NONE, NONE, K9S_CAT, None),
    synthetic("policy", "policies", "Rules", "", true, NONE, NONE, K9S_CAT, None),
    synthetic("users", "users", "User", "", false, NONE, NONE, K9S_CAT, None),
    synthetic("groups", "groups", "Group", "", false, NONE, NONE, K9S_CAT, None),
    synthetic("helm", "helm", "Helm", "", true, NONE, DELETE, HELM_CAT, Some(ctor::<HelmChart>)),
    synthetic("helm-history", "history", "History", "", true, NONE, DELETE, HELM_CAT, Some(ctor::<HelmHistory>)),
];

/// Accessors for cluster-served types.
pub static BUILTINS: &[(&str, AccessorCtor)] = &[
    ("v1/services", ctor::<Generic>),
    ("v1/configmaps", ctor::<Generic>),
    ("v1/pods", ctor::<Pod>),
    ("v1/nodes", ctor::<Node>),
    ("v1/namespaces", ctor::<Namespace>),
    ("v1/secrets", ctor::<Secret>),
    ("apps/v1/deployments", ctor::<Scaler>),
    ("apps/v1/statefulsets", ctor::<Scaler>),
    ("apps/v1/replicasets", ctor::<Scaler>),
    ("apps/v1/daemonsets", ctor::<Generic>),
    ("batch/v1/jobs", ctor::<Generic>),
    ("batch/v1/cronjobs", ctor::<Generic>),
    ("batch/v1beta1/cronjobs", ctor::<Generic>),
    ("apiextensions.k8s.io/v1/customresourcedefinitions", ctor::<Generic>),
];

static DISPATCH: Lazy<FxHashMap<Gvr, AccessorCtor>> = Lazy::new(|| {
    let synthetic = SYNTHETICS.iter().filter_map(|s| s.accessor.map(|c| (s.gvr(), c)));
    let builtin = BUILTINS.iter().map(|(id, c)| (Gvr::new(id), *c));
    synthetic.chain(builtin).collect()
});

/// Whether the identifier has a dedicated accessor.
pub fn has_accessor(gvr: &Gvr) -> bool {
    DISPATCH.contains_key(gvr)
}

/// Accessor for a type, initialized with the factory and identifier.
///
/// Unregistered identifiers get the dynamic [`Scaler`]. Never fails today;
/// the result leaves room for accessors whose setup can.
pub fn accessor_for(factory: Arc<dyn Factory>, gvr: &Gvr) -> Result<Box<dyn Accessor>> {
    let mut a = match DISPATCH.get(gvr) {
        Some(c) => c(),
        None => {
            debug!(gvr = %gvr, "no registered accessor; using generic scaler");
            Box::new(Scaler::default())
        }
    };
    a.init(factory, gvr.clone());
    Ok(a)
}
