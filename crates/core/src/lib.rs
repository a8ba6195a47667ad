//! k9rs core types: resource identifiers, type descriptors and classification.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod filters;
mod gvr;

pub use config::Config;
pub use gvr::Gvr;

/// Category marking a custom (extension) resource type.
pub const CRD_CAT: &str = "crd";
/// Category marking a tool-internal synthetic type.
pub const K9S_CAT: &str = "k9s";
/// Category marking a helm-domain type.
pub const HELM_CAT: &str = "helm";
/// Category marking a type with a detected scale subresource.
pub const SCALE_CAT: &str = "scale";

/// Namespace value meaning "every namespace".
pub const ALL_NAMESPACES: &str = "";
/// Namespace value for cluster-scoped listings.
pub const CLUSTER_SCOPE: &str = "-";
/// Label selector matching everything.
pub const EVERYTHING: &str = "";

pub type StringSet = BTreeSet<String>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid resource path {0:?} (expect resource, version/resource or group/version/resource)")]
    InvalidGvr(String),
}

/// Metadata describing one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    /// Plural resource name.
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub singular_name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub namespaced: bool,
    #[serde(default)]
    pub short_names: StringSet,
    #[serde(default)]
    pub verbs: StringSet,
    #[serde(default)]
    pub categories: StringSet,
}

impl ResourceMeta {
    pub fn has_category(&self, cat: &str) -> bool {
        self.categories.contains(cat)
    }

    /// Returns true when the category was not present before.
    pub fn add_category(&mut self, cat: &str) -> bool {
        self.categories.insert(cat.to_string())
    }

    pub fn can(&self, verb: &str) -> bool {
        self.verbs.contains(verb)
    }
}

/// Checks if the type is a custom resource.
pub fn is_crd(m: &ResourceMeta) -> bool {
    m.has_category(CRD_CAT)
}

/// Checks if the type is served by the cluster rather than the tool itself.
pub fn is_k8s_meta(m: &ResourceMeta) -> bool {
    !m.has_category(K9S_CAT) && !m.has_category(HELM_CAT)
}

/// Checks if the type is a tool-internal synthetic type.
pub fn is_k9s_meta(m: &ResourceMeta) -> bool {
    m.has_category(K9S_CAT)
}

/// Checks if instances of the type can be scaled.
pub fn is_scalable(m: &ResourceMeta) -> bool {
    m.has_category(SCALE_CAT)
}

/// Split a `namespace/name` path. A bare name has no namespace.
pub fn split_path(path: &str) -> (Option<&str>, &str) {
    match path.split_once('/') {
        Some((ns, name)) if !ns.is_empty() => (Some(ns), name),
        Some((_, name)) => (None, name),
        None => (None, path),
    }
}

/// Join namespace and name into a `namespace/name` path.
pub fn fqn(ns: &str, name: &str) -> String {
    if ns.is_empty() || ns == CLUSTER_SCOPE {
        name.to_string()
    } else {
        format!("{ns}/{name}")
    }
}

/// Build a string set from a slice.
pub fn string_set<S: AsRef<str>>(items: &[S]) -> StringSet {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

pub mod prelude {
    pub use super::{
        is_crd, is_k8s_meta, is_k9s_meta, is_scalable, Gvr, ResourceMeta, StringSet, CRD_CAT, HELM_CAT, K9S_CAT,
        SCALE_CAT,
    };
}
