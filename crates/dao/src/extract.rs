//! Custom resource definition parsing: a typed path through k8s-openapi and
//! a lenient path over raw JSON that keeps going past bad fields.

use anyhow::{Context, Result};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionVersion,
};
use kube::core::DynamicObject;
use serde_json::{Map, Value};

use k9rs_core::{string_set, Gvr, ResourceMeta, CRD_CAT};

const NAMESPACED_SCOPE: &str = "Namespaced";

/// One problem found while probing a definition object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("failed to extract field {0}")]
    MissingField(String),
    #[error("failed to extract string {0}")]
    MissingString(String),
    #[error("failed to extract list {0}")]
    NotAList(String),
    #[error("unable to find key \"name\" in {0} entry")]
    UnnamedEntry(String),
    #[error("unknown element type {kind} in {field}")]
    BadElement { field: String, kind: &'static str },
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn extract_map<'a>(m: Option<&'a Map<String, Value>>, field: &str, errs: &mut Vec<ExtractError>) -> Option<&'a Map<String, Value>> {
    let v = m.and_then(|m| m.get(field)).and_then(Value::as_object);
    if v.is_none() {
        errs.push(ExtractError::MissingField(field.to_string()));
    }
    v
}

fn extract_str(m: Option<&Map<String, Value>>, field: &str, errs: &mut Vec<ExtractError>) -> String {
    match m.and_then(|m| m.get(field)).and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => {
            errs.push(ExtractError::MissingString(field.to_string()));
            String::new()
        }
    }
}

/// Strings, or maps carrying a `name` string. Absent is not an error.
fn extract_slice(m: Option<&Map<String, Value>>, field: &str, errs: &mut Vec<ExtractError>) -> Vec<String> {
    let items = match m.and_then(|m| m.get(field)) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            errs.push(ExtractError::NotAList(field.to_string()));
            return Vec::new();
        }
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => out.push(s.clone()),
            Value::Object(o) => match o.get("name").and_then(Value::as_str) {
                Some(s) => out.push(s.to_string()),
                None => errs.push(ExtractError::UnnamedEntry(field.to_string())),
            },
            other => errs.push(ExtractError::BadElement { field: field.to_string(), kind: type_name(other) }),
        }
    }
    out
}

/// Probe a raw definition object for a type descriptor.
///
/// Every missing or mistyped field adds one error and extraction continues,
/// so the descriptor may be partial. The first listed version wins.
pub fn extract_meta(obj: &Value) -> (ResourceMeta, Vec<ExtractError>) {
    let mut errs = Vec::new();
    let mut m = ResourceMeta::default();
    let Some(root) = obj.as_object() else {
        errs.push(ExtractError::NotAnObject(type_name(obj)));
        return (m, errs);
    };

    let spec = extract_map(Some(root), "spec", &mut errs);
    let meta = extract_map(Some(root), "metadata", &mut errs);
    // Only validated: the plural below is the catalog name.
    let _ = extract_str(meta, "name", &mut errs);

    m.group = extract_str(spec, "group", &mut errs);
    if let Some(v) = extract_slice(spec, "versions", &mut errs).into_iter().next() {
        m.version = v;
    }
    m.namespaced = extract_str(spec, "scope", &mut errs) == NAMESPACED_SCOPE;

    let names = extract_map(spec, "names", &mut errs);
    m.kind = extract_str(names, "kind", &mut errs);
    m.singular_name = extract_str(names, "singular", &mut errs);
    m.name = extract_str(names, "plural", &mut errs);
    m.short_names = extract_slice(names, "shortNames", &mut errs).into_iter().collect();

    (m, errs)
}

/// Convert a listed object into the typed definition.
pub fn crd_from_object(obj: &DynamicObject) -> Result<CustomResourceDefinition> {
    let name = obj.metadata.name.as_deref().unwrap_or("<unnamed>");
    let raw = serde_json::to_value(obj).with_context(|| format!("encoding {name}"))?;
    serde_json::from_value(raw).with_context(|| format!("decoding {name} as a CustomResourceDefinition"))
}

/// The type a definition serves: its first served, non-deprecated version.
/// None when no version qualifies.
pub fn new_gvr_from_crd(crd: &CustomResourceDefinition) -> Option<(Gvr, CustomResourceDefinitionVersion)> {
    crd.spec
        .versions
        .iter()
        .find(|v| v.served && !v.deprecated.unwrap_or(false))
        .map(|v| (Gvr::from_parts(&crd.spec.group, &v.name, &crd.spec.names.plural), v.clone()))
}

/// Whether the version declares a scale subresource.
pub fn has_scale(v: &CustomResourceDefinitionVersion) -> bool {
    v.subresources.as_ref().and_then(|s| s.scale.as_ref()).is_some()
}

/// Descriptor for a typed definition at its authoritative version.
pub fn meta_from_crd(crd: &CustomResourceDefinition) -> Option<ResourceMeta> {
    let (gvr, version) = new_gvr_from_crd(crd)?;
    let names = &crd.spec.names;
    let mut m = ResourceMeta {
        name: gvr.resource().to_string(),
        kind: names.kind.clone(),
        singular_name: names.singular.clone().unwrap_or_else(|| names.kind.to_lowercase()),
        group: gvr.group().to_string(),
        version: gvr.version().to_string(),
        namespaced: crd.spec.scope == NAMESPACED_SCOPE,
        short_names: string_set(names.short_names.as_deref().unwrap_or_default()),
        categories: string_set(&[CRD_CAT]),
        ..Default::default()
    };
    if has_scale(&version) {
        m.add_category(k9rs_core::SCALE_CAT);
    }
    Some(m)
}
