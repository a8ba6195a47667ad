//! Deprecation and classification filters applied to discovery results.

use crate::Gvr;

/// Group-versions shipped with every cluster.
const STD_GROUP_VERSIONS: &[&str] = &[
    "apps/v1",
    "autoscaling/v1",
    "autoscaling/v2",
    "autoscaling/v2beta1",
    "autoscaling/v2beta2",
    "batch/v1",
    "batch/v1beta1",
    "extensions/v1beta1",
    "policy/v1beta1",
    "policy/v1",
    "v1",
];

/// Groups under this domain are reserved for built-in APIs.
const BUILTIN_DOMAIN_SUFFIX: &str = ".k8s.io";

const DEPRECATED_GVRS: &[&str] = &["extensions/v1beta1/ingresses"];

/// Checks whether a discovery group-version belongs to a built-in API.
pub fn is_standard_group(gv: &str) -> bool {
    if STD_GROUP_VERSIONS.contains(&gv) {
        return true;
    }
    match gv.split_once('/') {
        Some((group, _)) => group.ends_with(BUILTIN_DOMAIN_SUFFIX),
        None => false,
    }
}

/// Checks whether a resource type must be kept out of the catalog.
pub fn is_deprecated(gvr: &Gvr) -> bool {
    DEPRECATED_GVRS.iter().any(|d| Gvr::new(d) == *gvr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_groups_match_exactly_or_by_domain() {
        assert!(is_standard_group("v1"));
        assert!(is_standard_group("apps/v1"));
        assert!(is_standard_group("batch/v1beta1"));
        assert!(is_standard_group("networking.k8s.io/v1"));
        assert!(is_standard_group("apiextensions.k8s.io/v1"));
        assert!(!is_standard_group("apps/v2"));
        assert!(!is_standard_group("example.com/v1"));
        assert!(!is_standard_group("cluster.x-k8s.io/v1beta1"));
        assert!(!is_standard_group("k8s.io.example.com/v1"));
    }

    #[test]
    fn deny_list_only_hits_exact_identifier() {
        assert!(is_deprecated(&Gvr::new("extensions/v1beta1/ingresses")));
        assert!(!is_deprecated(&Gvr::new("networking.k8s.io/v1/ingresses")));
        assert!(!is_deprecated(&Gvr::new("extensions/v1beta1/deployments")));
    }
}
