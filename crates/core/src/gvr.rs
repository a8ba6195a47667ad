use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, ResourceMeta};

/// Group/Version/Resource triple naming one resource type.
///
/// All segments are lower-cased on construction. Ordering is group, then
/// version, then resource, which is the order catalog listings are sorted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvr {
    group: String,
    version: String,
    resource: String,
}

impl Gvr {
    /// Build from a `resource`, `version/resource` or `group/version/resource` path.
    ///
    /// Never fails: extra leading segments are folded into the group. Use
    /// `str::parse` for strict parsing of user input.
    pub fn new(path: &str) -> Self {
        let path = path.trim().trim_matches('/');
        if path.is_empty() {
            return Self::default();
        }
        let parts: Vec<&str> = path.split('/').collect();
        match parts.as_slice() {
            [r] => Self::from_parts("", "", r),
            [v, r] => Self::from_parts("", v, r),
            [g, v, r] => Self::from_parts(g, v, r),
            _ => {
                let n = parts.len();
                Self::from_parts(&parts[..n - 2].join("/"), parts[n - 2], parts[n - 1])
            }
        }
    }

    pub fn from_parts(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.trim().to_lowercase(),
            version: version.trim().to_lowercase(),
            resource: resource.trim().to_lowercase(),
        }
    }

    /// Combine a discovery group-version (`v1`, `apps/v1`) with a resource name.
    pub fn from_gv_and_r(gv: &str, resource: &str) -> Self {
        match gv.split_once('/') {
            Some((g, v)) => Self::from_parts(g, v, resource),
            None => Self::from_parts("", gv, resource),
        }
    }

    pub fn from_meta(meta: &ResourceMeta) -> Self {
        Self::from_parts(&meta.group, &meta.version, &meta.name)
    }

    pub fn group(&self) -> &str { &self.group }
    pub fn version(&self) -> &str { &self.version }
    pub fn resource(&self) -> &str { &self.resource }

    /// Group-version as served by discovery (`v1` for the core group).
    pub fn gv(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty() && self.version.is_empty() && self.resource.is_empty()
    }
}

impl fmt::Display for Gvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for seg in [&self.group, &self.version, &self.resource] {
            if seg.is_empty() {
                continue;
            }
            if !first {
                f.write_str("/")?;
            }
            f.write_str(seg)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Gvr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('/').collect();
        if s.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::InvalidGvr(s.to_string()));
        }
        Ok(Gvr::new(s))
    }
}

impl From<&str> for Gvr {
    fn from(path: &str) -> Self { Gvr::new(path) }
}
