//! k9rs dao: the resource type catalog and the accessors that read
//! instances of each type.
//!
//! [`Meta`] is the catalog. It is rebuilt from synthetic types, cluster
//! discovery and custom resource definitions by [`Meta::load_resources`].
//! [`accessor_for`] hands out the accessor for a type, falling back to a
//! dynamic [`Scaler`] for anything without a dedicated one.

#![forbid(unsafe_code)]

pub mod accessor;
pub mod extract;
mod generic;
pub mod helm;
mod meta;
pub mod registry;
pub mod resources;
pub mod synthetic;

pub use accessor::{Accessor, ListOptions, Nuker, Scalable};
pub use extract::{crd_from_object, extract_meta, meta_from_crd, new_gvr_from_crd, ExtractError};
pub use generic::{Generic, Scaler};
pub use k9rs_core::{is_crd, is_k8s_meta, is_k9s_meta, is_scalable};
pub use meta::{meta_from_api_resource, Meta, MetaError, CRD_GVR};
pub use registry::{accessor_for, has_accessor, AccessorCtor, Synthetic, BUILTINS, SYNTHETICS};
