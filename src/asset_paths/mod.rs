//! Helpers for classifying, resolving and naming resource paths.
//!
//! The responsibilities are split into focused submodules so that URL filtering,
//! relative path arithmetic, bundle naming and module id lookups can be tested
//! independently. Every path handled here is a project subpath using forward
//! slashes and no leading slash.

mod bundle;
mod candidates;
mod filters;
mod relative;

pub use bundle::{aio_sibling_path, hashed_subpath, short_hash};
pub use candidates::generate_lookup_candidates;
pub use filters::is_non_local_url;
pub use relative::{join_relative, normalize_path, relative_url, split_url_suffix};
