//! Page markup handling: reference scanning, placeholder insertion and tag creation.

mod scanner;
mod tags;

pub use scanner::{ResolvedReference, ScanOptions, ScanOutcome, scan_scripts, scan_styles};
pub use tags::{link_style_tags, resource_config_script, script_tags};
