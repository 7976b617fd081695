#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod amd;
pub mod asset_paths;
pub mod config;
pub mod error;
pub mod markup;
pub mod models;
pub mod pack;
pub mod pattern;
pub mod store;

pub use config::{PackConfig, PackRule};
pub use error::{PackError, PackResult};
pub use models::{FileId, PackItem, PackKind, PackedBundle, SourceFile};
pub use pack::{NoopHooks, PackHooks, PackRun, Packer, RelativeUrlHooks};
pub use store::{FileStore, MemoryStore};
