//! Registry loading and querying for skills and ops.
//!
//! The loaders read base JSON registries, merge YAML overlays, validate
//! cross-references, statically check pipeline skills, and publish an
//! immutable [`entry::SkillRegistryView`]/[`entry::OpRegistryView`]
//! snapshot. Every query compares file mtimes first, so edits to any
//! registry or overlay file become visible without a restart while
//! in-flight callers keep the snapshot they started with.

pub mod entry;
pub mod error;
pub mod loader;
pub mod overlay;
pub mod pipeline;
pub mod validation;

pub use entry::{
    ActionEntry, ActorPolicy, ChannelPolicy, OpRegistryView, OpRuntimeEntry, SkillRegistryView,
    SkillRuntimeEntry,
};
pub use error::RegistryError;
pub use loader::{NativeCatalog, OpRegistryLoader, SkillRegistryLoader};
