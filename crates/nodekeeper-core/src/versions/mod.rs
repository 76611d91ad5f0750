//! Version comparison and compose tag patching.

pub mod compose_patch;
pub mod diff;
pub mod engine;
pub mod source;

pub use compose_patch::{current_tag, replace_image_tag};
pub use diff::{VersionDiff, filter_updatable};
pub use engine::{VersionDiffEngine, VersionReport};
pub use source::{HttpVersionManifest, VersionSource};
