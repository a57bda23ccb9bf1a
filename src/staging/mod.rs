pub mod area;
pub mod gatherer;
pub mod manifest;

pub use area::{StagingArea, StagingLock};
pub use gatherer::StagingGatherer;
pub use manifest::{ManifestEntry, StagingManifest};
