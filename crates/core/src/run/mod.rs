mod artifact;
mod file_store;
mod repository;
mod run_model;
mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use artifact::{Artifact, ArtifactKind};
pub use file_store::FileRunStore;
pub use repository::RunRepository;
pub use run_model::{Run, RunFilter, RunMetadata, MAX_AUTOMATIC_PERCENT};
pub use status::RunStatus;
