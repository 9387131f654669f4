//! The on-disk PDF library: which files are new, how they are staged for
//! ingestion, and how they move to the processed folder afterwards.

pub mod classifier;
pub mod coordinator;
pub mod staging;

pub use classifier::{classify, ensure_folders, list_pdfs, pending_pdfs};
pub use coordinator::{IngestReport, IngestionCoordinator};
pub use staging::{sweep_stale, StagingBatch};
