use super::classifier::{classify, list_pdfs, pending_pdfs};
use super::staging::StagingBatch;
use crate::config::LibraryConfig;
use crate::error::{Result, PdfChatError};
use crate::knowledge::KnowledgeStore;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of one ingestion attempt
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    /// Files submitted to and accepted by the knowledge store
    pub ingested: Vec<String>,
    /// Files moved into the processed folder afterwards
    pub moved: Vec<String>,
    /// Files that were indexed but could not be moved; retried next run
    pub move_failures: Vec<String>,
}

impl IngestReport {
    /// Number of documents ingested in this attempt
    pub fn count(&self) -> usize {
        self.ingested.len()
    }
}

/// Moves PDFs from the input folder through staging into the knowledge store,
/// and into the processed folder once the store has accepted them.
///
/// Attempts are serialized: a second caller waits for the running attempt and
/// then classifies again, so it never re-submits what the first one indexed.
pub struct IngestionCoordinator {
    pdf_folder: PathBuf,
    processed_folder: PathBuf,
    staging_folder: PathBuf,
    store: Arc<dyn KnowledgeStore>,
    attempt: Mutex<()>,
}

impl IngestionCoordinator {
    pub fn new(library: &LibraryConfig, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            pdf_folder: library.pdf_folder.clone(),
            processed_folder: library.processed_folder.clone(),
            staging_folder: library.staging_folder.clone(),
            store,
            attempt: Mutex::new(()),
        }
    }

    pub fn pdf_folder(&self) -> &Path {
        &self.pdf_folder
    }

    /// Ingest every PDF in the input folder that is not yet processed
    pub async fn ingest_new_documents(&self) -> Result<IngestReport> {
        let _attempt = self.attempt.lock().await;

        let unprocessed = classify(&self.pdf_folder, &self.processed_folder)?;
        if unprocessed.is_empty() {
            return Ok(IngestReport::default());
        }

        let batch = self.stage(unprocessed).await?;

        log::info!("Loading {} new PDF document(s) into the knowledge store", batch.files().len());
        match self.store.ingest(batch.path()).await {
            Ok(indexed) => log::info!("Knowledge store accepted {} document(s)", indexed),
            Err(e) => {
                log::error!("Error processing PDFs, nothing marked as processed: {}", e);
                return Err(e);
            }
        }

        let mut report = IngestReport {
            ingested: batch.files().to_vec(),
            ..IngestReport::default()
        };

        for name in batch.files() {
            match move_to_processed(&self.pdf_folder, &self.processed_folder, name) {
                Ok(()) => {
                    log::info!("Moved {} to processed folder", name);
                    report.moved.push(name.clone());
                }
                Err(e) => {
                    log::warn!("Could not move {} to processed folder: {}", name, e);
                    report.move_failures.push(name.clone());
                }
            }
        }

        drop(batch);
        Ok(report)
    }

    /// Filenames already in the processed folder
    pub fn processed_documents(&self) -> Result<Vec<String>> {
        if !self.processed_folder.is_dir() {
            return Ok(Vec::new());
        }
        list_pdfs(&self.processed_folder)
    }

    /// Filenames waiting for the next ingestion. Read-only: no folders are
    /// created and nothing is logged.
    pub fn pending_documents(&self) -> Result<Vec<String>> {
        Ok(pending_pdfs(&self.pdf_folder, &self.processed_folder)?.into_iter().collect())
    }

    async fn stage(&self, files: BTreeSet<String>) -> Result<StagingBatch> {
        let staging_folder = self.staging_folder.clone();
        let pdf_folder = self.pdf_folder.clone();
        tokio::task::spawn_blocking(move || {
            StagingBatch::stage(&staging_folder, &pdf_folder, &files)
        })
        .await
        .map_err(|e| PdfChatError::Staging(format!("staging task failed: {}", e)))?
    }
}

/// Move one file into the processed folder, falling back to copy + delete
/// when a rename is not possible (e.g. across filesystems).
fn move_to_processed(pdf_folder: &Path, processed_folder: &Path, name: &str) -> Result<()> {
    let from = pdf_folder.join(name);
    let to = processed_folder.join(name);

    if std::fs::rename(&from, &to).is_ok() {
        return Ok(());
    }

    std::fs::copy(&from, &to)?;
    std::fs::remove_file(&from)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::knowledge::RetrievedChunk;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Records the directory contents of every ingest call
    pub(crate) struct RecordingStore {
        pub calls: StdMutex<Vec<Vec<String>>>,
        pub seen_dirs: StdMutex<Vec<PathBuf>>,
        pub fail: bool,
        pub delay_ms: u64,
    }

    impl RecordingStore {
        pub(crate) fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                seen_dirs: StdMutex::new(Vec::new()),
                fail: false,
                delay_ms: 0,
            }
        }

        pub(crate) fn failing() -> Self {
            Self { fail: true, ..Self::new() }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl KnowledgeStore for RecordingStore {
        async fn ingest(&self, dir: &Path) -> Result<usize> {
            let files = list_pdfs(dir)?;
            self.calls.lock().unwrap().push(files.clone());
            self.seen_dirs.lock().unwrap().push(dir.to_path_buf());
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                let msg = "OpenAI API error 503: unavailable".to_string();
                return Err(PdfChatError::Embedding(msg));
            }
            Ok(files.len())
        }

        fn ready(&self) -> bool {
            true
        }

        async fn search(
            &self,
            _query: &str,
            _k: usize,
            _min_score: f32,
        ) -> Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }

        async fn document_count(&self) -> Result<usize> {
            Ok(self.calls.lock().unwrap().iter().map(|c| c.len()).sum())
        }
    }

    pub(crate) struct Library {
        _root: TempDir,
        pub config: LibraryConfig,
    }

    impl Library {
        pub(crate) fn new() -> Self {
            let root = TempDir::new().unwrap();
            let config = LibraryConfig {
                pdf_folder: root.path().join("pdf"),
                processed_folder: root.path().join("pdf").join("processed"),
                staging_folder: root.path().join("staging"),
            };
            fs::create_dir_all(&config.processed_folder).unwrap();
            Self { _root: root, config }
        }

        pub(crate) fn add(&self, name: &str) {
            fs::write(self.config.pdf_folder.join(name), b"%PDF-1.4 test").unwrap();
        }

        pub(crate) fn processed(&self) -> Vec<String> {
            list_pdfs(&self.config.processed_folder).unwrap()
        }

        pub(crate) fn pending(&self) -> Vec<String> {
            list_pdfs(&self.config.pdf_folder).unwrap()
        }
    }

    #[tokio::test]
    async fn test_new_pdf_is_ingested_and_moved() {
        let library = Library::new();
        library.add("a.pdf");
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());

        let report = coordinator.ingest_new_documents().await.unwrap();

        assert_eq!(report.count(), 1);
        assert_eq!(report.moved, vec!["a.pdf"]);
        assert!(report.move_failures.is_empty());
        assert_eq!(library.processed(), vec!["a.pdf"]);
        assert!(library.pending().is_empty());
        assert_eq!(*store.calls.lock().unwrap(), vec![vec!["a.pdf".to_string()]]);

        let staged_dir = store.seen_dirs.lock().unwrap()[0].clone();
        assert!(!staged_dir.exists());
        assert!(!library.config.staging_folder.exists());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_input_untouched() {
        let library = Library::new();
        library.add("a.pdf");
        let store = Arc::new(RecordingStore::failing());
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());

        let result = coordinator.ingest_new_documents().await;

        assert!(result.is_err());
        assert_eq!(library.pending(), vec!["a.pdf"]);
        assert!(library.processed().is_empty());
        assert_eq!(store.call_count(), 1);
        let staged_dir = store.seen_dirs.lock().unwrap()[0].clone();
        assert!(!staged_dir.exists());
        assert!(!library.config.staging_folder.exists());
    }

    #[tokio::test]
    async fn test_second_run_is_a_noop() {
        let library = Library::new();
        library.add("a.pdf");
        library.add("b.pdf");
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());

        assert_eq!(coordinator.ingest_new_documents().await.unwrap().count(), 2);
        let processed_before = library.processed();

        let second = coordinator.ingest_new_documents().await.unwrap();
        assert_eq!(second.count(), 0);
        assert_eq!(store.call_count(), 1);
        assert_eq!(library.processed(), processed_before);
    }

    #[tokio::test]
    async fn test_processed_name_is_never_resubmitted() {
        let library = Library::new();
        fs::write(library.config.processed_folder.join("a.pdf"), b"old").unwrap();
        library.add("a.pdf");
        library.add("b.pdf");
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());

        let report = coordinator.ingest_new_documents().await.unwrap();

        assert_eq!(report.ingested, vec!["b.pdf"]);
        assert_eq!(*store.calls.lock().unwrap(), vec![vec!["b.pdf".to_string()]]);
        // The same-named input file stays where it is
        assert_eq!(library.pending(), vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn test_staging_failure_never_reaches_store() {
        let mut library = Library::new();
        library.add("a.pdf");
        // A regular file where the staging root's parent should be
        let blocker = library.config.pdf_folder.parent().unwrap().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        library.config.staging_folder = blocker.join("staging");
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());

        let err = coordinator.ingest_new_documents().await.unwrap_err();

        assert!(matches!(err, PdfChatError::Staging(_)), "got {:?}", err);
        assert_eq!(store.call_count(), 0);
        assert_eq!(library.pending(), vec!["a.pdf"]);
        assert!(library.processed().is_empty());
        assert!(!library.config.staging_folder.exists());
    }

    #[tokio::test]
    async fn test_nothing_new_skips_store() {
        let library = Library::new();
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store.clone());

        let report = coordinator.ingest_new_documents().await.unwrap();
        assert_eq!(report, IngestReport::default());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_move_failure_is_reported_not_fatal() {
        let library = Library::new();
        library.add("a.pdf");
        library.add("b.pdf");
        // A directory squatting on the destination name makes the move fail
        fs::create_dir_all(library.config.processed_folder.join("a.pdf")).unwrap();
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store);

        let report = coordinator.ingest_new_documents().await.unwrap();

        assert_eq!(report.count(), 2);
        assert_eq!(report.moved, vec!["b.pdf"]);
        assert_eq!(report.move_failures, vec!["a.pdf"]);
        assert_eq!(library.pending(), vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_are_serialized() {
        let library = Library::new();
        library.add("a.pdf");
        let store = Arc::new(RecordingStore { delay_ms: 50, ..RecordingStore::new() });
        let coordinator = Arc::new(IngestionCoordinator::new(&library.config, store.clone()));

        let (first, second) = tokio::join!(
            coordinator.ingest_new_documents(),
            coordinator.ingest_new_documents()
        );

        assert_eq!(first.unwrap().count() + second.unwrap().count(), 1);
        assert_eq!(store.call_count(), 1);
        assert_eq!(library.processed(), vec!["a.pdf"]);
    }

    #[tokio::test]
    async fn test_processed_and_pending_listing() {
        let library = Library::new();
        fs::write(library.config.processed_folder.join("done.pdf"), b"x").unwrap();
        library.add("new.pdf");
        let store = Arc::new(RecordingStore::new());
        let coordinator = IngestionCoordinator::new(&library.config, store);

        assert_eq!(coordinator.processed_documents().unwrap(), vec!["done.pdf"]);
        assert_eq!(coordinator.pending_documents().unwrap(), vec!["new.pdf"]);
    }
}
